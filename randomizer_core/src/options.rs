use serde::Deserialize;

use gelbooru_client::Credential;

use crate::resolution::FitOptions;

pub const DEFAULT_SEARCH_LIMIT: u32 = 100;
pub const DEFAULT_RETRY_COUNT: usize = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 30000;
/// Emoticon-like tags whose underscores are part of the tag itself.
pub const DEFAULT_UNDERSCORE_EXCLUSIONS: &str =
    "0_0,(o)_(o),+_+,+_-,._.,<o>_<o>,<|>_<|>,=_=,>_<,3_3,6_9,>_o,@_@,^_^,o_o,u_u,x_x,|_|,||_||";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RandomizerOptions {
    pub api_key: String,
    pub user_id: String,
    pub base_url: String,
    /// Posts requested per search.
    pub search_limit: u32,
    /// Tags always added to the include list, e.g. `score:>=10`.
    pub extra_filters: Vec<String>,
    /// Replace underscores with spaces when inserting tags into the prompt.
    pub replace_underscores: bool,
    pub underscore_exclusions: Vec<String>,
    pub retry_count: usize,
    pub retry_delay_ms: u64,
    pub search_timeout_ms: u64,
    pub fit: FitOptions,
}

impl Default for RandomizerOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            user_id: String::new(),
            base_url: gelbooru_client::BASE_URL.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            extra_filters: Vec::new(),
            replace_underscores: true,
            underscore_exclusions: split_list(DEFAULT_UNDERSCORE_EXCLUSIONS),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            fit: FitOptions::default(),
        }
    }
}

impl RandomizerOptions {
    pub fn credential(&self) -> Option<Credential> {
        let credential = Credential {
            api_key: self.api_key.trim().to_string(),
            user_id: self.user_id.trim().to_string(),
        };
        credential.is_complete().then_some(credential)
    }
}

/// Split a comma separated setting, dropping blank entries.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}
