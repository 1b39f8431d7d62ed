use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use randomizer_core::options::split_list;
use randomizer_core::RandomizerOptions;

pub const DEFAULT_EXCLUSION_LIST: &str = "list/removal_tags.txt";

/// Options from the environment, falling back to defaults for anything unset.
pub fn load_options() -> Result<RandomizerOptions> {
    options_from(|key| env::var(key).ok())
}

pub fn exclusion_path() -> PathBuf {
    env::var("GPR_EXCLUSION_LIST")
        .ok()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EXCLUSION_LIST.to_string())
        .into()
}

fn options_from(var: impl Fn(&str) -> Option<String>) -> Result<RandomizerOptions> {
    let mut options = RandomizerOptions::default();
    if let Some(api_key) = var("GELBOORU_API_KEY") {
        options.api_key = api_key;
    }
    if let Some(user_id) = var("GELBOORU_USER_ID") {
        options.user_id = user_id;
    }
    if let Some(base_url) = var("GELBOORU_BASE_URL").filter(|url| !url.trim().is_empty()) {
        options.base_url = base_url;
    }
    if let Some(filters) = var("GPR_EXTRA_FILTERS") {
        options.extra_filters = split_list(&filters);
    }
    if let Some(exclusions) = var("GPR_UNDERSCORE_EXCLUSIONS") {
        options.underscore_exclusions = split_list(&exclusions);
    }
    if let Some(value) = var("GPR_REPLACE_UNDERSCORES") {
        options.replace_underscores = parse_var("GPR_REPLACE_UNDERSCORES", &value)?;
    }
    if let Some(value) = var("GPR_RETRY_COUNT") {
        options.retry_count = parse_var("GPR_RETRY_COUNT", &value)?;
    }
    if let Some(value) = var("GPR_RETRY_DELAY_MS") {
        options.retry_delay_ms = parse_var("GPR_RETRY_DELAY_MS", &value)?;
    }
    Ok(options)
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{} has an invalid value: {:?}", key, value))
}
