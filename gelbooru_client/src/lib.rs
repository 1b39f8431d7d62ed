mod error;
mod result;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{StatusCode, Url};

use randomizer_util::{build_params, format_exclude_tag, format_include_tag};

pub use crate::error::Error;
use crate::error::Result;
pub use crate::result::*;

pub const BASE_URL: &str = "https://gelbooru.com/";
pub const RANDOM_SORT: &str = "sort:random";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// API credentials, obtainable from the account options page.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub api_key: String,
    pub user_id: String,
}

impl Credential {
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.user_id.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GelbooruClient {
    endpoint: Url,
    credential: Option<Credential>,
    client: reqwest::Client,
}

impl GelbooruClient {
    /// `base_url` may point to any Gelbooru compatible site, defaults to [`BASE_URL`].
    pub fn new(base_url: Option<&str>, credential: Option<Credential>) -> Result<Self> {
        let base = Url::parse(base_url.unwrap_or(BASE_URL))?;
        let endpoint = base.join("index.php")?;
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(GelbooruClient {
            endpoint,
            credential,
            client,
        })
    }

    pub fn has_credential(&self) -> bool {
        self.credential.as_ref().is_some_and(Credential::is_complete)
    }

    /// Canonical post page URL for a post id.
    pub fn post_url(&self, id: u64) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("page", "post")
            .append_pair("s", "view")
            .append_pair("id", &id.to_string());
        url.to_string()
    }

    /// Search posts in random order. No retry is done here.
    pub async fn search_posts(&self, tags: &[String], exclude_tags: &[String], limit: u32) -> Result<PostsResult> {
        let query = format_tags(tags, exclude_tags).join(" ");
        let params = build_params! {
            required tags => query,
            required limit,
        };
        let content = self.fetch(params).await?;
        log(&query, &content).await;
        parse_posts(&content)
    }

    pub async fn get_post(&self, id: u64) -> Result<PostResult> {
        let params = build_params! { required id };
        let content = self.fetch(params).await?;
        parse_posts(&content)?
            .posts
            .into_iter()
            .next()
            .ok_or(Error::NotFound)
    }
}

impl GelbooruClient {
    async fn fetch(&self, query: impl IntoIterator<Item = (String, String)>) -> Result<String> {
        let credential = self.credential.as_ref();
        let api_key = credential.map(|c| c.api_key.clone()).filter(|s| !s.is_empty());
        let user_id = credential.map(|c| c.user_id.clone()).filter(|s| !s.is_empty());
        let params = build_params! {
            required page => "dapi",
            required s => "post",
            required q => "index",
            required json => 1,
            optional api_key => api_key,
            optional user_id => user_id,
        };
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(params).extend_pairs(query);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        if !status.is_success() && !status.is_redirection() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }
}

/// Query tags: formatted includes, negated excludes, then the random sort directive if missing.
pub fn format_tags(tags: &[String], exclude_tags: &[String]) -> Vec<String> {
    let mut query = tags
        .iter()
        .map(|tag| format_include_tag(tag))
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>();
    query.extend(exclude_tags.iter().filter_map(|tag| format_exclude_tag(tag)));
    if !query.iter().any(|tag| tag == RANDOM_SORT) {
        query.push(RANDOM_SORT.to_string());
    }
    query
}

/// Parse a response body into posts.
/// A body without any post container is [`Error::NotFound`], an unreadable one is [`Error::MalformedResponse`].
pub fn parse_posts(content: &str) -> Result<PostsResult> {
    if content.trim().is_empty() {
        return Err(Error::NotFound);
    }
    let de = &mut serde_json::Deserializer::from_str(content);
    let response: PostsResponse =
        serde_path_to_error::deserialize(de).map_err(|e| Error::MalformedResponse(e.to_string()))?;

    let count = response.attributes.as_ref().map(|a| a.count);
    match (response.attributes, response.post) {
        (None, None) => Err(Error::NotFound),
        (_, post) => Ok(PostsResult {
            posts: post.map(OneOrMany::into_vec).unwrap_or_default(),
            count,
        }),
    }
}

/// Dump the response body into `CLIENT_LOG_DIR`, if set. Failures are only reported.
async fn log(name: &str, content: &str) {
    if let Ok(dir) = std::env::var("CLIENT_LOG_DIR") {
        if let Err(e) = write_log(Path::new(&dir), name, content).await {
            tracing::warn!("Cannot log gelbooru response to {}: {}", dir, e);
        }
    }
}

async fn write_log(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    use tokio::{fs::File, io::AsyncWriteExt};

    let name = name.replace([':', ' ', '/'], "_");
    let time = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filepath = dir.join(format!("gelbooru_{}_{}.json", name, time));
    let mut file = File::create(&filepath).await?;
    file.write_all(content.as_bytes()).await?;
    tracing::debug!("Logged gelbooru response for `{}`", name);
    Ok(filepath)
}
