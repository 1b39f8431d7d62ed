use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use randomizer_util::datetime;

/// Raw body of a `page=dapi&s=post&q=index&json=1` request.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PostsResponse {
    #[serde(rename = "@attributes")]
    pub attributes: Option<Attributes>,
    #[serde(default)]
    pub post: Option<OneOrMany<PostResult>>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Attributes {
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    /// Total number of posts matching the query, across all pages.
    pub count: u64,
}

/// The API sends a lone object instead of a list when there is exactly one result.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PostResult {
    pub id: u64,
    #[serde(default, with = "datetime")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub source: String,
    /// Space separated.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub creator_id: Option<u64>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl PostResult {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags.split_whitespace().map(|tag| tag.to_string()).collect()
    }

    /// The media URL, if the post has a non-blank one.
    pub fn media_url(&self) -> Option<&str> {
        self.file_url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    }
}

/// Normalized search result.
#[derive(Debug, Clone, Default)]
pub struct PostsResult {
    pub posts: Vec<PostResult>,
    /// Total result count reported by the API, if any.
    pub count: Option<u64>,
}
