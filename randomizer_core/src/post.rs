use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};
use itertools::Itertools;

use gelbooru_client::PostResult;
use randomizer_util::{expand_alternatives, format_include_tag};

/// One imageboard submission. Identity is by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: u64,
    /// In the order the API returned them.
    pub tags: Vec<String>,
    pub file_url: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Canonical post page.
    pub page_url: String,
    pub creator_id: Option<u64>,
    pub owner: Option<String>,
    pub score: i64,
    pub rating: String,
    pub created_at: Option<DateTime<FixedOffset>>,
}

impl Post {
    pub fn from_result(post: &PostResult, page_url: String) -> Self {
        Post {
            id: post.id,
            tags: post.tag_list(),
            file_url: post.media_url().map(|url| url.to_string()),
            width: post.width,
            height: post.height,
            page_url,
            creator_id: post.creator_id,
            owner: post.owner.clone(),
            score: post.score,
            rating: post.rating.clone(),
            created_at: post.created_at,
        }
    }
}

/// One page of search results plus the total count of matching posts, when known.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub posts: Vec<Post>,
    pub total_count: Option<u64>,
}

/// Include and exclude tags of a search, after pattern expansion and formatting.
/// The order is kept for the query, but two constraints compare equal as sets.
#[derive(Debug, Clone, Default)]
pub struct SearchConstraints {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl SearchConstraints {
    /// Build constraints from user input: comma separated tags, with `{a|b}` alternations.
    pub fn parse(include: &str, exclude: &str) -> Self {
        SearchConstraints {
            include: split_tags(&expand_alternatives(include), false),
            exclude: split_tags(&expand_alternatives(exclude), true),
        }
    }

    /// Add always-on filters to the include list, skipping ones already present.
    pub fn with_filters(mut self, filters: &[String]) -> Self {
        for filter in filters {
            let filter = format_include_tag(filter);
            if !filter.is_empty() && !self.include.contains(&filter) {
                self.include.push(filter);
            }
        }
        self
    }

    fn key(&self) -> (BTreeSet<&str>, BTreeSet<&str>) {
        (
            self.include.iter().map(String::as_str).collect(),
            self.exclude.iter().map(String::as_str).collect(),
        )
    }
}

impl PartialEq for SearchConstraints {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SearchConstraints {}

/// Exclude tags may carry the negation marker already; it is stripped so the client adds exactly one.
fn split_tags(s: &str, strip_negation: bool) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .map(|tag| if strip_negation { tag.trim_start_matches('-') } else { tag })
        .map(format_include_tag)
        .filter(|tag| !tag.is_empty())
        .unique()
        .collect()
}
