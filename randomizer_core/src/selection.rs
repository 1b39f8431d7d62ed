use itertools::Itertools;

use crate::exclusion::{filter_tags, ExclusionSet};
use crate::post::Post;
use crate::session::SessionState;
use crate::source::ImageFetcher;

/// The accepted candidate of a selection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub post_id: u64,
    /// Post tags minus the excluded ones, in API order.
    pub tags: Vec<String>,
    pub image_url: String,
    pub post_url: String,
    pub width: u32,
    pub height: u32,
}

impl Selection {
    pub fn tag_string(&self) -> String {
        self.tags.iter().join(", ")
    }
}

/// Pick the first usable candidate, in the order the search returned them.
///
/// A candidate is skipped when it was already used this session, has no image URL,
/// or its image cannot be reached. The accepted post is registered in `session` before
/// returning, so it is never offered again even if a later step fails.
/// `None` is the normal outcome when the candidates run out or the session is exhausted.
pub async fn select<F>(
    candidates: &[Post],
    session: &mut SessionState,
    exclusion: &ExclusionSet,
    fetcher: &F,
) -> Option<Selection>
where
    F: ImageFetcher + ?Sized,
{
    if session.is_exhausted() {
        tracing::debug!("All {} known posts already used", session.len());
        return None;
    }

    for post in candidates {
        if session.contains(post.id) {
            continue;
        }
        let Some(image_url) = post.file_url.as_deref() else {
            tracing::debug!("Post {} has no image URL, skipped", post.id);
            continue;
        };
        if let Err(e) = fetcher.probe(image_url).await {
            tracing::debug!("Post {} image unavailable, skipped: {}", post.id, e);
            continue;
        }

        session.register(post.id);
        return Some(Selection {
            post_id: post.id,
            tags: filter_tags(&post.tags, exclusion),
            image_url: image_url.to_string(),
            post_url: post.page_url.clone(),
            width: post.width,
            height: post.height,
        });
    }
    None
}
