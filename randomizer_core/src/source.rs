// Seams between the engine and the network: where posts come from and how images are fetched.

use async_trait::async_trait;

use gelbooru_client::GelbooruClient;
use randomizer_download::{FetchedImage, ImageDownloader};

use crate::error::Result;
use crate::post::{Post, SearchConstraints, SearchPage};

/// A booru search endpoint returning posts in random order.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Whether the credentials required for searching are configured.
    fn has_credential(&self) -> bool;

    /// Issue one search. No retry is done here.
    async fn search(&self, constraints: &SearchConstraints, limit: u32) -> Result<SearchPage>;
}

/// Image access used for candidate validation and init images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Cheap availability check, fails on network errors, timeouts and non-success statuses.
    async fn probe(&self, url: &str) -> Result<()>;

    /// Download the full image.
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

#[async_trait]
impl PostSource for GelbooruClient {
    fn has_credential(&self) -> bool {
        GelbooruClient::has_credential(self)
    }

    async fn search(&self, constraints: &SearchConstraints, limit: u32) -> Result<SearchPage> {
        let result = self
            .search_posts(&constraints.include, &constraints.exclude, limit)
            .await?;
        tracing::debug!(
            "Gelbooru returned {} posts (total {:?}) for {:?}",
            result.posts.len(),
            result.count,
            constraints.include
        );
        let posts = result
            .posts
            .iter()
            .map(|post| Post::from_result(post, self.post_url(post.id)))
            .collect();
        Ok(SearchPage {
            posts,
            total_count: result.count,
        })
    }
}

#[async_trait]
impl ImageFetcher for ImageDownloader {
    async fn probe(&self, url: &str) -> Result<()> {
        Ok(ImageDownloader::probe(self, url).await?)
    }

    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        Ok(self.download(url).await?)
    }
}
