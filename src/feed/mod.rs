mod fetcher;
mod page;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;

pub use fetcher::parse_feed;
pub use page::{extract_page, page_item, PageContent};

/// Raw retrieval of feeds and pages. Parsing stays on our side so tests can
/// feed canned bytes.
#[async_trait]
pub trait FeedRetriever: Send + Sync {
    async fn fetch_rss(&self, url: &str) -> Result<Vec<u8>>;

    async fn fetch_page(&self, url: &str) -> Result<String>;
}

pub struct HttpRetriever {
    client: Client,
}

impl HttpRetriever {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .user_agent(concat!("autoposter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch {}: HTTP {}", url, response.status()).into());
        }
        Ok(response)
    }
}

#[async_trait]
impl FeedRetriever for HttpRetriever {
    async fn fetch_rss(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.get(url).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        Ok(self.get(url).await?.text().await?)
    }
}
