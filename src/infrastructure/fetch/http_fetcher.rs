use async_trait::async_trait;
use tracing::debug;

use crate::application::ImageLoader;
use crate::domain::entities::{Data, DataSource, Options};
use crate::domain::errors::ImageError;
use crate::domain::ports::{FetchResult, Fetcher, FetcherFactory, SourceResult};

/// Downloads `http` and `https` URIs with the loader's client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher for `url`.
    #[must_use]
    pub const fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self) -> Result<FetchResult, ImageError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ImageError::fetch(&self.url, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ImageError::fetch(
                &self.url,
                format!(
                    "HTTP {}: {}",
                    response.status(),
                    response.status().canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let source = response
            .bytes()
            .await
            .map_err(|e| ImageError::fetch(&self.url, format!("failed to read body: {e}")))?;
        debug!(url = %self.url, size = source.len(), "Downloaded image");

        Ok(FetchResult::Source(SourceResult {
            source,
            mime_type,
            data_source: DataSource::Network,
        }))
    }
}

/// Fails every request because the network policy forbids reads.
#[derive(Debug, Clone)]
struct NetworkDisabledFetcher {
    url: String,
}

#[async_trait]
impl Fetcher for NetworkDisabledFetcher {
    async fn fetch(&self) -> Result<FetchResult, ImageError> {
        Err(ImageError::NetworkDisabled {
            data: self.url.clone(),
        })
    }
}

/// Accepts `http` and `https` URIs while the loader has an HTTP client.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcherFactory;

impl FetcherFactory for HttpFetcherFactory {
    fn create(&self, data: &Data, options: &Options, loader: &ImageLoader) -> Option<Box<dyn Fetcher>> {
        let Data::Uri(url) = data else {
            return None;
        };
        if !matches!(data.scheme().as_deref(), Some("http" | "https")) {
            return None;
        }
        if !options.network_cache_policy.read_enabled() {
            return Some(Box::new(NetworkDisabledFetcher { url: url.clone() }));
        }
        let client = loader.http_client()?;
        Some(Box::new(HttpFetcher::new(url.clone(), client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CachePolicy, ImageRequest};
    use crate::test_support::test_loader_builder;

    fn create(uri: &str, policy: CachePolicy) -> Option<Box<dyn Fetcher>> {
        let loader = test_loader_builder().build();
        let request = ImageRequest::builder(uri).network_cache_policy(policy).build();
        let options = loader.options_for(&request, request.size().unwrap_or_default());
        HttpFetcherFactory.create(request.data(), &options, &loader)
    }

    #[test]
    fn test_only_http_schemes_are_accepted() {
        assert!(create("https://example.com/a.png", CachePolicy::Enabled).is_some());
        assert!(create("HTTP://example.com/a.png", CachePolicy::Enabled).is_some());
        assert!(create("ftp://example.com/a.png", CachePolicy::Enabled).is_none());
        assert!(create("file:///tmp/a.png", CachePolicy::Enabled).is_none());
    }

    #[tokio::test]
    async fn test_disabled_network_fails_without_request() {
        let fetcher = create("https://example.com/a.png", CachePolicy::Disabled).unwrap();
        let error = fetcher.fetch().await.unwrap_err();
        assert!(matches!(error, ImageError::NetworkDisabled { .. }));
    }
}
