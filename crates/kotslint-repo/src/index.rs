//! Release index client
//!
//! Releases are looked up as GitHub release tags:
//! `<base>/repos/replicatedhq/<repo>/releases/tags/v<version>`.

use std::sync::Arc;

use reqwest::StatusCode;
use url::Url;

use crate::cache::VersionCache;
use crate::error::{RepoError, Result};

/// Default base URL of the release index
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("kots-lint/", env!("CARGO_PKG_VERSION"));

/// Products whose releases are looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    Kots,
    EmbeddedCluster,
}

impl Product {
    /// Repository under `replicatedhq` publishing the releases
    pub fn repository(&self) -> &'static str {
        match self {
            Self::Kots => "kots",
            Self::EmbeddedCluster => "embedded-cluster",
        }
    }
}

/// Client for the release index
#[derive(Clone)]
pub struct ReleaseIndex {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    cache: Arc<VersionCache>,
}

impl ReleaseIndex {
    /// Create a client; `token` is sent as a bearer token when present
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Self::with_cache(base_url, token, VersionCache::global())
    }

    /// Create a client recording into `cache` instead of the process cache
    pub fn with_cache(
        base_url: &str,
        token: Option<String>,
        cache: Arc<VersionCache>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| RepoError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
            cache,
        })
    }

    /// URL of the release tag for `version`
    pub fn tag_url(&self, product: Product, version: &str) -> Result<Url> {
        let version = version.trim_start_matches('v');
        let path = format!(
            "repos/replicatedhq/{}/releases/tags/v{version}",
            product.repository()
        );
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(base.join(&path)?)
    }

    /// Whether `version` of `product` was released.
    ///
    /// Known versions are answered from the cache. A 404 means the version
    /// does not exist; any status other than 200 or 404 is an error.
    pub async fn version_exists(&self, product: Product, version: &str) -> Result<bool> {
        if self.cache.contains(product, version) {
            return Ok(true);
        }

        let url = self.tag_url(product, version)?;
        let mut request = self
            .client
            .get(url.clone())
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => {
                self.cache.insert(product, version);
                tracing::debug!(%url, "release exists");
                Ok(true)
            }
            StatusCode::NOT_FOUND => {
                tracing::debug!(%url, "release not found");
                Ok(false)
            }
            status => Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("unexpected response from {url}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index(server: &MockServer, token: Option<&str>) -> ReleaseIndex {
        ReleaseIndex::with_cache(
            &server.uri(),
            token.map(str::to_string),
            Arc::new(VersionCache::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_tag_url() {
        let index = ReleaseIndex::with_cache(
            "https://example.com/api",
            None,
            Arc::new(VersionCache::new()),
        )
        .unwrap();
        assert_eq!(
            index.tag_url(Product::Kots, "v1.109.0").unwrap().as_str(),
            "https://example.com/api/repos/replicatedhq/kots/releases/tags/v1.109.0"
        );
        assert_eq!(
            index.tag_url(Product::EmbeddedCluster, "1.2.3").unwrap().as_str(),
            "https://example.com/api/repos/replicatedhq/embedded-cluster/releases/tags/v1.2.3"
        );
    }

    #[tokio::test]
    async fn test_existing_version_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/replicatedhq/kots/releases/tags/v1.100.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let index = index(&server, None);
        assert!(index.version_exists(Product::Kots, "1.100.0").await.unwrap());
        assert!(index.version_exists(Product::Kots, "1.100.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/replicatedhq/kots/releases/tags/v0.0.1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let index = index(&server, None);
        assert!(!index.version_exists(Product::Kots, "0.0.1").await.unwrap());
        assert!(!index.version_exists(Product::Kots, "0.0.1").await.unwrap());
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let index = index(&server, Some("secret"));
        assert!(index.version_exists(Product::EmbeddedCluster, "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_unexpected_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = index(&server, None)
            .version_exists(Product::Kots, "1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::HttpError { status: 503, .. }));
    }
}
