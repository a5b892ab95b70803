//! Registry HTTP client
//!
//! Provides a blocking HTTP client for the package registry.

use super::api::PackageMetadata;
use super::{PackageRegistry, RegistryError, Release};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default registry URL
pub const DEFAULT_REGISTRY: &str = "https://registry.nest.dev/api/v1";

/// Registry client for interacting with a remote package registry
pub struct HttpRegistry {
    /// HTTP client
    client: Client,

    /// Base URL for the registry (always ends with '/')
    base_url: Url,
}

impl HttpRegistry {
    /// Create a new registry client with default URL
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_url(DEFAULT_REGISTRY)
    }

    /// Create a new registry client with a custom URL
    pub fn with_url(base_url: &str) -> Result<Self, RegistryError> {
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url =
            Url::parse(&normalized).map_err(|e| RegistryError::InvalidUrl(format!("{base_url}: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("nest-pm/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Registry base URL
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Get package metadata
    ///
    /// GET /packages/{name}
    pub fn get_package(&self, name: &str) -> Result<PackageMetadata, RegistryError> {
        let url = format!("{}packages/{}", self.base_url, encode_package_name(name));
        debug!(%url, "fetching package metadata");

        let response = self.client.get(&url).send()?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::PackageNotFound(name.to_string()));
        }

        if !response.status().is_success() {
            return Err(RegistryError::Unavailable(format!(
                "Registry returned status {}",
                response.status()
            )));
        }

        let metadata: PackageMetadata = response.json()?;
        Ok(metadata)
    }

    /// Resolve a download URL published by the registry against its base
    fn absolute_url(&self, url: &str) -> Result<String, RegistryError> {
        self.base_url
            .join(url)
            .map(String::from)
            .map_err(|e| RegistryError::InvalidUrl(format!("{url}: {e}")))
    }
}

impl PackageRegistry for HttpRegistry {
    fn fetch_metadata(&self, name: &str) -> Result<Vec<Release>, RegistryError> {
        self.get_package(name)?
            .into_releases(|url| self.absolute_url(url))
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, RegistryError> {
        debug!(%url, "downloading archive");
        let response = self.client.get(url).send()?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::DownloadNotFound(url.to_string()));
        }

        if !response.status().is_success() {
            return Err(RegistryError::Unavailable(format!(
                "Download failed with status {}",
                response.status()
            )));
        }

        let bytes = response.bytes()?.to_vec();
        Ok(bytes)
    }
}

/// Encode a package name for URL path
///
/// Handles scoped packages (@org/name) by encoding the @ and /
fn encode_package_name(name: &str) -> String {
    if name.starts_with('@') {
        // Scoped package: @org/name -> @org%2Fname
        name.replacen('/', "%2F", 1)
    } else {
        name.to_string()
    }
}
