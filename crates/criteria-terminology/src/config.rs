//! Configuration for terminology access.

use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of cached lookups and expansions.
pub const DEFAULT_CACHE_SIZE: usize = 10_000;

/// Media type requested from the server.
pub const FHIR_JSON: &str = "application/fhir+json";

/// Terminology server settings.
///
/// # Example
///
/// ```rust
/// use criteria_terminology::TerminologyConfig;
/// use std::time::Duration;
///
/// let config = TerminologyConfig::builder()
///     .with_base_url("https://ontoserver.example.org/fhir/")
///     .with_timeout(Duration::from_secs(10))
///     .with_cache_size(500)
///     .build();
/// assert_eq!(config.base_url, "https://ontoserver.example.org/fhir");
/// ```
#[derive(Debug, Clone)]
pub struct TerminologyConfig {
    /// Base URL of the FHIR terminology server, without trailing slash.
    pub base_url: String,
    /// Timeout applied to every request.
    pub timeout: Duration,
    /// Value of the `Accept` header.
    pub accept: String,
    /// Capacity of each cache of `CachedTerminology`; `0` disables caching.
    pub cache_size: usize,
}

impl Default for TerminologyConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/fhir".to_string(),
            timeout: DEFAULT_TIMEOUT,
            accept: FHIR_JSON.to_string(),
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl TerminologyConfig {
    /// Creates a new builder for TerminologyConfig.
    pub fn builder() -> TerminologyConfigBuilder {
        TerminologyConfigBuilder::default()
    }

    /// Joins an operation path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Builder for TerminologyConfig.
#[derive(Debug, Clone, Default)]
pub struct TerminologyConfigBuilder {
    config: TerminologyConfig,
}

impl TerminologyConfigBuilder {
    /// Sets the server base URL. Trailing slashes are removed.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the `Accept` header.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.config.accept = accept.into();
        self
    }

    /// Sets the cache capacity.
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size;
        self
    }

    /// Builds the TerminologyConfig.
    pub fn build(self) -> TerminologyConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TerminologyConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.cache_size, 10_000);
        assert_eq!(config.accept, "application/fhir+json");
    }

    #[test]
    fn test_endpoint_joins_once() {
        let config = TerminologyConfig::builder()
            .with_base_url("http://tx.example.org/fhir//")
            .build();
        assert_eq!(
            config.endpoint("/ValueSet/$expand"),
            "http://tx.example.org/fhir/ValueSet/$expand"
        );
        assert_eq!(
            config.endpoint("CodeSystem/$lookup"),
            "http://tx.example.org/fhir/CodeSystem/$lookup"
        );
    }
}
