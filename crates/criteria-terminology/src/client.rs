//! Blocking HTTP client for a FHIR terminology server.

use criteria_mapper::{TermCode, TerminologyService};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TerminologyConfig;
use crate::error::{TerminologyError, TerminologyResult};
use crate::response::{decode_display, decode_expansion};

/// Talks to `ValueSet/$expand` and `CodeSystem/$lookup` of one server.
///
/// The `try_*` methods report errors; the [`TerminologyService`]
/// implementation logs them and answers with an empty result.
///
/// # Example
///
/// ```rust,no_run
/// use criteria_mapper::TerminologyService;
/// use criteria_terminology::{HttpTerminologyClient, TerminologyConfig};
///
/// let config = TerminologyConfig::builder()
///     .with_base_url("https://ontoserver.example.org/fhir")
///     .build();
/// let client = HttpTerminologyClient::new(config)?;
/// let codes = client.expand_value_set("http://fhir.de/ValueSet/bfarm/icd-10-gm", Some("2024"));
/// # Ok::<(), criteria_terminology::TerminologyError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HttpTerminologyClient {
    http: Client,
    config: TerminologyConfig,
}

impl HttpTerminologyClient {
    /// Creates a client with the configured timeout.
    pub fn new(config: TerminologyConfig) -> TerminologyResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| TerminologyError::Http {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self { http, config })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TerminologyConfig {
        &self.config
    }

    /// Expands a value set.
    pub fn try_expand(&self, url: &str, version: Option<&str>) -> TerminologyResult<Vec<TermCode>> {
        let mut query = vec![("url", url)];
        if let Some(version) = version {
            query.push(("version", version));
        }
        let body = self.get("ValueSet/$expand", &query)?;
        let codes = decode_expansion(&body);
        debug!(value_set = %url, codes = codes.len(), "Expanded value set");
        Ok(codes)
    }

    /// Looks up the display of a code.
    pub fn try_lookup(&self, system: &str, code: &str) -> TerminologyResult<Option<String>> {
        let body = self.get("CodeSystem/$lookup", &[("system", system), ("code", code)])?;
        Ok(decode_display(&body))
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> TerminologyResult<Value> {
        let url = self.config.endpoint(path);
        let http_err = |source| TerminologyError::Http {
            url: url.clone(),
            source,
        };
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, &self.config.accept)
            .query(query)
            .send()
            .map_err(http_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TerminologyError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let text = response.text().map_err(http_err)?;
        serde_json::from_str(&text).map_err(|source| TerminologyError::Decode { url, source })
    }
}

impl TerminologyService for HttpTerminologyClient {
    fn lookup_display(&self, system: &str, code: &str) -> Option<String> {
        match self.try_lookup(system, code) {
            Ok(display) => display,
            Err(error) => {
                warn!(system = %system, code = %code, error = %error, "Code lookup failed");
                None
            }
        }
    }

    fn expand_value_set(&self, url: &str, version: Option<&str>) -> Vec<TermCode> {
        match self.try_expand(url, version) {
            Ok(codes) => codes,
            Err(error) => {
                warn!(value_set = %url, error = %error, "Value set expansion failed");
                Vec::new()
            }
        }
    }
}
