//! # criteria-terminology
//!
//! FHIR terminology server access for `criteria-mapper`.
//!
//! Term code extraction in `criteria-mapper` expands bound value sets and
//! looks up displays through its `TerminologyService` trait. This crate
//! provides the implementations used in practice.
//!
//! ## Features
//!
//! Each implementation is independently feature-gated:
//!
//! - **`http-client`** (default): [`HttpTerminologyClient`], a blocking
//!   client for `ValueSet/$expand` and `CodeSystem/$lookup`
//! - **`cache`**: [`CachedTerminology`], bounded LRU caches in front of any
//!   service
//! - **`persistence`**: [`persistence::ExpansionSnapshot`], record expansions
//!   once and replay them offline
//! - **`full`**: Enable everything
//!
//! ## Quick Start
//!
//! ### Against a server (feature: `http-client`, `cache`)
//!
//! ```ignore
//! use criteria_mapper::{MapperConfig, MappingSession};
//! use criteria_terminology::{CachedTerminology, HttpTerminologyClient, TerminologyConfig};
//!
//! let config = TerminologyConfig::builder()
//!     .with_base_url("https://ontoserver.example.org/fhir")
//!     .build();
//! let terminology = CachedTerminology::with_config(HttpTerminologyClient::new(config.clone())?, &config);
//!
//! let mapper_config = MapperConfig::builder().with_dataset_dir("resources/fdpg").build();
//! let mut session = MappingSession::new(&mapper_config, &terminology)?;
//! session.run_module("Diagnose")?;
//! println!("{:?}", terminology.stats());
//! ```
//!
//! ### Offline replay (feature: `persistence`)
//!
//! ```ignore
//! use criteria_terminology::persistence::{ExpansionSnapshot, RecordingTerminology};
//!
//! // First run: record everything the server answers
//! let recorder = RecordingTerminology::new(client, Some(base_url));
//! let mut session = MappingSession::new(&mapper_config, &recorder)?;
//! session.run_module("Diagnose")?;
//! drop(session);
//! recorder.into_snapshot().save(Path::new("snapshot"))?;
//!
//! // Later runs: no server needed
//! let replay = ExpansionSnapshot::load(Path::new("snapshot"))?;
//! let mut session = MappingSession::new(&mapper_config, &replay)?;
//! ```
//!
//! ## Failure Handling
//!
//! | Situation | `try_*` methods | `TerminologyService` |
//! |-----------|-----------------|----------------------|
//! | Connection error, timeout | [`TerminologyError::Http`] | empty, `warn!` |
//! | Non-2xx status | [`TerminologyError::Status`] | empty, `warn!` |
//! | Unparseable body | [`TerminologyError::Decode`] | empty, `warn!` |
//! | Value set not recorded | - | empty, `debug!` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
mod response;

// Feature-gated modules
#[cfg(feature = "http-client")]
mod client;

#[cfg(feature = "cache")]
mod cache;

#[cfg(feature = "persistence")]
pub mod persistence;

// Public re-exports
pub use config::{TerminologyConfig, TerminologyConfigBuilder};
pub use error::{TerminologyError, TerminologyResult};
pub use response::{decode_display, decode_expansion};

#[cfg(feature = "http-client")]
pub use client::HttpTerminologyClient;

#[cfg(feature = "cache")]
pub use cache::{CacheStats, CachedTerminology};

#[cfg(feature = "persistence")]
pub use persistence::{ExpansionSnapshot, RecordingTerminology};

// Re-export the service contract for convenience
pub use criteria_mapper::{TermCode, TerminologyService};
