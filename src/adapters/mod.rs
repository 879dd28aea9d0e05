//! External system integrations.
//!
//! - [`search`] - Observation search backend (Elasticsearch) used by full exports
//! - [`storage`] - Provider metadata, upstream bundles and publication records
//!
//! # Design Pattern
//!
//! Adapters isolate external systems behind async traits
//! ([`search::SearchBackend`], [`storage::ProviderStore`],
//! [`storage::StateStorage`]) so the core can be tested with in-memory fakes.
//!
//! ```rust,no_run
//! use dwca_publisher::adapters::search::{create_search_backend, SearchFilter};
//! use dwca_publisher::config::SearchConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = create_search_backend(&SearchConfig::default())?;
//! let expected = backend.count(&SearchFilter::for_provider(1)).await?;
//! println!("{expected} observations");
//! # Ok(())
//! # }
//! ```

pub mod search;
pub mod storage;
