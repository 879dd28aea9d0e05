//! Core publication logic.
//!
//! # Modules
//!
//! - [`archive`] - Schema registry, row and part writers, descriptor and
//!   metadata generation, bundle assembly and fingerprints
//! - [`export`] - Publication coordinator and single-shot search export
//! - [`state`] - Persisted publication records per source
//!
//! # Publication Workflow
//!
//! 1. **Begin**: reset the run (working sets, dedup ledger)
//! 2. **Write batches**: callers append observation batches per source,
//!    possibly concurrently
//! 3. **Assemble**: one bundle per source, an event bundle for event-emitting
//!    sources and a combined bundle
//! 4. **Diff**: compare each source's fingerprint with the stored one
//! 5. **Publish**: move changed bundles into the export folder
//! 6. **Clean up**: remove every working file
//!
//! # Example
//!
//! ```rust,no_run
//! use dwca_publisher::adapters::storage::FileProviderStore;
//! use dwca_publisher::config::ArchiveConfig;
//! use dwca_publisher::core::export::PublicationCoordinator;
//! use dwca_publisher::core::state::StateManager;
//! use dwca_publisher::domain::DataProvider;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileProviderStore::new("data"));
//! let state = Arc::new(StateManager::new_with_storage(store.clone()));
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let coordinator =
//!     PublicationCoordinator::new(ArchiveConfig::default(), store, state, shutdown_rx);
//!
//! coordinator.begin_run()?;
//! let provider = DataProvider::new(1, "artportalen");
//! coordinator.write_batch(Vec::new(), &provider, "shard-0").await;
//! let summary = coordinator.finalize_run(None).await?;
//!
//! for path in summary.changed_bundles() {
//!     println!("Published {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod export;
pub mod state;
