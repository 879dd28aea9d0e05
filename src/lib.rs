// DwC-A Publisher - Darwin Core Archive publication tool
// Copyright (c) 2025 DwC-A Publisher Contributors
// Licensed under the MIT License

//! # DwC-A Publisher
//!
//! Builds Darwin Core Archive bundles from biodiversity observations and
//! publishes only the bundles whose content changed since the last run.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Writing** observations into per-source working sets, batch by batch and
//!   concurrently, with run-wide deduplication of event-archive rows
//! - **Assembling** zip bundles with a schema descriptor (`meta.xml`), dataset
//!   metadata (`eml.xml`) and optional process metadata
//! - **Detecting change** with a fingerprint that ignores the publication date
//! - **Exporting** a single bundle straight from an Elasticsearch index using
//!   point-in-time pagination and a completeness check
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Archive format, publication runs and publication state
//! - [`adapters`] - Search backend and provider/state storage
//! - [`domain`] - Observations, providers, identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dwca_publisher::adapters::storage::FileProviderStore;
//! use dwca_publisher::config::load_config;
//! use dwca_publisher::core::export::PublicationCoordinator;
//! use dwca_publisher::core::state::StateManager;
//! use dwca_publisher::domain::{DataProvider, Observation};
//! use std::sync::Arc;
//!
//! # async fn example(records: Vec<Observation>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("dwca-publisher.toml")?;
//! let store = Arc::new(FileProviderStore::new(&config.storage.root));
//! let state = Arc::new(StateManager::new_with_storage(store.clone()));
//! let (_tx, shutdown) = tokio::sync::watch::channel(false);
//!
//! let coordinator = PublicationCoordinator::new(config.archive, store, state, shutdown);
//! coordinator.begin_run()?;
//!
//! let provider = DataProvider::new(1, "artportalen");
//! coordinator.write_batch(records, &provider, "artportalen-00001").await;
//!
//! let summary = coordinator.finalize_run(None).await?;
//! println!("{} bundle(s) published", summary.changed_bundles().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::Result`], whose error type is
//! [`domain::DwcaError`]. Per-batch failures do not abort a run; they are
//! collected in the [`core::export::PublicationSummary`].
//!
//! ## Logging
//!
//! Structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! tracing::info!(source = "artportalen", rows = 1200, "Batch written");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
