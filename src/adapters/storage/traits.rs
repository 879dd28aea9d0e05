//! Provider metadata and publication state storage traits

use crate::core::state::PublicationRecord;
use crate::domain::{DataProvider, Result};
use async_trait::async_trait;

/// Source of provider configuration and per-provider artifacts
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// All configured providers
    async fn list_providers(&self) -> Result<Vec<DataProvider>>;

    /// Provider by numeric id
    async fn get_provider(&self, id: i32) -> Result<Option<DataProvider>>;

    /// The provider's dataset metadata (EML) document, if one is stored
    async fn get_metadata_document(&self, provider: &DataProvider) -> Result<Option<String>>;

    /// The provider's own pre-built bundle, for verbatim publication
    async fn get_upstream_archive(&self, provider: &DataProvider) -> Result<Option<Vec<u8>>>;
}

/// Persistence of publication records
///
/// # Errors
///
/// Implementations return `DwcaError::Storage` or `DwcaError::State` when the
/// backend cannot be read or written. A missing record is `Ok(None)`.
#[async_trait]
pub trait StateStorage: Send + Sync {
    async fn load_publication(&self, identifier: &str) -> Result<Option<PublicationRecord>>;

    async fn save_publication(&self, record: &PublicationRecord) -> Result<()>;

    async fn list_publications(&self) -> Result<Vec<PublicationRecord>>;
}
