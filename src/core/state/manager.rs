//! State manager for publication record persistence

use crate::adapters::storage::StateStorage;
use crate::core::state::publication::{PublicationRecord, PublicationRecordBuilder};
use crate::domain::{DataProvider, Result};
use std::sync::Arc;

/// Loads and saves publication records through a storage backend
pub struct StateManager {
    storage: Arc<dyn StateStorage>,
}

impl StateManager {
    pub fn new_with_storage(storage: Arc<dyn StateStorage>) -> Self {
        Self { storage }
    }

    /// Stored record for a provider, or a fresh never-published one
    pub async fn load_or_default(&self, provider: &DataProvider) -> Result<PublicationRecord> {
        Ok(self
            .storage
            .load_publication(&provider.identifier)
            .await?
            .unwrap_or_else(|| PublicationRecordBuilder::new(provider).build()))
    }

    pub async fn load_publication(&self, identifier: &str) -> Result<Option<PublicationRecord>> {
        self.storage.load_publication(identifier).await
    }

    pub async fn save_publication(&self, record: &PublicationRecord) -> Result<()> {
        tracing::debug!(
            source = %record.id,
            status = ?record.status,
            fingerprint = ?record.fingerprint.map(|f| f.value()),
            "Saving publication record"
        );
        self.storage.save_publication(record).await
    }

    /// All stored records, sorted by source identifier
    pub async fn list_publications(&self) -> Result<Vec<PublicationRecord>> {
        let mut records = self.storage.list_publications().await?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::FileProviderStore;
    use crate::core::state::PublicationStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_or_default_then_save() {
        let dir = TempDir::new().unwrap();
        let manager = StateManager::new_with_storage(Arc::new(FileProviderStore::new(dir.path())));
        let provider = DataProvider::new(3, "sers");

        let mut record = manager.load_or_default(&provider).await.unwrap();
        assert_eq!(record.status, PublicationStatus::NeverPublished);

        record.mark_published("99".parse().unwrap());
        manager.save_publication(&record).await.unwrap();

        let loaded = manager.load_publication("sers").await.unwrap().unwrap();
        assert_eq!(loaded.fingerprint, record.fingerprint);
        assert_eq!(manager.list_publications().await.unwrap().len(), 1);
    }
}
