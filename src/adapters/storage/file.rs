//! Directory-backed provider store
//!
//! Layout under the root directory:
//!
//! ```text
//! providers.json              list of providers
//! metadata/{identifier}.xml   stored EML documents
//! upstream/{identifier}.zip   upstream bundles for verbatim publication
//! state/{identifier}.json     publication records
//! ```

use super::traits::{ProviderStore, StateStorage};
use crate::core::state::PublicationRecord;
use crate::domain::{DataProvider, DwcaError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const PROVIDERS_FILE: &str = "providers.json";

pub struct FileProviderStore {
    root: PathBuf,
}

impl FileProviderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self, provider: &DataProvider) -> PathBuf {
        self.root
            .join("metadata")
            .join(format!("{}.xml", provider.identifier))
    }

    fn upstream_path(&self, provider: &DataProvider) -> PathBuf {
        self.root
            .join("upstream")
            .join(format!("{}.zip", provider.identifier))
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    fn state_path(&self, identifier: &str) -> PathBuf {
        self.state_dir().join(format!("{identifier}.json"))
    }

    /// Write the provider list
    pub async fn save_providers(&self, providers: &[DataProvider]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let json = serde_json::to_string_pretty(providers)?;
        tokio::fs::write(self.root.join(PROVIDERS_FILE), json).await?;
        Ok(())
    }
}

/// Read a file, mapping "not found" to `None`
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DwcaError::Storage(format!(
            "Failed to read {}: {e}",
            path.display()
        ))),
    }
}

#[async_trait]
impl ProviderStore for FileProviderStore {
    async fn list_providers(&self) -> Result<Vec<DataProvider>> {
        match read_optional(&self.root.join(PROVIDERS_FILE)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    async fn get_provider(&self, id: i32) -> Result<Option<DataProvider>> {
        Ok(self
            .list_providers()
            .await?
            .into_iter()
            .find(|provider| provider.id == id))
    }

    async fn get_metadata_document(&self, provider: &DataProvider) -> Result<Option<String>> {
        read_optional(&self.metadata_path(provider))
            .await?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|e| {
                    DwcaError::Storage(format!(
                        "Metadata document of {} is not UTF-8: {e}",
                        provider.identifier
                    ))
                })
            })
            .transpose()
    }

    async fn get_upstream_archive(&self, provider: &DataProvider) -> Result<Option<Vec<u8>>> {
        read_optional(&self.upstream_path(provider)).await
    }
}

#[async_trait]
impl StateStorage for FileProviderStore {
    async fn load_publication(&self, identifier: &str) -> Result<Option<PublicationRecord>> {
        match read_optional(&self.state_path(identifier)).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                DwcaError::State(format!("Corrupt publication record for {identifier}: {e}"))
            }),
            None => Ok(None),
        }
    }

    async fn save_publication(&self, record: &PublicationRecord) -> Result<()> {
        tokio::fs::create_dir_all(self.state_dir()).await?;
        let path = self.state_path(&record.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn list_publications(&self) -> Result<Vec<PublicationRecord>> {
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.state_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let bytes = tokio::fs::read(&path).await?;
                match serde_json::from_slice(&bytes) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt publication record")
                    }
                }
            }
        }
        Ok(records)
    }
}
