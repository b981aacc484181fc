//! Label lookup and idempotent creation against a per-run label cache
use crate::client::GmailClient;
use crate::error::{Result, TriageError};
use crate::models::{EmailCategory, LabelInfo};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Label list memoized for the lifetime of one run
///
/// Create one per run (or per single-batch invocation) and pass it by
/// reference; nothing survives between runs. The list is fetched from Gmail
/// on first use and extended in place as labels are created.
#[derive(Debug, Default)]
pub struct LabelCache {
    labels: Mutex<Option<Vec<LabelInfo>>>,
}

impl LabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the label list has been fetched yet
    pub async fn is_loaded(&self) -> bool {
        self.labels.lock().await.is_some()
    }
}

fn find_by_name<'a>(labels: &'a [LabelInfo], name: &str) -> Option<&'a LabelInfo> {
    labels
        .iter()
        .find(|label| label.name.eq_ignore_ascii_case(name.trim()))
}

/// Resolves label names to Gmail label ids, creating missing labels
#[derive(Clone)]
pub struct LabelResolver {
    client: Arc<dyn GmailClient>,
}

impl LabelResolver {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self { client }
    }

    /// Returns every label in the account, fetching at most once per cache
    pub async fn list_all_labels(&self, cache: &LabelCache) -> Result<Vec<LabelInfo>> {
        let mut guard = cache.labels.lock().await;
        let labels = self.ensure_loaded(&mut guard).await?;
        Ok(labels.clone())
    }

    /// Ids of the existing labels that belong to a managed category
    pub async fn list_owned_label_ids(&self, cache: &LabelCache) -> Result<Vec<String>> {
        let mut guard = cache.labels.lock().await;
        let labels = self.ensure_loaded(&mut guard).await?;

        Ok(labels
            .iter()
            .filter(|label| EmailCategory::from_label_name(&label.name).is_some())
            .map(|label| label.id.clone())
            .collect())
    }

    /// Gets a label id by name (case-insensitive), creating the label if necessary
    ///
    /// The cache lock is held from lookup through creation and insertion, so
    /// concurrent resolutions of the same missing name create it once.
    pub async fn resolve_label_id(&self, cache: &LabelCache, name: &str) -> Result<String> {
        let mut guard = cache.labels.lock().await;
        let labels = self.ensure_loaded(&mut guard).await?;

        if let Some(existing) = find_by_name(labels, name) {
            debug!("Label '{}' already exists in cache", existing.name);
            return Ok(existing.id.clone());
        }

        info!("Creating label: {}", name);
        let label_id = self.client.create_label(name).await.map_err(|e| {
            TriageError::LabelError(format!("Failed to create label '{}': {}", name, e))
        })?;

        labels.push(LabelInfo {
            id: label_id.clone(),
            name: name.to_string(),
        });

        info!("Created label '{}' with ID: {}", name, label_id);
        Ok(label_id)
    }

    async fn ensure_loaded<'a>(
        &self,
        slot: &'a mut Option<Vec<LabelInfo>>,
    ) -> Result<&'a mut Vec<LabelInfo>> {
        let labels = match slot.take() {
            Some(labels) => labels,
            None => {
                let labels = self.client.list_labels().await.map_err(|e| {
                    TriageError::LabelError(format!("Failed to list labels: {}", e))
                })?;
                info!("Loaded {} existing labels into cache", labels.len());
                labels
            }
        };

        Ok(slot.insert(labels))
    }
}
