use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::migrate::{self, legacy_key, LegacyBlobs, LEGACY_KEYS};
use super::types::{Document, SCHEMA_VERSION};
use super::{KvStore, STATE_PREFIX};

/// Only the version tag, so an unreadable document still reports what it is.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    #[serde(default)]
    schema_version: Option<u32>,
}

/// Loads and saves one scope's `Document`, migrating legacy layouts on the way in.
#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KvStore>,
    scope: String,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KvStore>, scope: impl Into<String>) -> Self {
        Self {
            kv,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn document_key(&self) -> String {
        format!("{}/{}/document", STATE_PREFIX, self.scope)
    }

    /// Never fails: unreadable storage or a failed migration yields a default document.
    pub async fn load(&self) -> Document {
        let key = self.document_key();
        let stale = match self.kv.get(&key).await {
            Ok(Some(bytes)) => match Self::parse_current(&bytes) {
                Ok(Some(mut doc)) => {
                    if doc.validate() {
                        debug!(scope = %self.scope, "repaired loaded document");
                    }
                    debug!(scope = %self.scope, bookmarks = doc.bookmarks.len(), "document loaded");
                    return doc;
                }
                Ok(None) => true,
                Err(e) => {
                    warn!(scope = %self.scope, "stored document unreadable: {:#}", e);
                    true
                }
            },
            Ok(None) => false,
            Err(e) => {
                warn!(scope = %self.scope, "document read failed, using defaults: {:#}", e);
                return Document::default();
            }
        };

        let blobs = match self.read_legacy().await {
            Ok(blobs) => blobs,
            Err(e) => {
                warn!(scope = %self.scope, "legacy read failed, using defaults: {:#}", e);
                return Document::default();
            }
        };
        if blobs.is_empty() {
            if stale {
                info!(scope = %self.scope, "outdated document discarded");
            }
            return Document::default();
        }

        let doc = match migrate::migrate_legacy(&blobs, chrono::Utc::now().timestamp_millis()) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(scope = %self.scope, "legacy migration failed, using defaults: {:#}", e);
                return Document::default();
            }
        };

        // Legacy keys go only once the new document is durable.
        if let Err(e) = self.save(&doc).await {
            warn!(scope = %self.scope, "migrated document not saved: {:#}", e);
            return doc;
        }
        for name in blobs.values.keys() {
            if let Err(e) = self.kv.remove(&legacy_key(&self.scope, name)).await {
                warn!(scope = %self.scope, legacy = name, "legacy key not removed: {:#}", e);
            }
        }
        info!(
            scope = %self.scope,
            bookmarks = doc.bookmarks.len(),
            roots = doc.navigation.roots.len(),
            "legacy state migrated"
        );
        doc
    }

    pub async fn save(&self, doc: &Document) -> Result<()> {
        let mut snapshot = doc.clone();
        snapshot.last_saved_at = Some(chrono::Utc::now().timestamp_millis());
        let bytes = serde_json::to_vec(&snapshot).context("serialize document")?;
        self.kv.set(&self.document_key(), bytes).await
    }

    /// `Ok(None)` when the blob carries a different version.
    fn parse_current(bytes: &[u8]) -> Result<Option<Document>> {
        let probe: VersionProbe = serde_json::from_slice(bytes).context("parse version tag")?;
        if probe.schema_version != Some(SCHEMA_VERSION) {
            return Ok(None);
        }
        let doc: Document = serde_json::from_slice(bytes).context("parse document")?;
        Ok(Some(migrate::upgrade(doc)))
    }

    async fn read_legacy(&self) -> Result<LegacyBlobs> {
        let mut blobs = LegacyBlobs::default();
        for name in LEGACY_KEYS {
            if let Some(bytes) = self.kv.get(&legacy_key(&self.scope, name)).await? {
                blobs.values.insert(name, bytes);
            }
        }
        Ok(blobs)
    }
}
