//! Conversion of the pre-versioned layout into the current `Document`.
//!
//! The old layout spread state over several keys: per-root navigation
//! ("contexts"), the current root, and "saved contexts" that kept files and
//! spans in two separate lists. Each saved context becomes a bookmark whose
//! items are its files followed by its spans, all enabled.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::types::{Bookmark, BookmarkId, Document, Item, LineRange, RootCursor, SCHEMA_VERSION};
use super::LEGACY_PREFIX;
use crate::bookmarks::item_key;

pub const LEGACY_CONTEXTS: &str = "contexts";
pub const LEGACY_SAVED_CONTEXTS: &str = "saved_contexts";
pub const LEGACY_CURRENT_CONTEXT: &str = "current_context";

pub const LEGACY_KEYS: [&str; 3] = [LEGACY_CONTEXTS, LEGACY_SAVED_CONTEXTS, LEGACY_CURRENT_CONTEXT];

pub fn legacy_key(scope: &str, name: &str) -> String {
    format!("{}/{}/{}", LEGACY_PREFIX, scope, name)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyContext {
    #[serde(default)]
    path: String,
    #[serde(default)]
    scroll_top: u64,
    #[serde(default)]
    selected_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyFile {
    root: String,
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySpan {
    root: String,
    path: String,
    start_line: usize,
    end_line: usize,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySavedContext {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    files: Vec<LegacyFile>,
    #[serde(default)]
    spans: Vec<LegacySpan>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    last_used: Option<i64>,
    #[serde(default)]
    use_count: u64,
}

/// Raw values found under the legacy keys, keyed by legacy name.
#[derive(Debug, Default)]
pub struct LegacyBlobs {
    pub values: BTreeMap<&'static str, Vec<u8>>,
}

impl LegacyBlobs {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.values.get(name) {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .with_context(|| format!("parse legacy {}", name)),
            None => Ok(None),
        }
    }
}

/// Legacy ids move into the `bm_` namespace. The rewrite is deterministic so a
/// retried migration produces the same ids.
pub fn legacy_bookmark_id(legacy_id: &str) -> BookmarkId {
    let hash = blake3::hash(format!("legacy:{}", legacy_id).as_bytes());
    format!("bm_{}", &hash.to_hex()[..12])
}

/// Build a current-version document from legacy blobs.
pub fn migrate_legacy(blobs: &LegacyBlobs, now: i64) -> Result<Document> {
    let mut doc = Document::default();

    if let Some(contexts) = blobs.parse::<BTreeMap<String, LegacyContext>>(LEGACY_CONTEXTS)? {
        for (root, ctx) in contexts {
            doc.navigation.roots.insert(
                root,
                RootCursor {
                    current_path: ctx.path,
                    scroll_offset: ctx.scroll_top,
                    selected_file_path: ctx.selected_file,
                },
            );
        }
    }

    if let Some(current) = blobs.parse::<String>(LEGACY_CURRENT_CONTEXT)? {
        doc.navigation.roots.entry(current.clone()).or_default();
        doc.navigation.current_root_id = Some(current);
    }

    if let Some(saved) = blobs.parse::<Vec<LegacySavedContext>>(LEGACY_SAVED_CONTEXTS)? {
        for legacy in saved {
            let id = legacy_bookmark_id(&legacy.id);
            if doc.bookmarks.contains_key(&id) {
                warn!(legacy_id = %legacy.id, "duplicate legacy saved context skipped");
                continue;
            }

            let files = legacy.files.into_iter().map(|f| Item::file(f.root, f.path));
            let spans = legacy.spans.into_iter().map(|s| {
                let lines = LineRange {
                    start: s.start_line,
                    end: s.end_line.max(s.start_line),
                };
                Item::span(s.root, s.path, lines, s.text)
            });

            let mut seen = HashSet::new();
            let items: Vec<Item> = files
                .chain(spans)
                .filter(|item| seen.insert(item_key(item)))
                .collect();

            let created_at = legacy.created_at.unwrap_or(now);
            let name = if legacy.name.trim().is_empty() {
                legacy.id.clone()
            } else {
                legacy.name
            };
            debug!(bookmark = %id, items = items.len(), "legacy saved context converted");
            doc.bookmarks.insert(
                id.clone(),
                Bookmark {
                    id,
                    name,
                    items,
                    created_at,
                    last_used_at: legacy.last_used.unwrap_or(created_at),
                    use_count: legacy.use_count,
                },
            );
        }
    }

    Ok(doc)
}

/// Bring a parsed document to the current version. Current documents pass
/// through untouched; anything else is replaced by a fresh default.
pub fn upgrade(doc: Document) -> Document {
    if doc.schema_version == SCHEMA_VERSION {
        return doc;
    }
    warn!(
        found = doc.schema_version,
        expected = SCHEMA_VERSION,
        "unknown document version, starting fresh"
    );
    Document::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(entries: &[(&'static str, serde_json::Value)]) -> LegacyBlobs {
        let mut blobs = LegacyBlobs::default();
        for (name, value) in entries {
            blobs
                .values
                .insert(*name, serde_json::to_vec(value).unwrap());
        }
        blobs
    }

    #[test]
    fn test_migrate_contexts_into_navigation() {
        let blobs = blobs(&[
            (
                LEGACY_CONTEXTS,
                serde_json::json!({
                    "docs": {"path": "guides", "scrollTop": 120, "selectedFile": "guides/intro.md"},
                    "src": {"path": ""}
                }),
            ),
            (LEGACY_CURRENT_CONTEXT, serde_json::json!("docs")),
        ]);
        let doc = migrate_legacy(&blobs, 1000).unwrap();

        assert_eq!(doc.schema_version, SCHEMA_VERSION);
        assert_eq!(doc.navigation.current_root_id.as_deref(), Some("docs"));
        let docs = &doc.navigation.roots["docs"];
        assert_eq!(docs.current_path, "guides");
        assert_eq!(docs.scroll_offset, 120);
        assert_eq!(docs.selected_file_path.as_deref(), Some("guides/intro.md"));
        assert_eq!(doc.navigation.roots["src"], RootCursor::default());
    }

    #[test]
    fn test_migrate_saved_contexts_into_bookmarks() {
        let blobs = blobs(&[(
            LEGACY_SAVED_CONTEXTS,
            serde_json::json!([{
                "id": "ctx-1",
                "name": "Parser work",
                "files": [{"root": "src", "path": "parse.rs"}, {"root": "src", "path": "parse.rs"}],
                "spans": [{"root": "src", "path": "lex.rs", "startLine": 4, "endLine": 9, "text": "fn lex()"}],
                "createdAt": 10,
                "useCount": 3
            }]),
        )]);
        let doc = migrate_legacy(&blobs, 1000).unwrap();

        let id = legacy_bookmark_id("ctx-1");
        assert!(id.starts_with("bm_"));
        let bookmark = &doc.bookmarks[&id];
        assert_eq!(bookmark.name, "Parser work");
        assert_eq!(bookmark.created_at, 10);
        assert_eq!(bookmark.last_used_at, 10);
        assert_eq!(bookmark.use_count, 3);
        assert_eq!(bookmark.items.len(), 2);
        assert_eq!(bookmark.items[0], Item::file("src", "parse.rs"));
        assert_eq!(
            bookmark.items[1],
            Item::span("src", "lex.rs", LineRange { start: 4, end: 9 }, "fn lex()")
        );
        assert!(bookmark.items.iter().all(Item::enabled));
        assert!(doc.active_bookmark_id.is_none());
    }

    #[test]
    fn test_migrate_rejects_malformed_blob() {
        let blobs = blobs(&[(LEGACY_SAVED_CONTEXTS, serde_json::json!({"not": "a list"}))]);
        assert!(migrate_legacy(&blobs, 0).is_err());
    }

    #[test]
    fn test_legacy_id_rewrite_is_stable() {
        assert_eq!(legacy_bookmark_id("a"), legacy_bookmark_id("a"));
        assert_ne!(legacy_bookmark_id("a"), legacy_bookmark_id("b"));
    }

    #[test]
    fn test_upgrade_leaves_current_document_unchanged() {
        let mut doc = Document::default();
        doc.bookmarks.insert(
            "bm_1".to_string(),
            Bookmark {
                id: "bm_1".to_string(),
                name: "keep".to_string(),
                items: vec![Item::file("r", "a.rs")],
                created_at: 1,
                last_used_at: 2,
                use_count: 5,
            },
        );
        doc.active_bookmark_id = Some("bm_1".to_string());
        assert_eq!(upgrade(doc.clone()), doc);
    }

    #[test]
    fn test_upgrade_replaces_unknown_version() {
        let doc = Document {
            schema_version: 99,
            active_bookmark_id: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(upgrade(doc), Document::default());
    }
}
