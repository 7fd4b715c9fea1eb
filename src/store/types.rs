use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schema version written by this build. Anything else triggers migration on load.
pub const SCHEMA_VERSION: u32 = 2;

/// Name given to a bookmark created implicitly by adding an item.
pub const DEFAULT_BOOKMARK_NAME: &str = "Untitled";

/// Prompts kept in `ui.qa.history`.
pub const QA_HISTORY_LIMIT: usize = 20;

pub type BookmarkId = String;
pub type RootId = String;

/// Root persisted object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub schema_version: u32,
    #[serde(default)]
    pub last_saved_at: Option<i64>,
    #[serde(default)]
    pub bookmarks: BTreeMap<BookmarkId, Bookmark>,
    #[serde(default)]
    pub active_bookmark_id: Option<BookmarkId>,
    #[serde(default)]
    pub navigation: NavigationState,
    #[serde(default)]
    pub ui: UiState,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            last_saved_at: None,
            bookmarks: BTreeMap::new(),
            active_bookmark_id: None,
            navigation: NavigationState::default(),
            ui: UiState::default(),
        }
    }
}

impl Document {
    pub fn active_bookmark(&self) -> Option<&Bookmark> {
        self.active_bookmark_id
            .as_ref()
            .and_then(|id| self.bookmarks.get(id))
    }

    pub fn active_bookmark_mut(&mut self) -> Option<&mut Bookmark> {
        let id = self.active_bookmark_id.as_ref()?;
        self.bookmarks.get_mut(id)
    }

    /// Enabled items of the active bookmark, in insertion order.
    pub fn enabled_items(&self) -> Vec<Item> {
        self.active_bookmark()
            .map(|b| b.items.iter().filter(|i| i.enabled()).cloned().collect())
            .unwrap_or_default()
    }

    /// Repair invariants a hand-edited or stale blob may violate.
    /// Returns true if anything changed.
    pub fn validate(&mut self) -> bool {
        let mut changed = false;
        if let Some(id) = &self.active_bookmark_id {
            if !self.bookmarks.contains_key(id) {
                self.active_bookmark_id = None;
                changed = true;
            }
        }
        if self.ui.qa.is_submitting {
            self.ui.qa.is_submitting = false;
            changed = true;
        }
        changed
    }
}

/// A named, ordered collection of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: BookmarkId,
    pub name: String,
    #[serde(default)]
    pub items: Vec<Item>,
    pub created_at: i64,
    pub last_used_at: i64,
    #[serde(default)]
    pub use_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub root: RootId,
    pub path: String,
}

/// 1-based inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRef {
    pub root: RootId,
    pub path: String,
    pub lines: LineRange,
}

/// A bookmark entry: a whole file, or a line span with a frozen copy of its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    File {
        #[serde(rename = "ref")]
        target: FileRef,
        enabled: bool,
    },
    Span {
        #[serde(rename = "ref")]
        target: SpanRef,
        content: String,
        enabled: bool,
    },
}

impl Item {
    pub fn file(root: impl Into<String>, path: impl Into<String>) -> Self {
        Item::File {
            target: FileRef {
                root: root.into(),
                path: path.into(),
            },
            enabled: true,
        }
    }

    pub fn span(
        root: impl Into<String>,
        path: impl Into<String>,
        lines: LineRange,
        content: impl Into<String>,
    ) -> Self {
        Item::Span {
            target: SpanRef {
                root: root.into(),
                path: path.into(),
                lines,
            },
            content: content.into(),
            enabled: true,
        }
    }

    pub fn root(&self) -> &str {
        match self {
            Item::File { target, .. } => &target.root,
            Item::Span { target, .. } => &target.root,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Item::File { target, .. } => &target.path,
            Item::Span { target, .. } => &target.path,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Item::File { enabled, .. } | Item::Span { enabled, .. } => *enabled,
        }
    }

    pub fn set_enabled(&mut self, value: bool) {
        match self {
            Item::File { enabled, .. } | Item::Span { enabled, .. } => *enabled = value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    #[serde(default)]
    pub current_root_id: Option<RootId>,
    #[serde(default)]
    pub roots: BTreeMap<RootId, RootCursor>,
}

/// Browsing position inside one root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCursor {
    #[serde(default)]
    pub current_path: String,
    #[serde(default)]
    pub scroll_offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    #[serde(default = "default_tab")]
    pub active_tab: String,
    #[serde(default = "default_panel_mode")]
    pub left_panel_mode: String,
    #[serde(default)]
    pub qa: QaState,
}

fn default_tab() -> String {
    "context".to_string()
}

fn default_panel_mode() -> String {
    "files".to_string()
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            active_tab: default_tab(),
            left_panel_mode: default_panel_mode(),
            qa: QaState::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaState {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub is_submitting: bool,
    #[serde(default)]
    pub last_response: Option<QaResponse>,
    /// Most recent first.
    #[serde(default)]
    pub history: Vec<String>,
}

/// Outcome of the last QA submission. Exactly one of `answer` / `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_serializes_with_type_tag() {
        let item = Item::span("repo", "src/a.js", LineRange { start: 1, end: 3 }, "x");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "span");
        assert_eq!(json["ref"]["lines"]["start"], 1);
        assert_eq!(json["content"], "x");
        assert_eq!(json["enabled"], true);

        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_document_uses_camel_case_keys() {
        let json = serde_json::to_value(Document::default()).unwrap();
        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert!(json.get("activeBookmarkId").is_some());
        assert_eq!(json["ui"]["activeTab"], "context");
    }

    #[test]
    fn test_validate_clears_dangling_active_id() {
        let mut doc = Document {
            active_bookmark_id: Some("bm_missing".to_string()),
            ..Default::default()
        };
        doc.ui.qa.is_submitting = true;
        assert!(doc.validate());
        assert!(doc.active_bookmark_id.is_none());
        assert!(!doc.ui.qa.is_submitting);
        assert!(!doc.validate());
    }

    #[test]
    fn test_enabled_items_without_active_bookmark() {
        assert!(Document::default().enabled_items().is_empty());
    }
}
