pub mod span;

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::store::types::{Bookmark, BookmarkId, Document, Item, DEFAULT_BOOKMARK_NAME};

/// Joins the parts of an item key. Root ids and paths never contain it.
pub const KEY_SEPARATOR: &str = "::";

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stable identity of an item's reference. Spans include their line range,
/// so the same range selected twice maps to the same key.
pub fn item_key(item: &Item) -> String {
    match item {
        Item::File { target, .. } => format!("{}{}{}", target.root, KEY_SEPARATOR, target.path),
        Item::Span { target, .. } => format!(
            "{}{sep}{}{sep}{},{}",
            target.root,
            target.path,
            target.lines.start,
            target.lines.end,
            sep = KEY_SEPARATOR
        ),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn new_bookmark_id(name: &str) -> BookmarkId {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let hash = blake3::hash(format!("{}:{}:{}", name, nanos, seq).as_bytes());
    format!("bm_{}", &hash.to_hex()[..12])
}

/// CRUD over the bookmarks of one document. Unknown ids and duplicate items
/// are silent no-ops; the return values only report whether anything changed.
pub struct BookmarkRepository<'a> {
    doc: &'a mut Document,
}

impl<'a> BookmarkRepository<'a> {
    pub fn new(doc: &'a mut Document) -> Self {
        Self { doc }
    }

    /// Insert an empty bookmark and make it the active one.
    pub fn create(&mut self, name: &str) -> BookmarkId {
        let mut id = new_bookmark_id(name);
        while self.doc.bookmarks.contains_key(&id) {
            id = new_bookmark_id(name);
        }
        let now = now_millis();
        self.doc.bookmarks.insert(
            id.clone(),
            Bookmark {
                id: id.clone(),
                name: name.to_string(),
                items: Vec::new(),
                created_at: now,
                last_used_at: now,
                use_count: 0,
            },
        );
        self.set_active(Some(&id));
        debug!(bookmark = %id, name, "bookmark created");
        id
    }

    pub fn rename(&mut self, id: &str, name: &str) -> bool {
        match self.doc.bookmarks.get_mut(id) {
            Some(bookmark) => {
                bookmark.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Remove a bookmark. Deleting the active one leaves nothing active.
    pub fn delete(&mut self, id: &str) -> bool {
        if self.doc.bookmarks.remove(id).is_none() {
            return false;
        }
        if self.doc.active_bookmark_id.as_deref() == Some(id) {
            self.doc.active_bookmark_id = None;
        }
        debug!(bookmark = id, "bookmark deleted");
        true
    }

    /// Select a bookmark, bumping its usage stats. `None` or an unknown id
    /// clears the selection without touching any stats.
    pub fn set_active(&mut self, id: Option<&str>) -> bool {
        match id.and_then(|id| self.doc.bookmarks.get_mut(id)) {
            Some(bookmark) => {
                bookmark.use_count += 1;
                bookmark.last_used_at = now_millis();
                let id = bookmark.id.clone();
                self.doc.active_bookmark_id = Some(id);
                true
            }
            None => {
                self.doc.active_bookmark_id = None;
                false
            }
        }
    }

    /// Append to the active bookmark, creating an `Untitled` one if none is active.
    /// Returns false when an item with the same key is already present.
    pub fn add_item(&mut self, item: Item) -> bool {
        if self.doc.active_bookmark().is_none() {
            self.create(DEFAULT_BOOKMARK_NAME);
        }
        let key = item_key(&item);
        let Some(bookmark) = self.doc.active_bookmark_mut() else {
            return false;
        };
        if bookmark.items.iter().any(|existing| item_key(existing) == key) {
            return false;
        }
        bookmark.items.push(item);
        true
    }

    pub fn remove_item(&mut self, key: &str) -> bool {
        let Some(bookmark) = self.doc.active_bookmark_mut() else {
            return false;
        };
        let before = bookmark.items.len();
        bookmark.items.retain(|item| item_key(item) != key);
        bookmark.items.len() != before
    }

    /// Flip an item's enabled flag. Returns the new state, `None` if absent.
    pub fn toggle_enabled(&mut self, key: &str) -> Option<bool> {
        let item = self
            .doc
            .active_bookmark_mut()?
            .items
            .iter_mut()
            .find(|item| item_key(item) == key)?;
        let enabled = !item.enabled();
        item.set_enabled(enabled);
        Some(enabled)
    }

    pub fn active(&self) -> Option<&Bookmark> {
        self.doc.active_bookmark()
    }

    pub fn enabled_items(&self) -> Vec<Item> {
        self.doc.enabled_items()
    }

    /// Every item of the active bookmark with its key, in order.
    pub fn items(&self) -> Vec<(String, &Item)> {
        self.active()
            .map(|b| b.items.iter().map(|item| (item_key(item), item)).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<&Bookmark> {
        self.doc.bookmarks.get(id)
    }

    /// Most recently used first, then by name.
    pub fn list(&self) -> Vec<&Bookmark> {
        let mut bookmarks: Vec<&Bookmark> = self.doc.bookmarks.values().collect();
        bookmarks.sort_by(|a, b| {
            b.last_used_at
                .cmp(&a.last_used_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        bookmarks
    }
}
