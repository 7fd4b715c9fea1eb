use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::bookmarks::BookmarkRepository;
use crate::context::{ContextAggregator, ContextFormat};
use crate::navigation::NavigationTracker;
use crate::persist::PersistenceScheduler;
use crate::qa::{self, QaAnswer, QaBackend};
use crate::store::types::{Document, UiState};
use crate::store::{KvStore, StateStore};

/// One user's document plus its write scheduler. Every mutation goes through
/// `bookmarks`, `navigate` or `ui`, each of which schedules a write.
pub struct Workspace {
    doc: Document,
    persist: PersistenceScheduler,
}

impl Workspace {
    pub async fn open(store: StateStore, window: Duration) -> Self {
        let doc = store.load().await;
        Self {
            doc,
            persist: PersistenceScheduler::spawn(store, window),
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Read through the repository without scheduling a write.
    pub fn read_bookmarks<R>(&mut self, f: impl FnOnce(&BookmarkRepository<'_>) -> R) -> R {
        f(&BookmarkRepository::new(&mut self.doc))
    }

    pub fn bookmarks<R>(&mut self, f: impl FnOnce(&mut BookmarkRepository<'_>) -> R) -> R {
        let out = f(&mut BookmarkRepository::new(&mut self.doc));
        self.persist.schedule(&self.doc);
        out
    }

    pub fn navigate<R>(&mut self, f: impl FnOnce(&mut NavigationTracker<'_>) -> R) -> R {
        let out = f(&mut NavigationTracker::new(&mut self.doc.navigation));
        self.persist.schedule(&self.doc);
        out
    }

    pub fn ui<R>(&mut self, f: impl FnOnce(&mut UiState) -> R) -> R {
        let out = f(&mut self.doc.ui);
        self.persist.schedule(&self.doc);
        out
    }

    pub async fn flush(&self) {
        self.persist.flush().await;
    }
}

pub type SharedWorkspace = Arc<Mutex<Workspace>>;

/// Render the active bookmark. The item list is captured up front, so edits
/// made while files are being fetched do not show up in this build.
pub async fn export(
    workspace: &SharedWorkspace,
    aggregator: &ContextAggregator,
    format: ContextFormat,
) -> String {
    let items = workspace
        .lock()
        .await
        .read_bookmarks(|repo| repo.enabled_items());
    aggregator.build(&items, format).await
}

/// Submit the active bookmark as markdown context and record the outcome in `ui.qa`.
pub async fn ask(
    workspace: &SharedWorkspace,
    aggregator: &ContextAggregator,
    backend: &dyn QaBackend,
    prompt: &str,
    channel: &str,
) -> Result<QaAnswer> {
    let items = {
        let mut ws = workspace.lock().await;
        ws.ui(|ui| {
            ui.active_tab = "qa".to_string();
            qa::begin_submission(&mut ui.qa, prompt, channel);
        });
        ws.read_bookmarks(|repo| repo.enabled_items())
    };

    let context = aggregator.build(&items, ContextFormat::Markdown).await;
    debug!(items = items.len(), context_len = context.len(), channel, "submitting QA");
    let result = backend.submit(&context, prompt, channel).await;

    workspace
        .lock()
        .await
        .ui(|ui| qa::record_exchange(&mut ui.qa, &result));
    result
}

/// Idle time after which an unused workspace is flushed and closed.
pub const IDLE_EVICTION: Duration = Duration::from_secs(30 * 60);

struct OpenWorkspace {
    ws: SharedWorkspace,
    last_used: Instant,
}

/// Open workspaces keyed by scope, loaded on first use.
pub struct Workspaces {
    kv: Arc<dyn KvStore>,
    open: Mutex<HashMap<String, OpenWorkspace>>,
}

impl Workspaces {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            open: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, scope: &str, window: Duration) -> SharedWorkspace {
        let mut open = self.open.lock().await;
        if let Some(entry) = open.get_mut(scope) {
            entry.last_used = Instant::now();
            return entry.ws.clone();
        }
        let store = StateStore::new(self.kv.clone(), scope);
        let ws = Arc::new(Mutex::new(Workspace::open(store, window).await));
        info!(scope, "workspace opened");
        open.insert(
            scope.to_string(),
            OpenWorkspace {
                ws: ws.clone(),
                last_used: Instant::now(),
            },
        );
        ws
    }

    /// Flush and close workspaces unused for `max_idle` that no command still holds.
    /// The map stays locked meanwhile, so a reopen always loads the flushed state.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut open = self.open.lock().await;
        let idle: Vec<String> = open
            .iter()
            .filter(|(_, entry)| {
                entry.last_used.elapsed() >= max_idle && Arc::strong_count(&entry.ws) == 1
            })
            .map(|(scope, _)| scope.clone())
            .collect();
        for scope in &idle {
            if let Some(entry) = open.remove(scope) {
                entry.ws.lock().await.flush().await;
                debug!(scope, "idle workspace closed");
            }
        }
        idle.len()
    }

    /// Write every pending snapshot.
    pub async fn flush_all(&self) {
        let open: Vec<SharedWorkspace> = self
            .open
            .lock()
            .await
            .values()
            .map(|entry| entry.ws.clone())
            .collect();
        for ws in open {
            ws.lock().await.flush().await;
        }
    }
}
