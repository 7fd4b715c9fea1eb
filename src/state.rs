use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::context::{ContextAggregator, ContextFormat};
use crate::qa::QaClient;
use crate::roots::LocalRoots;
use crate::workspace::{SharedWorkspace, Workspaces};

/// Builder settings (admins can modify at runtime).
pub struct BuilderConfig {
    pub debounce_ms: u64,
    pub default_format: ContextFormat,
    pub qa_channel: String,
    pub max_file_bytes: u64,
}

impl BuilderConfig {
    pub fn new(qa_channel: String) -> Self {
        Self {
            debounce_ms: crate::persist::DEFAULT_DEBOUNCE.as_millis() as u64,
            default_format: ContextFormat::Markdown,
            qa_channel,
            max_file_bytes: 512 * 1024,
        }
    }
}

pub struct AppState {
    pub workspaces: Arc<Workspaces>,
    pub roots: Arc<LocalRoots>,
    pub aggregator: ContextAggregator,
    pub qa: Arc<QaClient>,
    pub admin_ids: HashSet<u64>,
    pub config: Arc<RwLock<BuilderConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// The caller's workspace. Each Discord user gets their own document.
    pub async fn workspace(&self, user_id: u64) -> SharedWorkspace {
        let window = Duration::from_millis(self.config.read().await.debounce_ms);
        self.workspaces.get(&user_id.to_string(), window).await
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
