pub mod render;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::store::types::Item;

pub use render::ContextFormat;

/// Source of current file text, keyed by root and root-relative path.
#[async_trait]
pub trait FileProvider: Send + Sync {
    async fn fetch(&self, root: &str, path: &str) -> Result<String>;
}

/// Renders a list of items into one payload. Files are fetched fresh; spans
/// use the text captured when they were added.
#[derive(Clone)]
pub struct ContextAggregator {
    files: Arc<dyn FileProvider>,
}

impl ContextAggregator {
    pub fn new(files: Arc<dyn FileProvider>) -> Self {
        Self { files }
    }

    /// Never fails: an unreadable file becomes an inline error marker.
    /// Fetches run concurrently; output keeps the order of `items`.
    pub async fn build(&self, items: &[Item], format: ContextFormat) -> String {
        let contents = join_all(items.iter().map(|item| self.resolve(item))).await;
        let resolved: Vec<(&Item, String)> = items.iter().zip(contents).collect();
        let out = render::render(&resolved, format);
        debug!(items = items.len(), %format, len = out.len(), "context built");
        out
    }

    async fn resolve(&self, item: &Item) -> String {
        match item {
            Item::File { target, .. } => match self.files.fetch(&target.root, &target.path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(root = %target.root, path = %target.path, "fetch failed: {:#}", e);
                    render::error_marker(&target.path, &format!("{:#}", e))
                }
            },
            Item::Span { content, .. } => content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::store::types::LineRange;

    #[derive(Default)]
    struct StubFiles {
        files: HashMap<(String, String), String>,
        fetched: Mutex<Vec<String>>,
    }

    impl StubFiles {
        fn with(mut self, root: &str, path: &str, content: &str) -> Self {
            self.files
                .insert((root.to_string(), path.to_string()), content.to_string());
            self
        }
    }

    #[async_trait]
    impl FileProvider for StubFiles {
        async fn fetch(&self, root: &str, path: &str) -> Result<String> {
            self.fetched.lock().unwrap().push(path.to_string());
            self.files
                .get(&(root.to_string(), path.to_string()))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such file"))
        }
    }

    #[tokio::test]
    async fn test_build_headers_file_then_span() {
        let files = Arc::new(StubFiles::default().with("src", "src/a.js", "const x=1;"));
        let aggregator = ContextAggregator::new(files);
        let items = vec![
            Item::file("src", "src/a.js"),
            Item::span("src", "src/a.js", LineRange { start: 1, end: 1 }, "const x=1;"),
        ];

        let out = aggregator.build(&items, ContextFormat::Headers).await;
        let blocks: Vec<&str> = out.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("#MULTICAT_START"));
        assert!(blocks[0].contains("# span: full\n#MULTICAT_END\nconst x=1;"));
        assert!(blocks[1].contains("# span: lines=1:1\n#MULTICAT_END\nconst x=1;"));
    }

    #[tokio::test]
    async fn test_unreachable_file_becomes_marker() {
        let files = Arc::new(
            StubFiles::default()
                .with("src", "a.rs", "fn a() {}")
                .with("src", "c.rs", "fn c() {}"),
        );
        let aggregator = ContextAggregator::new(files);
        let items = vec![
            Item::file("src", "a.rs"),
            Item::file("src", "gone.rs"),
            Item::file("src", "c.rs"),
        ];

        let out = aggregator.build(&items, ContextFormat::Markdown).await;
        assert!(out.contains("fn a() {}"));
        assert!(out.contains("fn c() {}"));
        assert!(out.contains("[error: could not load gone.rs: no such file]"));
        let a = out.find("a.rs").unwrap();
        let gone = out.find("gone.rs").unwrap();
        let c = out.find("c.rs").unwrap();
        assert!(a < gone && gone < c);
    }

    #[tokio::test]
    async fn test_spans_are_not_fetched() {
        let files = Arc::new(StubFiles::default());
        let aggregator = ContextAggregator::new(files.clone());
        let items = vec![Item::span("src", "x.py", LineRange { start: 3, end: 3 }, "pass")];

        let out = aggregator.build(&items, ContextFormat::Markdown).await;
        assert_eq!(out, "### x.py (lines 3-3)\n```python\npass\n```");
        assert!(files.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_item_list_renders_empty() {
        let aggregator = ContextAggregator::new(Arc::new(StubFiles::default()));
        assert_eq!(aggregator.build(&[], ContextFormat::Headers).await, "");
    }
}
