use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::context::FileProvider;
use crate::navigation::{normalize_path, RootInfo, RootRegistry};

#[derive(Debug, Clone)]
pub struct LocalRoot {
    pub id: String,
    pub display_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Named local directories, served as both the root registry and the file provider.
pub struct LocalRoots {
    roots: Vec<LocalRoot>,
    max_file_bytes: AtomicU64,
}

impl LocalRoots {
    pub fn new(roots: Vec<LocalRoot>, max_file_bytes: u64) -> Self {
        Self {
            roots,
            max_file_bytes: AtomicU64::new(max_file_bytes),
        }
    }

    /// Parse `id=path[=Display Name]` entries separated by commas.
    pub fn parse(value: &str) -> Result<Vec<LocalRoot>> {
        let mut roots: Vec<LocalRoot> = Vec::new();
        for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, '=');
            let id = parts.next().unwrap_or_default().trim();
            let Some(path) = parts.next().map(str::trim).filter(|p| !p.is_empty()) else {
                bail!("root `{}` has no path (expected id=path)", entry);
            };
            if id.is_empty() || id.contains(crate::bookmarks::KEY_SEPARATOR) {
                bail!("invalid root id in `{}`", entry);
            }
            if roots.iter().any(|r| r.id == id) {
                bail!("duplicate root id `{}`", id);
            }
            let display_name = parts
                .next()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(id)
                .to_string();
            roots.push(LocalRoot {
                id: id.to_string(),
                display_name,
                path: PathBuf::from(path),
            });
        }
        Ok(roots)
    }

    pub fn set_max_file_bytes(&self, bytes: u64) {
        self.max_file_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.roots.iter().any(|r| r.id == id)
    }

    fn resolve(&self, root: &str, path: &str) -> Result<PathBuf> {
        let Some(local) = self.roots.iter().find(|r| r.id == root) else {
            bail!("unknown root `{}`", root);
        };
        let Some(relative) = normalize_path(path) else {
            bail!("path escapes root");
        };
        Ok(if relative.is_empty() {
            local.path.clone()
        } else {
            local.path.join(relative)
        })
    }

    /// Directories first, then files, each alphabetical. Hidden entries skipped.
    pub async fn list_dir(&self, root: &str, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve(root, path)?;
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("read dir {}", dir.display()))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(DirEntry { name, is_dir });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }
}

impl RootRegistry for LocalRoots {
    fn roots(&self) -> Vec<RootInfo> {
        self.roots
            .iter()
            .map(|r| RootInfo {
                id: r.id.clone(),
                display_name: r.display_name.clone(),
                exists: r.path.is_dir(),
            })
            .collect()
    }
}

#[async_trait]
impl FileProvider for LocalRoots {
    async fn fetch(&self, root: &str, path: &str) -> Result<String> {
        let file = self.resolve(root, path)?;
        let meta = tokio::fs::metadata(&file)
            .await
            .with_context(|| format!("stat {}", path))?;
        if !meta.is_file() {
            bail!("not a file");
        }
        let limit = self.max_file_bytes.load(Ordering::Relaxed);
        if meta.len() > limit {
            bail!("file is {} bytes, limit is {}", meta.len(), limit);
        }
        let bytes = tokio::fs::read(&file)
            .await
            .with_context(|| format!("read {}", path))?;
        String::from_utf8(bytes).map_err(|_| anyhow::anyhow!("not UTF-8 text"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots_in(dir: &std::path::Path, limit: u64) -> LocalRoots {
        LocalRoots::new(
            vec![LocalRoot {
                id: "repo".to_string(),
                display_name: "Repo".to_string(),
                path: dir.to_path_buf(),
            }],
            limit,
        )
    }

    #[test]
    fn test_parse_roots() {
        let roots = LocalRoots::parse("src=./src, docs=/srv/docs=Team Docs,").unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].id, "src");
        assert_eq!(roots[0].display_name, "src");
        assert_eq!(roots[1].path, PathBuf::from("/srv/docs"));
        assert_eq!(roots[1].display_name, "Team Docs");

        assert!(LocalRoots::parse("nopath").is_err());
        assert!(LocalRoots::parse("a=x,a=y").is_err());
        assert!(LocalRoots::parse("a::b=x").is_err());
    }

    #[tokio::test]
    async fn test_fetch_reads_inside_root_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.js"), "const x=1;").unwrap();
        let roots = roots_in(dir.path(), 1024);

        assert_eq!(roots.fetch("repo", "src/a.js").await.unwrap(), "const x=1;");
        assert_eq!(roots.fetch("repo", "/src/./a.js").await.unwrap(), "const x=1;");
        assert!(roots.fetch("repo", "../secret").await.is_err());
        assert!(roots.fetch("other", "src/a.js").await.is_err());
        assert!(roots.fetch("repo", "src").await.is_err());
        assert!(roots.fetch("repo", "src/missing.js").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_respects_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "0123456789").unwrap();
        let roots = roots_in(dir.path(), 4);
        assert!(roots.fetch("repo", "big.txt").await.is_err());
        roots.set_max_file_bytes(64);
        assert!(roots.fetch("repo", "big.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_dir_orders_dirs_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zeta")).unwrap();
        std::fs::write(dir.path().join("alpha.md"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        let roots = roots_in(dir.path(), 1024);

        let entries = roots.list_dir("repo", "").await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "zeta".to_string(), is_dir: true },
                DirEntry { name: "alpha.md".to_string(), is_dir: false },
            ]
        );
        assert!(roots.roots()[0].exists);
    }
}
