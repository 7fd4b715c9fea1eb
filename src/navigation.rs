use crate::store::types::{NavigationState, RootCursor, RootId};

/// A browseable root as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootInfo {
    pub id: RootId,
    pub display_name: String,
    pub exists: bool,
}

pub trait RootRegistry: Send + Sync {
    fn roots(&self) -> Vec<RootInfo>;
}

/// Registry entry joined with the user's navigation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootStatus {
    pub info: RootInfo,
    pub visited: bool,
    pub current: bool,
}

/// Canonical root-relative path: no leading or trailing `/`, no `.` segments,
/// `..` resolved. `None` if it climbs above the root.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(|c: char| c == '/' || c == '\\') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Resolve `target` against `base`; a leading `/` makes it root-absolute.
pub fn resolve_path(base: &str, target: &str) -> Option<String> {
    if target.starts_with('/') {
        normalize_path(target)
    } else {
        normalize_path(&format!("{}/{}", base, target))
    }
}

/// Per-root browsing cursors. Independent from bookmark data.
pub struct NavigationTracker<'a> {
    nav: &'a mut NavigationState,
}

impl<'a> NavigationTracker<'a> {
    pub fn new(nav: &'a mut NavigationState) -> Self {
        Self { nav }
    }

    pub fn current_root(&self) -> Option<&str> {
        self.nav.current_root_id.as_deref()
    }

    pub fn cursor(&self, root: &str) -> Option<&RootCursor> {
        self.nav.roots.get(root)
    }

    pub fn current_cursor(&self) -> Option<&RootCursor> {
        self.cursor(self.current_root()?)
    }

    /// Make `root` current, creating its cursor on first visit.
    pub fn switch_root(&mut self, root: &str) -> &RootCursor {
        self.nav.current_root_id = Some(root.to_string());
        self.nav.roots.entry(root.to_string()).or_default()
    }

    fn current_cursor_mut(&mut self) -> Option<&mut RootCursor> {
        let root = self.nav.current_root_id.as_ref()?;
        self.nav.roots.get_mut(root)
    }

    /// Move within the current root. Scroll and selection reset.
    pub fn set_path(&mut self, path: &str) -> bool {
        let Some(path) = normalize_path(path) else {
            return false;
        };
        let Some(cursor) = self.current_cursor_mut() else {
            return false;
        };
        if cursor.current_path != path {
            cursor.current_path = path;
            cursor.scroll_offset = 0;
            cursor.selected_file_path = None;
        }
        true
    }

    pub fn set_scroll(&mut self, offset: u64) -> bool {
        match self.current_cursor_mut() {
            Some(cursor) => {
                cursor.scroll_offset = offset;
                true
            }
            None => false,
        }
    }

    pub fn select_file(&mut self, path: Option<&str>) -> bool {
        let selected = match path {
            Some(path) => match normalize_path(path) {
                Some(path) => Some(path),
                None => return false,
            },
            None => None,
        };
        match self.current_cursor_mut() {
            Some(cursor) => {
                cursor.selected_file_path = selected;
                true
            }
            None => false,
        }
    }

    pub fn available_roots(&self, registry: &dyn RootRegistry) -> Vec<RootStatus> {
        registry
            .roots()
            .into_iter()
            .map(|info| RootStatus {
                visited: self.nav.roots.contains_key(&info.id),
                current: self.current_root() == Some(info.id.as_str()),
                info,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRoots;

    impl RootRegistry for FixedRoots {
        fn roots(&self) -> Vec<RootInfo> {
            vec![
                RootInfo {
                    id: "docs".to_string(),
                    display_name: "Docs".to_string(),
                    exists: true,
                },
                RootInfo {
                    id: "src".to_string(),
                    display_name: "Source".to_string(),
                    exists: false,
                },
            ]
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a//b/./c/").as_deref(), Some("a/b/c"));
        assert_eq!(normalize_path("a/b/../c").as_deref(), Some("a/c"));
        assert_eq!(normalize_path("").as_deref(), Some(""));
        assert!(normalize_path("../etc").is_none());
        assert!(normalize_path("a/../../b").is_none());
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path("src/lib", "../bin").as_deref(), Some("src/bin"));
        assert_eq!(resolve_path("src/lib", "/docs").as_deref(), Some("docs"));
        assert_eq!(resolve_path("", "a").as_deref(), Some("a"));
    }

    #[test]
    fn test_cursors_are_per_root() {
        let mut nav = NavigationState::default();
        let mut tracker = NavigationTracker::new(&mut nav);
        assert!(!tracker.set_path("x"));

        tracker.switch_root("docs");
        assert!(tracker.set_path("guides"));
        assert!(tracker.set_scroll(40));
        assert!(tracker.select_file(Some("guides/intro.md")));

        tracker.switch_root("src");
        assert_eq!(tracker.current_cursor(), Some(&RootCursor::default()));

        tracker.switch_root("docs");
        let docs = tracker.current_cursor().unwrap();
        assert_eq!(docs.current_path, "guides");
        assert_eq!(docs.scroll_offset, 40);
        assert_eq!(docs.selected_file_path.as_deref(), Some("guides/intro.md"));
        assert_eq!(nav.roots.len(), 2);
    }

    #[test]
    fn test_set_path_resets_scroll_and_selection() {
        let mut nav = NavigationState::default();
        let mut tracker = NavigationTracker::new(&mut nav);
        tracker.switch_root("docs");
        tracker.set_scroll(10);
        tracker.select_file(Some("a.md"));
        assert!(tracker.set_path("other"));
        assert_eq!(tracker.current_cursor(), Some(&RootCursor {
            current_path: "other".to_string(),
            scroll_offset: 0,
            selected_file_path: None,
        }));
        assert!(!tracker.set_path("../../up"));
    }

    #[test]
    fn test_available_roots_marks_visited_and_current() {
        let mut nav = NavigationState::default();
        let mut tracker = NavigationTracker::new(&mut nav);
        tracker.switch_root("docs");
        let roots = tracker.available_roots(&FixedRoots);
        assert_eq!(roots.len(), 2);
        assert!(roots[0].visited && roots[0].current && roots[0].info.exists);
        assert!(!roots[1].visited && !roots[1].current && !roots[1].info.exists);
    }

    #[test]
    fn test_navigation_survives_serialization() {
        let mut nav = NavigationState::default();
        let mut tracker = NavigationTracker::new(&mut nav);
        tracker.switch_root("docs");
        tracker.set_path("a/b");
        tracker.select_file(Some("a/b/c.md"));
        let json = serde_json::to_string(&nav).unwrap();
        let back: NavigationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, nav);
    }
}
