use tracing::info;

use super::{autocomplete_root, resolve_target, send_chunked, user_id};
use crate::bookmarks::span::{find_selection, locate, slice_lines};
use crate::bookmarks::BookmarkRepository;
use crate::context::FileProvider;
use crate::navigation::NavigationTracker;
use crate::state::Context;
use crate::store::types::{Item, LineRange, DEFAULT_BOOKMARK_NAME};
use crate::workspace::SharedWorkspace;

/// Mark the file just added as selected, if it lives in the root being browsed.
fn select_added(nav: &mut NavigationTracker<'_>, root: &str, path: &str) -> bool {
    nav.current_root() == Some(root) && nav.select_file(Some(path))
}

/// Add an item and describe the outcome.
async fn add_and_report(
    ctx: &Context<'_>,
    ws: &SharedWorkspace,
    item: Item,
    label: String,
) -> Result<(), anyhow::Error> {
    let (root, path) = (item.root().to_string(), item.path().to_string());
    let (had_active, added, name) = {
        let mut ws = ws.lock().await;
        ws.navigate(|nav| select_added(nav, &root, &path));
        ws.bookmarks(|repo| {
            let had_active = repo.active().is_some();
            let added = repo.add_item(item);
            let name = repo
                .active()
                .map(|b| b.name.clone())
                .unwrap_or_else(|| DEFAULT_BOOKMARK_NAME.to_string());
            (had_active, added, name)
        })
    };

    let message = match (added, had_active) {
        (false, _) => format!("{} is already in **{}**.", label, name),
        (true, true) => format!("Added {} to **{}**.", label, name),
        (true, false) => format!("Added {} to a new bookmark **{}**.", label, name),
    };
    ctx.say(message).await?;
    Ok(())
}

/// Add a whole file to the active bookmark
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "File path, relative to your current folder"] path: String,
    #[description = "Root (defaults to the current one)"]
    #[autocomplete = "autocomplete_root"]
    root: Option<String>,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let (root, path) = match resolve_target(&ctx, &ws, root, &path).await {
        Ok(target) => target,
        Err(message) => {
            ctx.say(message).await?;
            return Ok(());
        }
    };
    if let Err(e) = ctx.data().roots.fetch(&root, &path).await {
        ctx.say(format!("Can't read `{}`: {:#}", path, e)).await?;
        return Ok(());
    }

    info!(user = ctx.author().name, root, path, "file item added");
    let label = format!("`{}`", path);
    add_and_report(&ctx, &ws, Item::file(root, path), label).await
}

/// Add the lines containing a quoted snippet of a file
#[poise::command(slash_command)]
pub async fn quote(
    ctx: Context<'_>,
    #[description = "File path, relative to your current folder"] path: String,
    #[description = "Exact text to capture (first match is used)"] text: String,
    #[description = "Root (defaults to the current one)"]
    #[autocomplete = "autocomplete_root"]
    root: Option<String>,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let (root, path) = match resolve_target(&ctx, &ws, root, &path).await {
        Ok(target) => target,
        Err(message) => {
            ctx.say(message).await?;
            return Ok(());
        }
    };
    let full = match ctx.data().roots.fetch(&root, &path).await {
        Ok(full) => full,
        Err(e) => {
            ctx.say(format!("Can't read `{}`: {:#}", path, e)).await?;
            return Ok(());
        }
    };
    let Some((start, end)) = find_selection(&full, &text) else {
        ctx.say(format!("That text does not appear in `{}`.", path))
            .await?;
        return Ok(());
    };

    let lines = locate(&full, start, end);
    info!(user = ctx.author().name, root, path, start = lines.start, end = lines.end, "span item added");
    let label = format!("`{}` lines {}-{}", path, lines.start, lines.end);
    add_and_report(&ctx, &ws, Item::span(root, path, lines, text), label).await
}

/// Add a line range of a file
#[poise::command(slash_command)]
pub async fn lines(
    ctx: Context<'_>,
    #[description = "File path, relative to your current folder"] path: String,
    #[description = "First line (1-based)"]
    #[min = 1]
    from: u32,
    #[description = "Last line (inclusive)"]
    #[min = 1]
    to: u32,
    #[description = "Root (defaults to the current one)"]
    #[autocomplete = "autocomplete_root"]
    root: Option<String>,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let (root, path) = match resolve_target(&ctx, &ws, root, &path).await {
        Ok(target) => target,
        Err(message) => {
            ctx.say(message).await?;
            return Ok(());
        }
    };
    let full = match ctx.data().roots.fetch(&root, &path).await {
        Ok(full) => full,
        Err(e) => {
            ctx.say(format!("Can't read `{}`: {:#}", path, e)).await?;
            return Ok(());
        }
    };

    let requested = LineRange {
        start: from as usize,
        end: to as usize,
    };
    let Some(content) = slice_lines(&full, requested) else {
        ctx.say(format!(
            "`{}` has {} line(s); {}-{} is out of range.",
            path,
            full.split('\n').count(),
            from,
            to
        ))
        .await?;
        return Ok(());
    };
    let total = full.split('\n').count();
    let lines = LineRange {
        start: requested.start,
        end: requested.end.min(total),
    };

    let label = format!("`{}` lines {}-{}", path, lines.start, lines.end);
    add_and_report(&ctx, &ws, Item::span(root, path, lines, content), label).await
}

/// Key of the item shown as number `index` by `/ctx show`.
fn item_key_at(repo: &BookmarkRepository<'_>, index: u32) -> Option<String> {
    let position = (index as usize).checked_sub(1)?;
    repo.items().into_iter().nth(position).map(|(key, _)| key)
}

/// Remove an item (number from /ctx show)
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Item number"]
    #[min = 1]
    index: u32,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let removed = ws.lock().await.bookmarks(|repo| {
        item_key_at(repo, index).map(|key| repo.remove_item(&key))
    });
    let message = match removed {
        Some(_) => format!("Removed item {}.", index),
        None => format!("There is no item {}. See `/ctx show`.", index),
    };
    ctx.say(message).await?;
    Ok(())
}

/// Enable or disable an item (number from /ctx show)
#[poise::command(slash_command)]
pub async fn toggle(
    ctx: Context<'_>,
    #[description = "Item number"]
    #[min = 1]
    index: u32,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let state = ws.lock().await.bookmarks(|repo| {
        item_key_at(repo, index).and_then(|key| repo.toggle_enabled(&key))
    });
    let message = match state {
        Some(true) => format!("Item {} enabled.", index),
        Some(false) => format!("Item {} disabled.", index),
        None => format!("There is no item {}. See `/ctx show`.", index),
    };
    ctx.say(message).await?;
    Ok(())
}

/// Show the items of the active bookmark
#[poise::command(slash_command)]
pub async fn show(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let output = {
        let mut ws = ws.lock().await;
        ws.ui(|ui| ui.active_tab = "context".to_string());
        ws.read_bookmarks(render_items)
    };

    match output {
        Some(output) => send_chunked(&ctx, &output).await,
        None => {
            ctx.say("No bookmark is active. Use `/ctx use` or `/ctx add`.")
                .await?;
            Ok(())
        }
    }
}

/// Numbered item list of the active bookmark, `None` when nothing is active.
fn render_items(repo: &BookmarkRepository<'_>) -> Option<String> {
    let bookmark = repo.active()?;
    let mut output = format!("**{}**\n", bookmark.name);
    if bookmark.items.is_empty() {
        output.push_str("(empty)\n");
    }
    for (i, (_, item)) in repo.items().into_iter().enumerate() {
        let check = if item.enabled() { "☑" } else { "☐" };
        let detail = match item {
            Item::File { .. } => "full file".to_string(),
            Item::Span { target, .. } => format!("lines {}-{}", target.lines.start, target.lines.end),
        };
        output.push_str(&format!(
            "`{:>2}` {} `{}:{}` ({})\n",
            i + 1,
            check,
            item.root(),
            item.path(),
            detail
        ));
    }
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{Document, NavigationState};

    #[test]
    fn test_item_key_at_is_one_based() {
        let mut doc = Document::default();
        let mut repo = BookmarkRepository::new(&mut doc);
        repo.add_item(Item::file("src", "a.rs"));
        repo.add_item(Item::file("src", "b.rs"));

        assert_eq!(item_key_at(&repo, 1).as_deref(), Some("src::a.rs"));
        assert_eq!(item_key_at(&repo, 2).as_deref(), Some("src::b.rs"));
        assert!(item_key_at(&repo, 0).is_none());
        assert!(item_key_at(&repo, 3).is_none());
    }

    #[test]
    fn test_render_items_numbers_and_flags() {
        let mut doc = Document::default();
        let mut repo = BookmarkRepository::new(&mut doc);
        assert!(render_items(&repo).is_none());

        repo.add_item(Item::file("src", "a.rs"));
        repo.add_item(Item::span("src", "b.rs", LineRange { start: 2, end: 3 }, "x"));
        repo.toggle_enabled("src::a.rs");
        let out = render_items(&repo).unwrap();
        assert!(out.starts_with("**Untitled**\n"));
        assert!(out.contains("` 1` ☐ `src:a.rs` (full file)"));
        assert!(out.contains("` 2` ☑ `src:b.rs` (lines 2-3)"));
    }

    #[test]
    fn test_select_added_only_in_current_root() {
        let mut nav = NavigationState::default();
        let mut tracker = NavigationTracker::new(&mut nav);
        assert!(!select_added(&mut tracker, "src", "a.rs"));

        tracker.switch_root("src");
        assert!(!select_added(&mut tracker, "docs", "intro.md"));
        assert!(select_added(&mut tracker, "src", "lib/a.rs"));
        assert_eq!(
            tracker.current_cursor().unwrap().selected_file_path.as_deref(),
            Some("lib/a.rs")
        );
    }
}
