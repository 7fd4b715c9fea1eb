use super::{autocomplete_root, resolve_target, send_chunked, user_id};
use crate::navigation::NavigationTracker;
use crate::state::Context;

const PAGE_SIZE: usize = 50;

/// List the roots you can browse
#[poise::command(slash_command)]
pub async fn roots(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let mut ws = ws.lock().await;
    ws.ui(|ui| ui.left_panel_mode = "roots".to_string());
    let statuses = ws.navigate(|nav| nav.available_roots(ctx.data().roots.as_ref()));
    drop(ws);

    if statuses.is_empty() {
        ctx.say("No roots are configured (set `CTX_ROOTS`).").await?;
        return Ok(());
    }

    let mut output = String::from("**Roots**\n");
    for status in statuses {
        let marker = if status.current { "▶" } else { "-" };
        let missing = if status.info.exists { "" } else { " (missing)" };
        let visited = if status.visited { "" } else { " · not visited" };
        output.push_str(&format!(
            "{} `{}` {}{}{}\n",
            marker, status.info.id, status.info.display_name, missing, visited
        ));
    }
    ctx.say(output).await?;
    Ok(())
}

/// Change root and/or folder
#[poise::command(slash_command)]
pub async fn cd(
    ctx: Context<'_>,
    #[description = "Folder, relative to the current one (`/` for the root, `..` to go up)"]
    path: Option<String>,
    #[description = "Root to switch to"]
    #[autocomplete = "autocomplete_root"]
    root: Option<String>,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let (root, folder) =
        match resolve_target(&ctx, &ws, root, path.as_deref().unwrap_or("")).await {
            Ok(target) => target,
            Err(message) => {
                ctx.say(message).await?;
                return Ok(());
            }
        };
    if path.is_some() {
        if let Err(e) = ctx.data().roots.list_dir(&root, &folder).await {
            ctx.say(format!("Can't open `{}`: {:#}", folder, e)).await?;
            return Ok(());
        }
    }

    let mut ws = ws.lock().await;
    ws.ui(|ui| ui.left_panel_mode = "files".to_string());
    let location = ws.navigate(|nav| {
        nav.switch_root(&root);
        if path.is_some() {
            nav.set_path(&folder);
        }
        nav.current_cursor()
            .map(|c| c.current_path.clone())
            .unwrap_or_default()
    });
    drop(ws);

    ctx.say(format!("Now in `{}:/{}`", root, location)).await?;
    Ok(())
}

/// First entry to show. Listing the folder the cursor is on remembers the
/// offset as its scroll position; without an explicit offset it resumes there.
fn page_start(
    nav: &mut NavigationTracker<'_>,
    root: &str,
    folder: &str,
    requested: Option<u64>,
    total: usize,
) -> usize {
    let on_cursor = nav.current_root() == Some(root)
        && nav
            .current_cursor()
            .is_some_and(|cursor| cursor.current_path == folder);
    if !on_cursor {
        return (requested.unwrap_or(0) as usize).min(total);
    }
    let stored = nav.current_cursor().map_or(0, |cursor| cursor.scroll_offset);
    let start = (requested.unwrap_or(stored) as usize).min(total);
    nav.set_scroll(start as u64);
    start
}

/// List a folder (defaults to the current one)
#[poise::command(slash_command)]
pub async fn ls(
    ctx: Context<'_>,
    #[description = "Folder, relative to the current one"] path: Option<String>,
    #[description = "Root (defaults to the current one)"]
    #[autocomplete = "autocomplete_root"]
    root: Option<String>,
    #[description = "Skip this many entries (remembered for the current folder)"]
    offset: Option<u64>,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let (root, folder) =
        match resolve_target(&ctx, &ws, root, path.as_deref().unwrap_or("")).await {
            Ok(target) => target,
            Err(message) => {
                ctx.say(message).await?;
                return Ok(());
            }
        };
    let entries = match ctx.data().roots.list_dir(&root, &folder).await {
        Ok(entries) => entries,
        Err(e) => {
            ctx.say(format!("Can't list `{}`: {:#}", folder, e)).await?;
            return Ok(());
        }
    };
    let start = {
        let mut ws = ws.lock().await;
        ws.ui(|ui| ui.left_panel_mode = "files".to_string());
        ws.navigate(|nav| page_start(nav, &root, &folder, offset, entries.len()))
    };

    let mut output = format!("**{}:/{}**\n", root, folder);
    if entries.is_empty() {
        output.push_str("(empty)\n");
    }
    let end = (start + PAGE_SIZE).min(entries.len());
    for entry in &entries[start..end] {
        let suffix = if entry.is_dir { "/" } else { "" };
        output.push_str(&format!("`{}{}`\n", entry.name, suffix));
    }
    if start > 0 || end < entries.len() {
        output.push_str(&format!(
            "Showing {}-{} of {}.",
            (start + 1).min(end),
            end,
            entries.len()
        ));
        if end < entries.len() {
            output.push_str(&format!(" Next page: `/ctx ls offset:{}`", end));
        }
        output.push('\n');
    }
    send_chunked(&ctx, &output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::NavigationState;

    #[test]
    fn test_page_start_remembers_offset_for_cursor_folder() {
        let mut nav = NavigationState::default();
        let mut tracker = NavigationTracker::new(&mut nav);
        tracker.switch_root("src");
        tracker.set_path("lib");

        assert_eq!(page_start(&mut tracker, "src", "lib", Some(50), 120), 50);
        assert_eq!(tracker.current_cursor().unwrap().scroll_offset, 50);
        assert_eq!(page_start(&mut tracker, "src", "lib", None, 120), 50);
        assert_eq!(page_start(&mut tracker, "src", "lib", Some(500), 120), 120);
        assert_eq!(tracker.current_cursor().unwrap().scroll_offset, 120);
    }

    #[test]
    fn test_page_start_elsewhere_leaves_cursor_alone() {
        let mut nav = NavigationState::default();
        let mut tracker = NavigationTracker::new(&mut nav);
        tracker.switch_root("src");
        tracker.set_scroll(7);

        assert_eq!(page_start(&mut tracker, "src", "other", Some(3), 10), 3);
        assert_eq!(page_start(&mut tracker, "docs", "", None, 10), 0);
        assert_eq!(tracker.current_cursor().unwrap().scroll_offset, 7);
    }
}
