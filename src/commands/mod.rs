mod ask;
mod bookmarks;
mod browse;
mod config;
mod export;
mod items;

use crate::navigation::{resolve_path, RootRegistry};
use crate::state::Context;
use crate::workspace::SharedWorkspace;

/// ctxdesk - assemble file context from shared roots
#[poise::command(
    slash_command,
    subcommands(
        "bookmarks::new",
        "bookmarks::rename",
        "bookmarks::delete",
        "bookmarks::use_bookmark",
        "bookmarks::list",
        "items::add",
        "items::quote",
        "items::lines",
        "items::remove",
        "items::toggle",
        "items::show",
        "browse::roots",
        "browse::cd",
        "browse::ls",
        "export::export",
        "export::save",
        "ask::ask",
        "config::config"
    )
)]
pub async fn ctx(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

pub(crate) fn user_id(ctx: &Context<'_>) -> u64 {
    ctx.author().id.get()
}

/// Resolve a command's root and path against the caller's current folder.
/// Falls back to the current root, then to the first configured one.
/// The error is a message for the user.
pub(crate) async fn resolve_target(
    ctx: &Context<'_>,
    ws: &SharedWorkspace,
    root: Option<String>,
    path: &str,
) -> Result<(String, String), String> {
    let registry = &ctx.data().roots;
    let ws = ws.lock().await;
    let nav = &ws.document().navigation;

    let root = root
        .or_else(|| nav.current_root_id.clone())
        .or_else(|| registry.roots().first().map(|r| r.id.clone()))
        .ok_or_else(|| "No roots are configured.".to_string())?;
    if !registry.contains(&root) {
        return Err(format!("Unknown root `{}`. See `/ctx roots`.", root));
    }

    let base = nav
        .roots
        .get(&root)
        .map(|c| c.current_path.as_str())
        .unwrap_or("");
    match resolve_path(base, path) {
        Some(path) => Ok((root, path)),
        None => Err(format!("`{}` points outside of `{}`.", path, root)),
    }
}

/// Send a message in Discord-safe chunks (max 1990 chars).
/// Uses ctx.say() for all chunks: poise routes follow-ups through the
/// interaction webhook, which doesn't require Send Messages channel permission.
pub(crate) async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    let mut remaining = text;
    while !remaining.is_empty() {
        let mut chunk_len = remaining.len().min(1990);
        while !remaining.is_char_boundary(chunk_len) {
            chunk_len -= 1;
        }
        let split_at = if chunk_len < remaining.len() {
            remaining[..chunk_len]
                .rfind('\n')
                .or_else(|| remaining[..chunk_len].rfind(' '))
                .map(|i| i + 1)
                .unwrap_or(chunk_len)
        } else {
            chunk_len
        };
        let chunk = &remaining[..split_at];
        remaining = &remaining[split_at..];

        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Autocomplete for configured root ids.
pub(crate) async fn autocomplete_root(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let partial = partial.to_lowercase();
    ctx.data()
        .roots
        .roots()
        .into_iter()
        .map(|r| r.id)
        .filter(|id| id.to_lowercase().contains(&partial))
        .take(25)
        .collect()
}
