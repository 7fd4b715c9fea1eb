use tracing::info;

use super::user_id;
use crate::bookmarks::BookmarkRepository;
use crate::state::Context;
use crate::store::types::BookmarkId;

/// Bookmark by exact id, else by case-insensitive name (most recently used wins).
fn find_bookmark(repo: &BookmarkRepository<'_>, query: &str) -> Option<BookmarkId> {
    if repo.get(query).is_some() {
        return Some(query.to_string());
    }
    let query = query.trim().to_lowercase();
    repo.list()
        .into_iter()
        .find(|b| b.name.to_lowercase() == query)
        .map(|b| b.id.clone())
}

/// Create a bookmark and make it active
#[poise::command(slash_command)]
pub async fn new(
    ctx: Context<'_>,
    #[description = "Bookmark name"] name: String,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let id = ws.lock().await.bookmarks(|repo| repo.create(name.trim()));
    info!(user = ctx.author().name, bookmark = %id, "bookmark created");
    ctx.say(format!("Created **{}** and made it active.", name.trim()))
        .await?;
    Ok(())
}

/// Rename a bookmark
#[poise::command(slash_command)]
pub async fn rename(
    ctx: Context<'_>,
    #[description = "Bookmark to rename"]
    #[autocomplete = "autocomplete_bookmark"]
    bookmark: String,
    #[description = "New name"] name: String,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let renamed = ws.lock().await.bookmarks(|repo| {
        find_bookmark(repo, &bookmark).map(|id| repo.rename(&id, name.trim()))
    });
    let reply = match renamed {
        Some(_) => format!("Renamed **{}** to **{}**.", bookmark, name.trim()),
        None => format!("No bookmark named **{}**.", bookmark),
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Delete a bookmark and its items
#[poise::command(slash_command, rename = "drop")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Bookmark to delete"]
    #[autocomplete = "autocomplete_bookmark"]
    bookmark: String,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let deleted = ws.lock().await.bookmarks(|repo| {
        let id = find_bookmark(repo, &bookmark)?;
        repo.delete(&id);
        Some(id)
    });
    let Some(id) = deleted else {
        ctx.say(format!("No bookmark named **{}**.", bookmark)).await?;
        return Ok(());
    };
    info!(user = ctx.author().name, bookmark = %id, "bookmark deleted");
    ctx.say(format!("Deleted **{}**.", bookmark)).await?;
    Ok(())
}

/// Switch the active bookmark (omit to deselect)
#[poise::command(slash_command, rename = "use")]
pub async fn use_bookmark(
    ctx: Context<'_>,
    #[description = "Bookmark to activate"]
    #[autocomplete = "autocomplete_bookmark"]
    bookmark: Option<String>,
) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let Some(query) = bookmark else {
        ws.lock().await.bookmarks(|repo| repo.set_active(None));
        ctx.say("No bookmark is active now.").await?;
        return Ok(());
    };
    let activated = ws.lock().await.bookmarks(|repo| {
        let id = find_bookmark(repo, &query);
        repo.set_active(id.as_deref())
            .then(|| repo.enabled_items().len())
    });
    if let Some(count) = activated {
        ctx.say(format!("**{}** is active ({} enabled item(s)).", query, count))
            .await?;
    } else {
        ctx.say(format!("No bookmark named **{}**; nothing is active now.", query))
            .await?;
    }
    Ok(())
}

/// List your bookmarks
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let output = {
        let mut ws = ws.lock().await;
        ws.ui(|ui| ui.left_panel_mode = "bookmarks".to_string());
        ws.read_bookmarks(render_list)
    };

    match output {
        Some(output) => super::send_chunked(&ctx, &output).await,
        None => {
            ctx.say("No bookmarks yet. Use `/ctx new` or just `/ctx add` a file.")
                .await?;
            Ok(())
        }
    }
}

/// Bookmark overview, `None` when there are none.
fn render_list(repo: &BookmarkRepository<'_>) -> Option<String> {
    let bookmarks = repo.list();
    if bookmarks.is_empty() {
        return None;
    }
    let active = repo.active().map(|b| b.id.as_str());

    let mut output = String::from("**Bookmarks**\n");
    for bookmark in bookmarks {
        let marker = if active == Some(bookmark.id.as_str()) {
            "▶"
        } else {
            "-"
        };
        let enabled = bookmark.items.iter().filter(|i| i.enabled()).count();
        let last_used = chrono::DateTime::from_timestamp_millis(bookmark.last_used_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        output.push_str(&format!(
            "{} **{}** | {}/{} items enabled, used {}× (last {})\n",
            marker,
            bookmark.name,
            enabled,
            bookmark.items.len(),
            bookmark.use_count,
            last_used
        ));
    }
    Some(output)
}

/// Autocomplete for bookmark names.
async fn autocomplete_bookmark(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let partial = partial.to_lowercase();
    let names = ws.lock().await.read_bookmarks(|repo| {
        repo.list()
            .into_iter()
            .map(|b| b.name.clone())
            .filter(|name| name.to_lowercase().contains(&partial))
            .take(25)
            .collect()
    });
    names
}
