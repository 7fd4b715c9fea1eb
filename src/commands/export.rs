use poise::serenity_prelude as serenity;
use tracing::info;

use super::user_id;
use crate::context::ContextFormat;
use crate::state::Context;
use crate::workspace;

/// Render the active bookmark and send it as a file
#[poise::command(slash_command)]
pub async fn export(
    ctx: Context<'_>,
    #[description = "headers | markdown"] format: Option<String>,
) -> Result<(), anyhow::Error> {
    let format = match format {
        Some(raw) => match raw.parse::<ContextFormat>() {
            Ok(format) => format,
            Err(e) => {
                ctx.say(e.to_string()).await?;
                return Ok(());
            }
        },
        None => ctx.data().config.read().await.default_format,
    };
    ctx.defer().await?;

    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let count = {
        let mut ws = ws.lock().await;
        ws.ui(|ui| ui.active_tab = "export".to_string());
        ws.read_bookmarks(|repo| repo.enabled_items().len())
    };
    if count == 0 {
        ctx.say("Nothing to export: the active bookmark has no enabled items.")
            .await?;
        return Ok(());
    }

    let out = workspace::export(&ws, &ctx.data().aggregator, format).await;
    info!(user = ctx.author().name, %format, items = count, len = out.len(), "context exported");

    let filename = match format {
        ContextFormat::Headers => "context.txt",
        ContextFormat::Markdown => "context.md",
    };
    let summary = format!("{} item(s), {} chars ({})", count, out.len(), format);
    ctx.send(
        poise::CreateReply::default()
            .content(summary)
            .attachment(serenity::CreateAttachment::bytes(out.into_bytes(), filename)),
    )
    .await?;
    Ok(())
}

/// Write pending changes to storage now
#[poise::command(slash_command)]
pub async fn save(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    ws.lock().await.flush().await;
    ctx.say("Saved.").await?;
    Ok(())
}
