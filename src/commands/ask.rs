use tracing::info;

use super::{send_chunked, user_id};
use crate::state::Context;
use crate::workspace;

/// Ask a question with the active bookmark as context
#[poise::command(slash_command)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Your question"]
    #[autocomplete = "autocomplete_history"]
    question: String,
    #[description = "QA channel (defaults to the configured one)"] channel: Option<String>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;

    let channel = match channel {
        Some(channel) => channel,
        None => ctx.data().config.read().await.qa_channel.clone(),
    };
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let items = ws
        .lock()
        .await
        .read_bookmarks(|repo| repo.enabled_items().len());

    info!(user = ctx.author().name, channel, items, question, "QA submitted");

    let result = workspace::ask(
        &ws,
        &ctx.data().aggregator,
        ctx.data().qa.as_ref(),
        &question,
        &channel,
    )
    .await;

    match result {
        Ok(answer) => {
            info!(exchange = answer.exchange_id, answer_len = answer.answer.len(), "QA answered");
            let full = format!(
                "**Q:** {}\n**Channel:** {} | **Context items:** {}\n\n**A:** {}",
                question, answer.channel, items, answer.answer
            );
            send_chunked(&ctx, &full).await
        }
        Err(e) => {
            ctx.say(format!("QA failed: {:#}", e)).await?;
            Ok(())
        }
    }
}

/// Autocomplete from your recent questions.
async fn autocomplete_history(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let ws = ctx.data().workspace(user_id(&ctx)).await;
    let ws = ws.lock().await;
    let partial = partial.to_lowercase();
    ws.document()
        .ui
        .qa
        .history
        .iter()
        .filter(|q| q.to_lowercase().contains(&partial))
        .take(25)
        .cloned()
        .collect()
}
