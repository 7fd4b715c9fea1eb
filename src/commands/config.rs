use std::time::Duration;

use crate::context::ContextFormat;
use crate::state::Context;

/// Configure builder settings (admin only)
#[poise::command(slash_command)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "debounce_ms | default_format | qa_channel | max_file_bytes"] param: Option<String>,
    #[description = "New value"] value: Option<String>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = ctx.data().config.read().await;
            ctx.say(format!(
                "**Builder Configuration:**\n\
                 `debounce_ms`: {}\n\
                 `default_format`: {}\n\
                 `qa_channel`: {}\n\
                 `max_file_bytes`: {}",
                config.debounce_ms, config.default_format, config.qa_channel, config.max_file_bytes
            ))
            .await?;
        }
        // Set a parameter
        (Some(key), Some(val)) => {
            let mut config = ctx.data().config.write().await;
            let reply = match key {
                "debounce_ms" => match val.parse::<u64>() {
                    Ok(ms) => {
                        config.debounce_ms = ms;
                        format!(
                            "`debounce_ms` set to {} (applies to workspaces opened from now on, {:?})",
                            ms,
                            Duration::from_millis(ms)
                        )
                    }
                    Err(_) => "`debounce_ms` must be a number of milliseconds".to_string(),
                },
                "default_format" => match val.parse::<ContextFormat>() {
                    Ok(format) => {
                        config.default_format = format;
                        format!("`default_format` set to {}", format)
                    }
                    Err(e) => e.to_string(),
                },
                "qa_channel" => {
                    config.qa_channel = val.trim().to_string();
                    format!("`qa_channel` set to {}", config.qa_channel)
                }
                "max_file_bytes" => match val.parse::<u64>() {
                    Ok(bytes) => {
                        config.max_file_bytes = bytes;
                        ctx.data().roots.set_max_file_bytes(bytes);
                        format!("`max_file_bytes` set to {}", bytes)
                    }
                    Err(_) => "`max_file_bytes` must be a number".to_string(),
                },
                _ => format!(
                    "Unknown param `{}`. Valid: `debounce_ms`, `default_format`, `qa_channel`, `max_file_bytes`",
                    key
                ),
            };
            ctx.say(reply).await?;
        }
        (Some(_), None) => {
            ctx.say("Provide both `param` and `value`. Example: `/ctx config debounce_ms 750`")
                .await?;
        }
    }

    Ok(())
}
