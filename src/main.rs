mod bookmarks;
mod commands;
mod context;
mod navigation;
mod persist;
mod qa;
mod roots;
mod state;
mod store;
mod workspace;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, Level};

use context::ContextAggregator;
use qa::QaClient;
use roots::LocalRoots;
use state::{AppState, BuilderConfig};
use store::CnidariumStore;
use workspace::Workspaces;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let token = dotenv::var("DISCORD_TOKEN").context("DISCORD_TOKEN required")?;
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Init storage
    let data_dir = std::path::PathBuf::from(
        dotenv::var("CTX_DATA_DIR").unwrap_or_else(|_| "./data/ctxdesk".to_string()),
    );
    let kv = Arc::new(CnidariumStore::new(&data_dir).await?);
    info!("State store initialized at {:?}", data_dir);
    let workspaces = Arc::new(Workspaces::new(kv));

    // Init QA client
    let qa = Arc::new(QaClient::from_env()?);
    info!(channel = qa.default_channel(), "QA client initialized");

    let config = BuilderConfig::new(qa.default_channel().to_string());

    // Roots
    let roots_var = dotenv::var("CTX_ROOTS").unwrap_or_else(|_| "workspace=.".to_string());
    let roots = Arc::new(LocalRoots::new(
        LocalRoots::parse(&roots_var)?,
        config.max_file_bytes,
    ));
    for root in navigation::RootRegistry::roots(roots.as_ref()) {
        info!(id = root.id, name = root.display_name, exists = root.exists, "Root configured");
    }
    let aggregator = ContextAggregator::new(roots.clone());

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    // Close workspaces nobody has touched for a while
    let evictor = workspaces.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(workspace::IDLE_EVICTION / 6);
        loop {
            tick.tick().await;
            let closed = evictor.evict_idle(workspace::IDLE_EVICTION).await;
            if closed > 0 {
                info!(closed, "Idle workspaces closed");
            }
        }
    });

    let app_state = AppState {
        workspaces: workspaces.clone(),
        roots,
        aggregator,
        qa,
        admin_ids,
        config: Arc::new(RwLock::new(config)),
    };

    let intents =
        serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MESSAGES;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::ctx()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting ctxdesk Discord bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    // Write anything still waiting on a debounce window
    workspaces.flush_all().await;

    Ok(())
}
