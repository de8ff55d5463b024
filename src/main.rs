use std::sync::Arc;

use aptbot::config::{self, BotConfig};
use aptbot::gateway::DiscordGateway;
use aptbot::{BOT_NAME, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{debug, info};

/// Sweep expired panels for as long as the bot runs
fn spawn_panel_sweeper(data: Data) {
    let period = data.config.panel_sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let expired = data.expire_panels().await;
            if expired > 0 {
                debug!("Expired {expired} panel(s)");
            }
        }
    });
}

/// Keep the server stats channels current
fn spawn_stats_updater(data: Data) {
    let period = data.config.stats_refresh_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let refreshed = data.stats.refresh_all().await;
            if refreshed > 0 {
                debug!("Refreshed stats for {refreshed} guild(s)");
            }
        }
    });
}

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // .env is optional; real environment variables win
    dotenvy::dotenv().ok();

    logging::init()?;

    let config = BotConfig::load()?;
    let token = config::discord_token()?;
    let prefix = config.prefix.clone();

    // Configure the Poise framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            pre_command: |ctx| Box::pin(logging::log_command_start(ctx)),
            post_command: |ctx| Box::pin(logging::log_command_end(ctx)),
            on_error: |error| Box::pin(logging::report_command_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, _framework| {
            Box::pin(async move {
                logging::log_console(format!("{BOT_NAME} logged in as {}", ready.user.name));
                let data = ctx
                    .data
                    .read()
                    .await
                    .get::<Data>()
                    .cloned()
                    .ok_or("bot data was not registered before startup")?;
                Ok(data)
            })
        })
        .build();

    // Prefix commands and AutoMod both need message content
    let mut intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;
    // Join events are privileged and only needed for the auto role
    if config.auto_role().is_some() {
        intents |= GatewayIntents::GUILD_MEMBERS;
    }
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await?;

    // The engines share the client's HTTP handle
    let gateway = Arc::new(DiscordGateway::new(Arc::clone(&client.http)));
    let data = Data::load(config, gateway).await;
    client.data.write().await.insert::<Data>(data.clone());
    spawn_panel_sweeper(data.clone());
    spawn_stats_updater(data);

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    client.start().await?;
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to build the async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
