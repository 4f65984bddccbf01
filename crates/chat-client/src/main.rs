//! Chat client entry point
//!
//! Run with:
//! ```bash
//! CHAT_BOT_TOKEN=... cargo run -p chat-client
//! ```
//!
//! Configuration is loaded from environment variables.

use chat_cache::{CacheOptions, CacheResource, CacheRule};
use chat_client::{Client, ClientError, Transformer};
use chat_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use chat_core::User;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Client failed");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> Result<(), ClientError> {
    info!(api = %config.api_base(), intents = ?config.intents, "Starting chat client");
    let token = config.token.clone();
    let client = Client::new(config);

    client.transform("USER_UPDATE", Transformer::deserialize::<User>())?;
    client.enable_cache(CacheOptions::all().with(CacheResource::SelfUser, CacheRule::first().transformed()))?;

    client.once("READY", |ctx, _| {
        info!(
            session_id = ctx.session.session_id.as_deref().unwrap_or_default(),
            guilds = ctx.cache.guild_count(),
            "Ready"
        );
        Ok(())
    })?;
    client.on("GUILD_CREATE", |ctx, args| {
        let name = args
            .raw()
            .and_then(|d| d.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or_default();
        info!(guild = name, cached = ctx.cache.guild_count(), "Guild available");
        Ok(())
    })?;
    client.on("MESSAGE_CREATE", |ctx, args| {
        info!(sequence = ?ctx.sequence, data = ?args.raw(), "Message");
        Ok(())
    })?;

    client.login(token).await?;
    info!(latency = ?client.ping().await.ok(), "Logged in");

    tokio::select! {
        result = client.wait() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            client.close().await
        }
    }
}
