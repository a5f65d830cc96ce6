mod config;

use std::sync::Arc;

use serenity::Client;
use tracing::info;

use pinbot_db::Database;
use pinbot_gateway::Handler;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pinbot=debug,pinbot_core=debug,pinbot_gateway=debug,pinbot_db=info,pinbot_media=info,serenity=warn".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    info!(db_path = %config.db_path.display(), "database ready");

    let handler = Handler::new(db, config.settings.clone());
    let mut client = Client::builder(&config.token, Handler::intents())
        .event_handler(handler)
        .await?;

    info!(
        prefix = %config.settings.command_prefix,
        pin_emoji = %config.settings.pin_emoji,
        upload_ceiling = config.settings.upload_ceiling,
        "pinbot connecting"
    );
    client.start().await?;
    Ok(())
}
