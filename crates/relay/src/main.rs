use std::sync::Arc;

use tracing::info;

use relay_core::{config::Config, directory::TopicDirectory, router::Router, store};
use relay_telegram::{server, HttpTransport, TelegramApi};

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        group = %cfg.staff_group_id,
        store = ?cfg.store_path,
        "topic relay starting"
    );

    let transport = HttpTransport::new(
        &cfg.telegram_api_base,
        &cfg.telegram_bot_token,
        cfg.http_timeout,
    )?;
    let api = Arc::new(TelegramApi::new(transport, cfg.retry_policy()));

    let kv = store::open(cfg.store_path.as_deref()).await?;
    let directory = Arc::new(TopicDirectory::new(kv));

    let router = Arc::new(Router::new(cfg.clone(), api, directory));

    server::serve(cfg, router)
        .await
        .map_err(|e| relay_core::Error::External(format!("webhook server failed: {e}")))?;

    Ok(())
}
