use std::sync::Arc;

use snb_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), snb_core::Error> {
    snb_core::logging::init("snb")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        message_ttl_ms = cfg.message_ttl.as_millis() as u64,
        delete_max_retries = cfg.delete_max_retries,
        error_threshold = cfg.error_threshold,
        "configuration loaded"
    );

    snb_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| snb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
