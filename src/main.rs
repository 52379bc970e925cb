use mailer_rs::api::ApiServer;
use mailer_rs::config::AppConfig;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting mailer-rs");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    info!("Configuration loaded");
    info!("  HTTP listening on: {}", config.http.listen_addr);
    info!(
        "  SMTP relay: {}:{} (ssl={})",
        config.relay.host, config.relay.port, config.relay.use_ssl
    );
    info!("  Sender identity: {}", config.relay.from_addr);

    if !config.relay.is_configured() {
        warn!("SMTP credentials missing; report delivery will fail until configured");
    }

    let server = ApiServer::new(config);
    server.run().await?;

    Ok(())
}
