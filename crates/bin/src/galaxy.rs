//! Galaxy - arena game server binary

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Galaxy Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  World: {}x{}", config.world.width, config.world.height);
    info!(
        "  Match: {}",
        if config.world.private { "private" } else { "public" }
    );
    info!(
        "  Bots: {}",
        if config.bots.enabled && !config.world.private { "on" } else { "off" }
    );

    server::run(config).await?;

    Ok(())
}
