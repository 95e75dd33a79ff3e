use clap::Parser;
use log::{error, info};
use server::config::{CliArgs, ServerConfig};
use server::network::Server;
use server::registry::{LevelCatalog, RandomCodeGenerator, Registry};

/// Main-method of the application.
/// Parses command-line arguments, loads the level catalog, then runs the session server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.apply_cli_overrides(&args);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let catalog = match &config.levels_dir {
        Some(dir) => LevelCatalog::load_dir(dir)?,
        None => LevelCatalog::with_demo(),
    };
    let registry = Registry::new(
        catalog,
        Box::new(RandomCodeGenerator::new()),
        config.sim.clone(),
        config.rules.clone(),
        config.timing.idle_room_timeout_ms,
    );
    info!(
        "Loaded {} levels: {:?}",
        registry.catalog().len(),
        registry.catalog().ids()
    );

    info!(
        "Starting server on {} at {}Hz, max {} clients",
        config.bind_address(),
        config.timing.tick_rate,
        config.network.max_clients
    );

    let mut server = Server::new(&config, registry).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
