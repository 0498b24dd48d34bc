use std::path::PathBuf;
use std::sync::Arc;

use pier::{api::ApiServer, config::Config, pier::Pier};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pier=info")),
        )
        .init();

    if let Err(err) = run().await {
        error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> pier::Result<()> {
    let config = Arc::new(Config::resolve(std::env::args_os().nth(1).map(PathBuf::from))?);
    std::fs::create_dir_all(&config.build_root)?;

    let pier = Arc::new(Pier::connect(&config).await?);
    info!(services = pier.list_services().len(), "catalog loaded");

    ApiServer::new(pier, config).start_server().await
}
