use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use framework_launcher::{
    config::Config,
    controller::ControllerClient,
    server::Server,
    users::{KubeSecretStore, UserManager},
    Result,
};

#[derive(Debug, Parser)]
#[command(name = "framework-launcher", about = "Job API in front of FrameworkController")]
struct Args {
    /// Address to listen on, overrides SERVER_ADDR
    #[arg(long)]
    addr: Option<String>,

    /// Environment file to load before reading configuration
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Some(path) = &args.env_file {
        dotenvy::from_path(path)
            .map_err(|e| framework_launcher::Error::Config(format!("{}: {}", path.display(), e)))?;
    }

    // Load configuration
    let mut config = Config::load()?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    info!(
        "Using framework controller at {} (namespace {}, hived: {})",
        config.controller.base_uri, config.controller.namespace, config.scheduler.hived_enabled
    );

    let kube_client = kube::Client::try_default().await?;
    let secrets = Arc::new(KubeSecretStore::new(kube_client, &config.users.namespace));
    let users = UserManager::new(secrets, config.users.admin_group.clone());
    let jobs = ControllerClient::new(&config)?;

    let server = Server::new(jobs, users);

    info!("Starting server on {}", config.server.addr);
    server.start(&config.server.addr).await?;

    Ok(())
}
