use std::path::PathBuf;
use std::sync::Arc;

use eyre::WrapErr;
use net_literals::addr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lx200_altaz_mount::controller::responder::CommandResponder;
use lx200_altaz_mount::{server, Config, Environment, MountController};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)?;

    let env = Environment::new();
    let controller = Arc::new(MountController::new(&config, env.clone()));
    controller.start().await;

    let responder = Arc::new(CommandResponder::new(Arc::clone(&controller), env));
    let listener = TcpListener::bind(addr!("0.0.0.0:11880"))
        .await
        .wrap_err("binding the LX200 port")?;

    tokio::select! {
        result = server::run(responder, listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted."),
    }

    controller.stop().await;
    Ok(())
}

fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".config/lx200-altaz-mount/config.json")
}
