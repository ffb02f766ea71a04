use clap::Parser;
use oidcgate::{config::Config, setup_tracing, start_server_with_config};
use std::path::PathBuf;

/// OpenID Connect relying-party demo server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "OIDCGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format ("json" or "text"), overrides the config file
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let format = args.log_format.as_deref().or(config.logging.format.as_deref());
    setup_tracing(&config.logging.level, format);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Start the server in a background task so we can listen for Ctrl-C in the main task
    let mut server_task = tokio::spawn(start_server_with_config(config, shutdown_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("shutdown requested, stopping server...");
            let _ = shutdown_tx.send(());
            server_task.await??;
        }
        result = &mut server_task => {
            result??;
        }
    }

    Ok(())
}
