// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vault_reloader::config::Config;
use vault_reloader::controller::Controller;
use vault_reloader::server::run_health_server;

#[derive(Parser, Debug)]
#[command(name = "vault-reloader", version, about = "Restarts workloads when their Vault secrets change", long_about = None)]
struct Args {
    /// Minimum frequency at which watched workloads are re-listed and re-collected
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    collector_sync_period: Duration,

    /// Frequency at which tracked secrets are checked and workloads reloaded
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    reloader_run_period: Duration,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    enable_json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.enable_json_log);

    info!("Starting vault-reloader controller");

    let mut config = Config::from_env();
    config.collector_sync_period = args.collector_sync_period;
    config.reloader_run_period = args.reloader_run_period;

    let client = Client::try_default()
        .await
        .context("error building Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let token = CancellationToken::new();

    {
        let listen_address = config.listen_address.clone();
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(err) = run_health_server(listen_address, token).await {
                error!(error = %err, "health server error");
            }
        });
    }

    let controller = Controller::new(client, config);
    let mut controller_handle = tokio::spawn(controller.run(token.clone()));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            token.cancel();
            controller_handle.await??;
        }
        result = &mut controller_handle => {
            token.cancel();
            result??;
        }
    }

    info!("Shut down cleanly");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Level comes from the flag unless RUST_LOG overrides it; an unparsable
/// level silently falls back to info.
fn init_tracing(log_level: &str, enable_json_log: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if enable_json_log {
        builder.json().init();
    } else {
        builder.init();
    }
}
