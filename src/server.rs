// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Health endpoint: GET on any path answers 200 `ok`.

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run_health_server(
    listen_address: String,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = normalize_listen_address(&listen_address);
    let app = Router::new().fallback(health);

    let listener = TcpListener::bind(&addr).await?;
    info!(addr, "health endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// A leading-colon address like ":8080" binds all interfaces.
fn normalize_listen_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_listen_address() {
        assert_eq!(normalize_listen_address(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_listen_address("127.0.0.1:9090"), "127.0.0.1:9090");
    }
}
