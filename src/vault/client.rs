// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Vault HTTP client lifecycle: authentication, TLS trust, health checks.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::VaultConfig;
use crate::constants::SERVICE_ACCOUNT_TOKEN_PATH;
use crate::error::{ReloaderError, Result};
use crate::vault::info::{SecretSource, VaultResponse};

/// Seam the workers use to obtain a healthy [`SecretSource`] at the start of
/// each run, so tests can inject an in-memory source.
#[async_trait]
pub trait SecretSourceProvider: Send + Sync {
    async fn secret_source(&self) -> Result<Arc<dyn SecretSource>>;
}

#[async_trait]
impl SecretSourceProvider for VaultHandle {
    async fn secret_source(&self) -> Result<Arc<dyn SecretSource>> {
        let client = self.ensure_client().await?;
        Ok(client as Arc<dyn SecretSource>)
    }
}

/// Process-wide handle that caches a live Vault client. Before each worker
/// run the cached client is health-checked; on failure it is discarded and a
/// new one is built on next use.
pub struct VaultHandle {
    kube_client: Client,
    config: VaultConfig,
    client: Mutex<Option<Arc<VaultHttpClient>>>,
}

impl VaultHandle {
    pub fn new(kube_client: Client, config: VaultConfig) -> Self {
        Self {
            kube_client,
            config,
            client: Mutex::new(None),
        }
    }

    /// Return a healthy client, rebuilding it when the cached one has gone
    /// stale or none exists yet.
    pub async fn ensure_client(&self) -> Result<Arc<VaultHttpClient>> {
        let mut cached = self.client.lock().await;

        if let Some(existing) = cached.as_ref() {
            if existing.health().await.is_ok() {
                return Ok(existing.clone());
            }
            error!("connection to Vault lost, recreating client");
            *cached = None;
        }

        info!("Initializing Vault client");
        let client = Arc::new(self.build_client().await?);
        client
            .health()
            .await
            .map_err(|err| ReloaderError::Vault(format!("testing connection to Vault failed: {err}")))?;

        *cached = Some(client.clone());
        info!("Vault client initialized");
        Ok(client)
    }

    async fn build_client(&self) -> Result<VaultHttpClient> {
        let mut builder = reqwest::Client::builder().timeout(self.config.client_timeout);

        if self.config.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if !self.config.tls_secret.is_empty() {
            let pem = self.read_ca_bundle().await?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        let http = builder.build()?;
        let addr = self.config.addr.trim_end_matches('/').to_string();
        let token = self.authenticate(&http, &addr).await?;

        Ok(VaultHttpClient {
            http,
            addr,
            namespace: self.config.namespace.clone(),
            token,
        })
    }

    /// Fetch the CA bundle from the configured Kubernetes secret.
    async fn read_ca_bundle(&self) -> Result<Vec<u8>> {
        let secrets: Api<Secret> =
            Api::namespaced(self.kube_client.clone(), &self.config.tls_secret_ns);
        let secret = secrets.get(&self.config.tls_secret).await.map_err(|err| {
            ReloaderError::Vault(format!("failed to read Vault TLS Secret: {err}"))
        })?;

        secret
            .data
            .as_ref()
            .and_then(|d| d.get("ca.crt"))
            .map(|pem| pem.0.clone())
            .ok_or_else(|| {
                ReloaderError::Vault(format!(
                    "Vault TLS Secret {} has no ca.crt key",
                    self.config.tls_secret
                ))
            })
    }

    /// An explicit VAULT_TOKEN wins; otherwise log in with the pod's service
    /// account JWT against the configured auth mount.
    async fn authenticate(&self, http: &reqwest::Client, addr: &str) -> Result<String> {
        if let Ok(token) = env::var("VAULT_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }

        match self.config.auth_method.as_str() {
            "jwt" | "kubernetes" => {
                let jwt = tokio::fs::read_to_string(SERVICE_ACCOUNT_TOKEN_PATH)
                    .await
                    .map_err(|err| {
                        ReloaderError::Auth(format!("failed to read service account token: {err}"))
                    })?;

                let url = format!("{}/v1/auth/{}/login", addr, self.config.auth_path);
                let response = http
                    .post(&url)
                    .json(&serde_json::json!({
                        "jwt": jwt.trim(),
                        "role": self.config.role,
                    }))
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(ReloaderError::Auth(format!(
                        "login at auth/{} returned {}",
                        self.config.auth_path,
                        response.status()
                    )));
                }

                let login: LoginResponse = response.json().await?;
                Ok(login.auth.client_token)
            }
            other => Err(ReloaderError::Auth(format!(
                "unsupported auth method: {other}"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: AuthBlock,
}

#[derive(Debug, Deserialize)]
struct AuthBlock {
    client_token: String,
}

/// An authenticated client bound to one Vault address.
pub struct VaultHttpClient {
    http: reqwest::Client,
    addr: String,
    namespace: String,
    token: String,
}

impl VaultHttpClient {
    /// Ping the health endpoint. A standby response (429) is still healthy.
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/v1/sys/health", self.addr);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status.is_success() || status.as_u16() == 429 {
            Ok(())
        } else {
            Err(ReloaderError::Vault(format!(
                "health check returned {status}"
            )))
        }
    }
}

#[async_trait]
impl SecretSource for VaultHttpClient {
    async fn read_raw(&self, path: &str) -> Result<Option<VaultResponse>> {
        let url = format!("{}/v1/{}", self.addr, path);
        let mut request = self.http.get(&url).header("X-Vault-Token", &self.token);
        if !self.namespace.is_empty() {
            request = request.header("X-Vault-Namespace", &self.namespace);
        }

        let response = request.send().await?;
        match response.status() {
            status if status.as_u16() == 404 => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<VaultResponse>().await?)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ReloaderError::Vault(format!(
                    "reading {path} returned {status}: {body}"
                )))
            }
        }
    }
}
