// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::env;
use std::time::Duration;

/// Fraction of a dynamic secret's TTL after which its consumers are restarted
const DEFAULT_DYNAMIC_SECRET_RESTART_THRESHOLD: f64 = 0.7;

/// Controller configuration. Durations come from CLI flags, everything else
/// from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub vault: VaultConfig,
    /// When set, watch only this namespace instead of the whole cluster
    pub watch_namespace: Option<String>,
    /// Bind address of the health endpoint
    pub listen_address: String,
    pub collector_sync_period: Duration,
    pub reloader_run_period: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let watch_namespace = env::var("POD_NAMESPACE").ok().filter(|ns| !ns.is_empty());
        let listen_address =
            env::var("LISTEN_ADDRESS").ok().filter(|a| !a.is_empty()).unwrap_or_else(|| ":8080".to_string());

        Config {
            vault: VaultConfig::from_env(),
            watch_namespace,
            listen_address,
            collector_sync_period: Duration::from_secs(30),
            reloader_run_period: Duration::from_secs(60),
        }
    }
}

/// Vault connection and behavior configuration, loaded from environment
/// variables. Every value has a usable default, so loading never fails.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub addr: String,
    pub auth_method: String,
    pub role: String,
    /// Mount path of the auth method used for login
    pub auth_path: String,
    pub namespace: String,
    pub skip_verify: bool,
    /// Name of a Kubernetes secret carrying a ca.crt bundle, empty to disable
    pub tls_secret: String,
    pub tls_secret_ns: String,
    pub client_timeout: Duration,
    /// Downgrade missing-secret errors to warnings
    pub ignore_missing_secrets: bool,
    pub dynamic_secret_restart_threshold: f64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            addr: "https://vault:8200".to_string(),
            auth_method: "jwt".to_string(),
            role: String::new(),
            auth_path: "kubernetes".to_string(),
            namespace: "default".to_string(),
            skip_verify: false,
            tls_secret: String::new(),
            tls_secret_ns: "default".to_string(),
            client_timeout: Duration::from_secs(10),
            ignore_missing_secrets: false,
            dynamic_secret_restart_threshold: DEFAULT_DYNAMIC_SECRET_RESTART_THRESHOLD,
        }
    }
}

impl VaultConfig {
    pub fn from_env() -> Self {
        let mut config = VaultConfig::default();

        if let Some(addr) = non_empty_var("VAULT_ADDR") {
            config.addr = addr;
        }
        if let Some(auth_method) = non_empty_var("VAULT_AUTH_METHOD") {
            config.auth_method = auth_method;
        }
        if let Some(role) = non_empty_var("VAULT_ROLE") {
            config.role = role;
        }
        if let Some(auth_path) = non_empty_var("VAULT_PATH") {
            config.auth_path = auth_path;
        }
        if let Some(namespace) = non_empty_var("VAULT_NAMESPACE") {
            config.namespace = namespace;
        }
        config.skip_verify = bool_var("VAULT_SKIP_VERIFY");
        if let Some(tls_secret) = non_empty_var("VAULT_TLS_SECRET") {
            config.tls_secret = tls_secret;
        }
        if let Some(tls_secret_ns) = non_empty_var("VAULT_TLS_SECRET_NS") {
            config.tls_secret_ns = tls_secret_ns;
        }
        if let Some(timeout) = non_empty_var("VAULT_CLIENT_TIMEOUT")
            .and_then(|v| humantime::parse_duration(&v).ok())
        {
            config.client_timeout = timeout;
        }
        config.ignore_missing_secrets = bool_var("VAULT_IGNORE_MISSING_SECRETS");
        if let Some(threshold) = non_empty_var("VAULT_DYNAMIC_SECRET_RESTART_THRESHOLD")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|t| *t > 0.0)
        {
            config.dynamic_secret_restart_threshold = threshold;
        }

        config
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn bool_var(name: &str) -> bool {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(false)
}
