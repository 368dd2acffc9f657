// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys recognized on pod templates
pub mod annotations {
    /// When set to "true", enables secret-change tracking for this workload
    pub const RELOAD_ON_SECRET_CHANGE: &str = "vault-reloader.io/reload-on-secret-change";
    /// Counter bumped by the reloader to trigger a rolling restart
    pub const SECRET_RELOAD_COUNT: &str = "vault-reloader.io/secret-reload-count";
    /// Comma-separated list of additional Vault paths to track
    pub const VAULT_FROM_PATH: &str = "vault-reloader.io/vault-from-path";
    /// Deprecated alias of VAULT_FROM_PATH, consulted only when the primary key is unset
    pub const VAULT_FROM_PATH_DEPRECATED: &str = "vault-reloader.io/vault-env-from-path";
}

/// The operator name used in logs and user agents
pub const OPERATOR_NAME: &str = "vault-reloader";

/// Where the pod's projected service account token is mounted
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";
