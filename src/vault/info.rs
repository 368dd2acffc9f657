// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Classification of raw Vault read responses into KV and dynamic secrets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{ReloaderError, Result};

/// The subset of a Vault logical read response the reloader cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultResponse {
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub lease_duration: i64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Read-by-path seam over the Vault client, mockable in tests.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Read a logical path. `Ok(None)` means the path does not exist.
    async fn read_raw(&self, path: &str) -> Result<Option<VaultResponse>>;
}

/// Lease descriptor of a dynamic secret.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicSecretLease {
    pub lease_id: String,
    pub lease_duration: i64,
    pub lease_expiry: DateTime<Utc>,
    pub secret_path: String,
    pub renewable: bool,
}

/// A classified secret. A response with a lease id is dynamic regardless of
/// any KV fields; everything else must carry an integer `metadata.version`.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretInfo {
    Kv { version: i64 },
    Dynamic { lease: DynamicSecretLease },
}

/// Read and classify the secret at `path`.
pub async fn secret_info(source: &dyn SecretSource, path: &str) -> Result<SecretInfo> {
    let Some(response) = source.read_raw(path).await? else {
        return Err(ReloaderError::SecretNotFound { path: path.to_string() });
    };

    if !response.lease_id.is_empty() {
        return Ok(SecretInfo::Dynamic {
            lease: lease_from_response(&response, path),
        });
    }

    let version = response
        .data
        .as_ref()
        .and_then(|d| d.get("metadata"))
        .and_then(|m| m.get("version"))
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| ReloaderError::Classification { path: path.to_string() })?;

    Ok(SecretInfo::Kv { version })
}

/// Re-read a dynamic secret to obtain fresh credentials under a new lease.
pub async fn renew_lease(
    source: &dyn SecretSource,
    lease: &DynamicSecretLease,
) -> Result<DynamicSecretLease> {
    let Some(response) = source.read_raw(&lease.secret_path).await? else {
        return Err(ReloaderError::SecretNotFound {
            path: lease.secret_path.clone(),
        });
    };

    if response.lease_id.is_empty() {
        return Err(ReloaderError::NoLongerDynamic {
            path: lease.secret_path.clone(),
        });
    }

    Ok(lease_from_response(&response, &lease.secret_path))
}

fn lease_from_response(response: &VaultResponse, path: &str) -> DynamicSecretLease {
    DynamicSecretLease {
        lease_id: response.lease_id.clone(),
        lease_duration: response.lease_duration,
        lease_expiry: Utc::now() + chrono::Duration::seconds(response.lease_duration),
        secret_path: path.to_string(),
        renewable: response.renewable,
    }
}
