// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReloaderError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Vault request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Vault error: {0}")]
    Vault(String),

    #[error("Vault authentication failed: {0}")]
    Auth(String),

    #[error("Vault secret path {path} not found")]
    SecretNotFound { path: String },

    #[error("secret at path {path} has no version metadata (not a KV v2 or dynamic secret)")]
    Classification { path: String },

    #[error("secret at path {path} is no longer a dynamic secret")]
    NoLongerDynamic { path: String },
}

pub type Result<T> = std::result::Result<T, ReloaderError>;
