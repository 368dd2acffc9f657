// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Narrow adapter over Vault's read-by-path HTTP API: client lifecycle,
//! secret classification, and lease renewal.

pub mod client;
pub mod info;

pub use client::{SecretSourceProvider, VaultHandle, VaultHttpClient};
pub use info::{
    renew_lease, secret_info, DynamicSecretLease, SecretInfo, SecretSource, VaultResponse,
};
