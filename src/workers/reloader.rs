// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reloader worker - periodically diffs tracked secrets against Vault and
//! rolls workloads whose secrets have changed.
//!
//! A round runs in three phases: the KV version check fans out one read per
//! tracked secret, the TTL check walks the tracking table, and the rollout
//! fans out one update per marked workload. The version check completes
//! before the TTL check so that a detected KV change wins when both apply to
//! the same workload, and a workload is never restarted twice in one round.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::api::PostParams;
use kube::{Api, Client};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::VaultConfig;
use crate::constants::annotations;
use crate::error::{ReloaderError, Result};
use crate::store::WorkloadSecretStore;
use crate::types::{SecretRef, WorkloadKey, WorkloadKind, WorkloadResource};
use crate::vault::{secret_info, SecretInfo, SecretSource, SecretSourceProvider};

const REASON_KV_CHANGED: &str = "KV secret version changed";
const REASON_TTL_REACHED: &str = "dynamic secret TTL threshold reached";

pub struct Reloader {
    client: Client,
    store: Arc<WorkloadSecretStore>,
    vault: Arc<dyn SecretSourceProvider>,
    config: VaultConfig,
    run_period: Duration,
    /// Versions observed in the previous round, replaced wholesale each round
    /// so paths dropped from the index do not linger.
    secret_versions: Mutex<HashMap<String, i64>>,
}

impl Reloader {
    pub fn new(
        client: Client,
        store: Arc<WorkloadSecretStore>,
        vault: Arc<dyn SecretSourceProvider>,
        config: VaultConfig,
        run_period: Duration,
    ) -> Self {
        Self {
            client,
            store,
            vault,
            config,
            run_period,
            secret_versions: Mutex::new(HashMap::new()),
        }
    }

    /// Run rounds at the configured period until cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) -> anyhow::Result<()> {
        info!(worker = "reloader", "reloader started");
        let mut ticker = tokio::time::interval(self.run_period);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        Ok(())
    }

    async fn tick(&self) {
        if self.store.is_empty().await {
            info!(worker = "reloader", "no workloads to monitor");
            return;
        }

        let source = match self.vault.secret_source().await {
            Ok(source) => source,
            Err(err) => {
                error!(worker = "reloader", error = %err, "failed to initialize Vault client");
                return;
            }
        };

        self.run_round(source.as_ref(), Utc::now()).await;
    }

    /// One reconciliation round against the given source, at the given time.
    pub(crate) async fn run_round(&self, source: &dyn SecretSource, now: DateTime<Utc>) {
        let by_secret = self.store.snapshot_by_secret().await;

        // Phase A: check every tracked KV secret for a version change.
        let marked = Mutex::new(HashMap::<WorkloadKey, &'static str>::new());
        let fresh_versions = Mutex::new(HashMap::<String, i64>::new());

        let checks: Vec<_> = by_secret
            .iter()
            .filter(|(secret, _)| secret.is_kv)
            .map(|(secret, workloads)| {
                self.check_kv_secret(secret, workloads, source, &marked, &fresh_versions)
            })
            .collect();
        futures::future::join_all(checks).await;

        // Phase B: time-based restarts for dynamic secrets.
        let mut marked = marked.into_inner();
        let tracking = self.store.snapshot_tracking().await;
        for (workload, info) in &tracking {
            if marked.contains_key(workload) {
                continue;
            }
            if info.shortest_dynamic_ttl_seconds <= 0 {
                continue;
            }

            let elapsed = (now - info.last_restart_time).num_seconds();
            let threshold = (info.shortest_dynamic_ttl_seconds as f64
                * self.config.dynamic_secret_restart_threshold) as i64;
            if elapsed >= threshold {
                info!(
                    worker = "reloader",
                    workload = %workload,
                    elapsed,
                    threshold,
                    ttl = info.shortest_dynamic_ttl_seconds,
                    "workload needs restart: dynamic secret TTL threshold reached"
                );
                marked.insert(workload.clone(), REASON_TTL_REACHED);
            }
        }

        // Phase C: roll every marked workload.
        let rollouts: Vec<_> = marked
            .iter()
            .map(|(workload, reason)| self.rollout(workload, reason, now))
            .collect();
        futures::future::join_all(rollouts).await;

        if marked.is_empty() {
            info!(
                worker = "reloader",
                monitored = tracking.len(),
                "no workloads need restart"
            );
        } else {
            info!(worker = "reloader", count = marked.len(), "triggered rolling restarts");
        }

        *self.secret_versions.lock().await = fresh_versions.into_inner();
    }

    async fn check_kv_secret(
        &self,
        secret: &SecretRef,
        workloads: &[WorkloadKey],
        source: &dyn SecretSource,
        marked: &Mutex<HashMap<WorkloadKey, &'static str>>,
        fresh_versions: &Mutex<HashMap<String, i64>>,
    ) {
        debug!(worker = "reloader", path = %secret.path, "checking secret");

        let current = match secret_info(source, &secret.path).await {
            Ok(current) => current,
            Err(err) => {
                self.handle_secret_error(&err, &secret.path);
                return;
            }
        };

        let SecretInfo::Kv { version } = current else {
            // the path now serves a dynamic secret; nothing to diff
            return;
        };

        fresh_versions.lock().await.insert(secret.path.clone(), version);
        if version == secret.kv_version {
            return;
        }

        let mut marked = marked.lock().await;
        for workload in workloads {
            info!(
                worker = "reloader",
                path = %secret.path,
                from = secret.kv_version,
                to = version,
                workload = %workload,
                "KV secret version changed"
            );
            marked.entry(workload.clone()).or_insert(REASON_KV_CHANGED);
            self.store.update_kv_version(workload, &secret.path, version).await;
        }
    }

    async fn rollout(&self, workload: &WorkloadKey, reason: &str, now: DateTime<Utc>) {
        info!(worker = "reloader", workload = %workload, reason, "triggering rolling restart");

        match reload_workload(&self.client, workload).await {
            Ok(()) => {
                self.store.set_last_restart(workload, now).await;
                info!(worker = "reloader", workload = %workload, "successfully triggered rolling restart");
            }
            Err(err) => {
                error!(worker = "reloader", workload = %workload, error = %err, "failed to restart workload");
            }
        }
    }

    fn handle_secret_error(&self, err: &ReloaderError, path: &str) {
        match err {
            ReloaderError::SecretNotFound { .. } if self.config.ignore_missing_secrets => {
                warn!(
                    worker = "reloader",
                    path,
                    "path not found - this is not an error since missing secrets can be \
                     ignored according to the configuration you've set \
                     (env: VAULT_IGNORE_MISSING_SECRETS)"
                );
            }
            ReloaderError::SecretNotFound { .. } => {
                error!(worker = "reloader", path, "secret path not found");
            }
            _ => {
                error!(worker = "reloader", path, error = %err, "failed to get secret version");
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn known_versions(&self) -> HashMap<String, i64> {
        self.secret_versions.lock().await.clone()
    }
}

/// Trigger a rolling restart by bumping the reload-count annotation on the
/// workload's pod template.
pub(crate) async fn reload_workload(client: &Client, workload: &WorkloadKey) -> Result<()> {
    match workload.kind {
        WorkloadKind::Deployment => restart::<Deployment>(client, workload).await,
        WorkloadKind::DaemonSet => restart::<DaemonSet>(client, workload).await,
        WorkloadKind::StatefulSet => restart::<StatefulSet>(client, workload).await,
    }
}

async fn restart<K: WorkloadResource>(client: &Client, workload: &WorkloadKey) -> Result<()> {
    let api: Api<K> = Api::namespaced(client.clone(), &workload.namespace);
    let mut resource = api.get(&workload.name).await?;
    if let Some(template) = resource.pod_template_mut() {
        increment_reload_count(template);
    }
    api.replace(&workload.name, &PostParams::default(), &resource).await?;
    Ok(())
}

/// Bump the reload counter, starting over at "1" when it is absent or not an
/// integer.
fn increment_reload_count(template: &mut PodTemplateSpec) {
    let annotations = template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(Default::default);

    let mut next = "1".to_string();
    if let Some(current) = annotations.get(annotations::SECRET_RELOAD_COUNT) {
        if let Ok(count) = current.parse::<i64>() {
            next = (count + 1).to_string();
        }
    }

    annotations.insert(annotations::SECRET_RELOAD_COUNT.to_string(), next);
}
