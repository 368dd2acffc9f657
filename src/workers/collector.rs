// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Collector worker - watches workloads and maintains the secret index.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ListParams;
use kube::{Api, Client};
use kube_runtime::watcher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::constants::annotations;
use crate::parser;
use crate::store::WorkloadSecretStore;
use crate::types::{workload_key, SecretRef, WorkloadKey, WorkloadResource};
use crate::vault::{secret_info, SecretInfo, SecretSource, SecretSourceProvider};

pub struct Collector {
    client: Client,
    store: Arc<WorkloadSecretStore>,
    vault: Arc<dyn SecretSourceProvider>,
    watch_namespace: Option<String>,
    sync_period: Duration,
}

impl Collector {
    pub fn new(
        client: Client,
        store: Arc<WorkloadSecretStore>,
        vault: Arc<dyn SecretSourceProvider>,
        watch_namespace: Option<String>,
        sync_period: Duration,
    ) -> Self {
        Self {
            client,
            store,
            vault,
            watch_namespace,
            sync_period,
        }
    }

    /// Watch one workload kind and keep the index in sync with its events.
    pub async fn watch<K: WorkloadResource>(
        self: Arc<Self>,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        let api = self.workload_api::<K>();
        let mut stream = watcher(api, watcher::Config::default()).boxed();

        info!(worker = "collector", kind = %K::KIND, "watching workloads");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = stream.try_next() => match event {
                    Ok(Some(watcher::Event::Apply(resource) | watcher::Event::InitApply(resource))) => {
                        self.handle_apply(&resource).await;
                    }
                    Ok(Some(watcher::Event::Delete(resource))) => {
                        self.handle_delete(&resource).await;
                    }
                    Ok(Some(watcher::Event::Init | watcher::Event::InitDone)) => {}
                    Ok(None) => break,
                    Err(err) => {
                        error!(worker = "collector", kind = %K::KIND, error = %err, "watch stream error");
                    }
                }
            }
        }

        Ok(())
    }

    /// Periodically re-list all watched kinds and re-run the apply handler,
    /// healing any drift the watch streams may have missed.
    pub async fn resync(self: Arc<Self>, token: CancellationToken) -> anyhow::Result<()> {
        let start = tokio::time::Instant::now() + self.sync_period;
        let mut ticker = tokio::time::interval_at(start, self.sync_period);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.resync_kind::<Deployment>().await;
                    self.resync_kind::<DaemonSet>().await;
                    self.resync_kind::<StatefulSet>().await;
                }
            }
        }

        Ok(())
    }

    async fn resync_kind<K: WorkloadResource>(&self) {
        let api = self.workload_api::<K>();
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for resource in &list.items {
                    self.handle_apply(resource).await;
                }
            }
            Err(err) => {
                error!(worker = "collector", kind = %K::KIND, error = %err, "failed to list workloads for resync");
            }
        }
    }

    fn workload_api<K: WorkloadResource>(&self) -> Api<K> {
        match &self.watch_namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// React to an added or updated workload. A workload without the opt-in
    /// annotation, or whose template yields no unversioned references, is
    /// dropped from the index.
    pub(crate) async fn handle_apply<K: WorkloadResource>(&self, resource: &K) {
        let workload = workload_key(resource);

        let opted_in = resource
            .pod_template()
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.annotations.as_ref())
            .and_then(|a| a.get(annotations::RELOAD_ON_SECRET_CHANGE))
            .is_some_and(|v| v == "true");
        if !opted_in {
            self.store.delete(&workload).await;
            return;
        }

        debug!(worker = "collector", workload = %workload, "processing workload");

        let paths = match resource.pod_template() {
            Some(template) => parser::collect_paths(template),
            None => Vec::new(),
        };
        if paths.is_empty() {
            debug!(worker = "collector", workload = %workload, "no Vault secret paths found in pod template");
            self.store.delete(&workload).await;
            return;
        }
        debug!(worker = "collector", workload = %workload, ?paths, "Vault secret paths found");

        let source = match self.vault.secret_source().await {
            Ok(source) => source,
            Err(err) => {
                error!(worker = "collector", error = %err, "failed to initialize Vault client");
                return;
            }
        };

        self.collect_workload_secrets(&workload, &paths, source.as_ref()).await;
        self.track_restart_time(&workload, resource.selector()).await;
    }

    pub(crate) async fn handle_delete<K: WorkloadResource>(&self, resource: &K) {
        let workload = workload_key(resource);
        debug!(worker = "collector", workload = %workload, "removing workload from store");
        self.store.delete(&workload).await;
    }

    /// Classify each path and replace the workload's entry in the index.
    /// Dynamic refs already tracked for this workload are reused without a
    /// Vault round-trip; their TTL only changes across restarts.
    pub(crate) async fn collect_workload_secrets(
        &self,
        workload: &WorkloadKey,
        paths: &[String],
        source: &dyn SecretSource,
    ) {
        let dynamic_by_path: HashMap<String, SecretRef> = self
            .store
            .get(workload)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.is_dynamic)
            .map(|s| (s.path.clone(), s))
            .collect();

        let mut secrets = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(existing) = dynamic_by_path.get(path) {
                debug!(
                    worker = "collector",
                    path = %path,
                    ttl = existing.dynamic_ttl_seconds,
                    "secret is dynamic, reusing tracked lease TTL"
                );
                secrets.push(existing.clone());
                continue;
            }

            match secret_info(source, path).await {
                Ok(SecretInfo::Kv { version }) => {
                    debug!(worker = "collector", path = %path, version, "secret is KV v2");
                    secrets.push(SecretRef::kv(path, version));
                }
                Ok(SecretInfo::Dynamic { lease }) => {
                    debug!(
                        worker = "collector",
                        path = %path,
                        ttl = lease.lease_duration,
                        "secret is dynamic"
                    );
                    secrets.push(SecretRef::dynamic(path, lease.lease_duration));
                }
                Err(err) => {
                    error!(worker = "collector", path = %path, error = %err, "failed to get secret info");
                    continue;
                }
            }
        }

        self.store.upsert(workload.clone(), secrets).await;
        info!(worker = "collector", workload = %workload, "collected secrets");
    }

    /// List the workload's pods and seed its restart tracking.
    async fn track_restart_time(&self, workload: &WorkloadKey, selector: Option<&LabelSelector>) {
        let Some(labels) = selector.and_then(selector_labels) else {
            return;
        };

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &workload.namespace);
        match pods.list(&ListParams::default().labels(&labels)).await {
            Ok(list) => self.track_workload_restart_time(workload, &list.items).await,
            Err(err) => {
                debug!(worker = "collector", workload = %workload, error = %err, "failed to list pods for tracking");
            }
        }
    }

    /// Record the workload's effective last restart time (the oldest running
    /// non-terminating pod's start time) and its shortest dynamic TTL.
    /// Nothing is recorded while no pod is running.
    pub(crate) async fn track_workload_restart_time(&self, workload: &WorkloadKey, pods: &[Pod]) {
        let Some(secrets) = self.store.get(workload).await else {
            return;
        };

        let shortest_ttl = secrets
            .iter()
            .filter(|s| s.is_dynamic && s.dynamic_ttl_seconds > 0)
            .map(|s| s.dynamic_ttl_seconds)
            .min()
            .unwrap_or(0);

        let mut oldest_start: Option<DateTime<Utc>> = None;
        for pod in pods {
            let Some(start_time) = pod.status.as_ref().and_then(|s| s.start_time.as_ref()) else {
                continue;
            };
            if pod.status.as_ref().and_then(|s| s.phase.as_deref()) != Some("Running") {
                continue;
            }
            if pod.metadata.deletion_timestamp.is_some() {
                continue;
            }
            if oldest_start.is_none_or(|oldest| start_time.0 < oldest) {
                oldest_start = Some(start_time.0);
            }
        }

        if let Some(oldest_start) = oldest_start {
            self.store.upsert_tracking(workload.clone(), oldest_start, shortest_ttl).await;
        }
    }
}

fn selector_labels(selector: &LabelSelector) -> Option<String> {
    let labels = selector.match_labels.as_ref()?;
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}
