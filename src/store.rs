// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Shared bidirectional index of workloads and the Vault secrets they use.
//!
//! Only the workload → secrets direction is stored; the inverse view is
//! derived on demand under the read lock. Snapshots are owned copies, so
//! callers never iterate while holding the lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::{SecretRef, WorkloadKey, WorkloadTracking};

#[derive(Debug, Default)]
pub struct WorkloadSecretStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    by_workload: HashMap<WorkloadKey, Vec<SecretRef>>,
    tracking: HashMap<WorkloadKey, WorkloadTracking>,
}

impl WorkloadSecretStore {
    /// Atomically replace the secret refs tracked for a workload.
    pub async fn upsert(&self, workload: WorkloadKey, secrets: Vec<SecretRef>) {
        let mut inner = self.inner.write().await;
        inner.by_workload.insert(workload, secrets);
    }

    /// Remove a workload from the index and from restart tracking.
    pub async fn delete(&self, workload: &WorkloadKey) {
        let mut inner = self.inner.write().await;
        inner.by_workload.remove(workload);
        inner.tracking.remove(workload);
    }

    pub async fn get(&self, workload: &WorkloadKey) -> Option<Vec<SecretRef>> {
        self.inner.read().await.by_workload.get(workload).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_workload.is_empty()
    }

    pub async fn snapshot_by_workload(&self) -> HashMap<WorkloadKey, Vec<SecretRef>> {
        self.inner.read().await.by_workload.clone()
    }

    /// Derive the secret → workloads view from the stored direction.
    pub async fn snapshot_by_secret(&self) -> HashMap<SecretRef, Vec<WorkloadKey>> {
        let inner = self.inner.read().await;
        let mut by_secret: HashMap<SecretRef, Vec<WorkloadKey>> = HashMap::new();
        for (workload, secrets) in &inner.by_workload {
            for secret in secrets {
                by_secret.entry(secret.clone()).or_default().push(workload.clone());
            }
        }
        by_secret
    }

    /// Record a new KV version for one path of one workload. No-op when the
    /// workload or path is not present.
    pub async fn update_kv_version(&self, workload: &WorkloadKey, path: &str, version: i64) {
        let mut inner = self.inner.write().await;
        if let Some(secrets) = inner.by_workload.get_mut(workload) {
            for secret in secrets.iter_mut().filter(|s| s.path == path) {
                secret.kv_version = version;
            }
        }
    }

    pub async fn upsert_tracking(
        &self,
        workload: WorkloadKey,
        last_restart_time: DateTime<Utc>,
        shortest_dynamic_ttl_seconds: i64,
    ) {
        let mut inner = self.inner.write().await;
        inner.tracking.insert(
            workload,
            WorkloadTracking {
                last_restart_time,
                shortest_dynamic_ttl_seconds,
            },
        );
    }

    /// Update the last restart time of an already-tracked workload. No-op
    /// when the workload has no tracking entry.
    pub async fn set_last_restart(&self, workload: &WorkloadKey, time: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(tracking) = inner.tracking.get_mut(workload) {
            tracking.last_restart_time = time;
        }
    }

    pub async fn get_tracking(&self, workload: &WorkloadKey) -> Option<WorkloadTracking> {
        self.inner.read().await.tracking.get(workload).copied()
    }

    pub async fn snapshot_tracking(&self) -> HashMap<WorkloadKey, WorkloadTracking> {
        self.inner.read().await.tracking.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkloadKind;

    fn workload(name: &str, kind: WorkloadKind) -> WorkloadKey {
        WorkloadKey {
            name: name.to_string(),
            namespace: "default".to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_snapshot() {
        let store = WorkloadSecretStore::default();
        let workload1 = workload("test", WorkloadKind::Deployment);
        let workload2 = workload("test2", WorkloadKind::DaemonSet);

        store
            .upsert(
                workload1.clone(),
                vec![SecretRef::kv("secret/data/accounts/aws", 1), SecretRef::kv("secret/data/mysql", 1)],
            )
            .await;
        store
            .upsert(
                workload2.clone(),
                vec![SecretRef::kv("secret/data/accounts/aws", 1), SecretRef::kv("secret/data/docker", 1)],
            )
            .await;

        let by_workload = store.snapshot_by_workload().await;
        assert_eq!(by_workload.len(), 2);
        assert_eq!(by_workload[&workload1].len(), 2);
        assert_eq!(by_workload[&workload2].len(), 2);
    }

    #[tokio::test]
    async fn test_by_secret_is_inverse_of_by_workload() {
        let store = WorkloadSecretStore::default();
        let workload1 = workload("test", WorkloadKind::Deployment);
        let workload2 = workload("test2", WorkloadKind::DaemonSet);

        let shared = SecretRef::kv("secret/data/accounts/aws", 1);
        store
            .upsert(workload1.clone(), vec![shared.clone(), SecretRef::kv("secret/data/mysql", 1)])
            .await;
        store
            .upsert(workload2.clone(), vec![shared.clone(), SecretRef::kv("secret/data/docker", 1)])
            .await;

        let by_secret = store.snapshot_by_secret().await;
        let mut shared_workloads = by_secret[&shared].clone();
        shared_workloads.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(shared_workloads, vec![workload1.clone(), workload2.clone()]);
        assert_eq!(by_secret[&SecretRef::kv("secret/data/mysql", 1)], vec![workload1.clone()]);
        assert_eq!(by_secret[&SecretRef::kv("secret/data/docker", 1)], vec![workload2.clone()]);

        // every (workload, secret) pair appears in exactly one direction's image
        let by_workload = store.snapshot_by_workload().await;
        let pairs_forward: usize = by_workload.values().map(Vec::len).sum();
        let pairs_inverse: usize = by_secret.values().map(Vec::len).sum();
        assert_eq!(pairs_forward, pairs_inverse);
    }

    #[tokio::test]
    async fn test_delete_removes_both_directions_and_tracking() {
        let store = WorkloadSecretStore::default();
        let workload1 = workload("test", WorkloadKind::Deployment);

        store
            .upsert(workload1.clone(), vec![SecretRef::dynamic("database/creds/readonly", 3600)])
            .await;
        store.upsert_tracking(workload1.clone(), Utc::now(), 3600).await;

        store.delete(&workload1).await;

        assert!(store.snapshot_by_workload().await.is_empty());
        assert!(store.snapshot_by_secret().await.is_empty());
        assert!(store.get_tracking(&workload1).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_independent_of_later_mutations() {
        let store = WorkloadSecretStore::default();
        let workload1 = workload("test", WorkloadKind::Deployment);

        store.upsert(workload1.clone(), vec![SecretRef::kv("secret/data/mysql", 1)]).await;
        let snapshot = store.snapshot_by_workload().await;

        store.update_kv_version(&workload1, "secret/data/mysql", 2).await;
        store.delete(&workload1).await;

        assert_eq!(snapshot[&workload1], vec![SecretRef::kv("secret/data/mysql", 1)]);
    }

    #[tokio::test]
    async fn test_update_kv_version() {
        let store = WorkloadSecretStore::default();
        let workload1 = workload("test", WorkloadKind::Deployment);

        store
            .upsert(
                workload1.clone(),
                vec![SecretRef::kv("secret/data/mysql", 1), SecretRef::dynamic("database/creds/readonly", 60)],
            )
            .await;

        store.update_kv_version(&workload1, "secret/data/mysql", 7).await;
        // unknown path and unknown workload are both no-ops
        store.update_kv_version(&workload1, "secret/data/absent", 9).await;
        store
            .update_kv_version(&workload("ghost", WorkloadKind::StatefulSet), "secret/data/mysql", 9)
            .await;

        let secrets = store.get(&workload1).await.unwrap();
        assert_eq!(secrets[0].kv_version, 7);
        assert_eq!(secrets[1], SecretRef::dynamic("database/creds/readonly", 60));
    }

    #[tokio::test]
    async fn test_tracking_roundtrip() {
        let store = WorkloadSecretStore::default();
        let workload1 = workload("test", WorkloadKind::Deployment);
        let t0 = Utc::now();

        assert!(store.get_tracking(&workload1).await.is_none());
        store.upsert_tracking(workload1.clone(), t0, 1800).await;

        let tracking = store.get_tracking(&workload1).await.unwrap();
        assert_eq!(tracking.last_restart_time, t0);
        assert_eq!(tracking.shortest_dynamic_ttl_seconds, 1800);

        let t1 = t0 + chrono::Duration::seconds(300);
        store.set_last_restart(&workload1, t1).await;
        assert_eq!(store.get_tracking(&workload1).await.unwrap().last_restart_time, t1);

        // set_last_restart on an untracked workload is a no-op
        let ghost = workload("ghost", WorkloadKind::DaemonSet);
        store.set_last_restart(&ghost, t1).await;
        assert!(store.get_tracking(&ghost).await.is_none());
    }
}
