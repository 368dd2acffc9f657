// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Domain types shared by the collector and reloader workers.

use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::NamespaceResourceScope;
use kube::ResourceExt;

/// The workload kinds capable of a rolling restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    StatefulSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a rollout-capable resource, used as a map key in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadKey {
    pub name: String,
    pub namespace: String,
    pub kind: WorkloadKind,
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A Vault path together with its classification discovered from Vault.
///
/// Exactly one of `is_kv`/`is_dynamic` is true for refs held in the store;
/// refs are only constructed through [`SecretRef::kv`] and
/// [`SecretRef::dynamic`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretRef {
    pub path: String,
    pub is_kv: bool,
    pub kv_version: i64,
    pub is_dynamic: bool,
    pub dynamic_ttl_seconds: i64,
}

impl SecretRef {
    pub fn kv(path: &str, version: i64) -> Self {
        Self {
            path: path.to_string(),
            is_kv: true,
            kv_version: version,
            is_dynamic: false,
            dynamic_ttl_seconds: 0,
        }
    }

    pub fn dynamic(path: &str, ttl_seconds: i64) -> Self {
        Self {
            path: path.to_string(),
            is_kv: false,
            kv_version: 0,
            is_dynamic: true,
            dynamic_ttl_seconds: ttl_seconds,
        }
    }
}

/// Per-workload runtime state used by the dynamic-TTL restart decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadTracking {
    /// Start time of the oldest running non-terminating pod, updated to the
    /// round timestamp after a successful rollout.
    pub last_restart_time: DateTime<Utc>,
    /// Minimum lease duration over the workload's dynamic refs, 0 if none.
    pub shortest_dynamic_ttl_seconds: i64,
}

/// The apps/v1 resources the collector watches and the reloader restarts.
pub trait WorkloadResource:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: WorkloadKind;

    fn pod_template(&self) -> Option<&PodTemplateSpec>;
    fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec>;
    fn selector(&self) -> Option<&LabelSelector>;
}

impl WorkloadResource for Deployment {
    const KIND: WorkloadKind = WorkloadKind::Deployment;

    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }

    fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }

    fn selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|s| &s.selector)
    }
}

impl WorkloadResource for DaemonSet {
    const KIND: WorkloadKind = WorkloadKind::DaemonSet;

    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }

    fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }

    fn selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|s| &s.selector)
    }
}

impl WorkloadResource for StatefulSet {
    const KIND: WorkloadKind = WorkloadKind::StatefulSet;

    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }

    fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }

    fn selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|s| &s.selector)
    }
}

/// Build the store key for a watched resource.
pub fn workload_key<K: WorkloadResource>(resource: &K) -> WorkloadKey {
    WorkloadKey {
        name: resource.name_any(),
        namespace: resource.namespace().unwrap_or_default(),
        kind: K::KIND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use kube::api::ObjectMeta;

    #[test]
    fn test_workload_key_display() {
        let key = WorkloadKey {
            name: "web".to_string(),
            namespace: "prod".to_string(),
            kind: WorkloadKind::StatefulSet,
        };
        assert_eq!(key.to_string(), "StatefulSet prod/web");
    }

    #[test]
    fn test_secret_ref_constructors() {
        let kv = SecretRef::kv("secret/data/mysql", 3);
        assert!(kv.is_kv && !kv.is_dynamic);
        assert_eq!(kv.kv_version, 3);

        let dynamic = SecretRef::dynamic("database/creds/readonly", 3600);
        assert!(dynamic.is_dynamic && !dynamic.is_kv);
        assert_eq!(dynamic.dynamic_ttl_seconds, 3600);
    }

    #[test]
    fn test_workload_key_from_resource() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("my-app".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec::default()),
            ..Default::default()
        };

        let key = workload_key(&deployment);
        assert_eq!(key.name, "my-app");
        assert_eq!(key.namespace, "default");
        assert_eq!(key.kind, WorkloadKind::Deployment);
    }
}
