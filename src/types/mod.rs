// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Domain types for tracked workloads and their secret references.

pub mod workload;

pub use workload::{
    workload_key, SecretRef, WorkloadKey, WorkloadKind, WorkloadResource, WorkloadTracking,
};
