// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Extraction of Vault secret references from pod templates.
//!
//! Env var values may embed one or more `vault:<path>#<field>[#<version>]`
//! references; a trailing all-digit version pins the reference to a fixed
//! secret version, which makes it irrelevant for reloading. The pod-template
//! annotation carries a comma-separated list of bare paths where any `#`
//! suffix marks the entry as pinned.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, PodTemplateSpec};

use crate::constants::annotations;

/// Sentinel that opens a secret reference inside an env var value.
pub const VAULT_PREFIX: &str = "vault:";

/// One `vault:`-anchored reference extracted from a string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSegment {
    pub path: String,
    pub is_versioned: bool,
}

/// Collect the distinct, unversioned Vault paths a pod template references,
/// from both container env vars and the recognized annotation. The result is
/// sorted and de-duplicated; paths are kept verbatim (no trimming).
pub fn collect_paths(template: &PodTemplateSpec) -> Vec<String> {
    let mut paths = Vec::new();

    if let Some(spec) = template.spec.as_ref() {
        let containers = spec
            .containers
            .iter()
            .chain(spec.init_containers.iter().flatten());
        paths.extend(collect_from_env_vars(containers));
    }

    if let Some(annotations) = template.metadata.as_ref().and_then(|m| m.annotations.as_ref()) {
        paths.extend(collect_from_annotations(annotations));
    }

    paths.sort();
    paths.dedup();
    paths
}

/// Extract unversioned paths from every env var value of the given containers.
/// Duplicates are kept; de-duplication happens in [`collect_paths`].
pub fn collect_from_env_vars<'a>(
    containers: impl Iterator<Item = &'a Container>,
) -> Vec<String> {
    let mut paths = Vec::new();
    for container in containers {
        for env in container.env.iter().flatten() {
            let Some(value) = env.value.as_deref() else {
                continue;
            };
            if !value.contains(VAULT_PREFIX) {
                continue;
            }
            for segment in extract_secret_segments(value) {
                if segment.is_versioned {
                    continue;
                }
                paths.push(segment.path);
            }
        }
    }
    paths
}

/// Extract unpinned paths from the recognized pod-template annotation. The
/// deprecated alias is consulted only when the primary key is absent or empty.
pub fn collect_from_annotations(annotations: &BTreeMap<String, String>) -> Vec<String> {
    let primary = annotations
        .get(annotations::VAULT_FROM_PATH)
        .map(String::as_str)
        .unwrap_or_default();
    let value = if primary.is_empty() {
        annotations
            .get(annotations::VAULT_FROM_PATH_DEPRECATED)
            .map(String::as_str)
            .unwrap_or_default()
    } else {
        primary
    };
    if value.is_empty() {
        return Vec::new();
    }

    value
        .split(',')
        .filter(|entry| !entry.is_empty() && !entry.contains('#'))
        .map(str::to_string)
        .collect()
}

/// Scan a value for `vault:`-anchored segments. Each segment runs up to the
/// next sentinel or the end of the value; segments without a `#` or with an
/// empty path are discarded. A segment whose last `#`-part (when at least two
/// exist) is non-empty and all ASCII digits is marked versioned.
pub fn extract_secret_segments(value: &str) -> Vec<SecretSegment> {
    let mut segments = Vec::new();
    let mut search_index = 0;

    while let Some(found) = value[search_index..].find(VAULT_PREFIX) {
        let start = search_index + found + VAULT_PREFIX.len();
        let segment_end = match value[start..].find(VAULT_PREFIX) {
            Some(next) => start + next,
            None => value.len(),
        };
        let segment = &value[start..segment_end];
        search_index = start;

        let Some(first_hash) = segment.find('#') else {
            continue;
        };
        let path = &segment[..first_hash];
        if path.is_empty() {
            continue;
        }

        let remainder = &segment[first_hash + 1..];
        let mut is_versioned = false;
        if !remainder.is_empty() {
            let parts: Vec<&str> = remainder.split('#').collect();
            if parts.len() >= 2 {
                let last = parts[parts.len() - 1];
                if !last.is_empty() && is_all_digits(last) {
                    is_versioned = true;
                }
            }
        }

        segments.push(SecretSegment {
            path: path.to_string(),
            is_versioned,
        });
    }

    segments
}

fn is_all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
