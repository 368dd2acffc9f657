// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking the Kubernetes API and the Vault backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use http::{Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use tower::Service;

use crate::error::{ReloaderError, Result};
use crate::vault::{SecretSource, SecretSourceProvider, VaultResponse};

/// A recorded request made against the [`MockService`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// A mock HTTP service that returns predefined responses based on request
/// method and path, and records every request it serves.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(("GET".to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Add a response for PUT requests matching the exact path
    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(("PUT".to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// All requests served so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        // Try exact match first
        if let Some(response) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(response.clone());
        }

        // Try prefix match for paths like /api/v1/namespaces/foo
        for ((m, p), response) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(response.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let response = self.find_response(&method, &path);
        let requests = self.requests.clone();

        Box::pin(async move {
            let body = req
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();
            requests.lock().unwrap().push(RecordedRequest {
                method,
                path,
                body: String::from_utf8_lossy(&body).into_owned(),
            });

            match response {
                Some((status, body)) => Ok(Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(Body::from(body.into_bytes()))
                    .unwrap()),
                None => {
                    // Default 404 for unmatched requests
                    let body = r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"not found","reason":"NotFound","code":404}"#;
                    Ok(Response::builder()
                        .status(404)
                        .header("content-type", "application/json")
                        .body(Body::from(body.as_bytes().to_vec()))
                        .unwrap())
                }
            }
        })
    }
}

/// Build an apps/v1 workload JSON body with the given pod-template annotations
pub fn workload_json(
    kind: &str,
    name: &str,
    namespace: &str,
    template_annotations: &[(&str, &str)],
) -> String {
    let annotations: serde_json::Map<String, serde_json::Value> = template_annotations
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();

    serde_json::json!({
        "apiVersion": "apps/v1",
        "kind": kind,
        "metadata": {
            "name": name,
            "namespace": namespace,
            "resourceVersion": "1",
            "uid": "test-uid"
        },
        "spec": {
            "selector": {
                "matchLabels": {"app": name}
            },
            "serviceName": name,
            "template": {
                "metadata": {
                    "labels": {"app": name},
                    "annotations": annotations
                },
                "spec": {
                    "containers": [{"name": "main", "image": "app:latest"}]
                }
            }
        }
    })
    .to_string()
}

/// Build a core/v1 PodList JSON body
pub fn pod_list_json(pods: &[serde_json::Value]) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "PodList",
        "metadata": {"resourceVersion": "1"},
        "items": pods
    })
    .to_string()
}

/// Build a running pod with the given RFC 3339 start time
pub fn running_pod_json(name: &str, namespace: &str, start_time: &str) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "namespace": namespace},
        "status": {"phase": "Running", "startTime": start_time}
    })
}

/// A KV v2 read response carrying the given metadata version
pub fn kv_vault_response(version: i64) -> VaultResponse {
    serde_json::from_value(serde_json::json!({
        "data": {
            "data": {},
            "metadata": {"version": version}
        }
    }))
    .unwrap()
}

/// A dynamic secret read response carrying a lease
pub fn dynamic_vault_response(lease_id: &str, lease_duration: i64, renewable: bool) -> VaultResponse {
    serde_json::from_value(serde_json::json!({
        "lease_id": lease_id,
        "lease_duration": lease_duration,
        "renewable": renewable,
        "data": {"username": "v-user", "password": "v-pass"}
    }))
    .unwrap()
}

/// A [`SecretSource`] backed by an in-memory path map that records reads.
#[derive(Default)]
pub struct MockSecretSource {
    secrets: HashMap<String, VaultResponse>,
    read_calls: Mutex<Vec<String>>,
    fail_with: Option<String>,
}

impl MockSecretSource {
    pub fn with_secret(mut self, path: &str, response: VaultResponse) -> Self {
        self.secrets.insert(path.to_string(), response);
        self
    }

    /// Make every read fail with a transport-style error
    pub fn failing(message: &str) -> Self {
        MockSecretSource {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn read_calls(&self) -> Vec<String> {
        self.read_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretSource for MockSecretSource {
    async fn read_raw(&self, path: &str) -> Result<Option<VaultResponse>> {
        self.read_calls.lock().unwrap().push(path.to_string());
        if let Some(message) = &self.fail_with {
            return Err(ReloaderError::Vault(message.clone()));
        }
        Ok(self.secrets.get(path).cloned())
    }
}

/// A [`SecretSourceProvider`] handing out a shared [`MockSecretSource`].
pub struct MockSourceProvider(pub Arc<MockSecretSource>);

#[async_trait]
impl SecretSourceProvider for MockSourceProvider {
    async fn secret_source(&self) -> Result<Arc<dyn SecretSource>> {
        Ok(self.0.clone() as Arc<dyn SecretSource>)
    }
}
