// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Wires the store, the Vault handle and the two workers together and
//! supervises them until cancellation.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use kube::Client;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::store::WorkloadSecretStore;
use crate::vault::VaultHandle;
use crate::workers::{Collector, Reloader};

pub struct Controller {
    client: Client,
    config: Config,
}

impl Controller {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    /// Run the collector watch streams, the resync loop and the reloader
    /// until the token is cancelled or a worker exits.
    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let store = Arc::new(WorkloadSecretStore::default());
        let vault = Arc::new(VaultHandle::new(self.client.clone(), self.config.vault.clone()));

        let collector = Arc::new(Collector::new(
            self.client.clone(),
            store.clone(),
            vault.clone(),
            self.config.watch_namespace.clone(),
            self.config.collector_sync_period,
        ));
        let reloader = Arc::new(Reloader::new(
            self.client.clone(),
            store,
            vault,
            self.config.vault.clone(),
            self.config.reloader_run_period,
        ));

        match &self.config.watch_namespace {
            Some(namespace) => info!(namespace, "watching workloads in a single namespace"),
            None => info!("watching workloads cluster-wide"),
        }

        let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();
        workers.spawn(collector.clone().watch::<Deployment>(token.clone()));
        workers.spawn(collector.clone().watch::<DaemonSet>(token.clone()));
        workers.spawn(collector.clone().watch::<StatefulSet>(token.clone()));
        workers.spawn(collector.resync(token.clone()));
        workers.spawn(reloader.run(token.clone()));

        let result = tokio::select! {
            _ = token.cancelled() => Ok(()),
            joined = workers.join_next() => match joined {
                None => Ok(()),
                Some(Ok(Ok(()))) => {
                    error!("a worker stopped unexpectedly, shutting down");
                    Ok(())
                }
                Some(Ok(Err(err))) => {
                    error!(error = %err, "worker failed, shutting down");
                    Err(err)
                }
                Some(Err(join_err)) => {
                    error!(error = %join_err, "worker panicked, shutting down");
                    Err(join_err.into())
                }
            },
        };

        token.cancel();
        while workers.join_next().await.is_some() {}

        result
    }
}
