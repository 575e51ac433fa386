// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ControllerConfig;
use crate::context::ReconcileContext;
use crate::error::Error;
use crate::object_ref::ObjectKey;
use crate::rabbitmqcluster_types::RabbitmqCluster;
use crate::reconciler::{reconcile, ReconcileOutcome};
use crate::store::kube::KubeStore;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::{
    api::{Api, ListParams},
    runtime::controller::{Action, Controller},
    Client,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shared by every reconcile the runtime schedules.
pub struct Data {
    client: Client,
    config: Arc<ControllerConfig>,
    shutdown: CancellationToken,
}

// The shim layer connects the reconcile driver to the kube-rs controller runtime: the
// runtime watches RabbitmqCluster objects (and the children they own) and calls
// reconcile_with for every owner that needs attention.
pub async fn run_controller(config: ControllerConfig) -> Result<()> {
    let client = Client::try_default().await?;
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let rabbitmqs = Api::<RabbitmqCluster>::all(client.clone());
    let mut controller = Controller::new(rabbitmqs, ListParams::default());
    if config.watch_owned_resources {
        controller = controller
            .owns(Api::<corev1::ConfigMap>::all(client.clone()), ListParams::default())
            .owns(Api::<corev1::Service>::all(client.clone()), ListParams::default())
            .owns(Api::<appsv1::Deployment>::all(client.clone()), ListParams::default())
            .owns(Api::<appsv1::StatefulSet>::all(client.clone()), ListParams::default());
    }

    tokio::spawn(cancel_on_signal(shutdown.clone()));

    info!("starting rabbitmq controller");
    controller
        .shutdown_on_signal()
        .run(
            reconcile_with,
            error_policy,
            Arc::new(Data {
                client,
                config,
                shutdown,
            }),
        )
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("reconciled {:?}", o),
                Err(e) => warn!("reconcile failed: {}", e),
            }
        })
        .await;
    info!("controller terminated");
    Ok(())
}

/// Cancels in-flight reconciles once the process is asked to stop, so they stop
/// before their next write.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested, cancelling in-flight reconciles");
    shutdown.cancel();
}

// reconcile_with is invoked by kube-rs whenever its watchers see a relevant event.
// It runs one pass of the driver against the API server and translates the outcome
// into the runtime's Action.
pub async fn reconcile_with(rabbitmq: Arc<RabbitmqCluster>, data: Arc<Data>) -> Result<Action, Error> {
    let name = rabbitmq
        .metadata
        .name
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let namespace = rabbitmq
        .metadata
        .namespace
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    let ctx = ReconcileContext::new(
        ObjectKey::new(namespace, name),
        data.config.clone(),
        data.shutdown.child_token(),
    );
    let store = KubeStore::new(data.client.clone(), data.config.api_timeout());
    match reconcile(&store, &ctx).await {
        ReconcileOutcome::Done => Ok(Action::await_change()),
        ReconcileOutcome::Requeue => Ok(Action::requeue(data.config.requeue_delay())),
        ReconcileOutcome::RequeueAfter(delay) => Ok(Action::requeue(delay)),
        ReconcileOutcome::Fatal(e) => Err(e),
    }
}

pub fn error_policy(rabbitmq: Arc<RabbitmqCluster>, error: &Error, data: Arc<Data>) -> Action {
    error!(
        namespace = rabbitmq.metadata.namespace.as_deref().unwrap_or_default(),
        name = rabbitmq.metadata.name.as_deref().unwrap_or_default(),
        "Reconcile failed due to error: {}",
        error
    );
    Action::requeue(data.config.fatal_requeue_delay())
}
