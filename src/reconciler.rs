// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::context::ReconcileContext;
use crate::converge::{converge, Convergence};
use crate::error::{Error, ErrorClass};
use crate::rabbitmqcluster_types::{RabbitmqCluster, RabbitmqClusterStatus};
use crate::resource::make_owner_reference;
use crate::store::{Fetcher, Mutator};
use crate::synthesizer::desired_state;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What the caller should do after one reconcile pass.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Nothing left to do until the owner or a child changes.
    Done,
    /// Retry soon; the failure is expected to go away.
    Requeue,
    RequeueAfter(Duration),
    /// Retrying without a spec change will fail the same way.
    Fatal(Error),
}

/// Runs one reconcile pass for the RabbitmqCluster named by `ctx.key`.
pub async fn reconcile<S>(store: &S, ctx: &ReconcileContext) -> ReconcileOutcome
where
    S: Fetcher + Mutator,
{
    let rabbitmq = match store.get_cluster(&ctx.key).await {
        Ok(Some(rabbitmq)) => rabbitmq,
        Ok(None) => {
            info!(parent: &ctx.span, "RabbitmqCluster not found, nothing to reconcile");
            return ReconcileOutcome::Done;
        }
        Err(e) => {
            return handle_error(store, ctx, None, Error::GetClusterFailed(ctx.key.clone(), e))
                .await
        }
    };
    if rabbitmq.metadata.deletion_timestamp.is_some() {
        info!(parent: &ctx.span, "RabbitmqCluster is being deleted, nothing to reconcile");
        return ReconcileOutcome::Done;
    }

    match reconcile_cluster(store, ctx, &rabbitmq).await {
        Ok(()) => {
            report_status(
                store,
                ctx,
                &rabbitmq,
                RabbitmqClusterStatus::reconciled(rabbitmq.metadata.generation),
            )
            .await;
            match ctx.config.resync_period() {
                Some(period) => ReconcileOutcome::RequeueAfter(period),
                None => ReconcileOutcome::Done,
            }
        }
        Err(e) => handle_error(store, ctx, Some(&rabbitmq), e).await,
    }
}

async fn reconcile_cluster<S>(
    store: &S,
    ctx: &ReconcileContext,
    rabbitmq: &RabbitmqCluster,
) -> Result<(), Error>
where
    S: Fetcher + Mutator,
{
    let owner = make_owner_reference(rabbitmq)?;
    let desired = desired_state(rabbitmq)?;
    let mut retried = false;
    loop {
        match converge(ctx, store, &owner, desired.clone()).await {
            Ok(results) => {
                let changed = results
                    .iter()
                    .filter(|(_, c)| *c != Convergence::NoOp)
                    .count();
                info!(
                    parent: &ctx.span,
                    "Reconciled {} resources, {} changed",
                    results.len(),
                    changed
                );
                return Ok(());
            }
            Err(e) if e.class() == ErrorClass::Conflict && !retried => {
                warn!(parent: &ctx.span, "{}, retrying once", e);
                retried = true;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn handle_error<S>(
    store: &S,
    ctx: &ReconcileContext,
    rabbitmq: Option<&RabbitmqCluster>,
    e: Error,
) -> ReconcileOutcome
where
    S: Fetcher + Mutator,
{
    match e.class() {
        ErrorClass::Conflict | ErrorClass::Transient => {
            if matches!(e, Error::Cancelled) {
                info!(parent: &ctx.span, "Reconcile cancelled, requeueing");
            } else {
                warn!(parent: &ctx.span, "Reconcile failed, requeueing: {}", e);
            }
            ReconcileOutcome::Requeue
        }
        ErrorClass::Fatal => {
            error!(parent: &ctx.span, "Reconcile failed: {}", e);
            if let Some(rabbitmq) = rabbitmq {
                let status =
                    RabbitmqClusterStatus::failed(rabbitmq.metadata.generation, e.to_string());
                report_status(store, ctx, rabbitmq, status).await;
            }
            ReconcileOutcome::Fatal(e)
        }
    }
}

/// Writes `status` unless the owner already carries it. A failed write is logged
/// and otherwise ignored; the next pass writes it again.
async fn report_status<S>(
    store: &S,
    ctx: &ReconcileContext,
    rabbitmq: &RabbitmqCluster,
    status: RabbitmqClusterStatus,
) where
    S: Fetcher + Mutator,
{
    if rabbitmq.status.as_ref() == Some(&status) {
        debug!(parent: &ctx.span, "Status is up to date");
        return;
    }
    if let Err(e) = store.update_status(&ctx.key, status).await {
        let e = Error::StatusUpdateFailed(ctx.key.clone(), e);
        warn!(parent: &ctx.span, "{}", e);
    }
}
