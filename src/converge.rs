// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::context::ReconcileContext;
use crate::error::Error;
use crate::object_ref::ObjectRef;
use crate::resource::ChildResource;
use crate::store::{Fetcher, Mutator, OwnerSetter};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    Created,
    Updated,
    NoOp,
}

/// Drives every desired child to its observed counterpart, in order. The first
/// failed read or write aborts the pass; objects already converged stay converged
/// and the next pass picks up where this one stopped.
pub async fn converge<S, O>(
    ctx: &ReconcileContext,
    store: &S,
    owner: &O,
    desired: Vec<ChildResource>,
) -> Result<Vec<(ObjectRef, Convergence)>, Error>
where
    S: Fetcher + Mutator,
    O: OwnerSetter,
{
    let mut results = Vec::with_capacity(desired.len());
    for child in desired {
        let obj_ref = child.object_ref();
        let convergence = converge_one(ctx, store, owner, child).await?;
        results.push((obj_ref, convergence));
    }
    Ok(results)
}

pub async fn converge_one<S, O>(
    ctx: &ReconcileContext,
    store: &S,
    owner: &O,
    mut desired: ChildResource,
) -> Result<Convergence, Error>
where
    S: Fetcher + Mutator,
    O: OwnerSetter,
{
    let obj_ref = desired.object_ref();
    let observed = store
        .get(&obj_ref)
        .await
        .map_err(|e| Error::GetFailed(obj_ref.clone(), e))?;
    match observed {
        None => {
            debug!(parent: &ctx.span, "{} not found", obj_ref);
            ctx.check_cancelled()?;
            owner.set_owner(desired.metadata_mut());
            store
                .create(desired)
                .await
                .map_err(|e| Error::CreateFailed(obj_ref.clone(), e))?;
            info!(parent: &ctx.span, "Created {}", obj_ref);
            Ok(Convergence::Created)
        }
        Some(observed) => {
            if !desired.storage_matches(&observed) {
                warn!(
                    parent: &ctx.span,
                    "Data volume of {} cannot be changed after creation, keeping the existing one",
                    obj_ref
                );
            }
            if desired.matches(&observed) && owner.is_owner(observed.metadata()) {
                debug!(parent: &ctx.span, "{} is up to date", obj_ref);
                return Ok(Convergence::NoOp);
            }
            ctx.check_cancelled()?;
            let mut updated = desired.update_from(&observed);
            owner.set_owner(updated.metadata_mut());
            let resource_version = observed.resource_version().unwrap_or_default().to_string();
            store
                .update(updated)
                .await
                .map_err(|e| Error::UpdateFailed(obj_ref.clone(), e))?;
            info!(
                parent: &ctx.span,
                "Updated {} from resource version {}", obj_ref, resource_version
            );
            Ok(Convergence::Updated)
        }
    }
}
