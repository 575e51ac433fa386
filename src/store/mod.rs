// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod kube;
#[cfg(test)]
pub mod memory;

use crate::error::APIError;
use crate::object_ref::{ObjectKey, ObjectRef};
use crate::rabbitmqcluster_types::{RabbitmqCluster, RabbitmqClusterStatus};
use crate::resource::ChildResource;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

/// Reads observed state. A missing object is `Ok(None)`, not an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<RabbitmqCluster>, APIError>;

    async fn get(&self, obj_ref: &ObjectRef) -> Result<Option<ChildResource>, APIError>;
}

/// Writes state. `update` replaces the whole object and is rejected with
/// `APIError::Conflict` when the resource version it carries is stale.
#[async_trait]
pub trait Mutator: Send + Sync {
    async fn create(&self, obj: ChildResource) -> Result<ChildResource, APIError>;

    async fn update(&self, obj: ChildResource) -> Result<ChildResource, APIError>;

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: RabbitmqClusterStatus,
    ) -> Result<(), APIError>;
}

/// Attaches the owner reference that makes a child garbage collected with its owner.
pub trait OwnerSetter: Send + Sync {
    fn set_owner(&self, metadata: &mut metav1::ObjectMeta);

    fn is_owner(&self, metadata: &metav1::ObjectMeta) -> bool;
}

impl OwnerSetter for metav1::OwnerReference {
    fn set_owner(&self, metadata: &mut metav1::ObjectMeta) {
        let owner_references = metadata.owner_references.get_or_insert_with(Vec::new);
        owner_references.retain(|o| o.uid != self.uid);
        owner_references.push(self.clone());
    }

    fn is_owner(&self, metadata: &metav1::ObjectMeta) -> bool {
        metadata
            .owner_references
            .as_ref()
            .map_or(false, |refs| refs.iter().any(|o| o == self))
    }
}
