// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::{Fetcher, Mutator};
use crate::error::APIError;
use crate::object_ref::{ObjectKey, ObjectRef};
use crate::rabbitmqcluster_types::{RabbitmqCluster, RabbitmqClusterStatus};
use crate::resource::{ChildResource, SubResource};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// A mutating call issued against the store, recorded whether or not it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(ObjectRef),
    Update {
        obj_ref: ObjectRef,
        resource_version: Option<String>,
    },
    UpdateStatus(ObjectKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetCluster,
    Get,
    Create,
    Update,
    UpdateStatus,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    resource: Option<SubResource>,
    error: APIError,
}

type StoreKey = (&'static str, String, String);

#[derive(Default)]
struct StoreState {
    clusters: BTreeMap<ObjectKey, RabbitmqCluster>,
    resources: BTreeMap<StoreKey, ChildResource>,
    resource_version_counter: u64,
    uid_counter: u64,
    mutations: Vec<Mutation>,
    faults: Vec<Fault>,
}

impl StoreState {
    fn next_resource_version(&mut self) -> String {
        self.resource_version_counter += 1;
        self.resource_version_counter.to_string()
    }

    fn next_uid(&mut self) -> String {
        self.uid_counter += 1;
        format!("uid-{}", self.uid_counter)
    }

    fn take_fault(&mut self, operation: Operation, resource: Option<SubResource>) -> Option<APIError> {
        let position = self.faults.iter().position(|f| {
            f.operation == operation && (f.resource.is_none() || f.resource == resource)
        })?;
        Some(self.faults.remove(position).error)
    }
}

fn store_key(obj_ref: &ObjectRef) -> StoreKey {
    (obj_ref.kind(), obj_ref.namespace.clone(), obj_ref.name.clone())
}

/// An object can have at most one controller owner reference.
fn metadata_validity_check(metadata: &metav1::ObjectMeta) -> Result<(), APIError> {
    let controllers = metadata
        .owner_references
        .as_ref()
        .map_or(0, |refs| refs.iter().filter(|o| o.controller == Some(true)).count());
    if controllers > 1 {
        Err(APIError::Invalid(
            "object has more than one controller owner reference".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Rejects changes to StatefulSet fields the API server treats as immutable.
fn immutable_fields_check(stored: &ChildResource, obj: &ChildResource) -> Result<(), APIError> {
    if let (ChildResource::StatefulSet(stored), ChildResource::StatefulSet(obj)) = (stored, obj) {
        let (stored, obj) = match (&stored.spec, &obj.spec) {
            (Some(stored), Some(obj)) => (stored, obj),
            _ => return Ok(()),
        };
        if stored.volume_claim_templates != obj.volume_claim_templates
            || stored.selector != obj.selector
            || stored.service_name != obj.service_name
        {
            return Err(APIError::Invalid(
                "StatefulSet spec: updates to statefulset spec for fields other than 'replicas', \
                 'template', 'updateStrategy' and 'minReadySeconds' are forbidden"
                    .to_string(),
            ));
        }
    }
    Ok(())
}

/// In-memory object store that behaves like the API server for the calls the
/// controller makes: it assigns uids and resource versions, rejects stale updates
/// with a conflict, records every mutating call and can fail the next call of a
/// given operation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `cluster`, assigning a uid when it has none. Returns the stored copy.
    pub fn insert_cluster(&self, mut cluster: RabbitmqCluster) -> RabbitmqCluster {
        let mut state = self.lock();
        let key = ObjectKey::new(
            cluster.metadata.namespace.clone().unwrap_or_default(),
            cluster.metadata.name.clone().unwrap_or_default(),
        );
        if cluster.metadata.uid.is_none() {
            cluster.metadata.uid = Some(state.next_uid());
        }
        cluster.metadata.resource_version = Some(state.next_resource_version());
        state.clusters.insert(key, cluster.clone());
        cluster
    }

    pub fn remove_cluster(&self, key: &ObjectKey) -> Option<RabbitmqCluster> {
        self.lock().clusters.remove(key)
    }

    pub fn cluster(&self, key: &ObjectKey) -> Option<RabbitmqCluster> {
        self.lock().clusters.get(key).cloned()
    }

    /// Stores a child as if another actor wrote it, bypassing the mutation log.
    pub fn insert(&self, mut obj: ChildResource) -> ChildResource {
        let mut state = self.lock();
        let key = store_key(&obj.object_ref());
        let rv = state.next_resource_version();
        obj.metadata_mut().resource_version = Some(rv);
        if obj.metadata().uid.is_none() {
            obj.metadata_mut().uid = Some(state.next_uid());
        }
        state.resources.insert(key, obj.clone());
        obj
    }

    /// Applies `f` to a stored child as if another actor modified it.
    pub fn modify<F>(&self, obj_ref: &ObjectRef, f: F) -> Option<ChildResource>
    where
        F: FnOnce(&mut ChildResource),
    {
        let mut state = self.lock();
        let rv = state.next_resource_version();
        let obj = state.resources.get_mut(&store_key(obj_ref))?;
        f(obj);
        obj.metadata_mut().resource_version = Some(rv);
        Some(obj.clone())
    }

    pub fn object(&self, obj_ref: &ObjectRef) -> Option<ChildResource> {
        self.lock()
            .resources
            .get(&store_key(obj_ref))
            .cloned()
            .map(|obj| obj.with_sub_resource(obj_ref.resource))
    }

    pub fn len(&self) -> usize {
        self.lock().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.lock().mutations.clear();
    }

    pub fn creates(&self) -> Vec<ObjectRef> {
        self.lock()
            .mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::Create(obj_ref) => Some(obj_ref.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(ObjectRef, Option<String>)> {
        self.lock()
            .mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::Update {
                    obj_ref,
                    resource_version,
                } => Some((obj_ref.clone(), resource_version.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn status_updates(&self) -> usize {
        self.lock()
            .mutations
            .iter()
            .filter(|m| matches!(m, Mutation::UpdateStatus(_)))
            .count()
    }

    /// Fails the next call of `operation` with `error`.
    pub fn fail_next(&self, operation: Operation, error: APIError) {
        self.lock().faults.push(Fault {
            operation,
            resource: None,
            error,
        });
    }

    /// Fails the next call of `operation` on `resource` with `error`.
    pub fn fail_next_for(&self, operation: Operation, resource: SubResource, error: APIError) {
        self.lock().faults.push(Fault {
            operation,
            resource: Some(resource),
            error,
        });
    }
}

#[async_trait]
impl Fetcher for MemoryStore {
    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<RabbitmqCluster>, APIError> {
        let mut state = self.lock();
        if let Some(error) = state.take_fault(Operation::GetCluster, None) {
            return Err(error);
        }
        Ok(state.clusters.get(key).cloned())
    }

    async fn get(&self, obj_ref: &ObjectRef) -> Result<Option<ChildResource>, APIError> {
        let mut state = self.lock();
        if let Some(error) = state.take_fault(Operation::Get, Some(obj_ref.resource)) {
            return Err(error);
        }
        Ok(state
            .resources
            .get(&store_key(obj_ref))
            .cloned()
            .map(|obj| obj.with_sub_resource(obj_ref.resource)))
    }
}

#[async_trait]
impl Mutator for MemoryStore {
    async fn create(&self, mut obj: ChildResource) -> Result<ChildResource, APIError> {
        let mut state = self.lock();
        let obj_ref = obj.object_ref();
        state.mutations.push(Mutation::Create(obj_ref.clone()));
        if let Some(error) = state.take_fault(Operation::Create, Some(obj_ref.resource)) {
            return Err(error);
        }
        let key = store_key(&obj_ref);
        if state.resources.contains_key(&key) {
            return Err(APIError::ObjectAlreadyExists);
        }
        metadata_validity_check(obj.metadata())?;
        let rv = state.next_resource_version();
        let uid = state.next_uid();
        let metadata = obj.metadata_mut();
        metadata.resource_version = Some(rv);
        metadata.uid = Some(uid);
        state.resources.insert(key, obj.clone());
        Ok(obj)
    }

    async fn update(&self, mut obj: ChildResource) -> Result<ChildResource, APIError> {
        let mut state = self.lock();
        let obj_ref = obj.object_ref();
        state.mutations.push(Mutation::Update {
            obj_ref: obj_ref.clone(),
            resource_version: obj.resource_version().map(str::to_string),
        });
        if let Some(error) = state.take_fault(Operation::Update, Some(obj_ref.resource)) {
            return Err(error);
        }
        let key = store_key(&obj_ref);
        let stored = match state.resources.get(&key) {
            Some(stored) => stored,
            None => return Err(APIError::ObjectNotFound),
        };
        let stored_uid = stored.metadata().uid.clone();
        if obj.resource_version().is_some()
            && obj.metadata().resource_version != stored.metadata().resource_version
        {
            return Err(APIError::Conflict(format!(
                "{} has been modified; resource version {:?} is stale",
                obj_ref,
                obj.resource_version()
            )));
        }
        immutable_fields_check(stored, &obj)?;
        metadata_validity_check(obj.metadata())?;
        let rv = state.next_resource_version();
        let metadata = obj.metadata_mut();
        metadata.resource_version = Some(rv);
        metadata.uid = stored_uid;
        state.resources.insert(key, obj.clone());
        Ok(obj)
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: RabbitmqClusterStatus,
    ) -> Result<(), APIError> {
        let mut state = self.lock();
        state.mutations.push(Mutation::UpdateStatus(key.clone()));
        if let Some(error) = state.take_fault(Operation::UpdateStatus, None) {
            return Err(error);
        }
        let rv = state.next_resource_version();
        let cluster = state
            .clusters
            .get_mut(key)
            .ok_or(APIError::ObjectNotFound)?;
        cluster.status = Some(status);
        cluster.metadata.resource_version = Some(rv);
        Ok(())
    }
}
