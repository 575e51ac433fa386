// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::{Fetcher, Mutator};
use crate::error::{kube_error_to_api_error, APIError};
use crate::object_ref::{ObjectKey, ObjectRef};
use crate::rabbitmqcluster_types::{RabbitmqCluster, RabbitmqClusterStatus};
use crate::resource::{ChildResource, SubResource};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

/// Store backed by the Kubernetes API server. Every call is bounded by `timeout`;
/// an expired call is reported as transient.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    timeout: Duration,
}

impl KubeStore {
    pub fn new(client: Client, timeout: Duration) -> KubeStore {
        KubeStore { client, timeout }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T, APIError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(|e| kube_error_to_api_error(&e)),
            Err(_) => Err(APIError::Transient(format!(
                "request timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn get_typed<K>(&self, obj_ref: &ObjectRef) -> Result<Option<K>, APIError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        self.bounded(self.api::<K>(&obj_ref.namespace).get_opt(&obj_ref.name))
            .await
    }
}

#[async_trait]
impl Fetcher for KubeStore {
    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<RabbitmqCluster>, APIError> {
        self.bounded(self.api::<RabbitmqCluster>(&key.namespace).get_opt(&key.name))
            .await
    }

    async fn get(&self, obj_ref: &ObjectRef) -> Result<Option<ChildResource>, APIError> {
        Ok(match obj_ref.resource {
            SubResource::ServerConfigMap => self
                .get_typed::<corev1::ConfigMap>(obj_ref)
                .await?
                .map(ChildResource::ServerConfigMap),
            SubResource::HeadlessService => self
                .get_typed::<corev1::Service>(obj_ref)
                .await?
                .map(ChildResource::HeadlessService),
            SubResource::DiscoveryService => self
                .get_typed::<corev1::Service>(obj_ref)
                .await?
                .map(ChildResource::DiscoveryService),
            SubResource::ExporterService => self
                .get_typed::<corev1::Service>(obj_ref)
                .await?
                .map(ChildResource::ExporterService),
            SubResource::ExporterDeployment => self
                .get_typed::<appsv1::Deployment>(obj_ref)
                .await?
                .map(ChildResource::ExporterDeployment),
            SubResource::StatefulSet => self
                .get_typed::<appsv1::StatefulSet>(obj_ref)
                .await?
                .map(ChildResource::StatefulSet),
        })
    }
}

#[async_trait]
impl Mutator for KubeStore {
    async fn create(&self, obj: ChildResource) -> Result<ChildResource, APIError> {
        let pp = PostParams::default();
        let namespace = obj.object_ref().namespace;
        Ok(match obj {
            ChildResource::ServerConfigMap(o) => ChildResource::ServerConfigMap(
                self.bounded(self.api(&namespace).create(&pp, &o)).await?,
            ),
            ChildResource::HeadlessService(o) => ChildResource::HeadlessService(
                self.bounded(self.api(&namespace).create(&pp, &o)).await?,
            ),
            ChildResource::DiscoveryService(o) => ChildResource::DiscoveryService(
                self.bounded(self.api(&namespace).create(&pp, &o)).await?,
            ),
            ChildResource::ExporterService(o) => ChildResource::ExporterService(
                self.bounded(self.api(&namespace).create(&pp, &o)).await?,
            ),
            ChildResource::ExporterDeployment(o) => ChildResource::ExporterDeployment(
                self.bounded(self.api(&namespace).create(&pp, &o)).await?,
            ),
            ChildResource::StatefulSet(o) => ChildResource::StatefulSet(
                self.bounded(self.api(&namespace).create(&pp, &o)).await?,
            ),
        })
    }

    async fn update(&self, obj: ChildResource) -> Result<ChildResource, APIError> {
        let pp = PostParams::default();
        let ObjectRef {
            namespace, name, ..
        } = obj.object_ref();
        Ok(match obj {
            ChildResource::ServerConfigMap(o) => ChildResource::ServerConfigMap(
                self.bounded(self.api(&namespace).replace(&name, &pp, &o))
                    .await?,
            ),
            ChildResource::HeadlessService(o) => ChildResource::HeadlessService(
                self.bounded(self.api(&namespace).replace(&name, &pp, &o))
                    .await?,
            ),
            ChildResource::DiscoveryService(o) => ChildResource::DiscoveryService(
                self.bounded(self.api(&namespace).replace(&name, &pp, &o))
                    .await?,
            ),
            ChildResource::ExporterService(o) => ChildResource::ExporterService(
                self.bounded(self.api(&namespace).replace(&name, &pp, &o))
                    .await?,
            ),
            ChildResource::ExporterDeployment(o) => ChildResource::ExporterDeployment(
                self.bounded(self.api(&namespace).replace(&name, &pp, &o))
                    .await?,
            ),
            ChildResource::StatefulSet(o) => ChildResource::StatefulSet(
                self.bounded(self.api(&namespace).replace(&name, &pp, &o))
                    .await?,
            ),
        })
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: RabbitmqClusterStatus,
    ) -> Result<(), APIError> {
        let patch = Patch::Merge(json!({ "status": status }));
        self.bounded(
            self.api::<RabbitmqCluster>(&key.namespace)
                .patch_status(&key.name, &PatchParams::default(), &patch),
        )
        .await?;
        Ok(())
    }
}
