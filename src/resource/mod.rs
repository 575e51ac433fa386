// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod common;
pub mod config_map;
pub mod discovery_service;
pub mod exporter_deployment;
pub mod exporter_service;
pub mod headless_service;
pub mod quantity;
pub mod stateful_set;

pub use common::*;
pub use config_map::*;
pub use discovery_service::*;
pub use exporter_deployment::*;
pub use exporter_service::*;
pub use headless_service::*;
pub use stateful_set::*;

use crate::object_ref::ObjectRef;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

/// Per-kind drift comparison and update preparation.
pub trait ResourceBuilder {
    type Object;

    /// Whether the observed object already carries every field the controller owns.
    fn matches(desired: &Self::Object, observed: &Self::Object) -> bool;

    /// Adjusts the desired object before it replaces the observed one.
    fn update(desired: Self::Object, _observed: &Self::Object) -> Self::Object {
        desired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubResource {
    ServerConfigMap,
    HeadlessService,
    DiscoveryService,
    ExporterService,
    ExporterDeployment,
    StatefulSet,
}

impl SubResource {
    /// The Kubernetes kind backing this sub resource.
    pub fn kind(&self) -> &'static str {
        match self {
            SubResource::ServerConfigMap => "ConfigMap",
            SubResource::HeadlessService
            | SubResource::DiscoveryService
            | SubResource::ExporterService => "Service",
            SubResource::ExporterDeployment => "Deployment",
            SubResource::StatefulSet => "StatefulSet",
        }
    }
}

/// A child resource of a RabbitmqCluster, tagged with the role it plays.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildResource {
    ServerConfigMap(corev1::ConfigMap),
    HeadlessService(corev1::Service),
    DiscoveryService(corev1::Service),
    ExporterService(corev1::Service),
    ExporterDeployment(appsv1::Deployment),
    StatefulSet(appsv1::StatefulSet),
}

impl ChildResource {
    pub fn sub_resource(&self) -> SubResource {
        match self {
            ChildResource::ServerConfigMap(_) => SubResource::ServerConfigMap,
            ChildResource::HeadlessService(_) => SubResource::HeadlessService,
            ChildResource::DiscoveryService(_) => SubResource::DiscoveryService,
            ChildResource::ExporterService(_) => SubResource::ExporterService,
            ChildResource::ExporterDeployment(_) => SubResource::ExporterDeployment,
            ChildResource::StatefulSet(_) => SubResource::StatefulSet,
        }
    }

    pub fn metadata(&self) -> &metav1::ObjectMeta {
        match self {
            ChildResource::ServerConfigMap(o) => &o.metadata,
            ChildResource::HeadlessService(o)
            | ChildResource::DiscoveryService(o)
            | ChildResource::ExporterService(o) => &o.metadata,
            ChildResource::ExporterDeployment(o) => &o.metadata,
            ChildResource::StatefulSet(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut metav1::ObjectMeta {
        match self {
            ChildResource::ServerConfigMap(o) => &mut o.metadata,
            ChildResource::HeadlessService(o)
            | ChildResource::DiscoveryService(o)
            | ChildResource::ExporterService(o) => &mut o.metadata,
            ChildResource::ExporterDeployment(o) => &mut o.metadata,
            ChildResource::StatefulSet(o) => &mut o.metadata,
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        let metadata = self.metadata();
        ObjectRef::new(
            self.sub_resource(),
            metadata.namespace.clone().unwrap_or_default(),
            metadata.name.clone().unwrap_or_default(),
        )
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }

    /// Re-tags a Service under another service role; other kinds are returned unchanged.
    pub fn with_sub_resource(self, resource: SubResource) -> ChildResource {
        let service = match self {
            ChildResource::HeadlessService(s)
            | ChildResource::DiscoveryService(s)
            | ChildResource::ExporterService(s) => s,
            other => return other,
        };
        match resource {
            SubResource::HeadlessService => ChildResource::HeadlessService(service),
            SubResource::DiscoveryService => ChildResource::DiscoveryService(service),
            _ => ChildResource::ExporterService(service),
        }
    }

    /// Whether `observed` already satisfies this desired resource. Resources of
    /// different kinds never match.
    pub fn matches(&self, observed: &ChildResource) -> bool {
        match (self, observed) {
            (ChildResource::ServerConfigMap(d), ChildResource::ServerConfigMap(o)) => {
                ServerConfigMapBuilder::matches(d, o)
            }
            (ChildResource::HeadlessService(d), ChildResource::HeadlessService(o)) => {
                HeadlessServiceBuilder::matches(d, o)
            }
            (ChildResource::DiscoveryService(d), ChildResource::DiscoveryService(o)) => {
                DiscoveryServiceBuilder::matches(d, o)
            }
            (ChildResource::ExporterService(d), ChildResource::ExporterService(o)) => {
                ExporterServiceBuilder::matches(d, o)
            }
            (ChildResource::ExporterDeployment(d), ChildResource::ExporterDeployment(o)) => {
                ExporterDeploymentBuilder::matches(d, o)
            }
            (ChildResource::StatefulSet(d), ChildResource::StatefulSet(o)) => {
                StatefulSetBuilder::matches(d, o)
            }
            _ => false,
        }
    }

    /// Whether `observed` has the storage this desired resource asks for. Only a
    /// StatefulSet can differ here, and an update never changes its claim templates.
    pub fn storage_matches(&self, observed: &ChildResource) -> bool {
        match (self, observed) {
            (ChildResource::StatefulSet(d), ChildResource::StatefulSet(o)) => {
                data_volume_matches(d, o)
            }
            _ => true,
        }
    }

    /// Turns this desired resource into the object that replaces `observed`: it carries
    /// the observed resource version and owner references plus whatever the per-kind
    /// builder preserves.
    pub fn update_from(self, observed: &ChildResource) -> ChildResource {
        let mut updated = match (self, observed) {
            (ChildResource::StatefulSet(d), ChildResource::StatefulSet(o)) => {
                ChildResource::StatefulSet(StatefulSetBuilder::update(d, o))
            }
            (ChildResource::ExporterDeployment(d), ChildResource::ExporterDeployment(o)) => {
                ChildResource::ExporterDeployment(ExporterDeploymentBuilder::update(d, o))
            }
            (desired, _) => desired,
        };
        let observed_metadata = observed.metadata();
        let metadata = updated.metadata_mut();
        metadata.resource_version = observed_metadata.resource_version.clone();
        metadata.owner_references = observed_metadata.owner_references.clone();
        updated
    }
}
