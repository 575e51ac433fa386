// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::error::Error;
use crate::rabbitmqcluster_types::RabbitmqCluster;
use crate::resource::quantity::parse_quantity;
use crate::resource::*;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::HashSet;

pub const DEFAULT_USERNAME: &str = "guest";
pub const DEFAULT_PASSWORD: &str = "guest";
pub const DEFAULT_VHOST: &str = "/";
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "Always";

#[derive(Debug, Clone, PartialEq)]
pub enum VolumeMode {
    Persistent {
        size: Quantity,
        storage_class: Option<String>,
    },
    Ephemeral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterSpec {
    pub image: String,
    pub port: i32,
}

/// A RabbitmqCluster spec with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSpec {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub image: String,
    pub image_pull_policy: String,
    pub service_account: Option<String>,
    pub discovery_service: String,
    pub volume: VolumeMode,
    pub affinity: corev1::Affinity,
    pub resources: Option<corev1::ResourceRequirements>,
    pub default_username: String,
    pub default_password: String,
    pub default_vhost: String,
    pub exporter: Option<ExporterSpec>,
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Validates `rabbitmq.spec` and applies defaults. The input object is never modified.
pub fn resolve(rabbitmq: &RabbitmqCluster) -> Result<ResolvedSpec, Error> {
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
    let spec = &rabbitmq.spec;

    if spec.replicas < 0 {
        return Err(Error::InvalidSpec(format!(
            "replicas must not be negative, got {}",
            spec.replicas
        )));
    }
    if spec.image.is_empty() {
        return Err(Error::InvalidSpec("image must not be empty".to_string()));
    }

    let volume = match &spec.data_volume_size {
        None => VolumeMode::Ephemeral,
        Some(size) => {
            let value = parse_quantity(size)
                .map_err(|e| Error::InvalidSpec(format!("data_volume_size: {}", e)))?;
            if value < 0.0 {
                return Err(Error::InvalidSpec(format!(
                    "data_volume_size must not be negative, got {}",
                    size.0
                )));
            }
            if value == 0.0 {
                VolumeMode::Ephemeral
            } else {
                VolumeMode::Persistent {
                    size: size.clone(),
                    storage_class: non_empty(&spec.data_storage_class),
                }
            }
        }
    };

    let exporter = match spec.exporter_port {
        0 => None,
        port if !(1..=65535).contains(&port) => {
            return Err(Error::InvalidSpec(format!(
                "exporter_port must be within 0..=65535, got {}",
                port
            )));
        }
        _ if spec.exporter_image.is_empty() => {
            return Err(Error::InvalidSpec(
                "exporter_image must be set when exporter_port is set".to_string(),
            ));
        }
        port => Some(ExporterSpec {
            image: spec.exporter_image.clone(),
            port,
        }),
    };

    Ok(ResolvedSpec {
        replicas: spec.replicas,
        image: spec.image.clone(),
        image_pull_policy: spec
            .image_pull_policy
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_PULL_POLICY.to_string()),
        service_account: non_empty(&spec.service_account),
        discovery_service: or_default(&spec.discovery_service, &name),
        volume,
        affinity: spec
            .affinity
            .clone()
            .unwrap_or_else(|| make_default_affinity(&name)),
        resources: spec.resources.clone(),
        default_username: or_default(&spec.default_username, DEFAULT_USERNAME),
        default_password: or_default(&spec.default_password, DEFAULT_PASSWORD),
        default_vhost: or_default(&spec.default_vhost, DEFAULT_VHOST),
        exporter,
        name,
        namespace,
    })
}

/// Builds the desired children in the order they are converged.
pub fn synthesize(spec: &ResolvedSpec) -> Vec<ChildResource> {
    let mut desired = vec![
        ChildResource::ServerConfigMap(make_server_config_map(spec)),
        ChildResource::HeadlessService(make_headless_service(spec)),
        ChildResource::DiscoveryService(make_discovery_service(spec)),
    ];
    if let Some(exporter) = &spec.exporter {
        desired.push(ChildResource::ExporterService(make_exporter_service(spec, exporter)));
        desired.push(ChildResource::ExporterDeployment(make_exporter_deployment(spec, exporter)));
    }
    desired.push(ChildResource::StatefulSet(make_stateful_set(spec)));
    desired
}

/// Checks invariants every synthesized state must hold. A violation is a bug in
/// synthesis, not something a retry can fix.
pub fn validate(desired: &[ChildResource]) -> Result<(), Error> {
    let mut identities = HashSet::new();
    for child in desired {
        let obj_ref = child.object_ref();
        if obj_ref.name.is_empty() || obj_ref.namespace.is_empty() {
            return Err(Error::Validation(format!(
                "{:?} has no name or namespace",
                child.sub_resource()
            )));
        }
        if !identities.insert((obj_ref.kind(), obj_ref.namespace.clone(), obj_ref.name.clone())) {
            return Err(Error::Validation(format!(
                "{} is synthesized more than once",
                obj_ref
            )));
        }
    }

    let count = |resource: SubResource| desired.iter().filter(|c| c.sub_resource() == resource).count();
    for resource in [
        SubResource::ServerConfigMap,
        SubResource::HeadlessService,
        SubResource::DiscoveryService,
        SubResource::StatefulSet,
    ] {
        if count(resource) != 1 {
            return Err(Error::Validation(format!(
                "expected exactly one {:?}, found {}",
                resource,
                count(resource)
            )));
        }
    }
    if count(SubResource::ExporterService) != count(SubResource::ExporterDeployment)
        || count(SubResource::ExporterService) > 1
    {
        return Err(Error::Validation(
            "exporter service and deployment must be synthesized together".to_string(),
        ));
    }

    for child in desired {
        if let ChildResource::StatefulSet(sts) = child {
            let spec = sts.spec.as_ref();
            let claims = spec
                .and_then(|s| s.volume_claim_templates.as_ref())
                .map_or(0, |templates| {
                    templates
                        .iter()
                        .filter(|t| t.metadata.name.as_deref() == Some(DATA_VOLUME_NAME))
                        .count()
                });
            let ephemeral = spec
                .and_then(|s| s.template.spec.as_ref())
                .and_then(|s| s.volumes.as_ref())
                .map_or(0, |volumes| {
                    volumes
                        .iter()
                        .filter(|v| v.name == DATA_VOLUME_NAME && v.empty_dir.is_some())
                        .count()
                });
            if claims + ephemeral != 1 {
                return Err(Error::Validation(format!(
                    "{} must have exactly one data volume, found {} persistent and {} ephemeral",
                    child.object_ref(),
                    claims,
                    ephemeral
                )));
            }
        }
    }
    Ok(())
}

/// resolve, synthesize and validate in one step.
pub fn desired_state(rabbitmq: &RabbitmqCluster) -> Result<Vec<ChildResource>, Error> {
    let spec = resolve(rabbitmq)?;
    let desired = synthesize(&spec);
    validate(&desired)?;
    Ok(desired)
}
