// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::quantity::resource_requirements_match;
use crate::error::Error;
use crate::rabbitmqcluster_types::RabbitmqCluster;
use crate::synthesizer::ResolvedSpec;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use std::collections::BTreeMap;

pub const APP_LABEL: &str = "app";
pub const COMPONENT_LABEL: &str = "component";
pub const METRICS_COMPONENT: &str = "metrics";

pub const RABBITMQ_HTTP_PORT: i32 = 15672;
pub const RABBITMQ_AMQP_PORT: i32 = 5672;
pub const RABBITMQ_CLUSTER_PORT: i32 = 25672;
pub const RABBITMQ_EPMD_PORT: i32 = 4369;

const DEFAULT_PROTOCOL: &str = "TCP";
const DEFAULT_SERVICE_TYPE: &str = "ClusterIP";
const HEADLESS_CLUSTER_IP: &str = "None";

pub fn make_labels(spec: &ResolvedSpec) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), spec.name.clone())])
}

pub fn make_exporter_labels(spec: &ResolvedSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), format!("{}-exporter", spec.name)),
        (COMPONENT_LABEL.to_string(), METRICS_COMPONENT.to_string()),
    ])
}

pub fn make_owner_reference(rabbitmq: &RabbitmqCluster) -> Result<metav1::OwnerReference, Error> {
    if rabbitmq.metadata.name.is_none() {
        return Err(Error::MissingObjectKey(".metadata.name"));
    }
    rabbitmq
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey(".metadata.uid"))
}

pub fn make_metadata(
    spec: &ResolvedSpec,
    name: String,
    labels: BTreeMap<String, String>,
    annotations: Option<BTreeMap<String, String>>,
) -> metav1::ObjectMeta {
    metav1::ObjectMeta {
        name: Some(name),
        namespace: Some(spec.namespace.clone()),
        labels: Some(labels),
        annotations,
        ..metav1::ObjectMeta::default()
    }
}

pub fn make_service_port(name: &str, port: i32) -> corev1::ServicePort {
    corev1::ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some(DEFAULT_PROTOCOL.to_string()),
        ..corev1::ServicePort::default()
    }
}

pub fn make_container_port(name: &str, port: i32) -> corev1::ContainerPort {
    corev1::ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some(DEFAULT_PROTOCOL.to_string()),
        ..corev1::ContainerPort::default()
    }
}

pub fn make_env_var(name: &str, value: impl Into<String>) -> corev1::EnvVar {
    corev1::EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

pub fn make_field_ref_env_var(name: &str, field_path: &str) -> corev1::EnvVar {
    corev1::EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(corev1::EnvVarSource {
            field_ref: Some(corev1::ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: field_path.to_string(),
            }),
            ..corev1::EnvVarSource::default()
        }),
    }
}

/// Builds a ClusterIP service, or a headless one publishing not-ready addresses
/// when `headless` is set.
pub fn make_service(
    spec: &ResolvedSpec,
    name: String,
    labels: BTreeMap<String, String>,
    annotations: Option<BTreeMap<String, String>>,
    ports: Vec<corev1::ServicePort>,
    headless: bool,
) -> corev1::Service {
    corev1::Service {
        metadata: make_metadata(spec, name, labels.clone(), annotations),
        spec: Some(corev1::ServiceSpec {
            type_: Some(DEFAULT_SERVICE_TYPE.to_string()),
            cluster_ip: headless.then(|| HEADLESS_CLUSTER_IP.to_string()),
            publish_not_ready_addresses: headless.then_some(true),
            selector: Some(labels),
            ports: Some(ports),
            ..corev1::ServiceSpec::default()
        }),
        ..corev1::Service::default()
    }
}

fn is_subset(desired: &Option<BTreeMap<String, String>>, observed: &Option<BTreeMap<String, String>>) -> bool {
    match desired {
        None => true,
        Some(desired) => {
            let empty = BTreeMap::new();
            let observed = observed.as_ref().unwrap_or(&empty);
            desired.iter().all(|(k, v)| observed.get(k) == Some(v))
        }
    }
}

/// Labels and annotations the controller sets must be present on the observed object.
/// Extra entries added by users or other controllers are left alone.
pub fn metadata_matches(desired: &metav1::ObjectMeta, observed: &metav1::ObjectMeta) -> bool {
    is_subset(&desired.labels, &observed.labels)
        && is_subset(&desired.annotations, &observed.annotations)
}

fn protocol(protocol: &Option<String>) -> &str {
    protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL)
}

fn service_port_matches(desired: &corev1::ServicePort, observed: &corev1::ServicePort) -> bool {
    let target_port = |p: &corev1::ServicePort| {
        p.target_port.clone().unwrap_or(IntOrString::Int(p.port))
    };
    desired.name == observed.name
        && desired.port == observed.port
        && target_port(desired) == target_port(observed)
        && protocol(&desired.protocol) == protocol(&observed.protocol)
}

pub fn service_matches(desired: &corev1::Service, observed: &corev1::Service) -> bool {
    if !metadata_matches(&desired.metadata, &observed.metadata) {
        return false;
    }
    let (desired, observed) = match (&desired.spec, &observed.spec) {
        (Some(desired), Some(observed)) => (desired, observed),
        (None, _) => return true,
        (Some(_), None) => return false,
    };
    let headless = |s: &corev1::ServiceSpec| s.cluster_ip.as_deref() == Some(HEADLESS_CLUSTER_IP);
    let service_type = |s: &corev1::ServiceSpec| {
        s.type_.clone().unwrap_or_else(|| DEFAULT_SERVICE_TYPE.to_string())
    };
    let desired_ports = desired.ports.as_deref().unwrap_or_default();
    let observed_ports = observed.ports.as_deref().unwrap_or_default();
    service_type(desired) == service_type(observed)
        && headless(desired) == headless(observed)
        && desired.selector == observed.selector
        && desired.publish_not_ready_addresses.unwrap_or(false)
            == observed.publish_not_ready_addresses.unwrap_or(false)
        && desired_ports.len() == observed_ports.len()
        && desired_ports
            .iter()
            .zip(observed_ports)
            .all(|(d, o)| service_port_matches(d, o))
}

fn container_port_matches(desired: &corev1::ContainerPort, observed: &corev1::ContainerPort) -> bool {
    desired.name == observed.name
        && desired.container_port == observed.container_port
        && protocol(&desired.protocol) == protocol(&observed.protocol)
}

/// Compares probe handlers and timings. Thresholds the API server defaults are only
/// compared when the desired probe sets them.
fn probe_matches(desired: &Option<corev1::Probe>, observed: &Option<corev1::Probe>) -> bool {
    let (desired, observed) = match (desired, observed) {
        (None, None) => return true,
        (Some(desired), Some(observed)) => (desired, observed),
        _ => return false,
    };
    let http_get_matches = match (&desired.http_get, &observed.http_get) {
        (None, None) => true,
        (Some(d), Some(o)) => {
            d.port == o.port
                && (d.path.is_none() || d.path == o.path)
                && (d.scheme.is_none() || d.scheme == o.scheme)
        }
        _ => false,
    };
    let optional_matches = |d: Option<i32>, o: Option<i32>| d.is_none() || d == o;
    desired.exec == observed.exec
        && http_get_matches
        && desired.tcp_socket == observed.tcp_socket
        && desired.initial_delay_seconds == observed.initial_delay_seconds
        && desired.timeout_seconds == observed.timeout_seconds
        && desired.period_seconds == observed.period_seconds
        && optional_matches(desired.failure_threshold, observed.failure_threshold)
        && optional_matches(desired.success_threshold, observed.success_threshold)
}

pub fn container_matches(desired: &corev1::Container, observed: &corev1::Container) -> bool {
    let desired_ports = desired.ports.as_deref().unwrap_or_default();
    let observed_ports = observed.ports.as_deref().unwrap_or_default();
    desired.name == observed.name
        && desired.image == observed.image
        && (desired.image_pull_policy.is_none()
            || desired.image_pull_policy == observed.image_pull_policy)
        && desired.command == observed.command
        && desired.args == observed.args
        && desired.env.as_deref().unwrap_or_default() == observed.env.as_deref().unwrap_or_default()
        && desired_ports.len() == observed_ports.len()
        && desired_ports
            .iter()
            .zip(observed_ports)
            .all(|(d, o)| container_port_matches(d, o))
        && desired.volume_mounts.as_deref().unwrap_or_default()
            == observed.volume_mounts.as_deref().unwrap_or_default()
        && probe_matches(&desired.readiness_probe, &observed.readiness_probe)
        && probe_matches(&desired.liveness_probe, &observed.liveness_probe)
        && resource_requirements_match(desired.resources.as_ref(), observed.resources.as_ref())
}

fn volume_matches(desired: &corev1::Volume, observed: &corev1::Volume) -> bool {
    let config_map_matches = match (&desired.config_map, &observed.config_map) {
        (None, None) => true,
        (Some(d), Some(o)) => d.name == o.name && d.items == o.items,
        _ => false,
    };
    desired.name == observed.name
        && config_map_matches
        && desired.empty_dir.is_some() == observed.empty_dir.is_some()
}

/// Compares the pod template fields the controller sets. Template labels follow the
/// same subset rule as object labels; template annotations are not compared.
pub fn pod_template_matches(desired: &corev1::PodTemplateSpec, observed: &corev1::PodTemplateSpec) -> bool {
    let labels = |t: &corev1::PodTemplateSpec| t.metadata.as_ref().and_then(|m| m.labels.clone());
    if !is_subset(&labels(desired), &labels(observed)) {
        return false;
    }
    let (desired, observed) = match (&desired.spec, &observed.spec) {
        (Some(desired), Some(observed)) => (desired, observed),
        (None, _) => return true,
        (Some(_), None) => return false,
    };
    let desired_volumes = desired.volumes.as_deref().unwrap_or_default();
    let observed_volumes = observed.volumes.as_deref().unwrap_or_default();
    desired.containers.len() == observed.containers.len()
        && desired
            .containers
            .iter()
            .zip(&observed.containers)
            .all(|(d, o)| container_matches(d, o))
        && desired.service_account_name.as_deref().unwrap_or_default()
            == observed.service_account_name.as_deref().unwrap_or_default()
        && desired.affinity == observed.affinity
        && desired_volumes.len() == observed_volumes.len()
        && desired_volumes
            .iter()
            .zip(observed_volumes)
            .all(|(d, o)| volume_matches(d, o))
}

pub fn label_selector_matches(desired: &metav1::LabelSelector, observed: &metav1::LabelSelector) -> bool {
    desired.match_labels == observed.match_labels
        && desired.match_expressions.as_deref().unwrap_or_default()
            == observed.match_expressions.as_deref().unwrap_or_default()
}
