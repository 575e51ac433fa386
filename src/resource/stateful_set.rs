// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::common::*;
use super::config_map::{make_server_config_map_name, ENABLED_PLUGINS_KEY, RABBITMQ_CONF_KEY};
use super::discovery_service::make_discovery_service_name;
use super::headless_service::make_headless_service_name;
use super::quantity::resource_lists_match;
use super::ResourceBuilder;
use crate::synthesizer::{ResolvedSpec, VolumeMode};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::BTreeMap;

pub const RABBITMQ_CONTAINER_NAME: &str = "rabbitmq";
pub const CONFIG_VOLUME_NAME: &str = "config-volume";
pub const DATA_VOLUME_NAME: &str = "rabbitmq-data";
pub const ERLANG_COOKIE: &str = "mycookie";

const CONFIG_MOUNT_PATH: &str = "/etc/rabbitmq";
const DATA_MOUNT_PATH: &str = "/var/lib/rabbitmq";

pub struct StatefulSetBuilder {}

impl ResourceBuilder for StatefulSetBuilder {
    type Object = appsv1::StatefulSet;

    /// Compares only the fields an update can change. Volume claim templates, selector
    /// and service name are immutable once the StatefulSet exists.
    fn matches(desired: &appsv1::StatefulSet, observed: &appsv1::StatefulSet) -> bool {
        if !metadata_matches(&desired.metadata, &observed.metadata) {
            return false;
        }
        let (desired, observed) = match (&desired.spec, &observed.spec) {
            (Some(desired), Some(observed)) => (desired, observed),
            (None, _) => return true,
            (Some(_), None) => return false,
        };
        let strategy = |s: &appsv1::StatefulSetSpec| {
            s.update_strategy.as_ref().and_then(|u| u.type_.clone())
        };
        let mut template = desired.template.clone();
        keep_observed_data_volume(&mut template, observed);
        desired.replicas == observed.replicas
            && strategy(desired) == strategy(observed)
            && pod_template_matches(&template, &observed.template)
    }

    /// Starts from the observed spec and overwrites replicas, update strategy and pod
    /// template. The observed data volume layout and pod template annotations (e.g. the
    /// restart timestamp written by `kubectl rollout restart`) are kept.
    fn update(desired: appsv1::StatefulSet, observed: &appsv1::StatefulSet) -> appsv1::StatefulSet {
        let appsv1::StatefulSet { metadata, spec, .. } = desired;
        let (desired_spec, observed_spec) = match (spec, observed.spec.as_ref()) {
            (Some(desired_spec), Some(observed_spec)) => (desired_spec, observed_spec),
            (spec, _) => {
                return appsv1::StatefulSet {
                    metadata,
                    spec,
                    ..appsv1::StatefulSet::default()
                }
            }
        };
        let mut template = desired_spec.template;
        keep_observed_data_volume(&mut template, observed_spec);
        template
            .metadata
            .get_or_insert_with(metav1::ObjectMeta::default)
            .annotations = observed_spec
            .template
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.clone());
        appsv1::StatefulSet {
            metadata,
            spec: Some(appsv1::StatefulSetSpec {
                replicas: desired_spec.replicas,
                update_strategy: desired_spec.update_strategy,
                template,
                ..observed_spec.clone()
            }),
            ..appsv1::StatefulSet::default()
        }
    }
}

/// Whether the observed StatefulSet already has the desired data volume claim
/// templates. A mismatch cannot be repaired by an update.
pub fn data_volume_matches(desired: &appsv1::StatefulSet, observed: &appsv1::StatefulSet) -> bool {
    let claims = |sts: &appsv1::StatefulSet| {
        sts.spec
            .as_ref()
            .and_then(|s| s.volume_claim_templates.clone())
            .unwrap_or_default()
    };
    volume_claim_templates_match(&claims(desired), &claims(observed))
}

fn has_data_volume_claim(spec: &appsv1::StatefulSetSpec) -> bool {
    spec.volume_claim_templates
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|t| t.metadata.name.as_deref() == Some(DATA_VOLUME_NAME))
}

/// Makes the data volume of `template` follow the storage mode of the observed
/// StatefulSet: no pod volume when it has a claim template, an `emptyDir` otherwise.
fn keep_observed_data_volume(template: &mut corev1::PodTemplateSpec, observed: &appsv1::StatefulSetSpec) {
    if let Some(pod_spec) = template.spec.as_mut() {
        let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
        volumes.retain(|v| v.name != DATA_VOLUME_NAME);
        if !has_data_volume_claim(observed) {
            volumes.push(make_ephemeral_data_volume());
        }
    }
}

fn make_ephemeral_data_volume() -> corev1::Volume {
    corev1::Volume {
        name: DATA_VOLUME_NAME.to_string(),
        empty_dir: Some(corev1::EmptyDirVolumeSource::default()),
        ..corev1::Volume::default()
    }
}

fn volume_claim_templates_match(
    desired: &[corev1::PersistentVolumeClaim],
    observed: &[corev1::PersistentVolumeClaim],
) -> bool {
    desired.len() == observed.len()
        && desired.iter().zip(observed).all(|(d, o)| {
            let requests = |pvc: &corev1::PersistentVolumeClaim| {
                pvc.spec
                    .as_ref()
                    .and_then(|s| s.resources.as_ref())
                    .and_then(|r| r.requests.clone())
            };
            let access_modes = |pvc: &corev1::PersistentVolumeClaim| {
                pvc.spec.as_ref().and_then(|s| s.access_modes.clone())
            };
            let storage_class = |pvc: &corev1::PersistentVolumeClaim| {
                pvc.spec.as_ref().and_then(|s| s.storage_class_name.clone())
            };
            d.metadata.name == o.metadata.name
                && access_modes(d) == access_modes(o)
                && storage_class(d) == storage_class(o)
                && resource_lists_match(requests(d).as_ref(), requests(o).as_ref())
        })
}

pub fn make_stateful_set_name(spec: &ResolvedSpec) -> String {
    format!("{}-server", spec.name)
}

pub fn make_stateful_set(spec: &ResolvedSpec) -> appsv1::StatefulSet {
    let labels = make_labels(spec);
    let mut volumes = vec![make_config_volume(spec)];
    let volume_claim_templates = match &spec.volume {
        VolumeMode::Persistent { size, storage_class } => {
            Some(vec![make_data_volume_claim(spec, size, storage_class)])
        }
        VolumeMode::Ephemeral => {
            volumes.push(make_ephemeral_data_volume());
            None
        }
    };

    appsv1::StatefulSet {
        metadata: make_metadata(spec, make_stateful_set_name(spec), labels.clone(), None),
        spec: Some(appsv1::StatefulSetSpec {
            replicas: Some(spec.replicas),
            service_name: make_headless_service_name(spec),
            selector: metav1::LabelSelector {
                match_labels: Some(labels.clone()),
                ..metav1::LabelSelector::default()
            },
            update_strategy: Some(appsv1::StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: None,
            }),
            template: corev1::PodTemplateSpec {
                metadata: Some(metav1::ObjectMeta {
                    labels: Some(labels),
                    ..metav1::ObjectMeta::default()
                }),
                spec: Some(corev1::PodSpec {
                    service_account_name: spec.service_account.clone(),
                    containers: vec![make_rabbitmq_container(spec)],
                    volumes: Some(volumes),
                    affinity: Some(spec.affinity.clone()),
                    ..corev1::PodSpec::default()
                }),
            },
            volume_claim_templates,
            ..appsv1::StatefulSetSpec::default()
        }),
        ..appsv1::StatefulSet::default()
    }
}

fn make_config_volume(spec: &ResolvedSpec) -> corev1::Volume {
    let item = |key: &str| corev1::KeyToPath {
        key: key.to_string(),
        path: key.to_string(),
        mode: None,
    };
    corev1::Volume {
        name: CONFIG_VOLUME_NAME.to_string(),
        config_map: Some(corev1::ConfigMapVolumeSource {
            name: Some(make_server_config_map_name(spec)),
            items: Some(vec![item(RABBITMQ_CONF_KEY), item(ENABLED_PLUGINS_KEY)]),
            ..corev1::ConfigMapVolumeSource::default()
        }),
        ..corev1::Volume::default()
    }
}

fn make_data_volume_claim(
    spec: &ResolvedSpec,
    size: &Quantity,
    storage_class: &Option<String>,
) -> corev1::PersistentVolumeClaim {
    corev1::PersistentVolumeClaim {
        metadata: metav1::ObjectMeta {
            name: Some(DATA_VOLUME_NAME.to_string()),
            labels: Some(make_labels(spec)),
            ..metav1::ObjectMeta::default()
        },
        spec: Some(corev1::PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(corev1::ResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), size.clone())])),
                ..corev1::ResourceRequirements::default()
            }),
            storage_class_name: storage_class.clone(),
            ..corev1::PersistentVolumeClaimSpec::default()
        }),
        ..corev1::PersistentVolumeClaim::default()
    }
}

fn make_rabbitmq_container(spec: &ResolvedSpec) -> corev1::Container {
    corev1::Container {
        name: RABBITMQ_CONTAINER_NAME.to_string(),
        image: Some(spec.image.clone()),
        image_pull_policy: Some(spec.image_pull_policy.clone()),
        env: Some(make_env_vars(spec)),
        ports: Some(vec![
            make_container_port("http", RABBITMQ_HTTP_PORT),
            make_container_port("amqp", RABBITMQ_AMQP_PORT),
        ]),
        volume_mounts: Some(vec![
            corev1::VolumeMount {
                name: CONFIG_VOLUME_NAME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                ..corev1::VolumeMount::default()
            },
            corev1::VolumeMount {
                name: DATA_VOLUME_NAME.to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..corev1::VolumeMount::default()
            },
        ]),
        readiness_probe: Some(make_status_probe(20, 10, 60)),
        liveness_probe: Some(make_status_probe(60, 15, 60)),
        resources: spec.resources.clone(),
        ..corev1::Container::default()
    }
}

fn make_env_vars(spec: &ResolvedSpec) -> Vec<corev1::EnvVar> {
    vec![
        make_field_ref_env_var("MY_POD_IP", "status.podIP"),
        make_env_var("RABBITMQ_USE_LONGNAME", "true"),
        make_env_var("RABBITMQ_NODENAME", "rabbit@$(MY_POD_IP)"),
        make_env_var("K8S_SERVICE_NAME", make_discovery_service_name(spec)),
        make_env_var("RABBITMQ_ERLANG_COOKIE", ERLANG_COOKIE),
        make_env_var("RABBITMQ_DEFAULT_USER", spec.default_username.clone()),
        make_env_var("RABBITMQ_DEFAULT_PASS", spec.default_password.clone()),
        make_env_var("RABBITMQ_DEFAULT_VHOST", spec.default_vhost.clone()),
    ]
}

fn make_status_probe(initial_delay_seconds: i32, timeout_seconds: i32, period_seconds: i32) -> corev1::Probe {
    corev1::Probe {
        exec: Some(corev1::ExecAction {
            command: Some(vec!["rabbitmqctl".to_string(), "status".to_string()]),
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        timeout_seconds: Some(timeout_seconds),
        period_seconds: Some(period_seconds),
        ..corev1::Probe::default()
    }
}

/// Prefers spreading pods of one cluster across nodes.
pub fn make_default_affinity(name: &str) -> corev1::Affinity {
    corev1::Affinity {
        pod_anti_affinity: Some(corev1::PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                corev1::WeightedPodAffinityTerm {
                    weight: 20,
                    pod_affinity_term: corev1::PodAffinityTerm {
                        label_selector: Some(metav1::LabelSelector {
                            match_expressions: Some(vec![metav1::LabelSelectorRequirement {
                                key: APP_LABEL.to_string(),
                                operator: "In".to_string(),
                                values: Some(vec![name.to_string()]),
                            }]),
                            ..metav1::LabelSelector::default()
                        }),
                        topology_key: "kubernetes.io/hostname".to_string(),
                        ..corev1::PodAffinityTerm::default()
                    },
                },
            ]),
            ..corev1::PodAntiAffinity::default()
        }),
        ..corev1::Affinity::default()
    }
}
