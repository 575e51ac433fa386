// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::common::*;
use super::discovery_service::make_discovery_service_name;
use super::ResourceBuilder;
use crate::synthesizer::{ExporterSpec, ResolvedSpec};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

pub const EXPORTER_CONTAINER_NAME: &str = "exporter";

pub struct ExporterDeploymentBuilder {}

impl ResourceBuilder for ExporterDeploymentBuilder {
    type Object = appsv1::Deployment;

    fn matches(desired: &appsv1::Deployment, observed: &appsv1::Deployment) -> bool {
        if !metadata_matches(&desired.metadata, &observed.metadata) {
            return false;
        }
        match (&desired.spec, &observed.spec) {
            (Some(desired), Some(observed)) => {
                desired.replicas == observed.replicas
                    && label_selector_matches(&desired.selector, &observed.selector)
                    && pod_template_matches(&desired.template, &observed.template)
            }
            (None, _) => true,
            (Some(_), None) => false,
        }
    }
}

pub fn make_exporter_deployment_name(spec: &ResolvedSpec) -> String {
    format!("{}-exporter", spec.name)
}

pub fn make_exporter_deployment(spec: &ResolvedSpec, exporter: &ExporterSpec) -> appsv1::Deployment {
    let labels = make_exporter_labels(spec);
    appsv1::Deployment {
        metadata: make_metadata(spec, make_exporter_deployment_name(spec), labels.clone(), None),
        spec: Some(appsv1::DeploymentSpec {
            replicas: Some(1),
            selector: metav1::LabelSelector {
                match_labels: Some(labels.clone()),
                ..metav1::LabelSelector::default()
            },
            template: corev1::PodTemplateSpec {
                metadata: Some(metav1::ObjectMeta {
                    labels: Some(labels),
                    ..metav1::ObjectMeta::default()
                }),
                spec: Some(corev1::PodSpec {
                    service_account_name: spec.service_account.clone(),
                    containers: vec![make_exporter_container(spec, exporter)],
                    ..corev1::PodSpec::default()
                }),
            },
            ..appsv1::DeploymentSpec::default()
        }),
        ..appsv1::Deployment::default()
    }
}

fn make_exporter_container(spec: &ResolvedSpec, exporter: &ExporterSpec) -> corev1::Container {
    corev1::Container {
        name: EXPORTER_CONTAINER_NAME.to_string(),
        image: Some(exporter.image.clone()),
        env: Some(make_exporter_env_vars(spec, exporter)),
        ports: Some(vec![make_container_port("metrics", exporter.port)]),
        readiness_probe: Some(make_exporter_probe(exporter.port)),
        liveness_probe: Some(make_exporter_probe(exporter.port)),
        ..corev1::Container::default()
    }
}

fn make_exporter_env_vars(spec: &ResolvedSpec, exporter: &ExporterSpec) -> Vec<corev1::EnvVar> {
    vec![
        make_env_var("RABBIT_HTTP_PORT", RABBITMQ_HTTP_PORT.to_string()),
        make_env_var(
            "RABBIT_URL",
            format!("http://{}:$(RABBIT_HTTP_PORT)", make_discovery_service_name(spec)),
        ),
        make_env_var("RABBIT_USER", spec.default_username.clone()),
        make_env_var("RABBIT_PASSWORD", spec.default_password.clone()),
        make_env_var("RABBITMQ_DEFAULT_VHOST", spec.default_vhost.clone()),
        make_env_var("RABBIT_CAPABILITIES", "no_sort,"),
        make_env_var("PUBLISH_PORT", exporter.port.to_string()),
        make_env_var("LOG_LEVEL", "info"),
        make_env_var("SKIPVERIFY", "1"),
        make_env_var("SKIP_QUEUES", "^$"),
        make_env_var("INCLUDE_QUEUES", ".*"),
        make_env_var("RABBIT_EXPORTERS", "overview,exchange,node"),
    ]
}

fn make_exporter_probe(port: i32) -> corev1::Probe {
    corev1::Probe {
        http_get: Some(corev1::HTTPGetAction {
            port: IntOrString::Int(port),
            scheme: Some("HTTP".to_string()),
            ..corev1::HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(30),
        timeout_seconds: Some(5),
        period_seconds: Some(30),
        ..corev1::Probe::default()
    }
}
