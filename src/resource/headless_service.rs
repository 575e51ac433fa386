// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::common::*;
use super::ResourceBuilder;
use crate::synthesizer::ResolvedSpec;
use k8s_openapi::api::core::v1 as corev1;

pub struct HeadlessServiceBuilder {}

impl ResourceBuilder for HeadlessServiceBuilder {
    type Object = corev1::Service;

    fn matches(desired: &corev1::Service, observed: &corev1::Service) -> bool {
        service_matches(desired, observed)
    }
}

pub fn make_headless_service_name(spec: &ResolvedSpec) -> String {
    format!("{}-nodes", spec.name)
}

/// Stable per-pod DNS for the StatefulSet. Not-ready pods are published so nodes can
/// find each other before they pass readiness.
pub fn make_headless_service(spec: &ResolvedSpec) -> corev1::Service {
    let ports = vec![
        make_service_port("epmd", RABBITMQ_EPMD_PORT),
        make_service_port("cluster-rpc", RABBITMQ_CLUSTER_PORT),
    ];
    make_service(spec, make_headless_service_name(spec), make_labels(spec), None, ports, true)
}
