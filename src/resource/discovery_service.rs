// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::common::*;
use super::ResourceBuilder;
use crate::synthesizer::ResolvedSpec;
use k8s_openapi::api::core::v1 as corev1;

pub struct DiscoveryServiceBuilder {}

impl ResourceBuilder for DiscoveryServiceBuilder {
    type Object = corev1::Service;

    fn matches(desired: &corev1::Service, observed: &corev1::Service) -> bool {
        service_matches(desired, observed)
    }
}

pub fn make_discovery_service_name(spec: &ResolvedSpec) -> String {
    spec.discovery_service.clone()
}

pub fn make_discovery_service(spec: &ResolvedSpec) -> corev1::Service {
    let ports = vec![
        make_service_port("http", RABBITMQ_HTTP_PORT),
        make_service_port("amqp", RABBITMQ_AMQP_PORT),
    ];
    make_service(spec, make_discovery_service_name(spec), make_labels(spec), None, ports, false)
}
