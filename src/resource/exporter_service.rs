// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::common::*;
use super::ResourceBuilder;
use crate::synthesizer::{ExporterSpec, ResolvedSpec};
use k8s_openapi::api::core::v1 as corev1;
use std::collections::BTreeMap;

pub const PROMETHEUS_SCRAPE_ANNOTATION: &str = "prometheus.io/scrape";

pub struct ExporterServiceBuilder {}

impl ResourceBuilder for ExporterServiceBuilder {
    type Object = corev1::Service;

    fn matches(desired: &corev1::Service, observed: &corev1::Service) -> bool {
        service_matches(desired, observed)
    }
}

pub fn make_exporter_service_name(spec: &ResolvedSpec) -> String {
    format!("{}-exporter", spec.name)
}

pub fn make_exporter_service(spec: &ResolvedSpec, exporter: &ExporterSpec) -> corev1::Service {
    let annotations = BTreeMap::from([(PROMETHEUS_SCRAPE_ANNOTATION.to_string(), "true".to_string())]);
    make_service(
        spec,
        make_exporter_service_name(spec),
        make_exporter_labels(spec),
        Some(annotations),
        vec![make_service_port("metrics", exporter.port)],
        false,
    )
}
