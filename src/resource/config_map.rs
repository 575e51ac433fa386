// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::common::*;
use super::ResourceBuilder;
use crate::synthesizer::ResolvedSpec;
use k8s_openapi::api::core::v1 as corev1;
use std::collections::BTreeMap;

pub const RABBITMQ_CONF_KEY: &str = "rabbitmq.conf";
pub const ENABLED_PLUGINS_KEY: &str = "enabled_plugins";

const ENABLED_PLUGINS: &str = "[rabbitmq_management,rabbitmq_peer_discovery_k8s].";

pub struct ServerConfigMapBuilder {}

impl ResourceBuilder for ServerConfigMapBuilder {
    type Object = corev1::ConfigMap;

    fn matches(desired: &corev1::ConfigMap, observed: &corev1::ConfigMap) -> bool {
        metadata_matches(&desired.metadata, &observed.metadata)
            && desired.data.clone().unwrap_or_default() == observed.data.clone().unwrap_or_default()
    }
}

pub fn make_server_config_map_name(spec: &ResolvedSpec) -> String {
    format!("{}-config", spec.name)
}

pub fn make_server_config_map(spec: &ResolvedSpec) -> corev1::ConfigMap {
    corev1::ConfigMap {
        metadata: make_metadata(spec, make_server_config_map_name(spec), make_labels(spec), None),
        data: Some(BTreeMap::from([
            (RABBITMQ_CONF_KEY.to_string(), default_rbmq_config()),
            (ENABLED_PLUGINS_KEY.to_string(), ENABLED_PLUGINS.to_string()),
        ])),
        ..corev1::ConfigMap::default()
    }
}

fn default_rbmq_config() -> String {
    concat!(
        "cluster_formation.peer_discovery_backend = rabbit_peer_discovery_k8s\n",
        "cluster_formation.k8s.host = kubernetes.default.svc\n",
        "cluster_formation.k8s.address_type = ip\n",
        "cluster_formation.node_cleanup.interval = 30\n",
        "cluster_formation.node_cleanup.only_log_warning = true\n",
        "cluster_partition_handling = autoheal\n",
        "queue_master_locator = min-masters\n",
        "loopback_users.guest = false\n",
    )
    .to_string()
}
