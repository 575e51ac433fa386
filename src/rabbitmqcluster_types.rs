// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const CONDITION_RECONCILED: &str = "Reconciled";
pub const REASON_CONVERGED: &str = "Converged";
pub const REASON_FATAL_ERROR: &str = "FatalError";

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "anvil.dev", version = "v1", kind = "RabbitmqCluster")]
#[kube(shortname = "rbmq", namespaced, status = "RabbitmqClusterStatus")]
pub struct RabbitmqClusterSpec {
    pub replicas: i32,
    pub image: String,
    #[serde(rename = "imagePullPolicy", default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(rename = "service_account", default, skip_serializing_if = "String::is_empty")]
    pub service_account: String,
    #[serde(rename = "discovery_service", default, skip_serializing_if = "String::is_empty")]
    pub discovery_service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vhost: String,
    #[serde(rename = "data_volume_size", default, skip_serializing_if = "Option::is_none")]
    pub data_volume_size: Option<Quantity>,
    #[serde(rename = "dataStorageClass", default, skip_serializing_if = "String::is_empty")]
    pub data_storage_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<corev1::Affinity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<corev1::ResourceRequirements>,
    #[serde(rename = "defaultUsername", default, skip_serializing_if = "String::is_empty")]
    pub default_username: String,
    #[serde(rename = "defaultPassword", default, skip_serializing_if = "String::is_empty")]
    pub default_password: String,
    #[serde(rename = "defaultVHost", default, skip_serializing_if = "String::is_empty")]
    pub default_vhost: String,
    #[serde(rename = "exporter_image", default, skip_serializing_if = "String::is_empty")]
    pub exporter_image: String,
    #[serde(rename = "exporter_port", default)]
    pub exporter_port: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RabbitmqClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RabbitmqClusterCondition>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RabbitmqClusterCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl RabbitmqClusterStatus {
    pub fn reconciled(observed_generation: Option<i64>) -> RabbitmqClusterStatus {
        RabbitmqClusterStatus {
            observed_generation,
            conditions: vec![RabbitmqClusterCondition {
                type_: CONDITION_RECONCILED.to_string(),
                status: "True".to_string(),
                reason: REASON_CONVERGED.to_string(),
                message: String::new(),
            }],
        }
    }

    pub fn failed(observed_generation: Option<i64>, message: String) -> RabbitmqClusterStatus {
        RabbitmqClusterStatus {
            observed_generation,
            conditions: vec![RabbitmqClusterCondition {
                type_: CONDITION_RECONCILED.to_string(),
                status: "False".to_string(),
                reason: REASON_FATAL_ERROR.to_string(),
                message,
            }],
        }
    }

    pub fn condition(&self, type_: &str) -> Option<&RabbitmqClusterCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
