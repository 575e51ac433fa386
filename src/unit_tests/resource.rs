// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use super::*;
use crate::resource::quantity::*;
use crate::resource::*;
use crate::synthesizer::{resolve, synthesize};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

fn desired(sub_resource: SubResource) -> ChildResource {
    synthesize(&resolve(&make_rabbitmq(make_exporter_spec())).unwrap())
        .into_iter()
        .find(|c| c.sub_resource() == sub_resource)
        .unwrap()
}

/// Mimics what the API server adds to a stored object.
fn as_observed(desired: &ChildResource) -> ChildResource {
    let mut observed = desired.clone();
    let metadata = observed.metadata_mut();
    metadata.resource_version = Some("42".to_string());
    metadata.uid = Some("child-uid".to_string());
    metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert("extra".to_string(), "label".to_string());
    match &mut observed {
        ChildResource::StatefulSet(sts) => {
            sts.status = Some(Default::default());
            let template = &mut sts.spec.as_mut().unwrap().template;
            template.metadata.as_mut().unwrap().annotations = Some(BTreeMap::from([(
                "kubectl.kubernetes.io/restartedAt".to_string(),
                "2023-01-01T00:00:00Z".to_string(),
            )]));
            let pod_spec = template.spec.as_mut().unwrap();
            pod_spec.restart_policy = Some("Always".to_string());
            pod_spec.dns_policy = Some("ClusterFirst".to_string());
            let container = &mut pod_spec.containers[0];
            container.termination_message_path = Some("/dev/termination-log".to_string());
            let probe = container.readiness_probe.as_mut().unwrap();
            probe.failure_threshold = Some(3);
            probe.success_threshold = Some(1);
            if let Some(volumes) = pod_spec.volumes.as_mut() {
                for volume in volumes.iter_mut() {
                    if let Some(config_map) = volume.config_map.as_mut() {
                        config_map.default_mode = Some(420);
                    }
                }
            }
        }
        ChildResource::HeadlessService(s)
        | ChildResource::DiscoveryService(s)
        | ChildResource::ExporterService(s) => {
            let spec = s.spec.as_mut().unwrap();
            if spec.cluster_ip.is_none() {
                spec.cluster_ip = Some("10.96.0.10".to_string());
                spec.cluster_ips = Some(vec!["10.96.0.10".to_string()]);
            }
            spec.session_affinity = Some("None".to_string());
        }
        _ => {}
    }
    observed
}

#[test]
pub fn test_matches_ignores_server_populated_fields() {
    for sub_resource in [
        SubResource::ServerConfigMap,
        SubResource::HeadlessService,
        SubResource::DiscoveryService,
        SubResource::ExporterService,
        SubResource::ExporterDeployment,
        SubResource::StatefulSet,
    ] {
        let desired = desired(sub_resource);
        assert!(desired.matches(&as_observed(&desired)), "{:?} should match", sub_resource);
    }
}

#[test]
pub fn test_matches_detects_image_drift() {
    let desired = desired(SubResource::StatefulSet);
    let mut observed = as_observed(&desired);
    if let ChildResource::StatefulSet(sts) = &mut observed {
        sts.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0].image =
            Some("rabbitmq:3.8".to_string());
    }
    assert!(!desired.matches(&observed));
}

#[test]
pub fn test_matches_detects_replica_drift() {
    let desired = desired(SubResource::StatefulSet);
    let mut observed = as_observed(&desired);
    if let ChildResource::StatefulSet(sts) = &mut observed {
        sts.spec.as_mut().unwrap().replicas = Some(1);
    }
    assert!(!desired.matches(&observed));
}

#[test]
pub fn test_matches_detects_missing_label() {
    let desired = desired(SubResource::DiscoveryService);
    let mut observed = as_observed(&desired);
    observed.metadata_mut().labels.as_mut().unwrap().remove(APP_LABEL);
    assert!(!desired.matches(&observed));
}

#[test]
pub fn test_matches_detects_config_drift() {
    let desired = desired(SubResource::ServerConfigMap);
    let mut observed = as_observed(&desired);
    if let ChildResource::ServerConfigMap(cm) = &mut observed {
        cm.data
            .as_mut()
            .unwrap()
            .insert(ENABLED_PLUGINS_KEY.to_string(), "[].".to_string());
    }
    assert!(!desired.matches(&observed));
}

#[test]
pub fn test_matches_detects_port_drift() {
    let desired = desired(SubResource::ExporterService);
    let mut observed = as_observed(&desired);
    if let ChildResource::ExporterService(s) = &mut observed {
        s.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].port = 9000;
    }
    assert!(!desired.matches(&observed));
}

#[test]
pub fn test_headless_service_does_not_match_cluster_ip_service() {
    let headless = desired(SubResource::HeadlessService);
    let mut observed = as_observed(&headless);
    if let ChildResource::HeadlessService(s) = &mut observed {
        s.spec.as_mut().unwrap().cluster_ip = Some("10.96.0.11".to_string());
    }
    assert!(!headless.matches(&observed));
}

#[test]
pub fn test_different_kinds_never_match() {
    let config_map = desired(SubResource::ServerConfigMap);
    let sts = desired(SubResource::StatefulSet);
    assert!(!config_map.matches(&sts));
}

#[test]
pub fn test_resources_match_semantically() {
    let mut rabbitmq = make_rabbitmq(make_spec());
    rabbitmq.spec.resources = Some(corev1::ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("1000m".to_string())),
            ("memory".to_string(), Quantity("1Gi".to_string())),
        ])),
        ..corev1::ResourceRequirements::default()
    });
    let desired = synthesize(&resolve(&rabbitmq).unwrap()).pop().unwrap();
    let mut observed = as_observed(&desired);
    if let ChildResource::StatefulSet(sts) = &mut observed {
        let container = &mut sts.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0];
        container.resources = Some(corev1::ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("1".to_string())),
                ("memory".to_string(), Quantity("1073741824".to_string())),
            ])),
            ..corev1::ResourceRequirements::default()
        });
    }
    assert!(desired.matches(&observed));
}

#[test]
pub fn test_update_from_keeps_observed_version_and_annotations() {
    let desired = desired(SubResource::StatefulSet);
    let mut observed = as_observed(&desired);
    observed.metadata_mut().owner_references = Some(vec![Default::default()]);
    let updated = desired.clone().update_from(&observed);
    assert_eq!(updated.resource_version(), Some("42"));
    assert_eq!(updated.metadata().owner_references, observed.metadata().owner_references);
    match (&updated, &observed) {
        (ChildResource::StatefulSet(u), ChildResource::StatefulSet(o)) => {
            let annotations = |s: &k8s_openapi::api::apps::v1::StatefulSet| {
                s.spec.as_ref().unwrap().template.metadata.as_ref().unwrap().annotations.clone()
            };
            assert!(annotations(u).is_some());
            assert_eq!(annotations(u), annotations(o));
        }
        _ => panic!("update_from changed the kind"),
    }
}

#[test]
pub fn test_with_sub_resource_retags_services() {
    let discovery = desired(SubResource::DiscoveryService);
    let retagged = discovery.clone().with_sub_resource(SubResource::HeadlessService);
    assert_eq!(retagged.sub_resource(), SubResource::HeadlessService);
    assert_eq!(retagged.metadata(), discovery.metadata());

    let sts = desired(SubResource::StatefulSet);
    assert_eq!(sts.clone().with_sub_resource(SubResource::HeadlessService), sts);
}

#[test]
pub fn test_parse_quantity() {
    let q = |s: &str| parse_quantity(&Quantity(s.to_string()));
    assert_eq!(q("10Gi"), Ok(10.0 * 1024.0 * 1024.0 * 1024.0));
    assert_eq!(q("500m"), Ok(0.5));
    assert_eq!(q("1e3"), Ok(1000.0));
    assert_eq!(q("2k"), Ok(2000.0));
    assert_eq!(q("1.5"), Ok(1.5));
    assert_eq!(q("0"), Ok(0.0));
    assert!(q("").is_err());
    assert!(q("Gi").is_err());
    assert!(q("10Xi").is_err());
    assert!(q("1e").is_err());
}

#[test]
pub fn test_quantities_match() {
    let q = |s: &str| Quantity(s.to_string());
    assert!(quantities_match(&q("1"), &q("1000m")));
    assert!(quantities_match(&q("1Gi"), &q("1073741824")));
    assert!(quantities_match(&q("10Gi"), &q("10Gi")));
    assert!(!quantities_match(&q("1Gi"), &q("1G")));
    assert!(!quantities_match(&q("bad"), &q("1")));
}

#[test]
pub fn test_owner_setter() {
    use crate::store::OwnerSetter;
    let owner = make_owner_reference(&make_rabbitmq(make_spec())).unwrap();
    assert_eq!(owner.controller, Some(true));
    assert_eq!(owner.uid, "rabbit-uid");

    let mut metadata = desired(SubResource::StatefulSet).metadata().clone();
    assert!(!owner.is_owner(&metadata));
    owner.set_owner(&mut metadata);
    owner.set_owner(&mut metadata);
    assert!(owner.is_owner(&metadata));
    assert_eq!(metadata.owner_references.as_ref().unwrap().len(), 1);
}

#[test]
pub fn test_owner_reference_requires_uid() {
    let mut rabbitmq = make_rabbitmq(make_spec());
    rabbitmq.metadata.uid = None;
    assert!(make_owner_reference(&rabbitmq).is_err());
}

fn with_claim_size(sts: &mut ChildResource, size: &str) {
    if let ChildResource::StatefulSet(sts) = sts {
        let claim = &mut sts.spec.as_mut().unwrap().volume_claim_templates.as_mut().unwrap()[0];
        claim.spec.as_mut().unwrap().resources.as_mut().unwrap().requests =
            Some(BTreeMap::from([("storage".to_string(), Quantity(size.to_string()))]));
    }
}

#[test]
pub fn test_matches_ignores_claim_templates() {
    let mut desired = desired(SubResource::StatefulSet);
    let observed = as_observed(&desired);
    with_claim_size(&mut desired, "20Gi");
    assert!(desired.matches(&observed));
    assert!(!desired.storage_matches(&observed));
}

#[test]
pub fn test_update_from_keeps_observed_claim_templates() {
    let mut desired = desired(SubResource::StatefulSet);
    let observed = as_observed(&desired);
    with_claim_size(&mut desired, "20Gi");
    if let ChildResource::StatefulSet(sts) = &mut desired {
        sts.spec.as_mut().unwrap().replicas = Some(7);
    }
    match (desired.update_from(&observed), &observed) {
        (ChildResource::StatefulSet(u), ChildResource::StatefulSet(o)) => {
            let (u, o) = (u.spec.unwrap(), o.spec.as_ref().unwrap());
            assert_eq!(u.replicas, Some(7));
            assert_eq!(u.volume_claim_templates, o.volume_claim_templates);
            assert_eq!(u.selector, o.selector);
            assert_eq!(u.service_name, o.service_name);
        }
        _ => panic!("update_from changed the kind"),
    }
}
