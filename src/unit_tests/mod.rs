pub mod resource;

use crate::config::ControllerConfig;
use crate::context::ReconcileContext;
use crate::object_ref::ObjectKey;
use crate::rabbitmqcluster_types::{RabbitmqCluster, RabbitmqClusterSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "rabbit";
pub const NAMESPACE: &str = "default";

pub fn make_spec() -> RabbitmqClusterSpec {
    RabbitmqClusterSpec {
        replicas: 3,
        image: "rabbitmq:3.11.10-management".to_string(),
        data_volume_size: Some(Quantity("10Gi".to_string())),
        ..RabbitmqClusterSpec::default()
    }
}

pub fn make_exporter_spec() -> RabbitmqClusterSpec {
    RabbitmqClusterSpec {
        exporter_image: "kbudde/rabbitmq-exporter:v1.0.0-RC19".to_string(),
        exporter_port: 9419,
        ..make_spec()
    }
}

pub fn make_rabbitmq(spec: RabbitmqClusterSpec) -> RabbitmqCluster {
    let mut rabbitmq = RabbitmqCluster::new(NAME, spec);
    rabbitmq.metadata.namespace = Some(NAMESPACE.to_string());
    rabbitmq.metadata.uid = Some("rabbit-uid".to_string());
    rabbitmq
}

pub fn key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, NAME)
}

pub fn make_context() -> ReconcileContext {
    make_context_with(ControllerConfig::default(), CancellationToken::new())
}

pub fn make_context_with(config: ControllerConfig, cancel: CancellationToken) -> ReconcileContext {
    ReconcileContext::new(key(), Arc::new(config), cancel)
}
