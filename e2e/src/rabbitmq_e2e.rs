use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::{
    api::{Api, AttachParams, ListParams},
    Client,
};
use std::time::Duration;

use crate::common::*;

pub fn rabbitmq_cluster() -> String {
    "
    apiVersion: anvil.dev/v1
    kind: RabbitmqCluster
    metadata:
      name: rabbitmq
      namespace: default
    spec:
      replicas: 3
      image: rabbitmq:3.11.10-management
      data_volume_size: 2Gi
      defaultUsername: new_user
      defaultPassword: new_pass
    "
    .to_string()
}

pub fn rabbitmq_cluster_ephemeral() -> String {
    "
    apiVersion: anvil.dev/v1
    kind: RabbitmqCluster
    metadata:
      name: rabbitmq
      namespace: default
    spec:
      replicas: 3
      image: rabbitmq:3.11.10-management
      defaultUsername: new_user
      defaultPassword: new_pass
    "
    .to_string()
}

pub fn rabbitmq_cluster_exporter() -> String {
    "
    apiVersion: anvil.dev/v1
    kind: RabbitmqCluster
    metadata:
      name: rabbitmq
      namespace: default
    spec:
      replicas: 1
      image: rabbitmq:3.11.10-management
      exporter_image: kbudde/rabbitmq-exporter:v1.0.0-RC19
      exporter_port: 9419
    "
    .to_string()
}

fn patch_replicas(kind: &str, name: &str, replicas: i32) {
    let patch = format!(
        "[{{\"op\": \"replace\", \"path\": \"/spec/replicas\", \"value\": {}}}]",
        replicas
    );
    kubectl(&["patch", kind, name, "--type=json", "-p", patch.as_str()]);
}

/// Waits until the stateful set asks for `replicas` pods and all of them are ready.
async fn wait_for_ready_replicas(client: Client, rabbitmq_name: &str, replicas: i32) -> Result<(), Error> {
    let sts_api: Api<StatefulSet> = Api::default_namespaced(client);
    let sts_name = format!("{}-server", rabbitmq_name);
    wait_for(
        &format!("{} ready replicas of {}", replicas, sts_name),
        Duration::from_secs(900),
        || {
            let (sts_api, sts_name) = (sts_api.clone(), sts_name.clone());
            async move {
                let sts = match sts_api.get_opt(&sts_name).await? {
                    Some(sts) => sts,
                    None => return Ok(false),
                };
                let ready = sts.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
                println!("{} of {} pods are ready now.", ready, replicas);
                Ok::<bool, Error>(sts.spec.and_then(|s| s.replicas) == Some(replicas) && ready == replicas)
            }
        },
    )
    .await
}

pub async fn desired_state_test(client: Client, rabbitmq_name: &str, persistent: bool) -> Result<(), Error> {
    let cm_api: Api<ConfigMap> = Api::default_namespaced(client.clone());
    let svc_api: Api<Service> = Api::default_namespaced(client.clone());
    let sts_api: Api<StatefulSet> = Api::default_namespaced(client.clone());
    wait_for_ready_replicas(client, rabbitmq_name, 3).await?;

    let cm = cm_api.get(&format!("{}-config", rabbitmq_name)).await?;
    let plugins = cm.data.unwrap_or_default().remove("enabled_plugins").unwrap_or_default();
    if !plugins.contains("rabbitmq_peer_discovery_k8s") {
        println!("Config map does not enable peer discovery: {}.", plugins);
        return Err(Error::RabbitmqConfigMapFailed);
    }

    let headless = svc_api.get(&format!("{}-nodes", rabbitmq_name)).await?;
    if headless.spec.and_then(|s| s.cluster_ip).as_deref() != Some("None") {
        println!("Headless service is not headless.");
        return Err(Error::RabbitmqServiceFailed);
    }
    svc_api.get(rabbitmq_name).await?;

    let sts = sts_api.get(&format!("{}-server", rabbitmq_name)).await?;
    let claims = sts
        .spec
        .and_then(|s| s.volume_claim_templates)
        .map_or(0, |t| t.len());
    if persistent != (claims == 1) {
        println!("Stateful set has {} volume claim templates.", claims);
        return Err(Error::RabbitmqStsFailed);
    }
    println!("Desired state test passed.");
    Ok(())
}

pub async fn status_test(rabbitmq_name: &str) -> Result<(), Error> {
    let rabbitmq_name = rabbitmq_name.to_string();
    wait_for("converged status", Duration::from_secs(360), || {
        let rabbitmq_name = rabbitmq_name.clone();
        async move {
            Ok(kubectl(&["get", "rbmq", &rabbitmq_name, "-o", "yaml"]).contains("reason: Converged"))
        }
    })
    .await?;
    println!("Status test passed.");
    Ok(())
}

pub async fn user_pass_test(client: Client, rabbitmq_name: &str) -> Result<(), Error> {
    let pods: Api<Pod> = Api::default_namespaced(client);
    let lp = ListParams::default().labels(&format!("app={}", rabbitmq_name));
    for p in pods.list(&lp).await? {
        let attached = pods
            .exec(
                &p.metadata.name.unwrap_or_default(),
                vec!["rabbitmqctl", "authenticate_user", "new_user", "new_pass"],
                &AttachParams::default().stderr(true),
            )
            .await?;
        let (_, err) = get_output_and_err(attached).await;
        if !err.is_empty() {
            println!("User and password test failed with {}.", err);
            return Err(Error::RabbitmqUserPassFailed);
        }
    }
    println!("User and password test passed.");
    Ok(())
}

pub async fn scaling_test(client: Client, rabbitmq_name: &str) -> Result<(), Error> {
    patch_replicas("rbmq", rabbitmq_name, 5);
    wait_for_ready_replicas(client, rabbitmq_name, 5).await?;
    println!("Scaling test passed.");
    Ok(())
}

/// Changes the stateful set behind the controller's back and waits for it to be restored.
pub async fn drift_test(client: Client, rabbitmq_name: &str) -> Result<(), Error> {
    let sts_name = format!("{}-server", rabbitmq_name);
    let sts_api: Api<StatefulSet> = Api::default_namespaced(client);
    patch_replicas("sts", &sts_name, 1);
    wait_for("stateful set to be restored", Duration::from_secs(360), || {
        let (sts_api, sts_name) = (sts_api.clone(), sts_name.clone());
        async move { Ok::<bool, Error>(sts_api.get(&sts_name).await?.spec.and_then(|s| s.replicas) == Some(3)) }
    })
    .await?;
    println!("Drift test passed.");
    Ok(())
}

pub async fn exporter_test(client: Client, rabbitmq_name: &str) -> Result<(), Error> {
    let exporter_name = format!("{}-exporter", rabbitmq_name);
    let svc_api: Api<Service> = Api::default_namespaced(client.clone());
    let deploy_api: Api<Deployment> = Api::default_namespaced(client);
    wait_for("exporter", Duration::from_secs(600), || {
        let (svc_api, deploy_api, exporter_name) =
            (svc_api.clone(), deploy_api.clone(), exporter_name.clone());
        async move {
            let svc = match svc_api.get_opt(&exporter_name).await? {
                Some(svc) => svc,
                None => return Ok(false),
            };
            let ports = svc.spec.and_then(|s| s.ports).unwrap_or_default();
            if ports.first().map(|p| p.port) != Some(9419) {
                println!("Exporter service exposes {:?}.", ports);
                return Err(Error::RabbitmqExporterFailed);
            }
            let ready = deploy_api
                .get_opt(&exporter_name)
                .await?
                .and_then(|d| d.status)
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0);
            Ok::<bool, Error>(ready == 1)
        }
    })
    .await?;
    println!("Exporter test passed.");
    Ok(())
}

pub async fn rabbitmq_e2e_test() -> Result<(), Error> {
    let (client, discovery) = connect().await?;
    let rabbitmq_name = apply(&rabbitmq_cluster(), client.clone(), &discovery).await?;

    desired_state_test(client.clone(), &rabbitmq_name, true).await?;
    status_test(&rabbitmq_name).await?;
    user_pass_test(client.clone(), &rabbitmq_name).await?;
    drift_test(client, &rabbitmq_name).await?;

    println!("E2e test passed.");
    Ok(())
}

pub async fn rabbitmq_scaling_e2e_test() -> Result<(), Error> {
    let (client, discovery) = connect().await?;
    let rabbitmq_name = apply(&rabbitmq_cluster(), client.clone(), &discovery).await?;

    desired_state_test(client.clone(), &rabbitmq_name, true).await?;
    scaling_test(client.clone(), &rabbitmq_name).await?;
    user_pass_test(client, &rabbitmq_name).await?;

    println!("E2e test passed.");
    Ok(())
}

pub async fn rabbitmq_ephemeral_e2e_test() -> Result<(), Error> {
    let (client, discovery) = connect().await?;
    let rabbitmq_name = apply(&rabbitmq_cluster_ephemeral(), client.clone(), &discovery).await?;

    desired_state_test(client.clone(), &rabbitmq_name, false).await?;
    scaling_test(client.clone(), &rabbitmq_name).await?;
    user_pass_test(client, &rabbitmq_name).await?;

    println!("E2e test passed.");
    Ok(())
}

pub async fn rabbitmq_exporter_e2e_test() -> Result<(), Error> {
    let (client, discovery) = connect().await?;
    let rabbitmq_name = apply(&rabbitmq_cluster_exporter(), client.clone(), &discovery).await?;

    wait_for_ready_replicas(client.clone(), &rabbitmq_name, 1).await?;
    exporter_test(client, &rabbitmq_name).await?;
    status_test(&rabbitmq_name).await?;

    println!("E2e test passed.");
    Ok(())
}
