use futures::{Future, StreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, AttachedProcess, DynamicObject, Patch, PatchParams, ResourceExt},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
    Client,
};
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::time::sleep;

pub const RABBITMQ_CRD: &str = "rabbitmqclusters.anvil.dev";

const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to get kube client: {0}")]
    ClientGetFailed(#[from] kube_client::Error),

    #[error("Failed to apply yaml file!")]
    ApplyFailed,

    #[error("Failed to parse the yaml file!")]
    ParseYamlFailed(#[from] serde_yaml::Error),

    #[error("Failed to parse the json format!")]
    ParseJsonFailed(#[from] serde_json::Error),

    #[error("Failed to get CRD: {0}")]
    CRDGetFailed(#[source] kube::Error),

    #[error("Timeout while waiting for {0}, e2e test failed!")]
    Timeout(String),

    #[error("Statefulset is not consistent with rabbitmq cluster spec!")]
    RabbitmqStsFailed,

    #[error("ConfigMap is not consistent with rabbitmq cluster spec!")]
    RabbitmqConfigMapFailed,

    #[error("Service is not consistent with rabbitmq cluster spec!")]
    RabbitmqServiceFailed,

    #[error("Exporter is not consistent with rabbitmq cluster spec!")]
    RabbitmqExporterFailed,

    #[error("Rabbitmq failed to set customized user/password!")]
    RabbitmqUserPassFailed,
}

/// Connects to the cluster in the current kubeconfig context and makes sure the
/// RabbitmqCluster CRD is installed.
pub async fn connect() -> Result<(Client, Discovery), Error> {
    let client = Client::try_default().await?;
    let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
    if let Err(e) = crd_api.get(RABBITMQ_CRD).await {
        println!("No CRD found, create one before run the e2e test.");
        return Err(Error::CRDGetFailed(e));
    }
    println!("CRD found, continue to run the e2e test.");
    let discovery = Discovery::new(client.clone()).run().await?;
    Ok((client, discovery))
}

/// Polls `check` until it reports true or `timeout` elapses.
pub async fn wait_for<F, Fut>(what: &str, timeout: Duration, mut check: F) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = Instant::now();
    loop {
        sleep(POLL_INTERVAL).await;
        if start.elapsed() > timeout {
            return Err(Error::Timeout(what.to_string()));
        }
        if check().await? {
            println!("{} done.", what);
            return Ok(());
        }
        println!("Still waiting for {}.", what);
    }
}

/// Server-side applies one YAML document and returns the name of the applied object.
pub async fn apply(yaml: &str, client: Client, discovery: &Discovery) -> Result<String, Error> {
    let obj: DynamicObject = serde_yaml::from_str(yaml)?;
    let gvk = match &obj.types {
        Some(types) => GroupVersionKind::try_from(types).map_err(|_| Error::ApplyFailed)?,
        None => {
            println!("cannot apply object without valid TypeMeta {:?}", obj);
            return Err(Error::ApplyFailed);
        }
    };
    let (ar, caps) = match discovery.resolve_gvk(&gvk) {
        Some(resolved) => resolved,
        None => {
            println!("Cannot apply document for unknown {:?}", gvk);
            return Err(Error::ApplyFailed);
        }
    };
    let name = obj.name_any();
    let api = dynamic_api(ar, caps, client, obj.metadata.namespace.as_deref());
    println!("Applying {}: \n{}", gvk.kind, serde_yaml::to_string(&obj)?);
    let patch = Patch::Apply(serde_json::to_value(&obj)?);
    api.patch(&name, &PatchParams::apply("rabbitmq-e2e").force(), &patch)
        .await?;
    println!("applied {} {}", gvk.kind, name);
    Ok(name)
}

fn dynamic_api(
    ar: ApiResource,
    caps: ApiCapabilities,
    client: Client,
    ns: Option<&str>,
) -> Api<DynamicObject> {
    match (caps.scope, ns) {
        (Scope::Cluster, _) => Api::all_with(client, &ar),
        (_, Some(namespace)) => Api::namespaced_with(client, namespace, &ar),
        (_, None) => Api::default_namespaced_with(client, &ar),
    }
}

async fn read_all(reader: Option<impl AsyncRead + Unpin>) -> String {
    match reader {
        Some(reader) => tokio_util::io::ReaderStream::new(reader)
            .filter_map(|r| async { r.ok().and_then(|v| String::from_utf8(v.to_vec()).ok()) })
            .collect::<Vec<_>>()
            .await
            .join(""),
        None => String::new(),
    }
}

/// Collects stdout and stderr of a command run with `pods.exec`.
pub async fn get_output_and_err(mut attached: AttachedProcess) -> (String, String) {
    let out = read_all(attached.stdout()).await;
    let err = read_all(attached.stderr()).await;
    attached.join().await.unwrap();
    (out, err)
}

/// Runs kubectl and returns its stdout; the e2e test aborts if kubectl cannot start.
pub fn kubectl(args: &[&str]) -> String {
    println!("kubectl {}", args.join(" "));
    let output = Command::new("kubectl")
        .args(args)
        .output()
        .expect("failed to run kubectl");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    println!("cmd output: {}", stdout);
    println!("cmd error: {}", String::from_utf8_lossy(&output.stderr));
    stdout
}
