// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use kube::CustomResourceExt;
use rabbitmq_controller::config::ControllerConfig;
use rabbitmq_controller::rabbitmqcluster_types::RabbitmqCluster;
use rabbitmq_controller::shim_layer::run_controller;
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or_default();
    if cmd == "export" {
        println!("{}", serde_yaml::to_string(&RabbitmqCluster::crd())?);
    } else if cmd == "run" {
        let config = match args.get(2) {
            Some(path) => ControllerConfig::from_file(path)?,
            None => ControllerConfig::default(),
        };
        info!("running rabbitmq-controller with {:?}", config);
        run_controller(config).await?;
    } else {
        error!("wrong command; please use \"export\" or \"run [config.yaml]\"");
    }
    Ok(())
}
