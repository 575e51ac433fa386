pub mod common;
pub mod rabbitmq_e2e;

use common::Error;
use rabbitmq_e2e::{
    rabbitmq_e2e_test, rabbitmq_ephemeral_e2e_test, rabbitmq_exporter_e2e_test,
    rabbitmq_scaling_e2e_test,
};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).cloned().unwrap_or_default();
    match cmd.as_str() {
        "rabbitmq" => {
            println!("Running rabbitmq end-to-end test");
            rabbitmq_e2e_test().await
        }
        "rabbitmq-scaling" => {
            println!("Running rabbitmq end-to-end test for scaling");
            rabbitmq_scaling_e2e_test().await
        }
        "rabbitmq-ephemeral" => {
            println!("Running rabbitmq end-to-end test for ephemeral storage");
            rabbitmq_ephemeral_e2e_test().await
        }
        "rabbitmq-exporter" => {
            println!("Running rabbitmq end-to-end test for the metrics exporter");
            rabbitmq_exporter_e2e_test().await
        }
        _ => {
            println!("Please specify one test: rabbitmq, rabbitmq-scaling, rabbitmq-ephemeral or rabbitmq-exporter");
            Ok(())
        }
    }
}
