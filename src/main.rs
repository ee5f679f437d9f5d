#[macro_use]
extern crate tracing;

use std::{io::IsTerminal, process::exit};

use chaos_verify::{
    cluster::{client::KubeClusterReader, kubectl::KubectlProvisioner},
    config::Config,
    manifest::FileParameterizer,
    trace, Orchestrator, Outcome,
};
use k8s_test_framework::Interface;

#[tokio::main]
async fn main() {
    let levels = std::env::var(trace::LOG_ENV).unwrap_or_else(|_| trace::DEFAULT_LEVELS.to_owned());
    let json = trace::is_json(std::env::var(trace::LOG_FORMAT_ENV).ok().as_deref());
    trace::init(std::io::stderr().is_terminal(), json, &levels);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(message = "Configuration error.", %error);
            exit(exitcode::CONFIG);
        }
    };

    info!(
        message = "Starting chaos experiment.",
        version = chaos_verify::get_version(),
        experiment = %config.experiment_name,
        engine = %config.engine_name,
        namespace = %config.namespace,
    );

    let reader = match KubeClusterReader::connect(config.kubeconfig.as_deref()).await {
        Ok(reader) => reader,
        Err(error) => {
            error!(message = "Unable to connect to the cluster.", %error);
            exit(exitcode::CONFIG);
        }
    };
    let provisioner = KubectlProvisioner::new(Interface::new(config.kubectl.clone()));

    let orchestrator = Orchestrator::new(config, provisioner, FileParameterizer, reader);
    let code = match orchestrator.run().await {
        Ok(report) => {
            info!(
                message = "Run finished.",
                outcome = %report.outcome,
                result = %report.result.name,
                job_pods = report.jobs.len(),
            );
            exit_code(report.outcome)
        }
        Err(error) => {
            error!(
                message = "Run aborted.",
                phase = %error.phase(),
                error_code = error.code(),
                %error,
            );
            exitcode::SOFTWARE
        }
    };
    exit(code);
}

const fn exit_code(outcome: Outcome) -> exitcode::ExitCode {
    match outcome {
        Outcome::Pass => exitcode::OK,
        Outcome::Fail => 1,
        Outcome::Indeterminate => 2,
    }
}
