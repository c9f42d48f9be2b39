use std::process::ExitCode;

use dogstatsd_emitter::{EmitterBuilder, MetricSample};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ENV_TAG: &str = "DD_ENV";
const DEFAULT_ENV: &str = "sandbox";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .init();
}

fn sample_metrics(env: &str) -> Vec<MetricSample> {
    vec![
        MetricSample::counter("sandbox.emitter.heartbeat", 1, [("env", env)]),
        MetricSample::counter("sandbox.emitter.requests", 1, [("env", env), ("endpoint", "/health")]),
        MetricSample::counter("sandbox.emitter.items", 7, [("env", env)]),
    ]
}

fn main() -> ExitCode {
    init_logging();

    let builder = match EmitterBuilder::from_env() {
        Ok(builder) => builder,
        Err(e) => {
            error!(error = %e, "Invalid configuration.");
            return ExitCode::FAILURE;
        }
    };

    let env = std::env::var(ENV_TAG).ok().filter(|e| !e.is_empty());
    let env = env.as_deref().unwrap_or(DEFAULT_ENV);
    let service = builder.service().to_owned();

    let driver = match builder.build_driver(sample_metrics(env)) {
        Ok(driver) => driver,
        Err(e) => {
            error!(service = %service, error = %e, "Invalid configuration.");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = %service,
        env,
        interval = ?driver.interval(),
        samples = driver.samples().len(),
        "Starting emission loop."
    );

    driver.run()
}
