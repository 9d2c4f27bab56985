mod config;

use common::nats::{NatsClient, StreamSpec};
use common::telemetry::{
    init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig, TelemetryProviders,
};
use config::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use translate_runner::Runner;
use translate_worker::{TranslateWorker, TranslateWorkerConfig};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let log_format = match config.log_format.parse::<LogFormat>() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("Invalid log format: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
        log_format,
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {:#}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting translate-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    // Model parameters are validated here, once, before anything connects
    let settings = match config.translation_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid translation settings: {}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let redelivery = match config.redelivery_policy() {
        Ok(policy) => policy,
        Err(e) => {
            error!("Invalid redelivery settings: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let nats_client = match initialize_nats(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let translate_worker = match TranslateWorker::new(
        &nats_client,
        settings,
        TranslateWorkerConfig {
            documents_stream: config.documents_stream.clone(),
            documents_subject: config.documents_subject.clone(),
            consumer_name: config.consumer_name.clone(),
            nats_batch_size: config.nats_batch_size,
            nats_batch_wait_secs: config.nats_batch_wait_secs,
            redelivery,
            batch_concurrency: config.batch_concurrency,
            sync_translation_subject: config.sync_translation_subject.clone(),
            sync_translation_timeout_secs: config.sync_translation_timeout_secs,
            translation_jobs_stream: config.translation_jobs_stream.clone(),
            translated_documents_stream: config.translated_documents_stream.clone(),
            service_name: config.otel_service_name.clone(),
        },
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize translate worker: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new();
    for (name, process) in translate_worker.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer({
            let nats_for_close = Arc::clone(&nats_client);
            move || async move {
                info!("Running cleanup tasks...");
                if let Ok(client) = Arc::try_unwrap(nats_for_close) {
                    client.close().await;
                }
                // Flush pending traces and logs
                shutdown_telemetry(telemetry_providers);
                info!("Cleanup complete");
                Ok(())
            }
        })
        .with_closer_timeout(Duration::from_secs(10));

    drop(nats_client);
    runner.run().await;
}

async fn initialize_nats(config: &ServiceConfig) -> anyhow::Result<Arc<NatsClient>> {
    info!("Initializing NATS...");
    let nats_client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;

    let duplicate_window = Duration::from_secs(config.duplicate_window_secs);
    let streams = [
        StreamSpec::new(&config.documents_stream, "Inbound document events"),
        StreamSpec::new(&config.translation_jobs_stream, "Submitted translation jobs")
            .with_duplicate_window(duplicate_window),
        StreamSpec::new(
            &config.translated_documents_stream,
            "Events for translated documents",
        )
        .with_duplicate_window(duplicate_window),
    ];
    for stream in &streams {
        nats_client.ensure_stream(stream).await?;
    }

    Ok(Arc::new(nats_client))
}
