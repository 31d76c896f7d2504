use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use geo_dispatch::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{
        lifecycle::{shutdown_signal, DrainSettings, Lifecycle},
        pipeline::Pipeline,
        reporter::ObservabilityReporter,
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing geo-dispatch server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    metrics::describe_counter!("dispatch_jobs_enqueued_total", "Jobs committed to a queue");
    metrics::describe_counter!("dispatch_jobs_completed_total", "Jobs whose handler succeeded");
    metrics::describe_counter!("dispatch_jobs_failed_total", "Jobs whose handler failed or panicked");
    metrics::describe_counter!("dispatch_unroutable_total", "Jobs dropped for an unknown location");
    metrics::describe_counter!("ingress_rejected_total", "Requests refused at ingress");
    metrics::describe_gauge!("dispatch_queue_depth", "Pending plus in-flight jobs per queue");

    // Open queues and start their workers
    tracing::info!(backend = %config.queue_backend, "Opening queues");
    let pipeline = Pipeline::start(&config)
        .await
        .expect("Failed to start dispatch pipeline");

    let lifecycle = Lifecycle::new();
    let state = AppState::new(&pipeline, lifecycle.clone());

    // Periodic size snapshots and trace replay
    let (reporter_stop, reporter_rx) = watch::channel(false);
    let reporter = Arc::new(ObservabilityReporter::new(
        pipeline.queues(),
        pipeline.trace.clone(),
        Duration::from_secs(config.report_interval_secs.max(1)),
    ));
    let reporter_task = {
        let reporter = Arc::clone(&reporter);
        tokio::spawn(async move { reporter.run(reporter_rx).await })
    };

    let app = routes::router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    tracing::info!("Starting geo-dispatch on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    // The listener stays up while draining so late requests get a 503.
    let server = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { lifecycle.stopped().await })
                .await
        })
    };

    shutdown_signal().await;

    let outcome = lifecycle
        .shutdown(
            &pipeline.queues(),
            DrainSettings {
                timeout: Duration::from_secs(config.drain_timeout_secs),
                stall: Duration::from_secs(config.drain_stall_secs),
            },
        )
        .await;

    // One last report so the final sizes and trace are in the log.
    reporter.emit();
    reporter_stop.send_replace(true);
    let _ = reporter_task.await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Server error"),
        Err(e) => tracing::error!(error = %e, "Server task failed"),
    }

    match outcome {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Exiting after failed drain");
            ExitCode::FAILURE
        }
    }
}
