//! Projector entry point.

use std::time::Duration;

use common::PrivilegedKeys;
use projection::{EventPipeline, PostgresProjectionStore};
use subscriber::{Config, TcpEventFeed, run_with_reconnect};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let _metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect to the database and bootstrap the schema
    let store = PostgresProjectionStore::connect(&config.database_url, 8, Duration::from_millis(500))
        .await
        .expect("failed to connect to database");
    store
        .create_tables()
        .await
        .expect("failed to create projection tables");

    // 4. Load the ministry key list, if configured. The reporting layer that
    // consumes it reads the same file; loading here fails fast on a bad file
    // and holds the parsed list for the life of the process.
    let _ministries = config.ministry_keys_file.as_ref().map(|path| {
        let keys = PrivilegedKeys::from_file(path).expect("failed to load ministry keys");
        tracing::info!(keys = keys.len(), path, "loaded ministry key list");
        keys
    });

    // 5. Run the subscriber until a signal arrives, reconnecting to the feed
    // as needed; each (re)connect replays from the last known blocks.
    let (stop, shutdown) = watch::channel(false);
    let pipeline = EventPipeline::new(store);
    let addr = config.validator_addr.clone();
    tracing::info!(addr = %addr, "starting event feed subscriber");
    let mut run = tokio::spawn(async move {
        run_with_reconnect(
            &pipeline,
            move || TcpEventFeed::new(addr.clone()),
            Duration::from_secs(1),
            shutdown,
        )
        .await
    });

    tokio::select! {
        () = shutdown_signal() => {
            let _ = stop.send(true);
            run.await
                .expect("subscriber task panicked")
                .expect("subscriber failed");
        }
        result = &mut run => {
            result
                .expect("subscriber task panicked")
                .expect("subscriber failed");
        }
    }

    tracing::info!("projector shut down gracefully");
}
