use clap::Parser;
use keygate_core::config;
use keygate_core::{StaticCredentials, StoreConfig, TokenBucketStore};
use keygate_server::api::create_router;
use keygate_server::api::gate::AdmissionGate;
use keygate_server::api::handlers::AppState;
use keygate_server::api::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keygate", about = "Per-key token bucket admission gateway")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Maximum tokens per key (burst size)
    #[arg(short, long, default_value_t = config::DEFAULT_CAPACITY)]
    capacity: u32,

    /// Seconds for an empty bucket to refill completely
    #[arg(short, long, default_value_t = config::DEFAULT_WINDOW_SECS)]
    window_secs: u64,

    /// Idle-bucket sweep interval in seconds (0 = disabled)
    #[arg(long, default_value_t = config::DEFAULT_SWEEP_INTERVAL_SECS)]
    sweep_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(
                    "keygate_server=info"
                        .parse()
                        .expect("valid directive literal"),
                )
                .add_directive(
                    "keygate_core=info"
                        .parse()
                        .expect("valid directive literal"),
                ),
        )
        .init();

    let args = Args::parse();

    if args.port == 0 {
        eprintln!("Error: port must be > 0");
        std::process::exit(1);
    }
    let store_config = StoreConfig::new(args.capacity, args.window_secs).unwrap_or_else(|e| {
        eprintln!("Error: invalid rate limit configuration: {}", e);
        std::process::exit(1);
    });

    let credentials = load_credentials();
    if credentials.is_empty() {
        tracing::warn!(
            "{} is not set, every gated request will be rejected with 401",
            config::API_KEYS_ENV
        );
    } else {
        tracing::info!("Loaded {} API keys", credentials.len());
    }

    let store = Arc::new(TokenBucketStore::new(store_config));
    let gate = AdmissionGate::new(store.clone(), Arc::new(credentials));

    let prometheus_handle =
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let state = AppState {
        gate,
        prometheus_handle,
        start_time: Instant::now(),
    };
    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", args.port);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = args.port,
        capacity = store_config.capacity(),
        window_secs = args.window_secs,
        refill_per_sec = store_config.refill_rate(),
        sweep_interval_secs = args.sweep_interval,
        "keygate ready"
    );

    // Spawn idle-bucket sweep background task
    if args.sweep_interval > 0 {
        let sweep_store = store.clone();
        let sweep_interval = args.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = sweep_store.sweep();
                if evicted > 0 {
                    tracing::info!(
                        "Swept {} idle buckets, {} remaining",
                        evicted,
                        sweep_store.len()
                    );
                    metrics::record_evictions(evicted);
                }
                metrics::update_bucket_metrics(&sweep_store);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    tracing::info!("Server stopped, {} buckets discarded", store.len());
    Ok(())
}

/// Reads the valid key list from `KEYGATE_API_KEYS` (a JSON array of strings).
fn load_credentials() -> StaticCredentials {
    match std::env::var(config::API_KEYS_ENV) {
        Ok(json_str) => match serde_json::from_str::<Vec<String>>(&json_str) {
            Ok(keys) => StaticCredentials::new(keys),
            Err(e) => {
                eprintln!(
                    "Error: {} contains invalid JSON: {}",
                    config::API_KEYS_ENV,
                    e
                );
                std::process::exit(1);
            }
        },
        Err(_) => StaticCredentials::default(),
    }
}

/// Resolves on SIGINT or SIGTERM. A handler that cannot be installed never
/// resolves, so it cannot trigger a shutdown by itself.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = recv_or_park(tokio::signal::unix::signal(
        tokio::signal::unix::SignalKind::terminate(),
    ));

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down gracefully, draining in-flight requests...");
}

#[cfg(unix)]
async fn recv_or_park(signal: std::io::Result<tokio::signal::unix::Signal>) {
    match signal {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_signal_install_never_resolves() {
        let failed = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "signal driver unavailable",
        ));
        let outcome = tokio::time::timeout(Duration::from_millis(50), recv_or_park(failed)).await;
        assert!(outcome.is_err(), "shutdown future resolved on install failure");
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["keygate"]);
        assert_eq!(args.port, config::DEFAULT_PORT);
        assert_eq!(args.capacity, config::DEFAULT_CAPACITY);
        assert_eq!(args.window_secs, config::DEFAULT_WINDOW_SECS);
        assert_eq!(args.sweep_interval, config::DEFAULT_SWEEP_INTERVAL_SECS);
    }
}
