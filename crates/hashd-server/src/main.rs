use clap::Parser;
use hashd::JobService;
use hashd_server::server::{
    app,
    config::{CliArgs, ServerConfig},
    telemetry::{init_telemetry, shutdown_telemetry},
};
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config.server_addr, &config);

    let service = JobService::new(config.service.clone());

    axum::serve(listener, app(service.clone()))
        .with_graceful_shutdown(shutdown_signal(service.clone()))
        .await?;

    // The coordinator has terminated; give outstanding digest workers a
    // bounded chance to land before exiting.
    if !service.shutdown_complete().await {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Exiting with {} digest workers still running",
            service.worker().outstanding()
        );
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");

    shutdown_telemetry(providers);
    Ok(())
}

fn log_startup_info(_addr: &str, _config: &ServerConfig) {
    if let Some(_warning) = _config.drain_warning() {
        #[cfg(feature = "tracing")]
        tracing::warn!("{_warning}");
    }

    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting hash service on {} with full config: {:#?}",
            _addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting hash service on {} with a {:?} digest delay",
            _addr,
            _config.service.hash_delay
        );
    }
}

/// Resolves once the service has drained.
///
/// Draining starts either from `POST /shutdown` or from an OS signal. Signals
/// go through the same coordinator, so in-flight requests still finish first.
async fn shutdown_signal(service: JobService) {
    let terminated = service.coordinator().termination_token();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = terminated.cancelled() => {
            #[cfg(feature = "tracing")]
            tracing::info!("Drained after shutdown request");
            return;
        },
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, draining in-flight requests...");

    service.initiate_shutdown();
    terminated.cancelled().await;
}
