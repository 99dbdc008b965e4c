// # ddnsd - DDNS Update Server Daemon
//
// A thin integration layer over `ddns-core`:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering DNS backends and building the collaborators
// 4. Serving the DynDNS2 endpoint and the management API until a shutdown
//    signal arrives, then flushing the record store
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Server
// - `DDNS_LISTEN_ADDR`: Listen address (default 0.0.0.0:8080)
// - `DDNS_TRUST_FORWARDED_FOR`: Use the first `X-Forwarded-For` hop as the
//   client address (default false). Enable only behind a proxy that sets the
//   header; otherwise clients choose their own address and slip past the
//   lockout
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ### DNS Provider
// - `DDNS_PROVIDER_TYPE`: Provider type (cloudflare)
// - `DDNS_PROVIDER_API_TOKEN`: API token
// - `DDNS_PROVIDER_ACCOUNT_ID`: Account ID narrowing zone listings (optional)
// - `DDNS_MODE`: `dry-run` to log DNS mutations instead of performing them
// - `DDNS_BACKEND_TIMEOUT_SECS`: Deadline for one provider call
//
// ### Record Store
// - `DDNS_STORE_TYPE`: Type of record store (file, memory)
// - `DDNS_STORE_PATH`: Path to store file (for file store)
//
// ### Limits
// - `DDNS_RATE_LIMIT_PER_HOUR`: Update requests per hostname per hour
// - `DDNS_LOCKOUT_SCOPE`: source_address, hostname or hostname_and_source
//
// ### Operator
// - `DDNS_ADMIN_USERNAME`, `DDNS_ADMIN_PASSWORD`: management login
//
// ## Example
//
// ```bash
// export DDNS_PROVIDER_API_TOKEN=your_token
// export DDNS_STORE_TYPE=file
// export DDNS_STORE_PATH=/var/lib/ddns/records.json
// export DDNS_ADMIN_USERNAME=admin
// export DDNS_ADMIN_PASSWORD='a long passphrase'
//
// ddnsd
// ```

mod config;
mod http;

use anyhow::{Context, Result};
use config::Config;
use ddns_core::config::StoreConfig;
use ddns_core::{
    AbuseLimiter, Clock, CredentialHasher, DnsBackend, FileRecordStore, MemoryLimiter,
    MemoryRecordStore, ProviderRegistry, RecordManager, RecordStore, SessionManager,
    SystemClock, UpdatePipeline, ZoneCache,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long in-flight requests may take to drain after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let log_level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup failed: {:#}", e);
                DdnsExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                DdnsExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Where the daemon failed, for the exit code
enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

/// Build every collaborator and the router state
async fn build_state(config: &Config) -> Result<(http::AppState, Arc<dyn RecordStore>)> {
    let server_config = config.server_config()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registry = ProviderRegistry::new();
    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare backend");
        ddns_provider_cloudflare::register(&registry);
    }
    info!("Available DNS backends: {}", registry.list_backends().join(", "));

    let backend: Arc<dyn DnsBackend> = Arc::from(
        registry
            .create_backend(&server_config.provider)
            .context("Failed to create DNS backend")?,
    );
    info!(
        "DNS backend: {} (timeout {:?})",
        backend.provider_name(),
        server_config.backend_timeout()
    );

    let store: Arc<dyn RecordStore> = match &server_config.store {
        StoreConfig::Memory => {
            warn!("Using in-memory record store; records are lost on restart");
            Arc::new(MemoryRecordStore::with_clock(clock.clone()))
        }
        StoreConfig::File { path } => {
            info!("Record store: {}", path);
            Arc::new(
                FileRecordStore::with_clock(path, clock.clone())
                    .await
                    .context("Failed to open record store")?,
            )
        }
    };

    let limiter: Arc<dyn AbuseLimiter> =
        Arc::new(MemoryLimiter::new(&server_config.limits, clock.clone()));
    let hasher = CredentialHasher::new();
    let zones = Arc::new(ZoneCache::new(
        Duration::from_secs(server_config.zone_cache_ttl_secs),
        clock.clone(),
    ));

    let pipeline = UpdatePipeline::new(
        store.clone(),
        backend.clone(),
        limiter.clone(),
        hasher.clone(),
        clock.clone(),
        &server_config,
    );
    let records = RecordManager::new(
        store.clone(),
        backend,
        zones,
        hasher.clone(),
        clock.clone(),
        &server_config,
    );
    let sessions = SessionManager::new(
        config.admin_username.clone(),
        &config.admin_password,
        hasher,
        limiter,
        clock,
    )
    .await
    .context("Failed to initialize operator login")?;

    let state = http::AppState {
        pipeline: Arc::new(pipeline),
        records: Arc::new(records),
        sessions: Arc::new(sessions),
        trust_forwarded_for: config.trust_forwarded_for,
    };

    Ok((state, store))
}

/// Run the daemon
async fn run_daemon(config: Config) -> std::result::Result<(), DaemonError> {
    let (state, store) = build_state(&config).await.map_err(DaemonError::Startup)?;

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))
        .map_err(DaemonError::Startup)?;
    info!("Listening on {}", config.listen_addr);
    if config.trust_forwarded_for {
        warn!("Trusting X-Forwarded-For; the daemon must only be reachable through a proxy");
    } else {
        info!("Ignoring X-Forwarded-For; client addresses come from the peer");
    }

    let shutdown = Arc::new(Notify::new());
    let app = http::router(state);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    })
    .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            // The server only returns on its own if accepting failed
            result.context("Server error").map_err(DaemonError::Runtime)?;
            warn!("Server stopped without a shutdown signal");
        }
        signal = wait_for_shutdown() => {
            let signal = signal.map_err(DaemonError::Runtime)?;
            info!("Received shutdown signal: {}", signal);
            shutdown.notify_one();

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server).await {
                Ok(result) => result.context("Server error").map_err(DaemonError::Runtime)?,
                Err(_) => warn!(
                    "Connections still open after {:?}; closing them",
                    SHUTDOWN_TIMEOUT
                ),
            }
        }
    }

    store
        .flush()
        .await
        .context("Failed to flush record store")
        .map_err(DaemonError::Runtime)?;

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
