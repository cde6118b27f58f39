// # knockerd - Knocker Daemon
//
// Thin integration layer over knocker-core. No knock, lease or cadence
// logic lives here.
//
// The knockerd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the HTTP adapters and the event sink
// 4. Running the orchestrator until SIGTERM/SIGINT (or knocking once)
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `KNOCKER_API_URL`: Base URL of the whitelist API (required)
// - `KNOCKER_API_KEY`: API key (required)
// - `KNOCKER_TTL`: Requested whitelist TTL in seconds (default: server decides)
// - `KNOCKER_IP_CHECK_URL`: "What is my IP" URL; enables change detection
// - `KNOCKER_CHECK_INTERVAL`: IP check interval in minutes (default 5)
// - `KNOCKER_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `KNOCKER_MODE`: `service` (default) or `knock` for a single manual knock
//
// ## Example
//
// ```bash
// export KNOCKER_API_URL=https://knock.example.com
// export KNOCKER_API_KEY=your_key
// export KNOCKER_TTL=3600
//
// knockerd
// ```

use anyhow::Result;
use knocker_api_http::HttpApiClient;
use knocker_core::cadence::restart_delay;
use knocker_core::traits::EventSink;
use knocker_core::{
    EventEmitter, KnockOrchestrator, KnockerConfig, ServiceSupervisor, TracingEventSink,
    manual_knock,
};
use knocker_ip_http::HttpIpResolver;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KnockerExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<KnockerExitCode> for ExitCode {
    fn from(code: KnockerExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// What the daemon should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonMode {
    /// Run the orchestrator until signalled
    Service,
    /// Knock once and exit
    Knock,
}

/// Application configuration
#[derive(Debug)]
struct Config {
    knocker: KnockerConfig,
    mode: DaemonMode,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let Some(api_url) = non_empty("KNOCKER_API_URL") else {
            anyhow::bail!(
                "KNOCKER_API_URL is required. \
                Set it via: export KNOCKER_API_URL=https://knock.example.com"
            );
        };
        let Some(api_key) = non_empty("KNOCKER_API_KEY") else {
            anyhow::bail!("KNOCKER_API_KEY is required");
        };

        let mut knocker = KnockerConfig::new(api_url, api_key)
            .with_version(env!("CARGO_PKG_VERSION"));

        if let Some(ttl) = non_empty("KNOCKER_TTL") {
            let ttl: i64 = ttl.parse().map_err(|_| {
                anyhow::anyhow!("KNOCKER_TTL must be a number of seconds. Got: {}", ttl)
            })?;
            knocker = knocker.with_ttl_seconds(ttl);
        }

        if let Some(url) = non_empty("KNOCKER_IP_CHECK_URL") {
            knocker = knocker.with_ip_check_url(url);
        }

        if let Some(minutes) = non_empty("KNOCKER_CHECK_INTERVAL") {
            let minutes: i64 = minutes.parse().map_err(|_| {
                anyhow::anyhow!(
                    "KNOCKER_CHECK_INTERVAL must be a number of minutes. Got: {}",
                    minutes
                )
            })?;
            knocker = knocker.with_check_interval_minutes(minutes);
        }

        let mode = match non_empty("KNOCKER_MODE").as_deref() {
            None | Some("service") => DaemonMode::Service,
            Some("knock") => DaemonMode::Knock,
            Some(other) => anyhow::bail!(
                "KNOCKER_MODE '{}' is not valid. Valid modes: service, knock",
                other
            ),
        };

        Ok(Self {
            knocker,
            mode,
            log_level: non_empty("KNOCKER_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.knocker.validate()?;

        if let Some(url) = &self.knocker.ip_check_url {
            if url.starts_with("http://") {
                eprintln!(
                    "WARNING: KNOCKER_IP_CHECK_URL uses HTTP (not HTTPS). \
                          Lookups can be tampered with in transit."
                );
            }
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "KNOCKER_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return KnockerExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return KnockerExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return KnockerExitCode::ConfigError.into();
    }

    info!("Starting knockerd {}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return KnockerExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match config.mode {
            DaemonMode::Service => run_service(config.knocker).await,
            DaemonMode::Knock => run_knock(config.knocker).await,
        }
    });

    code.into()
}

/// Run the orchestrator until a shutdown signal arrives
async fn run_service(config: KnockerConfig) -> KnockerExitCode {
    info!(
        "Recommended restart delay for the service manager: {:?}",
        restart_delay(config.ttl_seconds)
    );

    let orchestrator = match build_orchestrator(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Startup error: {}", e);
            return KnockerExitCode::ConfigError;
        }
    };

    let signals = match ShutdownSignals::install() {
        Ok(signals) => signals,
        Err(e) => {
            error!("Failed to install signal handlers: {}", e);
            return KnockerExitCode::RuntimeError;
        }
    };

    let cancel = CancellationToken::new();
    let supervisor = ServiceSupervisor::start_with_token(orchestrator, cancel.clone());

    let listener = tokio::spawn(async move {
        let name = signals.recv().await;
        info!("Received shutdown signal: {}", name);
        cancel.cancel();
    });

    let result = supervisor.wait().await;
    listener.abort();

    match result {
        Ok(()) => {
            info!("Shutdown complete");
            KnockerExitCode::CleanShutdown
        }
        Err(e) if e.is_fatal() => {
            error!("Startup error: {}", e);
            KnockerExitCode::ConfigError
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            KnockerExitCode::RuntimeError
        }
    }
}

fn build_orchestrator(config: KnockerConfig) -> knocker_core::Result<KnockOrchestrator> {
    let timeout = config.request_timeout();
    let client = HttpApiClient::with_timeout(&config.api_url, &config.api_key, timeout)?;
    let resolver = HttpIpResolver::with_timeout(timeout)?;

    KnockOrchestrator::new(
        config,
        Box::new(client),
        Box::new(resolver),
        EventEmitter::new(event_sink()),
    )
}

/// Knock once, outside any running service
async fn run_knock(config: KnockerConfig) -> KnockerExitCode {
    let client = match HttpApiClient::with_timeout(
        &config.api_url,
        &config.api_key,
        config.request_timeout(),
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Startup error: {}", e);
            return KnockerExitCode::ConfigError;
        }
    };

    let events = EventEmitter::new(event_sink()).with_version(config.orchestrator.version.clone());
    let outcome = manual_knock(&client, &events, config.ttl_seconds).await;

    if outcome.success {
        info!(
            "Whitelisted {} for {}s",
            outcome.whitelisted_ip, outcome.ttl_seconds
        );
        KnockerExitCode::CleanShutdown
    } else {
        error!(
            "Knock failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        KnockerExitCode::ConfigError
    }
}

/// Journald when reachable, tracing otherwise
fn event_sink() -> Arc<dyn EventSink> {
    #[cfg(feature = "journald")]
    {
        if knocker_journald::JournaldSink::is_available() {
            match knocker_journald::JournaldSink::connect() {
                Ok(sink) => {
                    info!("Emitting structured events to journald");
                    return Arc::new(sink);
                }
                Err(e) => warn!("Journald unavailable, logging events instead: {}", e),
            }
        }
    }

    Arc::new(TracingEventSink::new())
}

/// SIGTERM / SIGINT listeners, installed before the service starts
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

        Ok(Self { sigterm, sigint })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Fallback for non-Unix platforms (Ctrl-C only)
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!("Failed to wait for Ctrl-C: {}", e);
                std::future::pending().await
            }
        }
    }
}
