// # wgddnsd - WireGuard DDNS Daemon
//
// Keeps one WireGuard peer's endpoint pointed at whatever its hostname
// currently resolves to.
//
// This binary is a thin integration layer only:
// 1. Parsing flags (with environment fallbacks) into a `ReconcileConfig`
// 2. Initializing logging (stderr, a log file, or syslog once detached)
// 3. Detaching from the terminal unless `--frontend` is given
// 4. Wiring SIGINT/SIGTERM to the shutdown signal
// 5. Running the polling driver from `wgddns-core`
//
// ## Configuration
//
// | flag | environment |
// |------|-------------|
// | `-d, --device` | `WGDDNS_DEVICE` |
// | `-k, --pubkey` | `WGDDNS_PEER_PUBKEY` |
// | `-h, --host` | `WGDDNS_HOST` |
// | `-p, --port` | `WGDDNS_PORT` |
// | `-i, --interval` | `WGDDNS_INTERVAL_MS` |
// | `-4, --prefer-ipv4` | `WGDDNS_PREFER_IPV4` |
// | `-6, --prefer-ipv6` | `WGDDNS_PREFER_IPV6` |
// | `-D, --debug` | `WGDDNS_DEBUG` |
// | `-f, --frontend` | `WGDDNS_FRONTEND` |
// | `--backend` | `WGDDNS_BACKEND` |
// | `--log-file` | `WGDDNS_LOG_FILE` (default: syslog when detached) |
// | `--log-level` | `WGDDNS_LOG_LEVEL` |
//
// ## Example
//
// ```bash
// wgddnsd -f -d wg0 -k xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg= \
//     -h peer.example.com -p 51820 -i 30000
// ```

use anyhow::Result;
use clap::{ArgAction, Parser};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use wgddns_control_wg::{WgBackend, WireGuardControl};
use wgddns_core::config::DEFAULT_INTERVAL_MS;
use wgddns_core::{
    IpVersionPreference, PeerKey, PollingDriver, ReconcileConfig, Reconciler, ShutdownSignal,
};
use wgddns_resolver_system::SystemResolver;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

#[cfg(unix)]
mod syslog;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Command line, with environment fallbacks for every option
#[derive(Parser, Debug)]
#[command(
    name = "wgddnsd",
    version,
    about = "Keep a WireGuard peer endpoint in sync with its DNS name",
    disable_help_flag = true
)]
struct Cli {
    /// WireGuard interface (e.g. wg0)
    #[arg(short = 'd', long = "device", env = "WGDDNS_DEVICE")]
    device: String,

    /// Peer public key, base64
    #[arg(short = 'k', long = "pubkey", env = "WGDDNS_PEER_PUBKEY")]
    pubkey: String,

    /// Hostname that tracks the peer's address
    #[arg(short = 'h', long = "host", env = "WGDDNS_HOST")]
    host: String,

    /// Peer port written into the endpoint
    #[arg(short = 'p', long = "port", env = "WGDDNS_PORT")]
    port: u16,

    /// Poll interval in milliseconds
    #[arg(short = 'i', long = "interval", env = "WGDDNS_INTERVAL_MS", default_value_t = DEFAULT_INTERVAL_MS)]
    interval_ms: u64,

    /// Record an IPv4 preference (reported at startup)
    #[arg(short = '4', long = "prefer-ipv4", env = "WGDDNS_PREFER_IPV4", conflicts_with = "prefer_ipv6")]
    prefer_ipv4: bool,

    /// Record an IPv6 preference (reported at startup)
    #[arg(short = '6', long = "prefer-ipv6", env = "WGDDNS_PREFER_IPV6")]
    prefer_ipv6: bool,

    /// Debug logging, including every resolved address list
    #[arg(short = 'D', long = "debug", alias = "verbose", env = "WGDDNS_DEBUG")]
    debug: bool,

    /// Stay in the foreground and log to stderr
    #[arg(short = 'f', long = "frontend", alias = "foreground", env = "WGDDNS_FRONTEND")]
    frontend: bool,

    /// WireGuard backend: kernel or userspace
    #[arg(long = "backend", env = "WGDDNS_BACKEND")]
    backend: Option<String>,

    /// Append logs to this file
    #[arg(long = "log-file", env = "WGDDNS_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log level when --debug is not given
    #[arg(long = "log-level", env = "WGDDNS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Print help
    #[arg(long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

/// Validated daemon configuration
struct Config {
    reconcile: ReconcileConfig,
    backend: WgBackend,
    frontend: bool,
    log_file: Option<PathBuf>,
    log_level: Level,
}

impl Config {
    /// Turn parsed flags into a validated configuration
    fn from_cli(cli: Cli) -> Result<Self> {
        let peer_key = PeerKey::from_base64(&cli.pubkey)
            .map_err(|e| anyhow::anyhow!("Invalid peer public key: {}", e))?;

        let preference = match (cli.prefer_ipv4, cli.prefer_ipv6) {
            (true, true) => anyhow::bail!("Can't prefer both IPv4 and IPv6"),
            (true, false) => IpVersionPreference::PreferV4,
            (false, true) => IpVersionPreference::PreferV6,
            (false, false) => IpVersionPreference::None,
        };

        let reconcile = ReconcileConfig::new(cli.device, peer_key, cli.host, cli.port)
            .with_preference(preference)
            .with_interval_ms(cli.interval_ms)
            .with_verbose(cli.debug);
        reconcile.validate()?;

        let backend = match cli.backend.as_deref() {
            Some(name) => name.parse::<WgBackend>()?,
            None => WgBackend::platform_default(),
        };

        let log_level = if cli.debug {
            Level::DEBUG
        } else {
            parse_log_level(&cli.log_level)?
        };

        if let Some(path) = &cli.log_file
            && path.as_os_str().is_empty()
        {
            anyhow::bail!("WGDDNS_LOG_FILE cannot be empty");
        }

        Ok(Self {
            reconcile,
            backend,
            frontend: cli.frontend,
            log_file: cli.log_file,
            log_level,
        })
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "WGDDNS_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Install the global subscriber
///
/// `--log-file` wins; otherwise the foreground logs to stderr and a detached
/// daemon logs to syslog. The log file is opened here, before detaching, so
/// relative paths still refer to the launch directory.
fn init_tracing(config: &Config) -> Result<()> {
    let builder = FmtSubscriber::builder().with_max_level(config.log_level);

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", path.display(), e))?;
            let subscriber = builder.with_ansi(false).with_writer(Mutex::new(file)).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        #[cfg(unix)]
        None if !config.frontend => {
            // stderr is /dev/null once detached.
            let subscriber = builder
                .with_ansi(false)
                .without_time()
                .with_target(false)
                .with_writer(syslog::SyslogMakeWriter::open())
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

/// Detach from the controlling terminal
///
/// Must run before the tokio runtime starts any threads.
#[cfg(unix)]
fn daemonize() -> Result<()> {
    // SAFETY: called while the process is still single-threaded.
    let rc = unsafe { libc::daemon(0, 0) };
    if rc != 0 {
        anyhow::bail!("Daemonize failed: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn daemonize() -> Result<()> {
    anyhow::bail!("Running in the background is only supported on Unix; use --frontend")
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                DaemonExitCode::ConfigError.into()
            } else {
                DaemonExitCode::CleanShutdown.into()
            };
        }
    };

    let config = match Config::from_cli(cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to set up logging: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    if config.frontend {
        info!("Running in frontend");
    } else if let Err(e) = daemonize() {
        error!("{}", e);
        return DaemonExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a termination signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    info!(
        "Starting wgddnsd {} (backend: {})",
        env!("CARGO_PKG_VERSION"),
        config.backend
    );

    let reconciler = Reconciler::new(
        Box::new(SystemResolver::new()),
        Box::new(WireGuardControl::new(config.backend)),
    );
    // No one consumes driver events in the daemon; logs are the only output.
    let driver = PollingDriver::without_events(reconciler, config.reconcile)?;

    let shutdown = ShutdownSignal::new();
    let signal_task = {
        let shutdown = shutdown.clone();
        let mut listener = ShutdownListener::install()?;
        tokio::spawn(async move {
            let received = listener.recv().await;
            shutdown.trigger();
            info!("{} received", received);
        })
    };

    driver.run(&shutdown).await?;
    signal_task.abort();

    info!("Shutting down daemon");
    Ok(())
}

/// Termination signal listener
///
/// Installed before the driver starts so a signal arriving during the first
/// cycle is not lost.
#[cfg(unix)]
struct ShutdownListener {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownListener {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Wait for SIGTERM or SIGINT and return its name
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Fallback for non-Unix platforms: Ctrl-C only
#[cfg(not(unix))]
struct ShutdownListener;

#[cfg(not(unix))]
impl ShutdownListener {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                error!("Failed to wait for Ctrl-C: {}", e);
                std::future::pending().await
            }
        }
    }
}
