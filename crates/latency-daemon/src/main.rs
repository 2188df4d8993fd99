//! Latency daemon entry point.
//!
//! Captures a physical input device, delays every event by a randomized
//! amount, and re-emits it on a virtual device.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ AppConfig            -- config file, then CLI overrides
//!  └─ ControlSocket        -- optional, feeds ReconfigurationChannel
//!  └─ DelayEngine::start()
//!       ├─ DeviceFileSource    (capture thread)
//!       ├─ capture pump        (std thread → scheduler)
//!       └─ drain task          (tokio task → virtual device)
//!  └─ wait for Ctrl-C or capture loss, then shutdown()
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use latency_core::Distribution;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use latency_daemon::application::engine::DelayEngine;
use latency_daemon::application::schedule_events::VirtualDevice;
use latency_daemon::infrastructure::input_capture::device_file::DeviceFileSource;
use latency_daemon::infrastructure::reconfig_transport::{ControlSocket, TransportError};
use latency_daemon::infrastructure::storage::config::{
    config_file_path, load_config, parse_optional_path, AppConfig,
};
use latency_daemon::infrastructure::virtual_device::{RecordWriterDevice, TracingDevice};

/// Reconfiguration lines buffered between the socket and the engine.
const RECONFIG_QUEUE: usize = 16;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Input latency injection daemon.
///
/// Every flag overrides the matching value from the config file.
#[derive(Debug, Parser)]
#[command(
    name = "latency-daemon",
    about = "Re-emits input events on a virtual device after a randomized delay",
    version
)]
struct Cli {
    /// Config file.  Defaults to the platform config directory.
    #[arg(long, env = "LATENCY_CONFIG")]
    config: Option<PathBuf>,

    /// Input device to delay, e.g. `/dev/input/event5`.
    #[arg(long, env = "LATENCY_DEVICE")]
    device: Option<PathBuf>,

    /// Where to write re-emitted records (a uinput descriptor or file).
    ///
    /// Without it the daemon runs dry and only logs what it would emit.
    #[arg(long, env = "LATENCY_OUTPUT")]
    output: Option<PathBuf>,

    /// Minimum delay for buttons and keys (ms).
    #[arg(long)]
    click_min: Option<u64>,

    /// Maximum delay for buttons and keys (ms).  Raised to the minimum if lower.
    #[arg(long)]
    click_max: Option<u64>,

    /// Minimum delay for pointer motion (ms).
    #[arg(long)]
    move_min: Option<u64>,

    /// Maximum delay for pointer motion (ms).  Raised to the minimum if lower.
    #[arg(long)]
    move_max: Option<u64>,

    /// `l`/`uniform` or `n`/`normal`.
    #[arg(long)]
    distribution: Option<Distribution>,

    /// Mean of the normal distribution (ms).  Defaults to the click midpoint.
    #[arg(long)]
    mu: Option<f64>,

    /// Standard deviation of the normal distribution (ms).  Defaults to mu/20.
    #[arg(long)]
    sigma: Option<f64>,

    /// Unix socket accepting reconfiguration lines; `none` disables it.
    #[arg(long, env = "LATENCY_CONTROL_SOCKET")]
    control_socket: Option<String>,

    /// CSV event log appended at shutdown; `none` disables it.
    #[arg(long)]
    event_log: Option<String>,

    /// Fixed RNG seed for reproducible delays.
    #[arg(long)]
    seed: Option<u64>,

    /// Wait before capturing so the key that launched the daemon is released.
    #[arg(long, default_value_t = 1_000, env = "LATENCY_STARTUP_DELAY_MS")]
    startup_delay_ms: u64,
}

impl Cli {
    /// Applies every flag that was given on top of `cfg`.
    fn apply_to(&self, cfg: &mut AppConfig) {
        let io = &mut cfg.io;
        if let Some(device) = &self.device {
            io.device = Some(device.clone());
        }
        if let Some(output) = &self.output {
            io.output = Some(output.clone());
        }
        if let Some(socket) = &self.control_socket {
            io.control_socket = parse_optional_path(socket);
        }
        if let Some(log) = &self.event_log {
            io.event_log = parse_optional_path(log);
        }

        let delays = &mut cfg.delays;
        if let Some(v) = self.click_min {
            delays.click_min_ms = v;
        }
        if let Some(v) = self.click_max {
            delays.click_max_ms = v;
        }
        if let Some(v) = self.move_min {
            delays.move_min_ms = v;
        }
        if let Some(v) = self.move_max {
            delays.move_max_ms = v;
        }
        if let Some(d) = self.distribution {
            delays.distribution = d;
        }
        if self.mu.is_some() {
            delays.mu = self.mu;
        }
        if self.sigma.is_some() {
            delays.sigma = self.sigma;
        }
        if self.seed.is_some() {
            cfg.engine.seed = self.seed;
        }
    }
}

/// Binds the optional control socket and returns it with the receiving end of
/// its line channel.
fn bind_control_socket(
    path: Option<&Path>,
) -> Result<Option<(ControlSocket, mpsc::Receiver<String>)>, TransportError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let (tx, rx) = mpsc::channel(RECONFIG_QUEUE);
    Ok(Some((ControlSocket::bind(path, tx)?, rx)))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => config_file_path().ok(),
    };
    let mut cfg = match &config_path {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };
    cli.apply_to(&mut cfg);

    // Initialise structured logging.  `RUST_LOG` wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.daemon.log_level)),
        )
        .init();

    info!("latency daemon starting");

    let device_path = cfg
        .io
        .device
        .clone()
        .context("no input device configured; pass --device /dev/input/eventN")?;
    let output: Arc<dyn VirtualDevice> = match &cfg.io.output {
        Some(path) => Arc::new(
            RecordWriterDevice::open(path).with_context(|| format!("opening output {}", path.display()))?,
        ),
        None => {
            info!("no output configured, running dry");
            Arc::new(TracingDevice::new())
        }
    };

    tokio::time::sleep(Duration::from_millis(cli.startup_delay_ms)).await;

    // Bound before the engine so a failed bind has nothing to shut down.
    let control = bind_control_socket(cfg.io.control_socket.as_deref())?;

    let started = DelayEngine::start(
        cfg.engine_settings(),
        cfg.delay_config(),
        Box::new(DeviceFileSource::new(device_path)),
        output,
    );
    let mut engine = match started {
        Ok(engine) => engine,
        Err(e) => {
            if let Some((control, _)) = control {
                control.close();
            }
            return Err(e.into());
        }
    };
    let control = control.map(|(socket, rx)| {
        tokio::spawn(engine.reconfiguration_channel().run(rx));
        socket
    });

    info!("latency daemon ready.  Press Ctrl-C to exit.");

    // ── Wait for Ctrl-C or capture loss ───────────────────────────────────────
    let capture_lost = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("failed to listen for Ctrl-C: {e}");
            }
            info!("shutdown signal received");
            None
        }
        err = engine.wait_for_disconnect() => {
            error!("{err}");
            Some(err)
        }
    };

    if let Some(control) = control {
        control.close();
    }
    let report = engine.shutdown(cfg.shutdown_deadline()).await?;
    if let Some(path) = &report.log_path {
        info!("wrote {} events to {}", report.records.len(), path.display());
    }

    info!("latency daemon stopped");
    match capture_lost {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
