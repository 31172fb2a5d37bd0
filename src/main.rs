//! dfrow - Dynamic Function Row daemon
//!
//! Drives the display strip that replaces the physical function-key row:
//! brings it up when the device appears, dims and blanks it on inactivity,
//! remaps its keys between function and special semantics, and follows host
//! suspend/resume.

mod config;
mod display;
mod input;
mod protocol;
mod session;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{Config, FnMode, Tunables};
use session::{SessionController, SessionEvent};
use transport::DeviceHandle;

/// How often to look for the device while none is attached
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(5);

/// dfrow - dynamic function row daemon
#[derive(Parser)]
#[command(name = "dfrowd")]
#[command(author = "dfrow Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Drive the display strip replacing the function-key row", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run {
        /// Function key mode override (0 = normal, 1 = function keys)
        #[arg(long)]
        fn_mode: Option<u8>,

        /// Idle timeout override in seconds (dimmed -> off)
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Dim timeout override in seconds (active -> dimmed)
        #[arg(long)]
        dim_timeout: Option<u64>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show system information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Run {
            fn_mode,
            idle_timeout,
            dim_timeout,
        } => {
            let mut tunables = Tunables::from(&config.row);
            if let Some(raw) = fn_mode {
                tunables.fn_mode = FnMode::try_from(raw).map_err(|e| anyhow::anyhow!(e))?;
            }
            if let Some(secs) = idle_timeout {
                tunables.idle_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = dim_timeout {
                tunables.dim_timeout = Duration::from_secs(secs);
            }

            run_daemon(tunables).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_system_info();
        }
    }

    Ok(())
}

fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(path) = &config.general.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    Ok(())
}

/// Run the daemon: discover the device, run the session, follow signals
///
/// SIGUSR1 suspends the row, SIGUSR2 resumes it; the host's sleep hooks are
/// expected to deliver these.
async fn run_daemon(tunables: Tunables) -> anyhow::Result<()> {
    tracing::info!(
        "starting dfrowd (fn_mode={:?}, dim={:?}, idle={:?})",
        tunables.fn_mode,
        tunables.dim_timeout,
        tunables.idle_timeout
    );

    let mut controller = SessionController::new(tunables.shared());
    let mut event_rx = controller
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;

    spawn_input_sources(&controller);

    let mut suspend_sig = signal(SignalKind::user_defined1())?;
    let mut resume_sig = signal(SignalKind::user_defined2())?;

    let mut discover_tick = tokio::time::interval(DISCOVERY_INTERVAL);
    discover_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = discover_tick.tick() => {
                if !controller.is_attached() {
                    if let Some(handle) = discover_device() {
                        if let Err(e) = controller.attach(handle).await {
                            tracing::error!("attach failed: {}", e);
                        }
                    }
                }
            }
            Some(event) = event_rx.recv() => {
                match event {
                    SessionEvent::Attached { identity } => {
                        tracing::info!("row up on {}", identity);
                    }
                    SessionEvent::Detached { reason } => {
                        // Also reached for read-loop failures; tearing down
                        // an already-empty session is a no-op
                        controller.detach(&reason).await;
                    }
                    SessionEvent::DeviceError { reason } => {
                        tracing::error!("device error, dropping session: {}", reason);
                        controller.detach(&reason).await;
                    }
                    SessionEvent::Action { action, pressed } => {
                        tracing::debug!(
                            "row key {:#x} {}",
                            action.code(),
                            if pressed { "pressed" } else { "released" }
                        );
                    }
                }
            }
            _ = suspend_sig.recv() => {
                tracing::info!("suspend requested");
                controller.suspend().await?;
            }
            _ = resume_sig.recv() => {
                tracing::info!("resume requested");
                controller.resume().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

#[cfg(target_os = "linux")]
fn spawn_input_sources(controller: &SessionController) {
    match input::spawn_sources(controller.input_sender()) {
        Ok(kinds) if kinds.is_empty() => {
            tracing::warn!("no paired input sources found; row wakes on its own keys only");
        }
        Ok(kinds) => {
            tracing::info!("watching paired input sources: {:?}", kinds);
        }
        Err(e) => {
            tracing::warn!("input source discovery failed: {}", e);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn spawn_input_sources(_controller: &SessionController) {
    tracing::warn!("paired input sources are only supported on Linux");
}

#[cfg(target_os = "linux")]
fn discover_device() -> Option<DeviceHandle> {
    match transport::discover() {
        Ok(Some(t)) => {
            let identity = t.identity().clone();
            Some(DeviceHandle::new(Arc::new(t), identity))
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("device discovery failed: {}", e);
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn discover_device() -> Option<DeviceHandle> {
    None
}

/// Print system information
fn print_system_info() {
    println!("dfrow System Information");
    println!("========================\n");

    println!(
        "Device: {:04x}:{:04x} (iBridge display row)",
        protocol::VENDOR_ID,
        protocol::PRODUCT_ID
    );
    println!(
        "Frame report: id {:#04x}, {} bytes",
        protocol::FRAME_REPORT_ID,
        protocol::FRAME_REPORT_LEN
    );
    println!(
        "Mode report:  id {:#04x}, {} bytes",
        protocol::MODE_REPORT_ID,
        protocol::MODE_REPORT_LEN
    );

    #[cfg(target_os = "linux")]
    {
        println!("\nLinux Requirements:");
        println!("  - User must be in 'input' group: sudo usermod -aG input $USER");
        println!("  - hidraw access to the device node (udev rule or root)");
    }

    println!("\nSignals: SIGUSR1 suspends the row, SIGUSR2 resumes it");
}
