//! # HEV Controller
//!
//! Host-side driver for the HEV ventilator serial link.
//!
//! Two roles share the same protocol engine:
//!
//! - **monitor**: receives telemetry from the controller board, acknowledges
//!   it, writes every payload to rotating JSONL files, and forwards commands
//!   submitted on the JSON request socket
//! - **simulator**: runs the breathing loop against a simulated plant and
//!   streams its telemetry, obeying commands from the monitor
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (`hev-controller [config.toml]`)
//!    - Set up logging with tracing subscriber (optional daily log file)
//!    - Open the serial link
//!
//! 2. **Main Loop** (1 ms tick)
//!    - Move received bytes into the engine's transport buffer
//!    - Poll the engine, dispatch received payloads
//!    - Drain outbound bytes to the port
//!    - Log link counters every few seconds
//!
//! 3. **Graceful Shutdown** on Ctrl+C
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! RUST_LOG=hev_controller=debug cargo run -- config/default.toml
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hev_controller::breathing::BreathingLoop;
use hev_controller::config::{Config, LoggingConfig, Role};
use hev_controller::ports::{SimulatedPlant, SystemClock};
use hev_controller::protocol::{ProtocolEngine, ReceivedPayload};
use hev_controller::requests::{enqueue_request, RequestServer};
use hev_controller::serial::{BufferedTransport, SerialLink};
use hev_controller::telemetry::logger::TelemetryLogger;
use hev_controller::telemetry::Payload;

/// Scheduler period shared by the breathing loop and the link
const TICK_PERIOD_MS: u64 = 1;

/// Ticks between link statistics log lines (~5 seconds)
const STATS_INTERVAL_TICKS: u64 = 5000;

/// Requests waiting for the main loop
const REQUEST_CHANNEL_CAPACITY: usize = 8;

/// Used when no configuration path is given and this file exists
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

type SerialStream = tokio_serial::SerialStream;
type Engine = ProtocolEngine<SystemClock, BufferedTransport>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(std::env::args().nth(1))?;
    let _log_guard = init_logging(&config.logging);

    info!("HEV controller v{} starting ({:?})", env!("CARGO_PKG_VERSION"), config.role);

    let link = SerialLink::open(&config.serial)?;
    info!("Serial link open at: {}", link.device_path());
    let (reader, writer) = link.into_split();

    let engine = ProtocolEngine::new(
        SystemClock::new(),
        BufferedTransport::new(config.serial.buffer_size),
        &config.protocol,
    );

    match config.role {
        Role::Monitor => run_monitor(&config, engine, reader, writer).await,
        Role::Simulator => run_simulator(&config, engine, reader, writer).await,
    }
}

fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("loading {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

/// Console logging, plus a daily rolling file when `log_dir` is set
///
/// `RUST_LOG` overrides the configured level. The returned guard must be
/// held for the life of the program so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn run_monitor(
    config: &Config,
    mut engine: Engine,
    mut reader: ReadHalf<SerialStream>,
    mut writer: WriteHalf<SerialStream>,
) -> Result<()> {
    let mut logger = if config.telemetry.enabled {
        Some(TelemetryLogger::new(
            &config.telemetry.log_dir,
            config.telemetry.max_records_per_file,
            config.telemetry.max_files_to_keep,
        )?)
    } else {
        None
    };

    let (request_tx, mut request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    if config.requests.enabled {
        let server = RequestServer::bind(&config.requests.bind_address).await?;
        tokio::spawn(server.serve(request_tx));
    } else {
        drop(request_tx);
    }

    let mut tick = interval(Duration::from_millis(TICK_PERIOD_MS));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    info!("Monitoring controller telemetry, press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                engine.poll();

                while let Some(received) = engine.take_received() {
                    log_received(&received);
                    if let Some(logger) = logger.as_mut() {
                        if let Err(e) = logger.log(&received.payload) {
                            warn!("Failed to log telemetry: {}", e);
                        }
                    }
                }

                engine.transport_mut().write_pending(&mut writer).await?;

                ticks += 1;
                if ticks % STATS_INTERVAL_TICKS == 0 {
                    info!("Link stats: {:?}", engine.stats());
                }
            }

            result = engine.transport_mut().fill_from(&mut reader) => {
                if result? == 0 {
                    warn!("Serial port closed");
                    break;
                }
            }

            Some(request) = request_rx.recv() => {
                info!("Sending {:?} to controller", request);
                if let Err(e) = enqueue_request(&mut engine, request) {
                    warn!("Failed to queue command: {}", e);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if let Some(logger) = logger.as_mut() {
        logger.flush()?;
    }
    info!("Final link stats: {:?}", engine.stats());
    Ok(())
}

async fn run_simulator(
    config: &Config,
    mut engine: Engine,
    mut reader: ReadHalf<SerialStream>,
    mut writer: WriteHalf<SerialStream>,
) -> Result<()> {
    let plant = SimulatedPlant::new();
    let mut breathing = BreathingLoop::new(
        SystemClock::new(),
        plant.clone(),
        plant,
        &config.breathing,
    );
    if config.breathing.autostart {
        breathing.start();
    }

    let mut tick = interval(Duration::from_millis(TICK_PERIOD_MS));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    info!("Simulating breathing loop, press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                engine.receive_pending();

                while let Some(received) = engine.take_received() {
                    match received.payload {
                        Payload::Command(command) => {
                            if !breathing.apply_command(&command) {
                                debug!("Command not applied: {:?}", command);
                            }
                        }
                        other => debug!("Ignoring {:?} from monitor", other.kind()),
                    }
                }

                if let Some(payload) = breathing.tick() {
                    if let Err(e) = engine.enqueue_payload(&payload) {
                        warn!("Failed to queue telemetry: {}", e);
                    }
                }

                engine.send();
                engine.transport_mut().write_pending(&mut writer).await?;

                ticks += 1;
                if ticks % STATS_INTERVAL_TICKS == 0 {
                    info!(
                        "State {:?}, link stats: {:?}",
                        breathing.current_state(),
                        engine.stats()
                    );
                }
            }

            result = engine.transport_mut().fill_from(&mut reader) => {
                if result? == 0 {
                    warn!("Serial port closed");
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                breathing.stop();
                break;
            }
        }
    }

    info!("Final link stats: {:?}", engine.stats());
    Ok(())
}

fn log_received(received: &ReceivedPayload) {
    match serde_json::to_string(&received.payload) {
        Ok(json) => debug!("Received {:?}: {}", received.class, json),
        Err(e) => warn!("Failed to encode {:?} payload: {}", received.class, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_constants() {
        assert_eq!(TICK_PERIOD_MS, 1);
        // 5000 ticks of 1 ms = 5 seconds between stats lines
        assert_eq!(STATS_INTERVAL_TICKS * TICK_PERIOD_MS, 5000);
    }

    #[test]
    fn test_load_config_from_path() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "role = \"simulator\"").unwrap();

        let config = load_config(Some(file.path().display().to_string())).unwrap();
        assert_eq!(config.role, Role::Simulator);
    }

    #[test]
    fn test_load_config_missing_path_is_error() {
        let err = load_config(Some("/nonexistent/hev.toml".to_string())).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hev.toml"));
    }
}
