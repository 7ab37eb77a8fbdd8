//! # Fixture Link
//!
//! Communication runner for a relay-based hardware test fixture.
//!
//! Opens the serial link, reassembles frames from the byte stream, and
//! dispatches relay sequence commands: parse, validate, execute against the
//! relay bank, and answer with a result frame. Transport noise never reaches
//! this level; it is visible only through the parser statistics served on
//! request.

use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fixture_link::config::Config;
use fixture_link::frame::codec::encode;
use fixture_link::frame::protocol::{
    FRAME_TYPE_ERROR, FRAME_TYPE_RESPONSE, FRAME_TYPE_SEQUENCE, FRAME_TYPE_STATS,
};
use fixture_link::frame::Frame;
use fixture_link::sequence::{parse_sequence, validate, RelayBank, SequenceExecutor, SimulatedBank};
use fixture_link::serial::{self, FixtureSerial};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for the Fixture Link runner
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (defaults when the file is absent)
///    - Set up logging (stderr, or rotating file when configured)
///    - Open the fixture serial port and spawn the frame reader task
///
/// 2. **Dispatch Loop**
///    - `SEQ` frames: parse → validate → execute → answer `RSP`, or answer
///      `ERR` with the typed failure
///    - `STS` frames: answer with the parser statistics as JSON
///    - Ctrl+C cancels any in-flight sequence (relays are force-released)
///      and shuts down
///
/// # Errors
///
/// Returns error if the configuration is invalid or no serial port can be
/// opened.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;

    // Keep the non-blocking writer guard alive for the process lifetime
    let _log_guard = init_logging(&config);

    info!("Fixture Link v{} starting...", env!("CARGO_PKG_VERSION"));

    let (mut frames, mut serial) = serial::open(&config.serial)?;
    info!("fixture serial port opened at: {}", serial.device_path());

    let executor = SequenceExecutor::new(Duration::from_millis(config.sequence.stabilization_ms));
    // Stand-in relay driver; the production bank is fixture-specific
    let mut bank = SimulatedBank::new();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            signal_cancel.cancel();
        }
    });

    info!("ready, waiting for commands");

    loop {
        tokio::select! {
            maybe_frame = frames.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        let stats_json = serde_json::to_string(&frames.stats())?;
                        if let Err(e) = handle_frame(
                            frame,
                            &executor,
                            &mut bank,
                            &mut serial,
                            &cancel,
                            &stats_json,
                        )
                        .await
                        {
                            warn!(error = %e, "failed to handle frame");
                        }
                    }
                    None => {
                        info!("serial link closed, exiting");
                        break;
                    }
                }
            }

            _ = cancel.cancelled() => {
                break;
            }
        }
    }

    let stats = frames.stats();
    info!(
        attempted = stats.attempted,
        valid = stats.valid,
        error_rate = stats.error_rate(),
        "final link statistics"
    );

    Ok(())
}

/// Dispatch one validated frame
async fn handle_frame<B: RelayBank>(
    frame: Frame,
    executor: &SequenceExecutor,
    bank: &mut B,
    serial: &mut FixtureSerial,
    cancel: &CancellationToken,
    stats_json: &str,
) -> Result<()> {
    match frame.frame_type.as_str() {
        FRAME_TYPE_SEQUENCE => {
            let command = frame.payload_text();
            info!(command = %command, "sequence command received");

            let outcome = run_sequence(&command, executor, bank, cancel).await;
            let reply = match outcome {
                Ok(payload) => encode(FRAME_TYPE_RESPONSE, payload.as_bytes())?,
                Err(message) => {
                    warn!(error = %message, "sequence rejected or failed");
                    encode(FRAME_TYPE_ERROR, message.as_bytes())?
                }
            };
            serial.send_frame(&reply).await?;
        }

        FRAME_TYPE_STATS => {
            let reply = encode(FRAME_TYPE_STATS, stats_json.as_bytes())?;
            serial.send_frame(&reply).await?;
        }

        other => {
            warn!(frame_type = other, "unsupported frame type");
            let message = format!("unsupported frame type: {}", other);
            let reply = encode(FRAME_TYPE_ERROR, message.as_bytes())?;
            serial.send_frame(&reply).await?;
        }
    }

    Ok(())
}

/// Parse, validate and execute one sequence command
///
/// Returns the formatted response payload, or the error message to report
/// back over the link.
async fn run_sequence<B: RelayBank>(
    command: &str,
    executor: &SequenceExecutor,
    bank: &mut B,
    cancel: &CancellationToken,
) -> std::result::Result<String, String> {
    let sequence = parse_sequence(command).map_err(|e| e.to_string())?;
    validate(&sequence).map_err(|e| e.to_string())?;

    let result = executor
        .execute(bank, &sequence, cancel)
        .await
        .map_err(|e| e.to_string())?;

    result.to_payload().map_err(|e| e.to_string())
}

/// Initialize tracing, to stderr or to a rotating file when configured
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if config.logging.dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    } else {
        let appender = tracing_appender::rolling::daily(&config.logging.dir, "fixture-link.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixture_link::sequence::SimulatedBank;

    #[tokio::test(start_paused = true)]
    async fn test_run_sequence_happy_path() {
        let executor = SequenceExecutor::default();
        let mut bank = SimulatedBank::new();
        let cancel = CancellationToken::new();

        let payload = run_sequence("1,2,3:500;OFF:100;4,5,6:500", &executor, &mut bank, &cancel)
            .await
            .unwrap();

        // Two active steps, two records, terminal token
        assert_eq!(payload.matches(';').count(), 2);
        assert!(payload.ends_with(";END"));
        assert!(payload.starts_with("1,2,3:"));
    }

    #[tokio::test]
    async fn test_run_sequence_reports_validation_error() {
        let executor = SequenceExecutor::default();
        let mut bank = SimulatedBank::new();
        let cancel = CancellationToken::new();

        let err = run_sequence("1,2:500;1,3:500", &executor, &mut bank, &cancel)
            .await
            .unwrap_err();
        assert!(err.contains("overlap"));
    }

    #[tokio::test]
    async fn test_run_sequence_reports_grammar_error() {
        let executor = SequenceExecutor::default();
        let mut bank = SimulatedBank::new();
        let cancel = CancellationToken::new();

        let err = run_sequence("", &executor, &mut bank, &cancel)
            .await
            .unwrap_err();
        assert!(err.contains("malformed"));
    }
}
