//! # Serial Communication Module
//!
//! Serial link to the fixture hardware.
//!
//! This module handles:
//! - Opening the configured serial port (with candidate-path autodetect)
//! - A reader task that owns the incremental frame parser and forwards
//!   completed frames over a channel
//! - Publishing frame statistics snapshots for diagnostics
//! - Writing encoded frames back out
//!
//! Frame delivery is message passing by design: the reader task is the only
//! owner of parser state, consumers pull frames from the channel, and nobody
//! shares mutable callback state across tasks.

pub mod port_trait;

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{FixtureLinkError, Result};
use crate::frame::{Frame, FrameParser, FrameStats};

use port_trait::{SerialPortIO, TokioSerialPort};

/// Default fixture device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC fixture controllers
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Read chunk size for the reader task
const READ_CHUNK_SIZE: usize = 256;

/// Capacity of the completed-frame channel
const FRAME_CHANNEL_CAPACITY: usize = 32;

/// How often the reader task checks a stalled frame attempt for timeout
///
/// Without this, a timeout would only be noticed when the next byte arrives,
/// never on a line that went silent mid-frame.
const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outbound half of the fixture link
///
/// Wraps the write half of the port behind [`SerialPortIO`] so the send path
/// is testable without hardware.
pub struct FixtureSerial<S: SerialPortIO = TokioSerialPort> {
    sink: S,
    device_path: String,
}

impl<S: SerialPortIO> std::fmt::Debug for FixtureSerial<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl<S: SerialPortIO> FixtureSerial<S> {
    /// Wrap an already-open sink
    pub fn with_sink(sink: S, device_path: impl Into<String>) -> Self {
        Self {
            sink,
            device_path: device_path.into(),
        }
    }

    /// Send one encoded frame to the fixture
    ///
    /// # Arguments
    ///
    /// * `frame` - Complete wire frame from [`crate::frame::codec::encode`]
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.sink
            .write_all(frame)
            .await
            .map_err(|e| FixtureLinkError::Serial(format!("failed to write frame: {}", e)))?;

        self.sink
            .flush()
            .await
            .map_err(|e| FixtureLinkError::Serial(format!("failed to flush serial port: {}", e)))?;

        debug!(len = frame.len(), "sent frame");
        Ok(())
    }

    /// Device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

/// Inbound side of the fixture link
///
/// Returned by [`open`]; receives validated frames from the reader task and
/// exposes the parser's running statistics.
pub struct FrameReceiver {
    frames: mpsc::Receiver<Frame>,
    stats: watch::Receiver<FrameStats>,
}

impl FrameReceiver {
    /// Receive the next validated frame; `None` when the link closed
    pub async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    /// Latest statistics snapshot published by the reader task
    pub fn stats(&self) -> FrameStats {
        *self.stats.borrow()
    }
}

/// Open the fixture serial link
///
/// Opens the configured port (or autodetects over the default candidate
/// paths when unset), splits it, and spawns the reader task.
///
/// # Returns
///
/// * The inbound [`FrameReceiver`] and the outbound [`FixtureSerial`]
///
/// # Errors
///
/// Returns [`FixtureLinkError::SerialPortNotFound`] when no candidate path
/// opens, or [`FixtureLinkError::Serial`] for port configuration failures.
pub fn open(config: &SerialConfig) -> Result<(FrameReceiver, FixtureSerial)> {
    let candidates: Vec<&str> = if config.port.is_empty() {
        DEFAULT_DEVICE_PATHS.to_vec()
    } else {
        vec![config.port.as_str()]
    };

    for &path in &candidates {
        debug!(path, "trying serial port");
        match open_port(path, config.baud_rate) {
            Ok(stream) => {
                info!(path, baud = config.baud_rate, "opened fixture serial port");
                let (read_half, write_half) = tokio::io::split(stream);

                let timeout = Duration::from_millis(config.frame_timeout_ms);
                let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
                let (stats_tx, stats_rx) = watch::channel(FrameStats::default());
                tokio::spawn(read_loop(read_half, timeout, frames_tx, stats_tx));

                let receiver = FrameReceiver {
                    frames: frames_rx,
                    stats: stats_rx,
                };
                let sender =
                    FixtureSerial::with_sink(TokioSerialPort::new(write_half), path.to_string());
                return Ok((receiver, sender));
            }
            Err(e) => {
                warn!(path, error = %e, "failed to open serial port");
                continue;
            }
        }
    }

    Err(FixtureLinkError::SerialPortNotFound(candidates.join(", ")))
}

/// Open a specific serial port with fixture link settings (8N1)
fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| FixtureLinkError::Serial(format!("failed to open {}: {}", path, e)))?;

    Ok(port)
}

/// Reader task: feed raw chunks to the parser, forward completed frames
///
/// Sole owner of the parser; consumers only ever see the frame channel and
/// the stats snapshots.
async fn read_loop<R>(
    mut reader: R,
    timeout: Duration,
    frames: mpsc::Sender<Frame>,
    stats: watch::Sender<FrameStats>,
) where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut parser = FrameParser::new(timeout);
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut poll = tokio::time::interval(TIMEOUT_POLL_INTERVAL);

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("serial link closed");
                    break;
                }
                Ok(n) => {
                    for frame in parser.feed(&buf[..n]) {
                        if frames.send(frame).await.is_err() {
                            debug!("frame consumer dropped, stopping reader");
                            return;
                        }
                    }
                    let _ = stats.send(*parser.stats());
                }
                Err(e) => {
                    warn!(error = %e, "serial read failed");
                    break;
                }
            },

            // A stalled attempt must be abandoned even when no further
            // bytes arrive to trigger the check.
            _ = poll.tick() => {
                parser.check_timeout();
                let _ = stats.send(*parser.stats());
            }
        }
    }
}
