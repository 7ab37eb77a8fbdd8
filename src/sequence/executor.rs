//! # Sequence Executor
//!
//! Drives a validated sequence against the relay/measurement hardware and
//! formats the per-step results.
//!
//! This module handles:
//! - Timed relay energize/release with a stabilization wait before sampling
//! - One measurement record per active step, tagged with its relay group
//! - Cancellation: an interrupted sequence always releases every relay
//!   before control returns, so a cancelled test never leaves hardware
//!   energized
//! - Response formatting within the frame payload budget
//!
//! Execution is inherently sequential (the fixture has one physical state)
//! and blocks its calling task for up to the sequence's total duration.
//! Callers needing responsiveness run it on a dedicated task and receive the
//! result over a channel.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ExecuteError;
use crate::frame::protocol::{MAX_CONTENT_LEN, TYPE_CODE_LEN};

use super::grammar::{Sequence, Step};
use super::validator::MAX_TOTAL_DURATION_MS;

/// Default wait after energizing relays before a sample is considered valid
pub const DEFAULT_STABILIZATION: Duration = Duration::from_millis(50);

/// Grace added to the validated duration bound before the runaway guard trips
///
/// Covers hardware call latency and timer slack; a healthy sequence never
/// comes near it.
const OVERRUN_GRACE_MS: u64 = 1_000;

/// Terminal token closing every response payload
pub const RESPONSE_END_TOKEN: &str = "END";

/// Largest response payload that fits a frame
///
/// Response text is plain ASCII, so escaping never expands it.
pub const MAX_RESPONSE_LEN: usize = MAX_CONTENT_LEN - TYPE_CODE_LEN - 1;

/// One measurement sample from the fixture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Measured voltage in volts
    pub voltage_v: f32,

    /// Measured current in amperes
    pub current_a: f32,
}

/// Trait for the relay bank and measurement hardware
///
/// The real implementation talks to fixture electronics; tests and the demo
/// binary use [`SimulatedBank`].
#[async_trait]
pub trait RelayBank: Send {
    /// Energize exactly the relays set in `mask`, de-energizing the rest
    async fn apply_mask(&mut self, mask: u16) -> io::Result<()>;

    /// De-energize every relay immediately
    async fn release_all(&mut self) -> io::Result<()>;

    /// Take one measurement sample at the current relay state
    async fn sample(&mut self) -> io::Result<Measurement>;
}

/// One measurement record, tagged with the relay group that was active
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    /// Mask of the active step that produced this record
    pub mask: u16,

    /// The sampled measurement
    pub measurement: Measurement,
}

/// Ordered per-step records of one executed sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceResult {
    records: Vec<StepRecord>,
}

impl SequenceResult {
    /// Records in step order, one per active step
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Format the result as a response payload
    ///
    /// `"<relay_list>:<voltage>,<current>"` entries joined by `;`,
    /// terminated by [`RESPONSE_END_TOKEN`].
    ///
    /// # Errors
    ///
    /// [`ExecuteError::ResponseTooLarge`] when the text would not fit the
    /// frame payload budget. This caps the practical number of active steps
    /// per sequence independently of the structural step limit.
    pub fn to_payload(&self) -> Result<String, ExecuteError> {
        let mut parts: Vec<String> = self
            .records
            .iter()
            .map(|record| {
                let step = Step::active(record.mask, 0);
                format!(
                    "{}:{:.2},{:.3}",
                    step.relay_list(),
                    record.measurement.voltage_v,
                    record.measurement.current_a
                )
            })
            .collect();
        parts.push(RESPONSE_END_TOKEN.to_string());
        let payload = parts.join(";");

        if payload.len() > MAX_RESPONSE_LEN {
            return Err(ExecuteError::ResponseTooLarge {
                size: payload.len(),
                max: MAX_RESPONSE_LEN,
            });
        }

        Ok(payload)
    }
}

/// Executor for validated relay sequences
///
/// Callers must validate a sequence before handing it over; the executor
/// trusts the safety invariants the validator established.
#[derive(Debug, Clone)]
pub struct SequenceExecutor {
    stabilization: Duration,
}

impl Default for SequenceExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_STABILIZATION)
    }
}

impl SequenceExecutor {
    /// Create an executor with the given stabilization interval
    pub fn new(stabilization: Duration) -> Self {
        Self { stabilization }
    }

    /// Execute a validated sequence against the relay bank
    ///
    /// For each active step: energize the mask, wait the stabilization
    /// interval, take one sample, then hold until the step duration elapses.
    /// Release steps insert a fully de-energized timing gap. Every relay is
    /// released after the final step.
    ///
    /// # Errors
    ///
    /// * [`ExecuteError::Cancelled`] - `cancel` fired mid-sequence
    /// * [`ExecuteError::Hardware`] - the relay bank reported an I/O error
    /// * [`ExecuteError::Overrun`] - execution ran past the sequence time
    ///   budget (monotonic clock)
    ///
    /// All error paths force an all-relays-release before returning.
    pub async fn execute<B: RelayBank>(
        &self,
        bank: &mut B,
        sequence: &Sequence,
        cancel: &CancellationToken,
    ) -> Result<SequenceResult, ExecuteError> {
        let started = Instant::now();
        let deadline = Duration::from_millis(MAX_TOTAL_DURATION_MS + OVERRUN_GRACE_MS);
        let total = sequence.len();
        let mut result = SequenceResult::default();

        info!(
            steps = total,
            total_ms = sequence.total_duration_ms(),
            "executing sequence"
        );

        for (index, step) in sequence.steps().iter().enumerate() {
            if started.elapsed() >= deadline {
                warn!(step = index, "sequence overran time budget, aborting");
                self.safe_release(bank).await;
                return Err(ExecuteError::Overrun {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }

            if let Err(err) = self.run_step(bank, step, &mut result, cancel).await {
                self.safe_release(bank).await;
                return Err(match err {
                    StepFailure::Cancelled => {
                        warn!(completed = index, total, "sequence cancelled");
                        ExecuteError::Cancelled {
                            completed: index,
                            total,
                        }
                    }
                    StepFailure::Hardware(source) => ExecuteError::Hardware {
                        step: index,
                        source,
                    },
                });
            }
        }

        // End of sequence implicitly de-energizes everything
        bank.release_all()
            .await
            .map_err(|source| ExecuteError::Hardware {
                step: total,
                source,
            })?;

        info!(
            records = result.records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sequence complete"
        );
        Ok(result)
    }

    async fn run_step<B: RelayBank>(
        &self,
        bank: &mut B,
        step: &Step,
        result: &mut SequenceResult,
        cancel: &CancellationToken,
    ) -> Result<(), StepFailure> {
        let duration = Duration::from_millis(step.duration_ms as u64);

        if step.is_release {
            debug!(duration_ms = step.duration_ms, "release step");
            bank.release_all().await.map_err(StepFailure::Hardware)?;
            wait_or_cancel(duration, cancel).await?;
            return Ok(());
        }

        debug!(
            mask = %format!("{:#06X}", step.mask),
            duration_ms = step.duration_ms,
            "active step"
        );
        bank.apply_mask(step.mask).await.map_err(StepFailure::Hardware)?;

        let settle = self.stabilization.min(duration);
        wait_or_cancel(settle, cancel).await?;

        let measurement = bank.sample().await.map_err(StepFailure::Hardware)?;
        result.records.push(StepRecord {
            mask: step.mask,
            measurement,
        });

        wait_or_cancel(duration.saturating_sub(settle), cancel).await?;
        Ok(())
    }

    /// Release everything on a failure path, logging rather than masking the
    /// original error if the release itself fails
    async fn safe_release<B: RelayBank>(&self, bank: &mut B) {
        if let Err(err) = bank.release_all().await {
            warn!(error = %err, "failed to release relays during abort");
        }
    }
}

enum StepFailure {
    Cancelled,
    Hardware(io::Error),
}

async fn wait_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), StepFailure> {
    tokio::select! {
        _ = cancel.cancelled() => Err(StepFailure::Cancelled),
        _ = sleep(duration) => Ok(()),
    }
}

/// Software relay bank used by tests and the demo binary
///
/// Produces deterministic measurements derived from the active mask: each
/// energized relay sags the bus voltage slightly and draws a fixed current.
#[derive(Debug, Default)]
pub struct SimulatedBank {
    mask: u16,
    /// History of every mask applied, releases included
    pub applied: Vec<u16>,
}

impl SimulatedBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently energized relay mask
    pub fn current_mask(&self) -> u16 {
        self.mask
    }
}

#[async_trait]
impl RelayBank for SimulatedBank {
    async fn apply_mask(&mut self, mask: u16) -> io::Result<()> {
        self.mask = mask;
        self.applied.push(mask);
        Ok(())
    }

    async fn release_all(&mut self) -> io::Result<()> {
        self.mask = 0;
        self.applied.push(0);
        Ok(())
    }

    async fn sample(&mut self) -> io::Result<Measurement> {
        let load = self.mask.count_ones() as f32;
        Ok(Measurement {
            voltage_v: 12.0 - 0.05 * load,
            current_a: 0.125 * load,
        })
    }
}
