//! # Sequence Validator
//!
//! Hardware-safety validation of parsed relay sequences.
//!
//! The relay overlap rule models a physical concern: re-energizing a relay
//! that is still driven from the previous step, without an explicit
//! de-energize gap, risks conflicting drive states on the fixture. The load
//! and timing limits bound what the relay bank and its supply can tolerate.
//!
//! Rules are applied in a fixed order so a sequence violating several at
//! once reports deterministically.

use crate::error::SequenceError;

use super::grammar::Sequence;

/// Number of addressable relays on the fixture
pub const RELAY_COUNT: usize = 16;

/// Maximum relays energized simultaneously in one step
pub const MAX_SIMULTANEOUS_RELAYS: u32 = 8;

/// Minimum hold time of an active step in milliseconds
pub const MIN_ACTIVE_STEP_MS: u32 = 100;

/// Maximum steps per sequence
pub const MAX_SEQUENCE_STEPS: usize = 50;

/// Maximum total sequence duration in milliseconds
pub const MAX_TOTAL_DURATION_MS: u64 = 30_000;

/// Validate a parsed sequence against the device limits
///
/// Rules, in order; the first violation determines the reported error:
///
/// 1. step count ≤ [`MAX_SEQUENCE_STEPS`]
/// 2. every active step lasts at least [`MIN_ACTIVE_STEP_MS`]
/// 3. no relay repeats across consecutive active steps without an
///    intervening release step
/// 4. popcount of every active mask ≤ [`MAX_SIMULTANEOUS_RELAYS`]
/// 5. total duration ≤ [`MAX_TOTAL_DURATION_MS`]
///
/// # Errors
///
/// The [`SequenceError`] variant corresponding to the first violated rule.
pub fn validate(sequence: &Sequence) -> Result<(), SequenceError> {
    if sequence.len() > MAX_SEQUENCE_STEPS {
        return Err(SequenceError::SequenceTooLong {
            steps: sequence.len(),
            max: MAX_SEQUENCE_STEPS,
        });
    }

    for (index, step) in sequence.steps().iter().enumerate() {
        if !step.is_release && step.duration_ms < MIN_ACTIVE_STEP_MS {
            return Err(SequenceError::InvalidSequence(format!(
                "step {}: active duration {} ms below minimum {} ms",
                index, step.duration_ms, MIN_ACTIVE_STEP_MS
            )));
        }
    }

    // Overlap window covers only the immediately preceding active step; a
    // release step de-energizes everything and clears the window.
    let mut previous_active: Option<(usize, u16)> = None;
    for (index, step) in sequence.steps().iter().enumerate() {
        if step.is_release {
            previous_active = None;
            continue;
        }
        if let Some((prev_index, prev_mask)) = previous_active {
            let shared = prev_mask & step.mask;
            if shared != 0 {
                return Err(SequenceError::RelayOverlap {
                    mask: shared,
                    first: prev_index,
                    second: index,
                });
            }
        }
        previous_active = Some((index, step.mask));
    }

    for (index, step) in sequence.steps().iter().enumerate() {
        let count = step.mask.count_ones();
        if count > MAX_SIMULTANEOUS_RELAYS {
            return Err(SequenceError::TooManyRelays {
                step: index,
                count,
                max: MAX_SIMULTANEOUS_RELAYS,
            });
        }
    }

    let total_ms = sequence.total_duration_ms();
    if total_ms > MAX_TOTAL_DURATION_MS {
        return Err(SequenceError::SequenceTimeout {
            total_ms,
            max_ms: MAX_TOTAL_DURATION_MS,
        });
    }

    Ok(())
}
