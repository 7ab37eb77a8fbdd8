//! # Sequence Grammar
//!
//! Text grammar for relay sequence commands:
//!
//! ```text
//! sequence     := step (";" step)*
//! step         := release_step | active_step
//! release_step := "OFF" ":" duration
//! active_step  := relay_list ":" duration
//! relay_list   := relay ("," relay)*
//! relay        := integer, 1..16 inclusive
//! duration     := non-negative integer (milliseconds)
//! ```
//!
//! Relay lists are converted to 16-bit masks with bit `relay - 1` set for
//! each listed relay. Any malformed token fails parsing before validation
//! begins.

use crate::error::SequenceError;

use super::validator::RELAY_COUNT;

/// Keyword introducing a release step
const RELEASE_KEYWORD: &str = "OFF";

/// One timed step of a relay sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Relay bitmask; bit `n` is relay `n + 1`. Always 0 for release steps.
    pub mask: u16,

    /// Step duration in milliseconds
    pub duration_ms: u32,

    /// All relays de-energized for the duration of this step
    pub is_release: bool,
}

impl Step {
    /// Create an active step energizing the relays in `mask`
    pub fn active(mask: u16, duration_ms: u32) -> Self {
        Self {
            mask,
            duration_ms,
            is_release: false,
        }
    }

    /// Create a release step (timing gap with everything de-energized)
    pub fn release(duration_ms: u32) -> Self {
        Self {
            mask: 0,
            duration_ms,
            is_release: true,
        }
    }

    /// Relay numbers (1-based) set in this step's mask, ascending
    pub fn relays(&self) -> Vec<u8> {
        (0..RELAY_COUNT as u8)
            .filter(|bit| self.mask & (1 << bit) != 0)
            .map(|bit| bit + 1)
            .collect()
    }

    /// Comma-joined relay list as it appears in command and response text
    pub fn relay_list(&self) -> String {
        self.relays()
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// An ordered, immutable list of steps parsed from one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    steps: Vec<Step>,
}

impl Sequence {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all step durations in milliseconds
    pub fn total_duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms as u64).sum()
    }

    #[cfg(test)]
    pub(crate) fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

/// Parse a relay sequence command
///
/// # Arguments
///
/// * `text` - ASCII command text, e.g. `"1,2,3:500;OFF:100;4,5,6:500"`
///
/// # Errors
///
/// Returns [`SequenceError::MalformedCommand`] for any grammar violation:
/// empty sequence, missing colon, non-numeric duration, or a relay outside
/// 1..=16. Hardware-safety rules are checked separately by
/// [`super::validator::validate`].
pub fn parse_sequence(text: &str) -> Result<Sequence, SequenceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SequenceError::MalformedCommand(
            "empty sequence".to_string(),
        ));
    }

    let mut steps = Vec::new();
    for (index, token) in text.split(';').enumerate() {
        steps.push(parse_step(index, token)?);
    }

    Ok(Sequence { steps })
}

fn parse_step(index: usize, token: &str) -> Result<Step, SequenceError> {
    let token = token.trim();

    let (relays_text, duration_text) = token.split_once(':').ok_or_else(|| {
        SequenceError::MalformedCommand(format!("step {}: missing ':' in {:?}", index, token))
    })?;

    let duration_ms: u32 = duration_text.trim().parse().map_err(|_| {
        SequenceError::MalformedCommand(format!(
            "step {}: invalid duration {:?}",
            index, duration_text
        ))
    })?;

    if relays_text.trim() == RELEASE_KEYWORD {
        return Ok(Step::release(duration_ms));
    }

    let mut mask: u16 = 0;
    for relay_text in relays_text.split(',') {
        let relay: u32 = relay_text.trim().parse().map_err(|_| {
            SequenceError::MalformedCommand(format!(
                "step {}: invalid relay {:?}",
                index, relay_text
            ))
        })?;

        if relay < 1 || relay > RELAY_COUNT as u32 {
            return Err(SequenceError::MalformedCommand(format!(
                "step {}: relay {} out of range 1..={}",
                index, relay, RELAY_COUNT
            )));
        }

        mask |= 1 << (relay - 1);
    }

    Ok(Step::active(mask, duration_ms))
}
