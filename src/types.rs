//! Core types for sequence construction.

use core::time::Duration;

use thiserror::Error;

use crate::colors::Color;

/// How many times a sequence should repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    /// Repeat a specific number of times.
    Finite(u32),

    /// Repeat until cancelled.
    Infinite,
}

impl LoopCount {
    /// Maps a signed repeat count: negative means forever.
    pub fn from_times(times: i64) -> Self {
        if times < 0 {
            LoopCount::Infinite
        } else {
            LoopCount::Finite(u32::try_from(times).unwrap_or(u32::MAX))
        }
    }

    /// Returns true if `completed` cycles satisfy this count.
    pub fn is_satisfied_by(&self, completed: u32) -> bool {
        match self {
            LoopCount::Finite(count) => completed >= *count,
            LoopCount::Infinite => false,
        }
    }
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::Finite(1)
    }
}

/// A single unit of device interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Show a color.
    SetColor(Color),

    /// Play a tone in Hz, 0 silences.
    SetTone(u16),

    /// Hold the current output.
    Delay(Duration),
}

/// Direction of a fade between two colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum FadeDirection {
    /// From the first color to the second.
    #[default]
    In,

    /// From the second color back to the first.
    Out,

    /// There and back again.
    #[cfg_attr(feature = "cli", value(name = "inout"))]
    InOut,
}

/// Sequence validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SequenceError {
    /// No steps provided.
    #[error("sequence must have at least one step")]
    EmptySequence,

    /// Blink frequency not finite and positive.
    #[error("blink frequency must be a positive number of Hz, got {0}")]
    InvalidFrequency(f32),

    /// Fade or cycle speed not finite and positive.
    #[error("speed must be a positive number, got {0}")]
    InvalidSpeed(f32),
}
