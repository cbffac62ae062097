//! Device wire commands and animation requests.
//!
//! The firmware reads one command per line, terminated by a carriage return,
//! with space separated integer arguments:
//!
//! ```text
//! color <r> <g> <b>\r     channels 0-255
//! tone <frequency>\r      Hz, 0 silences
//! ```

use core::fmt::{self, Write};

use crate::colors::Color;
use crate::error::RangeError;
use crate::sequence::StepSequence;
use crate::types::{FadeDirection, LoopCount, SequenceError};

/// Capacity of an encoded command line. The longest line,
/// `"color 255 255 255\r"`, is 18 bytes.
pub const LINE_CAPACITY: usize = 32;

/// An encoded, carriage-return terminated command line.
pub type CommandLine = heapless::String<LINE_CAPACITY>;

/// Highest tone frequency the firmware accepts.
pub const MAX_TONE_HZ: u16 = u16::MAX;

/// A command understood by the device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Set the pixel color.
    Color([u8; 3]),
    /// Play a tone, 0 silences.
    Tone(u16),
}

impl DeviceCommand {
    /// The commands that return the device to its idle state.
    pub const RESET: [DeviceCommand; 2] =
        [DeviceCommand::Color([0, 0, 0]), DeviceCommand::Tone(0)];

    /// Creates a color command from a color's rounded 8-bit channels.
    pub fn color(color: &Color) -> Self {
        DeviceCommand::Color(color.to_rgb8())
    }

    /// Encodes the command as a wire line with its trailing carriage return.
    pub fn encode(&self) -> CommandLine {
        let mut line = CommandLine::new();
        // Cannot overflow, see LINE_CAPACITY.
        let _ = write!(line, "{self}\r");
        line
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Color([r, g, b]) => write!(f, "color {r} {g} {b}"),
            DeviceCommand::Tone(frequency) => write!(f, "tone {frequency}"),
        }
    }
}

/// Parses a tone frequency, rejecting values outside 0-65535.
pub fn parse_tone(text: &str) -> Result<u16, RangeError> {
    let value = text
        .trim()
        .parse::<i64>()
        .map_err(|_| RangeError::NotAnInteger(text.to_string()))?;
    let value = RangeError::check(value, 0, i64::from(MAX_TONE_HZ))?;
    Ok(value as u16)
}

/// What to show on the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Animation {
    /// Set a color and leave it on.
    Solid(Color),

    /// Start a tone and leave it playing.
    Tone(u16),

    /// Alternate between two colors.
    Blink {
        from: Color,
        to: Option<Color>,
        frequency_hz: f32,
    },

    /// Interpolate between two colors.
    Fade {
        from: Color,
        to: Color,
        speed: f32,
        direction: FadeDirection,
    },

    /// Walk the color wheel.
    HueCycle { speed: f32 },
}

/// An animation together with its repeat count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationPlan {
    pub animation: Animation,
    pub loop_count: LoopCount,
}

impl AnimationPlan {
    /// Creates a plan.
    pub fn new(animation: Animation, loop_count: LoopCount) -> Self {
        Self {
            animation,
            loop_count,
        }
    }

    /// Returns true for plans that run as a timed sequence and end with a reset.
    pub fn is_sequenced(&self) -> bool {
        !matches!(self.animation, Animation::Solid(_) | Animation::Tone(_))
    }

    /// Expands a sequenced plan into its step list.
    ///
    /// Returns `Ok(None)` for solid colors and tones, which are single writes.
    pub fn to_sequence(&self) -> Result<Option<StepSequence>, SequenceError> {
        let sequence = match self.animation {
            Animation::Solid(_) | Animation::Tone(_) => return Ok(None),
            Animation::Blink {
                from,
                to,
                frequency_hz,
            } => StepSequence::blink(from, to, frequency_hz, self.loop_count)?,
            Animation::Fade {
                from,
                to,
                speed,
                direction,
            } => StepSequence::fade(from, to, speed, direction, self.loop_count)?,
            Animation::HueCycle { speed } => StepSequence::hue_cycle(speed, self.loop_count)?,
        };
        Ok(Some(sequence))
    }
}
