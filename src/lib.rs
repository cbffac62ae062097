#![doc = include_str!("../README.md")]

//! # Core Concepts
//!
//! - **`Color`**: A color in RGB or HSV, parsed from names, hex, or functional notation
//! - **`StepSequence`**: A finite list of color, tone and delay steps plus a loop count
//! - **`LoopCount`**: How many times to repeat (`Finite(n)` or `Infinite`)
//! - **`Sequencer`**: Drives the device through sequences and always resets it afterwards
//! - **`DeviceLink`**: Trait for the transport to the device (serial port or daemon)
//! - **`Pacer`**: Trait for waiting out delay steps
//! - **`CancelToken`**: Checked between steps; fires on SIGINT/SIGTERM once installed
//!
//! Colors are stored as `Srgb<f32>`/`Hsv<f32>` (0.0-1.0 channels) and only
//! quantized to 8-bit channels when a command is written to the device.

// Re-export Srgb from palette for user convenience
pub use palette::Srgb;

pub mod colors;
pub mod command;
pub mod error;
pub mod interrupt;
pub mod sequence;
pub mod sequencer;
pub mod serial;
pub mod time;
pub mod types;

#[cfg(unix)]
pub mod bus;

pub use colors::{Color, ColorSpace, ParseError, parse};
pub use command::{Animation, AnimationPlan, DeviceCommand, parse_tone};
pub use error::{LinkError, RangeError};
pub use interrupt::{CancelToken, install_handler};
pub use sequence::{SequenceBuilder, StepSequence};
pub use sequencer::{DeviceLink, Sequencer, SequencerError, SequencerState, Termination};
pub use serial::SerialLink;
pub use time::{Pacer, ThreadPacer};
pub use types::{FadeDirection, LoopCount, SequenceError, Step};
