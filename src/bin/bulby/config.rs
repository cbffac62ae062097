//! Command line schema.

use std::path::PathBuf;

use bulby::colors::{self, BLACK, Color};
use bulby::command::{Animation, AnimationPlan, parse_tone};
use bulby::serial::DEFAULT_DEVICE;
use bulby::types::{FadeDirection, LoopCount};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

pub(crate) const DEFAULT_BLINK_FREQUENCY: f32 = 2.0;
pub(crate) const DEFAULT_FADE_SPEED: f32 = 1.0;
pub(crate) const DEFAULT_CYCLE_SPEED: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub(crate) enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(name = "bulby", about = "Control a Bulby light", version)]
pub(crate) struct Cli {
    /// Talk to the device directly instead of through the daemon (glob, first match wins)
    #[arg(long = "serial", env = "BULBY_SERIAL", global = true, value_name = "DEV")]
    pub(crate) serial: Option<String>,

    /// Bus socket of the daemon
    #[arg(long = "bus-socket", env = "BULBY_BUS_SOCKET", global = true, value_name = "PATH")]
    pub(crate) bus_socket: Option<PathBuf>,

    /// Log verbosity on stderr
    #[arg(
        long = "log-level",
        env = "BULBY_LOG",
        global = true,
        value_enum,
        default_value_t = LogLevel::Warn
    )]
    pub(crate) log_level: LogLevel,

    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    /// Socket path from the flag, or the per-user default.
    #[cfg(unix)]
    pub(crate) fn bus_socket(&self) -> PathBuf {
        self.bus_socket
            .clone()
            .unwrap_or_else(bulby::bus::default_socket_path)
    }
}

#[derive(Debug, Subcommand, Clone)]
pub(crate) enum Command {
    /// Set color
    Color {
        /// The color to set e.g. red, #ff0000, rgb(255,0,0), hsv(0.0,1.0,1.0)
        #[arg(value_parser = colors::parse)]
        color: Color,
    },

    /// Play tone
    Tone {
        /// Frequency in Hz, 0 silences
        #[arg(value_parser = parse_tone)]
        frequency: u16,
    },

    /// Blink color
    Blink {
        /// Color to blink from (default: black), then the color to blink to
        #[arg(value_name = "COLOR", value_parser = colors::parse)]
        first: Color,

        #[arg(value_name = "TO_COLOR", value_parser = colors::parse)]
        second: Option<Color>,

        /// Blink frequency in Hz
        #[arg(
            short = 'f',
            long = "frequency",
            value_name = "FREQ",
            default_value_t = DEFAULT_BLINK_FREQUENCY
        )]
        frequency: f32,

        /// Number of times to blink, N<0 blinks forever
        #[arg(short = 'n', long = "times", default_value_t = -1, allow_negative_numbers = true)]
        times: i64,
    },

    /// Fade in color
    Fade {
        /// Color to fade from (default: black), then the color to fade to
        #[arg(value_name = "COLOR", value_parser = colors::parse)]
        first: Color,

        #[arg(value_name = "TO_COLOR", value_parser = colors::parse)]
        second: Option<Color>,

        /// Fade speed in 1/s
        #[arg(short = 's', long = "speed", default_value_t = DEFAULT_FADE_SPEED)]
        speed: f32,

        /// Fade direction
        #[arg(
            short = 'd',
            long = "direction",
            value_name = "DIR",
            value_enum,
            default_value_t = FadeDirection::In
        )]
        direction: FadeDirection,

        /// Number of times to fade, N<0 fades forever
        #[arg(short = 'n', long = "times", default_value_t = -1, allow_negative_numbers = true)]
        times: i64,
    },

    /// Cycle through the color wheel
    Cycle {
        /// Cycle speed in 1/s
        #[arg(short = 's', long = "speed", default_value_t = DEFAULT_CYCLE_SPEED)]
        speed: f32,

        /// Number of cycles, N<0 cycles forever
        #[arg(short = 'n', long = "times", default_value_t = -1, allow_negative_numbers = true)]
        times: i64,
    },

    /// Run the bus daemon owning the serial device
    Daemon {
        /// Serial device (glob, first match wins)
        #[arg(
            short = 'd',
            long = "device",
            value_name = "DEV",
            env = "BULBY_DEVICE",
            default_value = DEFAULT_DEVICE
        )]
        device: String,
    },
}

impl Command {
    /// The animation a client command asks for. `None` for the daemon.
    pub(crate) fn plan(&self) -> Option<AnimationPlan> {
        let plan = match *self {
            Command::Color { color } => {
                AnimationPlan::new(Animation::Solid(color), LoopCount::default())
            }
            Command::Tone { frequency } => {
                AnimationPlan::new(Animation::Tone(frequency), LoopCount::default())
            }
            Command::Blink {
                first,
                second,
                frequency,
                times,
            } => {
                let (from, to) = endpoints(first, second);
                AnimationPlan::new(
                    Animation::Blink {
                        from,
                        to: Some(to),
                        frequency_hz: frequency,
                    },
                    LoopCount::from_times(times),
                )
            }
            Command::Fade {
                first,
                second,
                speed,
                direction,
                times,
            } => {
                let (from, to) = endpoints(first, second);
                AnimationPlan::new(
                    Animation::Fade {
                        from,
                        to,
                        speed,
                        direction,
                    },
                    LoopCount::from_times(times),
                )
            }
            Command::Cycle { speed, times } => {
                AnimationPlan::new(Animation::HueCycle { speed }, LoopCount::from_times(times))
            }
            Command::Daemon { .. } => return None,
        };
        Some(plan)
    }
}

/// `[from] to`: a lone color is the target, starting from black.
fn endpoints(first: Color, second: Option<Color>) -> (Color, Color) {
    match second {
        Some(to) => (first, to),
        None => (BLACK, first),
    }
}
