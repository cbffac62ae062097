//! Direct serial connection to the device.

use core::time::Duration;
use std::io::{self, Write};

use crate::command::DeviceCommand;
use crate::error::LinkError;
use crate::sequencer::DeviceLink;

/// Baud rate the firmware listens at.
pub const BAUD_RATE: u32 = 57600;

/// Device glob tried when none is given.
pub const DEFAULT_DEVICE: &str = "/dev/ttyACM*";

/// Read/write timeout of the serial port.
pub const PORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a device glob to its first match, or the pattern itself if
/// nothing matches (or the pattern is not a valid glob).
pub fn resolve_device(pattern: &str) -> String {
    glob::glob(pattern)
        .ok()
        .and_then(|mut paths| paths.find_map(Result::ok))
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|| pattern.to_string())
}

/// Byte-level port operations the link needs.
pub trait SerialIo: Write {
    /// Discards unread input. The firmware echoes every byte it receives.
    fn clear_input(&mut self) -> io::Result<()>;
}

impl SerialIo for Box<dyn serialport::SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        (**self)
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// A [`DeviceLink`] writing command lines straight to a serial port.
pub struct SerialLink<P: SerialIo = Box<dyn serialport::SerialPort>> {
    port: P,
    name: String,
}

impl SerialLink {
    /// Opens `path` at `baud_rate`.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, LinkError> {
        let port = serialport::new(path, baud_rate)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|err| LinkError::Connect {
                target: path.to_string(),
                source: err.into(),
            })?;

        tracing::info!(path, baud_rate, "serial device opened");
        Ok(Self::from_port(port, path))
    }
}

impl<P: SerialIo> SerialLink<P> {
    /// Wraps an already open port.
    pub fn from_port(port: P, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
        }
    }

    /// Returns the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }

    fn write_line(&mut self, command: &DeviceCommand) -> io::Result<()> {
        let line = command.encode();
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        self.port.clear_input()
    }
}

impl<P: SerialIo> DeviceLink for SerialLink<P> {
    fn send(&mut self, command: &DeviceCommand) -> Result<(), LinkError> {
        self.write_line(command).map_err(|source| LinkError::Write {
            command: command.to_string(),
            source,
        })
    }

    fn close(&mut self) -> Result<(), LinkError> {
        tracing::info!(device = %self.name, "closing serial device");
        self.port.flush().map_err(|source| LinkError::Write {
            command: "flush".to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::Color;

    #[derive(Default)]
    struct CapturePort {
        written: Vec<u8>,
        clears: usize,
    }

    impl Write for CapturePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialIo for CapturePort {
        fn clear_input(&mut self) -> io::Result<()> {
            self.clears += 1;
            Ok(())
        }
    }

    #[test]
    fn writes_carriage_return_terminated_lines() {
        let mut link = SerialLink::from_port(CapturePort::default(), "capture");
        link.send(&DeviceCommand::color(&Color::from_rgb8(255, 128, 0)))
            .unwrap();
        link.send(&DeviceCommand::Tone(440)).unwrap();

        let port = link.into_inner();
        assert_eq!(port.written, b"color 255 128 0\rtone 440\r");
        assert_eq!(port.clears, 2);
    }

    #[test]
    fn open_missing_device_is_connect_error() {
        let result = SerialLink::open("/nonexistent-bulby-dir/ttyACM0", BAUD_RATE);
        assert!(matches!(
            result,
            Err(LinkError::Connect { ref target, .. }) if target == "/nonexistent-bulby-dir/ttyACM0"
        ));
    }

    #[test]
    fn resolve_device_falls_back_to_pattern() {
        let pattern = "/nonexistent-bulby-dir/ttyACM*";
        assert_eq!(resolve_device(pattern), pattern);
    }

    #[test]
    fn resolve_device_returns_first_match() {
        let dir = std::env::temp_dir().join(format!("bulby-glob-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("ttyACM1"), b"").unwrap();
        std::fs::write(dir.join("ttyACM0"), b"").unwrap();

        let pattern = format!("{}/ttyACM*", dir.display());
        let resolved = resolve_device(&pattern);
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(resolved, format!("{}/ttyACM0", dir.display()));
    }
}
