//! Shared test infrastructure for bulby integration tests

#![allow(dead_code)] // Items used across multiple test files; Rust analyzes per-file

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bulby::{CancelToken, Color, DeviceCommand, DeviceLink, LinkError, Pacer};

// ============================================================================
// Recorded events
// ============================================================================

/// Everything the sequencer did, in order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Sent(DeviceCommand),
    Paused(Duration),
}

pub type Recorder = Rc<RefCell<Vec<Event>>>;

pub fn recorder() -> Recorder {
    Rc::new(RefCell::new(Vec::new()))
}

/// Commands sent, in order.
pub fn sent(recorder: &Recorder) -> Vec<DeviceCommand> {
    recorder
        .borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Sent(command) => Some(*command),
            Event::Paused(_) => None,
        })
        .collect()
}

/// Number of complete reset pairs (black followed by silence).
pub fn reset_pairs(commands: &[DeviceCommand]) -> usize {
    commands
        .windows(2)
        .filter(|pair| pair == &DeviceCommand::RESET)
        .count()
}

// ============================================================================
// Mock link
// ============================================================================

/// Mock link recording every command, optionally failing or panicking
pub struct MockLink {
    recorder: Recorder,
    sends: usize,
    fail_at: Option<usize>,
    panic_at: Option<usize>,
    cancel_after: Option<(usize, CancelToken)>,
    closed: bool,
}

impl MockLink {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: Rc::clone(recorder),
            sends: 0,
            fail_at: None,
            panic_at: None,
            cancel_after: None,
            closed: false,
        }
    }

    /// Fails the send with this zero-based index and every send after it.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Panics once, on the send with this zero-based index.
    pub fn panicking_at(mut self, index: usize) -> Self {
        self.panic_at = Some(index);
        self
    }

    /// Cancels `token` once `count` commands went through.
    pub fn cancelling_after(mut self, count: usize, token: &CancelToken) -> Self {
        self.cancel_after = Some((count, token.clone()));
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DeviceLink for MockLink {
    fn send(&mut self, command: &DeviceCommand) -> Result<(), LinkError> {
        let index = self.sends;
        self.sends += 1;

        if self.panic_at == Some(index) {
            self.panic_at = None;
            panic!("link exploded");
        }
        if self.fail_at.is_some_and(|at| index >= at) {
            return Err(LinkError::Write {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"),
            });
        }

        self.recorder.borrow_mut().push(Event::Sent(*command));
        if let Some((count, token)) = &self.cancel_after {
            if self.sends >= *count {
                token.cancel();
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.closed = true;
        Ok(())
    }
}

// ============================================================================
// Mock pacer
// ============================================================================

/// Pacer that records delays instead of sleeping
pub struct MockPacer {
    recorder: Recorder,
}

impl MockPacer {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: Rc::clone(recorder),
        }
    }
}

impl Pacer for MockPacer {
    fn pause(&mut self, duration: Duration) {
        self.recorder.borrow_mut().push(Event::Paused(duration));
    }
}

// ============================================================================
// Test Helper Functions
// ============================================================================

/// Compare two colors with floating-point tolerance
pub fn colors_equal(a: Color, b: Color) -> bool {
    a.approx_eq(&b, 0.001)
}

/// Compare two colors with custom epsilon
pub fn colors_equal_epsilon(a: Color, b: Color, epsilon: f32) -> bool {
    a.approx_eq(&b, epsilon)
}
