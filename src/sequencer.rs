//! Device sequencer with state tracking and a reset-on-exit guarantee.
//!
//! Provides [`Sequencer`] which drives a single device through step sequences,
//! and the [`DeviceLink`] trait it writes through. Whatever ends a sequence
//! (completion, cancellation, a failed write, a panic) the device is reset to
//! black and silence exactly once before [`Sequencer::run`] returns.

use core::time::Duration;

use thiserror::Error;

use crate::colors::Color;
use crate::command::{Animation, AnimationPlan, DeviceCommand};
use crate::error::LinkError;
use crate::interrupt::CancelToken;
use crate::sequence::StepSequence;
use crate::time::Pacer;
use crate::types::{FadeDirection, LoopCount, SequenceError, Step};

/// Trait for abstracting the transport to the device.
///
/// Implemented by the direct serial connection and by the daemon client, so
/// the sequencer runs unchanged on either.
pub trait DeviceLink {
    /// Sends one command to the device.
    fn send(&mut self, command: &DeviceCommand) -> Result<(), LinkError>;

    /// Releases the transport. Further sends may fail.
    fn close(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

impl<L: DeviceLink + ?Sized> DeviceLink for Box<L> {
    fn send(&mut self, command: &DeviceCommand) -> Result<(), LinkError> {
        (**self).send(command)
    }

    fn close(&mut self) -> Result<(), LinkError> {
        (**self).close()
    }
}

impl<L: DeviceLink + ?Sized> DeviceLink for &mut L {
    fn send(&mut self, command: &DeviceCommand) -> Result<(), LinkError> {
        (**self).send(command)
    }

    fn close(&mut self) -> Result<(), LinkError> {
        (**self).close()
    }
}

/// The state of a sequencer.
///
/// A run moves `Idle -> Running -> {Completed | Interrupted | Failed} ->
/// ResetIssued -> Done`. Only the final reset is guaranteed to happen before
/// [`Sequencer::run`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Nothing has run yet.
    Idle,
    /// Steps are being sent.
    Running,
    /// All requested cycles were sent.
    Completed,
    /// The cancel token fired between two steps.
    Interrupted,
    /// A write failed.
    Failed,
    /// The reset commands were attempted.
    ResetIssued,
    /// The run has returned.
    Done,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Completed,
    Interrupted,
    Failed,
}

/// Errors that can occur during sequencer operations.
#[derive(Debug, Error)]
pub enum SequencerError {
    /// Animation parameters were rejected before any device write.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// A write failed. `reset` holds the error of the reset attempt, if any.
    #[error(
        "device link failed{}",
        .reset.as_ref().map(|err| format!(" (reset also failed: {err})")).unwrap_or_default()
    )]
    Link {
        #[source]
        source: LinkError,
        reset: Option<LinkError>,
    },

    /// The sequence ran, but resetting the device afterwards failed.
    #[error("failed to reset device")]
    Reset(#[source] LinkError),
}

impl From<LinkError> for SequencerError {
    fn from(source: LinkError) -> Self {
        SequencerError::Link {
            source,
            reset: None,
        }
    }
}

/// Controls a single device through timed step sequences.
///
/// # Type Parameters
/// * `L` - Device link implementation type
/// * `P` - Pacer used for delay steps
pub struct Sequencer<L: DeviceLink, P: Pacer> {
    link: L,
    pacer: P,
    cancel: CancelToken,
    state: SequencerState,
    last_termination: Option<Termination>,
}

impl<L: DeviceLink, P: Pacer> Sequencer<L, P> {
    /// Creates an idle sequencer. Nothing is sent until an operation is called.
    pub fn new(link: L, pacer: P, cancel: CancelToken) -> Self {
        Self {
            link,
            pacer,
            cancel,
            state: SequencerState::Idle,
            last_termination: None,
        }
    }

    /// Dispatches an animation plan to the matching operation.
    ///
    /// Solid colors and tones are single writes and leave the device as set;
    /// everything else runs as a sequence ending in a reset.
    pub fn handle_plan(&mut self, plan: AnimationPlan) -> Result<Termination, SequencerError> {
        match plan.animation {
            Animation::Solid(color) => self.set_color(color)?,
            Animation::Tone(frequency) => self.set_tone(frequency)?,
            _ => {
                if let Some(sequence) = plan.to_sequence()? {
                    return self.run(&sequence);
                }
            }
        }
        Ok(Termination::Completed)
    }

    /// Sets a color immediately. No timing, no reset.
    pub fn set_color(&mut self, color: Color) -> Result<(), LinkError> {
        send(&mut self.link, &DeviceCommand::color(&color))
    }

    /// Sets a tone immediately, 0 silences. No timing, no reset.
    pub fn set_tone(&mut self, frequency_hz: u16) -> Result<(), LinkError> {
        send(&mut self.link, &DeviceCommand::Tone(frequency_hz))
    }

    /// Blinks between two colors, see [`StepSequence::blink`].
    pub fn blink(
        &mut self,
        from: Color,
        to: Option<Color>,
        frequency_hz: f32,
        loop_count: LoopCount,
    ) -> Result<Termination, SequencerError> {
        let sequence = StepSequence::blink(from, to, frequency_hz, loop_count)?;
        self.run(&sequence)
    }

    /// Fades between two colors, see [`StepSequence::fade`].
    pub fn fade(
        &mut self,
        from: Color,
        to: Color,
        speed: f32,
        direction: FadeDirection,
        loop_count: LoopCount,
    ) -> Result<Termination, SequencerError> {
        let sequence = StepSequence::fade(from, to, speed, direction, loop_count)?;
        self.run(&sequence)
    }

    /// Walks the color wheel, see [`StepSequence::hue_cycle`].
    pub fn cycle(
        &mut self,
        speed: f32,
        loop_count: LoopCount,
    ) -> Result<Termination, SequencerError> {
        let sequence = StepSequence::hue_cycle(speed, loop_count)?;
        self.run(&sequence)
    }

    /// Runs a sequence to completion or cancellation, then resets the device.
    ///
    /// The cancel token is checked before every step. The reset is issued
    /// exactly once on every exit path, including unwinding; a failed reset is
    /// logged and reported but never replaces the original error.
    ///
    /// # Returns
    /// * `Ok(Termination::Completed)` - All cycles were sent
    /// * `Ok(Termination::Interrupted)` - The cancel token fired
    /// * `Err(SequencerError::Link)` - A write failed; the reset was still attempted
    /// * `Err(SequencerError::Reset)` - The run succeeded but the reset failed
    pub fn run(&mut self, sequence: &StepSequence) -> Result<Termination, SequencerError> {
        let Self {
            link,
            pacer,
            cancel,
            state,
            last_termination,
        } = self;

        tracing::info!(
            steps = sequence.step_count(),
            loop_count = ?sequence.loop_count(),
            cycle = ?sequence.cycle_duration(),
            "sequence started"
        );

        let mut guard = ResetGuard::new(link, state);
        guard.enter(SequencerState::Running);
        let outcome = drive(&mut *guard.link, pacer, cancel, sequence);

        let termination = match &outcome {
            Ok(termination) => *termination,
            Err(_) => Termination::Failed,
        };
        guard.enter(match termination {
            Termination::Completed => SequencerState::Completed,
            Termination::Interrupted => SequencerState::Interrupted,
            Termination::Failed => SequencerState::Failed,
        });
        *last_termination = Some(termination);

        let reset = guard.reset();
        tracing::info!(?termination, reset_ok = reset.is_ok(), "sequence finished");

        match (outcome, reset) {
            (Ok(termination), Ok(())) => Ok(termination),
            (Ok(_), Err(reset)) => Err(SequencerError::Reset(reset)),
            (Err(source), reset) => Err(SequencerError::Link {
                source,
                reset: reset.err(),
            }),
        }
    }

    /// Sends the reset commands: black, then silence.
    ///
    /// Both commands are attempted even if the first fails; the first error is
    /// returned.
    pub fn reset(&mut self) -> Result<(), LinkError> {
        reset_link(&mut self.link)
    }

    /// Closes the underlying link.
    pub fn close(&mut self) -> Result<(), LinkError> {
        self.link.close()
    }

    /// Returns the current state of the sequencer.
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Returns how the most recent run ended.
    pub fn last_termination(&self) -> Option<Termination> {
        self.last_termination
    }

    /// Returns the cancel token checked between steps.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Returns a reference to the device link.
    pub fn link(&self) -> &L {
        &self.link
    }
}

/// Sends the reset commands when dropped unless [`ResetGuard::reset`] ran first.
///
/// Either way the run ends in [`SequencerState::Done`].
struct ResetGuard<'a, L: DeviceLink> {
    link: &'a mut L,
    state: &'a mut SequencerState,
    armed: bool,
}

impl<'a, L: DeviceLink> ResetGuard<'a, L> {
    fn new(link: &'a mut L, state: &'a mut SequencerState) -> Self {
        Self {
            link,
            state,
            armed: true,
        }
    }

    fn enter(&mut self, state: SequencerState) {
        *self.state = state;
    }

    fn reset(mut self) -> Result<(), LinkError> {
        self.armed = false;
        self.issue_reset()
    }

    fn issue_reset(&mut self) -> Result<(), LinkError> {
        *self.state = SequencerState::ResetIssued;
        let result = reset_link(&mut *self.link);
        *self.state = SequencerState::Done;
        result
    }
}

impl<L: DeviceLink> Drop for ResetGuard<'_, L> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("sequence aborted, resetting device");
            let _ = self.issue_reset();
        }
    }
}

fn drive<L: DeviceLink, P: Pacer>(
    link: &mut L,
    pacer: &mut P,
    cancel: &CancelToken,
    sequence: &StepSequence,
) -> Result<Termination, LinkError> {
    let loop_count = sequence.loop_count();
    let mut cycles: u32 = 0;

    while !loop_count.is_satisfied_by(cycles) {
        for step in sequence.steps() {
            if cancel.is_cancelled() {
                tracing::debug!(cycles, "sequence interrupted");
                return Ok(Termination::Interrupted);
            }
            match *step {
                Step::SetColor(color) => send(link, &DeviceCommand::color(&color))?,
                Step::SetTone(frequency) => send(link, &DeviceCommand::Tone(frequency))?,
                Step::Delay(duration) if duration > Duration::ZERO => pacer.pause(duration),
                Step::Delay(_) => {}
            }
        }
        cycles = cycles.saturating_add(1);
        tracing::trace!(cycles, "cycle complete");
    }

    Ok(Termination::Completed)
}

fn send<L: DeviceLink + ?Sized>(link: &mut L, command: &DeviceCommand) -> Result<(), LinkError> {
    tracing::debug!(%command, "send");
    link.send(command)
}

fn reset_link<L: DeviceLink + ?Sized>(link: &mut L) -> Result<(), LinkError> {
    let mut first_error = None;
    for command in &DeviceCommand::RESET {
        if let Err(err) = send(link, command) {
            tracing::warn!(%command, error = %err, "reset command failed");
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::{BLACK, RED};
    use std::io;

    // Mock link that records commands and can fail after a number of sends
    #[derive(Default)]
    struct MockLink {
        sent: Vec<DeviceCommand>,
        fail_after: Option<usize>,
    }

    impl DeviceLink for MockLink {
        fn send(&mut self, command: &DeviceCommand) -> Result<(), LinkError> {
            if self.fail_after.is_some_and(|limit| self.sent.len() >= limit) {
                return Err(LinkError::Write {
                    command: command.to_string(),
                    source: io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"),
                });
            }
            self.sent.push(*command);
            Ok(())
        }
    }

    #[derive(Default)]
    struct NoPacer;

    impl Pacer for NoPacer {
        fn pause(&mut self, _duration: Duration) {}
    }

    fn sequencer(link: MockLink) -> Sequencer<MockLink, NoPacer> {
        Sequencer::new(link, NoPacer, CancelToken::new())
    }

    #[test]
    fn new_sequencer_is_idle_and_silent() {
        let sequencer = sequencer(MockLink::default());
        assert_eq!(sequencer.state(), SequencerState::Idle);
        assert_eq!(sequencer.last_termination(), None);
        assert!(sequencer.link().sent.is_empty());
    }

    #[test]
    fn set_color_does_not_reset() {
        let mut sequencer = sequencer(MockLink::default());
        sequencer.set_color(RED).unwrap();
        assert_eq!(sequencer.link().sent, vec![DeviceCommand::Color([255, 0, 0])]);
        assert_eq!(sequencer.state(), SequencerState::Idle);
    }

    #[test]
    fn completed_run_ends_done() {
        let mut sequencer = sequencer(MockLink::default());
        let result = sequencer.blink(RED, None, 2.0, LoopCount::Finite(1));
        assert_eq!(result.unwrap(), Termination::Completed);
        assert_eq!(sequencer.state(), SequencerState::Done);
        assert_eq!(sequencer.last_termination(), Some(Termination::Completed));
    }

    #[test]
    fn reset_attempts_both_commands_when_first_fails() {
        let mut link = MockLink {
            fail_after: Some(0),
            ..MockLink::default()
        };
        assert!(reset_link(&mut link).is_err());

        // A link that accepts only the tone
        struct ToneOnly(Vec<DeviceCommand>);
        impl DeviceLink for ToneOnly {
            fn send(&mut self, command: &DeviceCommand) -> Result<(), LinkError> {
                match command {
                    DeviceCommand::Tone(_) => {
                        self.0.push(*command);
                        Ok(())
                    }
                    DeviceCommand::Color(_) => Err(LinkError::Disconnected),
                }
            }
        }
        let mut link = ToneOnly(Vec::new());
        assert!(matches!(reset_link(&mut link), Err(LinkError::Disconnected)));
        assert_eq!(link.0, vec![DeviceCommand::Tone(0)]);
    }

    #[test]
    fn failed_reset_after_completion_is_reported() {
        // Blink sends two colors per cycle, then the reset fails
        let link = MockLink {
            fail_after: Some(2),
            ..MockLink::default()
        };
        let mut sequencer = sequencer(link);
        let result = sequencer.blink(RED, Some(BLACK), 1.0, LoopCount::Finite(1));
        assert!(matches!(result, Err(SequencerError::Reset(_))));
        assert_eq!(sequencer.last_termination(), Some(Termination::Completed));
        assert_eq!(sequencer.state(), SequencerState::Done);
    }

    #[test]
    fn error_messages_mention_failed_reset() {
        let error = SequencerError::Link {
            source: LinkError::Disconnected,
            reset: Some(LinkError::Disconnected),
        };
        let message = format!("{error}");
        assert!(message.contains("device link failed"));
        assert!(message.contains("reset also failed"));

        let error = SequencerError::from(LinkError::Disconnected);
        assert_eq!(format!("{error}"), "device link failed");
    }
}
