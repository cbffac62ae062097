use core::time::Duration;

use crate::colors::{self, BLACK, Color};
use crate::types::{FadeDirection, LoopCount, SequenceError, Step};

/// Number of interpolated colors in one fade.
pub const FADE_STEPS: usize = 256;

/// Number of hues in one color wheel cycle, one per degree.
pub const HUE_STEPS: usize = 360;

/// An ordered list of device steps, repeated according to its loop count.
///
/// This is the command list the [`Sequencer`](crate::Sequencer) interprets:
/// every `SetColor` and `SetTone` step becomes one device write, every `Delay`
/// step blocks for its duration. Blink, fade and hue cycle animations are
/// expanded into their full step lists up front so a sequence can be
/// inspected before anything is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSequence {
    steps: Vec<Step>,
    loop_count: LoopCount,
}

impl StepSequence {
    /// Creates a new sequence builder.
    pub fn builder() -> SequenceBuilder {
        SequenceBuilder::new()
    }

    /// Alternates between two colors, holding each for `1 / frequency_hz` seconds.
    ///
    /// `to` defaults to black.
    ///
    /// # Errors
    /// * `InvalidFrequency` - `frequency_hz` is not finite and positive
    pub fn blink(
        from: Color,
        to: Option<Color>,
        frequency_hz: f32,
        loop_count: LoopCount,
    ) -> Result<Self, SequenceError> {
        let period = period(1.0, f64::from(frequency_hz))
            .ok_or(SequenceError::InvalidFrequency(frequency_hz))?;

        SequenceBuilder::new()
            .color(from)
            .delay(period)
            .color(to.unwrap_or(BLACK))
            .delay(period)
            .loop_count(loop_count)
            .build()
    }

    /// Linearly interpolates from one color to another in [`FADE_STEPS`] steps.
    ///
    /// `Out` swaps the endpoints. `InOut` appends the reversed samples minus the
    /// turning point, giving `2 * FADE_STEPS - 1` colors. Each color is held for
    /// `(1 / speed) / FADE_STEPS` seconds; the divisor stays `FADE_STEPS` for
    /// `InOut`, so a round trip takes about twice the nominal period.
    ///
    /// # Errors
    /// * `InvalidSpeed` - `speed` is not finite and positive
    pub fn fade(
        from: Color,
        to: Color,
        speed: f32,
        direction: FadeDirection,
        loop_count: LoopCount,
    ) -> Result<Self, SequenceError> {
        let hold = period(FADE_STEPS as f64, f64::from(speed))
            .ok_or(SequenceError::InvalidSpeed(speed))?;

        let (start, end) = match direction {
            FadeDirection::Out => (to, from),
            FadeDirection::In | FadeDirection::InOut => (from, to),
        };

        let mut samples = linspace(start, end, FADE_STEPS);
        if direction == FadeDirection::InOut {
            let back: Vec<Color> = samples.iter().rev().skip(1).copied().collect();
            samples.extend(back);
        }

        Ok(Self::held_colors(samples, hold, loop_count))
    }

    /// Walks the color wheel from 0 to 359 degrees at full saturation.
    ///
    /// Each hue is held for `(1 / speed) / HUE_STEPS` seconds.
    ///
    /// # Errors
    /// * `InvalidSpeed` - `speed` is not finite and positive
    pub fn hue_cycle(speed: f32, loop_count: LoopCount) -> Result<Self, SequenceError> {
        let hold = period(HUE_STEPS as f64, f64::from(speed))
            .ok_or(SequenceError::InvalidSpeed(speed))?;

        let samples = (0..HUE_STEPS).map(|degree| colors::hue(degree as f32).to_rgb());

        Ok(Self::held_colors(samples, hold, loop_count))
    }

    fn held_colors(
        colors: impl IntoIterator<Item = Color>,
        hold: Duration,
        loop_count: LoopCount,
    ) -> Self {
        let steps = colors
            .into_iter()
            .flat_map(|color| [Step::SetColor(color), Step::Delay(hold)])
            .collect();

        Self { steps, loop_count }
    }

    /// Returns the steps of one cycle.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the number of steps in one cycle.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the loop count configuration.
    pub fn loop_count(&self) -> LoopCount {
        self.loop_count
    }

    /// Returns a reference to the step at the given index.
    pub fn get_step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Returns the colors of one cycle in order.
    pub fn colors(&self) -> impl Iterator<Item = Color> + '_ {
        self.steps.iter().filter_map(|step| match step {
            Step::SetColor(color) => Some(*color),
            _ => None,
        })
    }

    /// Total time spent in delays during one cycle.
    pub fn cycle_duration(&self) -> Duration {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Delay(duration) => *duration,
                _ => Duration::ZERO,
            })
            .sum()
    }
}

/// Builder for constructing validated step sequences.
#[derive(Debug, Default)]
pub struct SequenceBuilder {
    steps: Vec<Step>,
    loop_count: LoopCount,
}

impl SequenceBuilder {
    /// Creates a new empty sequence builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step to the sequence.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Adds a color step.
    pub fn color(self, color: Color) -> Self {
        self.step(Step::SetColor(color))
    }

    /// Adds a tone step.
    pub fn tone(self, frequency_hz: u16) -> Self {
        self.step(Step::SetTone(frequency_hz))
    }

    /// Adds a delay step.
    pub fn delay(self, duration: Duration) -> Self {
        self.step(Step::Delay(duration))
    }

    /// Sets how many times the sequence should loop.
    ///
    /// Default is `LoopCount::Finite(1)`.
    pub fn loop_count(mut self, count: LoopCount) -> Self {
        self.loop_count = count;
        self
    }

    /// Builds and validates the sequence.
    ///
    /// # Errors
    /// * `EmptySequence` - No steps were added
    pub fn build(self) -> Result<StepSequence, SequenceError> {
        if self.steps.is_empty() {
            return Err(SequenceError::EmptySequence);
        }

        Ok(StepSequence {
            steps: self.steps,
            loop_count: self.loop_count,
        })
    }
}

/// Evenly spaced RGB samples from `start` to `end`, both included.
///
/// Sample `i` is `start + i * (end - start) / (count - 1)`. Equal endpoints
/// yield `count` copies of `start`.
pub fn linspace(start: Color, end: Color, count: usize) -> Vec<Color> {
    let start = start.to_rgb();
    let end = end.to_rgb();

    if start == end || count < 2 {
        return vec![start; count];
    }

    let last = (count - 1) as f32;
    (0..count)
        .map(|i| start.lerp(&end, i as f32 / last))
        .collect()
}

/// `(1 / rate) / divisor` seconds, or `None` for a non-positive or non-finite rate.
fn period(divisor: f64, rate: f64) -> Option<Duration> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64((1.0 / rate) / divisor).ok()
}
