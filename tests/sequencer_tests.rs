//! Integration tests for Sequencer

mod common;
use common::*;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use bulby::colors::{BLACK, RED, WHITE};
use bulby::command::{Animation, AnimationPlan};
use bulby::types::{FadeDirection, LoopCount};
use bulby::{
    CancelToken, DeviceCommand, LinkError, Sequencer, SequencerError, SequencerState,
    StepSequence, Termination,
};

fn sequencer(
    link: MockLink,
    recorder: &Recorder,
    cancel: &CancelToken,
) -> Sequencer<MockLink, MockPacer> {
    Sequencer::new(link, MockPacer::new(recorder), cancel.clone())
}

#[test]
fn fade_black_to_white_is_monotonic_then_resets() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    let mut sequencer = sequencer(MockLink::new(&recorder), &recorder, &cancel);

    let result = sequencer.fade(BLACK, WHITE, 1.0, FadeDirection::In, LoopCount::Finite(1));
    assert_eq!(result.unwrap(), Termination::Completed);

    let events = recorder.borrow().clone();
    assert_eq!(events.len(), 2 * 256 + 2);

    let (animation, reset) = events.split_at(2 * 256);
    let hold = Duration::from_secs_f64(1.0 / 256.0);
    let mut previous = [0u8; 3];
    for (i, pair) in animation.chunks(2).enumerate() {
        let Event::Sent(DeviceCommand::Color(channels)) = pair[0] else {
            panic!("step {i} is not a color: {:?}", pair[0]);
        };
        assert!(
            channels.iter().zip(previous).all(|(now, before)| *now >= before),
            "step {i} decreased: {channels:?} < {previous:?}"
        );
        previous = channels;
        assert_eq!(pair[1], Event::Paused(hold));
    }
    assert_eq!(animation[0], Event::Sent(DeviceCommand::Color([0, 0, 0])));
    assert_eq!(previous, [255, 255, 255]);

    assert_eq!(
        reset,
        &[
            Event::Sent(DeviceCommand::Color([0, 0, 0])),
            Event::Sent(DeviceCommand::Tone(0)),
        ]
    );
    assert_eq!(sequencer.state(), SequencerState::Done);
}

#[test]
fn blink_three_times_emits_twelve_steps_and_reset() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    let mut sequencer = sequencer(MockLink::new(&recorder), &recorder, &cancel);

    let result = sequencer.blink(RED, Some(BLACK), 2.0, LoopCount::Finite(3));
    assert_eq!(result.unwrap(), Termination::Completed);

    let events = recorder.borrow().clone();
    assert_eq!(events.len(), 12 + 2);

    let half = Event::Paused(Duration::from_millis(500));
    let cycle = [
        Event::Sent(DeviceCommand::Color([255, 0, 0])),
        half,
        Event::Sent(DeviceCommand::Color([0, 0, 0])),
        half,
    ];
    for repetition in events[..12].chunks(4) {
        assert_eq!(repetition, &cycle);
    }
    assert_eq!(reset_pairs(&sent(&recorder)[6..]), 1);
}

#[test]
fn interrupted_blink_still_resets() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    // Cancel once the third color went out, which is step five of the run
    let link = MockLink::new(&recorder).cancelling_after(3, &cancel);
    let mut sequencer = sequencer(link, &recorder, &cancel);

    let result = sequencer.blink(RED, Some(BLACK), 2.0, LoopCount::Finite(3));
    assert_eq!(result.unwrap(), Termination::Interrupted);

    let events = recorder.borrow().clone();
    assert_eq!(events.len(), 5 + 2);
    assert_eq!(
        &events[5..],
        &[
            Event::Sent(DeviceCommand::Color([0, 0, 0])),
            Event::Sent(DeviceCommand::Tone(0)),
        ]
    );
    assert_eq!(sequencer.last_termination(), Some(Termination::Interrupted));
    assert_eq!(sequencer.state(), SequencerState::Done);
}

#[test]
fn infinite_run_resets_exactly_once_when_cancelled() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    // Blink from white to red, so no animation step looks like a reset
    let link = MockLink::new(&recorder).cancelling_after(10, &cancel);
    let mut sequencer = sequencer(link, &recorder, &cancel);

    let result = sequencer.blink(WHITE, Some(RED), 5.0, LoopCount::Infinite);
    assert_eq!(result.unwrap(), Termination::Interrupted);

    let commands = sent(&recorder);
    assert_eq!(commands.len(), 10 + 2);
    assert_eq!(reset_pairs(&commands), 1);
    assert_eq!(&commands[10..], &DeviceCommand::RESET);
}

#[test]
fn cancelled_token_sends_only_reset() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut sequencer = sequencer(MockLink::new(&recorder), &recorder, &cancel);

    let result = sequencer.cycle(1.0, LoopCount::Infinite);
    assert_eq!(result.unwrap(), Termination::Interrupted);
    assert_eq!(sent(&recorder), DeviceCommand::RESET.to_vec());
}

#[test]
fn zero_repetitions_send_only_reset() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    let mut sequencer = sequencer(MockLink::new(&recorder), &recorder, &cancel);

    let result = sequencer.blink(RED, None, 1.0, LoopCount::Finite(0));
    assert_eq!(result.unwrap(), Termination::Completed);
    assert_eq!(sent(&recorder), DeviceCommand::RESET.to_vec());
}

#[test]
fn write_failure_still_attempts_reset() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    // The second color fails, and so do both reset commands
    let link = MockLink::new(&recorder).failing_at(1);
    let mut sequencer = sequencer(link, &recorder, &cancel);

    let result = sequencer.blink(RED, Some(WHITE), 2.0, LoopCount::Finite(2));
    let Err(SequencerError::Link { source, reset }) = result else {
        panic!("expected a link error");
    };
    assert!(matches!(
        source,
        LinkError::Write { ref command, .. } if command == "color 255 255 255"
    ));
    assert!(matches!(
        reset,
        Some(LinkError::Write { ref command, .. }) if command == "color 0 0 0"
    ));

    assert_eq!(sequencer.last_termination(), Some(Termination::Failed));
    assert_eq!(sequencer.state(), SequencerState::Done);
}

#[test]
fn panic_mid_sequence_resets_during_unwind() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    let link = MockLink::new(&recorder).panicking_at(2);
    let mut sequencer = sequencer(link, &recorder, &cancel);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        sequencer.blink(RED, Some(WHITE), 2.0, LoopCount::Infinite)
    }));
    assert!(outcome.is_err());
    assert_eq!(sequencer.state(), SequencerState::Done);

    let commands = sent(&recorder);
    assert_eq!(
        commands,
        vec![
            DeviceCommand::Color([255, 0, 0]),
            DeviceCommand::Color([255, 255, 255]),
            DeviceCommand::Color([0, 0, 0]),
            DeviceCommand::Tone(0),
        ]
    );
}

#[test]
fn invalid_plan_sends_nothing() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    let mut sequencer = sequencer(MockLink::new(&recorder), &recorder, &cancel);

    let plan = AnimationPlan::new(
        Animation::Blink {
            from: RED,
            to: None,
            frequency_hz: 0.0,
        },
        LoopCount::Finite(1),
    );
    assert!(matches!(
        sequencer.handle_plan(plan),
        Err(SequencerError::Sequence(_))
    ));
    assert!(recorder.borrow().is_empty());
    assert_eq!(sequencer.state(), SequencerState::Idle);
}

#[test]
fn solid_and_tone_plans_do_not_reset() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    let mut sequencer = sequencer(MockLink::new(&recorder), &recorder, &cancel);

    let solid = AnimationPlan::new(Animation::Solid(RED), LoopCount::default());
    let tone = AnimationPlan::new(Animation::Tone(440), LoopCount::default());
    assert_eq!(sequencer.handle_plan(solid).unwrap(), Termination::Completed);
    assert_eq!(sequencer.handle_plan(tone).unwrap(), Termination::Completed);

    assert_eq!(
        sent(&recorder),
        vec![DeviceCommand::Color([255, 0, 0]), DeviceCommand::Tone(440)]
    );
}

#[test]
fn custom_sequence_with_tone_runs_through_link() {
    let recorder = recorder();
    let cancel = CancelToken::new();
    let mut sequencer = sequencer(MockLink::new(&recorder), &recorder, &cancel);

    let sequence = StepSequence::builder()
        .tone(880)
        .delay(Duration::from_millis(100))
        .delay(Duration::ZERO)
        .loop_count(LoopCount::Finite(2))
        .build()
        .unwrap();
    sequencer.run(&sequence).unwrap();

    assert_eq!(
        recorder.borrow().as_slice(),
        &[
            Event::Sent(DeviceCommand::Tone(880)),
            Event::Paused(Duration::from_millis(100)),
            Event::Sent(DeviceCommand::Tone(880)),
            Event::Paused(Duration::from_millis(100)),
            Event::Sent(DeviceCommand::Color([0, 0, 0])),
            Event::Sent(DeviceCommand::Tone(0)),
        ]
    );

    sequencer.close().unwrap();
    assert!(sequencer.link().is_closed());
}
