// Host-side tests for the mapper: curves, range scaling, saturation and
// trigger consumption through the event cursor.

use midi_viz::accumulator::Accumulator;
use midi_viz::config::AccumulatorConfig;
use midi_viz::mapping::{
    resolve, resolve_with_cursor, source_value, Curve, EventCursor, MappingRule, Source, Target,
};
use midi_viz::midi::MidiEvent;
use midi_viz::state::PerformanceState;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

fn state_with_velocity(velocity: u8) -> PerformanceState {
    let mut a = Accumulator::new(AccumulatorConfig::default());
    a.on_event(
        MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity,
        },
        0.0,
    );
    let st = a.snapshot();
    let out = st.borrow().clone();
    out
}

#[test]
fn velocity_curves_shape_before_scaling() {
    let st = state_with_velocity(64);
    let exp = MappingRule::new(Source::Velocity, Target::Size, 0.0, 1.0, Curve::Exponential);
    let log = MappingRule::new(Source::Velocity, Target::Size, 0.0, 1.0, Curve::Logarithmic);
    let lin = MappingRule::new(Source::Velocity, Target::Size, 0.0, 1.0, Curve::Linear);
    assert!(approx(resolve(&st, &[exp]).get(Target::Size).unwrap(), 0.254));
    assert!(approx(resolve(&st, &[log]).get(Target::Size).unwrap(), 0.710));
    assert!(approx(resolve(&st, &[lin]).get(Target::Size).unwrap(), 0.504));
}

#[test]
fn polyphony_scales_into_range() {
    let mut a = Accumulator::new(AccumulatorConfig::default());
    for n in 0..5u8 {
        a.on_event(
            MidiEvent::NoteOn {
                channel: 0,
                note: 60 + n,
                velocity: 100,
            },
            0.0,
        );
    }
    let st = a.snapshot();
    let rule = MappingRule::new(Source::Polyphony, Target::Spread, 0.5, 2.0, Curve::Linear);
    let v = resolve(&st.borrow(), &[rule]).get(Target::Spread).unwrap();
    assert_eq!(v, 1.25);
}

#[test]
fn unseen_controller_reads_zero() {
    let st = PerformanceState::new(8);
    let rule = MappingRule::cc(21, Target::Rotation, 0.0, 3.0, Curve::Linear);
    assert_eq!(resolve(&st, &[rule]).get(Target::Rotation), Some(0.0));
    assert_eq!(
        source_value(Source::Cc, None, &st, &EventCursor::default()),
        0.0
    );
}

#[test]
fn density_saturates_at_one() {
    let mut st = PerformanceState::new(8);
    st.density = 30.0;
    let rule = MappingRule::new(Source::Density, Target::Speed, 0.0, 1.0, Curve::Linear);
    assert_eq!(resolve(&st, &[rule]).get(Target::Speed), Some(1.0));
    st.polyphony = 40;
    assert_eq!(
        source_value(Source::Polyphony, None, &st, &EventCursor::default()),
        1.0
    );
}

#[test]
fn note_on_trigger_fires_once_per_event() {
    let mut a = Accumulator::new(AccumulatorConfig::default());
    let shared = a.snapshot();
    let rules = [MappingRule::new(Source::NoteOn, Target::Intensity, 0.0, 1.0, Curve::Linear)];
    let mut cursor = EventCursor::caught_up(&shared.borrow());

    a.on_event(
        MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        },
        0.0,
    );
    let mut seen = Vec::new();
    for _ in 0..3 {
        let st = shared.borrow();
        seen.push(resolve_with_cursor(&st, &rules, &cursor).get(Target::Intensity).unwrap());
        cursor.advance(&st);
    }
    assert_eq!(seen, vec![1.0, 0.0, 0.0]);

    // A note-off after the note-on does not re-arm the trigger, a new
    // note-on does.
    a.on_event(MidiEvent::NoteOff { channel: 0, note: 60 }, 200.0);
    assert_eq!(
        resolve_with_cursor(&shared.borrow(), &rules, &cursor).get(Target::Intensity),
        Some(0.0)
    );
    a.on_event(
        MidiEvent::NoteOn {
            channel: 0,
            note: 62,
            velocity: 100,
        },
        300.0,
    );
    assert_eq!(
        resolve_with_cursor(&shared.borrow(), &rules, &cursor).get(Target::Intensity),
        Some(1.0)
    );
}

#[test]
fn note_off_source_reflects_last_event() {
    let mut a = Accumulator::new(AccumulatorConfig::default());
    let shared = a.snapshot();
    let rule = MappingRule::new(Source::NoteOff, Target::Brightness, 0.0, 1.0, Curve::Linear);
    a.on_event(
        MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        },
        0.0,
    );
    assert_eq!(resolve(&shared.borrow(), &[rule]).get(Target::Brightness), Some(0.0));
    a.on_event(MidiEvent::NoteOff { channel: 0, note: 60 }, 500.0);
    assert_eq!(resolve(&shared.borrow(), &[rule]).get(Target::Brightness), Some(1.0));
}

#[test]
fn later_rules_win_and_untouched_targets_stay_empty() {
    let st = state_with_velocity(127);
    let rules = [
        MappingRule::new(Source::Velocity, Target::Hue, 0.0, 0.5, Curve::Linear),
        MappingRule::new(Source::Velocity, Target::Hue, 0.0, 0.25, Curve::Linear),
    ];
    let out = resolve(&st, &rules);
    assert_eq!(out.get(Target::Hue), Some(0.25));
    assert_eq!(out.get(Target::Size), None);
    assert_eq!(out.iter().count(), 1);
}

#[test]
fn inverted_range_maps_in_reverse() {
    let st = state_with_velocity(127);
    let rule = MappingRule::new(Source::Velocity, Target::Size, 2.0, 1.0, Curve::Linear);
    assert_eq!(resolve(&st, &[rule]).get(Target::Size), Some(1.0));
    let quiet = state_with_velocity(1);
    let v = resolve(&quiet, &[rule]).get(Target::Size).unwrap();
    assert!(v > 1.99 && v <= 2.0);
}

#[test]
fn pitch_and_centroid_fall_back_before_any_note() {
    let st = PerformanceState::new(8);
    let cursor = EventCursor::default();
    let centroid = source_value(Source::Centroid, None, &st, &cursor);
    assert!(approx(centroid, 60.0 / 127.0));
    assert_eq!(source_value(Source::Pitch, None, &st, &cursor), centroid);
    assert_eq!(source_value(Source::Velocity, None, &st, &cursor), 0.0);
    assert_eq!(source_value(Source::NoteOn, None, &st, &cursor), 0.0);
}
