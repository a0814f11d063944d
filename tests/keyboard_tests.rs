// Host-side tests for the computer-keyboard note layout and raw MIDI parsing.

use midi_viz::midi::{
    note_for_key, octave_shift_for_key, semitone_for_key, EventBus, MidiEvent, KEYBOARD_VELOCITY,
};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn home_row_plays_white_keys() {
    let white: Vec<u8> = ["a", "s", "d", "f", "g", "h", "j", "k"]
        .iter()
        .filter_map(|k| semitone_for_key(k))
        .collect();
    assert_eq!(white, vec![0, 2, 4, 5, 7, 9, 11, 12]);
}

#[test]
fn upper_row_plays_black_keys() {
    let black: Vec<u8> = ["w", "e", "t", "y", "u"]
        .iter()
        .filter_map(|k| semitone_for_key(k))
        .collect();
    assert_eq!(black, vec![1, 3, 6, 8, 10]);
}

#[test]
fn keys_are_case_insensitive() {
    for k in ["a", "w", "s", "e", "d", "f", "t", "g", "y", "h", "u", "j", "k"] {
        assert_eq!(
            semitone_for_key(k),
            semitone_for_key(&k.to_uppercase()),
            "{k}"
        );
    }
}

#[test]
fn unmapped_keys_are_ignored() {
    for k in ["q", "1", " ", "Enter", "ArrowUp", "", "l"] {
        assert_eq!(semitone_for_key(k), None, "{k}");
        assert_eq!(note_for_key(k, 4), None, "{k}");
    }
}

#[test]
fn octave_moves_by_twelve() {
    assert_eq!(note_for_key("a", 4), Some(60));
    assert_eq!(note_for_key("a", 5), Some(72));
    assert_eq!(note_for_key("a", 3), Some(48));
    assert_eq!(note_for_key("a", 0), Some(12));
    assert_eq!(note_for_key("a", -1), Some(0));
}

#[test]
fn notes_outside_midi_range_are_dropped() {
    // G9 is the top MIDI note; anything above is out.
    assert_eq!(note_for_key("g", 9), Some(127));
    assert_eq!(note_for_key("y", 9), None);
    assert_eq!(note_for_key("a", -2), None);
}

#[test]
fn octave_shift_keys() {
    assert_eq!(octave_shift_for_key("z"), Some(-1));
    assert_eq!(octave_shift_for_key("X"), Some(1));
    assert_eq!(octave_shift_for_key("a"), None);
}

#[test]
#[allow(clippy::assertions_on_constants)]
fn keyboard_velocity_is_a_valid_note_on() {
    assert!(KEYBOARD_VELOCITY > 0 && KEYBOARD_VELOCITY <= 127);
}

#[test]
fn raw_messages_reach_subscribers_in_order() {
    let bus = EventBus::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    let _sub = bus.subscribe(move |ev| s.borrow_mut().push(*ev));
    let stream: &[&[u8]] = &[
        &[0x90, 60, 100],
        &[0xF8],
        &[0xB0, 1, 64],
        &[0x90, 60, 0],
        &[0x85, 61, 10],
    ];
    for bytes in stream {
        if let Some(ev) = MidiEvent::from_bytes(bytes) {
            bus.publish(ev);
        }
    }
    let seen = seen.borrow();
    assert_eq!(seen.len(), 4);
    assert!(seen[0].is_note_on());
    assert!(matches!(
        seen[1],
        MidiEvent::ControlChange {
            controller: 1,
            value: 64,
            ..
        }
    ));
    assert!(seen[2].is_note_off());
    assert_eq!(seen[3].channel(), 5);
}
