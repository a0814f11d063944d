//! Normalized MIDI events and the bus that fans them out to subscribers.
//!
//! The bus is deliberately tiny: `subscribe` returns a [`Subscription`] that
//! detaches the callback when dropped or when `unsubscribe` is called, and
//! `publish` delivers synchronously in arrival order.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A single channel-voice message after normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiEvent {
    /// Parse a raw channel-voice message (status byte plus two data bytes).
    ///
    /// Returns `None` for system messages, truncated input and message
    /// kinds the pipeline does not consume (pitch bend, aftertouch, ...).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if status < 0x80 || status >= 0xF0 || data.len() < 2 {
            return None;
        }
        let channel = status & 0x0F;
        let (d1, d2) = (data[0] & 0x7F, data[1] & 0x7F);
        match status & 0xF0 {
            0x90 => Some(MidiEvent::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            }),
            0x80 => Some(MidiEvent::NoteOff { channel, note: d1 }),
            0xB0 => Some(MidiEvent::ControlChange {
                channel,
                controller: d1,
                value: d2,
            }),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. } => channel,
        }
    }

    /// Note-on with velocity 0 counts as a release.
    #[inline]
    pub fn is_note_off(&self) -> bool {
        matches!(
            self,
            MidiEvent::NoteOff { .. } | MidiEvent::NoteOn { velocity: 0, .. }
        )
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self, MidiEvent::NoteOn { velocity, .. } if *velocity > 0)
    }
}

type Callback = Rc<RefCell<dyn FnMut(&MidiEvent)>>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(u64, Callback)>,
}

/// Single-threaded event bus. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl FnMut(&MidiEvent) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push((id, Rc::new(RefCell::new(callback))));
        Subscription {
            bus: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver one event to every subscriber.
    ///
    /// The subscriber list is snapshotted first so callbacks may subscribe or
    /// unsubscribe while being dispatched.
    pub fn publish(&self, event: MidiEvent) {
        let targets: SmallVec<[Callback; 4]> = match self.inner.try_borrow() {
            Ok(inner) => inner.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => return,
        };
        for cb in targets {
            if let Ok(mut f) = cb.try_borrow_mut() {
                f(&event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

/// Handle returned by [`EventBus::subscribe`]; detaches on drop.
pub struct Subscription {
    bus: Weak<RefCell<BusInner>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if let Ok(mut inner) = bus.try_borrow_mut() {
                inner.subscribers.retain(|(id, _)| *id != self.id);
            };
        }
    }
}

/// Velocity used for computer-keyboard notes.
pub const KEYBOARD_VELOCITY: u8 = 100;

/// Map a QWERTY key to a semitone offset from the base C.
///
/// Home row plays white keys (`a` = C ... `k` = upper C), the row above plays
/// the black keys.
#[inline]
pub fn semitone_for_key(key: &str) -> Option<u8> {
    match key {
        "a" | "A" => Some(0),
        "w" | "W" => Some(1),
        "s" | "S" => Some(2),
        "e" | "E" => Some(3),
        "d" | "D" => Some(4),
        "f" | "F" => Some(5),
        "t" | "T" => Some(6),
        "g" | "G" => Some(7),
        "y" | "Y" => Some(8),
        "h" | "H" => Some(9),
        "u" | "U" => Some(10),
        "j" | "J" => Some(11),
        "k" | "K" => Some(12),
        _ => None,
    }
}

/// Octave shift requested by a key: `z` down, `x` up.
#[inline]
pub fn octave_shift_for_key(key: &str) -> Option<i8> {
    match key {
        "z" | "Z" => Some(-1),
        "x" | "X" => Some(1),
        _ => None,
    }
}

/// MIDI note for a key given the current octave (4 = middle C), if in range.
pub fn note_for_key(key: &str, octave: i8) -> Option<u8> {
    let semi = semitone_for_key(key)? as i32;
    let note = (octave as i32 + 1) * 12 + semi;
    (0..=127).contains(&note).then_some(note as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn parses_channel_voice_messages() {
        assert_eq!(
            MidiEvent::from_bytes(&[0x91, 60, 100]),
            Some(MidiEvent::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiEvent::from_bytes(&[0x80, 60, 0]),
            Some(MidiEvent::NoteOff { channel: 0, note: 60 })
        );
        assert_eq!(
            MidiEvent::from_bytes(&[0xB3, 7, 90]),
            Some(MidiEvent::ControlChange {
                channel: 3,
                controller: 7,
                value: 90
            })
        );
    }

    #[test]
    fn rejects_system_and_truncated_messages() {
        assert_eq!(MidiEvent::from_bytes(&[]), None);
        assert_eq!(MidiEvent::from_bytes(&[0xF8]), None);
        assert_eq!(MidiEvent::from_bytes(&[0x90, 60]), None);
        assert_eq!(MidiEvent::from_bytes(&[0xE0, 0, 64]), None);
        assert_eq!(MidiEvent::from_bytes(&[0x40, 1, 2]), None);
    }

    #[test]
    fn velocity_zero_note_on_is_release() {
        let ev = MidiEvent::from_bytes(&[0x90, 64, 0]).unwrap();
        assert!(ev.is_note_off());
        assert!(!ev.is_note_on());
    }

    #[test]
    fn dropping_subscription_detaches() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = bus.subscribe(move |_| h.set(h.get() + 1));
        bus.publish(MidiEvent::NoteOff { channel: 0, note: 1 });
        drop(sub);
        bus.publish(MidiEvent::NoteOff { channel: 0, note: 1 });
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn keyboard_layout_covers_an_octave() {
        assert_eq!(note_for_key("a", 4), Some(60));
        assert_eq!(note_for_key("K", 4), Some(72));
        assert_eq!(note_for_key("w", 4), Some(61));
        assert_eq!(note_for_key("q", 4), None);
        assert_eq!(note_for_key("k", 9), None);
    }
}
