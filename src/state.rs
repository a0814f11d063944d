//! The performance snapshot shared between the accumulator (writer) and the
//! render loop (reader).
//!
//! Every container here is fixed-size or bounded so the snapshot never grows
//! with the length of a performance.

use crate::constants::{INITIAL_CENTROID, MIDI_CC_COUNT, MIDI_NOTE_COUNT};
use crate::midi::MidiEvent;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Shared handle to the one snapshot an accumulator owns.
pub type SharedState = Rc<RefCell<PerformanceState>>;

/// A currently held note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveNote {
    pub velocity: u8,
    pub start_ms: f64,
    pub channel: u8,
}

/// Held notes keyed by note number.
#[derive(Clone, Debug)]
pub struct ActiveNotes {
    slots: [Option<ActiveNote>; MIDI_NOTE_COUNT],
    len: usize,
}

impl Default for ActiveNotes {
    fn default() -> Self {
        Self {
            slots: [None; MIDI_NOTE_COUNT],
            len: 0,
        }
    }
}

impl ActiveNotes {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, note: u8) -> Option<&ActiveNote> {
        self.slots.get(note as usize).and_then(|s| s.as_ref())
    }

    #[inline]
    pub fn contains(&self, note: u8) -> bool {
        self.get(note).is_some()
    }

    /// Insert or overwrite; returns the previous entry.
    pub fn insert(&mut self, note: u8, entry: ActiveNote) -> Option<ActiveNote> {
        let slot = self.slots.get_mut(note as usize)?;
        let prev = slot.replace(entry);
        if prev.is_none() {
            self.len += 1;
        }
        prev
    }

    pub fn remove(&mut self, note: u8) -> Option<ActiveNote> {
        let prev = self.slots.get_mut(note as usize)?.take();
        if prev.is_some() {
            self.len -= 1;
        }
        prev
    }

    /// Held notes in ascending pitch order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &ActiveNote)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|n| (i as u8, n)))
    }
}

/// One note in the history ring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryEntry {
    pub note: u8,
    pub velocity: u8,
    pub onset_ms: f64,
    pub duration_ms: f64,
    pub released: bool,
}

/// Fixed-capacity ring of recent notes; the newest overwrites the oldest.
#[derive(Clone, Debug)]
pub struct NoteHistory {
    entries: Vec<HistoryEntry>,
    capacity: usize,
    head: usize,
}

impl NoteHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else {
            self.entries[self.head] = entry;
        }
        self.head = (self.head + 1) % self.capacity;
    }

    /// Newest first.
    pub fn iter_recent(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        let n = self.entries.len();
        let head = self.head;
        let cap = self.capacity;
        (0..n).map(move |k| &self.entries[(head + cap - 1 - k) % cap])
    }

    /// Close the most recent unreleased entry for `note`.
    pub fn mark_released(&mut self, note: u8, released_ms: f64) -> bool {
        let n = self.entries.len();
        for k in 0..n {
            let idx = (self.head + self.capacity - 1 - k) % self.capacity;
            let e = &mut self.entries[idx];
            if e.note == note && !e.released {
                e.released = true;
                e.duration_ms = (released_ms - e.onset_ms).max(0.0);
                return true;
            }
        }
        false
    }
}

/// The most recent note-on, kept for "pitch now" and "velocity now" queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteOnInfo {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub time_ms: f64,
}

/// Live, in-place mutated performance state.
#[derive(Clone, Debug)]
pub struct PerformanceState {
    pub active_notes: ActiveNotes,
    pub note_history: NoteHistory,
    pub polyphony: usize,
    /// Onsets per second over the trailing window.
    pub density: f32,
    pub centroid: f32,
    pub cc_values: [Option<u8>; MIDI_CC_COUNT],
    pub last_event: Option<MidiEvent>,
    pub last_event_id: u64,
    pub last_note_on: Option<NoteOnInfo>,
    pub last_note_on_id: u64,
    pub recent_onsets: VecDeque<f64>,
    pub last_update_ms: f64,
}

impl PerformanceState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            active_notes: ActiveNotes::default(),
            note_history: NoteHistory::with_capacity(history_capacity),
            polyphony: 0,
            density: 0.0,
            centroid: INITIAL_CENTROID,
            cc_values: [None; MIDI_CC_COUNT],
            last_event: None,
            last_event_id: 0,
            last_note_on: None,
            last_note_on_id: 0,
            recent_onsets: VecDeque::with_capacity(64),
            last_update_ms: 0.0,
        }
    }

    #[inline]
    pub fn cc(&self, controller: u8) -> Option<u8> {
        self.cc_values.get(controller as usize).copied().flatten()
    }

    /// Mean velocity of held notes, if any.
    pub fn mean_active_velocity(&self) -> Option<f32> {
        if self.active_notes.is_empty() {
            return None;
        }
        let sum: u32 = self.active_notes.iter().map(|(_, n)| n.velocity as u32).sum();
        Some(sum as f32 / self.active_notes.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(note: u8, onset_ms: f64) -> HistoryEntry {
        HistoryEntry {
            note,
            velocity: 90,
            onset_ms,
            duration_ms: 0.0,
            released: false,
        }
    }

    #[test]
    fn history_overwrites_oldest() {
        let mut h = NoteHistory::with_capacity(3);
        for n in 0..5u8 {
            h.push(entry(n, n as f64));
        }
        let notes: Vec<u8> = h.iter_recent().map(|e| e.note).collect();
        assert_eq!(notes, vec![4, 3, 2]);
    }

    #[test]
    fn mark_released_hits_newest_open_entry() {
        let mut h = NoteHistory::with_capacity(4);
        h.push(entry(60, 0.0));
        h.push(entry(60, 100.0));
        assert!(h.mark_released(60, 150.0));
        let newest = h.iter_recent().next().unwrap();
        assert!(newest.released);
        assert_eq!(newest.duration_ms, 50.0);
        assert!(!h.mark_released(61, 200.0));
    }

    #[test]
    fn active_notes_track_len() {
        let mut a = ActiveNotes::default();
        let n = ActiveNote {
            velocity: 10,
            start_ms: 0.0,
            channel: 0,
        };
        a.insert(60, n);
        a.insert(60, n);
        a.insert(200, n);
        assert_eq!(a.len(), 1);
        assert!(a.remove(61).is_none());
        assert!(a.remove(60).is_some());
        assert!(a.is_empty());
    }
}
