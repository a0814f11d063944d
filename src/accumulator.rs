//! Turns the asynchronous MIDI event stream into the shared
//! [`PerformanceState`] snapshot.
//!
//! All mutation goes through [`Accumulator::on_event`], the deferred-removal
//! path ([`Accumulator::fire_due`]) and the idle [`Accumulator::tick`].
//! Derived metrics are recomputed at the end of each of those, so readers
//! never see a half-updated snapshot.

use crate::config::AccumulatorConfig;
use crate::constants::{MIDI_CC_COUNT, MIDI_NOTE_COUNT};
use crate::midi::{EventBus, MidiEvent, Subscription};
use crate::state::{ActiveNote, HistoryEntry, NoteOnInfo, PerformanceState, SharedState};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Monotonic event id generator.
///
/// Cloning shares the counter, so several accumulators can draw ids from a
/// single sequence when they must be comparable.
#[derive(Clone, Debug, Default)]
pub struct SequenceCounter(Rc<Cell<u64>>);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id; the first call returns 1 so 0 can mean "nothing yet".
    pub fn next_id(&self) -> u64 {
        let id = self.0.get() + 1;
        self.0.set(id);
        id
    }

    pub fn current(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Clone, Copy, Debug)]
struct PendingRelease {
    deadline_ms: f64,
    released_ms: f64,
}

pub struct Accumulator {
    config: AccumulatorConfig,
    state: SharedState,
    sequence: SequenceCounter,
    pending: [Option<PendingRelease>; MIDI_NOTE_COUNT],
    subscription: Option<Subscription>,
    torn_down: bool,
}

impl Accumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self::with_sequence(config, SequenceCounter::new())
    }

    /// An invalid `config` is replaced by the defaults.
    pub fn with_sequence(config: AccumulatorConfig, sequence: SequenceCounter) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("accumulator config rejected ({e}); using defaults");
                AccumulatorConfig::default()
            }
        };
        let state = Rc::new(RefCell::new(PerformanceState::new(config.history_capacity)));
        Self {
            config,
            state,
            sequence,
            pending: [None; MIDI_NOTE_COUNT],
            subscription: None,
            torn_down: false,
        }
    }

    /// The live snapshot. The returned handle stays valid (and keeps
    /// observing updates) for the accumulator's whole lifetime.
    pub fn snapshot(&self) -> SharedState {
        self.state.clone()
    }

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Subscribe `this` to `bus`, timestamping each event with `clock` (ms).
    pub fn attach(this: &Rc<RefCell<Self>>, bus: &EventBus, clock: impl Fn() -> f64 + 'static) {
        let weak = Rc::downgrade(this);
        let sub = bus.subscribe(move |ev| {
            let Some(acc) = weak.upgrade() else {
                return;
            };
            // A reentrant delivery would find the accumulator borrowed; drop it.
            if let Ok(mut acc) = acc.try_borrow_mut() {
                acc.on_event(*ev, clock());
            };
        });
        if let Ok(mut acc) = this.try_borrow_mut() {
            acc.subscription = Some(sub);
        }
    }

    /// Sole mutation entrypoint for incoming events. Never fails.
    pub fn on_event(&mut self, event: MidiEvent, now_ms: f64) {
        if self.torn_down {
            return;
        }
        match event {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } if velocity > 0 => self.note_on(event, channel, note, velocity, now_ms),
            MidiEvent::NoteOn { note, .. } | MidiEvent::NoteOff { note, .. } => {
                self.note_off(event, note, now_ms)
            }
            MidiEvent::ControlChange {
                controller, value, ..
            } => self.control_change(event, controller, value, now_ms),
        }
    }

    fn note_on(&mut self, event: MidiEvent, channel: u8, note: u8, velocity: u8, now_ms: f64) {
        if note as usize >= MIDI_NOTE_COUNT || velocity > 127 {
            self.recompute_derived(now_ms);
            return;
        }
        let deferred = self.pending[note as usize].take();
        let id = self.sequence.next_id();
        let Ok(mut st) = self.state.try_borrow_mut() else {
            return;
        };
        // Retrigger: close the previous sounding of this note first.
        if st.active_notes.contains(note) {
            let released_ms = deferred.map_or(now_ms, |p| p.released_ms);
            st.note_history.mark_released(note, released_ms);
        }
        st.active_notes.insert(
            note,
            ActiveNote {
                velocity,
                start_ms: now_ms,
                channel,
            },
        );
        st.note_history.push(HistoryEntry {
            note,
            velocity,
            onset_ms: now_ms,
            duration_ms: 0.0,
            released: false,
        });
        st.recent_onsets.push_back(now_ms);
        st.last_event = Some(event);
        st.last_event_id = id;
        st.last_note_on = Some(NoteOnInfo {
            channel,
            note,
            velocity,
            time_ms: now_ms,
        });
        st.last_note_on_id = id;
        drop(st);
        self.recompute_derived(now_ms);
    }

    fn note_off(&mut self, event: MidiEvent, note: u8, now_ms: f64) {
        let held = self
            .state
            .try_borrow()
            .ok()
            .and_then(|st| st.active_notes.get(note).copied());
        let Some(active) = held else {
            // Release for a note we never saw: nothing to undo.
            self.recompute_derived(now_ms);
            return;
        };
        if self.pending[note as usize].is_some() {
            // Already releasing; keep the original deadline.
            self.recompute_derived(now_ms);
            return;
        }
        let id = self.sequence.next_id();
        if let Ok(mut st) = self.state.try_borrow_mut() {
            st.last_event = Some(event);
            st.last_event_id = id;
        }
        let held_ms = now_ms - active.start_ms;
        if held_ms < self.config.min_hold_ms {
            let deadline_ms = active.start_ms + self.config.min_hold_ms;
            log::trace!("deferring release of {note} until {deadline_ms:.1}ms");
            self.pending[note as usize] = Some(PendingRelease {
                deadline_ms,
                released_ms: now_ms,
            });
        } else {
            self.finalize_release(note, now_ms);
        }
        self.recompute_derived(now_ms);
    }

    fn control_change(&mut self, event: MidiEvent, controller: u8, value: u8, now_ms: f64) {
        if controller as usize >= MIDI_CC_COUNT || value > 127 {
            self.recompute_derived(now_ms);
            return;
        }
        let id = self.sequence.next_id();
        if let Ok(mut st) = self.state.try_borrow_mut() {
            st.cc_values[controller as usize] = Some(value);
            st.last_event = Some(event);
            st.last_event_id = id;
        }
        self.recompute_derived(now_ms);
    }

    fn finalize_release(&mut self, note: u8, released_ms: f64) {
        if let Ok(mut st) = self.state.try_borrow_mut() {
            if st.active_notes.remove(note).is_some() {
                st.note_history.mark_released(note, released_ms);
            }
        }
    }

    /// Recompute polyphony, onset density and centroid.
    ///
    /// Cost is O(active notes + onsets in the window). The centroid keeps its
    /// previous value while nothing is held.
    pub fn recompute_derived(&mut self, now_ms: f64) {
        let window_ms = self.config.density_window_ms;
        let Ok(mut st) = self.state.try_borrow_mut() else {
            return;
        };
        st.polyphony = st.active_notes.len();

        let cutoff = now_ms - window_ms;
        while st.recent_onsets.front().is_some_and(|&t| t < cutoff) {
            st.recent_onsets.pop_front();
        }
        st.density = (st.recent_onsets.len() as f64 * 1000.0 / window_ms) as f32;

        if !st.active_notes.is_empty() {
            let (weighted, total) = st
                .active_notes
                .iter()
                .fold((0.0f32, 0.0f32), |(w, t), (note, n)| {
                    let v = n.velocity as f32;
                    (w + note as f32 * v, t + v)
                });
            if total > 0.0 {
                st.centroid = weighted / total;
            }
        }
        st.last_update_ms = now_ms;
    }

    /// Run every deferred release whose deadline has passed.
    ///
    /// Returns how many notes were released.
    pub fn fire_due(&mut self, now_ms: f64) -> usize {
        if self.torn_down {
            return 0;
        }
        let mut due: SmallVec<[(u8, f64); 8]> = SmallVec::new();
        for (note, slot) in self.pending.iter_mut().enumerate() {
            if let Some(p) = slot {
                if p.deadline_ms <= now_ms {
                    due.push((note as u8, p.released_ms));
                    *slot = None;
                }
            }
        }
        if due.is_empty() {
            return 0;
        }
        for &(note, released_ms) in &due {
            self.finalize_release(note, released_ms);
        }
        self.recompute_derived(now_ms);
        due.len()
    }

    /// Earliest pending release deadline, for arming a timer.
    pub fn next_deadline(&self) -> Option<f64> {
        self.pending
            .iter()
            .flatten()
            .map(|p| p.deadline_ms)
            .reduce(f64::min)
    }

    pub fn pending_releases(&self) -> usize {
        self.pending.iter().flatten().count()
    }

    /// Idle maintenance: run due releases and slide the onset window so
    /// density decays while no events arrive.
    pub fn tick(&mut self, now_ms: f64) {
        if self.torn_down {
            return;
        }
        if self.fire_due(now_ms) == 0 {
            self.recompute_derived(now_ms);
        }
    }

    /// Cancel pending releases and detach from the bus. Later calls to any
    /// entrypoint are no-ops.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        let cancelled = self.pending_releases();
        self.pending = [None; MIDI_NOTE_COUNT];
        self.subscription = None;
        self.torn_down = true;
        log::info!("accumulator torn down ({cancelled} pending releases cancelled)");
    }
}
