//! Declarative source → curve → range mapping from performance state to
//! visual parameters.
//!
//! [`resolve`] is a pure function of its inputs. Trigger bookkeeping lives in
//! the caller-owned [`EventCursor`]; the mapper only reads it.

use crate::constants::{DENSITY_SATURATION_NPS, MIDI_MAX_VALUE, POLYPHONY_SATURATION};
use crate::state::PerformanceState;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Source {
    Pitch,
    Velocity,
    Density,
    Polyphony,
    Centroid,
    Cc,
    NoteOn,
    NoteOff,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Curve {
    #[default]
    Linear,
    Exponential,
    Logarithmic,
}

impl Curve {
    /// Shape a normalized value. Input is clamped to [0, 1] first; NaN reads
    /// as 0.
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        match self {
            Curve::Linear => x,
            Curve::Exponential => x * x,
            Curve::Logarithmic => x.sqrt(),
        }
    }
}

/// Visual parameter names a rule may drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    Hue,
    Size,
    Speed,
    Spread,
    Intensity,
    Rotation,
    X,
    Y,
    Z,
    Brightness,
    Saturation,
}

impl Target {
    pub const COUNT: usize = 11;
    pub const ALL: [Target; Target::COUNT] = [
        Target::Hue,
        Target::Size,
        Target::Speed,
        Target::Spread,
        Target::Intensity,
        Target::Rotation,
        Target::X,
        Target::Y,
        Target::Z,
        Target::Brightness,
        Target::Saturation,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Target::Hue => "hue",
            Target::Size => "size",
            Target::Speed => "speed",
            Target::Spread => "spread",
            Target::Intensity => "intensity",
            Target::Rotation => "rotation",
            Target::X => "x",
            Target::Y => "y",
            Target::Z => "z",
            Target::Brightness => "brightness",
            Target::Saturation => "saturation",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    pub source: Source,
    pub target: Target,
    pub range: [f32; 2],
    #[serde(default)]
    pub curve: Curve,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc_number: Option<u8>,
}

impl MappingRule {
    pub const fn new(source: Source, target: Target, min: f32, max: f32, curve: Curve) -> Self {
        Self {
            source,
            target,
            range: [min, max],
            curve,
            cc_number: None,
        }
    }

    pub const fn cc(controller: u8, target: Target, min: f32, max: f32, curve: Curve) -> Self {
        Self {
            source: Source::Cc,
            target,
            range: [min, max],
            curve,
            cc_number: Some(controller),
        }
    }

    /// `min + shaped * (max - min)`; an inverted range maps in reverse.
    #[inline]
    pub fn scale(&self, shaped: f32) -> f32 {
        let [min, max] = self.range;
        min + shaped * (max - min)
    }
}

/// Per-consumer record of which events have already been reacted to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventCursor {
    pub event_id: u64,
    pub note_on_id: u64,
}

impl EventCursor {
    /// A cursor that treats everything already in `state` as consumed.
    pub fn caught_up(state: &PerformanceState) -> Self {
        Self {
            event_id: state.last_event_id,
            note_on_id: state.last_note_on_id,
        }
    }

    #[inline]
    pub fn has_new_note_on(&self, state: &PerformanceState) -> bool {
        state.last_note_on.is_some() && state.last_note_on_id > self.note_on_id
    }

    /// Mark everything currently visible in `state` as consumed.
    pub fn advance(&mut self, state: &PerformanceState) {
        self.event_id = self.event_id.max(state.last_event_id);
        self.note_on_id = self.note_on_id.max(state.last_note_on_id);
    }
}

/// Per-frame output: one optional value per [`Target`]. Reused across frames.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResolvedParams {
    values: [Option<f32>; Target::COUNT],
}

impl ResolvedParams {
    #[inline]
    pub fn get(&self, target: Target) -> Option<f32> {
        self.values[target.index()]
    }

    #[inline]
    pub fn get_or(&self, target: Target, default: f32) -> f32 {
        self.get(target).unwrap_or(default)
    }

    #[inline]
    pub fn set(&mut self, target: Target, value: f32) {
        self.values[target.index()] = Some(value);
    }

    pub fn clear(&mut self) {
        self.values = [None; Target::COUNT];
    }

    pub fn iter(&self) -> impl Iterator<Item = (Target, f32)> + '_ {
        Target::ALL
            .iter()
            .filter_map(|&t| self.get(t).map(|v| (t, v)))
    }
}

/// Raw, unshaped value in [0, 1] for one source.
pub fn source_value(
    source: Source,
    cc_number: Option<u8>,
    state: &PerformanceState,
    cursor: &EventCursor,
) -> f32 {
    let v = match source {
        Source::Pitch => match state.last_note_on {
            Some(n) => n.note as f32 / MIDI_MAX_VALUE,
            None => state.centroid / MIDI_MAX_VALUE,
        },
        Source::Velocity => match state.last_note_on {
            Some(n) => n.velocity as f32 / MIDI_MAX_VALUE,
            None => state.mean_active_velocity().unwrap_or(0.0) / MIDI_MAX_VALUE,
        },
        Source::Density => (state.density / DENSITY_SATURATION_NPS).min(1.0),
        Source::Polyphony => (state.polyphony as f32 / POLYPHONY_SATURATION).min(1.0),
        Source::Centroid => state.centroid / MIDI_MAX_VALUE,
        Source::Cc => {
            let raw = cc_number.and_then(|c| state.cc(c)).unwrap_or(0);
            raw as f32 / MIDI_MAX_VALUE
        }
        Source::NoteOn => {
            if cursor.has_new_note_on(state) {
                1.0
            } else {
                0.0
            }
        }
        Source::NoteOff => match state.last_event {
            Some(ev) if ev.is_note_off() => 1.0,
            _ => 0.0,
        },
    };
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

/// Apply `rules` in order into `out`; later rules win for the same target.
pub fn resolve_into(
    state: &PerformanceState,
    rules: &[MappingRule],
    cursor: &EventCursor,
    out: &mut ResolvedParams,
) {
    out.clear();
    for rule in rules {
        let raw = source_value(rule.source, rule.cc_number, state, cursor);
        let shaped = rule.curve.apply(raw);
        out.set(rule.target, rule.scale(shaped));
    }
}

pub fn resolve_with_cursor(
    state: &PerformanceState,
    rules: &[MappingRule],
    cursor: &EventCursor,
) -> ResolvedParams {
    let mut out = ResolvedParams::default();
    resolve_into(state, rules, cursor, &mut out);
    out
}

/// Resolve with a fresh cursor: `noteOn` reports whether any note-on has
/// been seen at all.
pub fn resolve(state: &PerformanceState, rules: &[MappingRule]) -> ResolvedParams {
    resolve_with_cursor(state, rules, &EventCursor::default())
}
