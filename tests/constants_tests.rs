// Host-side sanity checks on the tuning constants and their relationships.

use midi_viz::constants::*;

#[test]
#[allow(clippy::assertions_on_constants)]
fn midi_ranges_are_consistent() {
    assert_eq!(MIDI_NOTE_COUNT, 128);
    assert_eq!(MIDI_CC_COUNT, 128);
    assert_eq!(MIDI_MAX_VALUE as usize, MIDI_NOTE_COUNT - 1);
    assert!(INITIAL_CENTROID >= 0.0 && INITIAL_CENTROID <= MIDI_MAX_VALUE);
}

#[test]
#[allow(clippy::assertions_on_constants)]
fn timing_constants_are_positive() {
    assert!(MIN_NOTE_HOLD_MS > 0.0);
    assert!(DENSITY_WINDOW_MS > 0.0);
    assert!(MAX_FRAME_DT_MS > 0.0);
    assert!(SCENE_SWITCH_SETTLE_MS >= 0.0);
    // The debounce must be far shorter than the density window.
    assert!(MIN_NOTE_HOLD_MS < DENSITY_WINDOW_MS);
}

#[test]
#[allow(clippy::assertions_on_constants)]
fn saturation_points_are_positive() {
    assert!(DENSITY_SATURATION_NPS > 0.0);
    assert!(POLYPHONY_SATURATION > 0.0);
}

#[test]
#[allow(clippy::assertions_on_constants)]
fn scene_budgets_are_bounded() {
    assert!(PARTICLE_BURST_MIN <= PARTICLE_BURST_MAX);
    assert!(PARTICLE_BURST_MAX <= PARTICLE_POOL_SIZE);
    assert!(PARTICLE_LIFETIME_SEC > 0.0);
    assert!(ORBIT_MAX_BODIES > 0 && ORBIT_TRAIL_LEN > 1);
    assert!(CYMATICS_CELL_PX > 0);
    assert!(CYMATICS_MAX_CELLS > 0);
    assert!(FLASH_DECAY_SEC > 0.0);
}

#[test]
fn grid_covers_every_note() {
    assert!(GRID_COLUMNS * GRID_ROWS >= MIDI_NOTE_COUNT);
    assert!(GRID_COLUMNS * (GRID_ROWS - 1) < MIDI_NOTE_COUNT);
}

#[test]
fn clear_colour_is_normalized() {
    for c in CLEAR_RGB {
        assert!((0.0..=1.0).contains(&c));
    }
}
