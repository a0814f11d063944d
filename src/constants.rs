//! Accumulator, mapper and render-loop tuning constants.
//!
//! These constants express intended behavior (time windows, normalization
//! ceilings, clamp limits) and keep magic numbers out of the code. Runtime
//! overrides live in `config.rs`.

// Number of addressable MIDI notes / controllers
pub const MIDI_NOTE_COUNT: usize = 128;
pub const MIDI_CC_COUNT: usize = 128;
pub const MIDI_MAX_VALUE: f32 = 127.0;

// Minimum time a note stays active before a note-off may remove it (ms)
pub const MIN_NOTE_HOLD_MS: f64 = 80.0;

// Trailing window used to count onsets for density (ms)
pub const DENSITY_WINDOW_MS: f64 = 1000.0;

// Ring buffer size for recent notes (trails, waterfall)
pub const NOTE_HISTORY_CAPACITY: usize = 64;

// Centroid reported before any note has ever been played (middle C)
pub const INITIAL_CENTROID: f32 = 60.0;

// Normalization ceilings for the mapper
pub const DENSITY_SATURATION_NPS: f32 = 20.0; // onsets/sec that map to 1.0
pub const POLYPHONY_SATURATION: f32 = 10.0; // simultaneous notes that map to 1.0

// Frame timing
pub const MAX_FRAME_DT_MS: f64 = 100.0; // clamp after stalls (tab switch, GC, debugger)

// Delay granted to an outgoing scene's release animation before dispose (ms)
pub const SCENE_SWITCH_SETTLE_MS: f64 = 250.0;

// Particle field
pub const PARTICLE_POOL_SIZE: usize = 2048;
pub const PARTICLE_BURST_MIN: usize = 12;
pub const PARTICLE_BURST_MAX: usize = 64;
pub const PARTICLE_LIFETIME_SEC: f32 = 2.4;
pub const PARTICLE_EMIT_PER_SEC: f32 = 240.0; // at intensity 1 with notes held

// Orbit field
pub const ORBIT_TRAIL_LEN: usize = 8;
pub const ORBIT_MAX_BODIES: usize = 32;

// Raster scenes
pub const GRID_COLUMNS: usize = 12; // one octave per row
pub const GRID_ROWS: usize = 11; // ceil(128 / 12)
pub const CYMATICS_CELL_PX: u32 = 12;
pub const CYMATICS_MAX_CELLS: usize = 160 * 120;
pub const WATERFALL_PX_PER_SEC: f32 = 120.0;
pub const FLASH_DECAY_SEC: f32 = 0.35;

// Camera shared by the vector scenes
pub const CAMERA_Z: f32 = 6.0;
pub const CAMERA_FOVY: f32 = std::f32::consts::FRAC_PI_4;

// Background colour for every scene
pub const CLEAR_RGB: [f32; 3] = [0.03, 0.04, 0.08];
