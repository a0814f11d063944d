//! MIDI-to-visual pipeline.
//!
//! MIDI events are folded into a shared [`state::PerformanceState`] by the
//! [`accumulator`]; every frame the [`host`] resolves the active scene's
//! mapping rules against that state and hands the result to the scene. The
//! core is plain Rust and testable on the host; the browser glue (WebGPU,
//! Canvas 2D, Web MIDI, the animation frame loop) lives in `web` and only
//! builds for `wasm32`.

pub mod accumulator;
pub mod camera;
pub mod config;
pub mod constants;
pub mod host;
pub mod mapping;
pub mod midi;
pub mod scene;
pub mod state;
pub mod surface;
pub mod tween;

#[cfg(target_arch = "wasm32")]
mod web;

pub use accumulator::{Accumulator, SequenceCounter};
pub use config::{AccumulatorConfig, ConfigError, HostConfig, MappingConfig};
pub use host::{HostPhase, RenderHost};
pub use mapping::{resolve, Curve, EventCursor, MappingRule, ResolvedParams, Source, Target};
pub use midi::{EventBus, MidiEvent, Subscription};
pub use scene::{Scene, SceneMeta, REGISTRY};
pub use state::{PerformanceState, SharedState};
pub use surface::{RendererKind, Surface, SurfaceProvider};
