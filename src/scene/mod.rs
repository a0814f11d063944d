//! Scene lifecycle contract and the static scene registry.
//!
//! Metadata is kept apart from construction so a UI can list scenes (and
//! their default mappings) without allocating any GPU or canvas resources.
//! Instances are one-shot: [`create_scene`] builds a fresh one per
//! activation and a disposed instance is never re-initialized.

use crate::mapping::{Curve, EventCursor, MappingRule, ResolvedParams, Source, Target};
use crate::state::PerformanceState;
use crate::surface::{RendererKind, Surface};
use serde::Serialize;

mod cymatics;
mod grid;
mod orbits;
mod particles;
mod waterfall;

pub use cymatics::CymaticsScene;
pub use grid::PulseGridScene;
pub use orbits::OrbitScene;
pub use particles::ParticleScene;
pub use waterfall::WaterfallScene;

pub trait Scene {
    /// Allocate every rendering resource for a surface of the given size.
    fn init(&mut self, surface: &Surface, width: u32, height: u32);

    /// Advance one frame. Must do bounded work and must not panic if the
    /// surface context is gone.
    fn update(
        &mut self,
        params: &ResolvedParams,
        state: &PerformanceState,
        dt_sec: f32,
        cursor: &EventCursor,
    );

    /// Reallocate size-dependent buffers.
    fn resize(&mut self, width: u32, height: u32);

    /// Start the outgoing animation ahead of a switch. `update` keeps being
    /// called until the host disposes the scene.
    fn release(&mut self) {}

    /// Free GPU buffers and cancel every animation owned by the scene.
    fn dispose(&mut self);
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub renderer: RendererKind,
    pub default_mappings: &'static [MappingRule],
    pub targets: &'static [Target],
}

impl SceneMeta {
    pub fn supports(&self, target: Target) -> bool {
        self.targets.contains(&target)
    }
}

const PARTICLE_MAPPINGS: &[MappingRule] = &[
    MappingRule::new(Source::Pitch, Target::Hue, 0.0, 1.0, Curve::Linear),
    MappingRule::new(Source::Velocity, Target::Size, 0.04, 0.22, Curve::Exponential),
    MappingRule::new(Source::Density, Target::Speed, 0.6, 2.5, Curve::Logarithmic),
    MappingRule::new(Source::Polyphony, Target::Spread, 0.4, 2.4, Curve::Linear),
    MappingRule::new(Source::NoteOn, Target::Intensity, 0.0, 1.0, Curve::Linear),
    MappingRule::cc(1, Target::Rotation, 0.0, 1.5, Curve::Linear),
];

const ORBIT_MAPPINGS: &[MappingRule] = &[
    MappingRule::new(Source::Centroid, Target::Hue, 0.0, 1.0, Curve::Linear),
    MappingRule::new(Source::Density, Target::Speed, 0.3, 3.0, Curve::Exponential),
    MappingRule::new(Source::Polyphony, Target::Spread, 1.0, 2.6, Curve::Logarithmic),
    MappingRule::new(Source::Velocity, Target::Size, 0.06, 0.25, Curve::Linear),
    MappingRule::cc(1, Target::Y, -0.8, 0.8, Curve::Linear),
];

const WATERFALL_MAPPINGS: &[MappingRule] = &[
    MappingRule::new(Source::Density, Target::Speed, 0.6, 2.0, Curve::Linear),
    MappingRule::new(Source::Centroid, Target::Hue, 0.0, 1.0, Curve::Linear),
    MappingRule::new(Source::NoteOn, Target::Brightness, 0.0, 1.0, Curve::Linear),
    MappingRule::cc(74, Target::Saturation, 0.3, 1.0, Curve::Logarithmic),
];

const CYMATICS_MAPPINGS: &[MappingRule] = &[
    MappingRule::new(Source::Pitch, Target::X, 1.0, 9.0, Curve::Linear),
    MappingRule::new(Source::Centroid, Target::Y, 1.0, 9.0, Curve::Linear),
    MappingRule::new(Source::Velocity, Target::Intensity, 0.2, 1.0, Curve::Logarithmic),
    MappingRule::new(Source::Pitch, Target::Hue, 0.5, 0.9, Curve::Linear),
];

const GRID_MAPPINGS: &[MappingRule] = &[
    MappingRule::new(Source::Velocity, Target::Brightness, 0.3, 1.0, Curve::Logarithmic),
    MappingRule::new(Source::Centroid, Target::Hue, 0.0, 1.0, Curve::Linear),
    MappingRule::new(Source::Density, Target::Size, 0.7, 1.0, Curve::Linear),
    MappingRule::cc(1, Target::Saturation, 0.4, 1.0, Curve::Linear),
];

pub static REGISTRY: [SceneMeta; 5] = [
    SceneMeta {
        id: "particles",
        name: "Particle Field",
        renderer: RendererKind::Vector,
        default_mappings: PARTICLE_MAPPINGS,
        targets: &[
            Target::Hue,
            Target::Size,
            Target::Speed,
            Target::Spread,
            Target::Intensity,
            Target::Rotation,
            Target::Saturation,
        ],
    },
    SceneMeta {
        id: "orbits",
        name: "Orbit Field",
        renderer: RendererKind::Vector,
        default_mappings: ORBIT_MAPPINGS,
        targets: &[
            Target::Hue,
            Target::Speed,
            Target::Spread,
            Target::Size,
            Target::Y,
            Target::Brightness,
        ],
    },
    SceneMeta {
        id: "waterfall",
        name: "Piano Roll Waterfall",
        renderer: RendererKind::Raster,
        default_mappings: WATERFALL_MAPPINGS,
        targets: &[
            Target::Speed,
            Target::Hue,
            Target::Brightness,
            Target::Saturation,
        ],
    },
    SceneMeta {
        id: "cymatics",
        name: "Cymatics",
        renderer: RendererKind::Raster,
        default_mappings: CYMATICS_MAPPINGS,
        targets: &[Target::X, Target::Y, Target::Intensity, Target::Hue],
    },
    SceneMeta {
        id: "grid",
        name: "Pulse Grid",
        renderer: RendererKind::Raster,
        default_mappings: GRID_MAPPINGS,
        targets: &[
            Target::Brightness,
            Target::Hue,
            Target::Size,
            Target::Saturation,
        ],
    },
];

pub fn find_meta(id: &str) -> Option<&'static SceneMeta> {
    REGISTRY.iter().find(|m| m.id == id)
}

/// Build a fresh instance of a registered scene.
pub fn create_scene(id: &str) -> Option<Box<dyn Scene>> {
    let scene: Box<dyn Scene> = match id {
        "particles" => Box::new(ParticleScene::new(0x5EED_0001)),
        "orbits" => Box::new(OrbitScene::new()),
        "waterfall" => Box::new(WaterfallScene::new()),
        "cymatics" => Box::new(CymaticsScene::new()),
        "grid" => Box::new(PulseGridScene::new()),
        _ => return None,
    };
    Some(scene)
}
