//! Orbit field: every held note becomes a body circling the origin, with
//! radius from pitch and a short fixed-length trail.

use crate::camera::Camera;
use crate::constants::*;
use crate::mapping::{EventCursor, ResolvedParams, Target};
use crate::scene::Scene;
use crate::state::PerformanceState;
use crate::surface::{BufferId, Instance, Rgba, SharedVector, Surface};
use crate::tween::{Easing, Tween};
use glam::Vec3;

#[derive(Clone, Copy, Debug, Default)]
struct Body {
    note: u8,
    angle: f32,
    radius: Tween,
    glow: Tween,
    trail: [Vec3; ORBIT_TRAIL_LEN],
    trail_head: usize,
    live: bool,
}

pub struct OrbitScene {
    surface: Option<SharedVector>,
    buffer: Option<BufferId>,
    buffer_generation: u64,
    camera: Camera,
    bodies: [Body; ORBIT_MAX_BODIES],
    instances: Vec<Instance>,
    fade: Tween,
}

impl OrbitScene {
    pub fn new() -> Self {
        Self {
            surface: None,
            buffer: None,
            buffer_generation: 0,
            camera: Camera::default(),
            bodies: [Body::default(); ORBIT_MAX_BODIES],
            instances: Vec::new(),
            fade: Tween::new(1.0),
        }
    }

    fn capacity() -> usize {
        ORBIT_MAX_BODIES * (ORBIT_TRAIL_LEN + 1)
    }

    pub fn live_bodies(&self) -> usize {
        self.bodies.iter().filter(|b| b.live).count()
    }

    /// Bring the body set in line with the held notes.
    fn sync_bodies(&mut self, state: &PerformanceState, spread: f32) {
        for body in self.bodies.iter_mut().filter(|b| b.live) {
            if !state.active_notes.contains(body.note) {
                body.live = false;
                body.radius.cancel();
                body.glow.cancel();
            }
        }
        for (note, active) in state.active_notes.iter() {
            if self.bodies.iter().any(|b| b.live && b.note == note) {
                continue;
            }
            let Some(slot) = self.bodies.iter_mut().find(|b| !b.live) else {
                break;
            };
            let target_r = 0.6 + (note as f32 / MIDI_MAX_VALUE) * 2.0 * spread;
            *slot = Body {
                note,
                angle: note as f32 * 0.7,
                radius: Tween::new(0.0),
                glow: Tween::new(active.velocity as f32 / MIDI_MAX_VALUE),
                trail: [Vec3::ZERO; ORBIT_TRAIL_LEN],
                trail_head: 0,
                live: true,
            };
            slot.radius.animate_to(target_r, 0.4, Easing::CubicInOut);
            slot.glow.animate_to(0.3, 1.2, Easing::QuadOut);
        }
    }

    fn ensure_buffer(&mut self, surface: &SharedVector) -> Option<BufferId> {
        let mut s = surface.try_borrow_mut().ok()?;
        if s.is_lost() {
            return None;
        }
        let generation = s.generation();
        if self.buffer.is_none() || generation != self.buffer_generation {
            self.buffer = s.create_instance_buffer(Self::capacity());
            self.buffer_generation = generation;
        }
        self.buffer
    }
}

impl Default for OrbitScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for OrbitScene {
    fn init(&mut self, surface: &Surface, width: u32, height: u32) {
        let Some(vector) = surface.as_vector() else {
            log::warn!("orbits: expected a vector surface");
            return;
        };
        self.instances = Vec::with_capacity(Self::capacity());
        self.camera.set_viewport(width, height);
        self.camera.orbit(0.0, 2.5);
        self.surface = Some(vector.clone());
        self.ensure_buffer(&vector);
        log::info!("orbits: init {width}x{height}");
    }

    fn update(
        &mut self,
        params: &ResolvedParams,
        state: &PerformanceState,
        dt_sec: f32,
        cursor: &EventCursor,
    ) {
        let Some(surface) = self.surface.clone() else {
            return;
        };
        let hue = params.get_or(Target::Hue, 0.5);
        let speed = params.get_or(Target::Speed, 1.0);
        let spread = params.get_or(Target::Spread, 1.0);
        let size = params.get_or(Target::Size, 0.12);
        let lift = params.get_or(Target::Y, 0.0);
        let brightness = params.get_or(Target::Brightness, 0.6);

        self.sync_bodies(state, spread);
        if cursor.has_new_note_on(state) {
            if let Some(on) = state.last_note_on {
                if let Some(b) = self.bodies.iter_mut().find(|b| b.live && b.note == on.note) {
                    b.glow.set(1.0);
                    b.glow.animate_to(0.3, 1.2, Easing::QuadOut);
                }
            }
        }
        let fade = self.fade.advance(dt_sec);

        self.instances.clear();
        for b in self.bodies.iter_mut().filter(|b| b.live) {
            let r = b.radius.advance(dt_sec);
            let glow = b.glow.advance(dt_sec);
            // Inner orbits turn faster.
            b.angle += dt_sec * speed * (1.6 / r.max(0.3));
            let pos = Vec3::new(r * b.angle.cos(), lift, r * b.angle.sin());
            b.trail[b.trail_head] = pos;
            b.trail_head = (b.trail_head + 1) % ORBIT_TRAIL_LEN;

            let base = Rgba::hsl(hue + b.note as f32 / 240.0, 0.75, 0.35 + brightness * glow, fade);
            self.instances.push(Instance {
                position: pos.to_array(),
                size: size * (1.0 + glow),
                color: base.to_array(),
            });
            for k in 1..ORBIT_TRAIL_LEN {
                let idx = (b.trail_head + ORBIT_TRAIL_LEN - 1 - k) % ORBIT_TRAIL_LEN;
                let age = k as f32 / ORBIT_TRAIL_LEN as f32;
                self.instances.push(Instance {
                    position: b.trail[idx].to_array(),
                    size: size * (1.0 - age) * 0.6,
                    color: base.with_alpha(fade * (1.0 - age) * 0.5).to_array(),
                });
            }
        }

        let Some(buffer) = self.ensure_buffer(&surface) else {
            return;
        };
        if let Ok(mut s) = surface.try_borrow_mut() {
            s.write_instances(buffer, &self.instances);
            s.draw(
                buffer,
                self.instances.len() as u32,
                self.camera.view_proj(),
                Rgba::rgb(CLEAR_RGB),
            );
        };
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
    }

    fn release(&mut self) {
        self.fade
            .animate_to(0.0, (SCENE_SWITCH_SETTLE_MS / 1000.0) as f32, Easing::Linear);
    }

    fn dispose(&mut self) {
        self.fade.cancel();
        for b in self.bodies.iter_mut() {
            b.radius.cancel();
            b.glow.cancel();
            b.live = false;
        }
        if let (Some(surface), Some(buffer)) = (self.surface.take(), self.buffer.take()) {
            if let Ok(mut s) = surface.try_borrow_mut() {
                if s.generation() == self.buffer_generation {
                    s.destroy_buffer(buffer);
                }
            };
        }
        log::info!("orbits: disposed");
    }
}
