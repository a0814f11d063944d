//! GPU particle field.
//!
//! Particles live in a fixed pool allocated at `init`; spawning recycles the
//! oldest slot round-robin, so per-frame work is bounded by the pool size no
//! matter how dense the performance gets. Each note-on (seen once through
//! the event cursor) fires a burst at an x position derived from its pitch;
//! held notes emit a steady trickle.

use crate::camera::Camera;
use crate::constants::*;
use crate::mapping::{EventCursor, ResolvedParams, Target};
use crate::scene::Scene;
use crate::state::PerformanceState;
use crate::surface::{BufferId, Instance, Rgba, SharedVector, Surface};
use crate::tween::{Easing, Tween};
use glam::Vec3;
use rand::prelude::*;

#[derive(Clone, Copy, Debug, Default)]
struct Particle {
    pos: Vec3,
    vel: Vec3,
    age: f32,
    life: f32,
    size: f32,
    hue_offset: f32,
    alive: bool,
}

pub struct ParticleScene {
    surface: Option<SharedVector>,
    buffer: Option<BufferId>,
    buffer_generation: u64,
    camera: Camera,
    pool: Vec<Particle>,
    instances: Vec<Instance>,
    next_slot: usize,
    rng: StdRng,
    emit_accum: f32,
    emit_cursor: usize,
    spin: f32,
    flash: Tween,
    fade: Tween,
    releasing: bool,
    context_lost: bool,
}

impl ParticleScene {
    pub fn new(seed: u64) -> Self {
        Self {
            surface: None,
            buffer: None,
            buffer_generation: 0,
            camera: Camera::default(),
            pool: Vec::new(),
            instances: Vec::new(),
            next_slot: 0,
            rng: StdRng::seed_from_u64(seed),
            emit_accum: 0.0,
            emit_cursor: 0,
            spin: 0.0,
            flash: Tween::new(0.0),
            fade: Tween::new(1.0),
            releasing: false,
            context_lost: false,
        }
    }

    /// Number of particles currently alive.
    pub fn alive_count(&self) -> usize {
        self.pool.iter().filter(|p| p.alive).count()
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool.len()
    }

    pub fn flash_level(&self) -> f32 {
        self.flash.value()
    }

    fn spawn(&mut self, origin: Vec3, spread: f32, size: f32) {
        if self.pool.is_empty() {
            return;
        }
        let slot = self.next_slot;
        self.next_slot = (self.next_slot + 1) % self.pool.len();
        let dir = Vec3::new(
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-0.4..1.0),
            self.rng.gen_range(-1.0..1.0),
        )
        .normalize_or_zero();
        let speed = self.rng.gen_range(0.4..1.2) * spread;
        self.pool[slot] = Particle {
            pos: origin,
            vel: dir * speed,
            age: 0.0,
            life: PARTICLE_LIFETIME_SEC * self.rng.gen_range(0.6..1.0),
            size: size * self.rng.gen_range(0.7..1.3),
            hue_offset: self.rng.gen_range(-0.05..0.05),
            alive: true,
        };
    }

    fn note_origin(note: u8, spread: f32) -> Vec3 {
        let x = (note as f32 / MIDI_MAX_VALUE - 0.5) * 4.0 * spread;
        Vec3::new(x, -0.5, 0.0)
    }

    /// Make sure the instance buffer belongs to the surface's current device.
    fn ensure_buffer(&mut self, surface: &SharedVector) -> Option<BufferId> {
        let Ok(mut s) = surface.try_borrow_mut() else {
            return None;
        };
        if s.is_lost() {
            if !self.context_lost {
                log::warn!("particles: GPU context lost, skipping draws");
                self.context_lost = true;
            }
            return None;
        }
        let generation = s.generation();
        if self.buffer.is_none() || generation != self.buffer_generation {
            if self.context_lost {
                log::info!("particles: GPU context restored, rebuilding buffers");
            }
            // A buffer from an older generation died with its device.
            self.buffer = s.create_instance_buffer(self.pool.len());
            self.buffer_generation = generation;
        }
        self.context_lost = false;
        self.buffer
    }
}

impl Scene for ParticleScene {
    fn init(&mut self, surface: &Surface, width: u32, height: u32) {
        let Some(vector) = surface.as_vector() else {
            log::warn!("particles: expected a vector surface");
            return;
        };
        self.pool = vec![Particle::default(); PARTICLE_POOL_SIZE];
        self.instances = Vec::with_capacity(PARTICLE_POOL_SIZE);
        self.camera.set_viewport(width, height);
        self.buffer = None;
        self.surface = Some(vector.clone());
        self.ensure_buffer(&vector);
        log::info!("particles: init {width}x{height}, pool {PARTICLE_POOL_SIZE}");
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
        let hue = params.get_or(Target::Hue, 0.6);
        let size = params.get_or(Target::Size, 0.1);
        let speed = params.get_or(Target::Speed, 1.0);
        let spread = params.get_or(Target::Spread, 1.0);
        let intensity = params.get_or(Target::Intensity, 0.0);
        let rotation = params.get_or(Target::Rotation, 0.2);
        let saturation = params.get_or(Target::Saturation, 0.8);

        if !self.releasing {
            let fresh = cursor
                .has_new_note_on(state)
                .then_some(state.last_note_on)
                .flatten();
            if let Some(on) = fresh {
                let v = on.velocity as f32 / MIDI_MAX_VALUE;
                let count = PARTICLE_BURST_MIN
                    + ((PARTICLE_BURST_MAX - PARTICLE_BURST_MIN) as f32 * v) as usize;
                let origin = Self::note_origin(on.note, spread);
                for _ in 0..count {
                    self.spawn(origin, spread, size);
                }
            }
            if intensity > 0.0 {
                self.flash.set(intensity.max(self.flash.value()));
                self.flash.animate_to(0.0, FLASH_DECAY_SEC, Easing::QuadOut);
            }

            // Steady emission from held notes, round-robin over them.
            let held = (state.polyphony as f32 / POLYPHONY_SATURATION).min(1.0);
            self.emit_accum += PARTICLE_EMIT_PER_SEC * held * dt_sec;
            let mut budget = self.emit_accum.floor() as usize;
            self.emit_accum -= budget as f32;
            while budget > 0 && state.polyphony > 0 {
                let pick = self.emit_cursor % state.polyphony;
                self.emit_cursor = self.emit_cursor.wrapping_add(1);
                if let Some((note, _)) = state.active_notes.iter().nth(pick) {
                    self.spawn(Self::note_origin(note, spread), spread * 0.5, size * 0.7);
                }
                budget -= 1;
            }
        }
        self.flash.advance(dt_sec);
        let fade = self.fade.advance(dt_sec);

        let step = dt_sec * speed;
        let drag = (-0.8 * dt_sec).exp();
        self.instances.clear();
        for p in self.pool.iter_mut().filter(|p| p.alive) {
            p.age += dt_sec;
            if p.age >= p.life {
                p.alive = false;
                continue;
            }
            p.vel *= drag;
            p.vel.y += 0.15 * step;
            p.pos += p.vel * step;
            let t = p.age / p.life;
            let color = Rgba::hsl(
                hue + p.hue_offset,
                saturation,
                0.5 + 0.35 * self.flash.value(),
                (1.0 - t) * fade,
            );
            self.instances.push(Instance {
                position: p.pos.to_array(),
                size: p.size * (1.0 - 0.5 * t),
                color: color.to_array(),
            });
        }

        self.spin += rotation * dt_sec;
        self.camera.orbit(self.spin, 0.8);

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
        self.releasing = true;
        self.fade
            .animate_to(0.0, (SCENE_SWITCH_SETTLE_MS / 1000.0) as f32, Easing::QuadOut);
    }

    fn dispose(&mut self) {
        self.flash.cancel();
        self.fade.cancel();
        if let (Some(surface), Some(buffer)) = (self.surface.take(), self.buffer.take()) {
            if let Ok(mut s) = surface.try_borrow_mut() {
                if s.generation() == self.buffer_generation {
                    s.destroy_buffer(buffer);
                }
            };
        }
        self.pool.iter_mut().for_each(|p| p.alive = false);
        log::info!("particles: disposed");
    }
}
