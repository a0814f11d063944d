//! Pulse grid: one cell per MIDI note, an octave per row. Cells light while
//! held and flash on each onset.

use crate::constants::*;
use crate::mapping::{EventCursor, ResolvedParams, Target};
use crate::scene::Scene;
use crate::state::PerformanceState;
use crate::surface::{Rgba, SharedRaster, Surface};
use crate::tween::{Easing, Tween};

pub struct PulseGridScene {
    surface: Option<SharedRaster>,
    width: f32,
    height: f32,
    levels: [Tween; MIDI_NOTE_COUNT],
    fade: Tween,
    context_lost: bool,
}

impl PulseGridScene {
    pub fn new() -> Self {
        Self {
            surface: None,
            width: 0.0,
            height: 0.0,
            levels: [Tween::new(0.0); MIDI_NOTE_COUNT],
            fade: Tween::new(1.0),
            context_lost: false,
        }
    }

    pub fn level(&self, note: u8) -> f32 {
        self.levels
            .get(note as usize)
            .map(|t| t.value())
            .unwrap_or(0.0)
    }

    pub fn animating(&self) -> usize {
        self.levels.iter().filter(|t| t.is_active()).count() + self.fade.is_active() as usize
    }
}

impl Default for PulseGridScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for PulseGridScene {
    fn init(&mut self, surface: &Surface, width: u32, height: u32) {
        let Some(raster) = surface.as_raster() else {
            log::warn!("grid: expected a raster surface");
            return;
        };
        self.surface = Some(raster);
        self.resize(width, height);
        log::info!("grid: init {width}x{height}");
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
        let brightness = params.get_or(Target::Brightness, 0.8);
        let hue = params.get_or(Target::Hue, 0.55);
        let fill = params.get_or(Target::Size, 0.85).clamp(0.1, 1.0);
        let saturation = params.get_or(Target::Saturation, 0.7);

        let onset = cursor
            .has_new_note_on(state)
            .then_some(state.last_note_on)
            .flatten();
        if let Some(on) = onset {
            if let Some(t) = self.levels.get_mut(on.note as usize) {
                t.set(1.0);
            }
        }
        for (note, t) in self.levels.iter_mut().enumerate() {
            let held = state.active_notes.contains(note as u8);
            let target = if held { brightness * 0.6 } else { 0.0 };
            let duration = if held { FLASH_DECAY_SEC } else { FLASH_DECAY_SEC * 2.0 };
            t.animate_to(target, duration, Easing::QuadOut);
            t.advance(dt_sec);
        }
        let fade = self.fade.advance(dt_sec);

        let Ok(mut s) = surface.try_borrow_mut() else {
            return;
        };
        let Some(ctx) = s.context() else {
            if !self.context_lost {
                log::warn!("grid: 2D context lost, skipping draws");
                self.context_lost = true;
            }
            return;
        };
        if self.context_lost {
            log::info!("grid: 2D context restored");
            self.context_lost = false;
        }

        ctx.clear(Rgba::rgb(CLEAR_RGB));
        let cw = self.width / GRID_COLUMNS as f32;
        let ch = self.height / GRID_ROWS as f32;
        let inset_x = cw * (1.0 - fill) * 0.5;
        let inset_y = ch * (1.0 - fill) * 0.5;
        for (note, t) in self.levels.iter().enumerate() {
            let col = note % GRID_COLUMNS;
            // Lowest octave at the bottom.
            let row = GRID_ROWS - 1 - note / GRID_COLUMNS;
            let level = t.value();
            let color = Rgba::hsl(
                hue + col as f32 / GRID_COLUMNS as f32 * 0.25,
                saturation,
                0.08 + 0.55 * level,
                fade,
            );
            ctx.fill_rect(
                col as f32 * cw + inset_x,
                row as f32 * ch + inset_y,
                cw - 2.0 * inset_x,
                ch - 2.0 * inset_y,
                color,
            );
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width as f32;
        self.height = height as f32;
    }

    fn release(&mut self) {
        self.fade
            .animate_to(0.0, (SCENE_SWITCH_SETTLE_MS / 1000.0) as f32, Easing::Linear);
    }

    fn dispose(&mut self) {
        self.levels.iter_mut().for_each(Tween::cancel);
        self.fade.cancel();
        self.surface = None;
        log::info!("grid: disposed");
    }
}
