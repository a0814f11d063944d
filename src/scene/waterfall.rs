//! Piano-roll waterfall drawn from the note history ring. Notes appear at the
//! top edge and fall as they age; work per frame is bounded by the ring
//! capacity.

use crate::constants::*;
use crate::mapping::{EventCursor, ResolvedParams, Target};
use crate::scene::Scene;
use crate::state::PerformanceState;
use crate::surface::{Rgba, SharedRaster, Surface};
use crate::tween::{Easing, Tween};

const KEY_STRIP_PX: f32 = 10.0;

pub struct WaterfallScene {
    surface: Option<SharedRaster>,
    width: f32,
    height: f32,
    clock_ms: f64,
    seen_update_ms: f64,
    flash: Tween,
    flash_note: u8,
    fade: Tween,
    context_lost: bool,
}

impl WaterfallScene {
    pub fn new() -> Self {
        Self {
            surface: None,
            width: 0.0,
            height: 0.0,
            clock_ms: 0.0,
            seen_update_ms: f64::NEG_INFINITY,
            flash: Tween::new(0.0),
            flash_note: 0,
            fade: Tween::new(1.0),
            context_lost: false,
        }
    }

    /// Follow the accumulator's clock when it moves, extrapolate with frame
    /// time when it does not.
    fn advance_clock(&mut self, state: &PerformanceState, dt_sec: f32) {
        if state.last_update_ms != self.seen_update_ms {
            self.seen_update_ms = state.last_update_ms;
            self.clock_ms = self.clock_ms.max(state.last_update_ms);
        } else {
            self.clock_ms += dt_sec as f64 * 1000.0;
        }
    }
}

impl Default for WaterfallScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for WaterfallScene {
    fn init(&mut self, surface: &Surface, width: u32, height: u32) {
        let Some(raster) = surface.as_raster() else {
            log::warn!("waterfall: expected a raster surface");
            return;
        };
        self.surface = Some(raster);
        self.resize(width, height);
        log::info!("waterfall: init {width}x{height}");
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
        let speed = params.get_or(Target::Speed, 1.0);
        let hue = params.get_or(Target::Hue, 0.6);
        let brightness = params.get_or(Target::Brightness, 0.0);
        let saturation = params.get_or(Target::Saturation, 0.7);

        self.advance_clock(state, dt_sec);
        if cursor.has_new_note_on(state) {
            if let Some(on) = state.last_note_on {
                self.flash_note = on.note;
                self.flash.set(brightness.max(0.5));
                self.flash.animate_to(0.0, FLASH_DECAY_SEC, Easing::QuadOut);
            }
        }
        let flash = self.flash.advance(dt_sec);
        let fade = self.fade.advance(dt_sec);

        let Ok(mut s) = surface.try_borrow_mut() else {
            return;
        };
        let Some(ctx) = s.context() else {
            if !self.context_lost {
                log::warn!("waterfall: 2D context lost, skipping draws");
                self.context_lost = true;
            }
            return;
        };
        if self.context_lost {
            log::info!("waterfall: 2D context restored");
            self.context_lost = false;
        }

        ctx.clear(Rgba::rgb(CLEAR_RGB));
        let lane = self.width / MIDI_NOTE_COUNT as f32;
        let px_per_ms = WATERFALL_PX_PER_SEC * speed / 1000.0;
        let now = self.clock_ms;
        for e in state.note_history.iter_recent() {
            let bottom = KEY_STRIP_PX + ((now - e.onset_ms) as f32 * px_per_ms);
            if bottom < 0.0 {
                continue;
            }
            let top = if e.released {
                KEY_STRIP_PX + ((now - e.onset_ms - e.duration_ms) as f32 * px_per_ms)
            } else {
                KEY_STRIP_PX
            };
            if top > self.height {
                // Older entries only sit lower.
                continue;
            }
            let v = e.velocity as f32 / MIDI_MAX_VALUE;
            let color = Rgba::hsl(
                hue + e.note as f32 / MIDI_NOTE_COUNT as f32 * 0.3,
                saturation,
                0.3 + 0.35 * v,
                fade,
            );
            ctx.fill_rect(
                e.note as f32 * lane,
                top,
                lane.max(1.0),
                (bottom - top).max(2.0),
                color,
            );
        }

        for (note, n) in state.active_notes.iter() {
            let mut l = 0.45 + 0.3 * (n.velocity as f32 / MIDI_MAX_VALUE);
            if note == self.flash_note {
                l += 0.25 * flash;
            }
            ctx.fill_rect(
                note as f32 * lane,
                0.0,
                lane.max(1.0),
                KEY_STRIP_PX,
                Rgba::hsl(hue, saturation, l, fade),
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
        self.flash.cancel();
        self.fade.cancel();
        self.surface = None;
        log::info!("waterfall: disposed");
    }
}
