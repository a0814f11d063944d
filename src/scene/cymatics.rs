//! Chladni-plate cymatics. The mode numbers (n, m) morph smoothly towards the
//! values driven by the mappings; cells near a nodal line are lit, as sand
//! gathers there on a vibrating plate.

use crate::constants::*;
use crate::mapping::{EventCursor, ResolvedParams, Target};
use crate::scene::Scene;
use crate::state::PerformanceState;
use crate::surface::{Rgba, SharedRaster, Surface};
use crate::tween::{Easing, Tween};
use std::f32::consts::PI;

const MORPH_SEC: f32 = 0.6;

/// Plate displacement at normalized coordinates for modes `n`, `m`.
#[inline]
pub fn chladni(n: f32, m: f32, x: f32, y: f32) -> f32 {
    (n * PI * x).cos() * (m * PI * y).cos() - (m * PI * x).cos() * (n * PI * y).cos()
}

pub struct CymaticsScene {
    surface: Option<SharedRaster>,
    width: f32,
    height: f32,
    cols: usize,
    rows: usize,
    field: Vec<f32>,
    mode_n: Tween,
    mode_m: Tween,
    pulse: Tween,
    fade: Tween,
    context_lost: bool,
}

impl CymaticsScene {
    pub fn new() -> Self {
        Self {
            surface: None,
            width: 0.0,
            height: 0.0,
            cols: 0,
            rows: 0,
            field: Vec::new(),
            mode_n: Tween::new(3.0),
            mode_m: Tween::new(5.0),
            pulse: Tween::new(0.0),
            fade: Tween::new(1.0),
            context_lost: false,
        }
    }

    pub fn grid_size(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    pub fn modes(&self) -> (f32, f32) {
        (self.mode_n.value(), self.mode_m.value())
    }

    fn fill_field(&mut self) {
        let (n, m) = self.modes();
        let (cols, rows) = (self.cols.max(1), self.rows.max(1));
        for (i, v) in self.field.iter_mut().enumerate() {
            let x = ((i % cols) as f32 + 0.5) / cols as f32;
            let y = ((i / cols) as f32 + 0.5) / rows as f32;
            *v = chladni(n, m, x, y);
        }
    }
}

impl Default for CymaticsScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for CymaticsScene {
    fn init(&mut self, surface: &Surface, width: u32, height: u32) {
        let Some(raster) = surface.as_raster() else {
            log::warn!("cymatics: expected a raster surface");
            return;
        };
        self.surface = Some(raster);
        self.resize(width, height);
        log::info!("cymatics: init {width}x{height}, {}x{} cells", self.cols, self.rows);
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
        let n = params.get_or(Target::X, 3.0).round().max(1.0);
        let m = params.get_or(Target::Y, 5.0).round().max(1.0);
        let intensity = params.get_or(Target::Intensity, 0.6);
        let hue = params.get_or(Target::Hue, 0.6);

        self.mode_n.animate_to(n, MORPH_SEC, Easing::SineInOut);
        self.mode_m.animate_to(m, MORPH_SEC, Easing::SineInOut);
        if cursor.has_new_note_on(state) {
            self.pulse.set(1.0);
            self.pulse.animate_to(0.0, FLASH_DECAY_SEC * 2.0, Easing::QuadOut);
        }
        self.mode_n.advance(dt_sec);
        self.mode_m.advance(dt_sec);
        let pulse = self.pulse.advance(dt_sec);
        let fade = self.fade.advance(dt_sec);
        self.fill_field();

        let Ok(mut s) = surface.try_borrow_mut() else {
            return;
        };
        let Some(ctx) = s.context() else {
            if !self.context_lost {
                log::warn!("cymatics: 2D context lost, skipping draws");
                self.context_lost = true;
            }
            return;
        };
        if self.context_lost {
            log::info!("cymatics: 2D context restored");
            self.context_lost = false;
        }

        ctx.clear(Rgba::rgb(CLEAR_RGB));
        if self.cols == 0 || self.rows == 0 {
            return;
        }
        let cw = self.width / self.cols as f32;
        let ch = self.height / self.rows as f32;
        // Nodal band widens with the onset pulse.
        let band = 0.12 + 0.25 * pulse;
        for (i, v) in self.field.iter().enumerate() {
            let a = v.abs();
            if a > band {
                continue;
            }
            let level = (1.0 - a / band) * intensity;
            let color = Rgba::hsl(hue, 0.6, 0.2 + 0.6 * level, fade * level.max(0.15));
            ctx.fill_rect(
                (i % self.cols) as f32 * cw,
                (i / self.cols) as f32 * ch,
                cw.ceil(),
                ch.ceil(),
                color,
            );
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width as f32;
        self.height = height as f32;
        let mut cols = (width / CYMATICS_CELL_PX).max(1) as usize;
        let mut rows = (height / CYMATICS_CELL_PX).max(1) as usize;
        while cols * rows > CYMATICS_MAX_CELLS {
            cols = (cols / 2).max(1);
            rows = (rows / 2).max(1);
        }
        self.cols = cols;
        self.rows = rows;
        self.field.clear();
        self.field.resize(cols * rows, 0.0);
    }

    fn release(&mut self) {
        self.fade
            .animate_to(0.0, (SCENE_SWITCH_SETTLE_MS / 1000.0) as f32, Easing::Linear);
    }

    fn dispose(&mut self) {
        for t in [
            &mut self.mode_n,
            &mut self.mode_m,
            &mut self.pulse,
            &mut self.fade,
        ] {
            t.cancel();
        }
        self.surface = None;
        self.field = Vec::new();
        log::info!("cymatics: disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chladni_is_antisymmetric_in_modes() {
        let a = chladni(2.0, 5.0, 0.3, 0.7);
        let b = chladni(5.0, 2.0, 0.3, 0.7);
        assert!((a + b).abs() < 1e-5);
    }

    #[test]
    fn equal_modes_give_a_flat_plate() {
        assert!(chladni(4.0, 4.0, 0.21, 0.83).abs() < 1e-6);
    }
}
