//! Rendering surfaces the host provisions for scenes.
//!
//! Two kinds exist: a raster surface exposing 2D drawing calls and a vector
//! surface exposing instanced GPU draws. Both may lose their context at any
//! time; raster surfaces then hand out no context, vector surfaces report
//! `is_lost` and bump their generation once they are usable again.

use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt::Write;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RendererKind {
    /// GPU / 3D surface
    Vector,
    /// 2D canvas surface
    Raster,
}

/// Linear RGBA colour with components in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(rgb: [f32; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2], 1.0)
    }

    /// `h` wraps in [0, 1); `s` and `l` are clamped.
    pub fn hsl(h: f32, s: f32, l: f32, a: f32) -> Self {
        let h = h.rem_euclid(1.0) * 6.0;
        let s = s.clamp(0.0, 1.0);
        let l = l.clamp(0.0, 1.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        Self::new(r + m, g + m, b + m, a.clamp(0.0, 1.0))
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Channels quantized to 8 bits, clamped to [0, 1] first.
    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    /// Replace the contents of `out` with the CSS `rgba()` form.
    pub fn write_css(self, out: &mut String) {
        let [r, g, b, a] = self.to_rgba8();
        out.clear();
        _ = write!(out, "rgba({r},{g},{b},{:.3})", a as f32 / 255.0);
    }
}

/// Immediate-mode 2D drawing calls (canvas coordinates in pixels).
pub trait Canvas2d {
    fn clear(&mut self, color: Rgba);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba);
}

pub trait RasterSurface {
    fn size(&self) -> (u32, u32);
    fn set_size(&mut self, width: u32, height: u32);
    /// `None` while the context is lost or could not be created.
    fn context(&mut self) -> Option<&mut dyn Canvas2d>;
}

/// Per-instance data for the billboard pipeline.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Instance {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 4],
}

pub type BufferId = u32;

pub trait VectorSurface {
    fn size(&self) -> (u32, u32);
    fn set_size(&mut self, width: u32, height: u32);
    fn is_lost(&self) -> bool;
    /// Incremented every time the underlying device is recreated; buffers
    /// made under an older generation are gone.
    fn generation(&self) -> u64;
    fn create_instance_buffer(&mut self, capacity: usize) -> Option<BufferId>;
    fn write_instances(&mut self, buffer: BufferId, instances: &[Instance]);
    fn destroy_buffer(&mut self, buffer: BufferId);
    fn draw(&mut self, buffer: BufferId, count: u32, view_proj: Mat4, clear: Rgba);
}

pub type SharedRaster = Rc<RefCell<dyn RasterSurface>>;
pub type SharedVector = Rc<RefCell<dyn VectorSurface>>;

#[derive(Clone)]
pub enum Surface {
    Raster(SharedRaster),
    Vector(SharedVector),
}

impl Surface {
    pub fn kind(&self) -> RendererKind {
        match self {
            Surface::Raster(_) => RendererKind::Raster,
            Surface::Vector(_) => RendererKind::Vector,
        }
    }

    pub fn set_size(&self, width: u32, height: u32) {
        match self {
            Surface::Raster(s) => {
                if let Ok(mut s) = s.try_borrow_mut() {
                    s.set_size(width, height);
                }
            }
            Surface::Vector(s) => {
                if let Ok(mut s) = s.try_borrow_mut() {
                    s.set_size(width, height);
                }
            }
        }
    }

    pub fn as_raster(&self) -> Option<SharedRaster> {
        match self {
            Surface::Raster(s) => Some(s.clone()),
            Surface::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<SharedVector> {
        match self {
            Surface::Vector(s) => Some(s.clone()),
            Surface::Raster(_) => None,
        }
    }

    /// True when both handles point at the same underlying surface.
    pub fn ptr_eq(&self, other: &Surface) -> bool {
        match (self, other) {
            (Surface::Raster(a), Surface::Raster(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (Surface::Vector(a), Surface::Vector(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

/// Creates and destroys surfaces on behalf of the host.
pub trait SurfaceProvider {
    /// Whether `acquire` can ever succeed for `kind` on this platform.
    fn supports(&self, _kind: RendererKind) -> bool {
        true
    }
    fn acquire(&mut self, kind: RendererKind, width: u32, height: u32) -> Option<Surface>;
    fn release(&mut self, surface: Surface);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsl_primaries() {
        let red = Rgba::hsl(0.0, 1.0, 0.5, 1.0);
        assert!((red.r - 1.0).abs() < 1e-5 && red.g.abs() < 1e-5 && red.b.abs() < 1e-5);
        let blue = Rgba::hsl(2.0 / 3.0, 1.0, 0.5, 1.0);
        assert!(blue.b > 0.99 && blue.r < 1e-4);
        let wrapped = Rgba::hsl(1.0, 1.0, 0.5, 1.0);
        assert_eq!(wrapped, red);
    }

    #[test]
    fn css_is_quantized_and_reuses_the_buffer() {
        let mut css = String::with_capacity(32);
        Rgba::new(1.0, 0.0, 0.0, 0.5).write_css(&mut css);
        assert_eq!(css, "rgba(255,0,0,0.502)");
        let cap = css.capacity();
        Rgba::new(2.0, -1.0, 0.2, 1.0).write_css(&mut css);
        assert_eq!(css, "rgba(255,0,51,1.000)");
        assert_eq!(css.capacity(), cap);
    }

    #[test]
    fn nearby_colours_share_a_style_key() {
        let a = Rgba::new(0.5, 0.25, 0.75, 1.0);
        let b = Rgba::new(0.5005, 0.2501, 0.7499, 1.0);
        assert_eq!(a.to_rgba8(), b.to_rgba8());
        assert_ne!(a.to_rgba8(), a.with_alpha(0.5).to_rgba8());
    }

    #[test]
    fn instance_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Instance>(), 32);
    }
}
