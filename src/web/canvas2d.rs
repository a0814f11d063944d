//! Raster surface backed by a `<canvas>` 2D context.

use super::dom::EventListener;
use crate::surface::{Canvas2d, RasterSurface, Rgba};
use std::cell::Cell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use web_sys as web;

struct Ctx2d {
    ctx: web::CanvasRenderingContext2d,
    width: f64,
    height: f64,
    /// Quantized colour currently set as `fillStyle`.
    fill: Option<[u8; 4]>,
    css: String,
}

impl Ctx2d {
    fn new(ctx: web::CanvasRenderingContext2d, width: f64, height: f64) -> Self {
        Self {
            ctx,
            width,
            height,
            fill: None,
            css: String::with_capacity(32),
        }
    }

    /// Set `fillStyle` only when the quantized colour changes.
    fn set_fill(&mut self, color: Rgba) {
        let key = color.to_rgba8();
        if self.fill == Some(key) {
            return;
        }
        color.write_css(&mut self.css);
        self.ctx.set_fill_style_str(&self.css);
        self.fill = Some(key);
    }
}

impl Canvas2d for Ctx2d {
    fn clear(&mut self, color: Rgba) {
        self.ctx.clear_rect(0.0, 0.0, self.width, self.height);
        self.set_fill(color);
        self.ctx.fill_rect(0.0, 0.0, self.width, self.height);
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba) {
        self.set_fill(color);
        self.ctx.fill_rect(x as f64, y as f64, w as f64, h as f64);
    }
}

pub struct CanvasRaster {
    canvas: web::HtmlCanvasElement,
    ctx: Option<Ctx2d>,
    lost: Rc<Cell<bool>>,
    restored: Rc<Cell<bool>>,
    _listeners: [EventListener; 2],
}

impl CanvasRaster {
    pub fn new(canvas: web::HtmlCanvasElement) -> Self {
        let lost = Rc::new(Cell::new(false));
        let restored = Rc::new(Cell::new(false));
        let on_lost = lost.clone();
        let on_restored = lost.clone();
        let mark_restored = restored.clone();
        let target: &web::EventTarget = canvas.as_ref();
        let listeners = [
            EventListener::new(target, "contextlost", move |_| {
                log::warn!("canvas 2D context lost");
                on_lost.set(true);
            }),
            EventListener::new(target, "contextrestored", move |_| {
                log::info!("canvas 2D context restored");
                on_restored.set(false);
                mark_restored.set(true);
            }),
        ];
        let ctx = canvas
            .get_context("2d")
            .ok()
            .flatten()
            .and_then(|o| o.dyn_into::<web::CanvasRenderingContext2d>().ok())
            .map(|ctx| Ctx2d::new(ctx, canvas.width() as f64, canvas.height() as f64));
        if ctx.is_none() {
            log::error!("could not obtain a 2D context");
        }
        Self {
            canvas,
            ctx,
            lost,
            restored,
            _listeners: listeners,
        }
    }

    pub fn canvas(&self) -> &web::HtmlCanvasElement {
        &self.canvas
    }
}

impl RasterSurface for CanvasRaster {
    fn size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.canvas.set_width(width.max(1));
        self.canvas.set_height(height.max(1));
        if let Some(c) = self.ctx.as_mut() {
            c.width = width as f64;
            c.height = height as f64;
            // resizing resets the context state, fillStyle included
            c.fill = None;
        }
    }

    fn context(&mut self) -> Option<&mut dyn Canvas2d> {
        if self.lost.get() {
            return None;
        }
        let ctx = self.ctx.as_mut()?;
        if self.restored.replace(false) {
            ctx.fill = None;
        }
        Some(ctx as &mut dyn Canvas2d)
    }
}
