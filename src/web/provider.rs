use super::canvas2d::CanvasRaster;
use super::dom;
use super::gpu::{GpuSurface, SharedGpu};
use crate::surface::{RendererKind, Surface, SurfaceProvider};
use std::cell::RefCell;
use std::rc::Rc;
use web_sys as web;

/// Hands out one `<canvas>` per activation, layered inside the container.
pub struct DomSurfaceProvider {
    document: web::Document,
    container: web::HtmlElement,
    gpu: Option<SharedGpu>,
    live: Vec<(Surface, web::HtmlCanvasElement)>,
}

impl DomSurfaceProvider {
    pub fn new(
        document: web::Document,
        container: web::HtmlElement,
        gpu: Option<SharedGpu>,
    ) -> Self {
        Self {
            document,
            container,
            gpu,
            live: Vec::new(),
        }
    }
}

impl SurfaceProvider for DomSurfaceProvider {
    fn supports(&self, kind: RendererKind) -> bool {
        kind == RendererKind::Raster || self.gpu.is_some()
    }

    fn acquire(&mut self, kind: RendererKind, width: u32, height: u32) -> Option<Surface> {
        if !self.supports(kind) {
            log::warn!("WebGPU unavailable, cannot provide a vector surface");
            return None;
        }
        let canvas = dom::create_layer_canvas(&self.document, &self.container, width, height)?;
        let surface = match (&self.gpu, kind) {
            (Some(gpu), RendererKind::Vector) => Surface::Vector(Rc::new(RefCell::new(
                GpuSurface::new(gpu.clone(), canvas.clone()),
            ))),
            _ => Surface::Raster(Rc::new(RefCell::new(CanvasRaster::new(canvas.clone())))),
        };
        log::debug!("acquired {kind:?} surface {width}x{height}");
        self.live.push((surface.clone(), canvas));
        Some(surface)
    }

    fn release(&mut self, surface: Surface) {
        if let Some(i) = self.live.iter().position(|(s, _)| s.ptr_eq(&surface)) {
            let (_, canvas) = self.live.swap_remove(i);
            canvas.remove();
        }
    }
}

impl Drop for DomSurfaceProvider {
    fn drop(&mut self) {
        for (_, canvas) in self.live.drain(..) {
            canvas.remove();
        }
    }
}
