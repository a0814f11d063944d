use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys as web;

#[inline]
pub fn window_document() -> Option<web::Document> {
    web::window().and_then(|w| w.document())
}

#[inline]
pub fn device_pixel_ratio() -> f64 {
    web::window().map(|w| w.device_pixel_ratio()).unwrap_or(1.0)
}

/// Backing-store size in device pixels for an element's CSS box.
pub fn backing_size(el: &web::Element) -> (u32, u32) {
    let dpr = device_pixel_ratio();
    let rect = el.get_bounding_client_rect();
    ((rect.width() * dpr) as u32, (rect.height() * dpr) as u32)
}

/// Create a canvas stretched over `container`. Sized in device pixels.
pub fn create_layer_canvas(
    document: &web::Document,
    container: &web::HtmlElement,
    width: u32,
    height: u32,
) -> Option<web::HtmlCanvasElement> {
    let canvas: web::HtmlCanvasElement = document
        .create_element("canvas")
        .ok()?
        .dyn_into()
        .ok()?;
    let style = canvas.style();
    _ = style.set_property("position", "absolute");
    _ = style.set_property("inset", "0");
    _ = style.set_property("width", "100%");
    _ = style.set_property("height", "100%");
    canvas.set_width(width.max(1));
    canvas.set_height(height.max(1));
    container.append_child(&canvas).ok()?;
    Some(canvas)
}

/// Listener that unregisters itself when dropped.
pub struct EventListener {
    target: web::EventTarget,
    kind: &'static str,
    closure: Closure<dyn FnMut(web::Event)>,
}

impl EventListener {
    pub fn new(
        target: &web::EventTarget,
        kind: &'static str,
        handler: impl FnMut(web::Event) + 'static,
    ) -> Self {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(web::Event)>);
        if let Err(e) =
            target.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())
        {
            log::warn!("addEventListener({kind}) failed: {e:?}");
        }
        Self {
            target: target.clone(),
            kind,
            closure,
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.closure.as_ref().unchecked_ref());
    }
}
