//! Browser entry points. `mount` builds the whole pipeline inside a container
//! element and returns a handle the page uses to switch scenes, edit
//! mappings and tear everything down.

use crate::accumulator::Accumulator;
use crate::config::{rules_from_json, AccumulatorConfig, HostConfig, MappingConfig};
use crate::host::RenderHost;
use crate::midi::{EventBus, Subscription};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys as web;

mod canvas2d;
mod dom;
mod frame;
mod gpu;
mod keyboard;
mod midi_input;
mod provider;

use dom::EventListener;
use frame::{FrameLoop, ReleaseTimer};
use gpu::GpuContext;
use midi_input::MidiInput;
use provider::DomSurfaceProvider;

const VECTOR_START_SCENE: &str = "particles";
const RASTER_START_SCENE: &str = "waterfall";

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();
    log::info!("midi-viz loaded");
    Ok(())
}

struct App {
    host: Rc<RefCell<RenderHost>>,
    accumulator: Rc<RefCell<Accumulator>>,
    frame_loop: FrameLoop,
    timer: Rc<ReleaseTimer>,
    timer_sub: RefCell<Option<Subscription>>,
    listeners: RefCell<Vec<EventListener>>,
    midi: Rc<RefCell<Option<MidiInput>>>,
    observer: web::ResizeObserver,
    _observer_cb: Closure<dyn FnMut(js_sys::Array)>,
    torn_down: Rc<Cell<bool>>,
}

impl App {
    fn teardown(&self) {
        if self.torn_down.replace(true) {
            return;
        }
        self.frame_loop.stop();
        self.timer.cancel();
        self.timer_sub.borrow_mut().take();
        self.listeners.borrow_mut().clear();
        self.midi.borrow_mut().take();
        self.observer.disconnect();
        if let Ok(mut h) = self.host.try_borrow_mut() {
            h.teardown();
        }
        if let Ok(mut a) = self.accumulator.try_borrow_mut() {
            a.teardown();
        }
        log::info!("visualizer torn down");
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[wasm_bindgen]
pub struct Visualizer {
    app: Rc<App>,
}

#[wasm_bindgen]
impl Visualizer {
    #[wasm_bindgen(js_name = currentScene)]
    pub fn current_scene(&self) -> Option<String> {
        let h = self.app.host.try_borrow().ok()?;
        h.current_scene_id().map(str::to_owned)
    }

    /// Scene catalog (ids, names, renderer kinds, default mappings) as JSON.
    #[wasm_bindgen(js_name = scenesJson)]
    pub fn scenes_json(&self) -> Result<String, JsValue> {
        let h = self
            .app
            .host
            .try_borrow()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        serde_json::to_string(h.scenes()).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// False for vector scenes when WebGPU is unavailable.
    #[wasm_bindgen(js_name = canRender)]
    pub fn can_render(&self, scene_id: &str) -> bool {
        self.app
            .host
            .try_borrow()
            .is_ok_and(|h| h.can_render(scene_id))
    }

    #[wasm_bindgen(js_name = setScene)]
    pub fn set_scene(&self, scene_id: &str) -> bool {
        let Ok(mut h) = self.app.host.try_borrow_mut() else {
            return false;
        };
        let ok = h.request_scene(scene_id, instant::now());
        if h.wants_frames() {
            self.app.frame_loop.ensure_running();
        }
        ok
    }

    #[wasm_bindgen(js_name = mappingsJson)]
    pub fn mappings_json(&self, scene_id: &str) -> Option<String> {
        let h = self.app.host.try_borrow().ok()?;
        serde_json::to_string(h.mappings(scene_id)?).ok()
    }

    #[wasm_bindgen(js_name = setMappingsJson)]
    pub fn set_mappings_json(&self, scene_id: &str, json: &str) -> Result<(), JsValue> {
        let rules = rules_from_json(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let mut h = self
            .app
            .host
            .try_borrow_mut()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        h.set_mappings(scene_id, rules)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Every scene's rules as one JSON object keyed by scene id.
    #[wasm_bindgen(js_name = exportMappingsJson)]
    pub fn export_mappings_json(&self) -> Result<String, JsValue> {
        let h = self
            .app
            .host
            .try_borrow()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        h.export_mappings()
            .to_json()
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = importMappingsJson)]
    pub fn import_mappings_json(&self, json: &str) -> Result<(), JsValue> {
        let cfg = MappingConfig::from_json(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let mut h = self
            .app
            .host
            .try_borrow_mut()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        h.import_mappings(cfg)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn teardown(&self) {
        self.app.teardown();
    }
}

#[wasm_bindgen]
pub async fn mount(container_id: String) -> Result<Visualizer, JsValue> {
    mount_inner(&container_id)
        .await
        .map_err(|e| JsValue::from_str(&format!("{e:?}")))
}

fn release_timer(accumulator: &Rc<RefCell<Accumulator>>) -> Rc<ReleaseTimer> {
    let acc = Rc::downgrade(accumulator);
    Rc::new_cyclic(|me: &Weak<ReleaseTimer>| {
        let me = me.clone();
        ReleaseTimer::new(move || {
            let (Some(timer), Some(acc)) = (me.upgrade(), acc.upgrade()) else {
                return;
            };
            timer.fired();
            let now = instant::now();
            if let Ok(mut a) = acc.try_borrow_mut() {
                a.fire_due(now);
                timer.arm(a.next_deadline(), now);
            };
        })
    })
}

async fn mount_inner(container_id: &str) -> anyhow::Result<Visualizer> {
    let window = web::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| anyhow::anyhow!("no document"))?;
    let container: web::HtmlElement = document
        .get_element_by_id(container_id)
        .ok_or_else(|| anyhow::anyhow!("missing #{container_id}"))?
        .dyn_into()
        .map_err(|e| anyhow::anyhow!(format!("{:?}", e)))?;
    _ = container.style().set_property("position", "relative");

    let gpu = match GpuContext::new().await {
        Ok(g) => Some(g),
        Err(e) => {
            log::warn!("WebGPU unavailable, vector scenes disabled: {e:?}");
            None
        }
    };

    let bus = EventBus::new();
    let accumulator = Rc::new(RefCell::new(Accumulator::new(AccumulatorConfig::default())));
    Accumulator::attach(&accumulator, &bus, instant::now);
    let state = accumulator.borrow().snapshot();

    let provider = DomSurfaceProvider::new(document.clone(), container.clone(), gpu);
    let host = Rc::new(RefCell::new(RenderHost::with_registry(
        HostConfig::default(),
        state,
        Box::new(provider),
    )));

    // Deferred releases fire from a timer so they land even between frames.
    let timer = release_timer(&accumulator);
    let timer_sub = {
        let timer = Rc::downgrade(&timer);
        let acc = Rc::downgrade(&accumulator);
        bus.subscribe(move |_| {
            let (Some(timer), Some(acc)) = (timer.upgrade(), acc.upgrade()) else {
                return;
            };
            if let Ok(a) = acc.try_borrow() {
                timer.arm(a.next_deadline(), instant::now());
            };
        })
    };

    let frame_loop = {
        let host = Rc::downgrade(&host);
        let acc = Rc::downgrade(&accumulator);
        FrameLoop::new(move |now_ms| {
            let Some(host) = host.upgrade() else {
                return false;
            };
            if let Some(acc) = acc.upgrade() {
                if let Ok(mut a) = acc.try_borrow_mut() {
                    a.tick(instant::now());
                };
            }
            // A busy host (e.g. mid set_scene) just retries next frame.
            let Ok(mut h) = host.try_borrow_mut() else {
                return true;
            };
            h.frame(now_ms)
        })
    };

    let observer_cb = {
        let host = Rc::downgrade(&host);
        let container = container.clone();
        let frame_loop = frame_loop.clone();
        Closure::wrap(Box::new(move |_entries: js_sys::Array| {
            let (w, h) = dom::backing_size(&container);
            let Some(host) = host.upgrade() else {
                return;
            };
            let Ok(mut host) = host.try_borrow_mut() else {
                return;
            };
            host.resize(w, h);
            if host.wants_frames() {
                frame_loop.ensure_running();
            }
        }) as Box<dyn FnMut(js_sys::Array)>)
    };
    let observer = web::ResizeObserver::new(observer_cb.as_ref().unchecked_ref())
        .map_err(|e| anyhow::anyhow!(format!("{:?}", e)))?;
    observer.observe(&container);

    let mut listeners = Vec::new();
    {
        let host = Rc::downgrade(&host);
        let doc = document.clone();
        let frame_loop = frame_loop.clone();
        listeners.push(EventListener::new(
            document.as_ref(),
            "visibilitychange",
            move |_| {
                let visible = !doc.hidden();
                let Some(host) = host.upgrade() else {
                    return;
                };
                let Ok(mut h) = host.try_borrow_mut() else {
                    return;
                };
                if h.set_visible(visible, instant::now()) {
                    frame_loop.ensure_running();
                } else {
                    frame_loop.cancel();
                }
            },
        ));
    }
    listeners.extend(keyboard::wire_keyboard(&window, &bus));

    {
        let (w, h) = dom::backing_size(&container);
        let mut host = host.borrow_mut();
        let initial = if host.can_render(VECTOR_START_SCENE) {
            VECTOR_START_SCENE
        } else {
            RASTER_START_SCENE
        };
        host.start(initial);
        // A zero-sized container leaves init to the first observed resize.
        host.resize(w, h);
        host.set_visible(!document.hidden(), instant::now());
        if host.wants_frames() {
            frame_loop.ensure_running();
        }
    }

    let torn_down = Rc::new(Cell::new(false));
    let midi: Rc<RefCell<Option<MidiInput>>> = Rc::default();
    {
        let midi = midi.clone();
        let torn_down = torn_down.clone();
        wasm_bindgen_futures::spawn_local(async move {
            match MidiInput::connect(&bus).await {
                Ok(input) if !torn_down.get() => *midi.borrow_mut() = Some(input),
                Ok(_) => {}
                Err(e) => log::warn!("Web MIDI unavailable, keyboard input only: {e:?}"),
            }
        });
    }

    log::info!("visualizer mounted in #{container_id}");
    Ok(Visualizer {
        app: Rc::new(App {
            host,
            accumulator,
            frame_loop,
            timer,
            timer_sub: RefCell::new(Some(timer_sub)),
            listeners: RefCell::new(listeners),
            midi,
            observer,
            _observer_cb: observer_cb,
            torn_down,
        }),
    })
}
