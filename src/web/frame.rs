//! requestAnimationFrame loop and the one-shot timer used for deferred note
//! releases. Both can be cancelled, which the teardown path relies on.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys as web;

type TickFn = Box<dyn FnMut(f64) -> bool>;

struct LoopInner {
    tick: RefCell<Option<TickFn>>,
    closure: RefCell<Option<Closure<dyn FnMut(f64)>>>,
    handle: Cell<Option<i32>>,
}

/// Frame loop driven by the browser. The tick returns whether another frame
/// is wanted; returning false parks the loop until [`FrameLoop::ensure_running`].
#[derive(Clone)]
pub struct FrameLoop {
    inner: Rc<LoopInner>,
}

impl FrameLoop {
    pub fn new(tick: impl FnMut(f64) -> bool + 'static) -> Self {
        let inner = Rc::new(LoopInner {
            tick: RefCell::new(Some(Box::new(tick))),
            closure: RefCell::new(None),
            handle: Cell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let closure = Closure::wrap(Box::new(move |now_ms: f64| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.handle.set(None);
            let again = match inner.tick.try_borrow_mut() {
                Ok(mut tick) => tick.as_mut().map(|f| f(now_ms)).unwrap_or(false),
                Err(_) => true,
            };
            if again {
                schedule(&inner);
            }
        }) as Box<dyn FnMut(f64)>);
        *inner.closure.borrow_mut() = Some(closure);
        Self { inner }
    }

    pub fn is_scheduled(&self) -> bool {
        self.inner.handle.get().is_some()
    }

    /// Request a frame unless one is already pending.
    pub fn ensure_running(&self) {
        if !self.is_scheduled() {
            schedule(&self.inner);
        }
    }

    pub fn cancel(&self) {
        if let (Some(id), Some(w)) = (self.inner.handle.take(), web::window()) {
            _ = w.cancel_animation_frame(id);
        }
    }

    /// Cancel and drop the tick, releasing everything it captured.
    pub fn stop(&self) {
        self.cancel();
        self.inner.tick.borrow_mut().take();
        self.inner.closure.borrow_mut().take();
    }
}

fn schedule(inner: &LoopInner) {
    let Some(w) = web::window() else {
        return;
    };
    let closure = inner.closure.borrow();
    let Some(cb) = closure.as_ref() else {
        return;
    };
    match w.request_animation_frame(cb.as_ref().unchecked_ref()) {
        Ok(id) => inner.handle.set(Some(id)),
        Err(e) => log::error!("requestAnimationFrame failed: {e:?}"),
    }
}

/// Single pending `setTimeout`, re-armed for the earliest release deadline.
pub struct ReleaseTimer {
    handle: Cell<Option<i32>>,
    deadline: Cell<Option<f64>>,
    closure: Closure<dyn FnMut()>,
}

impl ReleaseTimer {
    pub fn new(on_fire: impl FnMut() + 'static) -> Self {
        Self {
            handle: Cell::new(None),
            deadline: Cell::new(None),
            closure: Closure::wrap(Box::new(on_fire) as Box<dyn FnMut()>),
        }
    }

    /// Arm for `deadline_ms`; an earlier pending deadline is kept.
    pub fn arm(&self, deadline_ms: Option<f64>, now_ms: f64) {
        let Some(deadline) = deadline_ms else {
            return;
        };
        if matches!(self.deadline.get(), Some(d) if d <= deadline) && self.handle.get().is_some() {
            return;
        }
        self.cancel();
        let Some(w) = web::window() else {
            return;
        };
        let delay = (deadline - now_ms).max(0.0).ceil() as i32;
        match w.set_timeout_with_callback_and_timeout_and_arguments_0(
            self.closure.as_ref().unchecked_ref(),
            delay,
        ) {
            Ok(id) => {
                self.handle.set(Some(id));
                self.deadline.set(Some(deadline));
            }
            Err(e) => log::warn!("setTimeout failed: {e:?}"),
        }
    }

    /// Forget the fired timeout so the next `arm` schedules a fresh one.
    pub fn fired(&self) {
        self.handle.set(None);
        self.deadline.set(None);
    }

    pub fn cancel(&self) {
        if let (Some(id), Some(w)) = (self.handle.take(), web::window()) {
            w.clear_timeout_with_handle(id);
        }
        self.deadline.set(None);
    }
}

impl Drop for ReleaseTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
