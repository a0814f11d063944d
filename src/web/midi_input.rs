//! Web MIDI input. Every connected input port is wired to the bus, and ports
//! plugged in later are picked up on `statechange`.

use crate::midi::{EventBus, MidiEvent};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys as web;

pub struct MidiInput {
    access: web::MidiAccess,
    _on_message: Closure<dyn FnMut(web::MidiMessageEvent)>,
    _on_state: Closure<dyn FnMut(web::MidiConnectionEvent)>,
}

fn for_each_input(access: &web::MidiAccess, mut f: impl FnMut(&web::MidiInput)) {
    let inputs: js_sys::Map = access.inputs().unchecked_into();
    inputs.for_each(&mut |value, _key| {
        if let Ok(input) = value.dyn_into::<web::MidiInput>() {
            f(&input);
        }
    });
}

fn wire_inputs(access: &web::MidiAccess, handler: Option<&js_sys::Function>) -> usize {
    let mut n = 0;
    for_each_input(access, |input| {
        input.set_onmidimessage(handler);
        n += 1;
    });
    n
}

impl MidiInput {
    pub async fn connect(bus: &EventBus) -> Result<Self, JsValue> {
        let window = web::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let promise = window.navigator().request_midi_access()?;
        let access: web::MidiAccess = JsFuture::from(promise).await?.dyn_into()?;

        let bus = bus.clone();
        let on_message = Closure::wrap(Box::new(move |ev: web::MidiMessageEvent| {
            let Ok(data) = ev.data() else {
                return;
            };
            if let Some(event) = MidiEvent::from_bytes(&data) {
                bus.publish(event);
            }
        }) as Box<dyn FnMut(web::MidiMessageEvent)>);
        let handler: js_sys::Function = on_message
            .as_ref()
            .unchecked_ref::<js_sys::Function>()
            .clone();

        let access_for_state = access.clone();
        let handler_for_state = handler.clone();
        let on_state = Closure::wrap(Box::new(move |ev: web::MidiConnectionEvent| {
            let name = ev.port().and_then(|p| p.name()).unwrap_or_default();
            let n = wire_inputs(&access_for_state, Some(&handler_for_state));
            log::info!("MIDI port change '{name}', {n} input(s) wired");
        }) as Box<dyn FnMut(web::MidiConnectionEvent)>);
        access.set_onstatechange(Some(on_state.as_ref().unchecked_ref()));

        let n = wire_inputs(&access, Some(&handler));
        log::info!("Web MIDI ready, {n} input(s)");
        Ok(Self {
            access,
            _on_message: on_message,
            _on_state: on_state,
        })
    }

    pub fn detach(&self) {
        self.access.set_onstatechange(None);
        wire_inputs(&self.access, None);
    }
}

impl Drop for MidiInput {
    fn drop(&mut self) {
        self.detach();
    }
}
