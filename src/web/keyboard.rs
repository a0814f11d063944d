//! Computer-keyboard input: the home row plays a chromatic octave, `z`/`x`
//! shift the octave. Events go onto the same bus as hardware MIDI.

use super::dom::EventListener;
use crate::midi::{note_for_key, octave_shift_for_key, EventBus, MidiEvent, KEYBOARD_VELOCITY};
use fnv::FnvHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::JsCast;
use web_sys as web;

const DEFAULT_OCTAVE: i8 = 4;
const CHANNEL: u8 = 0;

pub fn wire_keyboard(window: &web::Window, bus: &EventBus) -> [EventListener; 2] {
    let octave = Rc::new(Cell::new(DEFAULT_OCTAVE));
    // key → sounding note, so an octave change mid-hold still releases the
    // right note
    let held: Rc<RefCell<FnvHashMap<String, u8>>> = Rc::default();
    let target: &web::EventTarget = window.as_ref();

    let down_bus = bus.clone();
    let down_held = held.clone();
    let down = EventListener::new(target, "keydown", move |ev| {
        let Some(ev) = ev.dyn_ref::<web::KeyboardEvent>() else {
            return;
        };
        if ev.repeat() || ev.ctrl_key() || ev.meta_key() || ev.alt_key() {
            return;
        }
        let key = ev.key().to_lowercase();
        if let Some(shift) = octave_shift_for_key(&key) {
            let o = (octave.get() + shift).clamp(0, 8);
            octave.set(o);
            log::info!("keyboard octave {o}");
            return;
        }
        let Some(note) = note_for_key(&key, octave.get()) else {
            return;
        };
        let Ok(mut held) = down_held.try_borrow_mut() else {
            return;
        };
        if held.contains_key(&key) {
            return;
        }
        held.insert(key, note);
        drop(held);
        down_bus.publish(MidiEvent::NoteOn {
            channel: CHANNEL,
            note,
            velocity: KEYBOARD_VELOCITY,
        });
    });

    let up_bus = bus.clone();
    let up = EventListener::new(target, "keyup", move |ev| {
        let Some(ev) = ev.dyn_ref::<web::KeyboardEvent>() else {
            return;
        };
        let key = ev.key().to_lowercase();
        let note = held.try_borrow_mut().ok().and_then(|mut h| h.remove(&key));
        if let Some(note) = note {
            up_bus.publish(MidiEvent::NoteOff {
                channel: CHANNEL,
                note,
            });
        }
    });

    [down, up]
}
