//! CGEvent injection

use crate::action::{Input, MouseButton};
use crate::error::{Error, Result};
use crate::playback::Synthesizer;
use parking_lot::Mutex;
use std::ffi::c_void;

use cidre::cg;

// Raw FFI for what cidre does not expose
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventPost(tap: u32, event: *const c_void);
    fn CGEventCreateScrollWheelEvent2(
        source: *const c_void,
        units: u32,
        wheel_count: u32,
        wheel1: i32,
        wheel2: i32,
        wheel3: i32,
    ) -> *mut c_void;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRelease(cf: *const c_void);
}

const HID_EVENT_TAP: u32 = 0;
const SCROLL_UNIT_LINE: u32 = 1;

/// Post an event to the system
fn post_event(event: &cg::Event) {
    unsafe {
        CGEventPost(HID_EVENT_TAP, event as *const _ as *const c_void);
    }
}

/// Posts events at the HID level. CGEventPost is thread-safe, so this runs
/// directly on the playback thread.
#[derive(Default)]
pub struct EventPostSynth {
    /// Button currently held, so moves are posted as drags
    held: Mutex<Option<MouseButton>>,
}

impl EventPostSynth {
    fn mouse(&self, event_type: cg::EventType, x: f64, y: f64, button: cg::MouseButton) -> Result<()> {
        let pos = cg::Point { x, y };
        let evt = cg::Event::mouse(None, event_type, pos, button)
            .ok_or_else(|| Error::synthesis("mouse event", "CGEventCreateMouseEvent returned null"))?;
        post_event(&evt);
        Ok(())
    }

    fn click(&self, x: f64, y: f64, button: MouseButton, is_down: bool) -> Result<()> {
        let (event_type, cg_button) = match (button, is_down) {
            (MouseButton::Left, true) => (cg::EventType::LEFT_MOUSE_DOWN, cg::MouseButton::Left),
            (MouseButton::Left, false) => (cg::EventType::LEFT_MOUSE_UP, cg::MouseButton::Left),
            (MouseButton::Right, true) => (cg::EventType::RIGHT_MOUSE_DOWN, cg::MouseButton::Right),
            (MouseButton::Right, false) => (cg::EventType::RIGHT_MOUSE_UP, cg::MouseButton::Right),
        };
        self.mouse(event_type, x, y, cg_button)?;
        *self.held.lock() = is_down.then_some(button);
        Ok(())
    }

    fn move_to(&self, x: f64, y: f64) -> Result<()> {
        let held = *self.held.lock();
        match held {
            Some(MouseButton::Left) => self.mouse(cg::EventType::LEFT_MOUSE_DRAGGED, x, y, cg::MouseButton::Left),
            Some(MouseButton::Right) => {
                self.mouse(cg::EventType::RIGHT_MOUSE_DRAGGED, x, y, cg::MouseButton::Right)
            }
            None => self.mouse(cg::EventType::MOUSE_MOVED, x, y, cg::MouseButton::Left),
        }
    }

    fn key(&self, key_code: u16, is_down: bool) -> Result<()> {
        let evt = cg::Event::keyboard(None, key_code, is_down)
            .ok_or_else(|| Error::synthesis("keyPress", "CGEventCreateKeyboardEvent returned null"))?;
        post_event(&evt);
        Ok(())
    }

    fn scroll(&self, delta_y: f64) -> Result<()> {
        let wheel1 = delta_y.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        unsafe {
            let evt = CGEventCreateScrollWheelEvent2(
                std::ptr::null(),
                SCROLL_UNIT_LINE,
                1,
                wheel1,
                0,
                0,
            );
            if evt.is_null() {
                return Err(Error::synthesis("scroll", "CGEventCreateScrollWheelEvent2 returned null"));
            }
            CGEventPost(HID_EVENT_TAP, evt);
            CFRelease(evt);
        }
        Ok(())
    }
}

impl Synthesizer for EventPostSynth {
    fn post(&self, input: &Input) -> Result<()> {
        match *input {
            Input::MouseClick { x, y, button, is_down } => self.click(x, y, button, is_down),
            Input::MouseMove { x, y } => self.move_to(x, y),
            Input::KeyPress { key_code, is_down } => self.key(key_code, is_down),
            Input::Scroll { delta_y, .. } => self.scroll(delta_y),
        }
    }
}
