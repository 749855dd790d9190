//! CGEventTap capture
//!
//! The tap is listen-only, so events reach the rest of the system untouched.
//! It lives on its own thread with its own run loop; the callback only
//! translates and forwards, and never blocks.

use crate::action::{Input, MouseButton};
use crate::capture::{ActionSink, CaptureBackend, PermissionStatus, RecorderConfig};
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

use cidre::cg::event::access as cg_access;
use cidre::{cf, cg};

/// Session event tap covering clicks, moves, drags, keys and the wheel
#[derive(Debug, Default, Clone, Copy)]
pub struct EventTapCapture;

impl CaptureBackend for EventTapCapture {
    fn permissions(&self) -> PermissionStatus {
        PermissionStatus {
            accessibility: cidre::ax::is_process_trusted(),
            input_monitoring: cg_access::listen_preflight(),
        }
    }

    fn request_permissions(&self) -> PermissionStatus {
        PermissionStatus {
            accessibility: cidre::ax::is_process_trusted_with_prompt(true),
            input_monitoring: cg_access::listen_request(),
        }
    }

    fn spawn_hook(
        &self,
        sink: ActionSink,
        stop: Arc<AtomicBool>,
        config: &RecorderConfig,
    ) -> Result<thread::JoinHandle<()>> {
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let poll = config.poll_interval.as_secs_f64();

        let handle = thread::Builder::new()
            .name("littletask-capture".into())
            .spawn(move || run_event_tap(sink, stop, poll, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::capture_unavailable("event tap thread exited during setup"))
            }
        }
    }
}

struct TapState {
    sink: ActionSink,
}

fn run_event_tap(sink: ActionSink, stop: Arc<AtomicBool>, poll: f64, ready: Sender<Result<()>>) {
    let mask = cg::EventType::LEFT_MOUSE_DOWN.mask()
        | cg::EventType::LEFT_MOUSE_UP.mask()
        | cg::EventType::RIGHT_MOUSE_DOWN.mask()
        | cg::EventType::RIGHT_MOUSE_UP.mask()
        | cg::EventType::MOUSE_MOVED.mask()
        | cg::EventType::LEFT_MOUSE_DRAGGED.mask()
        | cg::EventType::RIGHT_MOUSE_DRAGGED.mask()
        | cg::EventType::KEY_DOWN.mask()
        | cg::EventType::KEY_UP.mask()
        | cg::EventType::SCROLL_WHEEL.mask();

    // Owned by this thread; callbacks only fire while the run loop below is running
    let mut state = Box::new(TapState { sink });
    let state_ptr: *mut TapState = &mut *state;

    let tap = cg::EventTap::new(
        cg::EventTapLocation::Session,
        cg::EventTapPlacement::TailAppend,
        cg::EventTapOpts::LISTEN_ONLY,
        mask,
        tap_callback,
        state_ptr,
    );

    let Some(tap) = tap else {
        let err = if cg_access::listen_preflight() {
            Error::capture_unavailable("failed to create event tap")
        } else {
            Error::permission_denied("event tap refused: Input Monitoring access not granted")
        };
        error!(error = %err, "event tap");
        let _ = ready.send(Err(err));
        return;
    };

    let Some(src) = cf::MachPort::run_loop_src(&tap, 0) else {
        let _ = ready.send(Err(Error::capture_unavailable(
            "failed to create run loop source for event tap",
        )));
        return;
    };

    let rl = cf::RunLoop::current();
    rl.add_src(&src, cf::RunLoopMode::default());
    let _ = ready.send(Ok(()));
    debug!("event tap running");

    while !stop.load(Ordering::Relaxed) {
        cf::RunLoop::run_in_mode(cf::RunLoopMode::default(), poll, true);
    }

    rl.remove_src(&src, cf::RunLoopMode::default());
    drop(src);
    drop(tap);
    drop(state);
    debug!("event tap removed");
}

extern "C" fn tap_callback(
    _proxy: *mut cg::EventTapProxy,
    event_type: cg::EventType,
    event: &mut cg::Event,
    user_info: *mut TapState,
) -> Option<&cg::Event> {
    let state = unsafe { &*user_info };
    if let Some(input) = translate(event_type, event) {
        state.sink.emit(input);
    }
    Some(event)
}

fn translate(event_type: cg::EventType, event: &cg::Event) -> Option<Input> {
    let loc = event.location();
    let click = |button, is_down| Input::MouseClick {
        x: loc.x,
        y: loc.y,
        button,
        is_down,
    };

    let input = match event_type {
        cg::EventType::LEFT_MOUSE_DOWN => click(MouseButton::Left, true),
        cg::EventType::LEFT_MOUSE_UP => click(MouseButton::Left, false),
        cg::EventType::RIGHT_MOUSE_DOWN => click(MouseButton::Right, true),
        cg::EventType::RIGHT_MOUSE_UP => click(MouseButton::Right, false),

        cg::EventType::MOUSE_MOVED
        | cg::EventType::LEFT_MOUSE_DRAGGED
        | cg::EventType::RIGHT_MOUSE_DRAGGED => Input::MouseMove { x: loc.x, y: loc.y },

        cg::EventType::KEY_DOWN | cg::EventType::KEY_UP => Input::KeyPress {
            key_code: event.field_i64(cg::EventField::KEYBOARD_EVENT_KEYCODE) as u16,
            is_down: event_type == cg::EventType::KEY_DOWN,
        },

        cg::EventType::SCROLL_WHEEL => Input::Scroll {
            x: loc.x,
            y: loc.y,
            delta_y: event.field_i64(cg::EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS1) as f64,
        },

        _ => return None,
    };
    Some(input)
}
