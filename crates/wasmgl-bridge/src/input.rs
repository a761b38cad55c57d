//! Host input events and their guest encoding.

use serde::{Deserialize, Serialize};

/// Input delivered to the guest's event exports.
///
/// Keys and buttons carry host names/indices; [`InputEvent::guest_call`]
/// maps them to the integer codes the guest understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    KeyDown { code: String },
    KeyUp { code: String },
    ButtonDown { button: i32 },
    ButtonUp { button: i32 },
    Move { x: i32, y: i32 },
    Wheel { delta_y: f64 },
}

/// Guest export an event is delivered to, with its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestInput {
    KeyDown(i32),
    KeyUp(i32),
    ButtonDown(i32),
    ButtonUp(i32),
    Move(i32, i32),
    Scroll(i32),
}

impl GuestInput {
    /// Name of the guest export handling this input.
    pub fn export_name(&self) -> &'static str {
        match self {
            Self::KeyDown(_) => "key_down",
            Self::KeyUp(_) => "key_up",
            Self::ButtonDown(_) => "button_down",
            Self::ButtonUp(_) => "button_up",
            Self::Move(..) => "move",
            Self::Scroll(_) => "scroll",
        }
    }
}

impl InputEvent {
    /// Keyboard events are dropped while host menus have focus.
    pub fn is_key(&self) -> bool {
        matches!(self, Self::KeyDown { .. } | Self::KeyUp { .. })
    }

    /// Encode for the guest.
    pub fn guest_call(&self) -> GuestInput {
        match self {
            Self::KeyDown { code } => GuestInput::KeyDown(key_code(code)),
            Self::KeyUp { code } => GuestInput::KeyUp(key_code(code)),
            Self::ButtonDown { button } => GuestInput::ButtonDown(button_code(*button)),
            Self::ButtonUp { button } => GuestInput::ButtonUp(button_code(*button)),
            Self::Move { x, y } => GuestInput::Move(*x, *y),
            Self::Wheel { delta_y } => GuestInput::Scroll(wheel_steps(*delta_y)),
        }
    }
}

/// Map a physical key name (`KeyboardEvent.code` style) to a guest key code.
///
/// Unmapped keys become 0.
pub fn key_code(code: &str) -> i32 {
    match code {
        "Space" => 65,
        "KeyR" => 27,
        "KeyM" => 58,
        "KeyS" => 39,
        "KeyD" => 40,
        "KeyU" => 30,
        "KeyW" => 25,
        "KeyC" => 54,
        "Digit0" => 19,
        "ShiftLeft" => 50,
        "ControlLeft" => 37,
        _ => match code.strip_prefix("Digit").map(str::as_bytes) {
            Some(&[d @ b'1'..=b'9']) => 10 + i32::from(d - b'1'),
            _ => 0,
        },
    }
}

/// Primary button is 1, everything else 0.
pub fn button_code(button: i32) -> i32 {
    i32::from(button == 0)
}

/// Wheel delta in pixels to guest scroll steps, truncated toward zero.
pub fn wheel_steps(delta_y: f64) -> i32 {
    let steps = (-0.02 * delta_y).trunc();
    if steps.is_finite() {
        steps as i32
    } else {
        0
    }
}
