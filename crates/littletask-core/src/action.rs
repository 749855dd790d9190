//! Action model
//!
//! One [`Action`] is one captured input event: a timestamp (seconds since the
//! recording started) plus an [`Input`] carrying exactly the fields its kind
//! needs. Recordings serialize to a flat JSON array:
//!
//! ```json
//! [
//!   {"type": "mouseMove", "timestamp": 0.0, "x": 10.0, "y": 10.0},
//!   {"type": "mouseClick", "timestamp": 0.5, "x": 10.0, "y": 10.0, "button": "left", "isDown": true},
//!   {"type": "keyPress", "timestamp": 0.9, "isDown": true, "keyCode": 0},
//!   {"type": "scroll", "timestamp": 1.2, "x": 10.0, "y": 10.0, "deltaY": -3.0}
//! ]
//! ```
//!
//! Decoding is strict about fields that do not belong to a kind and lenient
//! about keys it does not know.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    MouseClick,
    MouseMove,
    KeyPress,
    Scroll,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MouseClick => "mouseClick",
            Self::MouseMove => "mouseMove",
            Self::KeyPress => "keyPress",
            Self::Scroll => "scroll",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

/// Input payload, one variant per action kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    /// Button press (`is_down`) or release at a screen position
    MouseClick {
        x: f64,
        y: f64,
        button: MouseButton,
        is_down: bool,
    },
    /// Pointer moved or dragged to a screen position
    MouseMove { x: f64, y: f64 },
    /// Key down or up for a platform virtual key code
    KeyPress { key_code: u16, is_down: bool },
    /// Vertical wheel tick at a screen position
    Scroll { x: f64, y: f64, delta_y: f64 },
}

impl Input {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::MouseClick { .. } => ActionKind::MouseClick,
            Self::MouseMove { .. } => ActionKind::MouseMove,
            Self::KeyPress { .. } => ActionKind::KeyPress,
            Self::Scroll { .. } => ActionKind::Scroll,
        }
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        match *self {
            Self::MouseClick { x, y, .. } | Self::MouseMove { x, y } | Self::Scroll { x, y, .. } => {
                Some((x, y))
            }
            Self::KeyPress { .. } => None,
        }
    }
}

/// A single recorded input event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireAction", into = "WireAction")]
pub struct Action {
    /// Seconds since recording start
    pub timestamp: f64,
    pub input: Input,
}

impl Action {
    pub fn new(timestamp: f64, input: Input) -> Self {
        Self { timestamp, input }
    }

    pub fn kind(&self) -> ActionKind {
        self.input.kind()
    }

    /// Copy of this action with its timestamp divided by `speed`
    pub fn rescaled(&self, speed: f64) -> Self {
        Self {
            timestamp: self.timestamp / speed,
            input: self.input,
        }
    }

    /// Offset from playback start, or `None` if it does not fit in a `Duration`
    pub fn offset(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.timestamp).ok()
    }
}

/// Flat on-disk record; every optional key is validated against `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAction {
    #[serde(rename = "type")]
    kind: ActionKind,
    timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    button: Option<MouseButton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_down: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta_y: Option<f64>,
}

impl WireAction {
    fn into_action(self) -> std::result::Result<Action, String> {
        let kind = self.kind;
        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return Err(format!(
                "timestamp must be a non-negative number, got {}",
                self.timestamp
            ));
        }

        let present = [
            ("x", self.x.is_some()),
            ("y", self.y.is_some()),
            ("button", self.button.is_some()),
            ("isDown", self.is_down.is_some()),
            ("keyCode", self.key_code.is_some()),
            ("deltaY", self.delta_y.is_some()),
        ];
        let allowed: &[&str] = match kind {
            ActionKind::MouseClick => &["x", "y", "button", "isDown"],
            ActionKind::MouseMove => &["x", "y"],
            ActionKind::KeyPress => &["isDown", "keyCode"],
            ActionKind::Scroll => &["x", "y", "deltaY"],
        };
        if let Some((name, _)) = present
            .iter()
            .find(|(name, set)| *set && !allowed.contains(name))
        {
            return Err(format!("{} must not carry `{}`", kind, name));
        }

        let input = match kind {
            ActionKind::MouseClick => Input::MouseClick {
                x: coordinate(kind, "x", self.x)?,
                y: coordinate(kind, "y", self.y)?,
                button: required(kind, "button", self.button)?,
                is_down: required(kind, "isDown", self.is_down)?,
            },
            ActionKind::MouseMove => Input::MouseMove {
                x: coordinate(kind, "x", self.x)?,
                y: coordinate(kind, "y", self.y)?,
            },
            ActionKind::KeyPress => {
                let raw = required(kind, "keyCode", self.key_code)?;
                let key_code = u16::try_from(raw)
                    .map_err(|_| format!("keyCode {} is outside 0..=65535", raw))?;
                Input::KeyPress {
                    key_code,
                    is_down: required(kind, "isDown", self.is_down)?,
                }
            }
            ActionKind::Scroll => Input::Scroll {
                x: coordinate(kind, "x", self.x)?,
                y: coordinate(kind, "y", self.y)?,
                delta_y: coordinate(kind, "deltaY", self.delta_y)?,
            },
        };

        Ok(Action::new(self.timestamp, input))
    }
}

fn required<T>(kind: ActionKind, name: &str, value: Option<T>) -> std::result::Result<T, String> {
    value.ok_or_else(|| format!("{} requires `{}`", kind, name))
}

fn coordinate(kind: ActionKind, name: &str, value: Option<f64>) -> std::result::Result<f64, String> {
    let v = required(kind, name, value)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("{} has non-finite `{}`", kind, name))
    }
}

impl TryFrom<WireAction> for Action {
    type Error = String;

    fn try_from(wire: WireAction) -> std::result::Result<Self, Self::Error> {
        wire.into_action()
    }
}

impl From<Action> for WireAction {
    fn from(action: Action) -> Self {
        let mut wire = WireAction {
            kind: action.kind(),
            timestamp: action.timestamp,
            x: None,
            y: None,
            button: None,
            is_down: None,
            key_code: None,
            delta_y: None,
        };
        match action.input {
            Input::MouseClick { x, y, button, is_down } => {
                wire.x = Some(x);
                wire.y = Some(y);
                wire.button = Some(button);
                wire.is_down = Some(is_down);
            }
            Input::MouseMove { x, y } => {
                wire.x = Some(x);
                wire.y = Some(y);
            }
            Input::KeyPress { key_code, is_down } => {
                wire.key_code = Some(i64::from(key_code));
                wire.is_down = Some(is_down);
            }
            Input::Scroll { x, y, delta_y } => {
                wire.x = Some(x);
                wire.y = Some(y);
                wire.delta_y = Some(delta_y);
            }
        }
        wire
    }
}

/// Ordered recording; insertion order is replay order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActionSequence {
    actions: Vec<Action>,
}

impl ActionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence, rejecting timestamps that go backwards
    pub fn from_actions(actions: Vec<Action>) -> Result<Self> {
        check_order(&actions)?;
        Ok(Self { actions })
    }

    /// Decode the JSON array format, validating every record against its type
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let wire: Vec<WireAction> = serde_json::from_slice(bytes)?;
        let actions = wire
            .into_iter()
            .enumerate()
            .map(|(index, w)| w.into_action().map_err(|reason| Error::malformed(index, reason)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_actions(actions)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Append an action; one stamped earlier than the current last is rejected
    pub fn push(&mut self, action: Action) -> Result<()> {
        if let Some(last) = self.actions.last() {
            if action.timestamp < last.timestamp {
                return Err(Error::malformed(
                    self.actions.len(),
                    format!(
                        "timestamp {} is earlier than the previous action ({})",
                        action.timestamp, last.timestamp
                    ),
                ));
            }
        }
        self.actions.push(action);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    /// Length of the recording in seconds
    pub fn duration(&self) -> f64 {
        self.actions.last().map_or(0.0, |a| a.timestamp)
    }

    /// Copies of every action with timestamps divided by `speed`
    pub fn rescaled(&self, speed: f64) -> Vec<Action> {
        self.actions.iter().map(|a| a.rescaled(speed)).collect()
    }

    /// Number of actions of each kind
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind() == kind).count()
    }
}

impl<'a> IntoIterator for &'a ActionSequence {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

fn check_order(actions: &[Action]) -> Result<()> {
    for (index, pair) in actions.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(Error::malformed(
                index + 1,
                format!(
                    "timestamp {} is earlier than the previous action ({})",
                    pair[1].timestamp, pair[0].timestamp
                ),
            ));
        }
    }
    Ok(())
}
