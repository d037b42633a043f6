//! Local window, keyboard and clipboard listeners.
//!
//! The host forwards raw events; [`translate`] turns them into aggregator
//! inputs. Everything runs to completion on the caller's thread.

use sentinel_core::{ViolationCategory, ViolationEvent, ViolationSource};

use crate::aggregator::Input;

/// One key press with modifier state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    /// Key name (`"c"`, `"F12"`, `"PrintScreen"`, `"Tab"`).
    pub key: String,
    /// Control held.
    pub ctrl: bool,
    /// Alt held.
    pub alt: bool,
    /// Shift held.
    pub shift: bool,
    /// Meta/OS key held or pressed.
    pub meta: bool,
}

impl KeyPress {
    /// A key without modifiers.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
        }
    }

    /// Adds control.
    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    /// Adds alt.
    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Adds shift.
    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Adds meta.
    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

/// Clipboard operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardAction {
    /// Copy.
    Copy,
    /// Paste.
    Paste,
    /// Cut.
    Cut,
}

/// Raw host event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    /// Test window lost focus.
    WindowBlur,
    /// Key pressed.
    KeyDown(KeyPress),
    /// Context menu requested.
    ContextMenu,
    /// Clipboard operation attempted.
    Clipboard(ClipboardAction),
    /// Fullscreen entered or left.
    FullscreenChange {
        /// `true` when now in fullscreen.
        active: bool,
    },
}

/// Returns the category and notice for a forbidden key combination.
pub fn forbidden_key(press: &KeyPress) -> Option<(ViolationCategory, &'static str)> {
    let key = press.key.to_ascii_lowercase();

    if press.meta || matches!(key.as_str(), "meta" | "os" | "super") {
        return Some((ViolationCategory::ForbiddenKey, "System keys are disabled during the test"));
    }
    if press.ctrl && press.shift && matches!(key.as_str(), "i" | "j" | "c") {
        return Some((ViolationCategory::ForbiddenKey, "Developer tools are disabled"));
    }
    if press.ctrl {
        match key.as_str() {
            "c" | "v" | "x" => {
                return Some((ViolationCategory::Clipboard, "Copy and paste are disabled"));
            }
            "a" => return Some((ViolationCategory::ForbiddenKey, "Select all is disabled")),
            "s" | "p" | "u" => {
                return Some((ViolationCategory::ForbiddenKey, "This shortcut is disabled"));
            }
            _ => {}
        }
    }
    if press.alt && key == "tab" {
        return Some((ViolationCategory::ForbiddenKey, "Switching windows is disabled"));
    }
    match key.as_str() {
        "f1" | "f12" | "printscreen" => {
            Some((ViolationCategory::ForbiddenKey, "This key is disabled during the test"))
        }
        _ => None,
    }
}

/// Translates a host event into an aggregator input.
///
/// Allowed keys produce `None`.
pub fn translate(event: &LocalEvent, now_ms: u64) -> Option<Input> {
    let local = |category, message: &str| {
        Input::Violation(ViolationEvent::new(
            category,
            message,
            now_ms,
            ViolationSource::Local,
        ))
    };

    match event {
        LocalEvent::WindowBlur => Some(local(
            ViolationCategory::TabSwitch,
            "You left the test window. Stay on this tab until you finish.",
        )),
        LocalEvent::KeyDown(press) => {
            forbidden_key(press).map(|(category, message)| local(category, message))
        }
        LocalEvent::ContextMenu => Some(local(
            ViolationCategory::ForbiddenKey,
            "Right click is disabled",
        )),
        LocalEvent::Clipboard(action) => {
            let message = match action {
                ClipboardAction::Copy => "Copying is disabled",
                ClipboardAction::Paste => "Pasting is disabled",
                ClipboardAction::Cut => "Cutting is disabled",
            };
            Some(local(ViolationCategory::Clipboard, message))
        }
        LocalEvent::FullscreenChange { active } => Some(Input::FullscreenChanged(*active)),
    }
}
