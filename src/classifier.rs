//! Key event classification and update requests.
//!
//! These run under the state lock. They decide what the touch bar should
//! be doing, queue the difference as pending changes, and tell the caller
//! whether the worker needs to run and what to do with the key event.

use std::time::Instant;

use log::trace;

use crate::keys::{KeyCode, KeyValue};
use crate::modes::{DisplayLevel, Pending, TouchBarMode};
use crate::state::TouchBarState;

/// The outcome of a touch bar key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Not a touch bar key, or the controller is inactive.
    Ignored,
    /// Deliver the event unmodified.
    Forwarded,
    /// The event was dropped and an unknown-key press and release emitted
    /// in its place, waking the host without leaking a keystroke.
    Suppressed,
    /// The event was dropped and re-emitted as this special key.
    Translated(KeyCode),
}

impl KeyAction {
    /// Whether the controller consumed the original event.
    pub fn is_handled(self) -> bool {
        matches!(self, Self::Suppressed | Self::Translated(_))
    }
}

/// Queue mode and display changes toward what the configuration wants.
///
/// Mode switches wait until no touch bar key is held; display switches only
/// wait when they would turn the display off under a held key. Returns true
/// when the worker should run now.
pub(crate) fn request_update(state: &mut TouchBarState, force: bool) -> bool {
    let want_mode = state.config.desired_mode(state.fn_pressed);
    let want_display = state.config.desired_display();
    let pressed = state.any_key_pressed();
    let mut need_update = force;

    if state.effective_mode() != want_mode && !pressed {
        state.pending_mode = Pending::Change(want_mode);
        need_update = true;
    }

    if state.effective_display() != want_display
        && (!pressed || want_display != DisplayLevel::Off)
    {
        state.pending_display = Pending::Change(want_display);
        need_update = true;
    }

    trace!(
        "update: need_update={}, want_mode={}, cur_mode={}, want_disp={}, cur_disp={}",
        need_update, want_mode, state.current_mode, want_display, state.current_display
    );
    need_update
}

/// Classify a touch bar key event.
///
/// Returns the action to take and whether the worker should run now.
pub(crate) fn classify_key(
    state: &mut TouchBarState,
    code: KeyCode,
    value: KeyValue,
    now: Instant,
) -> (KeyAction, bool) {
    let Some(slot) = code.slot() else {
        return (KeyAction::Ignored, false);
    };
    if !state.active {
        return (KeyAction::Ignored, false);
    }

    if value != KeyValue::Repeat {
        state.key_pressed[slot] = value.is_down();
    }
    state.last_event_time = now;

    let need_update = request_update(state, false);

    let action = if state.current_mode == TouchBarMode::Off
        || state.current_display == DisplayLevel::Off
    {
        KeyAction::Suppressed
    } else {
        match code.special() {
            Some(special)
                if (value.is_down() && state.effective_mode() == TouchBarMode::SpecialKeys)
                    || (value == KeyValue::Released && state.key_translated[slot]) =>
            {
                state.key_translated[slot] = true;
                KeyAction::Translated(special)
            }
            _ => {
                state.key_translated[slot] = false;
                KeyAction::Forwarded
            }
        }
    };

    (action, need_update)
}

/// Record an event from the built-in keyboard. Returns true when the worker
/// should run now.
pub(crate) fn record_keyboard_event(
    state: &mut TouchBarState,
    code: KeyCode,
    value: KeyValue,
    now: Instant,
) -> bool {
    if !state.active {
        return false;
    }
    if code == KeyCode::FN && value != KeyValue::Repeat {
        state.fn_pressed = value.is_down();
    }
    state.last_event_time = now;
    request_update(state, false)
}

/// Record activity that only resets the idle clock, e.g. a touchpad event.
pub(crate) fn record_activity(state: &mut TouchBarState, now: Instant) -> bool {
    if !state.active {
        return false;
    }
    state.last_event_time = now;
    request_update(state, false)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Config;

    fn state(mode: TouchBarMode, display: DisplayLevel) -> TouchBarState {
        let mut state = TouchBarState::new(Config::default(), Instant::now());
        state.active = true;
        state.reset_hardware_state(mode, display);
        state
    }

    #[test]
    fn test_inactive_ignores_keys() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::On);
        s.active = false;
        let (action, update) = classify_key(&mut s, KeyCode::F1, KeyValue::Pressed, Instant::now());
        assert_eq!(action, KeyAction::Ignored);
        assert!(!update);
        assert!(!s.key_pressed[1]);
    }

    #[test]
    fn test_non_touch_bar_key_ignored() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::On);
        let before = s.last_event_time;
        let later = before + Duration::from_secs(3);
        let (action, _) = classify_key(&mut s, KeyCode(30), KeyValue::Pressed, later);
        assert_eq!(action, KeyAction::Ignored);
        assert_eq!(s.last_event_time, before);
    }

    #[test]
    fn test_special_mode_translates() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::On);
        let now = Instant::now();
        let (action, update) = classify_key(&mut s, KeyCode::F10, KeyValue::Pressed, now);
        assert_eq!(action, KeyAction::Translated(KeyCode::MUTE));
        assert!(!update);
        assert!(s.key_translated[10]);
        assert!(s.key_pressed[10]);
    }

    #[test]
    fn test_function_mode_forwards() {
        let mut s = state(TouchBarMode::FunctionKeys, DisplayLevel::On);
        s.fn_pressed = true;
        let (action, _) = classify_key(&mut s, KeyCode::F10, KeyValue::Pressed, Instant::now());
        assert_eq!(action, KeyAction::Forwarded);
        assert!(!s.key_translated[10]);
    }

    #[test]
    fn test_escape_never_translated() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::On);
        let (action, _) = classify_key(&mut s, KeyCode::ESC, KeyValue::Pressed, Instant::now());
        assert_eq!(action, KeyAction::Forwarded);
    }

    #[test]
    fn test_repeat_keeps_pressed_state() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::On);
        let now = Instant::now();
        classify_key(&mut s, KeyCode::F2, KeyValue::Pressed, now);
        let (action, _) = classify_key(&mut s, KeyCode::F2, KeyValue::Repeat, now);
        assert_eq!(action, KeyAction::Translated(KeyCode::BRIGHTNESS_UP));
        assert!(s.key_pressed[2]);
    }

    #[test]
    fn test_display_off_suppresses() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::Off);
        let (action, update) = classify_key(&mut s, KeyCode::F1, KeyValue::Pressed, Instant::now());
        assert_eq!(action, KeyAction::Suppressed);
        // Waking the display is allowed even with the key held.
        assert!(update);
        assert_eq!(s.pending_display, Pending::Change(DisplayLevel::On));
    }

    #[test]
    fn test_no_mode_switch_while_held() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::On);
        let now = Instant::now();
        classify_key(&mut s, KeyCode::F3, KeyValue::Pressed, now);

        s.fn_pressed = true;
        assert!(!request_update(&mut s, false));
        assert_eq!(s.pending_mode, Pending::NoPendingChange);

        let (_, update) = classify_key(&mut s, KeyCode::F3, KeyValue::Released, now);
        assert!(update);
        assert_eq!(s.pending_mode, Pending::Change(TouchBarMode::FunctionKeys));
    }

    #[test]
    fn test_no_display_off_while_held() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::On);
        classify_key(&mut s, KeyCode::F3, KeyValue::Pressed, Instant::now());
        s.config.set_idle_timeout(0).unwrap();

        assert!(!request_update(&mut s, false));
        assert_eq!(s.pending_display, Pending::NoPendingChange);
        assert!(request_update(&mut s, true));
    }

    #[test]
    fn test_fn_key_tracking() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::On);
        let now = Instant::now();
        assert!(record_keyboard_event(&mut s, KeyCode::FN, KeyValue::Pressed, now));
        assert!(s.fn_pressed);
        assert_eq!(s.pending_mode, Pending::Change(TouchBarMode::FunctionKeys));

        record_keyboard_event(&mut s, KeyCode::FN, KeyValue::Repeat, now);
        assert!(s.fn_pressed);

        record_keyboard_event(&mut s, KeyCode::FN, KeyValue::Released, now);
        assert!(!s.fn_pressed);
        assert_eq!(s.pending_mode, Pending::Change(TouchBarMode::SpecialKeys));
    }

    #[test]
    fn test_activity_resets_idle_clock() {
        let mut s = state(TouchBarMode::SpecialKeys, DisplayLevel::Dim);
        let later = s.last_event_time + Duration::from_secs(100);
        assert!(record_activity(&mut s, later));
        assert_eq!(s.last_event_time, later);
        assert_eq!(s.pending_display, Pending::Change(DisplayLevel::On));
    }
}
