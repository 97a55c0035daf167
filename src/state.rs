//! The touch bar state store and its public snapshot.

use std::time::Instant;

use crate::config::Config;
use crate::keys::TOUCH_BAR_SLOTS;
use crate::modes::{DisplayLevel, FnMode, Pending, TouchBarMode};

/// The authoritative controller state, always accessed under the state lock.
#[derive(Debug, Clone)]
pub(crate) struct TouchBarState {
    pub(crate) active: bool,
    pub(crate) current_mode: TouchBarMode,
    pub(crate) pending_mode: Pending<TouchBarMode>,
    pub(crate) current_display: DisplayLevel,
    pub(crate) pending_display: Pending<DisplayLevel>,
    pub(crate) key_pressed: [bool; TOUCH_BAR_SLOTS],
    pub(crate) key_translated: [bool; TOUCH_BAR_SLOTS],
    pub(crate) fn_pressed: bool,
    pub(crate) last_event_time: Instant,
    pub(crate) config: Config,
    pub(crate) restore_power: bool,
}

/// The pending commands a worker pass picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CommandBatch {
    pub(crate) mode: Pending<TouchBarMode>,
    pub(crate) display: Pending<DisplayLevel>,
    pub(crate) current_display: DisplayLevel,
    pub(crate) restore_power: bool,
}

impl TouchBarState {
    pub(crate) fn new(config: Config, now: Instant) -> Self {
        Self {
            active: false,
            current_mode: TouchBarMode::Off,
            pending_mode: Pending::NoPendingChange,
            current_display: DisplayLevel::Off,
            pending_display: Pending::NoPendingChange,
            key_pressed: [false; TOUCH_BAR_SLOTS],
            key_translated: [false; TOUCH_BAR_SLOTS],
            fn_pressed: false,
            last_event_time: now,
            config,
            restore_power: false,
        }
    }

    pub(crate) fn any_key_pressed(&self) -> bool {
        self.key_pressed.iter().any(|&pressed| pressed)
    }

    /// The mode the touch bar is in or about to be in.
    pub(crate) fn effective_mode(&self) -> TouchBarMode {
        self.pending_mode.or_current(self.current_mode)
    }

    /// The display level the touch bar is at or about to be at.
    pub(crate) fn effective_display(&self) -> DisplayLevel {
        self.pending_display.or_current(self.current_display)
    }

    /// Record hardware state forced from outside the worker and drop
    /// whatever was pending.
    pub(crate) fn reset_hardware_state(&mut self, mode: TouchBarMode, display: DisplayLevel) {
        self.current_mode = mode;
        self.current_display = display;
        self.pending_mode = Pending::NoPendingChange;
        self.pending_display = Pending::NoPendingChange;
    }

    pub(crate) fn take_commands(&self) -> CommandBatch {
        CommandBatch {
            mode: self.pending_mode,
            display: self.pending_display,
            current_display: self.current_display,
            restore_power: self.restore_power,
        }
    }

    /// Merge the outcome of the commands in `batch` back into the state.
    ///
    /// Returns true when a newer request arrived while the commands were in
    /// flight and the worker has to run again right away.
    pub(crate) fn complete_commands(
        &mut self,
        batch: &CommandBatch,
        mode_ok: bool,
        display_ok: bool,
    ) -> bool {
        let mut need_reschedule = false;

        if let (true, Some(mode)) = (mode_ok, batch.mode.value()) {
            self.current_mode = mode;
            if self.pending_mode == batch.mode {
                self.pending_mode = Pending::NoPendingChange;
            } else {
                need_reschedule = true;
            }
        }

        if let (true, Some(display)) = (display_ok, batch.display.value()) {
            self.current_display = display;
            if self.pending_display == batch.display {
                self.pending_display = Pending::NoPendingChange;
            } else {
                need_reschedule = true;
            }
        }

        if batch.restore_power {
            self.restore_power = false;
        }
        need_reschedule
    }

    /// Claim the display for an idle transition to `next`.
    ///
    /// Returns `None` when the display is already there or another display
    /// request is still queued; that request is never overwritten.
    pub(crate) fn begin_idle_transition(&mut self, next: DisplayLevel) -> Option<CommandBatch> {
        if next == self.current_display || self.pending_display.is_pending() {
            return None;
        }
        self.pending_display = Pending::Change(next);
        Some(CommandBatch {
            mode: Pending::NoPendingChange,
            display: self.pending_display,
            current_display: self.current_display,
            restore_power: false,
        })
    }

    pub(crate) fn snapshot(&self, autopm_held: bool) -> StateSnapshot {
        StateSnapshot {
            active: self.active,
            current_mode: self.current_mode,
            pending_mode: self.pending_mode,
            current_display: self.current_display,
            pending_display: self.pending_display,
            key_pressed: self.key_pressed,
            key_translated: self.key_translated,
            fn_pressed: self.fn_pressed,
            last_event_time: self.last_event_time,
            idle_timeout: self.config.idle_timeout(),
            dim_timeout: self.config.effective_dim_timeout(),
            dim_timeout_is_derived: self.config.is_dim_timeout_derived(),
            fn_mode: self.config.fn_mode(),
            autopm_held,
        }
    }
}

/// A snapshot of the controller's state.
///
/// Use [`TouchBar::state`](crate::TouchBar::state) to obtain one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Whether the controller may drive the hardware.
    pub active: bool,
    /// The last mode the hardware confirmed.
    pub current_mode: TouchBarMode,
    /// A requested mode not yet confirmed.
    pub pending_mode: Pending<TouchBarMode>,
    /// The last display level the hardware confirmed.
    pub current_display: DisplayLevel,
    /// A requested display level not yet confirmed.
    pub pending_display: Pending<DisplayLevel>,
    /// Which touch bar slots are held down.
    pub key_pressed: [bool; TOUCH_BAR_SLOTS],
    /// Which slots' last down-event was translated to a special key.
    pub key_translated: [bool; TOUCH_BAR_SLOTS],
    /// Whether FN is held.
    pub fn_pressed: bool,
    /// Time of the last keyboard, touchpad or touch bar event.
    pub last_event_time: Instant,
    /// The idle timeout in seconds.
    pub idle_timeout: i32,
    /// The dim timeout in effect, in seconds.
    pub dim_timeout: i32,
    /// Whether the dim timeout is derived from the idle timeout.
    pub dim_timeout_is_derived: bool,
    /// The fn-key policy.
    pub fn_mode: FnMode,
    /// Whether a display power reference is held.
    pub autopm_held: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TouchBarState {
        let mut state = TouchBarState::new(Config::default(), Instant::now());
        state.active = true;
        state
    }

    #[test]
    fn test_merge_clears_matching_pending() {
        let mut state = state();
        state.pending_mode = Pending::Change(TouchBarMode::SpecialKeys);
        state.pending_display = Pending::Change(DisplayLevel::On);

        let batch = state.take_commands();
        assert!(!state.complete_commands(&batch, true, true));
        assert_eq!(state.current_mode, TouchBarMode::SpecialKeys);
        assert_eq!(state.current_display, DisplayLevel::On);
        assert_eq!(state.pending_mode, Pending::NoPendingChange);
        assert_eq!(state.pending_display, Pending::NoPendingChange);
    }

    #[test]
    fn test_merge_keeps_newer_request() {
        let mut state = state();
        state.pending_mode = Pending::Change(TouchBarMode::SpecialKeys);
        let batch = state.take_commands();

        // FN went down while the command was in flight.
        state.pending_mode = Pending::Change(TouchBarMode::FunctionKeys);

        assert!(state.complete_commands(&batch, true, false));
        assert_eq!(state.current_mode, TouchBarMode::SpecialKeys);
        assert_eq!(
            state.pending_mode,
            Pending::Change(TouchBarMode::FunctionKeys)
        );
    }

    #[test]
    fn test_merge_failure_leaves_pending() {
        let mut state = state();
        state.pending_display = Pending::Change(DisplayLevel::Dim);
        let batch = state.take_commands();

        assert!(!state.complete_commands(&batch, false, false));
        assert_eq!(state.current_display, DisplayLevel::Off);
        assert_eq!(state.pending_display, Pending::Change(DisplayLevel::Dim));
    }

    #[test]
    fn test_idle_transition_yields_to_queued_request() {
        let mut state = state();
        state.current_display = DisplayLevel::Dim;
        state.pending_display = Pending::Change(DisplayLevel::On);

        assert_eq!(state.begin_idle_transition(DisplayLevel::Off), None);
        assert_eq!(state.pending_display, Pending::Change(DisplayLevel::On));

        state.pending_display = Pending::NoPendingChange;
        assert_eq!(state.begin_idle_transition(DisplayLevel::Dim), None);

        let batch = state.begin_idle_transition(DisplayLevel::Off);
        assert_eq!(state.pending_display, Pending::Change(DisplayLevel::Off));
        assert_eq!(
            batch.map(|batch| (batch.display, batch.current_display)),
            Some((Pending::Change(DisplayLevel::Off), DisplayLevel::Dim))
        );
    }
}
