//! Command channel to the touch bar.
//!
//! The touch bar exposes two command interfaces: one sets the mode, the
//! other the display level. A [`CommandTransport`] does the actual I/O;
//! [`CommandChannel`] wraps it with the stall-retry policy and the
//! power-reference bookkeeping.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error};
use parking_lot::{Mutex, MutexGuard};

use crate::error::ChannelError;
use crate::modes::{DisplayLevel, TouchBarMode};

/// One of the two touch bar command interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    /// Sets the mode.
    Mode,
    /// Sets the display level.
    Display,
}

impl Interface {
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Mode => 0,
            Self::Display => 1,
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mode => f.write_str("mode"),
            Self::Display => f.write_str("display"),
        }
    }
}

// =============================================================================
// Command Transport Trait
// =============================================================================

/// Sends raw commands to the touch bar.
///
/// Implementations own the wire encoding. Calls may block.
pub trait CommandTransport: Send {
    /// Send a mode command byte.
    fn send_mode(&mut self, mode: u8) -> Result<(), ChannelError>;

    /// Send a display command byte.
    fn send_display(&mut self, level: u8) -> Result<(), ChannelError>;

    /// Take a power-management reference, keeping the interface awake.
    fn acquire_power(&mut self, interface: Interface) -> Result<(), ChannelError>;

    /// Drop a reference taken with [`acquire_power`](Self::acquire_power).
    fn release_power(&mut self, interface: Interface);
}

// =============================================================================
// Retry Policy
// =============================================================================

/// How often and how patiently to retry a stalled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Delay after the first stall; doubles on every further stall.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// The delay to wait after the given (zero-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(1 << attempt.min(16))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(1),
        }
    }
}

// =============================================================================
// Command Channel
// =============================================================================

/// Retrying, power-aware wrapper around a [`CommandTransport`].
///
/// Commands are serialized on an internal lock that is separate from the
/// controller's state lock.
pub struct CommandChannel<T> {
    transport: Mutex<T>,
    retry: RetryPolicy,
    autopm_held: AtomicBool,
}

impl<T: CommandTransport> CommandChannel<T> {
    /// Wrap a transport.
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self {
            transport: Mutex::new(transport),
            retry,
            autopm_held: AtomicBool::new(false),
        }
    }

    /// Whether a power reference on the display interface is held.
    pub fn autopm_held(&self) -> bool {
        self.autopm_held.load(Ordering::SeqCst)
    }

    /// Lock and borrow the transport.
    pub fn transport(&self) -> MutexGuard<'_, T> {
        self.transport.lock()
    }

    fn send(&self, transport: &mut T, interface: Interface, byte: u8) -> Result<(), ChannelError> {
        let mut attempt = 0;
        loop {
            let result = match interface {
                Interface::Mode => transport.send_mode(byte),
                Interface::Display => transport.send_display(byte),
            };
            match result {
                Err(e) if e.is_stall() && attempt + 1 < self.retry.attempts => {
                    let delay = self.retry.delay(attempt);
                    debug!(
                        "{} command {} stalled, retrying in {:?}",
                        interface, byte, delay
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Set the touch bar mode.
    ///
    /// Holds a power reference on the mode interface for the duration of
    /// the command. Failing to take it is logged and the command is sent
    /// anyway.
    pub fn set_mode(&self, mode: TouchBarMode) -> Result<(), ChannelError> {
        let mut transport = self.transport.lock();

        let powered = match transport.acquire_power(Interface::Mode) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to disable auto-pm on touch bar mode interface ({e})");
                false
            }
        };

        let result = self.send(&mut transport, Interface::Mode, mode.command_byte());
        if let Err(e) = &result {
            error!("Failed to set touch bar mode to {mode} ({e})");
        }

        if powered {
            transport.release_power(Interface::Mode);
        }
        result
    }

    /// Set the display level, given the level the display is currently at.
    ///
    /// Leaving `Off` takes a power reference on the display interface so it
    /// stays responsive; a successful switch to `Off` drops it again.
    pub fn set_display(&self, level: DisplayLevel, current: DisplayLevel) -> Result<(), ChannelError> {
        let mut transport = self.transport.lock();

        if level != DisplayLevel::Off && current == DisplayLevel::Off && !self.autopm_held() {
            match transport.acquire_power(Interface::Display) {
                Ok(()) => self.autopm_held.store(true, Ordering::SeqCst),
                Err(e) => {
                    error!("Failed to disable auto-pm on touch bar display interface ({e})")
                }
            }
        }

        let result = self.send(&mut transport, Interface::Display, level.command_byte());
        match &result {
            Ok(()) if level == DisplayLevel::Off => self.release_locked(&mut transport),
            Ok(()) => {}
            Err(e) => error!("Failed to set touch bar display to {level} ({e})"),
        }
        result
    }

    /// Drop the display power reference if one is held.
    pub fn release_power(&self) {
        let mut transport = self.transport.lock();
        self.release_locked(&mut transport);
    }

    fn release_locked(&self, transport: &mut T) {
        if self.autopm_held.swap(false, Ordering::SeqCst) {
            transport.release_power(Interface::Display);
        }
    }

    /// Re-take the display power reference after a hibernation restore.
    ///
    /// The device comes back from the snapshot with its usage count reset,
    /// so the reference still recorded here is no longer counted by it.
    /// This acquire replaces the dropped one and is balanced by the single
    /// [`release_power`](Self::release_power) that follows; it is not a
    /// second reference. Does nothing when no reference is recorded.
    pub fn restore_power(&self) {
        if !self.autopm_held() {
            return;
        }
        let mut transport = self.transport.lock();
        if let Err(e) = transport.acquire_power(Interface::Display) {
            error!("Failed to restore auto-pm on touch bar display interface ({e})");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Command, MockTransport};

    fn channel(mock: &MockTransport) -> CommandChannel<MockTransport> {
        CommandChannel::new(
            mock.clone(),
            RetryPolicy {
                attempts: 5,
                base_delay: Duration::ZERO,
            },
        )
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay(0), Duration::from_millis(1));
        assert_eq!(retry.delay(4), Duration::from_millis(16));
    }

    #[test]
    fn test_stall_is_retried() {
        let mock = MockTransport::new();
        mock.fail_next(Interface::Mode, ChannelError::Stall, 4);
        let channel = channel(&mock);

        channel.set_mode(TouchBarMode::FunctionKeys).unwrap();
        assert_eq!(mock.attempts(Interface::Mode), 5);
        assert_eq!(mock.mode(), Some(TouchBarMode::FunctionKeys));
    }

    #[test]
    fn test_stall_gives_up_after_five_attempts() {
        let mock = MockTransport::new();
        mock.fail_next(Interface::Display, ChannelError::Stall, 10);
        let channel = channel(&mock);

        let err = channel
            .set_display(DisplayLevel::Dim, DisplayLevel::On)
            .unwrap_err();
        assert_eq!(err, ChannelError::Stall);
        assert_eq!(mock.attempts(Interface::Display), 5);
    }

    #[test]
    fn test_other_errors_not_retried() {
        let mock = MockTransport::new();
        mock.fail_next(Interface::Mode, ChannelError::Transfer(-71), 1);
        let channel = channel(&mock);

        assert!(channel.set_mode(TouchBarMode::Off).is_err());
        assert_eq!(mock.attempts(Interface::Mode), 1);
    }

    #[test]
    fn test_mode_power_reference_is_scoped() {
        let mock = MockTransport::new();
        let channel = channel(&mock);

        channel.set_mode(TouchBarMode::SpecialKeys).unwrap();
        assert_eq!(
            mock.commands(),
            vec![
                Command::Acquire(Interface::Mode),
                Command::Mode(TouchBarMode::SpecialKeys),
                Command::Release(Interface::Mode),
            ]
        );
        assert_eq!(mock.power_refs(Interface::Mode), 0);
    }

    #[test]
    fn test_display_power_reference() {
        let mock = MockTransport::new();
        let channel = channel(&mock);

        channel
            .set_display(DisplayLevel::On, DisplayLevel::Off)
            .unwrap();
        assert!(channel.autopm_held());
        channel.set_display(DisplayLevel::Dim, DisplayLevel::On).unwrap();
        assert_eq!(mock.power_refs(Interface::Display), 1);

        channel.set_display(DisplayLevel::Off, DisplayLevel::Dim).unwrap();
        assert!(!channel.autopm_held());
        assert_eq!(mock.power_refs(Interface::Display), 0);

        // Releasing again must not double-release.
        channel.release_power();
        assert_eq!(mock.power_refs(Interface::Display), 0);
    }

    #[test]
    fn test_failed_off_keeps_reference() {
        let mock = MockTransport::new();
        let channel = channel(&mock);
        channel
            .set_display(DisplayLevel::On, DisplayLevel::Off)
            .unwrap();

        mock.fail_next(Interface::Display, ChannelError::Transfer(-5), 1);
        assert!(channel.set_display(DisplayLevel::Off, DisplayLevel::On).is_err());
        assert!(channel.autopm_held());
        assert_eq!(mock.power_refs(Interface::Display), 1);
    }

    #[test]
    fn test_restore_power_only_when_held() {
        let mock = MockTransport::new();
        let channel = channel(&mock);

        channel.restore_power();
        assert!(mock.commands().is_empty());

        channel
            .set_display(DisplayLevel::On, DisplayLevel::Off)
            .unwrap();
        mock.clear();
        channel.restore_power();
        assert_eq!(mock.commands(), vec![Command::Acquire(Interface::Display)]);
        assert!(channel.autopm_held());

        // One release for the recorded reference.
        channel.release_power();
        channel.release_power();
        assert_eq!(mock.commands().last(), Some(&Command::Release(Interface::Display)));
        assert_eq!(
            mock.commands()
                .iter()
                .filter(|c| **c == Command::Release(Interface::Display))
                .count(),
            1
        );
    }

    #[test]
    fn test_power_failure_still_sends() {
        let mock = MockTransport::new();
        mock.fail_power(ChannelError::Power(-13));
        let channel = channel(&mock);

        channel
            .set_display(DisplayLevel::On, DisplayLevel::Off)
            .unwrap();
        assert!(!channel.autopm_held());
        assert_eq!(mock.display(), Some(DisplayLevel::On));
    }
}
