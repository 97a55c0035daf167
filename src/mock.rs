//! Mock transport and input sink for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::channel::{CommandTransport, Interface};
use crate::error::ChannelError;
use crate::keys::{InputSink, KeyEvent};
use crate::modes::{DisplayLevel, TouchBarMode};

/// A command observed by [`MockTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// A mode command.
    Mode(TouchBarMode),
    /// A display command.
    Display(DisplayLevel),
    /// A power reference was taken.
    Acquire(Interface),
    /// A power reference was dropped.
    Release(Interface),
}

type SendHook = Box<dyn FnMut(Command) + Send>;

#[derive(Default)]
struct MockInner {
    commands: Vec<Command>,
    failures: [VecDeque<ChannelError>; 2],
    power_failures: VecDeque<ChannelError>,
    attempts: [usize; 2],
    power_refs: [i32; 2],
    mode: Option<TouchBarMode>,
    display: Option<DisplayLevel>,
}

/// A mock command transport for testing.
///
/// This allows testing the controller without touch bar hardware. Clones
/// share state: hand one to the controller and inspect through another.
///
/// # Example
///
/// ```
/// use touchbar_core::{CommandChannel, MockTransport, RetryPolicy, TouchBarMode};
///
/// let mock = MockTransport::new();
/// let channel = CommandChannel::new(mock.clone(), RetryPolicy::default());
/// channel.set_mode(TouchBarMode::SpecialKeys).unwrap();
/// assert_eq!(mock.mode(), Some(TouchBarMode::SpecialKeys));
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
    hook: Arc<Mutex<Option<SendHook>>>,
}

impl MockTransport {
    /// Create a mock transport where every command succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` commands on `interface` fail with `error`.
    pub fn fail_next(&self, interface: Interface, error: ChannelError, times: usize) {
        let mut inner = self.inner.lock();
        let queue = &mut inner.failures[interface.index()];
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Make the next power-reference acquisition fail.
    pub fn fail_power(&self, error: ChannelError) {
        self.inner.lock().power_failures.push_back(error);
    }

    /// Run `hook` before every send attempt, outside the mock's own lock.
    pub fn on_send(&self, hook: impl FnMut(Command) + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// Successful commands and power operations, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.inner.lock().commands.clone()
    }

    /// Successful mode and display commands only.
    pub fn sent(&self) -> Vec<Command> {
        self.commands()
            .into_iter()
            .filter(|c| matches!(c, Command::Mode(_) | Command::Display(_)))
            .collect()
    }

    /// Forget recorded commands and attempt counts.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.commands.clear();
        inner.attempts = [0; 2];
    }

    /// Number of send attempts on `interface`, failed ones included.
    pub fn attempts(&self, interface: Interface) -> usize {
        self.inner.lock().attempts[interface.index()]
    }

    /// Outstanding power references on `interface`.
    pub fn power_refs(&self, interface: Interface) -> i32 {
        self.inner.lock().power_refs[interface.index()]
    }

    /// The last mode successfully sent.
    pub fn mode(&self) -> Option<TouchBarMode> {
        self.inner.lock().mode
    }

    /// The last display level successfully sent.
    pub fn display(&self) -> Option<DisplayLevel> {
        self.inner.lock().display
    }

    fn run_hook(&self, command: Command) {
        let hook = self.hook.lock().take();
        if let Some(mut hook) = hook {
            hook(command);
            let mut slot = self.hook.lock();
            if slot.is_none() {
                *slot = Some(hook);
            }
        }
    }

    fn send(&mut self, interface: Interface, command: Command) -> Result<(), ChannelError> {
        self.run_hook(command);

        let mut inner = self.inner.lock();
        inner.attempts[interface.index()] += 1;
        if let Some(error) = inner.failures[interface.index()].pop_front() {
            return Err(error);
        }
        match command {
            Command::Mode(mode) => inner.mode = Some(mode),
            Command::Display(level) => inner.display = Some(level),
            _ => {}
        }
        inner.commands.push(command);
        Ok(())
    }
}

impl CommandTransport for MockTransport {
    fn send_mode(&mut self, mode: u8) -> Result<(), ChannelError> {
        let mode = TouchBarMode::from_command_byte(mode).ok_or(ChannelError::Transfer(-22))?;
        self.send(Interface::Mode, Command::Mode(mode))
    }

    fn send_display(&mut self, level: u8) -> Result<(), ChannelError> {
        let level = DisplayLevel::from_command_byte(level).ok_or(ChannelError::Transfer(-22))?;
        self.send(Interface::Display, Command::Display(level))
    }

    fn acquire_power(&mut self, interface: Interface) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.power_failures.pop_front() {
            return Err(error);
        }
        inner.power_refs[interface.index()] += 1;
        inner.commands.push(Command::Acquire(interface));
        Ok(())
    }

    fn release_power(&mut self, interface: Interface) {
        let mut inner = self.inner.lock();
        inner.power_refs[interface.index()] -= 1;
        inner.commands.push(Command::Release(interface));
    }
}

/// An input sink that records every event it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<KeyEvent>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the recorded events, leaving the sink empty.
    pub fn take(&self) -> Vec<KeyEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl InputSink for RecordingSink {
    fn emit(&self, event: KeyEvent) {
        self.events.lock().push(event);
    }
}
