//! The touch bar controller.
//!
//! Event handlers and configuration writes run on the caller's thread,
//! update the state under the state lock and kick the worker. The worker
//! pushes pending changes to the hardware and re-arms itself for the next
//! dim or off transition.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace};
use parking_lot::Mutex;

use crate::channel::{CommandChannel, CommandTransport, Interface, RetryPolicy};
use crate::classifier::{self, KeyAction};
use crate::clock::{Clock, SystemClock};
use crate::config::{Attribute, Config};
use crate::error::{ConfigError, ControllerError};
use crate::keys::{InputSink, KeyCode, KeyEvent, KeyValue, TOUCH_BAR_SLOTS};
use crate::modes::{DisplayLevel, FnMode, Pending, TouchBarMode};
use crate::scheduler::WorkQueue;
use crate::state::{CommandBatch, StateSnapshot, TouchBarState};
use crate::timeout::{self, Timeouts};

/// Default pause between a mode and a display command in one pass.
pub const DEFAULT_INTER_COMMAND_DELAY: Duration = Duration::from_millis(25);

/// Construction options for a [`TouchBar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// The configuration applied whenever the controller activates.
    pub config: Config,
    /// Stall-retry policy for commands.
    pub retry: RetryPolicy,
    /// Pause between a mode and a display command sent in the same pass.
    pub inter_command_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: Config::default(),
            retry: RetryPolicy::default(),
            inter_command_delay: DEFAULT_INTER_COMMAND_DELAY,
        }
    }
}

/// How deep the system is going to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendKind {
    /// Ordinary suspend: the touch bar is switched off first.
    Suspend,
    /// Freeze for hibernation: the device is about to be snapshotted and
    /// no commands are sent.
    Freeze,
}

// =============================================================================
// Shared Controller State
// =============================================================================

struct Shared<T> {
    state: Mutex<TouchBarState>,
    attached: Mutex<[bool; 2]>,
    channel: CommandChannel<T>,
    queue: WorkQueue,
    clock: Arc<dyn Clock>,
    defaults: Config,
    inter_command_delay: Duration,
}

fn secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

impl<T: CommandTransport> Shared<T> {
    fn new(transport: T, options: Options, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(TouchBarState::new(options.config, now)),
            attached: Mutex::new([false; 2]),
            channel: CommandChannel::new(transport, options.retry),
            queue: WorkQueue::new(),
            clock,
            defaults: options.config,
            inter_command_delay: options.inter_command_delay,
        }
    }

    fn kick(&self, now: Instant) {
        self.queue.reschedule(now, Duration::ZERO);
    }

    fn activate(&self) {
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            state.active = true;
            state.config = self.defaults;
            state.reset_hardware_state(TouchBarMode::Off, DisplayLevel::Off);
            state.key_pressed = [false; TOUCH_BAR_SLOTS];
            state.key_translated = [false; TOUCH_BAR_SLOTS];
            state.fn_pressed = false;
            state.last_event_time = now;
            state.restore_power = false;
            classifier::request_update(&mut state, true);
        }
        self.kick(now);
        info!("Touch bar activated");
    }

    /// Stop the worker and leave the hardware in its resting state.
    fn deactivate(&self) {
        self.state.lock().active = false;
        self.queue.cancel_sync();

        let current_display = self.state.lock().current_display;
        let mode_ok = self.channel.set_mode(TouchBarMode::Off).is_ok();
        let display_ok = self
            .channel
            .set_display(DisplayLevel::On, current_display)
            .is_ok();
        self.channel.release_power();

        let mut state = self.state.lock();
        if mode_ok {
            state.current_mode = TouchBarMode::Off;
        }
        if display_ok {
            state.current_display = DisplayLevel::On;
        }
        state.pending_mode = Pending::NoPendingChange;
        state.pending_display = Pending::NoPendingChange;
        state.key_pressed = [false; TOUCH_BAR_SLOTS];
        state.key_translated = [false; TOUCH_BAR_SLOTS];
        drop(state);

        info!("Touch bar deactivated");
    }

    // =========================================================================
    // Worker
    // =========================================================================

    /// One reconciliation pass.
    fn run_worker(&self) {
        let batch = {
            let state = self.state.lock();
            if !state.active {
                trace!("worker: controller inactive, nothing to do");
                return;
            }
            state.take_commands()
        };

        // Re-take a reference the device lost across sleep before a display
        // command takes a fresh one.
        if batch.restore_power {
            self.channel.restore_power();
        }

        let mode_ok = batch
            .mode
            .value()
            .is_some_and(|mode| self.channel.set_mode(mode).is_ok());

        if batch.mode.is_pending()
            && batch.display.is_pending()
            && !self.inter_command_delay.is_zero()
        {
            thread::sleep(self.inter_command_delay);
        }

        let display_ok = batch.display.value().is_some_and(|level| {
            self.channel
                .set_display(level, batch.current_display)
                .is_ok()
        });

        let now = self.clock.now();
        let followup = {
            let mut state = self.state.lock();
            if state.complete_commands(&batch, mode_ok, display_ok) {
                Followup::Rerun
            } else {
                plan_idle(&mut state, now)
            }
        };

        match followup {
            Followup::Rerun => {
                debug!("worker: state changed while commands were in flight");
                self.queue.schedule(now, Duration::ZERO);
            }
            Followup::Idle => {}
            Followup::Rearm(delay) => {
                self.queue.schedule(now, secs(delay));
            }
            Followup::Transition(batch, timeouts) => self.fire_timeout(now, batch, timeouts),
        }
    }

    /// Send the idle transition claimed by [`plan_idle`].
    fn fire_timeout(&self, now: Instant, batch: CommandBatch, timeouts: Timeouts) {
        let Some(next) = batch.display.value() else {
            return;
        };
        debug!("idle timeout: display {} -> {}", batch.current_display, next);

        let display_ok = self
            .channel
            .set_display(next, batch.current_display)
            .is_ok();
        let need_reschedule = self
            .state
            .lock()
            .complete_commands(&batch, false, display_ok);

        if need_reschedule {
            self.queue.schedule(now, Duration::ZERO);
        } else if !display_ok {
            self.queue.schedule(now, secs(timeouts.min_timeout));
        } else if let Some(time_to_off) = timeouts.time_to_off.filter(|&t| t > 0) {
            self.queue.schedule(now, secs(time_to_off));
        }
    }
}

/// What a worker pass does after its commands are merged back.
#[derive(Debug)]
enum Followup {
    /// A request arrived while commands were in flight.
    Rerun,
    /// No timeout is configured.
    Idle,
    /// Come back after this many seconds.
    Rearm(u64),
    /// The idle clock ran out; the display change is already pending.
    Transition(CommandBatch, Timeouts),
}

/// Decide the idle follow-up under the state lock, so a request made
/// between the decision and the transition cannot be overwritten.
fn plan_idle(state: &mut TouchBarState, now: Instant) -> Followup {
    let Some(timeouts) = timeout::compute(
        now,
        state.last_event_time,
        state.config.idle_timeout(),
        state.config.effective_dim_timeout(),
    ) else {
        return Followup::Idle;
    };

    if timeouts.time_left > 0 {
        return Followup::Rearm(timeouts.time_left);
    }
    if state.any_key_pressed() {
        trace!("worker: key held, deferring idle transition");
        return Followup::Rearm(timeouts.min_timeout);
    }
    if state.pending_display.is_pending() {
        trace!("worker: display request queued, deferring idle transition");
        return Followup::Rearm(timeouts.min_timeout);
    }

    let next = if timeouts.time_to_off == Some(0) {
        DisplayLevel::Off
    } else {
        DisplayLevel::Dim
    };
    match state.begin_idle_transition(next) {
        Some(batch) => Followup::Transition(batch, timeouts),
        None => match timeouts.time_to_off.filter(|&t| t > 0) {
            Some(time_to_off) => Followup::Rearm(time_to_off),
            None => Followup::Idle,
        },
    }
}

// =============================================================================
// Touch Bar Controller
// =============================================================================

/// The touch bar controller.
///
/// Created idle; it starts driving the hardware once both command
/// interfaces are [attached](Self::attach).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use touchbar_core::{
///     DisplayLevel, Interface, MockClock, MockTransport, Options, TouchBar, TouchBarMode,
/// };
///
/// let mock = MockTransport::new();
/// let clock = MockClock::new();
/// let touch_bar = TouchBar::manual(mock.clone(), Options::default(), Arc::new(clock.clone()));
///
/// touch_bar.attach(Interface::Mode).unwrap();
/// touch_bar.attach(Interface::Display).unwrap();
/// touch_bar.run_due_work();
/// assert_eq!(mock.mode(), Some(TouchBarMode::SpecialKeys));
///
/// clock.advance(Duration::from_secs(270));
/// touch_bar.run_due_work();
/// assert_eq!(mock.display(), Some(DisplayLevel::Dim));
/// ```
pub struct TouchBar<T: CommandTransport + 'static> {
    shared: Arc<Shared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: CommandTransport + 'static> TouchBar<T> {
    /// Create a controller with its own worker thread and the system clock.
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(transport: T, options: Options) -> Result<Self, ControllerError> {
        let shared = Arc::new(Shared::new(transport, options, Arc::new(SystemClock)));
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("touchbar-worker".to_string())
                .spawn(move || {
                    while shared.queue.wait_due() {
                        shared.run_worker();
                        shared.queue.finish();
                    }
                    debug!("touch bar worker exiting");
                })?
        };
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Create a controller without a worker thread.
    ///
    /// The caller drives the worker with [`run_due_work`](Self::run_due_work),
    /// and time comes from `clock`.
    pub fn manual(transport: T, options: Options, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared::new(transport, options, clock)),
            worker: None,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Attach a command interface. The controller activates once both are
    /// attached.
    ///
    /// # Errors
    /// Returns [`ControllerError::AlreadyAttached`] if it already is.
    pub fn attach(&self, interface: Interface) -> Result<(), ControllerError> {
        let mut attached = self.shared.attached.lock();
        if attached[interface.index()] {
            return Err(ControllerError::AlreadyAttached(interface));
        }
        attached[interface.index()] = true;
        debug!("{} interface attached", interface);

        if attached.iter().all(|&a| a) {
            self.shared.activate();
        }
        Ok(())
    }

    /// Detach a command interface. If the controller was fully attached it
    /// is deactivated first.
    ///
    /// # Errors
    /// Returns [`ControllerError::NotAttached`] if it was not attached.
    pub fn detach(&self, interface: Interface) -> Result<(), ControllerError> {
        let mut attached = self.shared.attached.lock();
        if !attached[interface.index()] {
            return Err(ControllerError::NotAttached(interface));
        }
        if attached.iter().all(|&a| a) {
            self.shared.deactivate();
        }
        attached[interface.index()] = false;
        debug!("{} interface detached", interface);
        Ok(())
    }

    /// Whether an interface is attached.
    pub fn is_attached(&self, interface: Interface) -> bool {
        self.shared.attached.lock()[interface.index()]
    }

    /// Whether the controller may drive the hardware.
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    /// Reset to the default configuration and start driving the hardware.
    ///
    /// Returns false, doing nothing, unless both interfaces are attached.
    pub fn activate(&self) -> bool {
        let attached = self.shared.attached.lock();
        if !attached.iter().all(|&a| a) {
            debug!("activate: interfaces missing, staying inactive");
            return false;
        }
        self.shared.activate();
        true
    }

    /// Stop the worker and put the touch bar into its resting state (mode
    /// off, display on), releasing the display power reference.
    pub fn deactivate(&self) {
        let attached = self.shared.attached.lock();
        if attached.iter().all(|&a| a) {
            self.shared.deactivate();
        } else {
            self.shared.state.lock().active = false;
            self.shared.queue.cancel_sync();
        }
    }

    /// Prepare for system sleep.
    ///
    /// The worker is stopped and has finished when this returns.
    pub fn suspend(&self, kind: SuspendKind) {
        let attached = self.shared.attached.lock();
        self.shared.state.lock().active = false;
        self.shared.queue.cancel_sync();
        if !attached.iter().all(|&a| a) {
            return;
        }

        if kind == SuspendKind::Suspend {
            let current_display = self.shared.state.lock().current_display;
            // Failures are logged by the channel; the hardware is about to
            // lose power either way.
            let _ = self.shared.channel.set_mode(TouchBarMode::Off);
            let _ = self
                .shared
                .channel
                .set_display(DisplayLevel::Off, current_display);
        }

        self.shared
            .state
            .lock()
            .reset_hardware_state(TouchBarMode::Off, DisplayLevel::Off);
        info!("Touch bar suspended ({:?})", kind);
    }

    /// Restore the touch bar after system sleep.
    pub fn resume(&self) {
        let attached = self.shared.attached.lock();
        if !attached.iter().all(|&a| a) {
            return;
        }

        let now = self.shared.clock.now();
        {
            let mut state = self.shared.state.lock();
            state.active = true;
            state.restore_power = true;
            state.last_event_time = now;
            state.key_pressed = [false; TOUCH_BAR_SLOTS];
            state.key_translated = [false; TOUCH_BAR_SLOTS];
            classifier::request_update(&mut state, true);
        }
        self.shared.kick(now);
        info!("Touch bar resumed");
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Handle an event from the touch bar's own key interface.
    ///
    /// Replacement events are emitted to `sink` after the state lock is
    /// released, so the sink may call back into the controller.
    pub fn handle_key_event(&self, code: KeyCode, value: KeyValue, sink: &dyn InputSink) -> KeyAction {
        let now = self.shared.clock.now();
        let (action, need_update) = {
            let mut state = self.shared.state.lock();
            classifier::classify_key(&mut state, code, value, now)
        };
        if need_update {
            self.shared.kick(now);
        }

        match action {
            KeyAction::Suppressed => {
                trace!("touch bar off, waking it with a dummy key for {}", code);
                sink.emit(KeyEvent::new(KeyCode::UNKNOWN, KeyValue::Pressed));
                sink.emit(KeyEvent::new(KeyCode::UNKNOWN, KeyValue::Released));
            }
            KeyAction::Translated(special) => sink.emit(KeyEvent::new(special, value)),
            KeyAction::Ignored | KeyAction::Forwarded => {}
        }
        action
    }

    /// Handle an event from the built-in keyboard.
    pub fn handle_keyboard_event(&self, code: KeyCode, value: KeyValue) {
        let now = self.shared.clock.now();
        let need_update = {
            let mut state = self.shared.state.lock();
            classifier::record_keyboard_event(&mut state, code, value, now)
        };
        if need_update {
            self.shared.kick(now);
        }
    }

    /// Handle the FN key going down or up.
    pub fn handle_fn_event(&self, pressed: bool) {
        let value = if pressed {
            KeyValue::Pressed
        } else {
            KeyValue::Released
        };
        self.handle_keyboard_event(KeyCode::FN, value);
    }

    /// Handle touchpad activity.
    pub fn handle_touchpad_event(&self) {
        let now = self.shared.clock.now();
        let need_update = {
            let mut state = self.shared.state.lock();
            classifier::record_activity(&mut state, now)
        };
        if need_update {
            self.shared.kick(now);
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The current configuration.
    pub fn config(&self) -> Config {
        self.shared.state.lock().config
    }

    /// Set the idle timeout in seconds.
    ///
    /// # Errors
    /// Returns an error if the value is below -2.
    pub fn set_idle_timeout(&self, value: i64) -> Result<(), ConfigError> {
        self.set_attribute(Attribute::IdleTimeout, value)
    }

    /// Set the dim timeout in seconds; -2 derives it from the idle timeout.
    ///
    /// # Errors
    /// Returns an error if the value is below -2.
    pub fn set_dim_timeout(&self, value: i64) -> Result<(), ConfigError> {
        self.set_attribute(Attribute::DimTimeout, value)
    }

    /// Set the fn-key policy.
    pub fn set_fn_mode(&self, fn_mode: FnMode) {
        let now = self.shared.clock.now();
        let need_update = {
            let mut state = self.shared.state.lock();
            state.config.set_fn_mode(fn_mode);
            state.active && classifier::request_update(&mut state, true)
        };
        debug!("{} set to {:?}", Attribute::FnMode, fn_mode);
        if need_update {
            self.shared.kick(now);
        }
    }

    /// Read an attribute's value.
    pub fn read_attribute(&self, attribute: Attribute) -> i64 {
        attribute.read(&self.shared.state.lock().config)
    }

    /// Parse and write an attribute.
    ///
    /// # Errors
    /// Returns an error if the text is not an integer or out of range; the
    /// configuration is left unchanged.
    pub fn write_attribute(&self, attribute: Attribute, text: &str) -> Result<(), ConfigError> {
        let value = attribute.parse_value(text)?;
        self.set_attribute(attribute, value)
    }

    /// Write an attribute and force a reconciliation pass.
    ///
    /// # Errors
    /// Returns an error if the value is out of range; the configuration is
    /// left unchanged.
    pub fn set_attribute(&self, attribute: Attribute, value: i64) -> Result<(), ConfigError> {
        let now = self.shared.clock.now();
        let need_update = {
            let mut state = self.shared.state.lock();
            attribute.write(&mut state.config, value)?;
            state.active && classifier::request_update(&mut state, true)
        };
        debug!("{} set to {}", attribute, value);
        if need_update {
            self.shared.kick(now);
        }
        Ok(())
    }

    /// Recompute the desired state and run the worker right away.
    pub fn force_update(&self) {
        let now = self.shared.clock.now();
        let need_update = {
            let mut state = self.shared.state.lock();
            state.active && classifier::request_update(&mut state, true)
        };
        if need_update {
            self.shared.kick(now);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Get a snapshot of the controller state.
    pub fn state(&self) -> StateSnapshot {
        let autopm_held = self.shared.channel.autopm_held();
        self.shared.state.lock().snapshot(autopm_held)
    }

    /// How long until the next worker pass, if one is scheduled.
    pub fn pending_delay(&self) -> Option<Duration> {
        let deadline = self.shared.queue.deadline()?;
        Some(deadline.saturating_duration_since(self.shared.clock.now()))
    }

    /// Run the worker if a pass is due. Returns true if one ran.
    ///
    /// Meant for controllers created with [`manual`](Self::manual).
    pub fn run_due_work(&self) -> bool {
        if !self.shared.queue.take_due(self.shared.clock.now()) {
            return false;
        }
        self.shared.run_worker();
        self.shared.queue.finish();
        true
    }

    /// Lock and borrow the transport.
    pub fn transport(&self) -> parking_lot::MutexGuard<'_, T> {
        self.shared.channel.transport()
    }
}

impl<T: CommandTransport + 'static> Drop for TouchBar<T> {
    fn drop(&mut self) {
        {
            let attached = self.shared.attached.lock();
            if attached.iter().all(|&a| a) {
                self.shared.deactivate();
            }
        }
        self.shared.queue.shutdown();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("touch bar worker panicked");
        }
    }
}
