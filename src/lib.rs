//! Controller core for the Apple touch bar.
//!
//! This crate keeps the touch bar's mode (escape, function keys, special
//! keys or off) and display level (on, dim or off) in line with what the
//! user is doing. It decides what the touch bar should show from the FN key
//! and the configured policy, translates function keys into special keys,
//! dims and then switches off the display after inactivity, and wakes it
//! again on the next key press.
//!
//! The hardware is reached through a [`CommandTransport`]; the raw USB and
//! HID plumbing is left to the implementor.
//!
//! # Example
//!
//! ```no_run
//! use touchbar_core::{Interface, KeyCode, KeyValue, MockTransport, Options, RecordingSink, TouchBar};
//!
//! fn main() -> Result<(), touchbar_core::ControllerError> {
//!     let touch_bar = TouchBar::new(MockTransport::new(), Options::default())?;
//!
//!     // The controller starts working once both interfaces are up.
//!     touch_bar.attach(Interface::Mode)?;
//!     touch_bar.attach(Interface::Display)?;
//!
//!     // Feed it input.
//!     let sink = RecordingSink::new();
//!     touch_bar.handle_key_event(KeyCode::F1, KeyValue::Pressed, &sink);
//!     touch_bar.handle_fn_event(true);
//!
//!     // Change the idle timeout to one minute.
//!     touch_bar.set_idle_timeout(60)?;
//!
//!     println!("{:?}", touch_bar.state());
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! Use [`MockTransport`] together with [`TouchBar::manual`] and a
//! [`MockClock`] to drive the controller deterministically:
//!
//! ```
//! use std::sync::Arc;
//! use touchbar_core::{Interface, MockClock, MockTransport, Options, TouchBar, TouchBarMode};
//!
//! let mock = MockTransport::new();
//! let touch_bar = TouchBar::manual(mock.clone(), Options::default(), Arc::new(MockClock::new()));
//! touch_bar.attach(Interface::Mode).unwrap();
//! touch_bar.attach(Interface::Display).unwrap();
//! touch_bar.run_due_work();
//! assert_eq!(touch_bar.state().current_mode, TouchBarMode::SpecialKeys);
//! ```

#![warn(missing_docs)]

mod channel;
mod classifier;
mod clock;
mod config;
mod controller;
mod error;
mod keys;
mod mock;
mod modes;
mod scheduler;
mod state;
mod timeout;

// Re-export public API
pub use channel::{CommandChannel, CommandTransport, Interface, RetryPolicy};
pub use classifier::KeyAction;
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{
    Attribute, Config, DEFAULT_DIM_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DIM_TIMEOUT_DERIVED,
    DIM_TIMEOUT_NEVER, IDLE_TIMEOUT_ALWAYS_ON, IDLE_TIMEOUT_DISABLED, MAX_DIM_TIME,
    derive_dim_timeout,
};
pub use controller::{DEFAULT_INTER_COMMAND_DELAY, Options, SuspendKind, TouchBar};
pub use error::{ChannelError, ConfigError, ControllerError};
pub use keys::{InputSink, KeyCode, KeyEvent, KeyValue, TOUCH_BAR_SLOTS};
pub use mock::{Command, MockTransport, RecordingSink};
pub use modes::{DisplayLevel, FnMode, Pending, TouchBarMode};
pub use scheduler::WorkQueue;
pub use state::StateSnapshot;
pub use timeout::{Timeouts, compute as compute_timeouts, idle_seconds, min_timeout};
