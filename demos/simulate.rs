//! Example: Walk the touch bar through an idle period and a sleep cycle.
//!
//! Run with: `RUST_LOG=debug cargo run --example simulate`

use std::sync::Arc;
use std::time::Duration;

use touchbar_core::{
    Attribute, ControllerError, Interface, KeyCode, KeyValue, MockClock, MockTransport, Options,
    RecordingSink, SuspendKind, TouchBar,
};

fn step(touch_bar: &TouchBar<MockTransport>, mock: &MockTransport, label: &str) {
    while touch_bar.run_due_work() {}
    let state = touch_bar.state();
    println!(
        "{label:<28} mode={:<14} display={:<4} sent={:?}",
        state.current_mode.to_string(),
        state.current_display.to_string(),
        mock.sent()
    );
    mock.clear();
}

fn main() -> Result<(), ControllerError> {
    // Initialize logging (optional)
    env_logger::init();

    let mock = MockTransport::new();
    let clock = MockClock::new();
    let options = Options {
        inter_command_delay: Duration::ZERO,
        ..Default::default()
    };
    let touch_bar = TouchBar::manual(mock.clone(), options, Arc::new(clock.clone()));
    let sink = RecordingSink::new();

    touch_bar.attach(Interface::Mode)?;
    touch_bar.attach(Interface::Display)?;
    step(&touch_bar, &mock, "attached");

    touch_bar.handle_fn_event(true);
    step(&touch_bar, &mock, "fn down");
    touch_bar.handle_fn_event(false);
    step(&touch_bar, &mock, "fn up");

    clock.advance(Duration::from_secs(270));
    step(&touch_bar, &mock, "idle 270s");
    clock.advance(Duration::from_secs(30));
    step(&touch_bar, &mock, "idle 300s");

    let action = touch_bar.handle_key_event(KeyCode::F1, KeyValue::Pressed, &sink);
    touch_bar.handle_key_event(KeyCode::F1, KeyValue::Released, &sink);
    step(&touch_bar, &mock, &format!("F1 tap ({action:?})"));
    println!("{:<28} {:?}", "emitted", sink.take());

    touch_bar.suspend(SuspendKind::Suspend);
    step(&touch_bar, &mock, "suspend");
    clock.advance(Duration::from_secs(3600));
    touch_bar.resume();
    step(&touch_bar, &mock, "resume");

    touch_bar.write_attribute(Attribute::IdleTimeout, "-2")?;
    step(&touch_bar, &mock, "idle_timeout=-2");

    Ok(())
}
