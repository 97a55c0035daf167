//! Interactive touch bar simulator.
//!
//! Runs the controller against a transport that logs every command instead
//! of talking to hardware, and reads events from standard input.

mod cli;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use clap::Parser;
use log::info;
use touchbar_core::{
    ChannelError, CommandTransport, Config, ControllerError, DisplayLevel, FnMode, InputSink,
    Interface, KeyEvent, KeyValue, Options, RetryPolicy, StateSnapshot, TouchBar, TouchBarMode,
};

use crate::cli::{Cli, HELP, Input, is_tap};

/// A transport that logs commands instead of sending them.
#[derive(Debug, Default)]
struct LoggingTransport {
    power_refs: [i32; 2],
}

impl CommandTransport for LoggingTransport {
    fn send_mode(&mut self, mode: u8) -> Result<(), ChannelError> {
        let mode = TouchBarMode::from_command_byte(mode).ok_or(ChannelError::Transfer(-22))?;
        println!("  -> mode {mode}");
        Ok(())
    }

    fn send_display(&mut self, level: u8) -> Result<(), ChannelError> {
        let level = DisplayLevel::from_command_byte(level).ok_or(ChannelError::Transfer(-22))?;
        println!("  -> display {level}");
        Ok(())
    }

    fn acquire_power(&mut self, interface: Interface) -> Result<(), ChannelError> {
        let refs = &mut self.power_refs[usize::from(interface == Interface::Display)];
        *refs += 1;
        info!("{} interface power reference taken ({})", interface, refs);
        Ok(())
    }

    fn release_power(&mut self, interface: Interface) {
        let refs = &mut self.power_refs[usize::from(interface == Interface::Display)];
        *refs -= 1;
        info!("{} interface power reference dropped ({})", interface, refs);
    }
}

/// Prints the events the controller injects.
struct PrintSink;

impl InputSink for PrintSink {
    fn emit(&self, event: KeyEvent) {
        println!("  <- emit {} {:?}", event.code, event.value);
    }
}

fn print_state(state: &StateSnapshot) {
    println!(
        "  active={} mode={} (pending {:?}) display={} (pending {:?})",
        state.active,
        state.current_mode,
        state.pending_mode,
        state.current_display,
        state.pending_display
    );
    println!(
        "  fn={} idle_timeout={} dim_timeout={}{} fn_mode={:?} autopm={}",
        state.fn_pressed,
        state.idle_timeout,
        state.dim_timeout,
        if state.dim_timeout_is_derived {
            " (derived)"
        } else {
            ""
        },
        state.fn_mode,
        state.autopm_held
    );
}

fn handle(touch_bar: &TouchBar<LoggingTransport>, input: Input, line: &str) {
    match input {
        Input::Key(code, value) => {
            let action = touch_bar.handle_key_event(code, value, &PrintSink);
            println!("  {code} {value:?}: {action:?}");
            if is_tap(line) {
                let action = touch_bar.handle_key_event(code, KeyValue::Released, &PrintSink);
                println!("  {code} Released: {action:?}");
            }
        }
        Input::Fn(pressed) => touch_bar.handle_fn_event(pressed),
        Input::Touchpad => touch_bar.handle_touchpad_event(),
        Input::Get(attribute) => {
            println!("  {} = {}", attribute, touch_bar.read_attribute(attribute));
        }
        Input::Set(attribute, value) => {
            if let Err(e) = touch_bar.write_attribute(attribute, &value) {
                eprintln!("  error: {e}");
            }
        }
        Input::Suspend(kind) => touch_bar.suspend(kind),
        Input::Resume => touch_bar.resume(),
        Input::Attach(interface) => {
            if let Err(e) = touch_bar.attach(interface) {
                eprintln!("  error: {e}");
            }
        }
        Input::Detach(interface) => {
            if let Err(e) = touch_bar.detach(interface) {
                eprintln!("  error: {e}");
            }
        }
        Input::State => {
            print_state(&touch_bar.state());
            if let Some(delay) = touch_bar.pending_delay() {
                println!("  next pass in {:.1}s", delay.as_secs_f64());
            }
        }
        Input::Help => println!("{HELP}"),
        Input::Quit => {}
    }
}

fn main() -> Result<(), ControllerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::new(
        cli.idle_timeout,
        cli.dim_timeout,
        FnMode::try_from(cli.fn_mode)?,
    )?;
    let options = Options {
        config,
        retry: RetryPolicy::default(),
        inter_command_delay: Duration::from_millis(cli.inter_command_delay),
    };

    let touch_bar = TouchBar::new(LoggingTransport::default(), options)?;
    if !cli.detached {
        touch_bar.attach(Interface::Mode)?;
        touch_bar.attach(Interface::Display)?;
    }

    println!("type 'help' for commands");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("tbctl> ");
        io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<Input>() {
            Ok(Input::Quit) => break,
            Ok(input) => handle(&touch_bar, input, line),
            Err(e) => eprintln!("  {e}"),
        }
    }

    info!("shutting down");
    Ok(())
}
