//! Command-line and interactive command definitions for tbctl.

use std::str::FromStr;

use clap::Parser;
use touchbar_core::{
    Attribute, DEFAULT_IDLE_TIMEOUT, DIM_TIMEOUT_DERIVED, Interface, KeyCode, KeyValue,
    SuspendKind,
};

/// Command-line interface for the `tbctl` binary.
#[derive(Parser, Debug)]
#[command(
    name = "tbctl",
    about = "Drive the touch bar controller against a simulated device",
    version
)]
pub struct Cli {
    /// Seconds of inactivity before the display turns off (-1 never, -2 disables the touch bar).
    #[arg(
        long,
        default_value_t = i64::from(DEFAULT_IDLE_TIMEOUT),
        allow_negative_numbers = true,
        value_name = "SECS"
    )]
    pub idle_timeout: i64,

    /// Seconds of inactivity before the display dims (-1 never, -2 derive from idle timeout).
    #[arg(
        long,
        default_value_t = i64::from(DIM_TIMEOUT_DERIVED),
        allow_negative_numbers = true,
        value_name = "SECS"
    )]
    pub dim_timeout: i64,

    /// FN policy: 0 function keys only, 1 normal, 2 inverted, 3 special keys only.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(0..=3))]
    pub fn_mode: i64,

    /// Pause between a mode and a display command, in milliseconds.
    #[arg(long, default_value_t = 25, value_name = "MS")]
    pub inter_command_delay: u64,

    /// Start with no interfaces attached.
    #[arg(long)]
    pub detached: bool,
}

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A touch bar key event.
    Key(KeyCode, KeyValue),
    /// FN going down or up.
    Fn(bool),
    /// Touchpad activity.
    Touchpad,
    /// Print an attribute.
    Get(Attribute),
    /// Write an attribute.
    Set(Attribute, String),
    /// System sleep.
    Suspend(SuspendKind),
    /// System wake.
    Resume,
    /// Attach an interface.
    Attach(Interface),
    /// Detach an interface.
    Detach(Interface),
    /// Print the controller state.
    State,
    /// Print the command list.
    Help,
    /// Exit.
    Quit,
}

/// Help text for the interactive commands.
pub const HELP: &str = "\
commands:
  key <esc|f1..f12> [down|up|repeat]   touch bar key event (default: down then up)
  fn <down|up>                         FN key
  touchpad                             touchpad activity
  get <attribute>                      read idle_timeout, dim_timeout or fn_mode
  set <attribute> <value>              write an attribute
  suspend [freeze]                     system sleep
  resume                               system wake
  attach|detach <mode|display>         interface hotplug
  state                                show controller state
  quit";

fn parse_interface(word: Option<&str>) -> Result<Interface, String> {
    match word {
        Some("mode") => Ok(Interface::Mode),
        Some("display") => Ok(Interface::Display),
        other => Err(format!("expected mode or display, got {:?}", other.unwrap_or(""))),
    }
}

fn parse_attribute(word: Option<&str>) -> Result<Attribute, String> {
    let word = word.ok_or("missing attribute name")?;
    Attribute::from_str(word).map_err(|e| e.to_string())
}

fn parse_key_value(word: &str) -> Result<KeyValue, String> {
    match word {
        "down" | "press" | "1" => Ok(KeyValue::Pressed),
        "up" | "release" | "0" => Ok(KeyValue::Released),
        "repeat" | "2" => Ok(KeyValue::Repeat),
        other => Err(format!("unknown key value: {other}")),
    }
}

impl FromStr for Input {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err("empty command".to_string());
        };

        let input = match command {
            "key" | "k" => {
                let name = words.next().ok_or("missing key name")?;
                let code = KeyCode::from_name(name)
                    .filter(|code| code.slot().is_some())
                    .ok_or_else(|| format!("not a touch bar key: {name}"))?;
                let value = words.next().map(parse_key_value).transpose()?;
                Self::Key(code, value.unwrap_or(KeyValue::Pressed))
            }
            "fn" => match words.next() {
                Some("down") => Self::Fn(true),
                Some("up") => Self::Fn(false),
                _ => return Err("expected fn down or fn up".to_string()),
            },
            "touchpad" | "tp" => Self::Touchpad,
            "get" => Self::Get(parse_attribute(words.next())?),
            "set" => {
                let attribute = parse_attribute(words.next())?;
                let value = words.next().ok_or("missing value")?;
                Self::Set(attribute, value.to_string())
            }
            "suspend" => match words.next() {
                None => Self::Suspend(SuspendKind::Suspend),
                Some("freeze") => Self::Suspend(SuspendKind::Freeze),
                Some(other) => return Err(format!("unknown suspend kind: {other}")),
            },
            "resume" => Self::Resume,
            "attach" => Self::Attach(parse_interface(words.next())?),
            "detach" => Self::Detach(parse_interface(words.next())?),
            "state" | "s" => Self::State,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(format!("unknown command: {other}")),
        };
        Ok(input)
    }
}

/// Whether a bare `key <name>` line should also send the release.
pub fn is_tap(line: &str) -> bool {
    let mut words = line.split_whitespace();
    matches!(words.next(), Some("key" | "k")) && words.nth(1).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert_eq!(
            "key f5 up".parse::<Input>().unwrap(),
            Input::Key(KeyCode::F5, KeyValue::Released)
        );
        assert_eq!(
            "key esc".parse::<Input>().unwrap(),
            Input::Key(KeyCode::ESC, KeyValue::Pressed)
        );
        assert!("key fn".parse::<Input>().is_err());
        assert!("key f13".parse::<Input>().is_err());
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "set idle_timeout 0x3c".parse::<Input>().unwrap(),
            Input::Set(Attribute::IdleTimeout, "0x3c".to_string())
        );
        assert_eq!(
            "suspend freeze".parse::<Input>().unwrap(),
            Input::Suspend(SuspendKind::Freeze)
        );
        assert_eq!(
            "detach display".parse::<Input>().unwrap(),
            Input::Detach(Interface::Display)
        );
        assert!("attach usb".parse::<Input>().is_err());
        assert!("frobnicate".parse::<Input>().is_err());
    }

    #[test]
    fn test_is_tap() {
        assert!(is_tap("key f1"));
        assert!(!is_tap("key f1 down"));
        assert!(!is_tap("fn down"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["tbctl"]);
        assert_eq!(cli.idle_timeout, 300);
        assert_eq!(cli.dim_timeout, -2);
        assert_eq!(cli.fn_mode, 1);

        let cli = Cli::parse_from(["tbctl", "--idle-timeout", "-1", "--fn-mode", "2"]);
        assert_eq!(cli.idle_timeout, -1);
        assert_eq!(cli.fn_mode, 2);
        assert!(Cli::try_parse_from(["tbctl", "--fn-mode", "4"]).is_err());
    }
}
