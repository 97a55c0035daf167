//! Touch bar configuration and the attribute surface.
//!
//! Timeouts are signed seconds with sentinel meanings:
//!
//! | value | `idle_timeout`                    | `dim_timeout`                     |
//! |-------|-----------------------------------|-----------------------------------|
//! | `>0`  | display off after this many secs  | dim after this many secs          |
//! | `0`   | display always off                | always dimmed                     |
//! | `-1`  | display always on                 | never dimmed                      |
//! | `-2`  | touch bar disabled                | derived from `idle_timeout`       |

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::modes::{DisplayLevel, FnMode, TouchBarMode};

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT: i32 = 5 * 60;
/// Default dim timeout (derived).
pub const DEFAULT_DIM_TIMEOUT: i32 = DIM_TIMEOUT_DERIVED;

/// `idle_timeout`: mode and display off.
pub const IDLE_TIMEOUT_DISABLED: i32 = -2;
/// `idle_timeout`: display never turned off.
pub const IDLE_TIMEOUT_ALWAYS_ON: i32 = -1;
/// `dim_timeout`: never dim.
pub const DIM_TIMEOUT_NEVER: i32 = -1;
/// `dim_timeout`: derive from `idle_timeout`.
pub const DIM_TIMEOUT_DERIVED: i32 = -2;

/// Upper bound on how long before idle-off a derived dim kicks in.
pub const MAX_DIM_TIME: i32 = 30;

/// The derived dim timeout for an idle timeout.
pub fn derive_dim_timeout(idle_timeout: i32) -> i32 {
    if idle_timeout > 0 {
        idle_timeout - MAX_DIM_TIME.min(idle_timeout / 3)
    } else {
        DIM_TIMEOUT_NEVER
    }
}

fn check_timeout(name: &'static str, value: i64) -> Result<i32, ConfigError> {
    i32::try_from(value)
        .ok()
        .filter(|&v| v >= -2)
        .ok_or(ConfigError::OutOfRange {
            name,
            value,
            min: -2,
            max: i64::from(i32::MAX),
        })
}

/// Timeout and fn-key settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    idle_timeout: i32,
    dim_timeout: i32,
    dim_timeout_is_derived: bool,
    fn_mode: FnMode,
}

impl Config {
    /// Create a configuration, validating the timeouts.
    ///
    /// # Errors
    /// Returns an error if either timeout is below -2.
    pub fn new(idle_timeout: i64, dim_timeout: i64, fn_mode: FnMode) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.set_idle_timeout(idle_timeout)?;
        config.set_dim_timeout(dim_timeout)?;
        config.fn_mode = fn_mode;
        Ok(config)
    }

    /// The configured idle timeout.
    pub fn idle_timeout(&self) -> i32 {
        self.idle_timeout
    }

    /// The dim timeout as configured; `-2` while it is derived.
    pub fn dim_timeout(&self) -> i32 {
        if self.dim_timeout_is_derived {
            DIM_TIMEOUT_DERIVED
        } else {
            self.dim_timeout
        }
    }

    /// The dim timeout in effect, with derivation applied.
    pub fn effective_dim_timeout(&self) -> i32 {
        self.dim_timeout
    }

    /// Whether the dim timeout tracks the idle timeout.
    pub fn is_dim_timeout_derived(&self) -> bool {
        self.dim_timeout_is_derived
    }

    /// The fn-key policy.
    pub fn fn_mode(&self) -> FnMode {
        self.fn_mode
    }

    /// Set the idle timeout, re-deriving the dim timeout if needed.
    ///
    /// # Errors
    /// Returns an error if `value` is not in `-2..=i32::MAX`.
    pub fn set_idle_timeout(&mut self, value: i64) -> Result<(), ConfigError> {
        self.idle_timeout = check_timeout("idle_timeout", value)?;
        if self.dim_timeout_is_derived {
            self.dim_timeout = derive_dim_timeout(self.idle_timeout);
        }
        Ok(())
    }

    /// Set the dim timeout; `-2` switches to the derived value.
    ///
    /// # Errors
    /// Returns an error if `value` is not in `-2..=i32::MAX`.
    pub fn set_dim_timeout(&mut self, value: i64) -> Result<(), ConfigError> {
        let value = check_timeout("dim_timeout", value)?;
        if value == DIM_TIMEOUT_DERIVED {
            self.dim_timeout_is_derived = true;
            self.dim_timeout = derive_dim_timeout(self.idle_timeout);
        } else {
            self.dim_timeout_is_derived = false;
            self.dim_timeout = value;
        }
        Ok(())
    }

    /// Set the fn-key policy.
    pub fn set_fn_mode(&mut self, fn_mode: FnMode) {
        self.fn_mode = fn_mode;
    }

    /// The mode the touch bar should be in.
    pub fn desired_mode(&self, fn_pressed: bool) -> TouchBarMode {
        if self.idle_timeout == IDLE_TIMEOUT_DISABLED {
            TouchBarMode::Off
        } else {
            self.fn_mode.mode_for(fn_pressed)
        }
    }

    /// The display level the touch bar should be at while there is activity.
    pub fn desired_display(&self) -> DisplayLevel {
        match (self.idle_timeout, self.dim_timeout) {
            (IDLE_TIMEOUT_DISABLED | 0, _) => DisplayLevel::Off,
            (_, 0) => DisplayLevel::Dim,
            _ => DisplayLevel::On,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            dim_timeout: derive_dim_timeout(DEFAULT_IDLE_TIMEOUT),
            dim_timeout_is_derived: true,
            fn_mode: FnMode::default(),
        }
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// A named, externally readable and writable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// `idle_timeout`.
    IdleTimeout,
    /// `dim_timeout`.
    DimTimeout,
    /// `fn_mode`.
    FnMode,
}

impl Attribute {
    /// All attributes.
    pub const ALL: [Self; 3] = [Self::IdleTimeout, Self::DimTimeout, Self::FnMode];

    /// The attribute's name.
    pub fn name(self) -> &'static str {
        match self {
            Self::IdleTimeout => "idle_timeout",
            Self::DimTimeout => "dim_timeout",
            Self::FnMode => "fn_mode",
        }
    }

    /// Read the attribute's value from a configuration.
    pub fn read(self, config: &Config) -> i64 {
        match self {
            Self::IdleTimeout => i64::from(config.idle_timeout()),
            Self::DimTimeout => i64::from(config.dim_timeout()),
            Self::FnMode => i64::from(config.fn_mode().value()),
        }
    }

    /// Write a value into a configuration.
    ///
    /// # Errors
    /// Returns an error if the value is out of range; `config` is unchanged.
    pub fn write(self, config: &mut Config, value: i64) -> Result<(), ConfigError> {
        match self {
            Self::IdleTimeout => config.set_idle_timeout(value),
            Self::DimTimeout => config.set_dim_timeout(value),
            Self::FnMode => {
                config.set_fn_mode(FnMode::try_from(value)?);
                Ok(())
            }
        }
    }

    /// Parse attribute text the way the kernel's `kstrtol` does with base 0.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] if the text is not an integer.
    pub fn parse_value(self, text: &str) -> Result<i64, ConfigError> {
        parse_integer(text).ok_or_else(|| ConfigError::Parse {
            name: self.name(),
            value: text.to_string(),
        })
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.name() == s || (*attr == Self::FnMode && s == "fnmode"))
            .ok_or_else(|| ConfigError::UnknownAttribute(s.to_string()))
    }
}

/// Integer parsing with C-style radix prefixes and one optional trailing newline.
fn parse_integer(text: &str) -> Option<i64> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.idle_timeout(), 300);
        assert_eq!(config.dim_timeout(), -2);
        assert_eq!(config.effective_dim_timeout(), 270);
        assert_eq!(config.fn_mode(), FnMode::Normal);
    }

    #[test]
    fn test_derived_dim_timeout() {
        assert_eq!(derive_dim_timeout(300), 270);
        assert_eq!(derive_dim_timeout(60), 40);
        assert_eq!(derive_dim_timeout(3), 2);
        assert_eq!(derive_dim_timeout(0), -1);
        assert_eq!(derive_dim_timeout(-1), -1);
    }

    #[test]
    fn test_dim_tracks_idle_until_explicit() {
        let mut config = Config::default();
        config.set_idle_timeout(60).unwrap();
        assert_eq!(config.effective_dim_timeout(), 40);

        config.set_dim_timeout(10).unwrap();
        config.set_idle_timeout(600).unwrap();
        assert_eq!(config.dim_timeout(), 10);
        assert!(!config.is_dim_timeout_derived());

        config.set_dim_timeout(-2).unwrap();
        assert_eq!(config.effective_dim_timeout(), 570);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut config = Config::default();
        assert!(config.set_idle_timeout(-3).is_err());
        assert!(config.set_dim_timeout(i64::from(i32::MAX) + 1).is_err());
        assert_eq!(config, Config::default());
        assert!(Attribute::FnMode.write(&mut config, 7).is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_desired_state() {
        let mut config = Config::default();
        assert_eq!(config.desired_mode(false), TouchBarMode::SpecialKeys);
        assert_eq!(config.desired_display(), DisplayLevel::On);

        config.set_dim_timeout(0).unwrap();
        assert_eq!(config.desired_display(), DisplayLevel::Dim);

        config.set_idle_timeout(0).unwrap();
        assert_eq!(config.desired_display(), DisplayLevel::Off);

        config.set_idle_timeout(-2).unwrap();
        assert_eq!(config.desired_mode(true), TouchBarMode::Off);
        assert_eq!(config.desired_display(), DisplayLevel::Off);
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("42\n"), Some(42));
        assert_eq!(parse_integer("-2"), Some(-2));
        assert_eq!(parse_integer("0x1e"), Some(30));
        assert_eq!(parse_integer("010"), Some(8));
        assert_eq!(parse_integer("0"), Some(0));
        assert_eq!(parse_integer(""), None);
        assert_eq!(parse_integer("12s"), None);
        assert_eq!(parse_integer("-"), None);
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!("dim_timeout".parse::<Attribute>(), Ok(Attribute::DimTimeout));
        assert_eq!("fnmode".parse::<Attribute>(), Ok(Attribute::FnMode));
        assert!("brightness".parse::<Attribute>().is_err());
    }
}
