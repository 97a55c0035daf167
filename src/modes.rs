//! Touch bar modes, display levels and fn-key policies.

use std::fmt;

use crate::error::ConfigError;

// =============================================================================
// Touch Bar Mode
// =============================================================================

/// The key layout shown on the touch bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchBarMode {
    /// Escape key only.
    Escape,
    /// Escape plus F1-F12.
    FunctionKeys,
    /// Escape plus brightness, media and volume keys.
    SpecialKeys,
    /// Nothing shown; touches are not reported.
    Off,
}

impl TouchBarMode {
    /// Get the command byte for the mode interface.
    pub fn command_byte(self) -> u8 {
        match self {
            Self::Escape => 0,
            Self::FunctionKeys => 1,
            Self::SpecialKeys => 2,
            Self::Off => 3,
        }
    }

    /// Look up a mode by its command byte.
    pub fn from_command_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Escape),
            1 => Some(Self::FunctionKeys),
            2 => Some(Self::SpecialKeys),
            3 => Some(Self::Off),
            _ => None,
        }
    }
}

impl fmt::Display for TouchBarMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Escape => "escape",
            Self::FunctionKeys => "function-keys",
            Self::SpecialKeys => "special-keys",
            Self::Off => "off",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Display Level
// =============================================================================

/// Backlight state of the touch bar, independent of the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayLevel {
    /// Full brightness.
    On,
    /// Dimmed.
    Dim,
    /// Dark; touches are still reported.
    Off,
}

impl DisplayLevel {
    /// Get the command byte for the display interface.
    pub fn command_byte(self) -> u8 {
        match self {
            Self::On => 1,
            Self::Dim => 2,
            Self::Off => 4,
        }
    }

    /// Look up a display level by its command byte.
    pub fn from_command_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::On),
            2 => Some(Self::Dim),
            4 => Some(Self::Off),
            _ => None,
        }
    }
}

impl fmt::Display for DisplayLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::On => "on",
            Self::Dim => "dim",
            Self::Off => "off",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Fn Mode
// =============================================================================

/// Policy for what holding the FN key does to the touch bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FnMode {
    /// Always show function keys.
    FunctionKeysOnly,
    /// Show special keys; FN switches to function keys.
    #[default]
    Normal,
    /// Show function keys; FN switches to special keys.
    Inverted,
    /// Always show special keys.
    SpecialOnly,
}

impl FnMode {
    /// Largest accepted numeric value.
    pub const MAX: u8 = 3;

    /// Get the numeric value used on the attribute surface.
    pub fn value(self) -> u8 {
        match self {
            Self::FunctionKeysOnly => 0,
            Self::Normal => 1,
            Self::Inverted => 2,
            Self::SpecialOnly => 3,
        }
    }

    /// The mode this policy wants given the current FN key state.
    pub fn mode_for(self, fn_pressed: bool) -> TouchBarMode {
        match self {
            Self::FunctionKeysOnly => TouchBarMode::FunctionKeys,
            Self::SpecialOnly => TouchBarMode::SpecialKeys,
            Self::Inverted if fn_pressed => TouchBarMode::SpecialKeys,
            Self::Inverted => TouchBarMode::FunctionKeys,
            Self::Normal if fn_pressed => TouchBarMode::FunctionKeys,
            Self::Normal => TouchBarMode::SpecialKeys,
        }
    }
}

impl TryFrom<i64> for FnMode {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::FunctionKeysOnly),
            1 => Ok(Self::Normal),
            2 => Ok(Self::Inverted),
            3 => Ok(Self::SpecialOnly),
            _ => Err(ConfigError::OutOfRange {
                name: "fn_mode",
                value,
                min: 0,
                max: i64::from(Self::MAX),
            }),
        }
    }
}

// =============================================================================
// Pending Change
// =============================================================================

/// A requested-but-unconfirmed hardware value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pending<T> {
    /// Nothing queued or in flight.
    #[default]
    NoPendingChange,
    /// This value has been requested.
    Change(T),
}

impl<T: Copy> Pending<T> {
    /// Whether a change is queued or in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Change(_))
    }

    /// The requested value, if any.
    pub fn value(&self) -> Option<T> {
        match self {
            Self::NoPendingChange => None,
            Self::Change(value) => Some(*value),
        }
    }

    /// The requested value, or `current` when nothing is pending.
    pub fn or_current(&self, current: T) -> T {
        self.value().unwrap_or(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_mode_policy() {
        assert_eq!(
            FnMode::FunctionKeysOnly.mode_for(true),
            TouchBarMode::FunctionKeys
        );
        assert_eq!(FnMode::SpecialOnly.mode_for(true), TouchBarMode::SpecialKeys);
        assert_eq!(FnMode::Normal.mode_for(false), TouchBarMode::SpecialKeys);
        assert_eq!(FnMode::Normal.mode_for(true), TouchBarMode::FunctionKeys);
        assert_eq!(FnMode::Inverted.mode_for(false), TouchBarMode::FunctionKeys);
        assert_eq!(FnMode::Inverted.mode_for(true), TouchBarMode::SpecialKeys);
    }

    #[test]
    fn test_fn_mode_range() {
        assert_eq!(FnMode::try_from(2), Ok(FnMode::Inverted));
        assert!(FnMode::try_from(4).is_err());
        assert!(FnMode::try_from(-1).is_err());
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(TouchBarMode::Off.command_byte(), 3);
        assert_eq!(DisplayLevel::Off.command_byte(), 4);
        assert_eq!(DisplayLevel::from_command_byte(3), None);
        assert_eq!(
            TouchBarMode::from_command_byte(2),
            Some(TouchBarMode::SpecialKeys)
        );
    }

    #[test]
    fn test_pending_or_current() {
        let none: Pending<DisplayLevel> = Pending::NoPendingChange;
        assert_eq!(none.or_current(DisplayLevel::Dim), DisplayLevel::Dim);
        let dim = Pending::Change(DisplayLevel::Off);
        assert!(dim.is_pending());
        assert_eq!(dim.or_current(DisplayLevel::Dim), DisplayLevel::Off);
    }
}
