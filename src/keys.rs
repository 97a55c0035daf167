//! Input key codes, touch bar slots and the special-key translation table.
//!
//! Codes are Linux input event codes, which is what the keyboard, touchpad and
//! touch bar input devices report.

use std::fmt;

/// Number of physical touch bar slots: escape plus F1-F12.
pub const TOUCH_BAR_SLOTS: usize = 13;

/// A Linux input key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u16);

impl KeyCode {
    /// Escape.
    pub const ESC: Self = Self(1);
    /// F1.
    pub const F1: Self = Self(59);
    /// F2.
    pub const F2: Self = Self(60);
    /// F3.
    pub const F3: Self = Self(61);
    /// F4.
    pub const F4: Self = Self(62);
    /// F5.
    pub const F5: Self = Self(63);
    /// F6.
    pub const F6: Self = Self(64);
    /// F7.
    pub const F7: Self = Self(65);
    /// F8.
    pub const F8: Self = Self(66);
    /// F9.
    pub const F9: Self = Self(67);
    /// F10.
    pub const F10: Self = Self(68);
    /// F11.
    pub const F11: Self = Self(87);
    /// F12.
    pub const F12: Self = Self(88);
    /// Mute.
    pub const MUTE: Self = Self(113);
    /// Volume down.
    pub const VOLUME_DOWN: Self = Self(114);
    /// Volume up.
    pub const VOLUME_UP: Self = Self(115);
    /// Expose / scale.
    pub const SCALE: Self = Self(120);
    /// Next track.
    pub const NEXT_SONG: Self = Self(163);
    /// Play/pause.
    pub const PLAY_PAUSE: Self = Self(164);
    /// Previous track.
    pub const PREVIOUS_SONG: Self = Self(165);
    /// Dashboard.
    pub const DASHBOARD: Self = Self(204);
    /// Screen brightness down.
    pub const BRIGHTNESS_DOWN: Self = Self(224);
    /// Screen brightness up.
    pub const BRIGHTNESS_UP: Self = Self(225);
    /// Keyboard backlight down.
    pub const KBD_ILLUM_DOWN: Self = Self(229);
    /// Keyboard backlight up.
    pub const KBD_ILLUM_UP: Self = Self(230);
    /// Unknown key; used for the wake event.
    pub const UNKNOWN: Self = Self(240);
    /// The FN modifier.
    pub const FN: Self = Self(0x1d0);

    /// The touch bar slot this code occupies, if it is a touch bar key.
    pub fn slot(self) -> Option<usize> {
        match self {
            Self::ESC => Some(0),
            Self(code) if (Self::F1.0..=Self::F10.0).contains(&code) => {
                Some(usize::from(code - Self::F1.0) + 1)
            }
            Self(code) if (Self::F11.0..=Self::F12.0).contains(&code) => {
                Some(usize::from(code - Self::F11.0) + 11)
            }
            _ => None,
        }
    }

    /// The special key a function key turns into in special-keys mode.
    pub fn special(self) -> Option<Self> {
        SPECIAL_KEYS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, to)| *to)
    }

    /// Look up a code by a short name such as `esc`, `f5` or `fn`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "esc" | "escape" => return Some(Self::ESC),
            "fn" => return Some(Self::FN),
            _ => {}
        }
        let digits = name.strip_prefix('f')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: u16 = digits.parse().ok()?;
        match n {
            1..=10 => Some(Self(Self::F1.0 + n - 1)),
            11 | 12 => Some(Self(Self::F11.0 + n - 11)),
            _ => None,
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot() {
            Some(0) => f.write_str("ESC"),
            Some(slot) => write!(f, "F{slot}"),
            None => write!(f, "key {}", self.0),
        }
    }
}

const SPECIAL_KEYS: [(KeyCode, KeyCode); 12] = [
    (KeyCode::F1, KeyCode::BRIGHTNESS_DOWN),
    (KeyCode::F2, KeyCode::BRIGHTNESS_UP),
    (KeyCode::F3, KeyCode::SCALE),
    (KeyCode::F4, KeyCode::DASHBOARD),
    (KeyCode::F5, KeyCode::KBD_ILLUM_DOWN),
    (KeyCode::F6, KeyCode::KBD_ILLUM_UP),
    (KeyCode::F7, KeyCode::PREVIOUS_SONG),
    (KeyCode::F8, KeyCode::PLAY_PAUSE),
    (KeyCode::F9, KeyCode::NEXT_SONG),
    (KeyCode::F10, KeyCode::MUTE),
    (KeyCode::F11, KeyCode::VOLUME_DOWN),
    (KeyCode::F12, KeyCode::VOLUME_UP),
];

/// The value field of a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// Key went up.
    Released,
    /// Key went down.
    Pressed,
    /// Autorepeat while held.
    Repeat,
}

impl KeyValue {
    /// Convert the raw event value (0, 1 or 2).
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Released),
            1 => Some(Self::Pressed),
            2 => Some(Self::Repeat),
            _ => None,
        }
    }

    /// The raw event value.
    pub fn raw(self) -> i32 {
        match self {
            Self::Released => 0,
            Self::Pressed => 1,
            Self::Repeat => 2,
        }
    }

    /// Pressed or repeating.
    pub fn is_down(self) -> bool {
        !matches!(self, Self::Released)
    }
}

/// A key event delivered to the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The key.
    pub code: KeyCode,
    /// Up, down or repeat.
    pub value: KeyValue,
}

impl KeyEvent {
    /// Create a key event.
    pub fn new(code: KeyCode, value: KeyValue) -> Self {
        Self { code, value }
    }
}

/// Receives the key events the controller synthesizes or translates.
///
/// The controller never calls into a sink while holding its state lock, so
/// implementations may call back into the controller.
pub trait InputSink {
    /// Deliver one event.
    fn emit(&self, event: KeyEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_dense() {
        let keys = [
            KeyCode::ESC,
            KeyCode::F1,
            KeyCode::F2,
            KeyCode::F3,
            KeyCode::F4,
            KeyCode::F5,
            KeyCode::F6,
            KeyCode::F7,
            KeyCode::F8,
            KeyCode::F9,
            KeyCode::F10,
            KeyCode::F11,
            KeyCode::F12,
        ];
        for (expected, key) in keys.iter().enumerate() {
            assert_eq!(key.slot(), Some(expected));
        }
        assert_eq!(KeyCode(69).slot(), None);
        assert_eq!(KeyCode::FN.slot(), None);
        assert_eq!(KeyCode::MUTE.slot(), None);
    }

    #[test]
    fn test_special_translation() {
        assert_eq!(KeyCode::F1.special(), Some(KeyCode::BRIGHTNESS_DOWN));
        assert_eq!(KeyCode::F10.special(), Some(KeyCode::MUTE));
        assert_eq!(KeyCode::F12.special(), Some(KeyCode::VOLUME_UP));
        assert_eq!(KeyCode::ESC.special(), None);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(KeyCode::from_name("F11"), Some(KeyCode::F11));
        assert_eq!(KeyCode::from_name("f3"), Some(KeyCode::F3));
        assert_eq!(KeyCode::from_name("esc"), Some(KeyCode::ESC));
        assert_eq!(KeyCode::from_name("fn"), Some(KeyCode::FN));
        assert_eq!(KeyCode::from_name("f13"), None);
        assert_eq!(KeyCode::from_name("f+1"), None);
        assert_eq!(KeyCode::from_name("f"), None);
        assert_eq!(KeyCode::F11.to_string(), "F11");
    }

    #[test]
    fn test_key_values() {
        assert_eq!(KeyValue::from_raw(2), Some(KeyValue::Repeat));
        assert_eq!(KeyValue::from_raw(3), None);
        assert!(KeyValue::Repeat.is_down());
        assert!(!KeyValue::Released.is_down());
    }
}
