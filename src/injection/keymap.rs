use super::surface::MouseButton;
use crate::error::InjectionError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A keyboard key with its per-platform codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    /// Logical name as it appears in the table
    pub name: &'static str,
    /// X keysym passed to xdotool
    pub keysym: &'static str,
    /// Windows virtual-key code
    pub vk: u16,
}

/// What a logical key name resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTarget {
    Key(Key),
    Button(MouseButton),
}

#[rustfmt::skip]
const KEY_TABLE: &[(&str, &str, u16)] = &[
    ("a", "a", 0x41), ("b", "b", 0x42), ("c", "c", 0x43), ("d", "d", 0x44),
    ("e", "e", 0x45), ("f", "f", 0x46), ("g", "g", 0x47), ("h", "h", 0x48),
    ("i", "i", 0x49), ("j", "j", 0x4A), ("k", "k", 0x4B), ("l", "l", 0x4C),
    ("m", "m", 0x4D), ("n", "n", 0x4E), ("o", "o", 0x4F), ("p", "p", 0x50),
    ("q", "q", 0x51), ("r", "r", 0x52), ("s", "s", 0x53), ("t", "t", 0x54),
    ("u", "u", 0x55), ("v", "v", 0x56), ("w", "w", 0x57), ("x", "x", 0x58),
    ("y", "y", 0x59), ("z", "z", 0x5A),
    ("0", "0", 0x30), ("1", "1", 0x31), ("2", "2", 0x32), ("3", "3", 0x33),
    ("4", "4", 0x34), ("5", "5", 0x35), ("6", "6", 0x36), ("7", "7", 0x37),
    ("8", "8", 0x38), ("9", "9", 0x39),
    ("semicolon", "semicolon", 0xBA),
    ("space", "space", 0x20),
    ("enter", "Return", 0x0D),
    ("tab", "Tab", 0x09),
    ("shift", "shift", 0x10),
    ("ctrl", "ctrl", 0x11),
    ("alt", "alt", 0x12),
    ("esc", "Escape", 0x1B),
    ("backspace", "BackSpace", 0x08),
    ("up", "Up", 0x26), ("down", "Down", 0x28),
    ("left", "Left", 0x25), ("right", "Right", 0x27),
    ("f1", "F1", 0x70), ("f2", "F2", 0x71), ("f3", "F3", 0x72), ("f4", "F4", 0x73),
    ("f5", "F5", 0x74), ("f6", "F6", 0x75), ("f7", "F7", 0x76), ("f8", "F8", 0x77),
    ("f9", "F9", 0x78), ("f10", "F10", 0x79), ("f11", "F11", 0x7A), ("f12", "F12", 0x7B),
];

/// Keyboard layout hint applied before table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardLayout {
    #[default]
    En,
    /// QWERTZ
    De,
    /// AZERTY
    Fr,
    Es,
}

impl KeyboardLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyboardLayout::En => "en",
            KeyboardLayout::De => "de",
            KeyboardLayout::Fr => "fr",
            KeyboardLayout::Es => "es",
        }
    }

    /// Translate a lowercase logical name into the key at that position
    fn remap<'a>(&self, name: &'a str) -> &'a str {
        match (self, name) {
            (KeyboardLayout::De, "y") => "z",
            (KeyboardLayout::De, "z") => "y",
            (KeyboardLayout::Fr, "a") => "q",
            (KeyboardLayout::Fr, "q") => "a",
            (KeyboardLayout::Fr, "z") => "w",
            (KeyboardLayout::Fr, "w") => "z",
            (KeyboardLayout::Fr, "m") => "semicolon",
            (KeyboardLayout::Fr, "semicolon") => "m",
            _ => name,
        }
    }
}

impl fmt::Display for KeyboardLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyboardLayout {
    type Err = InjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(KeyboardLayout::En),
            "de" => Ok(KeyboardLayout::De),
            "fr" => Ok(KeyboardLayout::Fr),
            "es" => Ok(KeyboardLayout::Es),
            other => Err(InjectionError::failed(format!(
                "unsupported keyboard layout '{}'",
                other
            ))),
        }
    }
}

/// Resolve a logical key or mouse button name, case-insensitively
pub fn resolve_key(name: &str, layout: KeyboardLayout) -> Result<KeyTarget, InjectionError> {
    let lowered = name.trim().to_ascii_lowercase();
    let lowered = if lowered == ";" { "semicolon".to_string() } else { lowered };

    match lowered.as_str() {
        "lmb" => return Ok(KeyTarget::Button(MouseButton::Left)),
        "rmb" => return Ok(KeyTarget::Button(MouseButton::Right)),
        "mmb" => return Ok(KeyTarget::Button(MouseButton::Middle)),
        _ => {}
    }

    let mapped = layout.remap(&lowered);
    KEY_TABLE
        .iter()
        .find(|(entry, _, _)| *entry == mapped)
        .map(|&(name, keysym, vk)| KeyTarget::Key(Key { name, keysym, vk }))
        .ok_or_else(|| InjectionError::UnknownKey(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_name(target: KeyTarget) -> &'static str {
        match target {
            KeyTarget::Key(key) => key.name,
            KeyTarget::Button(_) => panic!("expected a key"),
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let lower = resolve_key("enter", KeyboardLayout::En).unwrap();
        let upper = resolve_key("ENTER", KeyboardLayout::En).unwrap();
        assert_eq!(lower, upper);

        match lower {
            KeyTarget::Key(key) => {
                assert_eq!(key.keysym, "Return");
                assert_eq!(key.vk, 0x0D);
            }
            KeyTarget::Button(_) => panic!("enter resolved to a button"),
        }
    }

    #[test]
    fn test_mouse_button_names() {
        assert_eq!(
            resolve_key("LMB", KeyboardLayout::En).unwrap(),
            KeyTarget::Button(MouseButton::Left)
        );
        assert_eq!(
            resolve_key("rmb", KeyboardLayout::De).unwrap(),
            KeyTarget::Button(MouseButton::Right)
        );
        assert_eq!(
            resolve_key("mmb", KeyboardLayout::Fr).unwrap(),
            KeyTarget::Button(MouseButton::Middle)
        );
    }

    #[test]
    fn test_table_coverage() {
        for name in ["a", "z", "0", "9", "semicolon", "space", "tab", "shift", "ctrl", "alt"] {
            assert!(resolve_key(name, KeyboardLayout::En).is_ok(), "{} missing", name);
        }
        for name in ["esc", "backspace", "up", "down", "left", "right", "f1", "f12"] {
            assert!(resolve_key(name, KeyboardLayout::En).is_ok(), "{} missing", name);
        }
        assert_eq!(key_name(resolve_key(";", KeyboardLayout::En).unwrap()), "semicolon");
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(
            resolve_key("f13", KeyboardLayout::En),
            Err(InjectionError::UnknownKey("f13".to_string()))
        );
        assert!(resolve_key("", KeyboardLayout::En).is_err());
    }

    #[test]
    fn test_layout_swaps() {
        assert_eq!(key_name(resolve_key("y", KeyboardLayout::De).unwrap()), "z");
        assert_eq!(key_name(resolve_key("Z", KeyboardLayout::De).unwrap()), "y");

        assert_eq!(key_name(resolve_key("a", KeyboardLayout::Fr).unwrap()), "q");
        assert_eq!(key_name(resolve_key("w", KeyboardLayout::Fr).unwrap()), "z");
        assert_eq!(key_name(resolve_key("m", KeyboardLayout::Fr).unwrap()), "semicolon");
        assert_eq!(key_name(resolve_key("semicolon", KeyboardLayout::Fr).unwrap()), "m");

        for layout in [KeyboardLayout::En, KeyboardLayout::Es] {
            assert_eq!(key_name(resolve_key("y", layout).unwrap()), "y");
            assert_eq!(key_name(resolve_key("a", layout).unwrap()), "a");
        }
    }

    #[test]
    fn test_layout_parsing() {
        assert_eq!("DE".parse::<KeyboardLayout>().unwrap(), KeyboardLayout::De);
        assert_eq!("es".parse::<KeyboardLayout>().unwrap(), KeyboardLayout::Es);
        assert!("jp".parse::<KeyboardLayout>().is_err());
        assert_eq!(KeyboardLayout::default().to_string(), "en");
    }
}
