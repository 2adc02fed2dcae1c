/// Control-key names and the byte sequences they send
use std::str::FromStr;
use termpilot_types::EngineError;

use super::signal::Signal;

/// A named key a caller can send to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlKey {
    name: String,
    bytes: Vec<u8>,
}

const NAMED_KEYS: &[(&str, &[u8])] = &[
    ("up", b"\x1b[A"),
    ("down", b"\x1b[B"),
    ("right", b"\x1b[C"),
    ("left", b"\x1b[D"),
    ("home", b"\x1b[H"),
    ("end", b"\x1b[F"),
    ("pageup", b"\x1b[5~"),
    ("pagedown", b"\x1b[6~"),
    ("insert", b"\x1b[2~"),
    ("delete", b"\x1b[3~"),
    ("tab", b"\t"),
    ("escape", b"\x1b"),
    ("esc", b"\x1b"),
    ("enter", b"\r"),
    ("return", b"\r"),
    ("backspace", b"\x7f"),
    ("space", b" "),
    ("f1", b"\x1bOP"),
    ("f2", b"\x1bOQ"),
    ("f3", b"\x1bOR"),
    ("f4", b"\x1bOS"),
    ("f5", b"\x1b[15~"),
    ("f6", b"\x1b[17~"),
    ("f7", b"\x1b[18~"),
    ("f8", b"\x1b[19~"),
    ("f9", b"\x1b[20~"),
    ("f10", b"\x1b[21~"),
    ("f11", b"\x1b[23~"),
    ("f12", b"\x1b[24~"),
];

impl ControlKey {
    /// Canonical name, e.g. `ctrl+c` or `up`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes written to a pseudo-terminal for this key
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Signal the key stands for when there is no line discipline to translate it
    pub fn signal(&self) -> Option<Signal> {
        match self.bytes.as_slice() {
            [0x03] => Some(Signal::Interrupt),
            [0x1c] => Some(Signal::Quit),
            [0x1a] => Some(Signal::Stop),
            _ => None,
        }
    }

    /// Whether this key means end-of-input (ctrl+d)
    pub fn is_eof(&self) -> bool {
        self.bytes == [0x04]
    }
}

/// Ctrl+X is 0x01..0x1a for letters, plus the punctuation control codes
fn ctrl_byte(ch: char) -> Option<u8> {
    match ch.to_ascii_uppercase() {
        c @ 'A'..='Z' => Some((c as u8) - b'A' + 1),
        '@' | ' ' | '2' => Some(0x00),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        _ => None,
    }
}

impl FromStr for ControlKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || EngineError::UnknownControlKey(s.to_string());
        let trimmed = s.trim();

        // ^C form
        if let Some(rest) = trimmed.strip_prefix('^') {
            let mut chars = rest.chars();
            if let (Some(ch), None) = (chars.next(), chars.next()) {
                let byte = ctrl_byte(ch).ok_or_else(unknown)?;
                return Ok(ControlKey {
                    name: format!("ctrl+{}", ch.to_ascii_lowercase()),
                    bytes: vec![byte],
                });
            }
            return Err(unknown());
        }

        let lower = trimmed.to_ascii_lowercase();
        for prefix in ["ctrl+", "ctrl-", "control+", "control-", "c-"] {
            if let Some(rest) = lower.strip_prefix(prefix) {
                let mut chars = rest.chars();
                return match (chars.next(), chars.next()) {
                    (Some(ch), None) => {
                        let byte = ctrl_byte(ch).ok_or_else(unknown)?;
                        Ok(ControlKey {
                            name: format!("ctrl+{}", ch),
                            bytes: vec![byte],
                        })
                    }
                    _ => Err(unknown()),
                };
            }
        }

        let name = lower.replace(['_', '-', ' '], "");
        let name = match name.as_str() {
            "arrowup" => "up",
            "arrowdown" => "down",
            "arrowleft" => "left",
            "arrowright" => "right",
            "pgup" => "pageup",
            "pgdn" => "pagedown",
            "del" => "delete",
            other => other,
        };

        NAMED_KEYS
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(key, bytes)| ControlKey {
                name: key.to_string(),
                bytes: bytes.to_vec(),
            })
            .ok_or_else(unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ControlKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_ctrl_letters() {
        assert_eq!(key("ctrl+c").bytes(), &[0x03]);
        assert_eq!(key("CTRL-C").bytes(), &[0x03]);
        assert_eq!(key("C-d").bytes(), &[0x04]);
        assert_eq!(key("^Z").bytes(), &[0x1a]);
        assert_eq!(key("ctrl+\\").bytes(), &[0x1c]);
        assert_eq!(key("^C").name(), "ctrl+c");
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(key("up").bytes(), b"\x1b[A");
        assert_eq!(key("Arrow_Left").bytes(), b"\x1b[D");
        assert_eq!(key("tab").bytes(), b"\t");
        assert_eq!(key("Escape").bytes(), b"\x1b");
        assert_eq!(key("enter").bytes(), b"\r");
        assert_eq!(key("backspace").bytes(), b"\x7f");
        assert_eq!(key("delete").bytes(), b"\x1b[3~");
        assert_eq!(key("home").bytes(), b"\x1b[H");
        assert_eq!(key("end").bytes(), b"\x1b[F");
        assert_eq!(key("F5").bytes(), b"\x1b[15~");
    }

    #[test]
    fn test_signals_and_eof() {
        assert_eq!(key("ctrl+c").signal(), Some(Signal::Interrupt));
        assert_eq!(key("ctrl+\\").signal(), Some(Signal::Quit));
        assert_eq!(key("ctrl+z").signal(), Some(Signal::Stop));
        assert_eq!(key("up").signal(), None);
        assert!(key("ctrl+d").is_eof());
    }

    #[test]
    fn test_unknown_keys() {
        for name in ["ctrl+", "ctrl+cc", "hyper", "^", "ctrl+1"] {
            assert!(
                matches!(name.parse::<ControlKey>(), Err(EngineError::UnknownControlKey(_))),
                "{name} should be unknown"
            );
        }
    }
}
