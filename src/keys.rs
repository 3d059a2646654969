use std::fmt;

/// A key press, possibly with held modifiers: `Shift+KeyA`, `CTRL+ALT+DEL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub modifiers: Vec<String>,
    pub key: String,
}

impl KeySpec {
    /// Accepts friendly names (`ENTER`, `F5`, `a`, `CTRL+C`) and raw DOM codes
    /// (`KeyA`, `ArrowLeft`). Unknown names pass through unchanged.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(code) = combo_code(text) {
            return Self::parse(code);
        }
        let mut parts: Vec<String> = text
            .split('+')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(dom_code)
            .collect();
        let key = parts.pop()?;
        Some(Self {
            modifiers: parts,
            key,
        })
    }

    pub fn single(key: &str) -> Self {
        Self {
            modifiers: Vec::new(),
            key: dom_code(key),
        }
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{m}+")?;
        }
        write!(f, "{}", self.key)
    }
}

fn combo_code(text: &str) -> Option<&'static str> {
    Some(match text.to_ascii_uppercase().as_str() {
        "CTRL+C" => "Control+KeyC",
        "CTRL+V" => "Control+KeyV",
        "CTRL+X" => "Control+KeyX",
        "CTRL+A" => "Control+KeyA",
        "CTRL+Z" => "Control+KeyZ",
        "CTRL+S" => "Control+KeyS",
        "ALT+F4" => "Alt+F4",
        "CTRL+ALT+DEL" => "Control+Alt+Delete",
        _ => return None,
    })
}

fn dom_code(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    if upper.len() == 1 {
        let c = upper.as_bytes()[0];
        if c.is_ascii_uppercase() {
            return format!("Key{}", c as char);
        }
        if c.is_ascii_digit() {
            return format!("Digit{}", c as char);
        }
    }
    let code = match upper.as_str() {
        "LEFT" => "ArrowLeft",
        "RIGHT" => "ArrowRight",
        "UP" => "ArrowUp",
        "DOWN" => "ArrowDown",
        "ENTER" => "Enter",
        "ESC" => "Escape",
        "TAB" => "Tab",
        "SPACE" => "Space",
        "BACKSPACE" => "Backspace",
        "DELETE" | "DEL" => "Delete",
        "INSERT" => "Insert",
        "HOME" => "Home",
        "END" => "End",
        "PAGEUP" => "PageUp",
        "PAGEDOWN" => "PageDown",
        "CTRL" | "CONTROL" => "Control",
        "ALT" => "Alt",
        "SHIFT" => "Shift",
        "META" => "Meta",
        "PAUSE" => "Pause",
        f if f.starts_with('F') && f[1..].parse::<u8>().is_ok_and(|n| (1..=12).contains(&n)) => {
            return f.to_string();
        }
        _ => return name.to_string(),
    };
    code.to_string()
}

/// WebDriver key-action value for a DOM key code.
pub fn webdriver_key(code: &str) -> String {
    let special = match code {
        "Control" => '\u{E009}',
        "Alt" => '\u{E00A}',
        "Shift" => '\u{E008}',
        "Meta" => '\u{E03D}',
        "Enter" => '\u{E007}',
        "Escape" => '\u{E00C}',
        "Tab" => '\u{E004}',
        "Space" => ' ',
        "Backspace" => '\u{E003}',
        "Delete" => '\u{E017}',
        "Insert" => '\u{E016}',
        "Home" => '\u{E011}',
        "End" => '\u{E010}',
        "PageUp" => '\u{E00E}',
        "PageDown" => '\u{E00F}',
        "ArrowLeft" => '\u{E012}',
        "ArrowUp" => '\u{E013}',
        "ArrowRight" => '\u{E014}',
        "ArrowDown" => '\u{E015}',
        "Pause" => '\u{E00B}',
        "F1" => '\u{E031}',
        "F2" => '\u{E032}',
        "F3" => '\u{E033}',
        "F4" => '\u{E034}',
        "F5" => '\u{E035}',
        "F6" => '\u{E036}',
        "F7" => '\u{E037}',
        "F8" => '\u{E038}',
        "F9" => '\u{E039}',
        "F10" => '\u{E03A}',
        "F11" => '\u{E03B}',
        "F12" => '\u{E03C}',
        _ => {
            if let Some(c) = code.strip_prefix("Key") {
                return c.to_ascii_lowercase();
            }
            if let Some(d) = code.strip_prefix("Digit") {
                return d.to_string();
            }
            return code.to_string();
        }
    };
    special.to_string()
}
