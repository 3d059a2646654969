use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::backend::{Backend, BackendError, ClickOptions};
use crate::keys::KeySpec;

/// One line of a warmup script, run after navigation to get past intro
/// screens and menus.
#[derive(Debug, Clone, PartialEq)]
pub enum PreloadCommand {
    Sleep(Duration),
    MoveMouse { x: f64, y: f64 },
    Click { x: f64, y: f64 },
    PressKey(KeySpec),
}

/// Parse a script. `#` starts a comment line; unknown commands and lines with
/// bad arguments are logged and skipped.
pub fn parse(text: &str) -> Vec<PreloadCommand> {
    let mut commands = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(cmd) => commands.push(cmd),
            None => warn!("preload line {}: skipping {:?}", n + 1, line),
        }
    }
    commands
}

fn parse_line(line: &str) -> Option<PreloadCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let number = |i: usize| parts.get(i).and_then(|p| p.parse::<f64>().ok());
    match parts.first()?.to_ascii_lowercase().as_str() {
        "sleep" => {
            let secs = number(1)?;
            (secs.is_finite() && secs >= 0.0)
                .then(|| PreloadCommand::Sleep(Duration::from_secs_f64(secs)))
        }
        "move_mouse" => Some(PreloadCommand::MoveMouse {
            x: number(1)?,
            y: number(2)?,
        }),
        "click" => Some(PreloadCommand::Click {
            x: number(1)?,
            y: number(2)?,
        }),
        "press_key" => KeySpec::parse(parts.get(1)?).map(PreloadCommand::PressKey),
        _ => None,
    }
}

/// A missing script is not an error: the game may not need a warmup.
pub fn load(path: &Path) -> Vec<PreloadCommand> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse(&text),
        Err(e) => {
            warn!("no preload script at {}: {e}", path.display());
            Vec::new()
        }
    }
}

pub async fn run(commands: &[PreloadCommand], backend: &dyn Backend) -> Result<(), BackendError> {
    for cmd in commands {
        match cmd {
            PreloadCommand::Sleep(d) => tokio::time::sleep(*d).await,
            PreloadCommand::MoveMouse { x, y } => backend.move_to(*x, *y).await?,
            PreloadCommand::Click { x, y } => {
                backend.click(*x, *y, ClickOptions::default()).await?
            }
            PreloadCommand::PressKey(key) => backend.press_key(key).await?,
        }
    }
    info!("preload: ran {} commands", commands.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_known_commands() {
        let script = "\
# skip the intro
sleep 1.5
move_mouse 320 200
CLICK 100 50
press_key ENTER
press_key CTRL+C
";
        assert_eq!(
            parse(script),
            vec![
                PreloadCommand::Sleep(Duration::from_millis(1500)),
                PreloadCommand::MoveMouse { x: 320.0, y: 200.0 },
                PreloadCommand::Click { x: 100.0, y: 50.0 },
                PreloadCommand::PressKey(KeySpec::single("Enter")),
                PreloadCommand::PressKey(KeySpec {
                    modifiers: vec!["Control".into()],
                    key: "KeyC".into(),
                }),
            ]
        );
    }

    #[test]
    fn bad_lines_are_skipped() {
        let script = "jump 1 2\nclick 10\nsleep -1\nsleep soon\npress_key\n\nsleep 0\n";
        assert_eq!(parse(script), vec![PreloadCommand::Sleep(Duration::ZERO)]);
    }

    #[test]
    fn missing_file_is_empty() {
        let tmp = tempdir().unwrap();
        assert!(load(&tmp.path().join("preload.txt")).is_empty());
        std::fs::write(tmp.path().join("preload.txt"), "sleep 2\n").unwrap();
        assert_eq!(load(&tmp.path().join("preload.txt")).len(), 1);
    }
}
