use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::frame::Frame;

/// Text recognition over a small crop.
pub trait Ocr: Send + Sync {
    fn read_text(&self, crop: &Frame) -> Result<String>;
}

/// Shells out to the `tesseract` binary, piping the crop as PNG.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    lang: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            lang: lang.into(),
        }
    }
}

impl Ocr for TesseractCli {
    fn read_text(&self, crop: &Frame) -> Result<String> {
        let png = crop.to_png()?;
        // --psm 7: treat the crop as a single text line.
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.lang, "--psm", "7"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary))?;
        child
            .stdin
            .take()
            .context("tesseract stdin unavailable")?
            .write_all(&png)
            .context("failed to write crop to tesseract")?;
        let output = child.wait_with_output().context("tesseract did not finish")?;
        if !output.status.success() {
            anyhow::bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
