use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::KeySpec;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend not started")]
    NotStarted,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("failed to decode screenshot payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
}

impl MouseButton {
    /// W3C pointer button number.
    pub fn code(self) -> u8 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Right => 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickOptions {
    pub button: MouseButton,
    /// DOM codes held down around the click (`Shift`, `Control`, ...).
    pub modifiers: Vec<String>,
}

/// Browser automation surface the environment drives.
///
/// Coordinates are viewport pixels. Every method is only ever awaited on the
/// bridge worker, one call at a time.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn start(&self) -> Result<(), BackendError>;
    async fn is_running(&self) -> bool;
    async fn navigate(&self, url: &str) -> Result<(), BackendError>;
    /// Encoded image bytes (PNG or JPEG).
    async fn screenshot(&self) -> Result<Vec<u8>, BackendError>;
    async fn move_to(&self, x: f64, y: f64) -> Result<(), BackendError>;
    async fn click(&self, x: f64, y: f64, opts: ClickOptions) -> Result<(), BackendError>;
    async fn mouse_down(&self, button: MouseButton) -> Result<(), BackendError>;
    async fn mouse_up(&self, button: MouseButton) -> Result<(), BackendError>;
    /// Press at the current cursor, move to `(x, y)`, release.
    async fn drag(&self, x: f64, y: f64) -> Result<(), BackendError>;
    async fn scroll(&self, dy: f64) -> Result<(), BackendError>;
    async fn type_text(&self, text: &str) -> Result<(), BackendError>;
    async fn press_key(&self, key: &KeySpec) -> Result<(), BackendError>;
    async fn close(&self) -> Result<(), BackendError>;
}
