use thiserror::Error;

use crate::action::ActionDecodeError;
use crate::backend::BackendError;
use crate::bridge::BridgeError;
use crate::frame::FrameError;

/// Errors surfaced by [`DosEnv`](crate::env::DosEnv).
///
/// OCR misreads and animation timeouts are recovered inside the environment
/// and never show up here.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    ActionDecode(#[from] ActionDecodeError),
    #[error("automation backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("backend call failed: {0}")]
    Backend(BackendError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Bridge(BridgeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for EnvError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotStarted => {
                EnvError::BackendUnavailable("backend not started".to_string())
            }
            other => EnvError::Backend(other),
        }
    }
}

impl From<BridgeError> for EnvError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::WorkerGone => EnvError::BackendUnavailable(e.to_string()),
            other => EnvError::Bridge(other),
        }
    }
}
