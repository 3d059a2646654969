pub mod action;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod eval;
pub mod frame;
pub mod keys;
pub mod observation;
pub mod ocr;
pub mod path;
pub mod policy;
pub mod preload;
pub mod server;
pub mod turn;
pub mod webdriver;

pub use action::{
    ActionDecodeError, ActionSpace, Decoded, ExclusionZone, GestureKind, GridCoordinate,
    PixelCoordinate,
};
pub use backend::{Backend, BackendError, ClickOptions, MouseButton};
pub use bridge::{AsyncBridge, BridgeError};
pub use config::{CliOverrides, Config, ConfigError};
pub use diagnostics::Diagnostics;
pub use env::{DosEnv, EpisodeState, Info, StepResult};
pub use error::EnvError;
pub use eval::{EvalStats, run_episodes};
pub use frame::{Frame, FrameError, Insets, Region};
pub use keys::KeySpec;
pub use observation::{ObservationPipeline, Rejection, ResourceReading, ResourceSanitizer};
pub use ocr::{Ocr, TesseractCli};
pub use policy::{Policy, RandomPolicy, ScriptedPolicy, StdinPolicy};
pub use server::GameServer;
pub use turn::{TemplateMatcher, TurnDetector, TurnState};
pub use webdriver::WebDriverBackend;
