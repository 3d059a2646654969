#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use lotr2_rl::{
    AsyncBridge, Backend, BackendError, ClickOptions, Config, DosEnv, Frame, KeySpec, MouseButton,
    Ocr,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start,
    Navigate(String),
    Screenshot,
    MoveTo(f64, f64),
    Click(f64, f64),
    MouseDown,
    MouseUp,
    Drag(f64, f64),
    Scroll(f64),
    TypeText(String),
    PressKey(String),
    Close,
}

impl Call {
    pub fn is_gesture(&self) -> bool {
        matches!(
            self,
            Call::MoveTo(..) | Call::Click(..) | Call::MouseDown | Call::MouseUp | Call::Drag(..)
        )
    }
}

/// Records every call and serves queued screenshots, falling back to a flat
/// 700x475 frame.
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<Call>>,
    pub screens: Mutex<VecDeque<Vec<u8>>>,
    running: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn queue_screen(&self, image: RgbImage) {
        let bytes = Frame::new(image).to_png().unwrap();
        self.screens.lock().unwrap().push_back(bytes);
    }

    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.screens.lock().unwrap().push_back(bytes.to_vec());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotStarted)
        }
    }
}

pub fn blank_screen() -> RgbImage {
    RgbImage::from_pixel(700, 475, Rgb([40, 60, 40]))
}

#[async_trait]
impl Backend for FakeBackend {
    async fn start(&self) -> Result<(), BackendError> {
        self.record(Call::Start);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn navigate(&self, url: &str) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::Navigate(url.to_string()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BackendError> {
        self.check()?;
        self.record(Call::Screenshot);
        if let Some(bytes) = self.screens.lock().unwrap().pop_front() {
            return Ok(bytes);
        }
        Ok(Frame::new(blank_screen()).to_png().unwrap())
    }

    async fn move_to(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::MoveTo(x, y));
        Ok(())
    }

    async fn click(&self, x: f64, y: f64, _opts: ClickOptions) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::Click(x, y));
        Ok(())
    }

    async fn mouse_down(&self, _button: MouseButton) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::MouseDown);
        Ok(())
    }

    async fn mouse_up(&self, _button: MouseButton) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::MouseUp);
        Ok(())
    }

    async fn drag(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::Drag(x, y));
        Ok(())
    }

    async fn scroll(&self, dy: f64) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::Scroll(dy));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::TypeText(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: &KeySpec) -> Result<(), BackendError> {
        self.check()?;
        self.record(Call::PressKey(key.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.record(Call::Close);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// OCR that replays queued texts; an empty queue reads as "".
#[derive(Clone, Default)]
pub struct ScriptedOcr {
    texts: Arc<Mutex<VecDeque<String>>>,
}

impl ScriptedOcr {
    pub fn push(&self, text: &str) {
        self.texts.lock().unwrap().push_back(text.to_string());
    }
}

impl Ocr for ScriptedOcr {
    fn read_text(&self, _crop: &Frame) -> anyhow::Result<String> {
        Ok(self.texts.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Defaults with templates, preload and frame dumps switched off.
pub fn test_config(log_root: &Path) -> Config {
    let mut config = Config::default();
    config.episode.log_root = log_root.to_path_buf();
    config.episode.preload_script = None;
    config.episode.seed = Some(1);
    config.observation.save_observation = false;
    config.turn.main_menu_template = None;
    config.turn.player_icon_template = None;
    config.turn.confirm_button_template = None;
    config.turn.poll_interval_ms = 1;
    config
}

pub fn make_env(config: Config) -> (DosEnv, Arc<FakeBackend>, ScriptedOcr) {
    let backend = FakeBackend::new();
    let ocr = ScriptedOcr::default();
    let env = DosEnv::new(
        config,
        AsyncBridge::global().unwrap(),
        backend.clone(),
        Box::new(ocr.clone()),
        "http://localhost:8080".to_string(),
    )
    .unwrap();
    (env, backend, ocr)
}
