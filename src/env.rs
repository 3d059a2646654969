use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::action::{ActionSpace, Decoded, GestureKind, PixelCoordinate};
use crate::backend::{Backend, BackendError, ClickOptions, MouseButton};
use crate::bridge::AsyncBridge;
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::EnvError;
use crate::frame::Frame;
use crate::observation::{ObservationPipeline, ResourceReading};
use crate::ocr::Ocr;
use crate::path::{DEFAULT_CONTROL_POINTS, path};
use crate::preload::{self, PreloadCommand};
use crate::turn::TurnDetector;

/// Pause between consecutive cursor positions of a synthesized path.
const MOVE_DELAY_MS: std::ops::RangeInclusive<u64> = 1..=5;

// =============================================================================
// Episode State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Uninitialized,
    Ready,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct EpisodeState {
    /// `None` until a first reading is accepted.
    pub last_gold: Option<i64>,
    pub step_count: u64,
    /// Viewport position the pointer was last sent to.
    pub cursor: PixelCoordinate,
}

/// Per-step side channel returned next to the frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Info {
    /// Last accepted treasury reading, 0 before the first one.
    pub gold: i64,
    pub raw_text: String,
    pub reading_accepted: bool,
    pub step: u64,
    pub suppressed: bool,
    pub turn_polls: u32,
    pub turn_timeout: bool,
    pub full_screen_menu: bool,
}

#[derive(Debug)]
pub struct StepResult {
    pub frame: Frame,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

// =============================================================================
// DOS Environment
// =============================================================================

/// Lords of the Realm II behind a synchronous `reset` / `step` interface.
///
/// All backend traffic goes through the injected [`AsyncBridge`], one call at
/// a time: move, click, observe, then poll while the end-of-turn animation
/// plays.
pub struct DosEnv {
    config: Config,
    bridge: AsyncBridge,
    backend: Arc<dyn Backend>,
    actions: ActionSpace,
    pipeline: ObservationPipeline,
    detector: TurnDetector,
    diagnostics: Diagnostics,
    preload: Vec<PreloadCommand>,
    game_url: String,
    episode: EpisodeState,
    pub(crate) session_state: SessionState,
    suppressed_total: u64,
    debug_step: bool,
    rng: SmallRng,
}

impl DosEnv {
    pub fn new(
        config: Config,
        bridge: AsyncBridge,
        backend: Arc<dyn Backend>,
        ocr: Box<dyn Ocr>,
        game_url: String,
    ) -> Result<Self, EnvError> {
        let actions = ActionSpace::new(&config.geometry, config.geometry.drag);
        let pipeline = ObservationPipeline::new(&config.observation, ocr);
        let detector = TurnDetector::from_config(&config.turn)?;
        let diagnostics = Diagnostics::create(&config.episode.log_root, &config.game)?;
        let preload = config
            .episode
            .preload_script
            .as_deref()
            .map(preload::load)
            .unwrap_or_default();
        let rng = match config.episode.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let cursor = actions.to_viewport(PixelCoordinate::new(0.0, 0.0));

        info!(
            "action space {} ({}x{} grid, drag={}), logs in {}",
            actions.size(),
            actions.grid_width(),
            actions.grid_height(),
            actions.drag_enabled(),
            diagnostics.dir().display()
        );

        Ok(Self {
            config,
            bridge,
            backend,
            actions,
            pipeline,
            detector,
            diagnostics,
            preload,
            game_url,
            episode: EpisodeState {
                last_gold: None,
                step_count: 0,
                cursor,
            },
            session_state: SessionState::Uninitialized,
            suppressed_total: 0,
            debug_step: Self::debug_step_enabled(),
            rng,
        })
    }

    /// Swap in a detector built from in-memory templates.
    pub fn with_turn_detector(mut self, detector: TurnDetector) -> Self {
        self.detector = detector;
        self
    }

    fn debug_step_enabled() -> bool {
        match std::env::var("LOTR2_DEBUG_STEP") {
            Ok(val) => matches!(val.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
            Err(_) => false,
        }
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.actions
    }

    /// `(height, width, 3)` of the frames `reset` and `step` return.
    pub fn observation_shape(&self) -> (usize, usize, usize) {
        let crop = &self.config.observation.crop;
        let b = &self.config.backend;
        (
            b.viewport_height.saturating_sub(crop.top + crop.bottom) as usize,
            b.viewport_width.saturating_sub(crop.left + crop.right) as usize,
            3,
        )
    }

    pub fn episode(&self) -> &EpisodeState {
        &self.episode
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn suppressed_total(&self) -> u64 {
        self.suppressed_total
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reset(&mut self, seed: Option<u64>) -> Result<(Frame, Info), EnvError> {
        // Not steppable again until this reset has fully succeeded.
        self.session_state = SessionState::Uninitialized;
        self.diagnostics.begin_episode()?;
        if let Some(seed) = seed {
            self.rng = SmallRng::seed_from_u64(seed);
        }

        let backend = self.backend.clone();
        let url = self.game_url.clone();
        let commands = self.preload.clone();
        self.bridge.run(async move {
            if !backend.is_running().await {
                backend.start().await?;
            }
            backend.navigate(&url).await?;
            preload::run(&commands, backend.as_ref()).await
        })??;

        let (frame, reading) =
            self.pipeline
                .observe(&self.bridge, &self.backend, None, &mut self.diagnostics)?;
        self.episode.last_gold = reading.value;
        self.episode.step_count = 0;
        self.session_state = SessionState::Ready;

        let info = self.info(&reading, false, 0, false, self.detector.is_full_screen_menu(&frame));
        info!("reset: gold {:?}", self.episode.last_gold);
        Ok((frame, info))
    }

    pub fn step(&mut self, action: usize) -> Result<StepResult, EnvError> {
        match self.session_state {
            SessionState::Ready => {}
            SessionState::Uninitialized => {
                return Err(EnvError::BackendUnavailable(
                    "step() called before reset()".to_string(),
                ));
            }
            SessionState::Terminated => {
                return Err(EnvError::BackendUnavailable(
                    "environment terminated; call reset()".to_string(),
                ));
            }
        }

        let decoded = self.actions.decode(action)?;
        let suppressed = self.play(action, &decoded)?;

        let frame = self.pipeline.capture(&self.bridge, &self.backend)?;
        let settle = {
            let pipeline = &self.pipeline;
            let bridge = &self.bridge;
            let backend = &self.backend;
            self.detector
                .wait_until_settled(frame, &mut self.diagnostics, || {
                    pipeline.capture(bridge, backend)
                })?
        };
        let previous = self.episode.last_gold;
        let reading = self
            .pipeline
            .inspect(&settle.frame, previous, &mut self.diagnostics)?;

        let reward = match (reading.value, previous) {
            (Some(new), Some(prev)) => (new - prev).max(0) as f64,
            _ => 0.0,
        };
        if reward > 0.0 {
            info!(
                "gained reward {reward} (gold {} <- {})",
                reading.value.unwrap_or_default(),
                previous.unwrap_or_default()
            );
        }
        if reading.value.is_some() {
            self.episode.last_gold = reading.value;
        }

        self.episode.step_count += 1;
        let truncated = self.episode.step_count >= self.config.episode.max_steps;
        if truncated {
            self.session_state = SessionState::Terminated;
        }

        let info = self.info(
            &reading,
            suppressed,
            settle.polls,
            settle.timed_out,
            settle.full_screen_menu,
        );
        if self.debug_step {
            info!(
                "step {} action {action} -> {decoded:?} reward {reward} gold {} text {:?}",
                info.step, info.gold, info.raw_text
            );
        }

        Ok(StepResult {
            frame: settle.frame,
            reward,
            terminated: false,
            truncated,
            info,
        })
    }

    /// Release the browser session. Further steps need a `reset`.
    pub fn close(&mut self) -> Result<(), EnvError> {
        let backend = self.backend.clone();
        self.bridge.run(async move { backend.close().await })??;
        self.session_state = SessionState::Terminated;
        Ok(())
    }

    /// Carry out the gesture for one decoded action. Returns whether it was
    /// suppressed by an exclusion zone.
    fn play(&mut self, action: usize, decoded: &Decoded) -> Result<bool, EnvError> {
        match *decoded {
            Decoded::Wait => {
                debug!("wait action");
                Ok(false)
            }
            Decoded::Reserved { slot } => {
                info!("action {action} maps to reserved slot {slot}, ignored");
                Ok(false)
            }
            Decoded::Suppressed { cell, pixel } => {
                let zone = self
                    .actions
                    .excluded_by(pixel)
                    .map(|z| z.name.clone())
                    .unwrap_or_default();
                info!(
                    "prevent moving inside excluded area {zone}: cell ({}, {}) at ({}, {})",
                    cell.col, cell.row, pixel.x, pixel.y
                );
                self.suppressed_total += 1;
                Ok(true)
            }
            Decoded::Press | Decoded::Release => {
                let backend = self.backend.clone();
                let press = matches!(decoded, Decoded::Press);
                self.bridge.run(async move {
                    if press {
                        backend.mouse_down(MouseButton::Left).await
                    } else {
                        backend.mouse_up(MouseButton::Left).await
                    }
                })??;
                Ok(false)
            }
            Decoded::Gesture { pixel, kind, .. } => {
                let target = self.actions.to_viewport(pixel);
                let points = path(&mut self.rng, self.episode.cursor, target, DEFAULT_CONTROL_POINTS);
                let delays: Vec<u64> = points
                    .iter()
                    .map(|_| self.rng.random_range(MOVE_DELAY_MS))
                    .collect();
                let backend = self.backend.clone();
                self.bridge.run(async move {
                    for (p, delay) in points.iter().zip(delays) {
                        backend.move_to(p.x, p.y).await?;
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    if kind == GestureKind::MoveClick {
                        backend.click(target.x, target.y, ClickOptions::default()).await?;
                    }
                    Ok::<_, BackendError>(())
                })??;
                self.episode.cursor = target;
                Ok(false)
            }
        }
    }

    fn info(
        &self,
        reading: &ResourceReading,
        suppressed: bool,
        turn_polls: u32,
        turn_timeout: bool,
        full_screen_menu: bool,
    ) -> Info {
        Info {
            gold: self.episode.last_gold.unwrap_or(0),
            raw_text: reading.raw_text.clone(),
            reading_accepted: reading.value.is_some(),
            step: self.episode.step_count,
            suppressed,
            turn_polls,
            turn_timeout,
            full_screen_menu,
        }
    }
}
