use std::path::Path;
use std::time::Duration;

use image::GrayImage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TurnConfig;
use crate::diagnostics::Diagnostics;
use crate::frame::{Frame, FrameError};

// =============================================================================
// Template Matching
// =============================================================================

/// Grayscale template located by mean-subtracted normalized
/// cross-correlation (OpenCV's `TM_CCOEFF_NORMED`).
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    template: GrayImage,
    threshold: f32,
    /// Template minus its mean, row-major.
    centered: Vec<f64>,
    energy: f64,
}

impl TemplateMatcher {
    pub fn new(template: GrayImage, threshold: f32) -> Self {
        let n = (template.width() * template.height()) as f64;
        let mean = template.as_raw().iter().map(|&p| p as f64).sum::<f64>() / n.max(1.0);
        let centered: Vec<f64> = template.as_raw().iter().map(|&p| p as f64 - mean).collect();
        let energy = centered.iter().map(|v| v * v).sum();
        Self {
            template,
            threshold,
            centered,
            energy,
        }
    }

    pub fn load(path: &Path, threshold: f32) -> Result<Self, FrameError> {
        Ok(Self::new(image::open(path)?.to_luma8(), threshold))
    }

    pub fn template(&self) -> &GrayImage {
        &self.template
    }

    /// Correlation map, one score per top-left placement, row-major with
    /// `image.width() - template.width() + 1` columns. Empty when the template
    /// does not fit.
    pub fn scores(&self, image: &GrayImage) -> (u32, u32, Vec<f32>) {
        let (tw, th) = self.template.dimensions();
        let (iw, ih) = image.dimensions();
        if tw == 0 || th == 0 || tw > iw || th > ih {
            return (0, 0, Vec::new());
        }
        let cols = iw - tw + 1;
        let rows = ih - th + 1;
        let n = (tw * th) as f64;
        let integral = Integral::new(image);
        let raw = image.as_raw();

        let mut out = Vec::with_capacity((cols * rows) as usize);
        for y in 0..rows {
            for x in 0..cols {
                let (sum, sum_sq) = integral.window(x, y, tw, th);
                let variance = sum_sq - sum * sum / n;
                let denom = (variance * self.energy).sqrt();
                if denom <= f64::EPSILON {
                    out.push(0.0);
                    continue;
                }
                let mut cross = 0.0;
                for j in 0..th {
                    let row = ((y + j) * iw + x) as usize;
                    let trow = (j * tw) as usize;
                    for i in 0..tw as usize {
                        cross += self.centered[trow + i] * raw[row + i] as f64;
                    }
                }
                out.push((cross / denom) as f32);
            }
        }
        (cols, rows, out)
    }

    /// Score of the single placement with its top-left corner at `(x, y)`.
    pub fn score_at(&self, image: &GrayImage, x: u32, y: u32) -> Option<f32> {
        let (tw, th) = self.template.dimensions();
        let (iw, ih) = image.dimensions();
        if tw == 0 || th == 0 || x.checked_add(tw)? > iw || y.checked_add(th)? > ih {
            return None;
        }
        let raw = image.as_raw();
        let n = (tw * th) as f64;
        let (mut sum, mut sum_sq, mut cross) = (0.0, 0.0, 0.0);
        for j in 0..th {
            let row = ((y + j) * iw + x) as usize;
            let trow = (j * tw) as usize;
            for i in 0..tw as usize {
                let v = raw[row + i] as f64;
                sum += v;
                sum_sq += v * v;
                cross += self.centered[trow + i] * v;
            }
        }
        let denom = ((sum_sq - sum * sum / n) * self.energy).sqrt();
        if denom <= f64::EPSILON {
            return Some(0.0);
        }
        Some((cross / denom) as f32)
    }

    pub fn best(&self, image: &GrayImage) -> Option<f32> {
        let (_, _, scores) = self.scores(image);
        scores.into_iter().reduce(f32::max)
    }

    pub fn is_present(&self, image: &GrayImage) -> bool {
        let (_, _, scores) = self.scores(image);
        scores.iter().any(|&s| s >= self.threshold)
    }

    /// Centers of every placement scoring at or above the threshold.
    pub fn locate(&self, image: &GrayImage) -> Vec<(u32, u32)> {
        let (tw, th) = self.template.dimensions();
        let (cols, _, scores) = self.scores(image);
        scores
            .iter()
            .enumerate()
            .filter(|(_, s)| **s >= self.threshold)
            .map(|(i, _)| {
                let x = i as u32 % cols;
                let y = i as u32 / cols;
                (x + tw / 2, y + th / 2)
            })
            .collect()
    }
}

/// Summed-area tables of pixel values and squared values.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sum_sq = vec![0.0; stride * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = raw[y * w + x] as f64;
                row += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sum_sq,
        }
    }

    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let at = |t: &[f64], x: usize, y: usize| t[y * self.stride + x];
        let rect = |t: &[f64]| at(t, x1, y1) - at(t, x0, y1) - at(t, x1, y0) + at(t, x0, y0);
        (rect(&self.sum), rect(&self.sum_sq))
    }
}

// =============================================================================
// Turn Detector
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnState {
    /// End-of-turn animation is playing; input would be lost.
    Animating,
    Settled,
}

#[derive(Debug)]
pub struct Settle {
    pub frame: Frame,
    pub polls: u32,
    pub timed_out: bool,
    /// Full-screen menu verdict for `frame`; false unless a confirm button
    /// template is configured.
    pub full_screen_menu: bool,
}

pub struct TurnDetector {
    main_menu: Option<TemplateMatcher>,
    player_icon: Option<TemplateMatcher>,
    confirm_button: Option<TemplateMatcher>,
    full_screen_menu_at: (u32, u32),
    poll_interval: Duration,
    max_retries: u32,
}

impl TurnDetector {
    /// Template files that do not exist disable their check with a warning.
    pub fn from_config(config: &TurnConfig) -> Result<Self, FrameError> {
        let load = |path: &Option<std::path::PathBuf>| -> Result<Option<TemplateMatcher>, FrameError> {
            let Some(path) = path else {
                return Ok(None);
            };
            if !path.exists() {
                warn!("template {} not found, check disabled", path.display());
                return Ok(None);
            }
            TemplateMatcher::load(path, config.threshold).map(Some)
        };
        if config.confirm_button_template.is_none() {
            debug!("no confirm button template, full-screen menu check off");
        }
        Ok(Self {
            main_menu: load(&config.main_menu_template)?,
            player_icon: load(&config.player_icon_template)?,
            confirm_button: load(&config.confirm_button_template)?,
            full_screen_menu_at: config.full_screen_menu_at,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_retries: config.max_retries,
        })
    }

    pub fn new(
        main_menu: Option<TemplateMatcher>,
        player_icon: Option<TemplateMatcher>,
        config: &TurnConfig,
    ) -> Self {
        Self {
            main_menu,
            player_icon,
            confirm_button: None,
            full_screen_menu_at: config.full_screen_menu_at,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_retries: config.max_retries,
        }
    }

    pub fn with_confirm_button(mut self, matcher: TemplateMatcher) -> Self {
        self.confirm_button = Some(matcher);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether any check needs the frame in grayscale at all.
    fn needs_gray(&self) -> bool {
        self.main_menu.is_some() || self.confirm_button.is_some()
    }

    /// Chrome visible without the active-player icon means the end-of-turn
    /// animation is running. Anything else counts as settled.
    pub fn classify(&self, frame: &Frame) -> TurnState {
        if self.main_menu.is_none() {
            return TurnState::Settled;
        }
        self.classify_gray(&frame.to_gray())
    }

    fn classify_gray(&self, gray: &GrayImage) -> TurnState {
        let Some(main_menu) = &self.main_menu else {
            return TurnState::Settled;
        };
        if !main_menu.is_present(gray) {
            return TurnState::Settled;
        }
        match &self.player_icon {
            Some(icon) if !icon.is_present(gray) => TurnState::Animating,
            _ => TurnState::Settled,
        }
    }

    /// A confirm button centered exactly where full-screen menus put theirs.
    pub fn is_full_screen_menu(&self, frame: &Frame) -> bool {
        if self.confirm_button.is_none() {
            return false;
        }
        self.full_screen_menu_gray(&frame.to_gray())
    }

    /// Only the one placement centered on `full_screen_menu_at` is scored.
    fn full_screen_menu_gray(&self, gray: &GrayImage) -> bool {
        let Some(confirm) = &self.confirm_button else {
            return false;
        };
        let (tw, th) = confirm.template().dimensions();
        let (cx, cy) = self.full_screen_menu_at;
        let (Some(x), Some(y)) = (cx.checked_sub(tw / 2), cy.checked_sub(th / 2)) else {
            return false;
        };
        confirm
            .score_at(gray, x, y)
            .is_some_and(|score| score >= confirm.threshold)
    }

    /// Re-observes every `poll_interval` while the animation is playing, at
    /// most `max_retries` times. On exhaustion the stuck frame is written to
    /// diagnostics and returned as is.
    pub fn wait_until_settled<E, F>(
        &self,
        frame: Frame,
        diagnostics: &mut Diagnostics,
        mut observe: F,
    ) -> Result<Settle, E>
    where
        F: FnMut() -> Result<Frame, E>,
    {
        // One grayscale conversion per observed frame, shared by every check.
        let gray_of = |frame: &Frame| self.needs_gray().then(|| frame.to_gray());
        let mut frame = frame;
        let mut gray = gray_of(&frame);
        let classify = |gray: &Option<GrayImage>| match gray {
            Some(g) => self.classify_gray(g),
            None => TurnState::Settled,
        };
        let mut state = classify(&gray);
        let mut polls = 0;
        while state == TurnState::Animating && polls < self.max_retries {
            std::thread::sleep(self.poll_interval);
            polls += 1;
            frame = observe()?;
            gray = gray_of(&frame);
            state = classify(&gray);
            debug!("turn poll {polls}: {state:?}");
        }
        let timed_out = state == TurnState::Animating;
        if timed_out {
            warn!("end of turn timed out after {polls} polls");
            diagnostics.record_timeout(&frame);
        }
        let full_screen_menu = gray
            .as_ref()
            .is_some_and(|g| self.full_screen_menu_gray(g));
        Ok(Settle {
            frame,
            polls,
            timed_out,
            full_screen_menu,
        })
    }
}
