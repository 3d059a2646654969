use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::ExclusionZone;
use crate::frame::{Insets, Region};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// Geometry
// =============================================================================

/// Play-area rectangle in viewport pixels, grid resolution and UI chrome to
/// avoid. Tuned for a 700x475 viewport; recalibrate for other layouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
    pub cell_size: u32,
    /// Press and release become separate actions instead of click-after-move.
    pub drag: bool,
    /// Replaces the built-in minimap / menu-strip zones when set.
    pub exclusion_zones: Option<Vec<ExclusionZone>>,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            x_min: 80,
            y_min: 15,
            x_max: 600,
            y_max: 395,
            cell_size: 10,
            drag: false,
            exclusion_zones: None,
        }
    }
}

impl GeometryConfig {
    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn exclusion_zones(&self) -> Vec<ExclusionZone> {
        if let Some(zones) = &self.exclusion_zones {
            return zones.clone();
        }
        let w = self.width() as f64;
        let h = self.height() as f64;
        // Open to the right: centres of a partial last column sit past `w`.
        vec![
            ExclusionZone::new("minimap", w - 126.0, 0.0, f64::INFINITY, 114.0),
            // Menu strip above the "end turn" button, which stays clickable.
            ExclusionZone::new("bottom_menu", w - 126.0, h - 30.0, f64::INFINITY, h - 14.0),
        ]
    }
}

// =============================================================================
// Observation
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Trimmed off the screenshot to get the observation.
    pub crop: Insets,
    /// Treasury readout, relative to the cropped observation.
    pub resource: Region,
    /// Readings above this get one trailing digit dropped.
    pub misread_ceiling: i64,
    /// Larger jumps from the last accepted reading are treated as misreads.
    pub max_delta: i64,
    pub tesseract_bin: String,
    pub ocr_lang: String,
    /// Write every observation to the diagnostics directory.
    pub save_observation: bool,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            crop: Insets {
                top: 0,
                bottom: 75,
                left: 76,
                right: 90,
            },
            resource: Region {
                x: 415,
                y: 0,
                width: 105,
                height: 19,
            },
            misread_ceiling: 50_000,
            max_delta: 5_000,
            tesseract_bin: "tesseract".to_string(),
            ocr_lang: "deu_latf".to_string(),
            save_observation: true,
        }
    }
}

// =============================================================================
// Turn Boundary
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub main_menu_template: Option<PathBuf>,
    pub player_icon_template: Option<PathBuf>,
    /// Opt-in: the full-screen menu check scores this template every step.
    pub confirm_button_template: Option<PathBuf>,
    /// Where the confirm button's center sits when a full-screen menu is up.
    pub full_screen_menu_at: (u32, u32),
    pub threshold: f32,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            main_menu_template: Some(PathBuf::from("assets/lotr2/main_menu_gray.png")),
            player_icon_template: Some(PathBuf::from("assets/lotr2/player_icon_gray.png")),
            confirm_button_template: None,
            full_screen_menu_at: (521, 386),
            threshold: 0.8,
            poll_interval_ms: 1_000,
            max_retries: 5,
        }
    }
}

// =============================================================================
// Server / Backend / Episode
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub root: PathBuf,
    pub host: String,
    pub port: u16,
    /// Bundle path under `root`, embedded in the generated page.
    pub bundle: String,
    pub dosbox_conf: Option<PathBuf>,
    pub custom_html: Option<PathBuf>,
    /// Page variant with the Shift+PageUp pause hook.
    pub lite: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("roms"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            bundle: "lotr2.jsdos".to_string(),
            dosbox_conf: None,
            custom_html: None,
            lite: false,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn bundle_url(&self) -> String {
        format!("{}/{}", self.base_url(), self.bundle.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser_args: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            viewport_width: 700,
            viewport_height: 475,
            browser_args: vec!["--disable-web-security".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    pub max_steps: u64,
    pub log_root: PathBuf,
    pub preload_script: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000,
            log_root: PathBuf::from("logs"),
            preload_script: Some(PathBuf::from("configs/lotr2/preload.txt")),
            seed: None,
        }
    }
}

// =============================================================================
// Top Level
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub game: String,
    pub geometry: GeometryConfig,
    pub observation: ObservationConfig,
    pub turn: TurnConfig,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub episode: EpisodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game: "lotr2".to_string(),
            geometry: GeometryConfig::default(),
            observation: ObservationConfig::default(),
            turn: TurnConfig::default(),
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            episode: EpisodeConfig::default(),
        }
    }
}

/// Values given on the command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub game: Option<String>,
    pub headless: Option<bool>,
    pub port: Option<u16>,
    pub max_steps: Option<u64>,
    pub grid_size: Option<u32>,
    pub drag: Option<bool>,
    pub webdriver_url: Option<String>,
    pub seed: Option<u64>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Command-line values win over whatever the file said.
    pub fn merge_cli(&mut self, cli: &CliOverrides) {
        if let Some(game) = &cli.game {
            self.game = game.clone();
        }
        if let Some(headless) = cli.headless {
            self.backend.headless = headless;
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(max_steps) = cli.max_steps {
            self.episode.max_steps = max_steps;
        }
        if let Some(grid_size) = cli.grid_size {
            self.geometry.cell_size = grid_size;
        }
        if let Some(drag) = cli.drag {
            self.geometry.drag = drag;
        }
        if let Some(url) = &cli.webdriver_url {
            self.backend.webdriver_url = url.clone();
        }
        if cli.seed.is_some() {
            self.episode.seed = cli.seed;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.geometry;
        if g.cell_size == 0 {
            return Err(ConfigError::Invalid("geometry.cell_size must be > 0".into()));
        }
        if g.width() == 0 || g.height() == 0 {
            return Err(ConfigError::Invalid(format!(
                "empty play area x=[{}, {}) y=[{}, {})",
                g.x_min, g.x_max, g.y_min, g.y_max
            )));
        }
        let o = &self.observation;
        let b = &self.backend;
        let (c, r) = (&o.crop, &o.resource);
        let obs_w = b
            .viewport_width
            .checked_sub(c.left.saturating_add(c.right))
            .filter(|w| *w > 0);
        let obs_h = b
            .viewport_height
            .checked_sub(c.top.saturating_add(c.bottom))
            .filter(|h| *h > 0);
        let (Some(obs_w), Some(obs_h)) = (obs_w, obs_h) else {
            return Err(ConfigError::Invalid(format!(
                "observation.crop {c:?} leaves nothing of a {}x{} viewport",
                b.viewport_width, b.viewport_height
            )));
        };
        if r.width == 0 || r.height == 0 {
            return Err(ConfigError::Invalid("observation.resource is empty".into()));
        }
        if r.x.saturating_add(r.width) > obs_w || r.y.saturating_add(r.height) > obs_h {
            return Err(ConfigError::Invalid(format!(
                "observation.resource {r:?} outside the {obs_w}x{obs_h} observation"
            )));
        }
        if o.misread_ceiling <= 0 || o.max_delta < 0 {
            return Err(ConfigError::Invalid(
                "observation.misread_ceiling must be > 0 and max_delta >= 0".into(),
            ));
        }
        let t = &self.turn;
        if !(t.threshold > 0.0 && t.threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "turn.threshold {} outside (0, 1]",
                t.threshold
            )));
        }
        if t.max_retries == 0 {
            return Err(ConfigError::Invalid("turn.max_retries must be > 0".into()));
        }
        if self.episode.max_steps == 0 {
            return Err(ConfigError::Invalid("episode.max_steps must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = Config::from_yaml(
            "game: lotr2\ngeometry:\n  cell_size: 20\nepisode:\n  max_steps: 50\n",
        )
        .unwrap();
        assert_eq!(cfg.geometry.cell_size, 20);
        assert_eq!(cfg.geometry.x_min, 80);
        assert_eq!(cfg.episode.max_steps, 50);
        assert_eq!(cfg.observation.misread_ceiling, 50_000);
    }

    #[test]
    fn cli_overrides_only_set_fields() {
        let mut cfg = Config::from_yaml("server:\n  port: 9001\nbackend:\n  headless: false\n").unwrap();
        cfg.merge_cli(&CliOverrides {
            max_steps: Some(7),
            ..Default::default()
        });
        assert_eq!(cfg.server.port, 9001);
        assert!(!cfg.backend.headless);
        assert_eq!(cfg.episode.max_steps, 7);

        cfg.merge_cli(&CliOverrides {
            port: Some(9100),
            headless: Some(true),
            ..Default::default()
        });
        assert_eq!(cfg.server.port, 9100);
        assert!(cfg.backend.headless);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_yaml("geometry:\n  cell_size: 0\n").is_err());
        assert!(Config::from_yaml("geometry:\n  x_min: 700\n").is_err());
        assert!(Config::from_yaml("turn:\n  threshold: 1.5\n").is_err());
        assert!(Config::from_yaml("turn:\n  max_retries: 0\n").is_err());
        assert!(Config::from_yaml("geometry: [1, 2]\n").is_err());
        // Insets eating the whole viewport.
        assert!(
            Config::from_yaml(
                "observation:\n  crop: { top: 0, bottom: 0, left: 400, right: 300 }\n"
            )
            .is_err()
        );
        assert!(
            Config::from_yaml(
                "observation:\n  crop: { top: 4294967295, bottom: 1, left: 0, right: 0 }\n"
            )
            .is_err()
        );
        // Readout past the right edge of the 534x400 observation.
        assert!(
            Config::from_yaml(
                "observation:\n  resource: { x: 500, y: 0, width: 105, height: 19 }\n"
            )
            .is_err()
        );
    }

    #[test]
    fn custom_zones_replace_builtin_ones() {
        let cfg = Config::from_yaml(
            "geometry:\n  exclusion_zones:\n    - { name: hud, left: 0, top: 0, right: 10, bottom: 10 }\n",
        )
        .unwrap();
        let zones = cfg.geometry.exclusion_zones();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "hud");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/lotr2.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
