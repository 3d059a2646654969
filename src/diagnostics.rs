use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::frame::Frame;

static INSTANCES: AtomicUsize = AtomicUsize::new(0);

/// Per-run directory collecting frames worth a second look: rejected OCR
/// crops, frames stuck mid-animation, the latest observation. Each episode
/// writes into its own `episode_NNN/` subdirectory.
///
/// Writes are best effort; a failed write is logged and otherwise ignored.
#[derive(Debug)]
pub struct Diagnostics {
    run_dir: PathBuf,
    dir: PathBuf,
    episode: usize,
    rejected_texts: HashSet<String>,
    rejected_count: usize,
    timeout_count: usize,
}

impl Diagnostics {
    /// `<root>/<game>/<YYYYmmdd_HHMMSS>_<pid>-<n>/`, unique per instance
    /// even when several environments start within the same second.
    pub fn create(root: &Path, game: &str) -> std::io::Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let n = INSTANCES.fetch_add(1, Ordering::Relaxed);
        let name = format!("{stamp}_{}-{n}", std::process::id());
        Self::in_dir(root.join(game).join(name))
    }

    pub fn in_dir(dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            run_dir: dir.clone(),
            dir,
            episode: 0,
            rejected_texts: HashSet::new(),
            rejected_count: 0,
            timeout_count: 0,
        })
    }

    /// Switch to a fresh `episode_NNN/` directory and restart numbering.
    pub fn begin_episode(&mut self) -> std::io::Result<()> {
        self.episode += 1;
        let dir = self.run_dir.join(format!("episode_{:03}", self.episode));
        std::fs::create_dir_all(&dir)?;
        self.dir = dir;
        self.rejected_texts.clear();
        self.rejected_count = 0;
        self.timeout_count = 0;
        Ok(())
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory of the current episode, the run directory before the first.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keeps one crop per distinct raw text.
    pub fn record_rejected_reading(&mut self, raw_text: &str, crop: &Frame) {
        if !self.rejected_texts.insert(raw_text.to_string()) {
            return;
        }
        let name = format!("crowns_{}.png", self.rejected_count);
        self.rejected_count += 1;
        self.write(&name, crop);
    }

    pub fn record_timeout(&mut self, frame: &Frame) {
        let name = format!("endofturn_{}.png", self.timeout_count);
        self.timeout_count += 1;
        self.write(&name, frame);
    }

    pub fn record_observation(&mut self, tag: &str, frame: &Frame) {
        self.write(&format!("obs_{tag}.png"), frame);
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected_count
    }

    pub fn timeout_count(&self) -> usize {
        self.timeout_count
    }

    fn write(&self, name: &str, frame: &Frame) {
        let path = self.dir.join(name);
        if let Err(e) = frame.save(&path) {
            warn!("failed to write {}: {e}", path.display());
        }
    }
}
