use std::path::Path;

use lotr2_rl::{ActionSpace, Config, Frame, TurnDetector, TurnState, preload};

fn repo_file(rel: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(rel)
}

#[test]
fn shipped_config_matches_defaults() {
    let cfg = Config::load(&repo_file("configs/lotr2.yaml")).unwrap();
    let defaults = Config::default();
    assert_eq!(cfg.geometry.cell_size, defaults.geometry.cell_size);
    assert_eq!(cfg.observation.crop, defaults.observation.crop);
    assert_eq!(cfg.observation.resource, defaults.observation.resource);
    assert_eq!(cfg.turn.full_screen_menu_at, (521, 386));

    let space = ActionSpace::new(&cfg.geometry, cfg.geometry.drag);
    assert_eq!((space.grid_width(), space.grid_height()), (52, 38));
    assert_eq!(space.size(), 1978);
}

#[test]
fn shipped_preload_script_parses_cleanly() {
    let text = std::fs::read_to_string(repo_file("configs/lotr2/preload.txt")).unwrap();
    let commands = preload::parse(&text);
    let meaningful = text
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.trim().starts_with('#'))
        .count();
    assert_eq!(commands.len(), meaningful);
}

#[test]
fn shipped_templates_are_optional() {
    let cfg = Config::load(&repo_file("configs/lotr2.yaml")).unwrap();
    assert!(cfg.turn.confirm_button_template.is_none());
    // Template paths are resolved against the working directory; an absent
    // file disables the check instead of failing construction.
    let detector = TurnDetector::from_config(&cfg.turn).unwrap();
    let frame = Frame::new(image::RgbImage::new(534, 400));
    if !Path::new("assets/lotr2/main_menu_gray.png").exists() {
        assert_eq!(detector.classify(&frame), TurnState::Settled);
    }
    assert!(!detector.is_full_screen_menu(&frame));
}
