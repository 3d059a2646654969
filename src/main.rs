// =============================================================================
// Lords of the Realm II (js-dos) as an RL environment
// =============================================================================
// Needs a chromedriver on --webdriver-url and the game bundle under roms/.
//   cargo run --release -- serve
//   cargo run --release -- explore --headed
//   cargo run --release -- baseline --episodes 3 --max-steps 200
//   cargo run --release -- play --script configs/lotr2/opening.txt

use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use lotr2_rl::{
    AsyncBridge, CliOverrides, Config, DosEnv, GameServer, Policy, RandomPolicy, ScriptedPolicy,
    StdinPolicy, TesseractCli, WebDriverBackend, run_episodes,
};

// =============================================================================
// Setup
// =============================================================================

fn load_config(common: &CommonArgs) -> Result<Config> {
    let mut config = match &common.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.merge_cli(&common.overrides());
    config.validate()?;
    Ok(config)
}

/// Start the bundle server (when enabled) and build an environment on a
/// fresh WebDriver session. The server must outlive the environment.
fn build_env(config: Config, bridge: AsyncBridge) -> Result<(Option<GameServer>, DosEnv)> {
    let server = if config.server.enabled {
        Some(GameServer::start(&config.server)?)
    } else {
        None
    };
    let game_url = server
        .as_ref()
        .map(GameServer::url)
        .unwrap_or_else(|| config.server.base_url());

    let backend = Arc::new(WebDriverBackend::new(config.backend.clone())?);
    let ocr = Box::new(TesseractCli::new(
        config.observation.tesseract_bin.clone(),
        config.observation.ocr_lang.clone(),
    ));
    let env = DosEnv::new(config, bridge, backend, ocr, game_url)
        .context("failed to build environment")?;
    Ok((server, env))
}

/// Run `body`, then close the browser session whatever the outcome.
fn with_env<T>(env: &mut DosEnv, body: impl FnOnce(&mut DosEnv) -> Result<T>) -> Result<T> {
    let result = body(env);
    if let Err(e) = env.close() {
        eprintln!("warning: failed to close browser session: {e}");
    }
    result
}

// =============================================================================
// Subcommands
// =============================================================================

fn explore(args: &ExploreArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let bridge = AsyncBridge::spawn()?;
    let (_server, mut env) = build_env(config, bridge)?;

    let space = env.action_space().clone();
    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!("  EXPLORE — Lords of the Realm II");
    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!(
        "grid {}x{} | action space {} | drag {}",
        space.grid_width(),
        space.grid_height(),
        space.size(),
        space.drag_enabled()
    );
    for zone in space.zones() {
        eprintln!(
            "excluded {:<12} x=[{}, {}] y=[{}, {}]",
            zone.name, zone.left, zone.right, zone.top, zone.bottom
        );
    }

    with_env(&mut env, |env| {
        let (frame, info) = env.reset(args.common.seed)?;
        eprintln!("observation shape {:?}", frame.shape());
        eprintln!("gold {} (raw {:?})", info.gold, info.raw_text.trim());
        eprintln!("full-screen menu: {}", info.full_screen_menu);

        let out = env.diagnostics().dir().join("explore.png");
        frame.save(&out)?;
        eprintln!("frame saved to {}", out.display());

        for _ in 0..args.waits {
            let result = env.step(0)?;
            eprintln!(
                "wait -> gold {} polls {} timeout {}",
                result.info.gold, result.info.turn_polls, result.info.turn_timeout
            );
        }
        Ok(())
    })
}

fn baseline(args: &BaselineArgs) -> Result<()> {
    eprintln!("Running random agent baseline...");
    let config = load_config(&args.common)?;
    let bridge = AsyncBridge::spawn()?;
    let (_server, mut env) = build_env(config, bridge)?;
    let mut policy = RandomPolicy::new(env.action_space().size(), args.common.seed);

    let stats = with_env(&mut env, |env| {
        run_episodes(env, &mut policy, args.episodes, args.common.seed)
    })?;
    eprintln!(
        "\nBaseline: mean reward={:.1}, mean final gold={:.1}, mean steps={:.1}, suppressed={}, turn timeouts={}",
        stats.avg_reward, stats.avg_final_gold, stats.avg_steps, stats.suppressed, stats.turn_timeouts
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

fn play(args: &PlayArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let bridge = AsyncBridge::spawn()?;
    let (_server, mut env) = build_env(config, bridge)?;
    let space = env.action_space().clone();

    let mut policy: Box<dyn Policy> = match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Box::new(ScriptedPolicy::parse(&text, &space)?)
        }
        None => {
            eprintln!(
                "Enter an action index, `wait`, or `cell COL ROW` (grid {}x{}).",
                space.grid_width(),
                space.grid_height()
            );
            Box::new(StdinPolicy::new(BufReader::new(std::io::stdin()), space))
        }
    };

    let stats = with_env(&mut env, |env| {
        run_episodes(env, policy.as_mut(), args.episodes, args.common.seed)
    })?;
    eprintln!(
        "\nPlay: mean reward={:.1}, mean final gold={:.1}",
        stats.avg_reward, stats.avg_final_gold
    );
    Ok(())
}

fn serve(args: &ServeArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let server = GameServer::start(&config.server)?;
    eprintln!(
        "Serving {} at {} (Ctrl-C to stop)",
        config.server.root.display(),
        server.url()
    );
    loop {
        std::thread::park();
    }
}

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "lotr2-rl", about = "Lords of the Realm II (js-dos) as an RL environment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the game, observe once and print what the environment sees
    Explore(ExploreArgs),
    /// Run random agent baseline
    Baseline(BaselineArgs),
    /// Play from a script file or from stdin
    Play(PlayArgs),
    /// Only serve the game bundle
    Serve(ServeArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// YAML config; built-in defaults otherwise
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = false, conflicts_with = "headed")]
    headless: bool,
    /// Show the browser window
    #[arg(long, default_value_t = false)]
    headed: bool,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    max_steps: Option<u64>,
    /// Cell size of the action grid in pixels
    #[arg(long)]
    grid_size: Option<u32>,
    /// Separate press/release actions instead of click-after-move
    #[arg(long, default_value_t = false)]
    drag: bool,
    #[arg(long)]
    webdriver_url: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
}

impl CommonArgs {
    fn overrides(&self) -> CliOverrides {
        let headless = match (self.headless, self.headed) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        CliOverrides {
            game: None,
            headless,
            port: self.port,
            max_steps: self.max_steps,
            grid_size: self.grid_size,
            drag: self.drag.then_some(true),
            webdriver_url: self.webdriver_url.clone(),
            seed: self.seed,
        }
    }
}

#[derive(Args)]
struct ExploreArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Wait actions to step after the first observation
    #[arg(long, default_value = "0")]
    waits: u32,
}

#[derive(Args)]
struct BaselineArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value = "3")]
    episodes: usize,
    /// Also print the stats as JSON on stdout
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args)]
struct PlayArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// One action per line; stdin when omitted
    #[arg(long)]
    script: Option<PathBuf>,
    #[arg(long, default_value = "1")]
    episodes: usize,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    common: CommonArgs,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Explore(args) => explore(args),
        Commands::Baseline(args) => baseline(args),
        Commands::Play(args) => play(args),
        Commands::Serve(args) => serve(args),
    }
}
