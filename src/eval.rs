use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::env::DosEnv;
use crate::policy::Policy;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalStats {
    pub avg_reward: f64,
    pub avg_final_gold: f64,
    pub avg_steps: f64,
    pub suppressed: u64,
    pub turn_timeouts: u64,
    pub episodes: usize,
}

/// Run `episodes` full episodes of `policy` in `env`, each ending on
/// truncation. A per-episode summary goes to stderr.
pub fn run_episodes(
    env: &mut DosEnv,
    policy: &mut dyn Policy,
    episodes: usize,
    seed: Option<u64>,
) -> Result<EvalStats> {
    let mut total_reward = 0.0f64;
    let mut total_gold = 0i64;
    let mut total_steps = 0u64;
    let mut suppressed = 0u64;
    let mut turn_timeouts = 0u64;

    let eval_episodes = episodes.max(1);

    for ep in 0..eval_episodes {
        let (mut frame, mut info) = env.reset(seed.map(|s| s.wrapping_add(ep as u64)))?;
        policy.begin_episode();
        let mut ep_reward = 0.0f64;
        let mut ep_steps = 0u64;

        loop {
            let action = policy.decide(&frame, &info)?;
            let result = env.step(action)?;
            ep_reward += result.reward;
            ep_steps += 1;
            if result.info.suppressed {
                suppressed += 1;
            }
            if result.info.turn_timeout {
                turn_timeouts += 1;
            }
            frame = result.frame;
            info = result.info;

            if result.terminated || result.truncated {
                break;
            }
        }

        eprintln!(
            "episode {:>3}: reward {:>8.1} | gold {:>6} | steps {:>5}",
            ep + 1,
            ep_reward,
            info.gold,
            ep_steps
        );
        total_reward += ep_reward;
        total_gold += info.gold;
        total_steps += ep_steps;
    }

    let denom = eval_episodes as f64;
    let stats = EvalStats {
        avg_reward: total_reward / denom,
        avg_final_gold: total_gold as f64 / denom,
        avg_steps: total_steps as f64 / denom,
        suppressed,
        turn_timeouts,
        episodes: eval_episodes,
    };
    info!("evaluation done: {stats:?}");
    Ok(stats)
}
