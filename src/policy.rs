use std::io::BufRead;

use anyhow::{Context, Result, bail};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::action::ActionSpace;
use crate::env::Info;
use crate::frame::Frame;

/// Chooses the next action index from the latest observation.
pub trait Policy {
    fn decide(&mut self, frame: &Frame, info: &Info) -> Result<usize>;

    /// Called after each `reset`.
    fn begin_episode(&mut self) {}
}

/// Uniform over the whole action space.
pub struct RandomPolicy {
    size: usize,
    rng: SmallRng,
}

impl RandomPolicy {
    pub fn new(size: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self { size, rng }
    }
}

impl Policy for RandomPolicy {
    fn decide(&mut self, _frame: &Frame, _info: &Info) -> Result<usize> {
        if self.size == 0 {
            bail!("empty action space");
        }
        Ok(self.rng.random_range(0..self.size))
    }
}

/// Replays a fixed list of actions, then waits.
pub struct ScriptedPolicy {
    actions: Vec<usize>,
    cursor: usize,
}

impl ScriptedPolicy {
    pub fn new(actions: Vec<usize>) -> Self {
        Self { actions, cursor: 0 }
    }

    /// One entry per line: a raw index, `wait`, or `cell COL ROW`. `#` lines
    /// are comments.
    pub fn parse(text: &str, space: &ActionSpace) -> Result<Self> {
        let mut actions = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let action = parse_action(line, space)
                .with_context(|| format!("line {}: {line:?}", n + 1))?;
            actions.push(action);
        }
        Ok(Self::new(actions))
    }

    pub fn remaining(&self) -> usize {
        self.actions.len() - self.cursor
    }
}

impl Policy for ScriptedPolicy {
    fn decide(&mut self, _frame: &Frame, _info: &Info) -> Result<usize> {
        let action = self.actions.get(self.cursor).copied().unwrap_or(0);
        self.cursor = (self.cursor + 1).min(self.actions.len());
        Ok(action)
    }

    fn begin_episode(&mut self) {
        self.cursor = 0;
    }
}

fn parse_action(line: &str, space: &ActionSpace) -> Result<usize> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["wait"] => Ok(0),
        ["cell", col, row] => {
            let col: u32 = col.parse().context("bad column")?;
            let row: u32 = row.parse().context("bad row")?;
            Ok(space.encode(col, row)?)
        }
        [index] => {
            let action: usize = index.parse().context("expected an action index")?;
            space.decode(action)?;
            Ok(action)
        }
        _ => bail!("expected `wait`, `cell COL ROW` or an index"),
    }
}

/// Reads one action per line from a reader (stdin in the CLI). End of input
/// is an error so the episode loop stops.
pub struct StdinPolicy<R> {
    input: R,
    space: ActionSpace,
}

impl<R: BufRead> StdinPolicy<R> {
    pub fn new(input: R, space: ActionSpace) -> Self {
        Self { input, space }
    }
}

impl<R: BufRead> Policy for StdinPolicy<R> {
    fn decide(&mut self, _frame: &Frame, info: &Info) -> Result<usize> {
        loop {
            eprint!("[step {} | gold {}] action> ", info.step, info.gold);
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                bail!("input closed");
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_action(line, &self.space) {
                Ok(action) => return Ok(action),
                Err(e) => eprintln!("{e:#}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeometryConfig;
    use image::RgbImage;

    fn space() -> ActionSpace {
        ActionSpace::new(&GeometryConfig::default(), false)
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(2, 2))
    }

    #[test]
    fn random_policy_stays_in_range_and_is_seedable() {
        let mut a = RandomPolicy::new(1978, Some(7));
        let mut b = RandomPolicy::new(1978, Some(7));
        for _ in 0..200 {
            let x = a.decide(&frame(), &Info::default()).unwrap();
            assert!(x < 1978);
            assert_eq!(x, b.decide(&frame(), &Info::default()).unwrap());
        }
        assert!(RandomPolicy::new(0, None).decide(&frame(), &Info::default()).is_err());
    }

    #[test]
    fn script_parses_cells_and_indices() {
        let s = space();
        let mut p = ScriptedPolicy::parse("# open castle\ncell 1 1\nwait\n55\n", &s).unwrap();
        assert_eq!(p.remaining(), 3);
        let info = Info::default();
        assert_eq!(p.decide(&frame(), &info).unwrap(), 1);
        assert_eq!(p.decide(&frame(), &info).unwrap(), 0);
        assert_eq!(p.decide(&frame(), &info).unwrap(), 55);
        // Exhausted scripts wait.
        assert_eq!(p.decide(&frame(), &info).unwrap(), 0);
        p.begin_episode();
        assert_eq!(p.decide(&frame(), &info).unwrap(), 1);
    }

    #[test]
    fn script_rejects_bad_lines() {
        let s = space();
        assert!(ScriptedPolicy::parse("cell 53 1\n", &s).is_err());
        assert!(ScriptedPolicy::parse("99999\n", &s).is_err());
        assert!(ScriptedPolicy::parse("jump\n", &s).is_err());
    }

    #[test]
    fn stdin_policy_retries_until_valid() {
        let input = std::io::Cursor::new("\nnope\ncell 2 1\n");
        let mut p = StdinPolicy::new(input, space());
        assert_eq!(p.decide(&frame(), &Info::default()).unwrap(), 2);
        assert!(p.decide(&frame(), &Info::default()).is_err());
    }
}
