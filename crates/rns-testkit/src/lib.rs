//! rns-testkit
//!
//! Offline drivers for the slot engine: a deterministic [`Harness`] for
//! scenario tests and a JSONL [`replay`] runner shared with the `rns` CLI.

use std::fs;

use anyhow::{Context, Result};

pub mod harness;
pub mod replay;

pub use harness::Harness;
pub use replay::{parse_replay, run_replay, ReplayReport, ReplayStep, StepResult};

pub fn load_replay_jsonl(path: &str) -> Result<Vec<(usize, ReplayStep)>> {
    let text = fs::read_to_string(path).with_context(|| format!("read replay: {path}"))?;
    parse_replay(&text)
}
