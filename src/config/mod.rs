pub mod cli;
pub mod scenario;
pub mod yaml_config;

use crate::config::scenario::RunSelection;
use crate::utils::error::Result;
use crate::utils::validation::{validate_path, Validate};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// One fixed episode starting at day 730, hour 23, interval 2
    Single,
    /// Ten randomly started episodes, summarised per metric
    Batch,
}

impl TestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestMode::Single => "single",
            TestMode::Batch => "batch",
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "grid-marl-eval")]
#[command(about = "Evaluate a trained MARL policy on the voltage control environment")]
pub struct EvalArgs {
    /// Directory holding the trained model checkpoints
    #[arg(long, default_value = "./")]
    pub save_path: String,

    /// Algorithm name, selects the policy layout and strategy
    #[arg(long, default_value = "maddpg")]
    pub alg: String,

    /// Environment name, selects env_args/<env>.yaml
    #[arg(long, default_value = "var_voltage_control")]
    pub env: String,

    /// Free-form suffix for naming output artifacts
    #[arg(long, default_value = "")]
    pub alias: String,

    /// Difficulty level: easy, hard or super_hard
    #[arg(long, default_value = "easy")]
    pub difficulty: String,

    /// Control mode: distributed or decentralised
    #[arg(long, default_value = "distributed")]
    pub mode: String,

    /// Grid topology: bus33bw_gu, bus141_gu or bus347_gu
    #[arg(long, default_value = "bus33bw")]
    pub scenario: String,

    /// Reward type: l1, liu, l2 or bowl
    #[arg(long, default_value = "l1")]
    pub reward_type: String,

    #[arg(long, value_enum, default_value_t = TestMode::Single)]
    pub test_mode: TestMode,

    /// Root of the YAML argument tree
    #[arg(long, default_value = "./args")]
    pub args_dir: String,

    /// Directory the pickle record is written to
    #[arg(long, default_value = "./")]
    pub record_dir: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[arg(long, help = "Log timing, CPU and memory usage per evaluation phase")]
    pub monitor: bool,

    /// Resolve and print the configuration without loading the checkpoint
    #[arg(long)]
    pub dry_run: bool,
}

impl EvalArgs {
    pub fn selection(&self) -> Result<RunSelection> {
        RunSelection::parse(
            &self.env,
            &self.scenario,
            &self.difficulty,
            &self.mode,
            &self.alg,
            &self.reward_type,
            &self.alias,
        )
    }
}

impl Validate for EvalArgs {
    fn validate(&self) -> Result<()> {
        self.selection()?;
        validate_path("save_path", &self.save_path)?;
        validate_path("args_dir", &self.args_dir)?;
        validate_path("record_dir", &self.record_dir)?;
        Ok(())
    }
}
