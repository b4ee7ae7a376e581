//! Run identity: the validated difficulty / scenario / mode choices, the
//! physical scaling table they select, and the names derived from them.

use crate::utils::error::{EvalError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Hard,
    SuperHard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Hard => "hard",
            Difficulty::SuperHard => "super_hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "hard" => Ok(Difficulty::Hard),
            "super_hard" => Ok(Difficulty::SuperHard),
            _ => Err(EvalError::InvalidChoiceError {
                field: "difficulty".to_string(),
                message: "Please input the correct difficulty level, e.g. easy, hard or super_hard."
                    .to_string(),
            }),
        }
    }
}

/// Grid topology a policy was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Bus33,
    Bus141,
    Bus347,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Bus33 => "bus33bw_gu",
            Scenario::Bus141 => "bus141_gu",
            Scenario::Bus347 => "bus347_gu",
        }
    }
}

impl FromStr for Scenario {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bus33bw_gu" => Ok(Scenario::Bus33),
            "bus141_gu" => Ok(Scenario::Bus141),
            "bus347_gu" => Ok(Scenario::Bus347),
            _ => Err(EvalError::InvalidChoiceError {
                field: "scenario".to_string(),
                message: format!("{} is not a valid scenario.", s),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Distributed,
    Decentralised,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Distributed => "distributed",
            Mode::Decentralised => "decentralised",
        }
    }
}

impl FromStr for Mode {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "distributed" => Ok(Mode::Distributed),
            "decentralised" => Ok(Mode::Decentralised),
            _ => Err(EvalError::InvalidChoiceError {
                field: "mode".to_string(),
                message: "Please input the correct mode, e.g. distributed or decentralised."
                    .to_string(),
            }),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constants written into the environment (and, for the action pair, the
/// algorithm) arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingConstants {
    pub pv_scale: f64,
    pub demand_scale: f64,
    /// `(action_bias, action_scale)`. `None` keeps whatever the env args file holds.
    pub action: Option<(f64, f64)>,
}

pub fn scaling_constants(difficulty: Difficulty, scenario: Scenario) -> ScalingConstants {
    let pv_scale = match difficulty {
        Difficulty::Easy => 0.5,
        Difficulty::Hard => 0.8,
        Difficulty::SuperHard => 1.0,
    };
    // easy 難度沒有 bus347_gu 的動作範圍，沿用設定檔
    let action_scale = match (difficulty, scenario) {
        (Difficulty::Easy, Scenario::Bus33) => Some(0.7),
        (Difficulty::Easy, Scenario::Bus141) => Some(0.8),
        (Difficulty::Easy, Scenario::Bus347) => None,
        (Difficulty::Hard, Scenario::Bus33) => Some(0.7),
        (Difficulty::Hard, Scenario::Bus141) => Some(0.8),
        (Difficulty::Hard, Scenario::Bus347) => Some(0.4),
        (Difficulty::SuperHard, Scenario::Bus33) => Some(0.5),
        (Difficulty::SuperHard, Scenario::Bus141) => Some(0.6),
        (Difficulty::SuperHard, Scenario::Bus347) => Some(0.3),
    };

    ScalingConstants {
        pv_scale,
        demand_scale: 1.0,
        action: action_scale.map(|scale| (0.0, scale)),
    }
}

/// The validated identity of one evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSelection {
    pub env: String,
    pub scenario: Scenario,
    pub difficulty: Difficulty,
    pub mode: Mode,
    pub alg: String,
    pub reward_type: String,
    pub alias: String,
}

impl RunSelection {
    /// Validates the three constrained choices in the order scenario,
    /// difficulty, mode. Nothing is read or built before this succeeds.
    pub fn parse(
        env: &str,
        scenario: &str,
        difficulty: &str,
        mode: &str,
        alg: &str,
        reward_type: &str,
        alias: &str,
    ) -> Result<Self> {
        let scenario = scenario.parse::<Scenario>()?;
        let difficulty = difficulty.parse::<Difficulty>()?;
        let mode = mode.parse::<Mode>()?;

        Ok(Self {
            env: env.to_string(),
            scenario,
            difficulty,
            mode,
            alg: alg.to_string(),
            reward_type: reward_type.to_string(),
            alias: alias.to_string(),
        })
    }

    pub fn scaling(&self) -> ScalingConstants {
        scaling_constants(self.difficulty, self.scenario)
    }

    pub fn log_name(&self) -> String {
        log_name(&[
            &self.env,
            self.scenario.as_str(),
            self.difficulty.as_str(),
            self.mode.as_str(),
            &self.alg,
            &self.reward_type,
            &self.alias,
        ])
    }
}

pub fn log_name(parts: &[&str]) -> String {
    parts.join("-")
}

pub fn checkpoint_path(save_path: &str, log_name: &str) -> String {
    let mut path = save_path.to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    format!("{}{}/model.pt", path, log_name)
}

pub fn record_file_name(log_name: &str, test_mode: &str) -> String {
    format!("test_record_{}_{}.pickle", log_name, test_mode)
}

/// Replaces the last `/`-separated segment of `data_path` with the scenario.
pub fn scenario_data_path(data_path: &str, scenario: Scenario) -> String {
    let mut segments: Vec<&str> = data_path.split('/').collect();
    if let Some(last) = segments.last_mut() {
        *last = scenario.as_str();
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(alias: &str) -> RunSelection {
        RunSelection::parse(
            "var_voltage_control",
            "bus141_gu",
            "hard",
            "decentralised",
            "maddpg",
            "bowl",
            alias,
        )
        .unwrap()
    }

    fn action_scale(difficulty: Difficulty, scenario: Scenario) -> Option<f64> {
        scaling_constants(difficulty, scenario).action.map(|(_, scale)| scale)
    }

    #[test]
    fn test_scaling_table_easy() {
        let c = scaling_constants(Difficulty::Easy, Scenario::Bus33);
        assert_eq!(
            c,
            ScalingConstants {
                pv_scale: 0.5,
                demand_scale: 1.0,
                action: Some((0.0, 0.7)),
            }
        );
        assert_eq!(action_scale(Difficulty::Easy, Scenario::Bus141), Some(0.8));
    }

    #[test]
    fn test_easy_bus347_leaves_action_range_unset() {
        let c = scaling_constants(Difficulty::Easy, Scenario::Bus347);
        assert_eq!(c.pv_scale, 0.5);
        assert_eq!(c.demand_scale, 1.0);
        assert_eq!(c.action, None);
    }

    #[test]
    fn test_scaling_table_hard() {
        for scenario in [Scenario::Bus33, Scenario::Bus141, Scenario::Bus347] {
            let c = scaling_constants(Difficulty::Hard, scenario);
            assert_eq!(c.pv_scale, 0.8);
            assert_eq!(c.demand_scale, 1.0);
            assert_eq!(c.action.map(|(bias, _)| bias), Some(0.0));
        }
        assert_eq!(action_scale(Difficulty::Hard, Scenario::Bus33), Some(0.7));
        assert_eq!(action_scale(Difficulty::Hard, Scenario::Bus141), Some(0.8));
        assert_eq!(action_scale(Difficulty::Hard, Scenario::Bus347), Some(0.4));
    }

    #[test]
    fn test_scaling_table_super_hard() {
        for scenario in [Scenario::Bus33, Scenario::Bus141, Scenario::Bus347] {
            let c = scaling_constants(Difficulty::SuperHard, scenario);
            assert_eq!(c.pv_scale, 1.0);
            assert_eq!(c.demand_scale, 1.0);
            assert_eq!(c.action.map(|(bias, _)| bias), Some(0.0));
        }
        assert_eq!(action_scale(Difficulty::SuperHard, Scenario::Bus33), Some(0.5));
        assert_eq!(action_scale(Difficulty::SuperHard, Scenario::Bus141), Some(0.6));
        assert_eq!(action_scale(Difficulty::SuperHard, Scenario::Bus347), Some(0.3));
    }

    #[test]
    fn test_invalid_choices_are_rejected() {
        let bad_scenario = RunSelection::parse("e", "bus33bw", "easy", "distributed", "a", "l1", "");
        assert!(matches!(
            bad_scenario,
            Err(EvalError::InvalidChoiceError { ref field, .. }) if field == "scenario"
        ));

        let bad_difficulty =
            RunSelection::parse("e", "bus33bw_gu", "medium", "distributed", "a", "l1", "");
        assert!(matches!(
            bad_difficulty,
            Err(EvalError::InvalidChoiceError { ref field, .. }) if field == "difficulty"
        ));

        let bad_mode = RunSelection::parse("e", "bus33bw_gu", "easy", "central", "a", "l1", "");
        assert!(matches!(
            bad_mode,
            Err(EvalError::InvalidChoiceError { ref field, .. }) if field == "mode"
        ));
    }

    #[test]
    fn test_scenario_checked_before_difficulty() {
        let err = RunSelection::parse("e", "bus9", "impossible", "x", "a", "l1", "").unwrap_err();
        assert!(matches!(err, EvalError::InvalidChoiceError { ref field, .. } if field == "scenario"));
    }

    #[test]
    fn test_log_name_is_dash_join() {
        assert_eq!(
            selection("run1").log_name(),
            "var_voltage_control-bus141_gu-hard-decentralised-maddpg-bowl-run1"
        );
        // 空別名保留結尾的連字號
        assert_eq!(
            selection("").log_name(),
            "var_voltage_control-bus141_gu-hard-decentralised-maddpg-bowl-"
        );
    }

    #[test]
    fn test_checkpoint_path_trailing_slash() {
        assert_eq!(checkpoint_path("./", "run"), "./run/model.pt");
        assert_eq!(checkpoint_path("/models", "run"), "/models/run/model.pt");
        assert_eq!(checkpoint_path("/models/", "run"), "/models/run/model.pt");
    }

    #[test]
    fn test_record_file_name() {
        assert_eq!(record_file_name("a-b", "batch"), "test_record_a-b_batch.pickle");
    }

    #[test]
    fn test_scenario_data_path() {
        assert_eq!(
            scenario_data_path("environments/data/case33_3min_final", Scenario::Bus347),
            "environments/data/bus347_gu"
        );
        assert_eq!(scenario_data_path("case33", Scenario::Bus33), "bus33bw_gu");
    }
}
