use crate::config::scenario::{scenario_data_path, RunSelection};
use crate::utils::error::{EvalError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_one_of, validate_path, validate_positive_number,
    validate_range, Validate,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// A loosely typed argument dictionary, as read from YAML.
pub type ArgMap = Map<String, Value>;

pub const REWARD_TYPES: [&str; 4] = ["l1", "liu", "l2", "bowl"];

/// Layout of the argument tree: `env_args/<env>.yaml`, `default.yaml`,
/// `alg_args/<alg>.yaml`.
#[derive(Debug, Clone)]
pub struct ArgsTree {
    root: PathBuf,
}

impl ArgsTree {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn env_args_path(&self, env: &str) -> PathBuf {
        self.root.join("env_args").join(format!("{}.yaml", env))
    }

    pub fn default_args_path(&self) -> PathBuf {
        self.root.join("default.yaml")
    }

    pub fn alg_args_path(&self, alg: &str) -> PathBuf {
        self.root.join("alg_args").join(format!("{}.yaml", alg))
    }

    pub fn load_env_args(&self, env: &str) -> Result<ArgMap> {
        let path = self.env_args_path(env);
        section(load_yaml_file(&path)?, "env_args", &path)
    }

    pub fn load_default_args(&self) -> Result<ArgMap> {
        let path = self.default_args_path();
        match load_yaml_file(&path)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(ArgMap::new()),
            _ => Err(EvalError::config(format!(
                "{} must contain a mapping",
                path.display()
            ))),
        }
    }

    pub fn load_alg_args(&self, alg: &str) -> Result<ArgMap> {
        let path = self.alg_args_path(alg);
        section(load_yaml_file(&path)?, "alg_args", &path)
    }
}

/// 從 YAML 檔案載入配置
pub fn load_yaml_file<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    tracing::debug!("Loading arguments from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(EvalError::IoError)?;
    parse_yaml_str(&content)
}

/// 從 YAML 字串解析配置
pub fn parse_yaml_str(content: &str) -> Result<Value> {
    let processed_content = substitute_env_vars(content)?;
    Ok(serde_yaml::from_str(&processed_content)?)
}

/// 替換環境變數 (例如 ${DATA_ROOT})
fn substitute_env_vars(content: &str) -> Result<String> {
    use regex::Regex;
    let re = Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| EvalError::config(format!("Invalid substitution pattern: {}", e)))?;

    let result = re.replace_all(content, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.to_string())
}

fn section(doc: Value, key: &str, path: &Path) -> Result<ArgMap> {
    match doc {
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Object(inner)) => Ok(inner),
            Some(_) => Err(EvalError::config(format!(
                "'{}' in {} must be a mapping",
                key,
                path.display()
            ))),
            None => Err(EvalError::MissingConfigError {
                field: format!("{} ({})", key, path.display()),
            }),
        },
        _ => Err(EvalError::config(format!(
            "{} must contain a mapping",
            path.display()
        ))),
    }
}

/// Shallow merge; keys in `overrides` win.
pub fn merge(defaults: ArgMap, overrides: ArgMap) -> ArgMap {
    let mut merged = defaults;
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    merged
}

/// Applies the run selection to the raw environment arguments: data path
/// rewrite, scaling constants, mode and reward type.
pub fn apply_selection(mut env_args: ArgMap, selection: &RunSelection) -> Result<ArgMap> {
    let data_path = env_args
        .get("data_path")
        .and_then(Value::as_str)
        .ok_or_else(|| EvalError::MissingConfigError {
            field: "env_args.data_path".to_string(),
        })?;
    let data_path = scenario_data_path(data_path, selection.scenario);
    env_args.insert("data_path".to_string(), Value::from(data_path));

    let scaling = selection.scaling();
    env_args.insert("pv_scale".to_string(), Value::from(scaling.pv_scale));
    env_args.insert("demand_scale".to_string(), Value::from(scaling.demand_scale));
    match scaling.action {
        Some((bias, scale)) => {
            env_args.insert("action_bias".to_string(), Value::from(bias));
            env_args.insert("action_scale".to_string(), Value::from(scale));
        }
        None => {
            for key in ["action_bias", "action_scale"] {
                if !env_args.get(key).is_some_and(Value::is_number) {
                    return Err(EvalError::MissingConfigError {
                        field: format!("env_args.{}", key),
                    });
                }
            }
        }
    }
    env_args.insert("mode".to_string(), Value::from(selection.mode.as_str()));
    env_args.insert(
        "reward_type".to_string(),
        Value::from(selection.reward_type.as_str()),
    );

    Ok(env_args)
}

/// Copies the action pair into the algorithm arguments and merges them over
/// the defaults.
pub fn merge_alg_args(default_args: ArgMap, mut alg_args: ArgMap, env_args: &EnvArgs) -> ArgMap {
    alg_args.insert("action_scale".to_string(), Value::from(env_args.action_scale));
    alg_args.insert("action_bias".to_string(), Value::from(env_args.action_bias));
    merge(default_args, alg_args)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvArgs {
    pub data_path: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_reward_type")]
    pub reward_type: String,
    #[serde(default = "one")]
    pub pv_scale: f64,
    #[serde(default = "one")]
    pub demand_scale: f64,
    #[serde(default)]
    pub action_bias: f64,
    #[serde(default = "default_action_scale")]
    pub action_scale: f64,
    #[serde(default = "default_episode_limit")]
    pub episode_limit: usize,
    #[serde(default = "default_v_upper")]
    pub v_upper: f64,
    #[serde(default = "default_v_lower")]
    pub v_lower: f64,
    #[serde(default = "one")]
    pub voltage_weight: f64,
    #[serde(default = "default_q_weight")]
    pub q_weight: f64,
    #[serde(default = "default_intervals_per_hour")]
    pub intervals_per_hour: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(flatten)]
    pub extra: ArgMap,
}

fn default_mode() -> String {
    "distributed".to_string()
}

fn default_reward_type() -> String {
    "l1".to_string()
}

fn one() -> f64 {
    1.0
}

fn default_action_scale() -> f64 {
    0.8
}

fn default_episode_limit() -> usize {
    240
}

fn default_v_upper() -> f64 {
    1.05
}

fn default_v_lower() -> f64 {
    0.95
}

fn default_q_weight() -> f64 {
    0.1
}

fn default_intervals_per_hour() -> usize {
    20
}

impl EnvArgs {
    pub fn from_map(map: ArgMap) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

impl Validate for EnvArgs {
    fn validate(&self) -> Result<()> {
        validate_path("env_args.data_path", &self.data_path)?;
        validate_one_of("env_args.mode", &self.mode, &["distributed", "decentralised"])?;
        validate_one_of("env_args.reward_type", &self.reward_type, &REWARD_TYPES)?;
        validate_positive_number("env_args.episode_limit", self.episode_limit, 1)?;
        validate_positive_number("env_args.intervals_per_hour", self.intervals_per_hour, 1)?;
        validate_range("env_args.v_lower", self.v_lower, 0.5, self.v_upper)?;
        validate_range("env_args.v_upper", self.v_upper, self.v_lower, 1.5)?;
        validate_range("env_args.pv_scale", self.pv_scale, 0.0, 10.0)?;
        validate_range("env_args.demand_scale", self.demand_scale, 0.0, 10.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgArgs {
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    #[serde(default = "default_hid_size")]
    pub hid_size: usize,
    #[serde(default = "default_hid_activation")]
    pub hid_activation: String,
    #[serde(default)]
    pub layernorm: bool,
    #[serde(default = "yes")]
    pub shared_params: bool,
    #[serde(default)]
    pub agent_id: bool,
    #[serde(default)]
    pub target: bool,
    #[serde(default = "yes")]
    pub continuous: bool,
    #[serde(default = "default_episode_limit")]
    pub max_steps: usize,
    #[serde(default = "default_action_scale")]
    pub action_scale: f64,
    #[serde(default)]
    pub action_bias: f64,
    #[serde(default)]
    pub agent_num: usize,
    #[serde(default)]
    pub obs_size: usize,
    #[serde(default)]
    pub action_dim: usize,
    #[serde(default)]
    pub cuda: bool,
    #[serde(flatten)]
    pub extra: ArgMap,
}

fn default_agent_type() -> String {
    "mlp".to_string()
}

fn default_hid_size() -> usize {
    64
}

fn default_hid_activation() -> String {
    "relu".to_string()
}

fn yes() -> bool {
    true
}

impl AlgArgs {
    pub fn from_map(map: ArgMap) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Fills the sizes only the environment knows. Evaluation always runs on
    /// the CPU.
    pub fn with_env_dims(mut self, agent_num: usize, obs_size: usize, action_dim: usize) -> Self {
        self.agent_num = agent_num;
        self.obs_size = obs_size;
        self.action_dim = action_dim;
        self.cuda = false;
        self
    }

    pub fn summary(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

impl Validate for AlgArgs {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("alg_args.agent_type", &self.agent_type)?;
        validate_one_of("alg_args.agent_type", &self.agent_type, &["mlp", "rnn"])?;
        validate_one_of(
            "alg_args.hid_activation",
            &self.hid_activation,
            &["relu", "tanh"],
        )?;
        validate_positive_number("alg_args.hid_size", self.hid_size, 1)?;
        validate_positive_number("alg_args.max_steps", self.max_steps, 1)?;
        if !self.continuous {
            return Err(EvalError::InvalidConfigValueError {
                field: "alg_args.continuous".to_string(),
                value: "false".to_string(),
                reason: "Only continuous reactive power actions are supported".to_string(),
            });
        }
        Ok(())
    }
}
