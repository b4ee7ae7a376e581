use crate::app::actor::ActorNet;
use crate::config::yaml_config::AlgArgs;
use crate::domain::ports::Policy;
use crate::utils::error::{EvalError, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Evaluation family of an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Policy-gradient style: a deterministic actor produces the actions.
    Pg,
    /// Value-based.
    Q,
}

impl FromStr for Strategy {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pg" => Ok(Strategy::Pg),
            "q" => Ok(Strategy::Q),
            other => Err(EvalError::UnsupportedStrategy {
                name: other.to_string(),
            }),
        }
    }
}

/// Builds a policy from the completed arguments and a checkpoint path.
pub type PolicyBuilder = fn(&AlgArgs, &str) -> Result<Box<dyn Policy>>;

#[derive(Debug, Clone)]
pub struct AlgorithmEntry {
    pub build: PolicyBuilder,
    pub strategy: String,
}

#[derive(Debug, Clone)]
pub struct Registry {
    entries: HashMap<String, AlgorithmEntry>,
}

pub const PG_ALGORITHMS: [&str; 10] = [
    "maddpg",
    "matd3",
    "sqddpg",
    "iddpg",
    "iac",
    "ippo",
    "mappo",
    "coma",
    "maac",
    "facmaddpg",
];

fn build_actor(args: &AlgArgs, checkpoint: &str) -> Result<Box<dyn Policy>> {
    Ok(Box::new(ActorNet::load(args, checkpoint)?))
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, build: PolicyBuilder, strategy: &str) {
        self.entries.insert(
            name.to_string(),
            AlgorithmEntry {
                build,
                strategy: strategy.to_string(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Result<&AlgorithmEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| EvalError::UnknownAlgorithm {
                name: name.to_string(),
            })
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for name in PG_ALGORITHMS {
            registry.register(name, build_actor, "pg");
        }
        registry
    }
}
