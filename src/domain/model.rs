use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Electrical state of the grid after a power flow, in per-unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub pv_active: Vec<f64>,
    pub pv_reactive: Vec<f64>,
    pub bus_active: Vec<f64>,
    pub bus_reactive: Vec<f64>,
    pub bus_voltage: Vec<f64>,
    pub line_loss: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub reward: f64,
    pub done: bool,
    pub info: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOutput {
    /// Raw actions per agent, before translation to the environment range.
    pub actions: Vec<Vec<f32>>,
    pub hidden: Vec<Vec<f32>>,
}

/// Trajectory of one episode, one entry per recorded state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub pv_active: Vec<Vec<f64>>,
    pub pv_reactive: Vec<Vec<f64>>,
    pub bus_active: Vec<Vec<f64>>,
    pub bus_reactive: Vec<Vec<f64>>,
    pub bus_voltage: Vec<Vec<f64>>,
    pub line_loss: Vec<f64>,
}

impl EpisodeRecord {
    pub fn push(&mut self, snapshot: GridSnapshot) {
        self.pv_active.push(snapshot.pv_active);
        self.pv_reactive.push(snapshot.pv_reactive);
        self.bus_active.push(snapshot.bus_active);
        self.bus_reactive.push(snapshot.bus_reactive);
        self.bus_voltage.push(snapshot.bus_voltage);
        self.line_loss.push(snapshot.line_loss);
    }

    pub fn len(&self) -> usize {
        self.line_loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line_loss.is_empty()
    }
}

/// `mean_test_<metric>` -> (mean, 2 * std) over every step of every episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchSummary(pub BTreeMap<String, (f64, f64)>);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TestRecord {
    Single(EpisodeRecord),
    Batch(BatchSummary),
}
