//! Radial distribution feeder with a linearised (LinDistFlow) power flow.
//!
//! Bus 0 is the slack bus. Every other bus has exactly one upstream line.
//! Quantities are per-unit; demand is positive, generation negative.

use crate::utils::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSpec {
    pub from: usize,
    pub to: usize,
    pub r: f64,
    pub x: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSpec {
    /// Includes the slack bus.
    pub bus_count: usize,
    pub lines: Vec<LineSpec>,
    pub pv_buses: Vec<usize>,
    /// Apparent power rating per PV inverter.
    pub pv_capacity: Vec<f64>,
    /// Bus groups observed together in distributed mode.
    #[serde(default)]
    pub zones: Vec<Vec<usize>>,
    #[serde(default = "default_slack_voltage")]
    pub slack_voltage: f64,
}

fn default_slack_voltage() -> f64 {
    1.0
}

impl GridSpec {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

#[derive(Debug, Clone)]
struct Upstream {
    parent: usize,
    r: f64,
    x: f64,
}

#[derive(Debug, Clone)]
pub struct RadialGrid {
    spec: GridSpec,
    upstream: Vec<Option<Upstream>>,
    /// Breadth-first order from the slack bus.
    order: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerFlow {
    pub voltage: Vec<f64>,
    pub line_loss: f64,
}

impl RadialGrid {
    pub fn new(spec: GridSpec) -> Result<Self> {
        let n = spec.bus_count;
        if n < 2 {
            return Err(EvalError::environment("grid needs at least two buses"));
        }
        if spec.lines.len() != n - 1 {
            return Err(EvalError::environment(format!(
                "a radial grid with {} buses needs {} lines, got {}",
                n,
                n - 1,
                spec.lines.len()
            )));
        }
        if spec.pv_buses.is_empty() {
            return Err(EvalError::environment("grid has no PV buses to control"));
        }
        if spec.pv_capacity.len() != spec.pv_buses.len() {
            return Err(EvalError::environment(format!(
                "{} PV buses but {} capacities",
                spec.pv_buses.len(),
                spec.pv_capacity.len()
            )));
        }
        let out_of_range = spec
            .pv_buses
            .iter()
            .chain(spec.zones.iter().flatten())
            .chain(spec.lines.iter().flat_map(|l| [&l.from, &l.to]))
            .find(|&&bus| bus >= n);
        if let Some(bus) = out_of_range {
            return Err(EvalError::environment(format!("bus {} does not exist", bus)));
        }
        if let Some(bus) = spec.pv_buses.iter().find(|&&bus| bus == 0) {
            return Err(EvalError::environment(format!(
                "PV bus {} cannot be the slack bus",
                bus
            )));
        }

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, line) in spec.lines.iter().enumerate() {
            adjacency[line.from].push(idx);
            adjacency[line.to].push(idx);
        }

        let mut upstream: Vec<Option<Upstream>> = vec![None; n];
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut queue = VecDeque::from([0usize]);
        visited[0] = true;

        while let Some(bus) = queue.pop_front() {
            order.push(bus);
            for &idx in &adjacency[bus] {
                let line = &spec.lines[idx];
                let next = if line.from == bus { line.to } else { line.from };
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                upstream[next] = Some(Upstream {
                    parent: bus,
                    r: line.r,
                    x: line.x,
                });
                queue.push_back(next);
            }
        }

        if order.len() != n {
            return Err(EvalError::environment(
                "grid is not connected to the slack bus",
            ));
        }

        Ok(Self {
            spec,
            upstream,
            order,
        })
    }

    pub fn bus_count(&self) -> usize {
        self.spec.bus_count
    }

    pub fn pv_buses(&self) -> &[usize] {
        &self.spec.pv_buses
    }

    pub fn pv_capacity(&self) -> &[f64] {
        &self.spec.pv_capacity
    }

    pub fn zones(&self) -> &[Vec<usize>] {
        &self.spec.zones
    }

    /// Solves for bus voltages given the net demand at every bus
    /// (index 0 ignored).
    pub fn solve(&self, p: &[f64], q: &[f64]) -> Result<PowerFlow> {
        let n = self.bus_count();
        if p.len() != n || q.len() != n {
            return Err(EvalError::environment(format!(
                "power flow expects {} bus injections, got {} / {}",
                n,
                p.len(),
                q.len()
            )));
        }

        // 由末端往上累加支路潮流
        let mut flow_p = p.to_vec();
        let mut flow_q = q.to_vec();
        for &bus in self.order.iter().rev() {
            if let Some(up) = &self.upstream[bus] {
                flow_p[up.parent] += flow_p[bus];
                flow_q[up.parent] += flow_q[bus];
            }
        }

        let mut v_sq = vec![0.0; n];
        v_sq[0] = self.spec.slack_voltage * self.spec.slack_voltage;
        let mut line_loss = 0.0;
        for &bus in self.order.iter().skip(1) {
            let Some(up) = &self.upstream[bus] else {
                continue;
            };
            let parent_sq = v_sq[up.parent];
            let next = parent_sq - 2.0 * (up.r * flow_p[bus] + up.x * flow_q[bus]);
            if next <= 0.0 || !next.is_finite() {
                return Err(EvalError::environment(format!(
                    "voltage collapse at bus {}",
                    bus
                )));
            }
            v_sq[bus] = next;
            line_loss += up.r * (flow_p[bus].powi(2) + flow_q[bus].powi(2)) / parent_sq;
        }

        Ok(PowerFlow {
            voltage: v_sq.into_iter().map(f64::sqrt).collect(),
            line_loss,
        })
    }
}
