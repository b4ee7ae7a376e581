//! Reactive-power voltage control on a radial feeder. Each PV inverter is an
//! agent setting its reactive power; the reward penalises voltages away from
//! the band centre and the reactive power spent.

pub mod barrier;
pub mod grid;
pub mod profiles;

use crate::config::scenario::Mode;
use crate::config::yaml_config::EnvArgs;
use crate::domain::model::{GridSnapshot, StepOutcome};
use crate::domain::ports::Environment;
use crate::utils::error::{EvalError, Result};
use crate::utils::validation::Validate;
use barrier::{RewardType, VoltageBand};
use grid::{GridSpec, PowerFlow, RadialGrid};
use profiles::Profiles;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::Path;

pub const GRID_FILE: &str = "grid.yaml";
const FEATURES_PER_BUS: usize = 5;
const HOURS_PER_DAY: usize = 24;

pub struct VoltageControl {
    args: EnvArgs,
    grid: RadialGrid,
    profiles: Profiles,
    reward_type: RewardType,
    band: VoltageBand,
    /// Buses each agent observes, in observation order.
    observed: Vec<Vec<usize>>,
    obs_size: usize,
    rng: StdRng,
    cursor: usize,
    steps: usize,
    pv_reactive: Vec<f64>,
    state: GridState,
    last: GridState,
}

#[derive(Debug, Clone, Default)]
struct GridState {
    load_p: Vec<f64>,
    load_q: Vec<f64>,
    pv_p: Vec<f64>,
    pv_q: Vec<f64>,
    voltage: Vec<f64>,
    line_loss: f64,
}

impl VoltageControl {
    pub fn new(args: EnvArgs) -> Result<Self> {
        args.validate()?;
        let mode: Mode = args.mode.parse()?;
        let reward_type: RewardType = args.reward_type.parse()?;

        let data_dir = Path::new(&args.data_path);
        let spec = GridSpec::from_file(data_dir.join(GRID_FILE))?;
        let grid = RadialGrid::new(spec)?;
        let profiles = Profiles::load(data_dir, grid.bus_count() - 1, grid.pv_buses().len())?;

        let observed = observed_buses(&grid, mode);
        let obs_size = observed.iter().map(Vec::len).max().unwrap_or(0) * FEATURES_PER_BUS;

        tracing::info!(
            "⚡ Voltage control environment: {} buses, {} agents, {} intervals, mode {}, reward {}",
            grid.bus_count(),
            grid.pv_buses().len(),
            profiles.len(),
            mode,
            args.reward_type
        );

        let band = VoltageBand {
            lower: args.v_lower,
            upper: args.v_upper,
        };
        let rng = StdRng::seed_from_u64(args.seed);
        let pv_reactive = vec![0.0; grid.pv_buses().len()];

        let mut env = Self {
            args,
            grid,
            profiles,
            reward_type,
            band,
            observed,
            obs_size,
            rng,
            cursor: 0,
            steps: 0,
            pv_reactive,
            state: GridState::default(),
            last: GridState::default(),
        };
        // 建構後即可使用，從第一個區間開始
        env.start_at(0)?;
        Ok(env)
    }

    pub fn episode_limit(&self) -> usize {
        self.args.episode_limit
    }

    /// Interval index of a (day, hour, interval) start.
    pub fn interval_index(&self, day: usize, hour: usize, interval: usize) -> Result<usize> {
        let per_hour = self.args.intervals_per_hour;
        if hour >= HOURS_PER_DAY || interval >= per_hour {
            return Err(EvalError::environment(format!(
                "invalid start hour {} / interval {} ({} intervals per hour)",
                hour, interval, per_hour
            )));
        }
        let index = (day * HOURS_PER_DAY + hour) * per_hour + interval;
        if index >= self.profiles.len() {
            return Err(EvalError::environment(format!(
                "start day {} hour {} interval {} is beyond the {} profile intervals",
                day,
                hour,
                interval,
                self.profiles.len()
            )));
        }
        Ok(index)
    }

    fn start_at(&mut self, index: usize) -> Result<Vec<Vec<f32>>> {
        self.cursor = index;
        self.steps = 0;
        self.pv_reactive.iter_mut().for_each(|q| *q = 0.0);
        self.state = self.solve_at(index)?;
        self.last = self.state.clone();
        Ok(self.observations())
    }

    fn solve_at(&self, index: usize) -> Result<GridState> {
        let n = self.grid.bus_count();
        let mut load_p = vec![0.0; n];
        let mut load_q = vec![0.0; n];
        for bus in 1..n {
            load_p[bus] = self.profiles.load_active[index][bus - 1] * self.args.demand_scale;
            load_q[bus] = self.profiles.load_reactive[index][bus - 1] * self.args.demand_scale;
        }

        let pv_p: Vec<f64> = self.profiles.pv_active[index]
            .iter()
            .map(|p| p * self.args.pv_scale)
            .collect();
        let pv_q = self.pv_reactive.clone();

        let mut net_p = load_p.clone();
        let mut net_q = load_q.clone();
        for (unit, &bus) in self.grid.pv_buses().iter().enumerate() {
            net_p[bus] -= pv_p[unit];
            net_q[bus] -= pv_q[unit];
        }

        let PowerFlow { voltage, line_loss } = self.grid.solve(&net_p, &net_q)?;

        Ok(GridState {
            load_p,
            load_q,
            pv_p,
            pv_q,
            voltage,
            line_loss,
        })
    }

    /// Reactive power limit of each inverter given its active output.
    fn clip_reactive(&self, actions: &[f64], pv_p: &[f64]) -> Vec<f64> {
        actions
            .iter()
            .zip(pv_p)
            .zip(self.grid.pv_capacity())
            .map(|((&q, &p), &s)| {
                let limit = (s * s - p * p).max(0.0).sqrt();
                q.clamp(-limit, limit)
            })
            .collect()
    }

    fn reward_and_info(&self, state: &GridState) -> (f64, BTreeMap<String, f64>) {
        let v = &state.voltage[1..];
        let n = v.len() as f64;
        let v_ref = self.band.reference();

        let lower = v.iter().filter(|&&x| x < self.band.lower).count() as f64;
        let upper = v.iter().filter(|&&x| x > self.band.upper).count() as f64;
        let out_of_control = (lower + upper) / n;

        let v_loss = self.reward_type.mean_penalty(v, self.band) * self.args.voltage_weight;
        let q_abs: f64 = state.pv_q.iter().map(|q| q.abs()).sum();
        let q_loss = q_abs / state.pv_q.len().max(1) as f64 * self.args.q_weight;
        let reward = -(v_loss + q_loss);

        let mut info = BTreeMap::new();
        info.insert("percentage_of_v_out_of_control".to_string(), out_of_control);
        info.insert("percentage_of_lower_than_lower_v".to_string(), lower / n);
        info.insert("percentage_of_higher_than_upper_v".to_string(), upper / n);
        info.insert(
            "totally_controllable_ratio".to_string(),
            if out_of_control == 0.0 { 1.0 } else { 0.0 },
        );
        info.insert(
            "average_voltage_deviation".to_string(),
            v.iter().map(|x| (x - v_ref).abs()).sum::<f64>() / n,
        );
        info.insert("average_voltage".to_string(), v.iter().sum::<f64>() / n);
        info.insert(
            "max_voltage_drop_deviation".to_string(),
            v.iter().map(|x| (self.band.lower - x).max(0.0)).fold(0.0, f64::max),
        );
        info.insert(
            "max_voltage_rise_deviation".to_string(),
            v.iter().map(|x| (x - self.band.upper).max(0.0)).fold(0.0, f64::max),
        );
        info.insert("total_line_loss".to_string(), state.line_loss);
        info.insert("total_reactive_power".to_string(), q_abs);
        (reward, info)
    }
}

fn observed_buses(grid: &RadialGrid, mode: Mode) -> Vec<Vec<usize>> {
    grid.pv_buses()
        .iter()
        .map(|&bus| match mode {
            Mode::Decentralised => vec![bus],
            Mode::Distributed => grid
                .zones()
                .iter()
                .find(|zone| zone.contains(&bus))
                .cloned()
                .unwrap_or_else(|| (1..grid.bus_count()).collect()),
        })
        .collect()
}

impl Environment for VoltageControl {
    fn num_agents(&self) -> usize {
        self.grid.pv_buses().len()
    }

    fn obs_size(&self) -> usize {
        self.obs_size
    }

    fn total_actions(&self) -> usize {
        1
    }

    fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        let limit = self.args.episode_limit;
        if self.profiles.len() <= limit {
            return Err(EvalError::environment(format!(
                "{} profile intervals cannot hold an episode of {} steps",
                self.profiles.len(),
                limit
            )));
        }
        let start = self.rng.gen_range(0..self.profiles.len() - limit);
        tracing::debug!("Episode starts at interval {}", start);
        self.start_at(start)
    }

    fn manual_reset(
        &mut self,
        day: usize,
        hour: usize,
        interval: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let index = self.interval_index(day, hour, interval)?;
        tracing::debug!(
            "Episode starts at day {} hour {} interval {} (index {})",
            day,
            hour,
            interval,
            index
        );
        self.start_at(index)
    }

    fn step(&mut self, actions: &[f64]) -> Result<StepOutcome> {
        if actions.len() != self.num_agents() {
            return Err(EvalError::environment(format!(
                "expected {} actions, got {}",
                self.num_agents(),
                actions.len()
            )));
        }

        self.pv_reactive = self.clip_reactive(actions, &self.state.pv_p);
        let (applied, destroyed) = match self.solve_at(self.cursor) {
            Ok(state) => (state, false),
            Err(e) => {
                tracing::warn!("Power flow failed, keeping the previous state: {}", e);
                (self.state.clone(), true)
            }
        };

        let (reward, mut info) = self.reward_and_info(&applied);
        info.insert("destroy".to_string(), if destroyed { 1.0 } else { 0.0 });
        self.last = applied;

        self.steps += 1;
        let next = self.cursor + 1;
        let exhausted = next >= self.profiles.len();
        if !exhausted {
            self.cursor = next;
            self.state = match self.solve_at(next) {
                Ok(state) => state,
                Err(_) => self.last.clone(),
            };
        }

        let done = destroyed || exhausted || self.steps >= self.args.episode_limit;
        Ok(StepOutcome { reward, done, info })
    }

    fn observations(&self) -> Vec<Vec<f32>> {
        let mut pv_p = vec![0.0; self.grid.bus_count()];
        let mut pv_q = vec![0.0; self.grid.bus_count()];
        for (unit, &bus) in self.grid.pv_buses().iter().enumerate() {
            pv_p[bus] += self.state.pv_p[unit];
            pv_q[bus] += self.state.pv_q[unit];
        }

        self.observed
            .iter()
            .map(|buses| {
                let mut obs = vec![0.0f32; self.obs_size];
                for (slot, &bus) in buses.iter().enumerate() {
                    let base = slot * FEATURES_PER_BUS;
                    obs[base] = self.state.load_p[bus] as f32;
                    obs[base + 1] = self.state.load_q[bus] as f32;
                    obs[base + 2] = pv_p[bus] as f32;
                    obs[base + 3] = pv_q[bus] as f32;
                    obs[base + 4] = self.state.voltage[bus] as f32;
                }
                obs
            })
            .collect()
    }

    fn snapshot(&self) -> GridSnapshot {
        let s = &self.last;
        let mut bus_active = s.load_p.clone();
        let mut bus_reactive = s.load_q.clone();
        for (unit, &bus) in self.grid.pv_buses().iter().enumerate() {
            bus_active[bus] -= s.pv_p[unit];
            bus_reactive[bus] -= s.pv_q[unit];
        }
        GridSnapshot {
            pv_active: s.pv_p.clone(),
            pv_reactive: s.pv_q.clone(),
            bus_active,
            bus_reactive,
            bus_voltage: s.voltage.clone(),
            line_loss: s.line_loss,
        }
    }
}
