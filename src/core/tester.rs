use crate::config::yaml_config::AlgArgs;
use crate::domain::model::{BatchSummary, EpisodeRecord};
use crate::domain::ports::{Environment, Policy, Tester};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Maps raw actions onto `[bias - scale, bias + scale]` after clamping them
/// to `[-1, 1]`, flattened agent by agent.
pub fn translate_action(actions: &[Vec<f32>], action_scale: f64, action_bias: f64) -> Vec<f64> {
    let low = action_bias - action_scale;
    let high = action_bias + action_scale;
    actions
        .iter()
        .flatten()
        .map(|&a| {
            let clamped = (a as f64).clamp(-1.0, 1.0);
            0.5 * (clamped + 1.0) * (high - low) + low
        })
        .collect()
}

/// Runs a policy-gradient actor greedily against an environment.
pub struct PgTester<E: Environment> {
    args: AlgArgs,
    env: E,
    policy: Box<dyn Policy>,
}

impl<E: Environment> PgTester<E> {
    pub fn new(args: AlgArgs, env: E, policy: Box<dyn Policy>) -> Self {
        Self { args, env, policy }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Plays one episode from the current environment state. `on_step` sees
    /// every step's info map.
    fn play<F>(&mut self, mut state: Vec<Vec<f32>>, mut on_step: F) -> Result<usize>
    where
        F: FnMut(&E, &BTreeMap<String, f64>),
    {
        let mut hidden = self.policy.init_hidden();
        let max_steps = self.args.max_steps;
        let mut steps = 0;

        for t in 0..max_steps {
            let output = self.policy.act(&state, &hidden)?;
            let actual = translate_action(&output.actions, self.args.action_scale, self.args.action_bias);
            let outcome = self.env.step(&actual)?;
            steps += 1;
            on_step(&self.env, &outcome.info);

            state = self.env.observations();
            hidden = output.hidden;
            if outcome.done || t == max_steps - 1 {
                break;
            }
        }
        Ok(steps)
    }
}

#[async_trait]
impl<E: Environment> Tester for PgTester<E> {
    async fn run(&mut self, day: usize, hour: usize, interval: usize) -> Result<EpisodeRecord> {
        let state = self.env.manual_reset(day, hour, interval)?;

        let mut record = EpisodeRecord::default();
        record.push(self.env.snapshot());
        let steps = self.play(state, |env, _| record.push(env.snapshot()))?;

        tracing::info!(
            "🎯 Single episode from day {} hour {} interval {} finished after {} steps",
            day,
            hour,
            interval,
            steps
        );
        Ok(record)
    }

    async fn batch_run(&mut self, episodes: usize) -> Result<BatchSummary> {
        let mut collected: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for episode in 0..episodes {
            let state = self.env.reset()?;
            let steps = self.play(state, |_, info| {
                for (key, value) in info {
                    collected
                        .entry(format!("mean_test_{}", key))
                        .or_default()
                        .push(*value);
                }
            })?;
            tracing::debug!("Episode {} finished after {} steps", episode + 1, steps);
        }

        let summary: BTreeMap<String, (f64, f64)> = collected
            .into_iter()
            .map(|(key, values)| {
                let stats = mean_and_two_std(&values);
                (key, stats)
            })
            .collect();

        tracing::info!("📈 Batch evaluation over {} episodes:", episodes);
        for (key, (mean, spread)) in &summary {
            tracing::info!("  {}: {:.6} ± {:.6}", key, mean, spread);
        }
        Ok(BatchSummary(summary))
    }
}

/// Mean and twice the population standard deviation.
fn mean_and_two_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, 2.0 * var.sqrt())
}
