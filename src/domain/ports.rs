use crate::domain::model::{
    BatchSummary, EpisodeRecord, GridSnapshot, PolicyOutput, StepOutcome,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    /// Returns the full path written.
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// A multi-agent environment whose agents each emit a continuous action vector.
pub trait Environment: Send {
    fn num_agents(&self) -> usize;
    fn obs_size(&self) -> usize;
    /// Action dimension of a single agent.
    fn total_actions(&self) -> usize;

    /// Starts an episode at a random point of the data.
    fn reset(&mut self) -> Result<Vec<Vec<f32>>>;
    fn manual_reset(&mut self, day: usize, hour: usize, interval: usize)
        -> Result<Vec<Vec<f32>>>;
    /// `actions` holds one flattened entry per agent and action dimension,
    /// already in the environment's action range.
    fn step(&mut self, actions: &[f64]) -> Result<StepOutcome>;
    fn observations(&self) -> Vec<Vec<f32>>;
    fn snapshot(&self) -> GridSnapshot;
}

/// A trained decision policy with optional recurrent state.
pub trait Policy: Send + Sync {
    fn init_hidden(&self) -> Vec<Vec<f32>>;
    fn act(&self, obs: &[Vec<f32>], hidden: &[Vec<f32>]) -> Result<PolicyOutput>;
}

#[async_trait]
pub trait Tester: Send {
    async fn run(&mut self, day: usize, hour: usize, interval: usize) -> Result<EpisodeRecord>;
    async fn batch_run(&mut self, episodes: usize) -> Result<BatchSummary>;
}
