pub mod eval;
pub mod registry;
pub mod tester;

pub use crate::domain::model::{EpisodeRecord, TestRecord};
pub use crate::domain::ports::{Environment, Policy, Storage, Tester};
pub use crate::utils::error::Result;
