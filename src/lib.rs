pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use app::{actor::ActorNet, voltage_control::VoltageControl};
pub use config::{cli::LocalStorage, EvalArgs, TestMode};
pub use core::{eval::EvalEngine, tester::PgTester};
pub use utils::error::{EvalError, Result};
