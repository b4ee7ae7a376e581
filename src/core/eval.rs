use crate::app::voltage_control::VoltageControl;
use crate::config::scenario::{checkpoint_path, record_file_name, RunSelection};
use crate::config::yaml_config::{
    apply_selection, merge_alg_args, AlgArgs, ArgMap, ArgsTree, EnvArgs,
};
use crate::config::{EvalArgs, TestMode};
use crate::core::registry::{Registry, Strategy};
use crate::core::tester::PgTester;
use crate::domain::model::TestRecord;
use crate::domain::ports::{Environment, Storage, Tester};
use crate::utils::error::{EvalError, Result};
use crate::utils::monitor::{EvalMonitor, EvalPhase};
use crate::utils::validation::{validate_path, Validate};
use serde_pickle::SerOptions;

/// (day, hour, interval) of the fixed single-episode evaluation.
pub const SINGLE_EPISODE_START: (usize, usize, usize) = (730, 23, 2);
pub const BATCH_EPISODES: usize = 10;

/// Everything resolved from the command line and the argument tree before
/// any environment or model is built.
#[derive(Debug, Clone)]
pub struct EvalPlan {
    pub selection: RunSelection,
    pub env_args: EnvArgs,
    /// Defaults merged with the algorithm file; sizes are filled in once the
    /// environment exists.
    pub alg_args: ArgMap,
    pub log_name: String,
    pub checkpoint: String,
    pub record_name: String,
    pub test_mode: TestMode,
}

impl EvalPlan {
    pub fn assemble(args: &EvalArgs) -> Result<Self> {
        // 先驗證選項，任何檔案讀取之前
        let selection = args.selection()?;
        validate_path("save_path", &args.save_path)?;
        validate_path("args_dir", &args.args_dir)?;

        let tree = ArgsTree::new(&args.args_dir);
        let env_map = apply_selection(tree.load_env_args(&args.env)?, &selection)?;
        let env_args = EnvArgs::from_map(env_map)?;
        env_args.validate()?;

        let alg_args = merge_alg_args(
            tree.load_default_args()?,
            tree.load_alg_args(&args.alg)?,
            &env_args,
        );

        let log_name = selection.log_name();
        let checkpoint = checkpoint_path(&args.save_path, &log_name);
        let record_name = record_file_name(&log_name, args.test_mode.as_str());

        Ok(Self {
            selection,
            env_args,
            alg_args,
            log_name,
            checkpoint,
            record_name,
            test_mode: args.test_mode,
        })
    }

    /// Completes the algorithm arguments with the environment's sizes.
    pub fn complete_alg_args<E: Environment>(&self, env: &E) -> Result<AlgArgs> {
        let args = AlgArgs::from_map(self.alg_args.clone())?.with_env_dims(
            env.num_agents(),
            env.obs_size(),
            env.total_actions(),
        );
        args.validate()?;
        Ok(args)
    }
}

/// Runs the evaluation entry point the test mode selects.
pub async fn dispatch<T: Tester + ?Sized>(tester: &mut T, test_mode: TestMode) -> Result<TestRecord> {
    match test_mode {
        TestMode::Single => {
            let (day, hour, interval) = SINGLE_EPISODE_START;
            Ok(TestRecord::Single(tester.run(day, hour, interval).await?))
        }
        TestMode::Batch => Ok(TestRecord::Batch(tester.batch_run(BATCH_EPISODES).await?)),
    }
}

/// Pickles the record; summary entries are written as Python tuples.
pub fn encode_record(record: &TestRecord) -> Result<Vec<u8>> {
    Ok(serde_pickle::to_vec(record, SerOptions::new())?)
}

pub struct EvalEngine<S: Storage> {
    storage: S,
    registry: Registry,
    monitor: EvalMonitor,
}

impl<S: Storage> EvalEngine<S> {
    pub fn new(storage: S) -> Self {
        Self::new_with_monitoring(storage, false)
    }

    pub fn new_with_monitoring(storage: S, monitor_enabled: bool) -> Self {
        Self {
            storage,
            registry: Registry::default(),
            monitor: EvalMonitor::new(monitor_enabled),
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Resolves the plan and builds the environment without touching the
    /// checkpoint.
    pub fn preview(&self, args: &EvalArgs) -> Result<(EvalPlan, AlgArgs)> {
        let plan = EvalPlan::assemble(args)?;
        let env = VoltageControl::new(plan.env_args.clone())?;
        let alg_args = plan.complete_alg_args(&env)?;
        Ok((plan, alg_args))
    }

    /// Runs the evaluation and returns the path of the written record.
    pub async fn run(&self, args: &EvalArgs) -> Result<String> {
        let plan = EvalPlan::assemble(args)?;
        tracing::info!("🏷️ Run: {}", plan.log_name);
        self.monitor.finish(EvalPhase::Config);

        let env = VoltageControl::new(plan.env_args.clone())?;
        let alg_args = plan.complete_alg_args(&env)?;
        tracing::info!("{}\n", alg_args.summary());
        self.monitor.finish(EvalPhase::Environment);

        let entry = self.registry.get(&plan.selection.alg)?;
        if alg_args.target {
            tracing::debug!("Target network skipped, only the behaviour policy is evaluated");
        }
        tracing::info!("📂 Loading checkpoint {}", plan.checkpoint);
        let policy = (entry.build)(&alg_args, &plan.checkpoint)?;
        self.monitor.finish(EvalPhase::Policy);

        let mut tester = match entry.strategy.parse::<Strategy>()? {
            Strategy::Pg => PgTester::new(alg_args, env, policy),
            Strategy::Q => {
                return Err(EvalError::NotImplemented {
                    message: "This needs to be implemented.".to_string(),
                })
            }
        };

        tracing::info!("▶️ Running {} evaluation", plan.test_mode);
        let record = dispatch(&mut tester, plan.test_mode).await?;
        self.monitor.finish(EvalPhase::Rollout);

        let bytes = encode_record(&record)?;
        let output_path = self.storage.write_file(&plan.record_name, &bytes).await?;
        tracing::debug!("Wrote {} bytes of test record", bytes.len());
        self.monitor.finish(EvalPhase::Record);

        self.monitor.report();
        Ok(output_path)
    }
}
