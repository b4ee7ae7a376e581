use clap::Parser;
use grid_marl_eval::config::yaml_config::AlgArgs;
use grid_marl_eval::core::eval::EvalPlan;
use grid_marl_eval::utils::error::ErrorSeverity;
use grid_marl_eval::utils::{logger, validation::Validate};
use grid_marl_eval::{EvalArgs, EvalEngine, LocalStorage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = EvalArgs::parse();

    // 初始化日誌
    if args.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting grid-marl-eval");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    // 驗證參數
    if let Err(e) = args.validate() {
        tracing::error!("❌ Argument validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let storage = LocalStorage::new(args.record_dir.clone());
    let engine = EvalEngine::new_with_monitoring(storage, args.monitor);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - the checkpoint will not be loaded");
        match engine.preview(&args) {
            Ok((plan, alg_args)) => {
                display_plan_summary(&plan, &alg_args);
                return Ok(());
            }
            Err(e) => exit_with(e),
        }
    }

    match engine.run(&args).await {
        Ok(output_path) => {
            tracing::info!("✅ Evaluation completed successfully!");
            tracing::info!("📁 Test record saved to: {}", output_path);
            println!("✅ Evaluation completed successfully!");
            println!("📁 Test record saved to: {}", output_path);
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

fn exit_with(e: grid_marl_eval::EvalError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Evaluation failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}

fn display_plan_summary(plan: &EvalPlan, alg_args: &AlgArgs) {
    println!("📋 Evaluation Summary:");
    println!("  Run: {}", plan.log_name);
    println!("  Scenario: {} ({})", plan.selection.scenario, plan.env_args.data_path);
    println!(
        "  Difficulty: {} (pv_scale {}, demand_scale {})",
        plan.selection.difficulty, plan.env_args.pv_scale, plan.env_args.demand_scale
    );
    println!(
        "  Actions: bias {} scale {}",
        plan.env_args.action_bias, plan.env_args.action_scale
    );
    println!("  Mode: {}", plan.selection.mode);
    println!("  Reward: {}", plan.env_args.reward_type);
    println!(
        "  Agents: {} (obs {}, actions {})",
        alg_args.agent_num, alg_args.obs_size, alg_args.action_dim
    );
    println!("  Policy: {} / hidden {}", alg_args.agent_type, alg_args.hid_size);
    println!("  Checkpoint: {}", plan.checkpoint);
    println!("  Test mode: {}", plan.test_mode);
    println!("  Record: {}", plan.record_name);
    println!();
}
