use candle_core::{Device, Tensor};
use clap::Parser;
use grid_marl_eval::app::actor::StateDict;
use grid_marl_eval::config::yaml_config::AlgArgs;
use grid_marl_eval::core::registry::Registry;
use grid_marl_eval::domain::ports::Policy;
use grid_marl_eval::{ActorNet, EvalArgs, EvalEngine, EvalError, LocalStorage};
use serde_pickle::{DeOptions, HashableValue, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

const INTERVALS_PER_HOUR: usize = 3;
// manual reset at (730, 23, 2) lands on row 52631
const PROFILE_ROWS: usize = 52_640;
const EPISODE_LIMIT: usize = 4;
const LOG_NAME: &str = "var_voltage_control-bus33bw_gu-easy-distributed-maddpg-l1-";

fn setup_workspace() -> TempDir {
    let root = TempDir::new().unwrap();
    let args_dir = root.path().join("args");
    std::fs::create_dir_all(args_dir.join("env_args")).unwrap();
    std::fs::create_dir_all(args_dir.join("alg_args")).unwrap();

    let data_root = root.path().join("data").display().to_string().replace('\\', "/");
    std::fs::write(
        args_dir.join("env_args/var_voltage_control.yaml"),
        format!(
            r#"
env_args:
  data_path: "{}/case33_3min_final"
  episode_limit: {}
  intervals_per_hour: {}
  v_upper: 1.05
  v_lower: 0.95
  voltage_weight: 1.0
  q_weight: 0.1
  seed: 3
"#,
            data_root, EPISODE_LIMIT, INTERVALS_PER_HOUR
        ),
    )
    .unwrap();
    std::fs::write(
        args_dir.join("default.yaml"),
        "hid_size: 8\nagent_type: mlp\nmax_steps: 240\nshared_params: true\ntarget: true\n",
    )
    .unwrap();
    std::fs::write(
        args_dir.join("alg_args/maddpg.yaml"),
        "alg_args:\n  hid_activation: tanh\n  gamma: 0.99\n",
    )
    .unwrap();

    write_scenario(&root.path().join("data/bus33bw_gu"));
    root
}

fn write_scenario(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("grid.yaml"),
        r#"
bus_count: 4
lines:
  - { from: 0, to: 1, r: 0.01, x: 0.02 }
  - { from: 1, to: 2, r: 0.02, x: 0.02 }
  - { from: 1, to: 3, r: 0.01, x: 0.01 }
pv_buses: [2, 3]
pv_capacity: [0.5, 0.5]
zones:
  - [1, 2]
  - [3]
"#,
    )
    .unwrap();

    let mut load_p = String::from("b1,b2,b3\n");
    let mut load_q = String::from("b1,b2,b3\n");
    let mut pv = String::from("pv1,pv2\n");
    for i in 0..PROFILE_ROWS {
        let f = (i % 11) as f64 / 20.0;
        load_p.push_str(&format!("0.1,{:.3},0.05\n", 0.2 + f));
        load_q.push_str("0.02,0.04,0.01\n");
        pv.push_str(&format!("{:.3},0.1\n", f));
    }
    std::fs::write(dir.join("load_active.csv"), load_p).unwrap();
    std::fs::write(dir.join("load_reactive.csv"), load_q).unwrap();
    std::fs::write(dir.join("pv_active.csv"), pv).unwrap();
}

fn eval_args(root: &Path, extra: &[&str]) -> EvalArgs {
    let args_dir = root.join("args").display().to_string();
    let save_path = root.join("models").display().to_string();
    let record_dir = root.join("records").display().to_string();
    let mut argv = vec![
        "grid-marl-eval",
        "--scenario",
        "bus33bw_gu",
        "--args-dir",
        args_dir.as_str(),
        "--save-path",
        save_path.as_str(),
        "--record-dir",
        record_dir.as_str(),
    ];
    argv.extend_from_slice(extra);
    EvalArgs::parse_from(argv)
}

fn full(shape: &[usize], value: f32) -> Tensor {
    Tensor::full(value, shape, &Device::Cpu).unwrap()
}

/// Shared MLP actor with constant weights, standing in for a checkpoint.
fn in_memory_actor(args: &AlgArgs, checkpoint: &str) -> grid_marl_eval::Result<Box<dyn Policy>> {
    assert!(checkpoint.ends_with(&format!("/{}/model.pt", LOG_NAME)));
    assert_eq!(args.agent_num, 2);
    assert_eq!(args.action_scale, 0.7);

    let (obs, hid) = (args.obs_size, args.hid_size);
    let mut state = StateDict::new();
    state.insert("policy_dicts.0.fc1.weight".into(), full(&[hid, obs], 0.05));
    state.insert("policy_dicts.0.fc1.bias".into(), full(&[hid], 0.0));
    state.insert("policy_dicts.0.fc2.weight".into(), full(&[hid, hid], 0.05));
    state.insert("policy_dicts.0.fc2.bias".into(), full(&[hid], 0.0));
    state.insert("policy_dicts.0.fc3.weight".into(), full(&[1, hid], -0.2));
    state.insert("policy_dicts.0.fc3.bias".into(), full(&[1], 0.0));
    Ok(Box::new(ActorNet::from_state_dict(args, &state)?))
}

fn registry_with(strategy: &str) -> Registry {
    let mut registry = Registry::empty();
    registry.register("maddpg", in_memory_actor, strategy);
    registry
}

fn read_record(root: &Path, test_mode: &str) -> BTreeMap<String, Value> {
    let path = root
        .join("records")
        .join(format!("test_record_{}_{}.pickle", LOG_NAME, test_mode));
    let bytes = std::fs::read(path).unwrap();
    // value_from_slice keeps pickle tuples as Value::Tuple
    match serde_pickle::value_from_slice(&bytes, DeOptions::new()).unwrap() {
        Value::Dict(dict) => dict
            .into_iter()
            .map(|(key, value)| match key {
                HashableValue::String(key) => (key, value),
                other => panic!("unexpected key {:?}", other),
            })
            .collect(),
        other => panic!("record is not a dict: {:?}", other),
    }
}

#[tokio::test]
async fn test_single_episode_writes_trajectory_record() {
    let root = setup_workspace();
    let args = eval_args(root.path(), &[]);
    let storage = LocalStorage::new(args.record_dir.clone());
    let engine = EvalEngine::new(storage).with_registry(registry_with("pg"));

    let output = engine.run(&args).await.unwrap();
    assert!(output.ends_with(&format!("test_record_{}_single.pickle", LOG_NAME)));

    let record = read_record(root.path(), "single");
    for key in [
        "pv_active",
        "pv_reactive",
        "bus_active",
        "bus_reactive",
        "bus_voltage",
        "line_loss",
    ] {
        assert!(record.contains_key(key), "missing {}", key);
    }
    match &record["bus_voltage"] {
        Value::List(steps) => {
            // 初始狀態加上每一步
            assert_eq!(steps.len(), EPISODE_LIMIT + 1);
            match &steps[0] {
                Value::List(buses) => assert_eq!(buses.len(), 4),
                other => panic!("unexpected voltage row {:?}", other),
            }
        }
        other => panic!("unexpected bus_voltage {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_mode_writes_summary() {
    let root = setup_workspace();
    let args = eval_args(root.path(), &["--test-mode", "batch", "--monitor"]);
    let storage = LocalStorage::new(args.record_dir.clone());
    let engine = EvalEngine::new_with_monitoring(storage, args.monitor)
        .with_registry(registry_with("pg"));

    engine.run(&args).await.unwrap();

    let record = read_record(root.path(), "batch");
    assert!(record.keys().all(|k| k.starts_with("mean_test_")));
    match &record["mean_test_percentage_of_v_out_of_control"] {
        Value::Tuple(stats) => assert_eq!(stats.len(), 2),
        other => panic!("unexpected summary entry {:?}", other),
    }
}

#[tokio::test]
async fn test_q_strategy_is_not_implemented() {
    let root = setup_workspace();
    let args = eval_args(root.path(), &[]);
    let engine = EvalEngine::new(LocalStorage::new(args.record_dir.clone()))
        .with_registry(registry_with("q"));

    let err = engine.run(&args).await.unwrap_err();
    assert!(matches!(err, EvalError::NotImplemented { .. }));
    assert!(!root.path().join("records").exists());
}

#[tokio::test]
async fn test_unknown_strategy_is_rejected() {
    let root = setup_workspace();
    let args = eval_args(root.path(), &[]);
    let engine = EvalEngine::new(LocalStorage::new(args.record_dir.clone()))
        .with_registry(registry_with("sac"));

    let err = engine.run(&args).await.unwrap_err();
    assert!(matches!(err, EvalError::UnsupportedStrategy { .. }));
}

#[tokio::test]
async fn test_missing_checkpoint_with_default_registry() {
    let root = setup_workspace();
    let args = eval_args(root.path(), &[]);
    let engine = EvalEngine::new(LocalStorage::new(args.record_dir.clone()));

    match engine.run(&args).await.unwrap_err() {
        EvalError::CheckpointError { path, .. } => {
            assert!(path.ends_with(&format!("models/{}/model.pt", LOG_NAME)));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_preview_resolves_sizes_without_checkpoint() {
    let root = setup_workspace();
    let args = eval_args(root.path(), &["--difficulty", "super_hard", "--mode", "decentralised"]);
    let engine = EvalEngine::new(LocalStorage::new(args.record_dir.clone()));

    let (plan, alg_args) = engine.preview(&args).unwrap();
    assert_eq!(
        plan.log_name,
        "var_voltage_control-bus33bw_gu-super_hard-decentralised-maddpg-l1-"
    );
    assert!(plan.env_args.data_path.ends_with("data/bus33bw_gu"));
    assert_eq!(plan.env_args.pv_scale, 1.0);
    assert_eq!(alg_args.action_scale, 0.5);
    assert_eq!(alg_args.hid_activation, "tanh");
    assert_eq!(alg_args.hid_size, 8);
    assert_eq!((alg_args.agent_num, alg_args.obs_size, alg_args.action_dim), (2, 5, 1));
    assert!(!alg_args.cuda);
    assert_eq!(alg_args.extra.get("gamma"), Some(&serde_json::Value::from(0.99)));
}
