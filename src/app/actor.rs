//! Actor networks restored from a training checkpoint.
//!
//! Parameters live under `policy_dicts.<i>.` in the checkpoint's
//! `model_state_dict`; `i` is always 0 when agents share parameters.

use crate::config::yaml_config::AlgArgs;
use crate::domain::model::PolicyOutput;
use crate::domain::ports::Policy;
use crate::utils::error::{EvalError, Result};
use candle_core::pickle::PthTensors;
use candle_core::{DType, Device, Tensor};
use candle_nn::{LayerNorm, Linear, Module};
use std::collections::HashMap;
use std::path::Path;

pub const STATE_DICT_KEY: &str = "model_state_dict";
pub const POLICY_PREFIX: &str = "policy_dicts";
const LAYERNORM_EPS: f64 = 1e-5;

pub type StateDict = HashMap<String, Tensor>;

/// Reads the policy parameters of a PyTorch checkpoint onto the CPU.
pub fn read_checkpoint(path: &str) -> Result<StateDict> {
    if !Path::new(path).is_file() {
        return Err(EvalError::checkpoint(path, "file not found"));
    }

    let pth = PthTensors::new(path, Some(STATE_DICT_KEY)).map_err(|e| {
        EvalError::checkpoint(path, format!("cannot read '{}': {}", STATE_DICT_KEY, e))
    })?;

    let mut state = StateDict::new();
    for name in pth.tensor_infos().keys() {
        if !name.starts_with(POLICY_PREFIX) {
            continue;
        }
        if let Some(tensor) = pth.get(name)? {
            state.insert(name.clone(), tensor);
        }
    }

    if state.is_empty() {
        return Err(EvalError::checkpoint(
            path,
            format!("no '{}' parameters in '{}'", POLICY_PREFIX, STATE_DICT_KEY),
        ));
    }
    tracing::debug!("Read {} policy tensors from {}", state.len(), path);
    Ok(state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Relu,
    Tanh,
}

impl Activation {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        Ok(match self {
            Activation::Relu => x.relu()?,
            Activation::Tanh => x.tanh()?,
        })
    }
}

#[derive(Debug)]
struct GruCell {
    weight_ih: Tensor,
    weight_hh: Tensor,
    bias_ih: Tensor,
    bias_hh: Tensor,
}

impl GruCell {
    fn forward(&self, x: &Tensor, h: &Tensor) -> Result<Tensor> {
        let gi = x.matmul(&self.weight_ih.t()?)?.broadcast_add(&self.bias_ih)?;
        let gh = h.matmul(&self.weight_hh.t()?)?.broadcast_add(&self.bias_hh)?;
        let gi = gi.chunk(3, 1)?;
        let gh = gh.chunk(3, 1)?;

        let r = candle_nn::ops::sigmoid(&gi[0].add(&gh[0])?)?;
        let z = candle_nn::ops::sigmoid(&gi[1].add(&gh[1])?)?;
        let n = gi[2].add(&r.mul(&gh[2])?)?.tanh()?;
        // h' = (1 - z) * n + z * h
        Ok(n.add(&z.mul(&h.sub(&n)?)?)?)
    }
}

#[derive(Debug)]
enum Body {
    Mlp { fc2: Linear, fc3: Linear },
    Rnn { rnn: GruCell, fc2: Linear },
}

#[derive(Debug)]
struct AgentNet {
    fc1: Linear,
    layernorm: Option<LayerNorm>,
    body: Body,
}

/// Deterministic actor used at evaluation time: the mean action of the
/// trained policy, one network per agent or one shared network.
#[derive(Debug)]
pub struct ActorNet {
    agents: Vec<AgentNet>,
    activation: Activation,
    agent_id: bool,
    n_agents: usize,
    obs_size: usize,
    hid_size: usize,
    recurrent: bool,
    device: Device,
}

struct ParamReader<'a> {
    state: &'a StateDict,
    prefix: String,
}

impl ParamReader<'_> {
    fn tensor(&self, name: &str, shape: &[usize]) -> Result<Tensor> {
        let key = format!("{}.{}", self.prefix, name);
        let tensor = self.state.get(&key).ok_or_else(|| {
            EvalError::checkpoint(STATE_DICT_KEY, format!("missing parameter '{}'", key))
        })?;
        if tensor.dims() != shape {
            return Err(EvalError::checkpoint(
                STATE_DICT_KEY,
                format!(
                    "parameter '{}' has shape {:?}, expected {:?}",
                    key,
                    tensor.dims(),
                    shape
                ),
            ));
        }
        Ok(tensor.to_dtype(DType::F32)?.to_device(&Device::Cpu)?)
    }

    fn linear(&self, name: &str, inputs: usize, outputs: usize) -> Result<Linear> {
        let weight = self.tensor(&format!("{}.weight", name), &[outputs, inputs])?;
        let bias = self.tensor(&format!("{}.bias", name), &[outputs])?;
        Ok(Linear::new(weight, Some(bias)))
    }
}

impl ActorNet {
    /// Builds the actor from the policy section of a checkpoint.
    pub fn load(args: &AlgArgs, checkpoint: &str) -> Result<Self> {
        let state = read_checkpoint(checkpoint)?;
        Self::from_state_dict(args, &state).map_err(|e| match e {
            EvalError::CheckpointError { message, .. } => {
                EvalError::checkpoint(checkpoint, message)
            }
            other => other,
        })
    }

    pub fn from_state_dict(args: &AlgArgs, state: &StateDict) -> Result<Self> {
        let activation = match args.hid_activation.as_str() {
            "tanh" => Activation::Tanh,
            _ => Activation::Relu,
        };
        let recurrent = args.agent_type == "rnn";
        let input_size = if args.agent_id {
            args.obs_size + args.agent_num
        } else {
            args.obs_size
        };
        let hid = args.hid_size;
        let copies = if args.shared_params { 1 } else { args.agent_num };

        let mut agents = Vec::with_capacity(copies);
        for i in 0..copies {
            let reader = ParamReader {
                state,
                prefix: format!("{}.{}", POLICY_PREFIX, i),
            };
            let fc1 = reader.linear("fc1", input_size, hid)?;
            let layernorm = if args.layernorm {
                Some(LayerNorm::new(
                    reader.tensor("layernorm.weight", &[hid])?,
                    reader.tensor("layernorm.bias", &[hid])?,
                    LAYERNORM_EPS,
                ))
            } else {
                None
            };
            let body = if recurrent {
                Body::Rnn {
                    rnn: GruCell {
                        weight_ih: reader.tensor("rnn.weight_ih", &[3 * hid, hid])?,
                        weight_hh: reader.tensor("rnn.weight_hh", &[3 * hid, hid])?,
                        bias_ih: reader.tensor("rnn.bias_ih", &[3 * hid])?,
                        bias_hh: reader.tensor("rnn.bias_hh", &[3 * hid])?,
                    },
                    fc2: reader.linear("fc2", hid, args.action_dim)?,
                }
            } else {
                Body::Mlp {
                    fc2: reader.linear("fc2", hid, hid)?,
                    fc3: reader.linear("fc3", hid, args.action_dim)?,
                }
            };
            agents.push(AgentNet {
                fc1,
                layernorm,
                body,
            });
        }

        tracing::info!(
            "🧠 Restored {} {} actor(s): input {}, hidden {}, actions {}",
            agents.len(),
            args.agent_type,
            input_size,
            hid,
            args.action_dim
        );

        Ok(Self {
            agents,
            activation,
            agent_id: args.agent_id,
            n_agents: args.agent_num,
            obs_size: args.obs_size,
            hid_size: hid,
            recurrent,
            device: Device::Cpu,
        })
    }

    fn agent_input(&self, agent: usize, obs: &[f32]) -> Result<Tensor> {
        let mut input = obs.to_vec();
        if self.agent_id {
            let mut one_hot = vec![0.0f32; self.n_agents];
            one_hot[agent] = 1.0;
            input.extend(one_hot);
        }
        let len = input.len();
        Ok(Tensor::from_vec(input, (1, len), &self.device)?)
    }

    fn forward(&self, agent: usize, obs: &[f32], hidden: &[f32]) -> Result<(Vec<f32>, Vec<f32>)> {
        let net = &self.agents[if self.agents.len() == 1 { 0 } else { agent }];
        let x = self.agent_input(agent, obs)?;

        let mut x = net.fc1.forward(&x)?;
        if let Some(norm) = &net.layernorm {
            x = norm.forward(&x)?;
        }
        let x = self.activation.apply(&x)?;

        match &net.body {
            Body::Mlp { fc2, fc3 } => {
                let h = self.activation.apply(&fc2.forward(&x)?)?;
                let a = fc3.forward(&h)?;
                Ok((first_row(&a)?, Vec::new()))
            }
            Body::Rnn { rnn, fc2 } => {
                let h_in = Tensor::from_vec(hidden.to_vec(), (1, self.hid_size), &self.device)?;
                let h = rnn.forward(&x, &h_in)?;
                let a = fc2.forward(&h)?;
                Ok((first_row(&a)?, first_row(&h)?))
            }
        }
    }
}

fn first_row(t: &Tensor) -> Result<Vec<f32>> {
    Ok(t.squeeze(0)?.to_vec1::<f32>()?)
}

impl Policy for ActorNet {
    fn init_hidden(&self) -> Vec<Vec<f32>> {
        let width = if self.recurrent { self.hid_size } else { 0 };
        vec![vec![0.0; width]; self.n_agents]
    }

    fn act(&self, obs: &[Vec<f32>], hidden: &[Vec<f32>]) -> Result<PolicyOutput> {
        if obs.len() != self.n_agents {
            return Err(EvalError::environment(format!(
                "policy expects {} agent observations, got {}",
                self.n_agents,
                obs.len()
            )));
        }

        let mut output = PolicyOutput::default();
        for (agent, agent_obs) in obs.iter().enumerate() {
            if agent_obs.len() != self.obs_size {
                return Err(EvalError::environment(format!(
                    "agent {} observation has {} values, expected {}",
                    agent,
                    agent_obs.len(),
                    self.obs_size
                )));
            }
            let agent_hidden = hidden.get(agent).map(Vec::as_slice).unwrap_or(&[]);
            let (actions, next_hidden) = self.forward(agent, agent_obs, agent_hidden)?;
            output.actions.push(actions);
            output.hidden.push(next_hidden);
        }
        Ok(output)
    }
}
