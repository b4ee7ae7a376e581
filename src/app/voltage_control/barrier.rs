use crate::utils::error::{EvalError, Result};
use std::str::FromStr;

/// Voltage barrier shaping the per-bus voltage penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardType {
    L1,
    Liu,
    L2,
    Bowl,
}

impl FromStr for RewardType {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l1" => Ok(RewardType::L1),
            "liu" => Ok(RewardType::Liu),
            "l2" => Ok(RewardType::L2),
            "bowl" => Ok(RewardType::Bowl),
            _ => Err(EvalError::InvalidConfigValueError {
                field: "reward_type".to_string(),
                value: s.to_string(),
                reason: "Please input the valid reward type: l1, liu, l2 or bowl.".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageBand {
    pub lower: f64,
    pub upper: f64,
}

impl VoltageBand {
    pub fn reference(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }
}

const BOWL_WIDTH: f64 = 0.05;
const BOWL_SCALE: f64 = 0.1;

impl RewardType {
    pub fn penalty(&self, v: f64, band: VoltageBand) -> f64 {
        let v_ref = band.reference();
        match self {
            RewardType::L1 => (v - v_ref).abs(),
            RewardType::L2 => 2.0 * (v - v_ref).powi(2),
            RewardType::Bowl => {
                if (v - v_ref).abs() > BOWL_WIDTH {
                    2.0 * (v - v_ref).abs() - 0.095
                } else {
                    -0.01 * normal_pdf(v, v_ref, BOWL_SCALE) + 0.04
                }
            }
            RewardType::Liu => (v - band.upper).max(0.0) + (band.lower - v).max(0.0),
        }
    }

    pub fn mean_penalty(&self, voltages: &[f64], band: VoltageBand) -> f64 {
        if voltages.is_empty() {
            return 0.0;
        }
        voltages.iter().map(|&v| self.penalty(v, band)).sum::<f64>() / voltages.len() as f64
    }
}

fn normal_pdf(x: f64, loc: f64, scale: f64) -> f64 {
    let var = scale * scale;
    (-0.5 * (x - loc).powi(2) / var).exp() / (2.0 * std::f64::consts::PI * var).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAND: VoltageBand = VoltageBand {
        lower: 0.95,
        upper: 1.05,
    };

    #[test]
    fn test_parse_reward_types() {
        assert_eq!("liu".parse::<RewardType>().unwrap(), RewardType::Liu);
        assert!("courant".parse::<RewardType>().is_err());
    }

    #[test]
    fn test_l1_and_l2() {
        assert!((RewardType::L1.penalty(1.03, BAND) - 0.03).abs() < 1e-12);
        assert!((RewardType::L2.penalty(0.9, BAND) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_liu_only_penalises_violations() {
        assert_eq!(RewardType::Liu.penalty(1.0, BAND), 0.0);
        assert_eq!(RewardType::Liu.penalty(1.049, BAND), 0.0);
        assert!((RewardType::Liu.penalty(1.07, BAND) - 0.02).abs() < 1e-12);
        assert!((RewardType::Liu.penalty(0.93, BAND) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_bowl_is_nearly_continuous_at_the_edge() {
        let inside = RewardType::Bowl.penalty(1.0 + BOWL_WIDTH - 1e-9, BAND);
        let outside = RewardType::Bowl.penalty(1.0 + BOWL_WIDTH + 1e-9, BAND);
        assert!((inside - outside).abs() < 1e-3);
        // 中心為最小值
        assert!(RewardType::Bowl.penalty(1.0, BAND) < inside);
    }

    #[test]
    fn test_mean_penalty() {
        let mean = RewardType::L1.mean_penalty(&[0.98, 1.02], BAND);
        assert!((mean - 0.02).abs() < 1e-12);
        assert_eq!(RewardType::L1.mean_penalty(&[], BAND), 0.0);
    }
}
