use rand::Rng;

use crate::distribution::Distribution;
use crate::error::{Result, SimError};
use crate::params::Params;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ErrorModel {
    #[default]
    None,
    Factor { lower: f64, upper: f64 },
    Logit { noise: Distribution },
}

impl ErrorModel {
    pub fn from_name(kind: &str, params: &Params) -> Result<Self> {
        let model = match kind.trim().to_ascii_lowercase().as_str() {
            "none" | "null" => ErrorModel::None,
            "factor" | "bounded" => {
                params.expect_only("factor error", &["kind", "lower", "upper", "bound"])?;
                let bound = params.f64_or("bound", 0.1)?;
                ErrorModel::Factor {
                    lower: params.f64_or("lower", bound)?,
                    upper: params.f64_or("upper", bound)?,
                }
            }
            "logit" | "distribution" => {
                params.expect_only("logit error", &["kind", "noise"])?;
                ErrorModel::Logit {
                    noise: Distribution::from_param(
                        params,
                        "noise",
                        Distribution::Normal { mean: 0.0, sd: 0.1 },
                    )?,
                }
            }
            other => return Err(SimError::config(format!("unknown error model `{other}`"))),
        };
        if let ErrorModel::Factor { lower, upper } = model
            && !((0.0..=1.0).contains(&lower) && upper >= 0.0)
        {
            return Err(SimError::config(format!(
                "factor error needs 0 <= lower <= 1 and upper >= 0 (lower={lower}, upper={upper})"
            )));
        }
        Ok(model)
    }

    pub fn from_param(params: &Params, key: &str) -> Result<Self> {
        if let Ok(Some(kind)) = params.opt_str(key) {
            return ErrorModel::from_name(&kind, &Params::new());
        }
        match params.nested(key)? {
            None => Ok(ErrorModel::None),
            Some(inner) => {
                let kind = inner.str_or("kind", "none")?;
                ErrorModel::from_name(&kind, &inner)
            }
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, probabilities: &[f64], rng: &mut R) -> Result<Vec<f64>> {
        let raw: Vec<f64> = match *self {
            ErrorModel::None => probabilities.to_vec(),
            ErrorModel::Factor { lower, upper } => probabilities
                .iter()
                .map(|p| {
                    let factor = if upper + lower > 0.0 {
                        rng.gen_range((1.0 - lower)..=(1.0 + upper))
                    } else {
                        1.0
                    };
                    p * factor
                })
                .collect(),
            ErrorModel::Logit { noise } => probabilities
                .iter()
                .map(|&p| {
                    if p <= 0.0 || p >= 1.0 {
                        return p.clamp(0.0, 1.0);
                    }
                    let logit = (p / (1.0 - p)).ln() + noise.sample(rng);
                    1.0 / (1.0 + (-logit).exp())
                })
                .collect(),
        };
        renormalize(&raw)
    }
}

/// Scales a non-negative vector to sum to one. A zero, negative or
/// non-finite total is rejected rather than turned into NaNs.
pub fn renormalize(values: &[f64]) -> Result<Vec<f64>> {
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(SimError::numerical(format!(
            "probability vector has negative or non-finite entries: {values:?}"
        )));
    }
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 {
        return Err(SimError::numerical(format!(
            "probability vector sums to {sum}, cannot renormalize"
        )));
    }
    Ok(values.iter().map(|v| v / sum).collect())
}
