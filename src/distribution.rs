use rand::Rng;
use serde_json::Value;

use crate::error::{Result, SimError};
use crate::params::Params;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    Constant(f64),
    Normal { mean: f64, sd: f64 },
    Uniform { low: f64, high: f64 },
}

impl Distribution {
    pub fn normal(mean: f64, sd: f64) -> Result<Self> {
        if !sd.is_finite() || sd < 0.0 || !mean.is_finite() {
            return Err(SimError::config(format!(
                "normal distribution needs finite mean and sd >= 0 (mean={mean}, sd={sd})"
            )));
        }
        Ok(Distribution::Normal { mean, sd })
    }

    pub fn uniform(low: f64, high: f64) -> Result<Self> {
        if !(low.is_finite() && high.is_finite()) || low > high {
            return Err(SimError::config(format!(
                "uniform distribution needs low <= high (low={low}, high={high})"
            )));
        }
        Ok(Distribution::Uniform { low, high })
    }

    pub fn from_name(kind: &str, params: &Params) -> Result<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "constant" | "fixed" => {
                params.expect_only("constant distribution", &["kind", "value"])?;
                Ok(Distribution::Constant(params.f64_or("value", 0.0)?))
            }
            "normal" | "gaussian" => {
                params.expect_only("normal distribution", &["kind", "mean", "sd"])?;
                Distribution::normal(params.f64_or("mean", 0.0)?, params.f64_or("sd", 1.0)?)
            }
            "uniform" => {
                params.expect_only("uniform distribution", &["kind", "low", "high"])?;
                Distribution::uniform(params.f64_or("low", 0.0)?, params.f64_or("high", 1.0)?)
            }
            other => Err(SimError::config(format!("unknown distribution `{other}`"))),
        }
    }

    pub fn from_param(params: &Params, key: &str, default: Distribution) -> Result<Self> {
        match params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => Ok(Distribution::Constant(n.as_f64().unwrap_or_default())),
            Some(Value::Object(_)) => {
                let inner = params.nested(key)?.unwrap_or_default();
                let kind = inner.str_or("kind", "normal")?;
                Distribution::from_name(&kind, &inner)
            }
            Some(Value::String(s)) => Distribution::from_name(s, &Params::new()),
            Some(other) => Err(SimError::config(format!(
                "parameter `{key}` must be a number or a distribution object, got {other}"
            ))),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Distribution::Constant(v) => v,
            Distribution::Normal { mean, sd } => mean + sd * standard_normal(rng),
            Distribution::Uniform { low, high } => {
                if high > low {
                    rng.gen_range(low..high)
                } else {
                    low
                }
            }
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Constant(v) => v,
            Distribution::Normal { mean, .. } => mean,
            Distribution::Uniform { low, high } => (low + high) / 2.0,
        }
    }
}

pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Consumes exactly two uniforms per call: radius first, then angle. The
    // sine half of the pair is dropped. gen() is in [0, 1); flip it so ln()
    // never sees zero.
    let u1 = 1.0 - rng.r#gen::<f64>();
    let u2 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn normal_sample_mean_is_close() {
        let mut rng = StdRng::seed_from_u64(7);
        let d = Distribution::normal(5.0, 2.0).unwrap();
        let n = 20_000;
        let mean = (0..n).map(|_| d.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 5.0).abs() < 0.1, "mean {mean}");
    }

    #[test]
    fn unknown_kind_fails_fast() {
        let err = Distribution::from_name("cauchy", &Params::new()).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn param_forms() {
        let p = Params::from_pairs(&[
            "a=3",
            r#"b={"kind":"uniform","low":-1,"high":1}"#,
        ])
        .unwrap();
        let fallback = Distribution::Constant(0.0);
        assert_eq!(
            Distribution::from_param(&p, "a", fallback).unwrap(),
            Distribution::Constant(3.0)
        );
        assert_eq!(
            Distribution::from_param(&p, "b", fallback).unwrap(),
            Distribution::Uniform { low: -1.0, high: 1.0 }
        );
        assert_eq!(Distribution::from_param(&p, "c", fallback).unwrap(), fallback);
    }

    #[test]
    fn negative_sd_is_rejected() {
        assert!(Distribution::normal(0.0, -1.0).is_err());
    }
}
