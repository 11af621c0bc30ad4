use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::error::{Result, SimError};
use crate::network::{Match, Network, Outcome};
use crate::params::Params;
use crate::perturb::ErrorModel;

pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub outcomes: Vec<Outcome>,
    pub probabilities: Vec<f64>,
}

impl Forecast {
    pub fn new(outcomes: Vec<Outcome>, probabilities: Vec<f64>) -> Result<Self> {
        if outcomes.is_empty() || outcomes.len() != probabilities.len() {
            return Err(SimError::config(format!(
                "forecast needs one probability per outcome ({} outcomes, {} probabilities)",
                outcomes.len(),
                probabilities.len()
            )));
        }
        let sum: f64 = probabilities.iter().sum();
        if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0)
            || (sum - 1.0).abs() > PROBABILITY_TOLERANCE
        {
            return Err(SimError::numerical(format!(
                "invalid probability vector {probabilities:?} (sum {sum})"
            )));
        }
        Ok(Self {
            outcomes,
            probabilities,
        })
    }

    pub fn uniform(outcomes: Vec<Outcome>) -> Self {
        let p = 1.0 / outcomes.len().max(1) as f64;
        let probabilities = vec![p; outcomes.len()];
        Self {
            outcomes,
            probabilities,
        }
    }

    pub fn probability(&self, outcome: Outcome) -> Option<f64> {
        self.outcomes
            .iter()
            .position(|o| *o == outcome)
            .map(|i| self.probabilities[i])
    }

    pub fn observed(&self, winner: Outcome) -> Vec<f64> {
        self.outcomes
            .iter()
            .map(|o| if *o == winner { 1.0 } else { 0.0 })
            .collect()
    }
}

pub fn parse_outcomes(params: &Params) -> Result<Vec<Outcome>> {
    let raw = params.str_or("outcomes", "home,draw,away")?;
    let outcomes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Outcome::from_label(s).ok_or_else(|| SimError::config(format!("unknown outcome `{s}`"))))
        .collect::<Result<Vec<_>>>()?;
    let mut unique = outcomes.clone();
    unique.sort_by_key(|o| o.label());
    unique.dedup();
    if outcomes.len() < 2 || unique.len() != outcomes.len() {
        return Err(SimError::config(format!(
            "outcomes must list at least two distinct labels, got `{raw}`"
        )));
    }
    Ok(outcomes)
}

/// Ordinal (proportional-odds) logistic link over outcomes ranked home to
/// away: `F(k) = 1 / (1 + exp(coefficients[k-1] - beta * diff))`.
pub fn ordinal_logistic(coefficients: &[f64], beta: f64, diff: f64) -> Vec<f64> {
    let r = coefficients.len() + 1;
    let mut cumulative = Vec::with_capacity(r + 1);
    cumulative.push(0.0);
    for c in coefficients {
        cumulative.push(1.0 / (1.0 + (-(-c + beta * diff)).exp()));
    }
    cumulative.push(1.0);
    cumulative
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForecastModel {
    Static { probabilities: Vec<f64> },
    Logistic {
        rating: String,
        coefficients: Vec<f64>,
        beta: f64,
        rating_noise: Option<Distribution>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecaster {
    pub outcomes: Vec<Outcome>,
    pub model: ForecastModel,
    pub error: ErrorModel,
}

impl Forecaster {
    pub const KINDS: &'static [&'static str] = &["uniform", "static", "logistic"];

    pub fn from_name(kind: &str, params: &Params) -> Result<Self> {
        let outcomes = parse_outcomes(params)?;
        let error = ErrorModel::from_param(params, "error")?;
        let model = match kind.trim().to_ascii_lowercase().as_str() {
            "uniform" | "simple" => {
                params.expect_only("uniform forecast", &["outcomes", "error"])?;
                ForecastModel::Static {
                    probabilities: Forecast::uniform(outcomes.clone()).probabilities,
                }
            }
            "static" | "fixed" => {
                params.expect_only("static forecast", &["outcomes", "probabilities", "error"])?;
                let probabilities = params.f64_list("probabilities")?.ok_or_else(|| {
                    SimError::config("static forecast needs `probabilities`")
                })?;
                // Validates length, sign and sum.
                Forecast::new(outcomes.clone(), probabilities.clone())
                    .map_err(|e| SimError::config(e.to_string()))?;
                ForecastModel::Static { probabilities }
            }
            "logistic" | "logistic_function" => {
                params.expect_only(
                    "logistic forecast",
                    &["outcomes", "rating", "coefficients", "beta", "rating_noise", "error"],
                )?;
                let coefficients = match params.f64_list("coefficients")? {
                    Some(c) => c,
                    None => default_coefficients(outcomes.len())?,
                };
                if coefficients.len() + 1 != outcomes.len() {
                    return Err(SimError::config(format!(
                        "logistic forecast over {} outcomes needs {} coefficients, got {}",
                        outcomes.len(),
                        outcomes.len() - 1,
                        coefficients.len()
                    )));
                }
                if coefficients.windows(2).any(|w| w[1] > w[0]) {
                    return Err(SimError::config(format!(
                        "logistic coefficients must be non-increasing, got {coefficients:?}"
                    )));
                }
                let rating_noise = if params.contains("rating_noise") {
                    Some(Distribution::from_param(
                        params,
                        "rating_noise",
                        Distribution::Constant(0.0),
                    )?)
                } else {
                    None
                };
                ForecastModel::Logistic {
                    rating: params.str_or("rating", "true")?,
                    coefficients,
                    beta: params.f64_or("beta", 0.005)?,
                    rating_noise,
                }
            }
            other => {
                return Err(SimError::config(format!(
                    "unknown forecast kind `{other}` (expected one of {})",
                    Self::KINDS.join(", ")
                )));
            }
        };
        Ok(Self {
            outcomes,
            model,
            error,
        })
    }

    pub fn logistic(rating: &str, coefficients: Vec<f64>, beta: f64) -> Self {
        Self {
            outcomes: Outcome::ALL.to_vec(),
            model: ForecastModel::Logistic {
                rating: rating.to_string(),
                coefficients,
                beta,
                rating_noise: None,
            },
            error: ErrorModel::None,
        }
    }

    pub fn rating(&self) -> Option<&str> {
        match &self.model {
            ForecastModel::Logistic { rating, .. } => Some(rating),
            ForecastModel::Static { .. } => None,
        }
    }

    pub fn forecast<R: Rng + ?Sized>(&self, network: &Network, m: &Match, rng: &mut R) -> Result<Forecast> {
        let base = match &self.model {
            ForecastModel::Static { probabilities } => probabilities.clone(),
            ForecastModel::Logistic {
                rating,
                coefficients,
                beta,
                rating_noise,
            } => {
                let mut home = network.rating_before(m.home, rating, m.season, m.round)?;
                let mut away = network.rating_before(m.away, rating, m.season, m.round)?;
                if let Some(noise) = rating_noise {
                    home += noise.sample(rng);
                    away += noise.sample(rng);
                }
                let ranked = ordinal_logistic(coefficients, *beta, home - away);
                if ranked.len() != self.outcomes.len() {
                    return Err(SimError::config(format!(
                        "{} coefficients cannot rank {} outcomes",
                        coefficients.len(),
                        self.outcomes.len()
                    )));
                }
                ordinal_positions(&self.outcomes)
                    .into_iter()
                    .map(|pos| ranked[pos])
                    .collect()
            }
        };
        let probabilities = self.error.apply(&base, rng)?;
        Forecast::new(self.outcomes.clone(), probabilities)
    }
}

fn ordinal_positions(outcomes: &[Outcome]) -> Vec<usize> {
    let scale = |o: &Outcome| Outcome::ALL.iter().position(|x| x == o).unwrap_or_default();
    outcomes
        .iter()
        .map(|o| outcomes.iter().filter(|other| scale(other) < scale(o)).count())
        .collect()
}

fn default_coefficients(outcomes: usize) -> Result<Vec<f64>> {
    match outcomes {
        2 => Ok(vec![0.0]),
        3 => Ok(vec![0.3, -0.9]),
        n => Err(SimError::config(format!(
            "no default coefficients for {n} outcomes; pass `coefficients`"
        ))),
    }
}

pub fn add_forecast<R: Rng + ?Sized>(
    network: &mut Network,
    name: &str,
    forecaster: &Forecaster,
    rng: &mut R,
) -> Result<usize> {
    add_season_forecast(network, name, forecaster, None, rng)
}

pub fn add_season_forecast<R: Rng + ?Sized>(
    network: &mut Network,
    name: &str,
    forecaster: &Forecaster,
    season: Option<u32>,
    rng: &mut R,
) -> Result<usize> {
    if let Some(rating) = forecaster.rating()
        && !network.has_rating(rating)
    {
        return Err(SimError::lookup(format!(
            "forecast {name} reads rating {rating}, which network {} does not have",
            network.name
        )));
    }

    let mut computed = Vec::new();
    for id in network.chronological() {
        let m = &network.matches()[id];
        if !m.is_active() || season.is_some_and(|s| s != m.season) {
            continue;
        }
        computed.push((id, forecaster.forecast(network, m, rng)?));
    }
    let count = computed.len();
    for (id, forecast) in computed {
        if let Some(m) = network.match_mut(id) {
            m.forecasts.insert(name.to_string(), forecast);
        }
    }
    log::info!("forecast {name}: {count} matches on network {}", network.name);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::TeamId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn logistic_probabilities_are_valid_and_monotone() {
        let coefficients = [0.3, -0.9];
        let mut last_home = 0.0;
        for diff in [-400.0, -100.0, 0.0, 100.0, 400.0] {
            let p = ordinal_logistic(&coefficients, 0.005, diff);
            assert_eq!(p.len(), 3);
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            assert!(p.iter().all(|v| *v >= 0.0));
            assert!(p[0] > last_home, "home probability should grow with diff");
            last_home = p[0];
        }
    }

    #[test]
    fn logistic_at_zero_diff_follows_coefficients() {
        let p = ordinal_logistic(&[0.0], 1.0, 0.0);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn increasing_coefficients_are_rejected() {
        let p = Params::from_pairs(&["coefficients=[-0.5,0.5]"]).unwrap();
        assert!(Forecaster::from_name("logistic", &p).is_err());
    }

    #[test]
    fn static_forecast_validates_sum() {
        let bad = Params::from_pairs(&["probabilities=[0.5,0.5,0.5]"]).unwrap();
        assert!(Forecaster::from_name("static", &bad).is_err());
        let ok = Params::from_pairs(&["probabilities=[0.5,0.3,0.2]"]).unwrap();
        assert!(Forecaster::from_name("static", &ok).is_ok());
    }

    #[test]
    fn forecast_reads_rating_before_the_round() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = Network::new("f", "test");
        net.add_team(TeamId(0), "A");
        net.add_team(TeamId(1), "B");
        net.add_match(TeamId(0), TeamId(1), 0, 0, 0).unwrap();
        net.set_series(TeamId(0), "true", 0, vec![1100.0, 900.0, 900.0]);
        net.set_series(TeamId(1), "true", 0, vec![1000.0, 1200.0, 1200.0]);

        let f = Forecaster::logistic("true", vec![0.3, -0.9], 0.005);
        let m = net.matches()[0].clone();
        let out = f.forecast(&net, &m, &mut rng).unwrap();
        let expected = ordinal_logistic(&[0.3, -0.9], 0.005, 100.0);
        for (a, b) in out.probabilities.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    fn strong_home_side() -> Network {
        let mut net = Network::new("f", "test");
        net.add_team(TeamId(0), "A");
        net.add_team(TeamId(1), "B");
        net.add_match(TeamId(0), TeamId(1), 0, 0, 0).unwrap();
        net.set_series(TeamId(0), "true", 0, vec![1400.0, 1400.0, 1400.0]);
        net.set_series(TeamId(1), "true", 0, vec![800.0, 800.0, 800.0]);
        net
    }

    #[test]
    fn reversed_outcome_order_keeps_labels() {
        let mut rng = StdRng::seed_from_u64(7);
        let net = strong_home_side();
        let m = net.matches()[0].clone();
        let forward = Forecaster::logistic("true", vec![0.3, -0.9], 0.005);
        let mut reversed = forward.clone();
        reversed.outcomes = vec![Outcome::Away, Outcome::Draw, Outcome::Home];

        let a = forward.forecast(&net, &m, &mut rng).unwrap();
        let b = reversed.forecast(&net, &m, &mut rng).unwrap();
        assert!(b.probability(Outcome::Home).unwrap() > 0.8);
        assert!(b.probabilities[2] > b.probabilities[0]);
        for outcome in Outcome::ALL {
            assert!((a.probability(outcome).unwrap() - b.probability(outcome).unwrap()).abs() < 1e-12);
        }
    }

    #[test]
    fn two_outcome_order_does_not_swap_sides() {
        let mut rng = StdRng::seed_from_u64(8);
        let net = strong_home_side();
        let m = net.matches()[0].clone();
        let mut home_first = Forecaster::logistic("true", vec![0.0], 0.005);
        home_first.outcomes = vec![Outcome::Home, Outcome::Away];
        let mut away_first = home_first.clone();
        away_first.outcomes = vec![Outcome::Away, Outcome::Home];

        let a = home_first.forecast(&net, &m, &mut rng).unwrap();
        let b = away_first.forecast(&net, &m, &mut rng).unwrap();
        assert!(a.probability(Outcome::Home).unwrap() > 0.9);
        assert!((a.probability(Outcome::Home).unwrap() - b.probability(Outcome::Home).unwrap()).abs() < 1e-12);
        assert!((b.probability(Outcome::Away).unwrap() - a.probability(Outcome::Away).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn missing_rating_is_lookup_error() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut net = crate::schedule::generate("f", 4, None, 1, 0).unwrap();
        let f = Forecaster::logistic("elo", vec![0.3, -0.9], 0.005);
        let err = add_forecast(&mut net, "elo_fc", &f, &mut rng).unwrap_err();
        assert!(matches!(err, SimError::Lookup(_)));
    }

    #[test]
    fn two_outcome_forecast() {
        let p = Params::from_pairs(&["outcomes=home,away"]).unwrap();
        let f = Forecaster::from_name("uniform", &p).unwrap();
        assert_eq!(f.outcomes, vec![Outcome::Home, Outcome::Away]);
    }
}
