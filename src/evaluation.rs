use serde::Serialize;

use crate::betting::BettingStrategy;
use crate::error::{Result, SimError};
use crate::forecast::Forecast;
use crate::network::{Network, Outcome};

const MIN_PROBABILITY: f64 = 1e-12;

pub fn cumulative_sq_distance(model: &[f64], observed: &[f64]) -> f64 {
    let r = model.len().min(observed.len());
    let mut cum = 0.0;
    let mut total = 0.0;
    for i in 0..r.saturating_sub(1) {
        cum += model[i] - observed[i];
        total += cum * cum;
    }
    total
}

/// Ranked probability score, `cumulative_sq_distance / (r - 1)`. Lower is
/// better; 0 is a perfect forecast.
pub fn rps(model: &[f64], observed: &[f64]) -> f64 {
    let r = model.len().min(observed.len());
    if r < 2 {
        return 0.0;
    }
    cumulative_sq_distance(model, observed) / (r - 1) as f64
}

pub fn likelihood(model: &[f64], observed: &[f64]) -> f64 {
    model
        .iter()
        .zip(observed)
        .filter(|(_, o)| **o > 0.0)
        .map(|(p, _)| p.max(MIN_PROBABILITY).ln())
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutcomeReturn {
    pub outcome: Outcome,
    pub stake: f64,
    pub expected: f64,
    pub actual: f64,
}

pub fn profitability(
    outcomes: &[Outcome],
    stakes: &[f64],
    true_probabilities: &[f64],
    odds: &[f64],
    winner: Outcome,
) -> Vec<OutcomeReturn> {
    outcomes
        .iter()
        .zip(stakes)
        .zip(true_probabilities.iter().zip(odds))
        .filter(|((_, stake), _)| **stake != 0.0)
        .map(|((&outcome, &stake), (&p, &o))| {
            let hit = if outcome == winner { 1.0 } else { 0.0 };
            OutcomeReturn {
                outcome,
                stake,
                expected: stake * (p * o - 1.0),
                actual: stake * (hit * o - 1.0),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSummary {
    pub forecast: String,
    pub samples: usize,
    pub mean_rps: f64,
    pub mean_likelihood: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BettorSummary {
    pub bettor: String,
    pub bets: usize,
    pub total_stake: f64,
    pub expected_return: f64,
    pub actual_return: f64,
    pub roi: f64,
}

pub fn metric_key(metric: &str, name: &str) -> String {
    format!("{metric}#{name}")
}

pub fn evaluate_forecast(network: &mut Network, name: &str) -> Result<ForecastSummary> {
    let rps_key = metric_key("rps", name);
    let ll_key = metric_key("likelihood", name);
    let mut samples = 0usize;
    let mut rps_sum = 0.0;
    let mut ll_sum = 0.0;

    for id in network.chronological() {
        let Some(m) = network.match_mut(id) else {
            continue;
        };
        if !m.is_active() {
            continue;
        }
        let Some(forecast) = m.forecasts.get(name) else {
            continue;
        };
        let winner = m.require_winner()?;
        let (score, ll) = score_forecast(forecast, winner);
        m.metrics.insert(rps_key.clone(), score);
        m.metrics.insert(ll_key.clone(), ll);
        samples += 1;
        rps_sum += score;
        ll_sum += ll;
    }
    if samples == 0 {
        return Err(SimError::lookup(format!(
            "forecast {name} not found on network {}",
            network.name
        )));
    }
    let summary = ForecastSummary {
        forecast: name.to_string(),
        samples,
        mean_rps: rps_sum / samples as f64,
        mean_likelihood: ll_sum / samples as f64,
    };
    log::info!(
        "forecast {name}: rps {:.4}, likelihood {:.4} over {samples} matches",
        summary.mean_rps,
        summary.mean_likelihood
    );
    Ok(summary)
}

fn score_forecast(forecast: &Forecast, winner: Outcome) -> (f64, f64) {
    let observed = forecast.observed(winner);
    (
        rps(&forecast.probabilities, &observed),
        likelihood(&forecast.probabilities, &observed),
    )
}

pub fn evaluate_bettor(
    network: &mut Network,
    strategy: &BettingStrategy,
    true_forecast: &str,
) -> Result<BettorSummary> {
    let expected_key = metric_key("expected_return", &strategy.name);
    let actual_key = metric_key("actual_return", &strategy.name);
    let mut summary = BettorSummary {
        bettor: strategy.name.clone(),
        bets: 0,
        total_stake: 0.0,
        expected_return: 0.0,
        actual_return: 0.0,
        roi: 0.0,
    };
    let mut seen = false;

    for id in network.chronological() {
        let Some(m) = network.match_mut(id) else {
            continue;
        };
        if !m.is_active() {
            continue;
        }
        let Some(stakes) = m.bets.get(&strategy.name) else {
            continue;
        };
        seen = true;
        if stakes.iter().all(|s| *s == 0.0) {
            continue;
        }
        let truth = m.forecasts.get(true_forecast).ok_or_else(|| {
            SimError::missing(format!("forecast {true_forecast}"), m.describe())
        })?;
        let odds = m.odds.get(&strategy.bookmaker_name).ok_or_else(|| {
            SimError::missing(format!("odds {}", strategy.bookmaker_name), m.describe())
        })?;
        let winner = m.require_winner()?;
        let returns = profitability(&truth.outcomes, stakes, &truth.probabilities, odds, winner);

        let mut expected = 0.0;
        let mut actual = 0.0;
        for r in &returns {
            m.metrics.insert(
                format!("{expected_key}#{}", r.outcome),
                r.expected,
            );
            m.metrics.insert(format!("{actual_key}#{}", r.outcome), r.actual);
            expected += r.expected;
            actual += r.actual;
            summary.total_stake += r.stake;
            summary.bets += 1;
        }
        m.metrics.insert(expected_key.clone(), expected);
        m.metrics.insert(actual_key.clone(), actual);
        summary.expected_return += expected;
        summary.actual_return += actual;
    }
    if !seen {
        return Err(SimError::lookup(format!(
            "bettor {} has no bets on network {}",
            strategy.name, network.name
        )));
    }
    if summary.total_stake > 0.0 {
        summary.roi = summary.actual_return / summary.total_stake;
    }
    log::info!(
        "bettor {}: {} bets, stake {:.3}, expected {:.4}, actual {:.4}",
        summary.bettor,
        summary.bets,
        summary.total_stake,
        summary.expected_return,
        summary.actual_return
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rps_boundaries() {
        let home = [1.0, 0.0, 0.0];
        assert_eq!(rps(&[1.0, 0.0, 0.0], &home), 0.0);
        // Maximum disagreement: the two cumulative gaps are both 1.
        assert_eq!(cumulative_sq_distance(&[0.0, 0.0, 1.0], &home), 2.0);
        assert_eq!(rps(&[0.0, 0.0, 1.0], &home), 1.0);
    }

    #[test]
    fn rps_respects_ordering() {
        let home = [1.0, 0.0, 0.0];
        assert!(rps(&[0.0, 1.0, 0.0], &home) < rps(&[0.0, 0.0, 1.0], &home));
    }

    #[test]
    fn likelihood_reads_realised_outcome() {
        let ll = likelihood(&[0.5, 0.3, 0.2], &[0.0, 0.0, 1.0]);
        assert!((ll - 0.2_f64.ln()).abs() < 1e-12);
        assert!(likelihood(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).is_finite());
    }

    #[test]
    fn profitability_per_staked_outcome() {
        let out = profitability(
            &Outcome::ALL,
            &[1.0, 0.0, 2.0],
            &[0.5, 0.3, 0.2],
            &[2.5, 3.0, 4.0],
            Outcome::Home,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].outcome, Outcome::Home);
        assert!((out[0].expected - 0.25).abs() < 1e-12);
        assert!((out[0].actual - 1.5).abs() < 1e-12);
        assert_eq!(out[1].outcome, Outcome::Away);
        assert!((out[1].expected - (-0.4)).abs() < 1e-12);
        assert!((out[1].actual - (-2.0)).abs() < 1e-12);
    }
}
