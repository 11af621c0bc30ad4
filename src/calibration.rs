use serde::Serialize;

use crate::error::{Result, SimError};
use crate::forecast::Forecast;
use crate::network::{Network, Outcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

pub fn scored_pairs(network: &Network, forecast_name: &str) -> Result<Vec<(Forecast, Outcome)>> {
    let mut out = Vec::new();
    for id in network.chronological() {
        let m = &network.matches()[id];
        if !m.is_active() {
            continue;
        }
        let Some(forecast) = m.forecasts.get(forecast_name) else {
            continue;
        };
        out.push((forecast.clone(), m.require_winner()?));
    }
    if out.is_empty() {
        return Err(SimError::lookup(format!(
            "forecast {forecast_name} not found on network {}",
            network.name
        )));
    }
    Ok(out)
}

pub fn evaluate_forecasts(pairs: &[(Forecast, Outcome)]) -> Metrics {
    if pairs.is_empty() {
        return Metrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (forecast, outcome) in pairs {
        let observed = forecast.observed(*outcome);
        brier_sum += forecast
            .probabilities
            .iter()
            .zip(&observed)
            .map(|(p, y)| (p - y).powi(2))
            .sum::<f64>();

        let actual_prob = forecast.probability(*outcome).unwrap_or(0.0).clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if argmax(forecast) == Some(*outcome) {
            correct += 1;
        }
    }

    let n = pairs.len() as f64;
    Metrics {
        samples: pairs.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(pairs: &[(Forecast, Outcome)], class: Outcome, bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (forecast, outcome) in pairs {
        let Some(class_prob) = forecast.probability(class) else {
            continue;
        };
        let class_prob = class_prob.clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

fn argmax(forecast: &Forecast) -> Option<Outcome> {
    let mut best: Option<(Outcome, f64)> = None;
    for (o, p) in forecast.outcomes.iter().zip(&forecast.probabilities) {
        if best.is_none_or(|(_, bp)| *p > bp) {
            best = Some((*o, *p));
        }
    }
    best.map(|(o, _)| o)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fc(p: [f64; 3]) -> Forecast {
        Forecast::new(Outcome::ALL.to_vec(), p.to_vec()).unwrap()
    }

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let pairs = vec![
            (fc([1.0, 0.0, 0.0]), Outcome::Home),
            (fc([0.0, 1.0, 0.0]), Outcome::Draw),
            (fc([0.0, 0.0, 1.0]), Outcome::Away),
        ];
        let m = evaluate_forecasts(&pairs);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert!((m.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bins_count_every_prediction() {
        let pairs = vec![
            (fc([0.55, 0.25, 0.2]), Outcome::Home),
            (fc([0.15, 0.25, 0.6]), Outcome::Home),
            (fc([0.52, 0.28, 0.2]), Outcome::Away),
        ];
        let bins = calibration_bins(&pairs, Outcome::Home, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 3);
        assert_eq!(bins[5].count, 2);
        assert!((bins[5].actual_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ties_prefer_home() {
        assert_eq!(argmax(&Forecast::uniform(Outcome::ALL.to_vec())), Some(Outcome::Home));
    }
}
