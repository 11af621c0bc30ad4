use rand::Rng;

use crate::error::{Result, SimError};
use crate::forecast::Forecast;
use crate::network::Network;

pub fn draw_outcome<R: Rng + ?Sized>(forecast: &Forecast, rng: &mut R) -> usize {
    let u: f64 = rng.r#gen();
    let mut acc = 0.0;
    for (i, p) in forecast.probabilities.iter().enumerate() {
        acc += p;
        if u < acc {
            return i;
        }
    }
    // Rounding left `acc` a hair under 1.
    forecast.probabilities.len().saturating_sub(1)
}

pub fn simulate_results<R: Rng + ?Sized>(
    network: &mut Network,
    forecast_name: &str,
    season: Option<u32>,
    rng: &mut R,
) -> Result<usize> {
    if !network.forecast_names().contains(forecast_name) {
        return Err(SimError::lookup(format!(
            "cannot simulate from forecast {forecast_name}: not on network {}",
            network.name
        )));
    }
    let mut written = 0usize;
    for id in network.chronological() {
        let Some(m) = network.match_mut(id) else {
            continue;
        };
        if !m.is_active() || m.winner().is_some() || season.is_some_and(|s| s != m.season) {
            continue;
        }
        let Some(forecast) = m.forecasts.get(forecast_name) else {
            continue;
        };
        let outcome = forecast.outcomes[draw_outcome(forecast, rng)];
        m.set_winner(outcome)?;
        written += 1;
    }
    log::info!("simulated {written} results from forecast {forecast_name}");
    Ok(written)
}
