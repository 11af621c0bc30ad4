use rand::Rng;

use crate::error::{Result, SimError};
use crate::forecast::Forecast;
use crate::network::Network;
use crate::params::Params;
use crate::perturb::ErrorModel;

#[derive(Debug, Clone, PartialEq)]
pub struct BettingStrategy {
    pub name: String,
    pub forecast_name: String,
    pub bookmaker_name: String,
    pub stake_fraction: f64,
    pub bankroll: f64,
    pub error: ErrorModel,
}

impl BettingStrategy {
    pub fn new(name: &str, forecast_name: &str, bookmaker_name: &str) -> Self {
        Self {
            name: name.to_string(),
            forecast_name: forecast_name.to_string(),
            bookmaker_name: bookmaker_name.to_string(),
            stake_fraction: 0.01,
            bankroll: 1.0,
            error: ErrorModel::None,
        }
    }

    pub fn from_params(name: &str, params: &Params) -> Result<Self> {
        params.expect_only(
            "betting strategy",
            &["forecast", "bookmaker", "stake_fraction", "bankroll", "error"],
        )?;
        let forecast = params
            .opt_str("forecast")?
            .ok_or_else(|| SimError::config(format!("bettor {name} needs `forecast`")))?;
        let bookmaker = params
            .opt_str("bookmaker")?
            .ok_or_else(|| SimError::config(format!("bettor {name} needs `bookmaker`")))?;
        let strategy = Self {
            stake_fraction: params.f64_or("stake_fraction", 0.01)?,
            bankroll: params.f64_or("bankroll", 1.0)?,
            error: ErrorModel::from_param(params, "error")?,
            ..Self::new(name, &forecast, &bookmaker)
        };
        if !(strategy.stake_fraction > 0.0 && strategy.stake_fraction <= 1.0) || strategy.bankroll <= 0.0 {
            return Err(SimError::config(format!(
                "bettor {name}: stake_fraction must be in (0, 1] and bankroll positive"
            )));
        }
        Ok(strategy)
    }

    pub fn stake(&self) -> f64 {
        self.stake_fraction * self.bankroll
    }

    pub fn decide_bets<R: Rng + ?Sized>(
        &self,
        forecast: &Forecast,
        odds: &[f64],
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        if odds.len() != forecast.probabilities.len() {
            return Err(SimError::missing(
                format!("odds {}", self.bookmaker_name),
                format!(
                    "{} prices for {} outcomes",
                    odds.len(),
                    forecast.probabilities.len()
                ),
            ));
        }
        let perceived = self.error.apply(&forecast.probabilities, rng)?;
        let stake = self.stake();
        Ok(perceived
            .iter()
            .zip(odds)
            .map(|(p, o)| if p * o > 1.0 { stake } else { 0.0 })
            .collect())
    }
}

pub fn add_bets<R: Rng + ?Sized>(
    network: &mut Network,
    strategy: &BettingStrategy,
    rng: &mut R,
) -> Result<usize> {
    if !network.forecast_names().contains(&strategy.forecast_name) {
        return Err(SimError::lookup(format!(
            "bettor {}: forecast {} not found",
            strategy.name, strategy.forecast_name
        )));
    }
    if !network
        .matches()
        .iter()
        .any(|m| m.odds.contains_key(&strategy.bookmaker_name))
    {
        return Err(SimError::lookup(format!(
            "bettor {}: no odds from bookmaker {}",
            strategy.name, strategy.bookmaker_name
        )));
    }

    let mut placed = 0usize;
    for id in network.chronological() {
        let Some(m) = network.match_mut(id) else {
            continue;
        };
        if !m.is_active() {
            continue;
        }
        let (Some(forecast), Some(odds)) = (
            m.forecasts.get(&strategy.forecast_name),
            m.odds.get(&strategy.bookmaker_name),
        ) else {
            continue;
        };
        let stakes = strategy.decide_bets(forecast, odds, rng)?;
        if stakes.iter().any(|s| *s > 0.0) {
            placed += 1;
        }
        m.bets.insert(strategy.name.clone(), stakes);
    }
    log::info!(
        "bettor {} staked on {placed} matches ({} vs {})",
        strategy.name,
        strategy.forecast_name,
        strategy.bookmaker_name
    );
    Ok(placed)
}
