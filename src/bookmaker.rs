use rand::Rng;

use crate::error::{Result, SimError};
use crate::forecast::Forecast;
use crate::network::Network;
use crate::params::Params;
use crate::perturb::ErrorModel;

#[derive(Debug, Clone, PartialEq)]
pub struct Bookmaker {
    pub name: String,
    pub error: ErrorModel,
    pub margin: f64,
}

impl Bookmaker {
    pub fn new(name: impl Into<String>, margin: f64, error: ErrorModel) -> Self {
        Self {
            name: name.into(),
            error,
            margin,
        }
    }

    pub fn from_params(name: &str, params: &Params) -> Result<Self> {
        params.expect_only("bookmaker", &["margin", "error"])?;
        let margin = params.f64_or("margin", 0.05)?;
        if !margin.is_finite() || margin >= 1.0 {
            return Err(SimError::config(format!(
                "bookmaker {name}: margin must be below 1, got {margin}"
            )));
        }
        Ok(Self::new(name, margin, ErrorModel::from_param(params, "error")?))
    }

    pub fn quote<R: Rng + ?Sized>(&self, forecast: &Forecast, rng: &mut R) -> Result<Vec<f64>> {
        let perceived = self.error.apply(&forecast.probabilities, rng)?;
        perceived
            .iter()
            .map(|&p| {
                if p <= 0.0 {
                    // Nothing sensible to offer on an impossible outcome.
                    Err(SimError::numerical(format!(
                        "bookmaker {} cannot price a zero probability",
                        self.name
                    )))
                } else {
                    Ok((1.0 / p) * (1.0 - self.margin))
                }
            })
            .collect()
    }
}

pub fn add_odds<R: Rng + ?Sized>(
    network: &mut Network,
    bookmaker: &Bookmaker,
    forecast_name: &str,
    rng: &mut R,
) -> Result<usize> {
    if !network.forecast_names().contains(forecast_name) {
        return Err(SimError::lookup(format!(
            "forecast {forecast_name} not found on network {}",
            network.name
        )));
    }
    let mut quoted = 0usize;
    for id in network.chronological() {
        let Some(m) = network.match_mut(id) else {
            continue;
        };
        if !m.is_active() {
            continue;
        }
        let Some(forecast) = m.forecasts.get(forecast_name) else {
            continue;
        };
        let odds = bookmaker.quote(forecast, rng)?;
        m.odds.insert(bookmaker.name.clone(), odds);
        quoted += 1;
    }
    log::info!(
        "bookmaker {} quoted {quoted} matches from forecast {forecast_name}",
        bookmaker.name
    );
    Ok(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Outcome;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn fair_odds_with_margin() {
        let mut rng = StdRng::seed_from_u64(1);
        let f = Forecast::new(Outcome::ALL.to_vec(), vec![0.5, 0.25, 0.25]).unwrap();
        let odds = Bookmaker::new("b", 0.1, ErrorModel::None)
            .quote(&f, &mut rng)
            .unwrap();
        let want = [1.8, 3.6, 3.6];
        for (o, w) in odds.iter().zip(want) {
            assert!((o - w).abs() < 1e-9);
        }
    }

    #[test]
    fn negative_margin_beats_fair_odds() {
        let mut rng = StdRng::seed_from_u64(2);
        let f = Forecast::uniform(Outcome::ALL.to_vec());
        let odds = Bookmaker::new("b", -0.1, ErrorModel::None)
            .quote(&f, &mut rng)
            .unwrap();
        assert!(odds.iter().all(|o| *o > 3.0));
    }

    #[test]
    fn unknown_forecast_is_lookup_error() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = crate::schedule::generate("b", 4, None, 1, 0).unwrap();
        let book = Bookmaker::new("b", 0.05, ErrorModel::None);
        let err = add_odds(&mut net, &book, "nope", &mut rng).unwrap_err();
        assert!(matches!(err, SimError::Lookup(_)));
    }

    #[test]
    fn margin_of_one_is_rejected() {
        let p = Params::from_pairs(&["margin=1"]).unwrap();
        assert!(Bookmaker::from_params("b", &p).is_err());
    }
}
