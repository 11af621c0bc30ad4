use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::betting::{BettingStrategy, add_bets};
use crate::bookmaker::{Bookmaker, add_odds};
use crate::calibration::{self, Metrics};
use crate::error::{Result, SimError};
use crate::evaluation::{BettorSummary, ForecastSummary, evaluate_bettor, evaluate_forecast};
use crate::filters::ScheduleFilter;
use crate::forecast::{Forecaster, add_forecast};
use crate::league::{self, LeagueSettings, SeasonReport};
use crate::network::Network;
use crate::params::Params;
use crate::rating::RatingModel;
use crate::schedule;
use crate::simulate::simulate_results;
use crate::true_rating::TrueRatingConfig;

pub const SEED_ENV: &str = "LEAGUE_SIM_SEED";
pub const DB_ENV: &str = "LEAGUE_SIM_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmakerSpec {
    pub name: String,
    pub forecast: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BettorSpec {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub name: String,
    pub seed: u64,
    pub teams: u32,
    pub rounds: Option<u32>,
    pub days_between_rounds: u32,
    pub seasons: u32,
    pub league: Option<LeagueSettings>,
    pub filter: Option<ComponentSpec>,
    pub ratings: Vec<ComponentSpec>,
    pub forecasts: Vec<ComponentSpec>,
    pub results_from: Option<String>,
    pub bookmakers: Vec<BookmakerSpec>,
    pub bettors: Vec<BettorSpec>,
    pub true_forecast: String,
    pub evaluate: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: "league".to_string(),
            seed: 42,
            teams: 20,
            rounds: None,
            days_between_rounds: 7,
            seasons: 1,
            league: None,
            filter: None,
            ratings: vec![ComponentSpec {
                kind: "true".into(),
                name: "true".into(),
                params: Params::new(),
            }],
            forecasts: vec![ComponentSpec {
                kind: "logistic".into(),
                name: "true".into(),
                params: Params::new().with("rating", "true"),
            }],
            results_from: Some("true".into()),
            bookmakers: Vec::new(),
            bettors: Vec::new(),
            true_forecast: "true".into(),
            evaluate: true,
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Some(seed) = env::var(SEED_ENV)
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
        {
            self.seed = seed;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(spec) = &self.filter {
            ScheduleFilter::from_name(&spec.kind, &spec.params)?;
        }
        let mut names = BTreeSet::new();
        for spec in &self.ratings {
            RatingModel::from_name(&spec.kind, &spec.params)?;
            if !names.insert(&spec.name) {
                return Err(SimError::config(format!("rating {} declared twice", spec.name)));
            }
        }
        let mut names = BTreeSet::new();
        for spec in &self.forecasts {
            Forecaster::from_name(&spec.kind, &spec.params)?;
            if !names.insert(&spec.name) {
                return Err(SimError::config(format!("forecast {} declared twice", spec.name)));
            }
        }
        for spec in &self.bookmakers {
            Bookmaker::from_params(&spec.name, &spec.params)?;
        }
        for spec in &self.bettors {
            BettingStrategy::from_params(&spec.name, &spec.params)?;
        }
        if let Some(league) = &self.league {
            league.validate()?;
            if self.filter.is_some() {
                return Err(SimError::config(
                    "schedule filters cannot follow a league run; its results are already drawn",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub network: Network,
    pub forecasts: Vec<ForecastSummary>,
    pub calibration: Vec<(String, Metrics)>,
    pub bettors: Vec<BettorSummary>,
    pub league: Vec<SeasonReport>,
}

pub fn run(cfg: &SimulationConfig) -> Result<RunReport> {
    cfg.validate()?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    log::info!("run {}: seed {}", cfg.name, cfg.seed);

    let mut league_reports = Vec::new();
    let mut network = match &cfg.league {
        Some(settings) => {
            let rating = cfg
                .ratings
                .iter()
                .find(|s| s.name == league::TRUE_RATING)
                .map(|s| TrueRatingConfig::from_params(&s.params))
                .transpose()?
                .unwrap_or_default();
            let forecaster = cfg
                .forecasts
                .iter()
                .find(|s| s.name == league::TRUE_FORECAST)
                .map(|s| Forecaster::from_name(&s.kind, &s.params))
                .transpose()?
                .unwrap_or_else(|| Forecaster::logistic(league::TRUE_RATING, vec![0.3, -0.9], 0.005));
            let run = league::run_league(&cfg.name, settings, &rating, &forecaster, &mut rng)?;
            league_reports = run.seasons;
            run.network
        }
        None => {
            let mut network = schedule::generate(
                &cfg.name,
                cfg.teams,
                cfg.rounds,
                cfg.days_between_rounds,
                0,
            )?;
            let ids = network.team_ids();
            for season in 1..cfg.seasons {
                let first_day = network.last_day().unwrap_or(0) + cfg.days_between_rounds.max(1);
                schedule::add_season(
                    &mut network,
                    &ids,
                    cfg.rounds,
                    cfg.days_between_rounds,
                    season,
                    first_day,
                )?;
            }
            network
        }
    };

    if let Some(spec) = &cfg.filter {
        let filter = ScheduleFilter::from_name(&spec.kind, &spec.params)?;
        let active = filter.apply(&mut network, None, &mut rng)?;
        log::info!("filter {}: {active} active matches", spec.kind);
    }

    // Result-free ratings and the forecasts they feed come first; results
    // are then drawn, and result-driven ratings and forecasts follow.
    let mut pending_ratings: Vec<&ComponentSpec> = cfg
        .ratings
        .iter()
        .filter(|s| !network.has_rating(&s.name))
        .collect();
    let mut pending_forecasts: Vec<&ComponentSpec> = cfg
        .forecasts
        .iter()
        .filter(|s| !network.forecast_names().contains(&s.name))
        .collect();

    compute_ratings(&mut network, &mut pending_ratings, false, &mut rng)?;
    add_ready_forecasts(&mut network, &mut pending_forecasts, &mut rng)?;
    if let Some(source) = &cfg.results_from {
        simulate_results(&mut network, source, None, &mut rng)?;
    }
    compute_ratings(&mut network, &mut pending_ratings, true, &mut rng)?;
    add_ready_forecasts(&mut network, &mut pending_forecasts, &mut rng)?;
    if let Some(spec) = pending_forecasts.first() {
        return Err(SimError::lookup(format!(
            "forecast {} reads a rating no configured component produces",
            spec.name
        )));
    }

    for spec in &cfg.bookmakers {
        let bookmaker = Bookmaker::from_params(&spec.name, &spec.params)?;
        add_odds(&mut network, &bookmaker, &spec.forecast, &mut rng)?;
    }
    let strategies = cfg
        .bettors
        .iter()
        .map(|spec| BettingStrategy::from_params(&spec.name, &spec.params))
        .collect::<Result<Vec<_>>>()?;
    for strategy in &strategies {
        add_bets(&mut network, strategy, &mut rng)?;
    }

    let mut report = RunReport {
        network,
        forecasts: Vec::new(),
        calibration: Vec::new(),
        bettors: Vec::new(),
        league: league_reports,
    };
    if cfg.evaluate && cfg.results_from.is_some() {
        let names: Vec<String> = report.network.forecast_names().into_iter().collect();
        for name in names {
            report
                .forecasts
                .push(evaluate_forecast(&mut report.network, &name)?);
            let pairs = calibration::scored_pairs(&report.network, &name)?;
            report
                .calibration
                .push((name, calibration::evaluate_forecasts(&pairs)));
        }
        for strategy in &strategies {
            report
                .bettors
                .push(evaluate_bettor(&mut report.network, strategy, &cfg.true_forecast)?);
        }
    }
    Ok(report)
}

fn compute_ratings(
    network: &mut Network,
    pending: &mut Vec<&ComponentSpec>,
    with_results: bool,
    rng: &mut StdRng,
) -> Result<()> {
    let mut remaining = Vec::new();
    for spec in pending.drain(..) {
        let model = RatingModel::from_name(&spec.kind, &spec.params)?;
        if model.needs_results() && !with_results {
            remaining.push(spec);
            continue;
        }
        model.compute(network, &spec.name, rng)?;
    }
    *pending = remaining;
    Ok(())
}

fn add_ready_forecasts(
    network: &mut Network,
    pending: &mut Vec<&ComponentSpec>,
    rng: &mut StdRng,
) -> Result<()> {
    let mut remaining = Vec::new();
    for spec in pending.drain(..) {
        let forecaster = Forecaster::from_name(&spec.kind, &spec.params)?;
        if forecaster.rating().is_some_and(|r| !network.has_rating(r)) {
            remaining.push(spec);
            continue;
        }
        add_forecast(network, &spec.name, &forecaster, rng)?;
    }
    *pending = remaining;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_scores_the_true_forecast() {
        let cfg = SimulationConfig {
            teams: 6,
            ..SimulationConfig::default()
        };
        let report = run(&cfg).unwrap();
        assert_eq!(report.network.match_count(), 15);
        assert_eq!(report.forecasts.len(), 1);
        assert_eq!(report.forecasts[0].samples, 15);
        assert!(report.network.matches().iter().all(|m| m.winner().is_some()));
    }

    #[test]
    fn elo_forecast_waits_for_results() {
        let raw = r#"{
            "teams": 6,
            "ratings": [
                {"kind": "elo", "name": "elo"},
                {"kind": "true", "name": "true"}
            ],
            "forecasts": [
                {"kind": "logistic", "name": "elo", "params": {"rating": "elo"}},
                {"kind": "logistic", "name": "true"}
            ],
            "bookmakers": [{"name": "book", "forecast": "true", "params": {"margin": 0.05}}],
            "bettors": [{"name": "punter", "params": {"forecast": "elo", "bookmaker": "book"}}]
        }"#;
        let cfg: SimulationConfig = serde_json::from_str(raw).unwrap();
        let report = run(&cfg).unwrap();
        assert!(report.network.has_rating("elo"));
        assert_eq!(report.forecasts.len(), 2);
        assert_eq!(report.bettors.len(), 1);
    }

    #[test]
    fn same_seed_same_run() {
        let cfg = SimulationConfig {
            teams: 8,
            ..SimulationConfig::default()
        };
        let a = run(&cfg).unwrap();
        let b = run(&cfg).unwrap();
        assert_eq!(a.forecasts, b.forecasts);
    }

    #[test]
    fn unknown_rating_kind_fails_before_running() {
        let cfg = SimulationConfig {
            ratings: vec![ComponentSpec {
                kind: "glicko".into(),
                name: "g".into(),
                params: Params::new(),
            }],
            ..SimulationConfig::default()
        };
        assert!(matches!(run(&cfg), Err(SimError::Config(_))));
    }
}
