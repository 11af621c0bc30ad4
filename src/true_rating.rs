use std::collections::{BTreeMap, HashMap};

use rand::Rng;

use crate::distribution::Distribution;
use crate::error::{Result, SimError};
use crate::network::{Network, TeamId};
use crate::params::Params;

#[derive(Debug, Clone, PartialEq)]
pub struct TrueRatingConfig {
    pub starting: Distribution,
    pub trend: Distribution,
    pub delta: Distribution,
    pub season_delta: Distribution,
    pub target_mean: Option<f64>,
}

impl Default for TrueRatingConfig {
    fn default() -> Self {
        Self {
            starting: Distribution::Normal {
                mean: 1000.0,
                sd: 100.0,
            },
            trend: Distribution::Normal { mean: 0.0, sd: 0.5 },
            delta: Distribution::Normal { mean: 0.0, sd: 2.0 },
            season_delta: Distribution::Normal { mean: 0.0, sd: 25.0 },
            target_mean: Some(1000.0),
        }
    }
}

impl TrueRatingConfig {
    pub const PARAMS: &'static [&'static str] = &[
        "starting",
        "trend",
        "delta",
        "season_delta",
        "target_mean",
        "normalize",
    ];

    pub fn from_params(params: &Params) -> Result<Self> {
        params.expect_only("true rating", Self::PARAMS)?;
        let d = Self::default();
        let normalize = params.str_or("normalize", "yes")?;
        let target_mean = match normalize.as_str() {
            "yes" | "true" => Some(params.f64_or("target_mean", 1000.0)?),
            "no" | "false" => None,
            other => {
                return Err(SimError::config(format!(
                    "normalize must be yes or no, got `{other}`"
                )));
            }
        };
        Ok(Self {
            starting: Distribution::from_param(params, "starting", d.starting)?,
            trend: Distribution::from_param(params, "trend", d.trend)?,
            delta: Distribution::from_param(params, "delta", d.delta)?,
            season_delta: Distribution::from_param(params, "season_delta", d.season_delta)?,
            target_mean,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ProcessState {
    trend: f64,
    last_active_day: u32,
}

pub fn compute<R: Rng + ?Sized>(
    network: &mut Network,
    name: &str,
    cfg: &TrueRatingConfig,
    rng: &mut R,
) -> Result<()> {
    network.clear_rating(name);
    for season in network.seasons() {
        compute_season(network, name, cfg, season, rng)?;
    }
    log::info!(
        "rating {name} computed on network {} ({} competitors)",
        network.name,
        network.team_count()
    );
    Ok(())
}

/// Walks one season, starting from whatever earlier seasons already hold.
/// Multi-season drivers call this as each season is scheduled.
pub fn compute_season<R: Rng + ?Sized>(
    network: &mut Network,
    name: &str,
    cfg: &TrueRatingConfig,
    season: u32,
    rng: &mut R,
) -> Result<()> {
    let teams = network.team_ids();
    let rounds = network.rounds_in_season(season);
    let first_day = network.season_first_day(season).unwrap_or(0);

    let mut state: HashMap<TeamId, ProcessState> = HashMap::new();
    let mut series: BTreeMap<TeamId, Vec<f64>> = BTreeMap::new();

    // SeasonStart
    for &team in &teams {
        let previous_end = network
            .team(team)
            .and_then(|t| t.ratings.get(name))
            .and_then(|by_season| by_season.range(..season).next_back())
            .and_then(|(_, values)| values.last().copied());
        let start = match previous_end {
            Some(end) => end + cfg.season_delta.sample(rng),
            None => cfg.starting.sample(rng),
        };
        state.insert(
            team,
            ProcessState {
                trend: cfg.trend.sample(rng),
                last_active_day: first_day,
            },
        );
        let mut values = Vec::with_capacity(rounds as usize + 2);
        values.push(start);
        series.insert(team, values);
    }
    if let Some(target) = cfg.target_mean {
        recentre_last(&mut series, target, season, 0)?;
    }

    // RoundStep
    for round in 0..rounds {
        step_round(network, season, round, cfg, &mut state, &mut series, rng)?;
    }

    // SeasonEnd
    for (team, mut values) in series {
        let last = values.last().copied().unwrap_or_default();
        values.push(last);
        network.set_series(team, name, season, values);
    }
    log::debug!("rating {name}: season {season} settled ({rounds} rounds)");
    Ok(())
}

fn step_round<R: Rng + ?Sized>(
    network: &Network,
    season: u32,
    round: u32,
    cfg: &TrueRatingConfig,
    state: &mut HashMap<TeamId, ProcessState>,
    series: &mut BTreeMap<TeamId, Vec<f64>>,
    rng: &mut R,
) -> Result<()> {
    // Earliest active match day per competitor in this round.
    let mut played: BTreeMap<TeamId, u32> = BTreeMap::new();
    for &id in network.round_matches(season, round) {
        let m = &network.matches()[id];
        if !m.is_active() {
            continue;
        }
        for team in [m.home, m.away] {
            played
                .entry(team)
                .and_modify(|d| *d = (*d).min(m.day))
                .or_insert(m.day);
        }
    }

    for (team, values) in series.iter_mut() {
        let previous = values.last().copied().unwrap_or_default();
        let next = match (played.get(team), state.get_mut(team)) {
            (Some(&day), Some(proc_state)) => {
                let days = day.saturating_sub(proc_state.last_active_day);
                let noise: f64 = (0..days).map(|_| cfg.delta.sample(rng)).sum();
                proc_state.last_active_day = day;
                previous + proc_state.trend * days as f64 + noise
            }
            _ => previous,
        };
        values.push(next);
    }

    if let Some(target) = cfg.target_mean {
        recentre_last(series, target, season, round + 1)?;
    }
    Ok(())
}

fn recentre_last(
    series: &mut BTreeMap<TeamId, Vec<f64>>,
    target: f64,
    season: u32,
    slot: u32,
) -> Result<()> {
    if series.is_empty() {
        return Ok(());
    }
    let sum: f64 = series.values().filter_map(|v| v.last()).sum();
    let mean = sum / series.len() as f64;
    let factor = target / mean;
    if !mean.is_finite() || mean.abs() < 1e-12 || !factor.is_finite() || factor <= 0.0 {
        return Err(SimError::numerical(format!(
            "cannot renormalize season {season} slot {slot}: ratings average {mean}"
        )));
    }
    for last in series.values_mut().filter_map(|v| v.last_mut()) {
        *last *= factor;
    }
    Ok(())
}
