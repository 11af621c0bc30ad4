use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::forecast::{Forecaster, add_season_forecast};
use crate::network::{Network, Outcome, TeamId};
use crate::schedule;
use crate::simulate::simulate_results;
use crate::true_rating::{self, TrueRatingConfig};

pub const TRUE_RATING: &str = "true";
pub const TRUE_FORECAST: &str = "true";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeagueSettings {
    pub teams: u32,
    pub pool: u32,
    pub seasons: u32,
    pub swaps: u32,
    pub days_between_rounds: u32,
    pub break_days: u32,
}

impl Default for LeagueSettings {
    fn default() -> Self {
        Self {
            teams: 20,
            pool: 10,
            seasons: 3,
            swaps: 3,
            days_between_rounds: 7,
            break_days: 60,
        }
    }
}

impl LeagueSettings {
    pub fn validate(&self) -> Result<()> {
        if self.teams < 2 {
            return Err(SimError::config(format!(
                "league needs at least 2 competitors, got {}",
                self.teams
            )));
        }
        if self.seasons == 0 {
            return Err(SimError::config("league needs at least one season"));
        }
        if self.swaps > self.pool || self.swaps >= self.teams {
            return Err(SimError::config(format!(
                "swaps ({}) must fit both the pool ({}) and the tier ({})",
                self.swaps, self.pool, self.teams
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub team: TeamId,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonReport {
    pub season: u32,
    pub table: Vec<Standing>,
    pub relegated: Vec<TeamId>,
    pub promoted: Vec<TeamId>,
}

#[derive(Debug, Clone)]
pub struct LeagueRun {
    pub network: Network,
    pub seasons: Vec<SeasonReport>,
}

/// League table for a season: 3 points a win, 1 a draw. Ties break on
/// wins, then on id so the order is stable.
pub fn standings(network: &Network, season: u32) -> Result<Vec<Standing>> {
    let mut table: BTreeMap<TeamId, Standing> = network
        .members(season)
        .into_iter()
        .map(|team| {
            (
                team,
                Standing {
                    team,
                    ..Standing::default()
                },
            )
        })
        .collect();

    for m in network.matches().iter().filter(|m| m.season == season && m.is_active()) {
        let winner = m.require_winner()?;
        let (home_pts, away_pts) = match winner {
            Outcome::Home => (3, 0),
            Outcome::Draw => (1, 1),
            Outcome::Away => (0, 3),
        };
        for (team, pts) in [(m.home, home_pts), (m.away, away_pts)] {
            let row = table.entry(team).or_insert(Standing {
                team,
                ..Standing::default()
            });
            row.played += 1;
            row.points += pts;
            match pts {
                3 => row.wins += 1,
                1 => row.draws += 1,
                _ => row.losses += 1,
            }
        }
    }

    let mut rows: Vec<Standing> = table.into_values().collect();
    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.wins.cmp(&a.wins))
            .then(a.team.cmp(&b.team))
    });
    Ok(rows)
}

pub fn run_league<R: Rng + ?Sized>(
    name: &str,
    settings: &LeagueSettings,
    rating: &TrueRatingConfig,
    forecaster: &Forecaster,
    rng: &mut R,
) -> Result<LeagueRun> {
    settings.validate()?;
    if forecaster.rating().is_some_and(|r| r != TRUE_RATING) {
        return Err(SimError::config(format!(
            "league results are drawn from the `{TRUE_RATING}` rating"
        )));
    }

    let mut network = Network::new(name, "league");
    let mut tier: BTreeSet<TeamId> = (0..settings.teams).map(TeamId).collect();
    let mut pool: BTreeSet<TeamId> = (settings.teams..settings.teams + settings.pool)
        .map(TeamId)
        .collect();
    for id in tier.iter().chain(pool.iter()) {
        network.add_team(*id, format!("Team {}", id.0));
    }

    let mut reports = Vec::with_capacity(settings.seasons as usize);
    let mut first_day = 0u32;
    for season in 0..settings.seasons {
        let members: Vec<TeamId> = tier.iter().copied().collect();
        schedule::add_season(
            &mut network,
            &members,
            None,
            settings.days_between_rounds,
            season,
            first_day,
        )?;
        true_rating::compute_season(&mut network, TRUE_RATING, rating, season, rng)?;
        add_season_forecast(&mut network, TRUE_FORECAST, forecaster, Some(season), rng)?;
        simulate_results(&mut network, TRUE_FORECAST, Some(season), rng)?;

        let table = standings(&network, season)?;
        let swaps = settings.swaps as usize;
        let relegated: Vec<TeamId> = table.iter().rev().take(swaps).map(|s| s.team).collect();
        let promoted = strongest(&network, &pool, season, swaps);

        for team in &relegated {
            tier.remove(team);
            pool.insert(*team);
        }
        for team in &promoted {
            pool.remove(team);
            tier.insert(*team);
        }
        log::info!(
            "league {name} season {season}: champion {}, relegated {:?}, promoted {:?}",
            table.first().map(|s| s.team.to_string()).unwrap_or_default(),
            relegated,
            promoted
        );
        reports.push(SeasonReport {
            season,
            table,
            relegated,
            promoted,
        });
        first_day = network.last_day().unwrap_or(first_day) + settings.break_days.max(1);
    }

    Ok(LeagueRun {
        network,
        seasons: reports,
    })
}

fn strongest(network: &Network, pool: &BTreeSet<TeamId>, season: u32, count: usize) -> Vec<TeamId> {
    let mut ranked: Vec<(TeamId, f64)> = pool
        .iter()
        .map(|&team| {
            let value = network
                .team(team)
                .and_then(|t| t.season_end(TRUE_RATING, season))
                .unwrap_or(f64::NEG_INFINITY);
            (team, value)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(count).map(|(team, _)| team).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small() -> LeagueSettings {
        LeagueSettings {
            teams: 6,
            pool: 4,
            seasons: 3,
            swaps: 2,
            days_between_rounds: 7,
            break_days: 30,
        }
    }

    #[test]
    fn tier_size_is_constant_and_swaps_happen() {
        let mut rng = StdRng::seed_from_u64(31);
        let forecaster = Forecaster::logistic(TRUE_RATING, vec![0.3, -0.9], 0.005);
        let run = run_league("l", &small(), &TrueRatingConfig::default(), &forecaster, &mut rng).unwrap();
        assert_eq!(run.seasons.len(), 3);
        for report in &run.seasons {
            assert_eq!(report.table.len(), 6);
            assert_eq!(report.relegated.len(), 2);
            assert_eq!(report.promoted.len(), 2);
            assert_eq!(run.network.members(report.season).len(), 6);
        }
        let s0 = run.network.members(0);
        let s1 = run.network.members(1);
        for team in &run.seasons[0].promoted {
            assert!(!s0.contains(team) && s1.contains(team));
        }
        for team in &run.seasons[0].relegated {
            assert!(s0.contains(team) && !s1.contains(team));
        }
        // 15 matches per season for six competitors.
        assert_eq!(run.network.match_count(), 45);
    }

    #[test]
    fn seasons_do_not_overlap_in_time() {
        let mut rng = StdRng::seed_from_u64(32);
        let forecaster = Forecaster::logistic(TRUE_RATING, vec![0.3, -0.9], 0.005);
        let run = run_league("l", &small(), &TrueRatingConfig::default(), &forecaster, &mut rng).unwrap();
        let last_of_0 = run
            .network
            .matches()
            .iter()
            .filter(|m| m.season == 0)
            .map(|m| m.day)
            .max()
            .unwrap();
        assert!(run.network.season_first_day(1).unwrap() > last_of_0);
    }

    #[test]
    fn standings_award_three_one_zero() {
        let mut net = Network::new("t", "test");
        net.add_match(TeamId(0), TeamId(1), 0, 0, 0).unwrap();
        net.add_match(TeamId(1), TeamId(2), 0, 1, 1).unwrap();
        net.match_mut(0).unwrap().set_winner(Outcome::Home).unwrap();
        net.match_mut(1).unwrap().set_winner(Outcome::Draw).unwrap();
        let table = standings(&net, 0).unwrap();
        assert_eq!(table[0].team, TeamId(0));
        assert_eq!(table[0].points, 3);
        assert_eq!(table[1].points, 1);
        assert_eq!(table[2].points, 1);
        assert_eq!(table[1].team, TeamId(1));
    }

    #[test]
    fn oversized_swaps_are_rejected() {
        let settings = LeagueSettings {
            swaps: 5,
            ..small()
        };
        assert!(settings.validate().is_err());
    }
}
