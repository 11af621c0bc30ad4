use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, SimError};
use crate::network::{Network, TeamId};
use crate::params::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    Keep,
    Mix,
}

impl Continuity {
    pub fn from_name(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Continuity::Keep),
            "mix" => Ok(Continuity::Mix),
            "interchange" => Err(SimError::config(
                "continuity `interchange` has no agreed formula; use keep or mix",
            )),
            other => Err(SimError::config(format!("unknown continuity mode `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EloConfig {
    pub k: f64,
    pub c: f64,
    pub d: f64,
    pub home_adv_pts: f64,
    pub initial: f64,
    pub k_table: BTreeMap<String, f64>,
    pub continuity: Continuity,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 14.0,
            c: 10.0,
            d: 400.0,
            home_adv_pts: 80.0,
            initial: 1000.0,
            k_table: BTreeMap::new(),
            continuity: Continuity::Keep,
        }
    }
}

impl EloConfig {
    pub const PARAMS: &'static [&'static str] =
        &["k", "c", "d", "w", "initial", "k_table", "continuity"];

    pub fn from_params(params: &Params, split: bool) -> Result<Self> {
        params.expect_only(if split { "split-k elo" } else { "elo" }, Self::PARAMS)?;
        let d = Self::default();
        let cfg = Self {
            k: params.f64_or("k", d.k)?,
            c: params.f64_or("c", d.c)?,
            d: params.f64_or("d", d.d)?,
            home_adv_pts: params.f64_or("w", d.home_adv_pts)?,
            initial: params.f64_or("initial", d.initial)?,
            k_table: params.f64_map("k_table")?,
            continuity: Continuity::from_name(&params.str_or("continuity", "keep")?)?,
        };
        if cfg.c <= 1.0 || cfg.d <= 0.0 {
            return Err(SimError::config(format!(
                "elo needs c > 1 and d > 0 (c={}, d={})",
                cfg.c, cfg.d
            )));
        }
        if split && cfg.k_table.is_empty() {
            return Err(SimError::config("split-k elo needs a non-empty k_table"));
        }
        Ok(cfg)
    }

    pub fn k_for(&self, tag: Option<&str>) -> f64 {
        tag.and_then(|t| self.k_table.get(t))
            .copied()
            .unwrap_or(self.k)
    }

    /// `E_home = 1 / (1 + c^((R_away - R_home - w) / d))`.
    pub fn expected_home(&self, home: f64, away: f64) -> f64 {
        1.0 / (1.0 + self.c.powf((away - home - self.home_adv_pts) / self.d))
    }
}

pub fn compute_elo(network: &mut Network, name: &str, cfg: &EloConfig) -> Result<()> {
    network.clear_rating(name);
    let teams = network.team_ids();
    let seasons = network.seasons();

    let mut processed = 0usize;
    let mut previous_season: Option<u32> = None;
    for &season in &seasons {
        let rounds = network.rounds_in_season(season);

        // SeasonInit
        let mut current: BTreeMap<TeamId, f64> = teams
            .iter()
            .map(|&team| {
                let start = network
                    .team(team)
                    .and_then(|t| t.ratings.get(name))
                    .and_then(|by_season| by_season.range(..season).next_back())
                    .and_then(|(_, values)| values.last().copied())
                    .unwrap_or(cfg.initial);
                (team, start)
            })
            .collect();
        if cfg.continuity == Continuity::Mix
            && let Some(prev) = previous_season
        {
            rebase_entering(network, prev, season, &mut current);
        }

        let mut series: BTreeMap<TeamId, Vec<f64>> = current
            .iter()
            .map(|(&team, &value)| {
                let mut values = Vec::with_capacity(rounds as usize + 2);
                values.push(value);
                (team, values)
            })
            .collect();

        for round in 0..rounds {
            // MatchUpdate, from the round's opening ratings.
            let mut deltas: BTreeMap<TeamId, f64> = BTreeMap::new();
            for &id in network.round_matches(season, round) {
                let m = &network.matches()[id];
                if !m.is_active() {
                    continue;
                }
                let winner = m.require_winner()?;
                let home = current.get(&m.home).copied().unwrap_or(cfg.initial);
                let away = current.get(&m.away).copied().unwrap_or(cfg.initial);
                let k = cfg.k_for(m.tag.as_deref());

                let expected_home = cfg.expected_home(home, away);
                let expected_away = 1.0 - expected_home;
                let score_home = winner.home_score();
                let score_away = 1.0 - score_home;

                *deltas.entry(m.home).or_default() += k * (score_home - expected_home);
                *deltas.entry(m.away).or_default() += k * (score_away - expected_away);
                processed += 1;
            }
            // CarryForward for everyone without a delta.
            for (team, values) in series.iter_mut() {
                let value = current.get(team).copied().unwrap_or(cfg.initial)
                    + deltas.get(team).copied().unwrap_or(0.0);
                current.insert(*team, value);
                values.push(value);
            }
        }

        // SeasonClose
        for (team, mut values) in series {
            let last = values.last().copied().unwrap_or(cfg.initial);
            values.push(last);
            network.set_series(team, name, season, values);
        }
        previous_season = Some(season);
    }

    log::info!(
        "rating {name}: elo over {processed} matches on network {}",
        network.name
    );
    Ok(())
}

fn rebase_entering(
    network: &Network,
    previous: u32,
    season: u32,
    current: &mut BTreeMap<TeamId, f64>,
) {
    if !network.has_explicit_members(previous) || !network.has_explicit_members(season) {
        return;
    }
    let before = network.members(previous);
    let after = network.members(season);
    let entering: BTreeSet<TeamId> = after.difference(&before).copied().collect();
    let leaving: BTreeSet<TeamId> = before.difference(&after).copied().collect();
    if entering.is_empty() || leaving.is_empty() {
        return;
    }
    let mean_of = |set: &BTreeSet<TeamId>| {
        set.iter()
            .map(|t| current.get(t).copied().unwrap_or_default())
            .sum::<f64>()
            / set.len() as f64
    };
    let shift = mean_of(&leaving) - mean_of(&entering);
    for team in entering {
        if let Some(v) = current.get_mut(&team) {
            *v += shift;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Outcome;

    fn pair_network() -> Network {
        let mut net = Network::new("e", "test");
        net.add_team(TeamId(0), "Home");
        net.add_team(TeamId(1), "Away");
        net.add_match(TeamId(0), TeamId(1), 0, 0, 0).unwrap();
        net
    }

    #[test]
    fn worked_example_home_win() {
        let mut net = pair_network();
        net.match_mut(0).unwrap().set_winner(Outcome::Home).unwrap();
        let cfg = EloConfig::default();

        // 1 / (1 + 10^(-80/400))
        let e = cfg.expected_home(1000.0, 1000.0);
        assert!((e - 0.613137).abs() < 1e-6, "expected {e}");

        compute_elo(&mut net, "elo", &cfg).unwrap();
        let home = net.team(TeamId(0)).unwrap().series("elo", 0).unwrap();
        let away = net.team(TeamId(1)).unwrap().series("elo", 0).unwrap();
        assert_eq!(home.len(), 3);
        assert!((home[1] - 1005.416).abs() < 1e-3, "home {}", home[1]);
        assert!((away[1] - 994.584).abs() < 1e-3, "away {}", away[1]);
        assert_eq!(home[2], home[1]);
    }

    #[test]
    fn zero_home_advantage_is_zero_sum() {
        let mut net = pair_network();
        net.match_mut(0).unwrap().set_winner(Outcome::Draw).unwrap();
        let cfg = EloConfig {
            home_adv_pts: 0.0,
            initial: 1000.0,
            ..EloConfig::default()
        };
        let sum = cfg.expected_home(1100.0, 1000.0) + cfg.expected_home(1000.0, 1100.0);
        assert!((sum - 1.0).abs() < 1e-12);
        compute_elo(&mut net, "elo", &cfg).unwrap();
        let dh = net.team(TeamId(0)).unwrap().series("elo", 0).unwrap()[1] - 1000.0;
        let da = net.team(TeamId(1)).unwrap().series("elo", 0).unwrap()[1] - 1000.0;
        assert!((dh + da).abs() < 1e-12);
    }

    #[test]
    fn missing_winner_names_the_field() {
        let mut net = pair_network();
        let err = compute_elo(&mut net, "elo", &EloConfig::default()).unwrap_err();
        match err {
            SimError::DataIntegrity { field, .. } => assert_eq!(field, "winner"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn split_k_uses_tag_table() {
        let mut net = pair_network();
        let m = net.match_mut(0).unwrap();
        m.tag = Some("cup".to_string());
        m.set_winner(Outcome::Home).unwrap();
        let p = Params::from_pairs(&["k_table=cup:28", "w=0"]).unwrap();
        let cfg = EloConfig::from_params(&p, true).unwrap();
        compute_elo(&mut net, "elo", &cfg).unwrap();
        let home = net.team(TeamId(0)).unwrap().series("elo", 0).unwrap()[1];
        assert!((home - 1014.0).abs() < 1e-9);
    }

    #[test]
    fn split_k_without_table_fails_fast() {
        assert!(EloConfig::from_params(&Params::new(), true).is_err());
        assert!(Continuity::from_name("interchange").is_err());
    }

    #[test]
    fn round_updates_are_simultaneous() {
        // Competitor 1 plays twice in round 0; both matches see 1000.
        let mut net = Network::new("s", "test");
        for i in 0..3 {
            net.add_team(TeamId(i), format!("T{i}"));
        }
        net.add_match(TeamId(0), TeamId(1), 0, 0, 0).unwrap();
        net.add_match(TeamId(2), TeamId(1), 0, 0, 0).unwrap();
        for id in 0..2 {
            net.match_mut(id).unwrap().set_winner(Outcome::Away).unwrap();
        }
        let cfg = EloConfig {
            home_adv_pts: 0.0,
            ..EloConfig::default()
        };
        compute_elo(&mut net, "elo", &cfg).unwrap();
        let one = net.team(TeamId(1)).unwrap().series("elo", 0).unwrap()[1];
        assert!((one - (1000.0 + 2.0 * 14.0 * 0.5)).abs() < 1e-9);
    }
}
