use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::forecast::Forecast;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }

    pub fn from_label(raw: &str) -> Option<Outcome> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" | "h" => Some(Outcome::Home),
            "draw" | "d" => Some(Outcome::Draw),
            "away" | "a" => Some(Outcome::Away),
            _ => None,
        }
    }

    pub fn home_score(self) -> f64 {
        match self {
            Outcome::Home => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Away => 0.0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchState {
    Active,
    Inactive,
}

#[derive(Debug, Clone)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// rating name -> season -> `rounds_in_season + 2` slots.
    pub ratings: BTreeMap<String, BTreeMap<u32, Vec<f64>>>,
}

impl Team {
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ratings: BTreeMap::new(),
        }
    }

    pub fn series(&self, rating: &str, season: u32) -> Option<&[f64]> {
        self.ratings
            .get(rating)
            .and_then(|by_season| by_season.get(&season))
            .map(Vec::as_slice)
    }

    pub fn season_end(&self, rating: &str, season: u32) -> Option<f64> {
        self.series(rating, season).and_then(|s| s.last().copied())
    }
}

#[derive(Debug, Clone)]
pub struct Match {
    pub id: usize,
    pub home: TeamId,
    pub away: TeamId,
    pub round: u32,
    pub day: u32,
    pub season: u32,
    pub state: MatchState,
    pub tag: Option<String>,
    winner: Option<Outcome>,
    pub forecasts: BTreeMap<String, Forecast>,
    pub odds: BTreeMap<String, Vec<f64>>,
    pub bets: BTreeMap<String, Vec<f64>>,
    pub metrics: BTreeMap<String, f64>,
}

impl Match {
    pub fn is_active(&self) -> bool {
        self.state == MatchState::Active
    }

    pub fn winner(&self) -> Option<Outcome> {
        self.winner
    }

    /// Records the result. A result is written once; a second write is a
    /// data-integrity error even when it repeats the same outcome.
    pub fn set_winner(&mut self, outcome: Outcome) -> Result<()> {
        if self.winner.is_some() {
            return Err(SimError::missing("winner", format!("{} already has a result", self.describe())));
        }
        self.winner = Some(outcome);
        Ok(())
    }

    pub fn require_winner(&self) -> Result<Outcome> {
        self.winner
            .ok_or_else(|| SimError::missing("winner", self.describe()))
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.home == team || self.away == team
    }

    pub fn describe(&self) -> String {
        format!(
            "match {} {}-{} (season {}, round {})",
            self.id, self.home, self.away, self.season, self.round
        )
    }
}

#[derive(Debug, Clone)]
pub struct Network {
    pub name: String,
    pub kind: String,
    teams: BTreeMap<TeamId, Team>,
    matches: Vec<Match>,
    by_round: BTreeMap<(u32, u32), Vec<usize>>,
    by_team: HashMap<TeamId, Vec<usize>>,
    members: BTreeMap<u32, BTreeSet<TeamId>>,
}

impl Network {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            teams: BTreeMap::new(),
            matches: Vec::new(),
            by_round: BTreeMap::new(),
            by_team: HashMap::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn add_team(&mut self, id: TeamId, name: impl Into<String>) -> &mut Team {
        self.teams.entry(id).or_insert_with(|| Team::new(id, name))
    }

    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.get(&id)
    }

    pub fn team_mut(&mut self, id: TeamId) -> Option<&mut Team> {
        self.teams.get_mut(&id)
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    pub fn team_ids(&self) -> Vec<TeamId> {
        self.teams.keys().copied().collect()
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    pub fn add_match(
        &mut self,
        home: TeamId,
        away: TeamId,
        season: u32,
        round: u32,
        day: u32,
    ) -> Result<usize> {
        if home == away {
            return Err(SimError::config(format!(
                "competitor {home} cannot play itself (season {season}, round {round})"
            )));
        }
        for id in [home, away] {
            if !self.teams.contains_key(&id) {
                self.add_team(id, format!("Team {id}"));
            }
        }

        let id = self.matches.len();
        self.matches.push(Match {
            id,
            home,
            away,
            round,
            day,
            season,
            state: MatchState::Active,
            tag: None,
            winner: None,
            forecasts: BTreeMap::new(),
            odds: BTreeMap::new(),
            bets: BTreeMap::new(),
            metrics: BTreeMap::new(),
        });
        self.by_round.entry((season, round)).or_default().push(id);

        for team in [home, away] {
            let key = (season, round, day, id);
            let list = self.by_team.entry(team).or_default();
            let matches = &self.matches;
            let pos = list.partition_point(|&other| {
                let m = &matches[other];
                (m.season, m.round, m.day, m.id) < key
            });
            list.insert(pos, id);
        }
        Ok(id)
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn get_match(&self, id: usize) -> Option<&Match> {
        self.matches.get(id)
    }

    pub fn match_mut(&mut self, id: usize) -> Option<&mut Match> {
        self.matches.get_mut(id)
    }

    pub fn matches_mut(&mut self) -> impl Iterator<Item = &mut Match> {
        self.matches.iter_mut()
    }

    pub fn chronological(&self) -> Vec<usize> {
        self.by_round.values().flatten().copied().collect()
    }

    pub fn round_matches(&self, season: u32, round: u32) -> &[usize] {
        self.by_round
            .get(&(season, round))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn team_matches(&self, team: TeamId) -> &[usize] {
        self.by_team.get(&team).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn seasons(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self.by_round.keys().map(|(s, _)| *s).collect();
        out.extend(self.members.keys().copied());
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn rounds_in_season(&self, season: u32) -> u32 {
        self.by_round
            .range((season, 0)..=(season, u32::MAX))
            .next_back()
            .map(|((_, round), _)| round + 1)
            .unwrap_or(0)
    }

    pub fn season_first_day(&self, season: u32) -> Option<u32> {
        self.by_round
            .range((season, 0)..=(season, u32::MAX))
            .flat_map(|(_, ids)| ids.iter())
            .map(|&id| self.matches[id].day)
            .min()
    }

    pub fn last_day(&self) -> Option<u32> {
        self.matches.iter().map(|m| m.day).max()
    }

    pub fn members(&self, season: u32) -> BTreeSet<TeamId> {
        if let Some(set) = self.members.get(&season) {
            return set.clone();
        }
        self.by_round
            .range((season, 0)..=(season, u32::MAX))
            .flat_map(|(_, ids)| ids.iter())
            .flat_map(|&id| [self.matches[id].home, self.matches[id].away])
            .collect()
    }

    pub fn set_members(&mut self, season: u32, members: BTreeSet<TeamId>) {
        self.members.insert(season, members);
    }

    pub fn has_explicit_members(&self, season: u32) -> bool {
        self.members.contains_key(&season)
    }

    pub fn rating_names(&self) -> BTreeSet<String> {
        self.teams
            .values()
            .flat_map(|t| t.ratings.keys().cloned())
            .collect()
    }

    pub fn has_rating(&self, name: &str) -> bool {
        self.teams.values().any(|t| t.ratings.contains_key(name))
    }

    pub fn forecast_names(&self) -> BTreeSet<String> {
        self.matches
            .iter()
            .flat_map(|m| m.forecasts.keys().cloned())
            .collect()
    }

    pub fn set_series(&mut self, team: TeamId, rating: &str, season: u32, values: Vec<f64>) {
        if let Some(t) = self.teams.get_mut(&team) {
            t.ratings
                .entry(rating.to_string())
                .or_default()
                .insert(season, values);
        }
    }

    /// Rating a competitor carried into `round`, i.e. slot `round` of its
    /// season series (slot 0 is the pre-season value).
    pub fn rating_before(&self, team: TeamId, rating: &str, season: u32, round: u32) -> Result<f64> {
        let t = self
            .teams
            .get(&team)
            .ok_or_else(|| SimError::lookup(format!("competitor {team} not in network {}", self.name)))?;
        let by_season = t
            .ratings
            .get(rating)
            .ok_or_else(|| SimError::lookup(format!("rating {rating} not computed on network {}", self.name)))?;
        let series = by_season.get(&season).ok_or_else(|| {
            SimError::missing(
                format!("rating {rating}"),
                format!("competitor {team} has no season {season}"),
            )
        })?;
        series.get(round as usize).copied().ok_or_else(|| {
            SimError::missing(
                format!("rating {rating}"),
                format!("competitor {team} season {season} has no slot for round {round}"),
            )
        })
    }

    pub fn clear_rating(&mut self, rating: &str) {
        for team in self.teams.values_mut() {
            team.ratings.remove(rating);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Network {
        let mut net = Network::new("t", "test");
        for i in 0..4 {
            net.add_team(TeamId(i), format!("T{i}"));
        }
        net.add_match(TeamId(0), TeamId(1), 0, 1, 3).unwrap();
        net.add_match(TeamId(2), TeamId(3), 0, 0, 0).unwrap();
        net.add_match(TeamId(1), TeamId(2), 0, 0, 0).unwrap();
        net
    }

    #[test]
    fn winner_is_written_once() {
        let mut net = tiny();
        let m = net.match_mut(0).unwrap();
        m.set_winner(Outcome::Home).unwrap();
        let err = m.set_winner(Outcome::Home).unwrap_err();
        assert!(matches!(err, SimError::DataIntegrity { .. }));
        assert_eq!(m.winner(), Some(Outcome::Home));
    }

    #[test]
    fn team_index_is_chronological() {
        let net = tiny();
        // Team 1 plays match 2 in round 0 and match 0 in round 1.
        assert_eq!(net.team_matches(TeamId(1)), &[2, 0]);
        assert_eq!(net.chronological(), vec![1, 2, 0]);
    }

    #[test]
    fn rounds_and_members_come_from_matches() {
        let net = tiny();
        assert_eq!(net.rounds_in_season(0), 2);
        assert_eq!(net.rounds_in_season(1), 0);
        assert_eq!(net.members(0).len(), 4);
        assert_eq!(net.season_first_day(0), Some(0));
    }

    #[test]
    fn self_match_is_rejected() {
        let mut net = tiny();
        assert!(net.add_match(TeamId(1), TeamId(1), 0, 2, 6).is_err());
    }

    #[test]
    fn outcome_labels_roundtrip() {
        for o in Outcome::ALL {
            assert_eq!(Outcome::from_label(o.label()), Some(o));
        }
        assert_eq!(Outcome::from_label("X"), None);
    }
}
