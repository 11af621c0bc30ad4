use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SimError};
use crate::forecast::Forecast;
use crate::network::{MatchState, Network, Outcome, TeamId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub name: String,
    pub kind: String,
    pub teams_json: String,
    pub members_json: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub network: String,
    pub match_id: u64,
    pub season: u32,
    pub round: u32,
    pub day: u32,
    pub home: u32,
    pub away: u32,
    pub state: String,
    pub tag: Option<String>,
    pub winner: Option<String>,
    pub odds_json: String,
    pub bets_json: String,
    pub metrics_json: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub network: String,
    pub match_id: u64,
    pub name: String,
    pub outcomes: String,
    pub probabilities_json: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub network: String,
    pub team: u32,
    pub rating: String,
    pub season: u32,
    pub slot: u32,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecords {
    pub network: Option<NetworkRecord>,
    pub matches: Vec<MatchRecord>,
    pub forecasts: Vec<ForecastRecord>,
    pub ratings: Vec<RatingRecord>,
}

impl NetworkRecords {
    pub fn from_network(network: &Network) -> Result<Self> {
        let teams: BTreeMap<String, String> = network
            .teams()
            .map(|t| (t.id.to_string(), t.name.clone()))
            .collect();
        let members: BTreeMap<String, Vec<u32>> = network
            .seasons()
            .into_iter()
            .filter(|s| network.has_explicit_members(*s))
            .map(|s| (s.to_string(), network.members(s).iter().map(|t| t.0).collect()))
            .collect();
        let header = NetworkRecord {
            name: network.name.clone(),
            kind: network.kind.clone(),
            teams_json: serde_json::to_string(&teams)?,
            members_json: serde_json::to_string(&members)?,
        };

        let mut matches = Vec::with_capacity(network.match_count());
        let mut forecasts = Vec::new();
        for m in network.matches() {
            matches.push(MatchRecord {
                network: network.name.clone(),
                match_id: m.id as u64,
                season: m.season,
                round: m.round,
                day: m.day,
                home: m.home.0,
                away: m.away.0,
                state: match m.state {
                    MatchState::Active => "active".into(),
                    MatchState::Inactive => "inactive".into(),
                },
                tag: m.tag.clone(),
                winner: m.winner().map(|w| w.label().to_string()),
                odds_json: serde_json::to_string(&m.odds)?,
                bets_json: serde_json::to_string(&m.bets)?,
                metrics_json: serde_json::to_string(&m.metrics)?,
            });
            for (name, f) in &m.forecasts {
                let labels: Vec<&str> = f.outcomes.iter().map(|o| o.label()).collect();
                forecasts.push(ForecastRecord {
                    network: network.name.clone(),
                    match_id: m.id as u64,
                    name: name.clone(),
                    outcomes: labels.join(","),
                    probabilities_json: serde_json::to_string(&f.probabilities)?,
                });
            }
        }

        let mut ratings = Vec::new();
        for team in network.teams() {
            for (rating, by_season) in &team.ratings {
                for (season, values) in by_season {
                    ratings.extend(values.iter().enumerate().map(|(slot, value)| RatingRecord {
                        network: network.name.clone(),
                        team: team.id.0,
                        rating: rating.clone(),
                        season: *season,
                        slot: slot as u32,
                        value: *value,
                    }));
                }
            }
        }

        Ok(Self {
            network: Some(header),
            matches,
            forecasts,
            ratings,
        })
    }

    pub fn into_network(self) -> Result<Network> {
        let header = self
            .network
            .ok_or_else(|| SimError::missing("networks", "no network record"))?;
        let mut network = Network::new(header.name.clone(), header.kind);

        let teams: BTreeMap<String, String> = serde_json::from_str(&header.teams_json)?;
        for (raw, name) in teams {
            let id = raw
                .parse::<u32>()
                .map_err(|_| SimError::missing("teams_json", format!("competitor id `{raw}`")))?;
            network.add_team(TeamId(id), name);
        }

        let mut matches = self.matches;
        matches.sort_by_key(|m| m.match_id);
        for rec in matches {
            let id = network.add_match(TeamId(rec.home), TeamId(rec.away), rec.season, rec.round, rec.day)?;
            if id as u64 != rec.match_id {
                return Err(SimError::missing(
                    "match_id",
                    format!("network {} match ids are not contiguous at {}", header.name, rec.match_id),
                ));
            }
            let Some(m) = network.match_mut(id) else {
                continue;
            };
            m.state = if rec.state == "inactive" {
                MatchState::Inactive
            } else {
                MatchState::Active
            };
            m.tag = rec.tag;
            if let Some(label) = rec.winner {
                let outcome = Outcome::from_label(&label)
                    .ok_or_else(|| SimError::missing("winner", format!("label `{label}` on match {id}")))?;
                m.set_winner(outcome)?;
            }
            m.odds = serde_json::from_str(&rec.odds_json)?;
            m.bets = serde_json::from_str(&rec.bets_json)?;
            m.metrics = serde_json::from_str(&rec.metrics_json)?;
        }

        for rec in self.forecasts {
            let outcomes = rec
                .outcomes
                .split(',')
                .map(|s| {
                    Outcome::from_label(s)
                        .ok_or_else(|| SimError::missing("outcomes", format!("label `{s}` in forecast {}", rec.name)))
                })
                .collect::<Result<Vec<_>>>()?;
            let probabilities: Vec<f64> = serde_json::from_str(&rec.probabilities_json)?;
            let forecast = Forecast::new(outcomes, probabilities)?;
            let m = network.match_mut(rec.match_id as usize).ok_or_else(|| {
                SimError::lookup(format!("forecast {} points at unknown match {}", rec.name, rec.match_id))
            })?;
            m.forecasts.insert(rec.name, forecast);
        }

        let mut series: BTreeMap<(u32, String, u32), Vec<(u32, f64)>> = BTreeMap::new();
        for rec in self.ratings {
            series
                .entry((rec.team, rec.rating, rec.season))
                .or_default()
                .push((rec.slot, rec.value));
        }
        for ((team, rating, season), mut slots) in series {
            slots.sort_by_key(|(slot, _)| *slot);
            network.set_series(TeamId(team), &rating, season, slots.into_iter().map(|(_, v)| v).collect());
        }

        let members: BTreeMap<String, Vec<u32>> = serde_json::from_str(&header.members_json)?;
        for (season, ids) in members {
            let season = season
                .parse::<u32>()
                .map_err(|_| SimError::missing("members_json", format!("season `{season}`")))?;
            let set: BTreeSet<TeamId> = ids.into_iter().map(TeamId).collect();
            network.set_members(season, set);
        }
        Ok(network)
    }

    pub fn tables(&self) -> Result<BTreeMap<&'static str, Vec<Value>>> {
        let mut out = BTreeMap::new();
        out.insert(
            "networks",
            self.network
                .iter()
                .map(serde_json::to_value)
                .collect::<std::result::Result<Vec<_>, _>>()?,
        );
        out.insert("matches", to_values(&self.matches)?);
        out.insert("forecasts", to_values(&self.forecasts)?);
        out.insert("ratings", to_values(&self.ratings)?);
        Ok(out)
    }
}

fn to_values<T: Serialize>(items: &[T]) -> Result<Vec<Value>> {
    Ok(items
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{Forecaster, add_forecast};
    use crate::rating::RatingModel;
    use crate::params::Params;
    use crate::simulate::simulate_results;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn records_rebuild_the_network() {
        let mut rng = StdRng::seed_from_u64(40);
        let mut net = crate::schedule::generate("r", 4, None, 2, 0).unwrap();
        RatingModel::from_name("true", &Params::new())
            .unwrap()
            .compute(&mut net, "true", &mut rng)
            .unwrap();
        let f = Forecaster::from_name("logistic", &Params::new()).unwrap();
        add_forecast(&mut net, "true", &f, &mut rng).unwrap();
        simulate_results(&mut net, "true", None, &mut rng).unwrap();

        let records = NetworkRecords::from_network(&net).unwrap();
        assert_eq!(records.matches.len(), 6);
        assert_eq!(records.forecasts.len(), 6);
        assert_eq!(records.ratings.len(), 4 * 5);
        let back = records.into_network().unwrap();

        assert_eq!(back.match_count(), net.match_count());
        for (a, b) in net.matches().iter().zip(back.matches()) {
            assert_eq!((a.home, a.away, a.round, a.season), (b.home, b.away, b.round, b.season));
            assert_eq!(a.winner(), b.winner());
            assert_eq!(a.forecasts, b.forecasts);
        }
        for team in net.teams() {
            assert_eq!(
                team.series("true", 0),
                back.team(team.id).unwrap().series("true", 0)
            );
        }
        assert_eq!(back.members(0), net.members(0));
    }

    #[test]
    fn tables_expose_four_names() {
        let net = crate::schedule::generate("r", 3, None, 1, 0).unwrap();
        let tables = NetworkRecords::from_network(&net).unwrap().tables().unwrap();
        let names: Vec<_> = tables.keys().copied().collect();
        assert_eq!(names, vec!["forecasts", "matches", "networks", "ratings"]);
        assert_eq!(tables["matches"][0]["home"], serde_json::json!(0));
    }
}
