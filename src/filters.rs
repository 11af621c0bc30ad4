use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::distribution::Distribution;
use crate::error::{Result, SimError};
use crate::network::{MatchState, Network, TeamId};
use crate::params::Params;

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleFilter {
    All,
    Random { p: f64 },
    Clustered { clusters: u32, p_in: f64, p_out: f64 },
    DegreeMatched { mean: f64, sd: f64 },
}

impl ScheduleFilter {
    pub fn from_name(kind: &str, params: &Params) -> Result<Self> {
        let filter = match kind.trim().to_ascii_lowercase().as_str() {
            "all" | "full" => {
                params.expect_only("full schedule", &[])?;
                ScheduleFilter::All
            }
            "random" => {
                params.expect_only("random filter", &["p"])?;
                ScheduleFilter::Random {
                    p: params.f64_or("p", 1.0)?,
                }
            }
            "clustered" | "cluster" => {
                params.expect_only("clustered filter", &["clusters", "p_in", "p_out"])?;
                ScheduleFilter::Clustered {
                    clusters: params.u32_or("clusters", 2)?,
                    p_in: params.f64_or("p_in", 1.0)?,
                    p_out: params.f64_or("p_out", 0.5)?,
                }
            }
            "degree" | "configuration" | "degree_matched" => {
                params.expect_only("degree-matched filter", &["mean", "sd"])?;
                ScheduleFilter::DegreeMatched {
                    mean: params.f64_or("mean", 1.0)?,
                    sd: params.f64_or("sd", 0.0)?,
                }
            }
            other => return Err(SimError::config(format!("unknown schedule filter `{other}`"))),
        };
        filter.validate()?;
        Ok(filter)
    }

    fn validate(&self) -> Result<()> {
        let prob = |name: &str, p: f64| {
            if (0.0..=1.0).contains(&p) {
                Ok(())
            } else {
                Err(SimError::config(format!("{name} must be within [0, 1], got {p}")))
            }
        };
        match *self {
            ScheduleFilter::All => Ok(()),
            ScheduleFilter::Random { p } => prob("p", p),
            ScheduleFilter::Clustered { clusters, p_in, p_out } => {
                if clusters == 0 {
                    return Err(SimError::config("clusters must be at least 1"));
                }
                prob("p_in", p_in)?;
                prob("p_out", p_out)
            }
            ScheduleFilter::DegreeMatched { mean, sd } => {
                if mean < 0.0 || sd < 0.0 {
                    return Err(SimError::config("degree mean and sd must be non-negative"));
                }
                Ok(())
            }
        }
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        network: &mut Network,
        season: Option<u32>,
        rng: &mut R,
    ) -> Result<usize> {
        let targets: Vec<usize> = network
            .matches()
            .iter()
            .filter(|m| season.is_none_or(|s| m.season == s))
            .map(|m| m.id)
            .collect();
        if let Some(played) = targets
            .iter()
            .filter_map(|&id| network.get_match(id))
            .find(|m| m.winner().is_some())
        {
            return Err(SimError::missing(
                "state",
                format!("{} already has a result and cannot be filtered", played.describe()),
            ));
        }

        let active: Vec<bool> = match *self {
            ScheduleFilter::All => vec![true; targets.len()],
            ScheduleFilter::Random { p } => targets.iter().map(|_| rng.gen_bool(p)).collect(),
            ScheduleFilter::Clustered { clusters, p_in, p_out } => {
                let cluster_of: HashMap<TeamId, u32> = network
                    .team_ids()
                    .into_iter()
                    .enumerate()
                    .map(|(i, id)| (id, i as u32 % clusters))
                    .collect();
                targets
                    .iter()
                    .map(|&id| {
                        let m = &network.matches()[id];
                        let p = if cluster_of.get(&m.home) == cluster_of.get(&m.away) {
                            p_in
                        } else {
                            p_out
                        };
                        rng.gen_bool(p)
                    })
                    .collect()
            }
            ScheduleFilter::DegreeMatched { mean, sd } => {
                degree_matched(network, &targets, mean, sd, rng)?
            }
        };

        let mut kept = 0usize;
        for (&id, on) in targets.iter().zip(active) {
            if let Some(m) = network.match_mut(id) {
                m.state = if on { MatchState::Active } else { MatchState::Inactive };
                kept += usize::from(on);
            }
        }
        log::debug!(
            "network {}: filter {:?} kept {kept}/{} matches",
            network.name,
            self,
            targets.len()
        );
        Ok(kept)
    }
}

fn degree_matched<R: Rng + ?Sized>(
    network: &Network,
    targets: &[usize],
    mean: f64,
    sd: f64,
    rng: &mut R,
) -> Result<Vec<bool>> {
    let degree_dist = Distribution::normal(mean, sd)?;

    let mut possible: HashMap<TeamId, usize> = HashMap::new();
    for &id in targets {
        let m = &network.matches()[id];
        *possible.entry(m.home).or_default() += 1;
        *possible.entry(m.away).or_default() += 1;
    }
    let mut residual: HashMap<TeamId, usize> = HashMap::new();
    for team in network.team_ids() {
        let cap = possible.get(&team).copied().unwrap_or(0);
        let draw = degree_dist.sample(rng).round().max(0.0) as usize;
        residual.insert(team, draw.min(cap));
    }

    let mut order: Vec<usize> = (0..targets.len()).collect();
    order.shuffle(rng);

    let mut active = vec![false; targets.len()];
    for idx in order {
        let m = &network.matches()[targets[idx]];
        let home_left = residual.get(&m.home).copied().unwrap_or(0);
        let away_left = residual.get(&m.away).copied().unwrap_or(0);
        if home_left > 0 && away_left > 0 {
            active[idx] = true;
            residual.insert(m.home, home_left - 1);
            residual.insert(m.away, away_left - 1);
        }
    }
    Ok(active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_filter_extremes() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut net = schedule::generate("f", 6, None, 1, 0).unwrap();
        let none = ScheduleFilter::Random { p: 0.0 };
        assert_eq!(none.apply(&mut net, None, &mut rng).unwrap(), 0);
        let all = ScheduleFilter::Random { p: 1.0 };
        assert_eq!(all.apply(&mut net, None, &mut rng).unwrap(), 15);
    }

    #[test]
    fn clustered_with_zero_cross_probability_keeps_only_inner_matches() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut net = schedule::generate("c", 6, None, 1, 0).unwrap();
        let f = ScheduleFilter::Clustered {
            clusters: 2,
            p_in: 1.0,
            p_out: 0.0,
        };
        // Clusters {0,2,4} and {1,3,5}: 3 + 3 inner pairs.
        assert_eq!(f.apply(&mut net, None, &mut rng).unwrap(), 6);
        for m in net.matches().iter().filter(|m| m.is_active()) {
            assert_eq!(m.home.0 % 2, m.away.0 % 2);
        }
    }

    #[test]
    fn degree_matched_never_exceeds_target() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = schedule::generate("g", 10, None, 1, 0).unwrap();
        let f = ScheduleFilter::DegreeMatched { mean: 3.0, sd: 0.0 };
        f.apply(&mut net, None, &mut rng).unwrap();
        for team in net.team_ids() {
            let degree = net
                .matches()
                .iter()
                .filter(|m| m.is_active() && m.involves(team))
                .count();
            assert!(degree <= 3);
        }
    }

    #[test]
    fn played_matches_cannot_be_filtered() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut net = schedule::generate("p", 4, None, 1, 0).unwrap();
        net.match_mut(0)
            .unwrap()
            .set_winner(crate::network::Outcome::Draw)
            .unwrap();
        let f = ScheduleFilter::Random { p: 0.5 };
        assert!(f.apply(&mut net, None, &mut rng).is_err());
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let p = Params::from_pairs(&["p=1.5"]).unwrap();
        assert!(ScheduleFilter::from_name("random", &p).is_err());
    }
}
