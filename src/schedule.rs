use std::collections::BTreeSet;

use crate::error::{Result, SimError};
use crate::network::{Network, TeamId};

pub fn default_rounds(teams: usize) -> usize {
    teams - 1 + teams % 2
}

/// Pairings per round as `(home, away)` seat indices into `0..teams`,
/// circle method with seat 0 fixed.
pub fn round_robin_pairs(teams: usize, rounds: Option<usize>) -> Result<Vec<Vec<(usize, usize)>>> {
    if teams < 2 {
        return Err(SimError::config(format!(
            "a round robin needs at least 2 competitors, got {teams}"
        )));
    }
    let cycle_len = default_rounds(teams);
    let rounds = rounds.unwrap_or(cycle_len);
    if rounds == 0 {
        return Err(SimError::config("a schedule needs at least one round"));
    }

    // `None` is the bye seat for odd competitor counts.
    let mut seats: Vec<Option<usize>> = (0..teams).map(Some).collect();
    if teams % 2 == 1 {
        seats.push(None);
    }
    let m = seats.len();

    let mut cycle = Vec::with_capacity(cycle_len);
    for r in 0..cycle_len {
        let mut pairs = Vec::with_capacity(m / 2);
        for i in 0..m / 2 {
            let (Some(a), Some(b)) = (seats[i], seats[m - 1 - i]) else {
                continue;
            };
            let pair = if i == 0 && r % 2 == 1 { (b, a) } else { (a, b) };
            pairs.push(pair);
        }
        cycle.push(pairs);
        seats[1..].rotate_right(1);
    }

    let mut out = Vec::with_capacity(rounds);
    for r in 0..rounds {
        let pass = r / cycle_len;
        let pairs = &cycle[r % cycle_len];
        if pass % 2 == 0 {
            out.push(pairs.clone());
        } else {
            out.push(pairs.iter().map(|&(h, a)| (a, h)).collect());
        }
    }
    Ok(out)
}

pub fn add_season(
    network: &mut Network,
    teams: &[TeamId],
    rounds: Option<u32>,
    days_between_rounds: u32,
    season: u32,
    first_day: u32,
) -> Result<usize> {
    let unique: BTreeSet<TeamId> = teams.iter().copied().collect();
    if unique.len() != teams.len() {
        return Err(SimError::config("duplicate competitor in schedule"));
    }
    let pairs = round_robin_pairs(teams.len(), rounds.map(|r| r as usize))?;

    let mut created = 0usize;
    for (round, round_pairs) in pairs.iter().enumerate() {
        let round = round as u32;
        let day = first_day + round * days_between_rounds;
        for &(home, away) in round_pairs {
            network.add_match(teams[home], teams[away], season, round, day)?;
            created += 1;
        }
    }
    network.set_members(season, unique);
    log::debug!(
        "network {}: season {season} scheduled {} rounds, {created} matches",
        network.name,
        pairs.len()
    );
    Ok(created)
}

pub fn generate(
    name: &str,
    teams: u32,
    rounds: Option<u32>,
    days_between_rounds: u32,
    season: u32,
) -> Result<Network> {
    if teams < 2 {
        return Err(SimError::config(format!(
            "a round robin needs at least 2 competitors, got {teams}"
        )));
    }
    let mut network = Network::new(name, "round_robin");
    let ids: Vec<TeamId> = (0..teams).map(TeamId).collect();
    for id in &ids {
        network.add_team(*id, format!("Team {}", id.0));
    }
    add_season(&mut network, &ids, rounds, days_between_rounds, season, 0)?;
    log::info!(
        "created network {name}: {teams} competitors, {} matches",
        network.match_count()
    );
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn check_cycle(n: usize) {
        let rounds = round_robin_pairs(n, None).unwrap();
        assert_eq!(rounds.len(), default_rounds(n));

        let mut pairs = HashSet::new();
        let mut home: HashMap<usize, i32> = HashMap::new();
        for round in &rounds {
            assert_eq!(round.len(), n / 2);
            let mut seen = HashSet::new();
            for &(h, a) in round {
                assert!(seen.insert(h) && seen.insert(a), "n={n}: duplicate in round");
                assert!(pairs.insert((h.min(a), h.max(a))), "n={n}: pair repeated");
                *home.entry(h).or_default() += 1;
                *home.entry(a).or_default() -= 1;
            }
        }
        assert_eq!(pairs.len(), n * (n - 1) / 2);
        assert!(home.values().all(|d| d.abs() <= 1), "n={n}: {home:?}");
    }

    #[test]
    fn cycles_are_complete_and_balanced() {
        for n in 2..=20 {
            check_cycle(n);
        }
    }

    #[test]
    fn fewer_than_two_competitors_is_a_config_error() {
        assert!(matches!(round_robin_pairs(1, None), Err(SimError::Config(_))));
        assert!(generate("x", 0, None, 1, 0).is_err());
    }

    #[test]
    fn second_cycle_mirrors_home_and_away() {
        let rounds = round_robin_pairs(4, Some(6)).unwrap();
        for r in 0..3 {
            let mirrored: Vec<_> = rounds[r].iter().map(|&(h, a)| (a, h)).collect();
            assert_eq!(rounds[r + 3], mirrored);
        }
    }

    #[test]
    fn days_follow_spacing() {
        let net = generate("d", 4, None, 7, 0).unwrap();
        for m in net.matches() {
            assert_eq!(m.day, m.round * 7);
        }
    }
}
