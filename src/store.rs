use std::path::Path;

use rusqlite::{Connection, params};

use crate::error::{Result, SimError};
use crate::network::Network;
use crate::records::{ForecastRecord, MatchRecord, NetworkRecord, NetworkRecords, RatingRecord};

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    log::debug!("opened store {}", path.display());
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS networks (
            name TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            teams_json TEXT NOT NULL,
            members_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS matches (
            network TEXT NOT NULL,
            match_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            round INTEGER NOT NULL,
            day INTEGER NOT NULL,
            home INTEGER NOT NULL,
            away INTEGER NOT NULL,
            state TEXT NOT NULL,
            tag TEXT NULL,
            winner TEXT NULL,
            odds_json TEXT NOT NULL,
            bets_json TEXT NOT NULL,
            metrics_json TEXT NOT NULL,
            PRIMARY KEY (network, match_id)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_round ON matches(network, season, round);

        CREATE TABLE IF NOT EXISTS forecasts (
            network TEXT NOT NULL,
            match_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            outcomes TEXT NOT NULL,
            probabilities_json TEXT NOT NULL,
            PRIMARY KEY (network, match_id, name)
        );

        CREATE TABLE IF NOT EXISTS ratings (
            network TEXT NOT NULL,
            team INTEGER NOT NULL,
            rating TEXT NOT NULL,
            season INTEGER NOT NULL,
            slot INTEGER NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (network, team, rating, season, slot)
        );
        "#,
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Writes every record of `network` in one transaction.
pub fn save_network(conn: &mut Connection, network: &Network) -> Result<SaveSummary> {
    let records = NetworkRecords::from_network(network)?;
    let mut summary = SaveSummary::default();
    let tx = conn.transaction()?;
    {
        let mut count = |changed: usize| {
            if changed > 0 {
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
        };
        if let Some(n) = &records.network {
            count(tx.execute(
                "INSERT INTO networks (name, kind, teams_json, members_json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO NOTHING",
                params![n.name, n.kind, n.teams_json, n.members_json],
            )?);
        }

        let mut stmt = tx.prepare(
            "INSERT INTO matches (
                network, match_id, season, round, day, home, away,
                state, tag, winner, odds_json, bets_json, metrics_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(network, match_id) DO NOTHING",
        )?;
        for m in &records.matches {
            count(stmt.execute(params![
                m.network,
                m.match_id as i64,
                m.season,
                m.round,
                m.day,
                m.home,
                m.away,
                m.state,
                m.tag,
                m.winner,
                m.odds_json,
                m.bets_json,
                m.metrics_json
            ])?);
        }

        let mut stmt = tx.prepare(
            "INSERT INTO forecasts (network, match_id, name, outcomes, probabilities_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(network, match_id, name) DO NOTHING",
        )?;
        for f in &records.forecasts {
            count(stmt.execute(params![
                f.network,
                f.match_id as i64,
                f.name,
                f.outcomes,
                f.probabilities_json
            ])?);
        }

        let mut stmt = tx.prepare(
            "INSERT INTO ratings (network, team, rating, season, slot, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(network, team, rating, season, slot) DO NOTHING",
        )?;
        for r in &records.ratings {
            count(stmt.execute(params![r.network, r.team, r.rating, r.season, r.slot, r.value])?);
        }
    }
    tx.commit()?;
    log::info!(
        "saved network {}: {} rows inserted, {} already present",
        network.name,
        summary.inserted,
        summary.skipped
    );
    Ok(summary)
}

pub fn network_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM networks ORDER BY name")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn load_network(conn: &Connection, name: &str) -> Result<Network> {
    let header = conn
        .query_row(
            "SELECT name, kind, teams_json, members_json FROM networks WHERE name = ?1",
            params![name],
            |row| {
                Ok(NetworkRecord {
                    name: row.get(0)?,
                    kind: row.get(1)?,
                    teams_json: row.get(2)?,
                    members_json: row.get(3)?,
                })
            },
        )
        .map_err(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => {
                SimError::lookup(format!("network {name} is not in the store"))
            }
            other => other.into(),
        })?;

    let mut stmt = conn.prepare(
        "SELECT match_id, season, round, day, home, away, state, tag, winner,
                odds_json, bets_json, metrics_json
         FROM matches WHERE network = ?1 ORDER BY match_id ASC",
    )?;
    let rows = stmt.query_map(params![name], |row| {
        Ok(MatchRecord {
            network: name.to_string(),
            match_id: row.get::<_, i64>(0)? as u64,
            season: row.get(1)?,
            round: row.get(2)?,
            day: row.get(3)?,
            home: row.get(4)?,
            away: row.get(5)?,
            state: row.get(6)?,
            tag: row.get(7)?,
            winner: row.get(8)?,
            odds_json: row.get(9)?,
            bets_json: row.get(10)?,
            metrics_json: row.get(11)?,
        })
    })?;
    let mut matches = Vec::new();
    for row in rows {
        matches.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT match_id, name, outcomes, probabilities_json
         FROM forecasts WHERE network = ?1 ORDER BY match_id ASC, name ASC",
    )?;
    let rows = stmt.query_map(params![name], |row| {
        Ok(ForecastRecord {
            network: name.to_string(),
            match_id: row.get::<_, i64>(0)? as u64,
            name: row.get(1)?,
            outcomes: row.get(2)?,
            probabilities_json: row.get(3)?,
        })
    })?;
    let mut forecasts = Vec::new();
    for row in rows {
        forecasts.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT team, rating, season, slot, value
         FROM ratings WHERE network = ?1 ORDER BY team, rating, season, slot",
    )?;
    let rows = stmt.query_map(params![name], |row| {
        Ok(RatingRecord {
            network: name.to_string(),
            team: row.get(0)?,
            rating: row.get(1)?,
            season: row.get(2)?,
            slot: row.get(3)?,
            value: row.get(4)?,
        })
    })?;
    let mut ratings = Vec::new();
    for row in rows {
        ratings.push(row?);
    }

    let network = NetworkRecords {
        network: Some(header),
        matches,
        forecasts,
        ratings,
    }
    .into_network()?;
    log::info!(
        "loaded network {name}: {} matches, {} competitors",
        network.match_count(),
        network.team_count()
    );
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Outcome;

    #[test]
    fn save_is_idempotent_and_load_rebuilds() {
        let mut conn = open_in_memory().unwrap();
        let mut net = crate::schedule::generate("stored", 4, None, 1, 0).unwrap();
        net.match_mut(0).unwrap().set_winner(Outcome::Draw).unwrap();
        net.set_series(crate::network::TeamId(1), "elo", 0, vec![1000.0, 1001.5, 999.25, 1003.0, 1003.0]);

        let first = save_network(&mut conn, &net).unwrap();
        assert_eq!(first.skipped, 0);
        let second = save_network(&mut conn, &net).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, first.inserted);

        let back = load_network(&conn, "stored").unwrap();
        assert_eq!(back.match_count(), 6);
        assert_eq!(back.matches()[0].winner(), Some(Outcome::Draw));
        assert_eq!(
            back.team(crate::network::TeamId(1)).unwrap().series("elo", 0),
            Some(&[1000.0, 1001.5, 999.25, 1003.0, 1003.0][..])
        );
        assert_eq!(network_names(&conn).unwrap(), vec!["stored".to_string()]);
    }

    #[test]
    fn missing_network_is_lookup_error() {
        let conn = open_in_memory().unwrap();
        assert!(matches!(load_network(&conn, "ghost"), Err(SimError::Lookup(_))));
    }
}
