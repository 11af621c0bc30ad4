use std::collections::BTreeSet;
use std::path::Path;

use rust_xlsxwriter::{Workbook, Worksheet};

use crate::error::Result;
use crate::network::{MatchState, Network, Outcome, TeamId};

pub const BASE_COLUMNS: &[&str] = &[
    "match_id",
    "season",
    "round",
    "day",
    "home",
    "away",
    "home_name",
    "away_name",
    "state",
    "tag",
    "winner",
];

pub const RATING_SIDES: [&str; 4] = ["home", "away", "home_after", "away_after"];

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn match_table(network: &Network) -> Table {
    let forecasts = network.forecast_names();
    let ratings = network.rating_names();
    let books: BTreeSet<String> = network
        .matches()
        .iter()
        .flat_map(|m| m.odds.keys().cloned())
        .collect();
    let bettors: BTreeSet<String> = network
        .matches()
        .iter()
        .flat_map(|m| m.bets.keys().cloned())
        .collect();
    let metrics: BTreeSet<String> = network
        .matches()
        .iter()
        .flat_map(|m| m.metrics.keys().cloned())
        .collect();

    let mut header: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    for name in &forecasts {
        header.extend(Outcome::ALL.iter().map(|o| format!("{name}#{o}")));
    }
    for name in &ratings {
        header.extend(RATING_SIDES.iter().map(|side| format!("{side}:{name}")));
    }
    for name in &books {
        header.extend(Outcome::ALL.iter().map(|o| format!("odds:{name}#{o}")));
    }
    for name in &bettors {
        header.extend(Outcome::ALL.iter().map(|o| format!("bets:{name}#{o}")));
    }
    header.extend(metrics.iter().cloned());

    let mut rows = Vec::with_capacity(network.match_count());
    for id in network.chronological() {
        let m = &network.matches()[id];
        let name_of = |team: TeamId| {
            network
                .team(team)
                .map(|t| t.name.clone())
                .unwrap_or_default()
        };
        let mut row = vec![
            m.id.to_string(),
            m.season.to_string(),
            m.round.to_string(),
            m.day.to_string(),
            m.home.to_string(),
            m.away.to_string(),
            name_of(m.home),
            name_of(m.away),
            match m.state {
                MatchState::Active => "active".to_string(),
                MatchState::Inactive => "inactive".to_string(),
            },
            m.tag.clone().unwrap_or_default(),
            opt_to_string(m.winner()),
        ];
        for name in &forecasts {
            let forecast = m.forecasts.get(name);
            row.extend(
                Outcome::ALL
                    .iter()
                    .map(|o| opt_to_string(forecast.and_then(|f| f.probability(*o)))),
            );
        }
        for name in &ratings {
            let slot = |team: TeamId, after: u32| {
                opt_to_string(network.rating_before(team, name, m.season, m.round + after).ok())
            };
            row.extend([slot(m.home, 0), slot(m.away, 0), slot(m.home, 1), slot(m.away, 1)]);
        }
        // Odds and stakes follow the outcome order of the match's forecasts.
        let outcomes = m
            .forecasts
            .values()
            .next()
            .map(|f| f.outcomes.clone())
            .unwrap_or_else(|| Outcome::ALL.to_vec());
        for (source, names) in [(&m.odds, &books), (&m.bets, &bettors)] {
            for name in names {
                let values = source.get(name);
                row.extend(Outcome::ALL.iter().map(|o| {
                    let idx = outcomes.iter().position(|x| x == o);
                    opt_to_string(values.zip(idx).and_then(|(v, i)| v.get(i).copied()))
                }));
            }
        }
        row.extend(metrics.iter().map(|k| opt_to_string(m.metrics.get(k))));
        rows.push(row);
    }
    Table { header, rows }
}

pub fn to_csv(table: &Table) -> String {
    let mut out = String::new();
    for row in std::iter::once(&table.header).chain(table.rows.iter()) {
        let line: Vec<String> = row.iter().map(|v| csv_field(v)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

pub fn write_csv(path: &Path, network: &Network) -> Result<usize> {
    let table = match_table(network);
    std::fs::write(path, to_csv(&table))?;
    log::info!("wrote {} rows to {}", table.rows.len(), path.display());
    Ok(table.rows.len())
}

/// Workbook with a `Matches` sheet and a `Ratings` sheet (one row per
/// competitor, rating, season and slot).
pub fn write_xlsx(path: &Path, network: &Network) -> Result<usize> {
    let table = match_table(network);
    let mut all_rows = vec![table.header.clone()];
    all_rows.extend(table.rows.iter().cloned());

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Matches")?;
        write_rows(sheet, &all_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Ratings")?;
        write_ratings(sheet, network)?;
    }
    workbook.save(path)?;
    log::info!("wrote workbook {}", path.display());
    Ok(table.rows.len())
}

pub const RATING_SHEET_COLUMNS: &[&str] = &["team", "name", "rating", "season", "slot", "value"];

fn write_ratings(worksheet: &mut Worksheet, network: &Network) -> Result<u32> {
    for (col, title) in RATING_SHEET_COLUMNS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *title)?;
    }
    let mut row = 1u32;
    for team in network.teams() {
        for (rating, by_season) in &team.ratings {
            for (season, values) in by_season {
                for (slot, value) in values.iter().enumerate() {
                    worksheet.write_number(row, 0, team.id.0)?;
                    worksheet.write_string(row, 1, &team.name)?;
                    worksheet.write_string(row, 2, rating)?;
                    worksheet.write_number(row, 3, *season)?;
                    worksheet.write_number(row, 4, slot as u32)?;
                    if value.is_finite() {
                        worksheet.write_number(row, 5, *value)?;
                    }
                    row += 1;
                }
            }
        }
    }
    Ok(row - 1)
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            match value.parse::<f64>() {
                Ok(n) if n.is_finite() => {
                    worksheet.write_number(row_idx as u32, col_idx as u16, n)?;
                }
                _ => {
                    worksheet.write_string(row_idx as u32, col_idx as u16, value)?;
                }
            }
        }
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{Forecaster, add_forecast};
    use crate::params::Params;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn header_has_forecast_columns() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = crate::schedule::generate("x", 4, None, 1, 0).unwrap();
        let f = Forecaster::from_name("uniform", &Params::new()).unwrap();
        add_forecast(&mut net, "flat", &f, &mut rng).unwrap();
        let table = match_table(&net);
        assert!(table.header.contains(&"flat#home".to_string()));
        assert!(table.header.contains(&"flat#away".to_string()));
        assert_eq!(table.rows.len(), 6);
        assert!(table.rows.iter().all(|r| r.len() == table.header.len()));
    }

    #[test]
    fn rating_columns_hold_before_and_after_values() {
        let mut net = crate::schedule::generate("x", 4, None, 1, 0).unwrap();
        for team in net.team_ids() {
            let base = 1000.0 + team.0 as f64;
            net.set_series(team, "r", 0, (0..5).map(|slot| base + slot as f64 * 0.125).collect());
        }
        let table = match_table(&net);
        let col = |name: &str| table.header.iter().position(|h| h == name).unwrap();
        for (row, id) in table.rows.iter().zip(net.chronological()) {
            let m = &net.matches()[id];
            let before = 1000.0 + m.home.0 as f64 + m.round as f64 * 0.125;
            assert_eq!(row[col("home:r")].parse::<f64>().unwrap(), before);
            assert_eq!(row[col("home_after:r")].parse::<f64>().unwrap(), before + 0.125);
            assert!(!row[col("away:r")].is_empty());
        }
    }

    #[test]
    fn csv_quotes_awkward_fields() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }
}
