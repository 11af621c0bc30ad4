use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SimError};
use crate::export::RATING_SIDES;
use crate::forecast::Forecast;
use crate::network::{MatchState, Network, Outcome, TeamId};

pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub home: String,
    pub away: String,
    pub home_name: String,
    pub away_name: String,
    pub season: String,
    pub round: String,
    pub day: String,
    pub date: Option<String>,
    pub date_format: Option<String>,
    pub winner: String,
    pub tag: String,
    pub state: String,
    pub labels: BTreeMap<String, String>,
    pub forecasts: bool,
    pub ratings: bool,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            home: "home".into(),
            away: "away".into(),
            home_name: "home_name".into(),
            away_name: "away_name".into(),
            season: "season".into(),
            round: "round".into(),
            day: "day".into(),
            date: None,
            date_format: None,
            winner: "winner".into(),
            tag: "tag".into(),
            state: "state".into(),
            labels: BTreeMap::new(),
            forecasts: true,
            ratings: true,
        }
    }
}

impl FieldMapping {
    pub fn outcome(&self, raw: &str) -> Option<Outcome> {
        let key = raw.trim();
        let translated = self
            .labels
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(key))
            .map(|(_, to)| to.as_str())
            .unwrap_or(key);
        Outcome::from_label(translated)
    }
}

pub fn parse_csv(text: &str) -> Result<Vec<Row>> {
    let records = split_records(text)?;
    let mut iter = records.into_iter();
    let Some(header) = iter.next() else {
        return Ok(Vec::new());
    };
    let mut rows = Vec::new();
    for (line, record) in iter.enumerate() {
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        if record.len() != header.len() {
            return Err(SimError::missing(
                "csv row",
                format!(
                    "record {} has {} fields, header has {}",
                    line + 1,
                    record.len(),
                    header.len()
                ),
            ));
        }
        rows.push(header.iter().cloned().zip(record).collect());
    }
    Ok(rows)
}

fn split_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => quoted = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if quoted {
        return Err(SimError::missing("csv", "unterminated quoted field"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

pub fn rows_from_json(text: &str) -> Result<Vec<Row>> {
    let items: Vec<serde_json::Map<String, Value>> = serde_json::from_str(text)?;
    Ok(items
        .into_iter()
        .map(|obj| {
            obj.into_iter()
                .map(|(k, v)| {
                    let cell = match v {
                        Value::Null => String::new(),
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, cell)
                })
                .collect()
        })
        .collect())
}

pub fn parse_day(raw: &str, format: Option<&str>) -> Result<u32> {
    let raw = raw.trim();
    let date = match format {
        Some(fmt) => NaiveDateTime::parse_from_str(raw, fmt)
            .map(|dt| dt.date())
            .or_else(|_| NaiveDate::parse_from_str(raw, fmt)),
        None => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive())),
    }
    .map_err(|e| SimError::missing("date", format!("cannot parse `{raw}`: {e}")))?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| SimError::numerical("epoch date out of range"))?;
    let days = (date - epoch).num_days();
    u32::try_from(days).map_err(|_| SimError::missing("date", format!("`{raw}` is before 1970")))
}

struct ParsedRow {
    home: String,
    away: String,
    season: u32,
    round: Option<u32>,
    day: u32,
    state: MatchState,
    tag: Option<String>,
    winner: Option<Outcome>,
    forecasts: Vec<(String, Forecast)>,
    ratings: Vec<(String, [Option<f64>; 4])>,
}

pub fn import_rows(name: &str, rows: &[Row], mapping: &FieldMapping) -> Result<Network> {
    let fc_columns = if mapping.forecasts {
        forecast_columns(rows)
    } else {
        BTreeMap::new()
    };
    let rating_names = if mapping.ratings {
        rating_columns(rows)
    } else {
        Vec::new()
    };

    let mut parsed = Vec::with_capacity(rows.len());
    let mut names: HashMap<String, String> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let context = || format!("row {}", i + 1);
        let cell = |column: &str| row.get(column).map(|s| s.trim()).filter(|s| !s.is_empty());
        let required = |column: &str| {
            cell(column)
                .map(str::to_string)
                .ok_or_else(|| SimError::missing(column, context()))
        };
        let number = |column: &str| -> Result<Option<u32>> {
            cell(column)
                .map(|s| s.parse::<u32>().map_err(|_| SimError::missing(column, format!("{}: `{s}` is not a number", context()))))
                .transpose()
        };

        let home = required(&mapping.home)?;
        let away = required(&mapping.away)?;
        for (raw, column) in [(&home, &mapping.home_name), (&away, &mapping.away_name)] {
            if let Some(n) = cell(column) {
                names.entry(raw.clone()).or_insert_with(|| n.to_string());
            }
        }
        let round = number(&mapping.round)?;
        let day = match mapping.date.as_deref().and_then(|c| cell(c)) {
            Some(raw) => parse_day(raw, mapping.date_format.as_deref())?,
            None => number(&mapping.day)?.or(round).unwrap_or(0),
        };
        let winner = match cell(&mapping.winner) {
            None => None,
            Some(raw) => Some(mapping.outcome(raw).ok_or_else(|| {
                SimError::missing(
                    mapping.winner.as_str(),
                    format!("{}: unknown result label `{raw}`", context()),
                )
            })?),
        };
        let state = match cell(&mapping.state).map(str::to_ascii_lowercase).as_deref() {
            Some("inactive") | Some("false") | Some("0") => MatchState::Inactive,
            _ => MatchState::Active,
        };

        let mut forecasts = Vec::new();
        for (fc_name, columns) in &fc_columns {
            let values: Option<Vec<f64>> = columns
                .iter()
                .map(|(_, column)| cell(column).and_then(|s| s.parse::<f64>().ok()))
                .collect();
            if let Some(probabilities) = values {
                let outcomes = columns.iter().map(|(o, _)| *o).collect();
                forecasts.push((fc_name.clone(), Forecast::new(outcomes, probabilities)?));
            }
        }

        let mut ratings = Vec::with_capacity(rating_names.len());
        for rating in &rating_names {
            let mut values = [None; 4];
            for (value, side) in values.iter_mut().zip(RATING_SIDES) {
                let column = format!("{side}:{rating}");
                *value = match cell(&column) {
                    None => None,
                    Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                        SimError::missing(column.as_str(), format!("{}: `{raw}` is not a number", context()))
                    })?),
                };
            }
            ratings.push((rating.clone(), values));
        }

        parsed.push(ParsedRow {
            home,
            away,
            season: number(&mapping.season)?.unwrap_or(0),
            round,
            day,
            state,
            tag: cell(&mapping.tag).map(str::to_string),
            winner,
            forecasts,
            ratings,
        });
    }

    let ids = intern_ids(parsed.iter().flat_map(|r| [r.home.as_str(), r.away.as_str()]));
    let derived = derive_rounds(&parsed);

    let mut network = Network::new(name, "imported");
    for (raw, id) in &ids {
        let label = names.get(raw).cloned().unwrap_or_else(|| raw.clone());
        network.add_team(*id, label);
    }
    let mut known: BTreeMap<(TeamId, String, u32), BTreeMap<u32, f64>> = BTreeMap::new();
    for (i, row) in parsed.into_iter().enumerate() {
        let round = row.round.unwrap_or(derived[i]);
        let (home, away) = (ids[&row.home], ids[&row.away]);
        for (rating, values) in &row.ratings {
            let slots = [(home, round), (away, round), (home, round + 1), (away, round + 1)];
            for ((team, slot), value) in slots.into_iter().zip(values) {
                if let Some(v) = value {
                    known
                        .entry((team, rating.clone(), row.season))
                        .or_default()
                        .insert(slot, *v);
                }
            }
        }
        let id = network.add_match(home, away, row.season, round, row.day)?;
        if let Some(m) = network.match_mut(id) {
            m.state = row.state;
            m.tag = row.tag;
            if let Some(w) = row.winner {
                m.set_winner(w)?;
            }
            m.forecasts.extend(row.forecasts);
        }
    }
    for ((team, rating, season), slots) in known {
        let series = fill_series(&slots, network.rounds_in_season(season));
        network.set_series(team, &rating, season, series);
    }
    log::info!(
        "imported network {name}: {} competitors, {} matches",
        network.team_count(),
        network.match_count()
    );
    Ok(network)
}

/// Full season series of `rounds + 2` slots from the slots a competitor's
/// matches recorded. Gaps carry the last known value forward, leading gaps
/// take the first known one, and the final slot repeats the end of season.
fn fill_series(known: &BTreeMap<u32, f64>, rounds: u32) -> Vec<f64> {
    let first = known.values().next().copied().unwrap_or_default();
    let mut series = Vec::with_capacity(rounds as usize + 2);
    let mut last = first;
    for slot in 0..=rounds {
        if let Some(v) = known.get(&slot) {
            last = *v;
        }
        series.push(last);
    }
    series.push(last);
    series
}

fn rating_columns(rows: &[Row]) -> Vec<String> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let names: BTreeSet<String> = first
        .keys()
        .filter_map(|column| {
            let (side, name) = column.split_once(':')?;
            (RATING_SIDES.contains(&side) && !name.is_empty()).then(|| name.to_string())
        })
        .collect();
    names.into_iter().collect()
}

fn intern_ids<'a>(raws: impl Iterator<Item = &'a str> + Clone) -> BTreeMap<String, TeamId> {
    let numeric = raws.clone().all(|r| r.parse::<u32>().is_ok());
    let mut out = BTreeMap::new();
    let mut next = 0u32;
    for raw in raws {
        if out.contains_key(raw) {
            continue;
        }
        let id = if numeric {
            raw.parse::<u32>().unwrap_or_default()
        } else {
            next += 1;
            next - 1
        };
        out.insert(raw.to_string(), TeamId(id));
    }
    out
}

fn derive_rounds(rows: &[ParsedRow]) -> Vec<u32> {
    let mut days: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for r in rows {
        days.entry(r.season).or_default().insert(r.day);
    }
    rows.iter()
        .map(|r| {
            days.get(&r.season)
                .map(|set| set.range(..r.day).count() as u32)
                .unwrap_or(0)
        })
        .collect()
}

fn forecast_columns(rows: &[Row]) -> BTreeMap<String, Vec<(Outcome, String)>> {
    let mut out: BTreeMap<String, Vec<(Outcome, String)>> = BTreeMap::new();
    let Some(first) = rows.first() else {
        return out;
    };
    for column in first.keys() {
        let Some((name, label)) = column.rsplit_once('#') else {
            continue;
        };
        if name.is_empty() || name.contains(':') || name.contains('#') {
            continue;
        }
        if let Some(outcome) = Outcome::from_label(label).filter(|o| o.label() == label) {
            out.entry(name.to_string())
                .or_default()
                .push((outcome, column.clone()));
        }
    }
    for columns in out.values_mut() {
        columns.sort_by_key(|(o, _)| Outcome::ALL.iter().position(|x| x == o));
    }
    out.retain(|_, columns| columns.len() >= 2);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_handles_quotes_and_blank_lines() {
        let rows = parse_csv("home,away,home_name\n1,2,\"Club, A\"\n\n3,1,\"Say \"\"B\"\"\"\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["home_name"], "Club, A");
        assert_eq!(rows[1]["home_name"], "Say \"B\"");
    }

    #[test]
    fn labels_are_translated() {
        let mut mapping = FieldMapping::default();
        mapping.labels.insert("1".into(), "home".into());
        mapping.labels.insert("X".into(), "draw".into());
        assert_eq!(mapping.outcome("1"), Some(Outcome::Home));
        assert_eq!(mapping.outcome("x"), Some(Outcome::Draw));
        assert_eq!(mapping.outcome("a"), Some(Outcome::Away));
        assert_eq!(mapping.outcome("2"), None);
    }

    #[test]
    fn dates_become_day_numbers() {
        assert_eq!(parse_day("1970-01-11", None).unwrap(), 10);
        assert_eq!(parse_day("2024-03-02T15:00:00+00:00", None).unwrap(), 19784);
        assert_eq!(parse_day("02/03/2024", Some("%d/%m/%Y")).unwrap(), 19784);
        assert!(parse_day("yesterday", None).is_err());
    }

    #[test]
    fn names_are_interned_and_rounds_derived() {
        let text = r#"[
            {"home": "Lions", "away": "Bears", "date": "2024-01-06", "result": "H"},
            {"home": "Wolves", "away": "Lions", "date": "2024-01-13", "result": "D"},
            {"home": "Bears", "away": "Wolves", "date": "2024-01-13", "result": null}
        ]"#;
        let mapping = FieldMapping {
            date: Some("date".into()),
            winner: "result".into(),
            ..FieldMapping::default()
        };
        let net = import_rows("imp", &rows_from_json(text).unwrap(), &mapping).unwrap();
        assert_eq!(net.team_count(), 3);
        assert_eq!(net.rounds_in_season(0), 2);
        assert_eq!(net.matches()[0].winner(), Some(Outcome::Home));
        assert_eq!(net.matches()[2].winner(), None);
        assert_eq!(net.team(TeamId(0)).unwrap().name, "Lions");
    }

    #[test]
    fn rating_columns_rebuild_series_across_idle_rounds() {
        let text = "home,away,round,home:elo,away:elo,home_after:elo,away_after:elo\n\
                    1,2,0,1000,1000,1010.5,989.5\n\
                    1,3,1,1010.5,1000,1004.25,1006.25\n\
                    2,3,2,989.5,1006.25,995,1000.75\n";
        let net = import_rows("r", &parse_csv(text).unwrap(), &FieldMapping::default()).unwrap();
        assert_eq!(net.rounds_in_season(0), 3);
        let series = |id: u32| net.team(TeamId(id)).unwrap().series("elo", 0).unwrap().to_vec();
        assert_eq!(series(1), vec![1000.0, 1010.5, 1004.25, 1004.25, 1004.25]);
        assert_eq!(series(2), vec![1000.0, 989.5, 989.5, 995.0, 995.0]);
        assert_eq!(series(3), vec![1000.0, 1000.0, 1006.25, 1000.75, 1000.75]);
        assert!(net.forecast_names().is_empty());
    }

    #[test]
    fn bad_rating_cell_names_its_column() {
        let rows = parse_csv("home,away,home:elo,away:elo\n1,2,high,1000\n").unwrap();
        match import_rows("x", &rows, &FieldMapping::default()).unwrap_err() {
            SimError::DataIntegrity { field, .. } => assert_eq!(field, "home:elo"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_label_names_the_winner_column() {
        let rows = parse_csv("home,away,winner\n1,2,W\n").unwrap();
        let err = import_rows("x", &rows, &FieldMapping::default()).unwrap_err();
        match err {
            SimError::DataIntegrity { field, .. } => assert_eq!(field, "winner"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
