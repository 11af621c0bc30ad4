use rand::SeedableRng;
use rand::rngs::StdRng;

use league_sim::betting::{BettingStrategy, add_bets};
use league_sim::bookmaker::{Bookmaker, add_odds};
use league_sim::evaluation::evaluate_forecast;
use league_sim::export::{match_table, to_csv, write_xlsx};
use league_sim::forecast::{Forecaster, add_forecast};
use league_sim::import::{FieldMapping, import_rows, parse_csv};
use league_sim::network::{MatchState, Network, Outcome, TeamId};
use league_sim::perturb::ErrorModel;
use league_sim::schedule;
use league_sim::simulate::simulate_results;
use league_sim::store;
use league_sim::true_rating::{self, TrueRatingConfig};

fn played(seed: u64) -> Network {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut net = schedule::generate("played", 6, None, 7, 0).unwrap();
    true_rating::compute(&mut net, "true", &TrueRatingConfig::default(), &mut rng).unwrap();
    let forecaster = Forecaster::logistic("true", vec![0.3, -0.9], 0.005);
    add_forecast(&mut net, "true", &forecaster, &mut rng).unwrap();
    simulate_results(&mut net, "true", None, &mut rng).unwrap();
    net
}

fn triples(net: &Network) -> Vec<(u32, u32, TeamId, TeamId, Option<&'static str>)> {
    let mut out: Vec<_> = net
        .matches()
        .iter()
        .map(|m| (m.season, m.round, m.home, m.away, m.winner().map(Outcome::label)))
        .collect();
    out.sort();
    out
}

#[test]
fn csv_export_imports_back() {
    let mut net = played(5);
    let book = Bookmaker::new("book", 0.05, ErrorModel::None);
    let mut rng = StdRng::seed_from_u64(9);
    add_odds(&mut net, &book, "true", &mut rng).unwrap();
    add_bets(&mut net, &BettingStrategy::new("punter", "true", "book"), &mut rng).unwrap();
    evaluate_forecast(&mut net, "true").unwrap();
    if let Some(m) = net.match_mut(3) {
        m.state = MatchState::Inactive;
    }

    let csv = to_csv(&match_table(&net));
    let rows = parse_csv(&csv).unwrap();
    assert_eq!(rows.len(), 15);

    let back = import_rows("back", &rows, &FieldMapping::default()).unwrap();
    assert_eq!(back.team_count(), 6);
    assert_eq!(triples(&back), triples(&net));
    assert_eq!(back.team(TeamId(2)).unwrap().name, "Team 2");
    // Only the probability columns come back as forecasts.
    assert_eq!(back.forecast_names().into_iter().collect::<Vec<_>>(), vec!["true"]);

    for m in back.matches() {
        let original = net
            .matches()
            .iter()
            .find(|o| o.season == m.season && o.home == m.home && o.away == m.away)
            .unwrap();
        assert_eq!(m.round, original.round);
        assert_eq!(m.day, original.day);
        assert_eq!(m.state, original.state);
        assert_eq!(m.forecasts, original.forecasts);
    }
    assert_eq!(back.matches().iter().filter(|m| !m.is_active()).count(), 1);

    assert_eq!(back.rating_names(), net.rating_names());
    for team in net.team_ids() {
        let original = net.team(team).unwrap().series("true", 0).unwrap();
        let rebuilt = back.team(team).unwrap().series("true", 0).unwrap();
        assert_eq!(rebuilt.len(), original.len());
        for (slot, (a, b)) in original.iter().zip(rebuilt).enumerate() {
            assert_eq!(a, b, "team {team} slot {slot}");
        }
    }
}

#[test]
fn store_round_trip_keeps_everything() {
    let mut net = played(8);
    let book = Bookmaker::new("book", 0.02, ErrorModel::None);
    let mut rng = StdRng::seed_from_u64(1);
    add_odds(&mut net, &book, "true", &mut rng).unwrap();

    let mut conn = store::open_in_memory().unwrap();
    store::save_network(&mut conn, &net).unwrap();
    let back = store::load_network(&conn, "played").unwrap();

    assert_eq!(triples(&back), triples(&net));
    for (a, b) in net.matches().iter().zip(back.matches()) {
        assert_eq!(a.forecasts, b.forecasts);
        assert_eq!(a.odds, b.odds);
    }
    for team in net.team_ids() {
        assert_eq!(
            back.team(team).unwrap().series("true", 0),
            net.team(team).unwrap().series("true", 0)
        );
    }
}

#[test]
fn workbook_lists_every_match() {
    let net = played(2);
    let path = std::env::temp_dir().join(format!("league_sim_{}.xlsx", std::process::id()));
    let rows = write_xlsx(&path, &net).unwrap();
    assert_eq!(rows, 15);
    assert!(path.exists());
    let _ = std::fs::remove_file(&path);
}
