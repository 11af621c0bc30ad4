use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::rngs::StdRng;

use league_sim::forecast::Forecaster;
use league_sim::league::{LeagueSettings, run_league};
use league_sim::network::TeamId;
use league_sim::session::Session;
use league_sim::true_rating::TrueRatingConfig;

#[test]
fn league_swaps_tier_and_pool_each_season() {
    let settings = LeagueSettings {
        teams: 6,
        pool: 3,
        seasons: 3,
        swaps: 2,
        days_between_rounds: 7,
        break_days: 30,
    };
    let mut rng = StdRng::seed_from_u64(17);
    let run = run_league(
        "tiers",
        &settings,
        &TrueRatingConfig::default(),
        &Forecaster::logistic("true", vec![0.3, -0.9], 0.005),
        &mut rng,
    )
    .unwrap();

    assert_eq!(run.seasons.len(), 3);
    assert_eq!(run.network.match_count(), 3 * 15);
    for report in &run.seasons {
        assert_eq!(report.table.len(), 6);
        assert_eq!(report.relegated.len(), 2);
        assert_eq!(report.promoted.len(), 2);
        for row in &report.table {
            assert_eq!(row.played, 5);
            assert_eq!(row.points, 3 * row.wins + row.draws);
        }
    }
    for pair in run.seasons.windows(2) {
        let before = run.network.members(pair[0].season);
        let after = run.network.members(pair[1].season);
        let mut expected: BTreeSet<TeamId> = before
            .difference(&pair[0].relegated.iter().copied().collect())
            .copied()
            .collect();
        expected.extend(pair[0].promoted.iter().copied());
        assert_eq!(after, expected);
    }
}

#[test]
fn session_script_runs_a_full_pipeline() {
    let mut session = Session::new(4);
    let script = [
        "create_network name=s teams=6",
        "add_rating network=s kind=true name=true",
        "add_forecast network=s kind=logistic name=true rating=true",
        "simulate network=s forecast=true",
        "add_rating network=s kind=elo name=elo",
        "add_forecast network=s kind=logistic name=elo rating=elo",
        "create_bookmaker name=book margin=0.05",
        "add_odds network=s bookmaker=book forecast=true",
        "create_betting_strategy name=punter forecast=elo bookmaker=book",
        "add_bets network=s bettor=punter",
        "evaluate network=s",
        "evaluate network=s bettor=punter",
    ];
    for line in script {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap();
        let items: Vec<String> = parts.map(str::to_string).collect();
        let result = session.execute(command, &items);
        assert!(result.success, "{line}: {}", result.message);
    }
    let net = session.network("s").unwrap();
    assert!(net.has_rating("elo"));
    assert!(net.matches().iter().all(|m| m.metrics.contains_key("rps#true")));

    let failed = session.execute("simulate", &["network=missing".into(), "forecast=true".into()]);
    assert!(!failed.success);
}
