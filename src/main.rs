use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use league_sim::config::{self, SimulationConfig};
use league_sim::session::{Session, commands};
use league_sim::{export, store};

const USAGE: &str = "usage:
  league_sim run --config <file.json> [--seed N] [--db path] [--csv path] [--xlsx path]
  league_sim script <commands.txt | -> [--seed N] [--db path]
  league_sim commands";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("run") => run(),
        Some("script") => script(args.get(1).map(String::as_str)),
        Some("commands") => {
            for spec in commands() {
                println!("{} - {}", spec.name, spec.help);
                for p in &spec.params {
                    let flag = if p.required { "required" } else { "optional" };
                    println!("    {} ({}, {flag}): {}", p.name, p.kind.describe(), p.help);
                }
                if spec.passthrough {
                    println!("    ... component parameters as key=value");
                }
            }
            Ok(())
        }
        _ => Err(anyhow!("{USAGE}")),
    }
}

fn run() -> Result<()> {
    let path = parse_path_arg("--config").context("run needs --config <file.json>")?;
    let mut cfg = SimulationConfig::load(&path)
        .with_context(|| format!("failed reading run file {}", path.display()))?;
    cfg.apply_env();
    if let Some(seed) = parse_u64_arg("--seed") {
        cfg.seed = seed;
    }

    let report = config::run(&cfg).context("simulation run failed")?;

    for season in &report.league {
        let top = season
            .table
            .first()
            .map(|s| format!("{} ({} pts)", s.team, s.points))
            .unwrap_or_default();
        println!(
            "season {}: champion {top}, relegated {:?}, promoted {:?}",
            season.season, season.relegated, season.promoted
        );
    }
    for f in &report.forecasts {
        println!(
            "forecast {:<16} samples={:<6} rps={:.4} likelihood={:.4}",
            f.forecast, f.samples, f.mean_rps, f.mean_likelihood
        );
    }
    for (name, m) in &report.calibration {
        println!(
            "  {name}: brier={:.4} log_loss={:.4} accuracy={:.3}",
            m.brier, m.log_loss, m.accuracy
        );
    }
    for b in &report.bettors {
        println!(
            "bettor {:<18} bets={:<6} stake={:.3} expected={:.4} actual={:.4} roi={:.4}",
            b.bettor, b.bets, b.total_stake, b.expected_return, b.actual_return, b.roi
        );
    }

    if let Some(csv) = parse_path_arg("--csv") {
        export::write_csv(&csv, &report.network)
            .with_context(|| format!("failed writing {}", csv.display()))?;
    }
    if let Some(xlsx) = parse_path_arg("--xlsx") {
        export::write_xlsx(&xlsx, &report.network)
            .with_context(|| format!("failed writing workbook to {}", xlsx.display()))?;
    }
    if let Some(db) = db_path() {
        let mut conn = store::open_db(&db)?;
        store::save_network(&mut conn, &report.network)
            .with_context(|| format!("failed saving to {}", db.display()))?;
    }
    Ok(())
}

fn script(source: Option<&str>) -> Result<()> {
    let seed = parse_u64_arg("--seed")
        .or_else(|| {
            std::env::var(config::SEED_ENV)
                .ok()
                .and_then(|v| v.trim().parse().ok())
        })
        .unwrap_or(42);
    let mut session = Session::new(seed);
    if let Some(db) = db_path() {
        session = session.with_store(store::open_db(&db)?);
    }

    let lines: Vec<String> = match source {
        None | Some("-") => io::stdin().lock().lines().collect::<io::Result<_>>()?,
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed reading script {path}"))?
            .lines()
            .map(str::to_string)
            .collect(),
    };

    for (idx, line) in lines.iter().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let items: Vec<String> = parts.map(str::to_string).collect();
        let result = session.execute(command, &items);
        println!("{} {}", if result.success { "ok " } else { "err" }, result.message);
        if !result.success {
            return Err(anyhow!("line {}: {command} failed", idx + 1));
        }
    }
    Ok(())
}

fn db_path() -> Option<PathBuf> {
    parse_path_arg("--db").or_else(|| {
        std::env::var(config::DB_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    })
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<u64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<u64>()
        {
            return Some(v);
        }
    }
    None
}
