use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;

use league_sim::config::{self, ComponentSpec, SimulationConfig};
use league_sim::params::Params;

const DEFAULT_GRID: &[f64] = &[0.25, 0.5, 0.75, 1.0];
const DEFAULT_REPLICATES: usize = 8;

#[derive(Debug, Clone, Default)]
struct GridPoint {
    p: f64,
    runs: usize,
    active: f64,
    rps: Vec<(String, f64)>,
    likelihood: Vec<(String, f64)>,
    roi: Vec<(String, f64)>,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let base = match parse_path_arg("--config") {
        Some(path) => SimulationConfig::load(&path)
            .with_context(|| format!("failed reading run file {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if base.league.is_some() {
        return Err(anyhow!("sweep varies the schedule filter; league runs cannot be filtered"));
    }
    let grid = parse_f64_list_arg("--p").unwrap_or_else(|| DEFAULT_GRID.to_vec());
    let replicates = parse_usize_arg("--replicates")
        .unwrap_or(DEFAULT_REPLICATES)
        .clamp(1, 10_000);
    let base_seed = parse_u64_arg("--seed").unwrap_or(base.seed);
    let clustered = has_flag("--clustered");

    let jobs: Vec<(usize, f64, u64)> = grid
        .iter()
        .enumerate()
        .flat_map(|(idx, &p)| {
            (0..replicates).map(move |rep| (idx, p, base_seed.wrapping_add(rep as u64)))
        })
        .collect();

    let outcomes: Vec<(usize, Result<config::RunReport>)> = jobs
        .par_iter()
        .map(|&(idx, p, seed)| {
            let mut cfg = base.clone();
            cfg.seed = seed;
            cfg.filter = Some(filter_spec(p, clustered));
            (idx, config::run(&cfg).map_err(anyhow::Error::from))
        })
        .collect();

    let mut points: Vec<GridPoint> = grid
        .iter()
        .map(|&p| GridPoint {
            p,
            ..GridPoint::default()
        })
        .collect();
    for (idx, outcome) in outcomes {
        let report = outcome.with_context(|| format!("run at p={} failed", grid[idx]))?;
        let point = &mut points[idx];
        point.runs += 1;
        point.active += report
            .network
            .matches()
            .iter()
            .filter(|m| m.is_active())
            .count() as f64;
        for f in &report.forecasts {
            accumulate(&mut point.rps, &f.forecast, f.mean_rps);
            accumulate(&mut point.likelihood, &f.forecast, f.mean_likelihood);
        }
        for b in &report.bettors {
            accumulate(&mut point.roi, &b.bettor, b.roi);
        }
    }

    let mode = if clustered { "clustered p_out" } else { "random p" };
    println!("sweep over {mode}, {replicates} replicates, base seed {base_seed}");
    for point in &points {
        let n = point.runs.max(1) as f64;
        print!("p={:.3} active={:.1}", point.p, point.active / n);
        for (name, total) in &point.rps {
            print!(" rps[{name}]={:.4}", total / n);
        }
        for (name, total) in &point.likelihood {
            print!(" ll[{name}]={:.4}", total / n);
        }
        for (name, total) in &point.roi {
            print!(" roi[{name}]={:+.4}", total / n);
        }
        println!();
    }
    Ok(())
}

fn filter_spec(p: f64, clustered: bool) -> ComponentSpec {
    if clustered {
        ComponentSpec {
            kind: "clustered".into(),
            name: "filter".into(),
            params: Params::new().with("p_in", 1.0).with("p_out", p),
        }
    } else {
        ComponentSpec {
            kind: "random".into(),
            name: "filter".into(),
            params: Params::new().with("p", p),
        }
    }
}

fn accumulate(totals: &mut Vec<(String, f64)>, name: &str, value: f64) {
    match totals.iter_mut().find(|(n, _)| n == name) {
        Some((_, total)) => *total += value,
        None => totals.push((name.to_string(), value)),
    }
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
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<usize>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<usize>()
        {
            return Some(v);
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

fn parse_f64_list_arg(name: &str) -> Option<Vec<f64>> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut raw_value: Option<String> = None;
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            raw_value = Some(raw.trim().to_string());
            break;
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
        {
            raw_value = Some(next.trim().to_string());
            break;
        }
    }

    let raw = raw_value?;
    let out: Vec<f64> = raw
        .split(',')
        .filter_map(|part| part.trim().parse::<f64>().ok())
        .filter(|p| (0.0..=1.0).contains(p))
        .collect();
    if out.is_empty() { None } else { Some(out) }
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
