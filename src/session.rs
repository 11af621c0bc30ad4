use std::collections::BTreeMap;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::betting::{BettingStrategy, add_bets};
use crate::bookmaker::{Bookmaker, add_odds};
use crate::error::{Result, SimError};
use crate::evaluation::{evaluate_bettor, evaluate_forecast};
use crate::export;
use crate::filters::ScheduleFilter;
use crate::forecast::{Forecaster, add_forecast};
use crate::import::{self, FieldMapping};
use crate::network::Network;
use crate::params::Params;
use crate::rating::RatingModel;
use crate::schedule;
use crate::simulate::simulate_results;
use crate::store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    Text,
    Integer,
    Number,
    Choice(&'static [&'static str]),
    List(&'static ParamKind),
    KeyValueList(&'static ParamKind),
    /// JSON object checked against its own schema. A bare value stands for
    /// the object's `kind` (or `value`) entry.
    Nested(&'static [ParamSpec]),
}

impl ParamKind {
    pub fn describe(&self) -> String {
        match self {
            ParamKind::Text => "text".to_string(),
            ParamKind::Integer => "integer".to_string(),
            ParamKind::Number => "number".to_string(),
            ParamKind::Choice(options) => format!("one of {}", options.join("|")),
            ParamKind::List(item) => format!("list of {}", item.describe()),
            ParamKind::KeyValueList(item) => format!("key:value list of {}", item.describe()),
            ParamKind::Nested(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
                format!("object with {}", names.join(", "))
            }
        }
    }

    fn accepts(&self, value: &str) -> bool {
        match *self {
            ParamKind::Text => !value.is_empty(),
            ParamKind::Integer => value.parse::<u32>().is_ok(),
            ParamKind::Number => value.parse::<f64>().is_ok_and(f64::is_finite),
            ParamKind::Choice(options) => options.iter().any(|o| o.eq_ignore_ascii_case(value)),
            ParamKind::List(item) => match serde_json::from_str::<Value>(value) {
                Ok(json @ Value::Array(_)) => self.accepts_json(&json),
                _ => {
                    let parts: Vec<&str> = split_items(value).collect();
                    !parts.is_empty() && parts.iter().all(|part| item.accepts(part))
                }
            },
            ParamKind::KeyValueList(item) => match serde_json::from_str::<Value>(value) {
                Ok(json @ Value::Object(_)) => self.accepts_json(&json),
                _ => {
                    let pairs: Vec<Option<(&str, &str)>> =
                        split_items(value).map(|pair| pair.split_once(':')).collect();
                    !pairs.is_empty()
                        && pairs.iter().all(|pair| {
                            pair.is_some_and(|(k, v)| !k.trim().is_empty() && item.accepts(v.trim()))
                        })
                }
            },
            ParamKind::Nested(_) => match serde_json::from_str::<Value>(value) {
                Ok(json) => self.accepts_json(&json),
                Err(_) => self.accepts_json(&Value::String(value.to_string())),
            },
        }
    }

    fn accepts_json(&self, value: &Value) -> bool {
        match (*self, value) {
            (ParamKind::List(item), Value::Array(items)) => {
                !items.is_empty() && items.iter().all(|v| item.accepts_json(v))
            }
            (ParamKind::KeyValueList(item), Value::Object(map)) => {
                !map.is_empty() && map.iter().all(|(k, v)| !k.is_empty() && item.accepts_json(v))
            }
            (ParamKind::Nested(fields), Value::Object(map)) => {
                map.iter().all(|(k, v)| {
                    fields
                        .iter()
                        .find(|f| f.name == k.as_str())
                        .is_some_and(|f| f.kind.accepts_json(v))
                }) && fields
                    .iter()
                    .all(|f| !f.required || map.contains_key(f.name))
            }
            (ParamKind::Nested(fields), scalar) => fields
                .iter()
                .filter(|f| f.name == "kind" || f.name == "value")
                .any(|f| f.kind.accepts_json(scalar)),
            (_, Value::String(s)) => self.accepts(s),
            (_, Value::Number(n)) => self.accepts(&n.to_string()),
            (_, Value::Bool(b)) => self.accepts(&b.to_string()),
            _ => false,
        }
    }
}

fn split_items(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub forward: bool,
    pub help: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub help: &'static str,
    pub params: Vec<ParamSpec>,
    pub passthrough: bool,
}

const fn req(name: &'static str, kind: ParamKind, help: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
        forward: false,
        help,
    }
}

const fn opt(name: &'static str, kind: ParamKind, help: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
        forward: false,
        help,
    }
}

const fn component(name: &'static str, kind: ParamKind, help: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
        forward: true,
        help,
    }
}

const DISTRIBUTION_KINDS: &[&str] = &["constant", "fixed", "normal", "gaussian", "uniform"];
const DISTRIBUTION_FIELDS: &[ParamSpec] = &[
    opt("kind", ParamKind::Choice(DISTRIBUTION_KINDS), "distribution"),
    opt("value", ParamKind::Number, "constant value"),
    opt("mean", ParamKind::Number, "normal mean"),
    opt("sd", ParamKind::Number, "normal standard deviation"),
    opt("low", ParamKind::Number, "uniform lower bound"),
    opt("high", ParamKind::Number, "uniform upper bound"),
];
const ERROR_KINDS: &[&str] = &["none", "null", "factor", "bounded", "logit", "distribution"];
const ERROR_FIELDS: &[ParamSpec] = &[
    opt("kind", ParamKind::Choice(ERROR_KINDS), "error model"),
    opt("bound", ParamKind::Number, "factor bound on both sides"),
    opt("lower", ParamKind::Number, "factor lower bound"),
    opt("upper", ParamKind::Number, "factor upper bound"),
    opt("noise", ParamKind::Nested(DISTRIBUTION_FIELDS), "logit noise"),
];
const OUTCOME_LABELS: &[&str] = &["home", "draw", "away"];

const FILTER_KINDS: &[&str] = &["all", "random", "clustered", "degree"];
const FILE_FORMATS: &[&str] = &["csv", "json", "xlsx"];

pub fn commands() -> Vec<CommandSpec> {
    use ParamKind::*;
    vec![
        CommandSpec {
            name: "create_network",
            help: "round-robin network, optionally filtered",
            params: vec![
                req("name", Text, "network name"),
                req("teams", Integer, "number of competitors"),
                opt("rounds", Integer, "rounds per season"),
                opt("days", Integer, "days between rounds"),
                opt("seasons", Integer, "number of seasons"),
                opt("filter", Choice(FILTER_KINDS), "schedule filter"),
            ],
            passthrough: true,
        },
        CommandSpec {
            name: "import",
            help: "network from a CSV or JSON file",
            params: vec![
                req("name", Text, "network name"),
                req("path", Text, "input file"),
                opt("format", Choice(FILE_FORMATS), "csv or json (from extension)"),
                opt("mapping", Text, "JSON field mapping file"),
            ],
            passthrough: false,
        },
        CommandSpec {
            name: "export",
            help: "one row per match to CSV or XLSX",
            params: vec![
                req("network", Text, "network name"),
                req("path", Text, "output file"),
                opt("format", Choice(FILE_FORMATS), "csv or xlsx (from extension)"),
            ],
            passthrough: false,
        },
        CommandSpec {
            name: "save",
            help: "write a network to the store",
            params: vec![req("network", Text, "network name")],
            passthrough: false,
        },
        CommandSpec {
            name: "load",
            help: "read a network from the store",
            params: vec![req("name", Text, "network name")],
            passthrough: false,
        },
        CommandSpec {
            name: "print",
            help: "describe one network, or list them",
            params: vec![opt("network", Text, "network name")],
            passthrough: false,
        },
        CommandSpec {
            name: "simulate",
            help: "draw results from a forecast",
            params: vec![
                req("network", Text, "network name"),
                req("forecast", Text, "forecast to draw from"),
                opt("season", Integer, "only this season"),
            ],
            passthrough: false,
        },
        CommandSpec {
            name: "add_rating",
            help: "compute a rating series",
            params: vec![
                req("network", Text, "network name"),
                req("name", Text, "rating name"),
                req("kind", Choice(RatingModel::KINDS), "rating kind"),
                component("k_table", KeyValueList(&Number), "k per match tag (elo)"),
                component("starting", Nested(DISTRIBUTION_FIELDS), "starting values (true)"),
                component("trend", Nested(DISTRIBUTION_FIELDS), "trend per day (true)"),
                component("delta", Nested(DISTRIBUTION_FIELDS), "step noise (true)"),
                component("season_delta", Nested(DISTRIBUTION_FIELDS), "season change (true)"),
            ],
            passthrough: true,
        },
        CommandSpec {
            name: "add_forecast",
            help: "attach a forecast to every active match",
            params: vec![
                req("network", Text, "network name"),
                req("name", Text, "forecast name"),
                req("kind", Choice(Forecaster::KINDS), "forecast kind"),
                component("outcomes", List(&Choice(OUTCOME_LABELS)), "outcome order"),
                component("coefficients", List(&Number), "logistic cut points"),
                component("probabilities", List(&Number), "static vector"),
                component("rating_noise", Nested(DISTRIBUTION_FIELDS), "noise on read ratings"),
                component("error", Nested(ERROR_FIELDS), "error model"),
            ],
            passthrough: true,
        },
        CommandSpec {
            name: "create_bookmaker",
            help: "register a bookmaker (margin, error)",
            params: vec![
                req("name", Text, "bookmaker name"),
                component("margin", Number, "overround"),
                component("error", Nested(ERROR_FIELDS), "error model"),
            ],
            passthrough: true,
        },
        CommandSpec {
            name: "add_odds",
            help: "quote odds from a forecast",
            params: vec![
                req("network", Text, "network name"),
                req("bookmaker", Text, "bookmaker name"),
                req("forecast", Text, "forecast to price from"),
            ],
            passthrough: false,
        },
        CommandSpec {
            name: "create_betting_strategy",
            help: "register a bettor (forecast, bookmaker, stake_fraction, bankroll, error)",
            params: vec![
                req("name", Text, "bettor name"),
                component("error", Nested(ERROR_FIELDS), "error model"),
            ],
            passthrough: true,
        },
        CommandSpec {
            name: "add_bets",
            help: "place a bettor's stakes",
            params: vec![
                req("network", Text, "network name"),
                req("bettor", Text, "bettor name"),
            ],
            passthrough: false,
        },
        CommandSpec {
            name: "evaluate",
            help: "score forecasts and bettors",
            params: vec![
                req("network", Text, "network name"),
                opt("forecast", Text, "forecast to score (all when omitted)"),
                opt("bettor", Text, "bettor to score"),
                opt("true_forecast", Text, "forecast pricing expected returns"),
            ],
            passthrough: false,
        },
    ]
}

#[derive(Debug, Clone, Default)]
struct Args {
    fields: BTreeMap<String, String>,
    extra: Params,
}

impl Args {
    fn text(&self, key: &str) -> Result<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SimError::config(format!("missing argument `{key}`")))
    }

    fn opt_text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn opt_u32(&self, key: &str) -> Result<Option<u32>> {
        self.opt_text(key)
            .map(|v| {
                v.parse::<u32>()
                    .map_err(|_| SimError::config(format!("`{key}` must be a non-negative integer")))
            })
            .transpose()
    }
}

fn check_args(spec: &CommandSpec, items: &[String]) -> Result<Args> {
    let mut args = Args::default();
    let mut extra = Vec::new();
    for item in items {
        let Some((key, value)) = item.split_once('=') else {
            return Err(SimError::config(format!("expected key=value, got `{item}`")));
        };
        let (key, value) = (key.trim(), value.trim());
        let Some(param) = spec.params.iter().find(|p| p.name == key) else {
            if spec.passthrough {
                extra.push(item.clone());
                continue;
            }
            return Err(SimError::config(format!(
                "{} does not take `{key}`",
                spec.name
            )));
        };
        if !param.kind.accepts(value) {
            return Err(SimError::config(format!(
                "invalid value `{value}` for `{key}` (expected {})",
                param.kind.describe()
            )));
        }
        if param.forward {
            extra.push(item.clone());
        } else {
            args.fields.insert(key.to_string(), value.to_string());
        }
    }
    if let Some(missing) = spec
        .params
        .iter()
        .find(|p| p.required && !args.fields.contains_key(p.name))
    {
        return Err(SimError::config(format!(
            "{} needs `{}` ({})",
            spec.name, missing.name, missing.help
        )));
    }
    args.extra = Params::from_pairs(&extra)?;
    Ok(args)
}

pub struct Session {
    networks: BTreeMap<String, Network>,
    bookmakers: BTreeMap<String, Bookmaker>,
    bettors: BTreeMap<String, BettingStrategy>,
    store: Option<Connection>,
    rng: StdRng,
}

impl Session {
    pub fn new(seed: u64) -> Self {
        Self {
            networks: BTreeMap::new(),
            bookmakers: BTreeMap::new(),
            bettors: BTreeMap::new(),
            store: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_store(mut self, conn: Connection) -> Self {
        self.store = Some(conn);
        self
    }

    pub fn network(&self, name: &str) -> Option<&Network> {
        self.networks.get(name)
    }

    pub fn insert_network(&mut self, network: Network) {
        self.networks.insert(network.name.clone(), network);
    }

    pub fn execute(&mut self, command: &str, items: &[String]) -> CommandResult {
        let Some(spec) = commands().into_iter().find(|c| c.name == command) else {
            let known: Vec<&str> = commands().iter().map(|c| c.name).collect();
            return CommandResult::failed(format!(
                "unknown command `{command}` (known: {})",
                known.join(", ")
            ));
        };
        let outcome = check_args(&spec, items).and_then(|args| self.dispatch(spec.name, &args));
        match outcome {
            Ok(message) => CommandResult::ok(message),
            Err(err) => {
                log::warn!("{command} failed: {err}");
                CommandResult::failed(err.to_string())
            }
        }
    }

    fn dispatch(&mut self, command: &str, args: &Args) -> Result<String> {
        match command {
            "create_network" => self.create_network(args),
            "import" => self.import(args),
            "export" => self.export(args),
            "save" => self.save(args),
            "load" => self.load(args),
            "print" => self.print(args),
            "simulate" => {
                let season = args.opt_u32("season")?;
                let forecast = args.text("forecast")?.to_string();
                let (net, rng) = self.network_and_rng(args.text("network")?)?;
                let n = simulate_results(net, &forecast, season, rng)?;
                Ok(format!("simulated {n} results"))
            }
            "add_rating" => {
                let model = RatingModel::from_name(args.text("kind")?, &args.extra)?;
                let name = args.text("name")?.to_string();
                let (net, rng) = self.network_and_rng(args.text("network")?)?;
                model.compute(net, &name, rng)?;
                Ok(format!("rating {name} ({}) computed", model.kind()))
            }
            "add_forecast" => {
                let forecaster = Forecaster::from_name(args.text("kind")?, &args.extra)?;
                let name = args.text("name")?.to_string();
                let (net, rng) = self.network_and_rng(args.text("network")?)?;
                let n = add_forecast(net, &name, &forecaster, rng)?;
                Ok(format!("forecast {name} added to {n} matches"))
            }
            "create_bookmaker" => {
                let name = args.text("name")?;
                let bookmaker = Bookmaker::from_params(name, &args.extra)?;
                self.bookmakers.insert(name.to_string(), bookmaker);
                Ok(format!("bookmaker {name} created"))
            }
            "add_odds" => {
                let bookmaker = self.lookup_bookmaker(args.text("bookmaker")?)?.clone();
                let forecast = args.text("forecast")?.to_string();
                let (net, rng) = self.network_and_rng(args.text("network")?)?;
                let n = add_odds(net, &bookmaker, &forecast, rng)?;
                Ok(format!("{} quoted {n} matches", bookmaker.name))
            }
            "create_betting_strategy" => {
                let name = args.text("name")?;
                let strategy = BettingStrategy::from_params(name, &args.extra)?;
                self.bettors.insert(name.to_string(), strategy);
                Ok(format!("betting strategy {name} created"))
            }
            "add_bets" => {
                let strategy = self.lookup_bettor(args.text("bettor")?)?.clone();
                let (net, rng) = self.network_and_rng(args.text("network")?)?;
                let n = add_bets(net, &strategy, rng)?;
                Ok(format!("{} staked on {n} matches", strategy.name))
            }
            "evaluate" => self.evaluate(args),
            other => Err(SimError::lookup(format!("no handler for `{other}`"))),
        }
    }

    fn create_network(&mut self, args: &Args) -> Result<String> {
        let name = args.text("name")?;
        let teams = args.opt_u32("teams")?.unwrap_or(0);
        let rounds = args.opt_u32("rounds")?;
        let days = args.opt_u32("days")?.unwrap_or(1);
        let seasons = args.opt_u32("seasons")?.unwrap_or(1).max(1);

        let mut network = schedule::generate(name, teams, rounds, days, 0)?;
        let ids = network.team_ids();
        for season in 1..seasons {
            let first_day = network.last_day().unwrap_or(0) + days.max(1);
            schedule::add_season(&mut network, &ids, rounds, days, season, first_day)?;
        }
        let mut message = format!(
            "network {name}: {teams} competitors, {} matches",
            network.match_count()
        );
        if let Some(kind) = args.opt_text("filter") {
            let filter = ScheduleFilter::from_name(kind, &args.extra)?;
            let active = filter.apply(&mut network, None, &mut self.rng)?;
            message.push_str(&format!(", {active} active after {kind} filter"));
        } else {
            args.extra.expect_only("create_network", &[])?;
        }
        self.insert_network(network);
        Ok(message)
    }

    fn import(&mut self, args: &Args) -> Result<String> {
        let name = args.text("name")?;
        let path = Path::new(args.text("path")?);
        let mapping = match args.opt_text("mapping") {
            Some(p) => serde_json::from_str(&std::fs::read_to_string(p)?)?,
            None => FieldMapping::default(),
        };
        let text = std::fs::read_to_string(path)?;
        let rows = match file_format(args.opt_text("format"), path).as_str() {
            "json" => import::rows_from_json(&text)?,
            "csv" => import::parse_csv(&text)?,
            other => return Err(SimError::config(format!("cannot import {other} files"))),
        };
        let network = import::import_rows(name, &rows, &mapping)?;
        let message = format!(
            "imported {name}: {} competitors, {} matches",
            network.team_count(),
            network.match_count()
        );
        self.insert_network(network);
        Ok(message)
    }

    fn export(&mut self, args: &Args) -> Result<String> {
        let net = self.lookup_network(args.text("network")?)?;
        let path = Path::new(args.text("path")?);
        let rows = match file_format(args.opt_text("format"), path).as_str() {
            "xlsx" => export::write_xlsx(path, net)?,
            "csv" => export::write_csv(path, net)?,
            other => return Err(SimError::config(format!("cannot export {other} files"))),
        };
        Ok(format!("exported {rows} matches to {}", path.display()))
    }

    fn save(&mut self, args: &Args) -> Result<String> {
        let name = args.text("network")?;
        let net = self
            .networks
            .get(name)
            .ok_or_else(|| SimError::lookup(format!("no network named {name}")))?;
        let conn = self
            .store
            .as_mut()
            .ok_or_else(|| SimError::config("no store configured (set LEAGUE_SIM_DB or --db)"))?;
        let summary = store::save_network(conn, net)?;
        Ok(format!(
            "saved {name}: {} rows inserted, {} already present",
            summary.inserted, summary.skipped
        ))
    }

    fn load(&mut self, args: &Args) -> Result<String> {
        let name = args.text("name")?;
        let conn = self
            .store
            .as_ref()
            .ok_or_else(|| SimError::config("no store configured (set LEAGUE_SIM_DB or --db)"))?;
        let network = store::load_network(conn, name)?;
        let message = format!("loaded {name}: {} matches", network.match_count());
        self.insert_network(network);
        Ok(message)
    }

    fn print(&self, args: &Args) -> Result<String> {
        let Some(name) = args.opt_text("network") else {
            if self.networks.is_empty() {
                return Ok("no networks".to_string());
            }
            return Ok(self
                .networks
                .values()
                .map(summary_line)
                .collect::<Vec<_>>()
                .join("\n"));
        };
        let net = self.lookup_network(name)?;
        let mut out = summary_line(net);
        for season in net.seasons() {
            out.push_str(&format!(
                "\n  season {season}: {} rounds, {} competitors",
                net.rounds_in_season(season),
                net.members(season).len()
            ));
        }
        let ratings: Vec<String> = net.rating_names().into_iter().collect();
        let forecasts: Vec<String> = net.forecast_names().into_iter().collect();
        out.push_str(&format!(
            "\n  ratings: [{}]\n  forecasts: [{}]",
            ratings.join(", "),
            forecasts.join(", ")
        ));
        Ok(out)
    }

    fn evaluate(&mut self, args: &Args) -> Result<String> {
        let name = args.text("network")?.to_string();
        let bettor = args
            .opt_text("bettor")
            .map(|b| self.lookup_bettor(b).cloned())
            .transpose()?;
        let true_forecast = args.opt_text("true_forecast").unwrap_or("true").to_string();
        let only = args.opt_text("forecast").map(str::to_string);
        let net = self
            .networks
            .get_mut(&name)
            .ok_or_else(|| SimError::lookup(format!("no network named {name}")))?;

        let mut lines = Vec::new();
        let names: Vec<String> = match only {
            Some(f) => vec![f],
            None if bettor.is_some() => Vec::new(),
            None => net.forecast_names().into_iter().collect(),
        };
        for forecast in names {
            let s = evaluate_forecast(net, &forecast)?;
            lines.push(format!(
                "{}: rps {:.4}, likelihood {:.4} ({} matches)",
                s.forecast, s.mean_rps, s.mean_likelihood, s.samples
            ));
        }
        if let Some(strategy) = bettor {
            let s = evaluate_bettor(net, &strategy, &true_forecast)?;
            lines.push(format!(
                "{}: {} bets, stake {:.3}, expected {:.4}, actual {:.4}, roi {:.4}",
                s.bettor, s.bets, s.total_stake, s.expected_return, s.actual_return, s.roi
            ));
        }
        Ok(lines.join("\n"))
    }

    fn lookup_network(&self, name: &str) -> Result<&Network> {
        self.networks
            .get(name)
            .ok_or_else(|| SimError::lookup(format!("no network named {name}")))
    }

    fn lookup_bookmaker(&self, name: &str) -> Result<&Bookmaker> {
        self.bookmakers
            .get(name)
            .ok_or_else(|| SimError::lookup(format!("no bookmaker named {name}")))
    }

    fn lookup_bettor(&self, name: &str) -> Result<&BettingStrategy> {
        self.bettors
            .get(name)
            .ok_or_else(|| SimError::lookup(format!("no betting strategy named {name}")))
    }

    fn network_and_rng(&mut self, name: &str) -> Result<(&mut Network, &mut StdRng)> {
        let net = self
            .networks
            .get_mut(name)
            .ok_or_else(|| SimError::lookup(format!("no network named {name}")))?;
        Ok((net, &mut self.rng))
    }
}

fn summary_line(net: &Network) -> String {
    format!(
        "{} ({}): {} competitors, {} matches, {} seasons",
        net.name,
        net.kind,
        net.team_count(),
        net.match_count(),
        net.seasons().len()
    )
}

fn file_format(explicit: Option<&str>, path: &Path) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| path.extension().and_then(|e| e.to_str()).map(str::to_string))
        .unwrap_or_else(|| "csv".to_string())
        .to_ascii_lowercase()
}
