pub mod betting;
pub mod bookmaker;
pub mod calibration;
pub mod config;
pub mod distribution;
pub mod elo;
pub mod error;
pub mod evaluation;
pub mod export;
pub mod filters;
pub mod forecast;
pub mod import;
pub mod league;
pub mod network;
pub mod params;
pub mod perturb;
pub mod rating;
pub mod records;
pub mod schedule;
pub mod session;
pub mod simulate;
pub mod store;
pub mod true_rating;

pub use error::{Result, SimError};
