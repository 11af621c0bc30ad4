use rand::Rng;

use crate::elo::{self, EloConfig};
use crate::error::{Result, SimError};
use crate::network::Network;
use crate::params::Params;
use crate::true_rating::{self, TrueRatingConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum RatingModel {
    True(TrueRatingConfig),
    Elo(EloConfig),
    SplitElo(EloConfig),
}

impl RatingModel {
    pub const KINDS: &'static [&'static str] = &["true", "elo", "split_elo"];

    pub fn from_name(kind: &str, params: &Params) -> Result<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "true" | "trend" => Ok(RatingModel::True(TrueRatingConfig::from_params(params)?)),
            "elo" => Ok(RatingModel::Elo(EloConfig::from_params(params, false)?)),
            "split_elo" | "elo_split" => {
                Ok(RatingModel::SplitElo(EloConfig::from_params(params, true)?))
            }
            other => Err(SimError::config(format!(
                "unknown rating kind `{other}` (expected one of {})",
                Self::KINDS.join(", ")
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RatingModel::True(_) => "true",
            RatingModel::Elo(_) => "elo",
            RatingModel::SplitElo(_) => "split_elo",
        }
    }

    pub fn needs_results(&self) -> bool {
        !matches!(self, RatingModel::True(_))
    }

    pub fn compute<R: Rng + ?Sized>(&self, network: &mut Network, name: &str, rng: &mut R) -> Result<()> {
        match self {
            RatingModel::True(cfg) => true_rating::compute(network, name, cfg, rng),
            RatingModel::Elo(cfg) | RatingModel::SplitElo(cfg) => {
                elo::compute_elo(network, name, cfg)
            }
        }
    }
}
