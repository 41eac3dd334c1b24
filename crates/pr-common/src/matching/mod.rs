pub mod feature_space;
pub mod filter;
pub mod normalize;
pub mod rule_based;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Property, RecommendationError, RecommendationResult};

pub use feature_space::FeatureSpaceRanker;
pub use filter::{eligible_candidates, is_eligible};
pub use normalize::FeatureNormalizer;
pub use rule_based::RuleBasedRanker;

/// Ranks candidates for an origin property.
///
/// Implementations receive a snapshot that still contains the origin and are
/// responsible for excluding it. Output is ordered best-first and already capped.
pub trait Ranker: Send + Sync {
    fn name(&self) -> &'static str;

    fn rank(
        &self,
        origin: &Property,
        catalog: &[Property],
    ) -> Result<Vec<RecommendationResult>, RecommendationError>;
}

/// Ranking strategy selected by the caller for one computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankingStrategy {
    /// Same commune and bedrooms, cheaper or equal price, nearest first.
    #[default]
    RuleBased,
    /// Nearest neighbours in standardized (lat, lon, price) space.
    #[serde(rename = "knn")]
    FeatureSpace {
        #[serde(default)]
        commune_filter: bool,
    },
}

impl RankingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingStrategy::RuleBased => "rule_based",
            RankingStrategy::FeatureSpace { .. } => "knn",
        }
    }

    pub fn ranker(&self, max_results: usize) -> Box<dyn Ranker> {
        match *self {
            RankingStrategy::RuleBased => Box::new(RuleBasedRanker::new(max_results)),
            RankingStrategy::FeatureSpace { commune_filter } => {
                Box::new(FeatureSpaceRanker::new(max_results, commune_filter))
            }
        }
    }

    /// Copy of this strategy with the KNN commune pre-filter overridden.
    /// Has no effect on the rule-based strategy, which always filters by commune.
    pub fn with_commune_filter(self, enabled: bool) -> Self {
        match self {
            RankingStrategy::FeatureSpace { .. } => RankingStrategy::FeatureSpace {
                commune_filter: enabled,
            },
            other => other,
        }
    }
}

impl fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ranking strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for RankingStrategy {
    type Err = UnknownStrategy;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rule_based" | "rule-based" | "rules" => Ok(RankingStrategy::RuleBased),
            "knn" | "feature_space" | "feature-space" => Ok(RankingStrategy::FeatureSpace {
                commune_filter: false,
            }),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}
