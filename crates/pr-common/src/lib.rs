pub mod catalog;
pub mod db;
pub mod error;
pub mod geo;
pub mod logging;
pub mod matching;
pub mod queue;
pub mod run_id;
pub mod service;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::RecommendationError;
pub use matching::RankingStrategy;
pub use service::{RecommendationRequest, RecommendationService, RecommenderConfig};

/// Upper bound on the number of recommendations returned for one origin.
pub const MAX_RECOMMENDATIONS: usize = 3;

/// A catalog entry.
///
/// The wire names (`comuna`, `lat`, `lon`, `raw`) match what existing
/// callers send to the notification endpoint; the long names are accepted
/// as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Surrogate row id assigned by the catalog store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub external_id: i64,
    #[serde(default, rename = "comuna", alias = "commune")]
    pub commune: Option<String>,
    #[serde(default, rename = "lat", alias = "latitude")]
    pub latitude: Option<f64>,
    #[serde(default, rename = "lon", alias = "longitude")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub bedrooms: Option<i32>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, rename = "raw", alias = "metadata")]
    pub metadata: Option<Value>,
}

impl Property {
    /// `(latitude, longitude)` when both are present. Partial presence counts as absent.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Exact commune match. An unknown commune never matches anything, itself included.
    pub fn shares_commune_with(&self, other: &Property) -> bool {
        match (self.commune.as_deref(), other.commune.as_deref()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// One ranked match for an origin property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub property: Property,
    pub distance_km: f64,
    /// Distance in the standardized feature space; only set by the KNN ranker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_distance: Option<f64>,
}
