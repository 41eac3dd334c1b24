use std::{borrow::Cow, collections::HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    MAX_RECOMMENDATIONS, Property, RecommendationError, RecommendationResult,
    matching::RankingStrategy,
};

/// Input to one recommendation computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    /// Carried for correlation only.
    pub user_id: String,
    pub target_property_id: i64,
    #[serde(default)]
    pub catalog_snapshot: Vec<Property>,
    #[serde(default)]
    pub strategy: RankingStrategy,
}

/// Process-wide recommender settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommenderConfig {
    pub max_results: usize,
    pub default_strategy: RankingStrategy,
    /// Restrict KNN candidates to the origin's commune.
    pub knn_commune_filter: bool,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            max_results: MAX_RECOMMENDATIONS,
            default_strategy: RankingStrategy::RuleBased,
            knn_commune_filter: false,
        }
    }
}

impl RecommenderConfig {
    /// The strategy for one request: the caller's choice or the default, with
    /// the KNN commune pre-filter taken from the request or from this config.
    pub fn resolve_strategy(
        &self,
        requested: Option<RankingStrategy>,
        commune_filter: Option<bool>,
    ) -> RankingStrategy {
        requested
            .unwrap_or(self.default_strategy)
            .with_commune_filter(commune_filter.unwrap_or(self.knn_commune_filter))
    }
}

/// Stateless orchestrator: validates the snapshot, locates the origin and
/// dispatches to the ranker chosen by the request.
#[derive(Debug, Clone, Default)]
pub struct RecommendationService {
    config: RecommenderConfig,
}

/// First occurrence of each `external_id` wins. Borrows when there are no duplicates.
pub fn unique_by_external_id(snapshot: &[Property]) -> Cow<'_, [Property]> {
    let mut seen = HashSet::with_capacity(snapshot.len());
    if snapshot.iter().all(|p| seen.insert(p.external_id)) {
        return Cow::Borrowed(snapshot);
    }

    seen.clear();
    Cow::Owned(
        snapshot
            .iter()
            .filter(|p| seen.insert(p.external_id))
            .cloned()
            .collect(),
    )
}

impl RecommendationService {
    pub fn new(max_results: usize) -> Self {
        Self::with_config(RecommenderConfig {
            max_results,
            ..RecommenderConfig::default()
        })
    }

    /// `max_results` is clamped to `1..=MAX_RECOMMENDATIONS`.
    pub fn with_config(config: RecommenderConfig) -> Self {
        Self {
            config: RecommenderConfig {
                max_results: config.max_results.clamp(1, MAX_RECOMMENDATIONS),
                ..config
            },
        }
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn max_results(&self) -> usize {
        self.config.max_results
    }

    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            target_property_id = request.target_property_id,
            strategy = %request.strategy,
            catalog_size = request.catalog_snapshot.len(),
        )
    )]
    pub fn compute(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Vec<RecommendationResult>, RecommendationError> {
        self.compute_with(
            request.target_property_id,
            &request.catalog_snapshot,
            request.strategy,
        )
    }

    /// Same as [`compute`](Self::compute) without building a request.
    pub fn compute_with(
        &self,
        target_property_id: i64,
        catalog_snapshot: &[Property],
        strategy: RankingStrategy,
    ) -> Result<Vec<RecommendationResult>, RecommendationError> {
        if catalog_snapshot.is_empty() {
            return Err(RecommendationError::NoPropertiesProvided);
        }

        let catalog = unique_by_external_id(catalog_snapshot);
        if catalog.len() != catalog_snapshot.len() {
            debug!(
                duplicates = catalog_snapshot.len() - catalog.len(),
                "duplicate external ids in snapshot; keeping first occurrences"
            );
        }

        let origin = catalog
            .iter()
            .find(|p| p.external_id == target_property_id)
            .ok_or(RecommendationError::OriginNotFound {
                property_id: target_property_id,
            })?;

        strategy.ranker(self.max_results()).rank(origin, &catalog)
    }
}
