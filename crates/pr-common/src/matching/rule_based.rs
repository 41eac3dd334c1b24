use std::cmp::Ordering;

use tracing::{debug, warn};

use super::{Ranker, filter::eligible_candidates};
use crate::{
    MAX_RECOMMENDATIONS, Property, RecommendationError, RecommendationResult,
    geo::{GeoPoint, haversine_km},
};

/// Eligible candidates ordered by distance from the origin, then price, then id.
///
/// Candidates without both coordinates cannot be distance-scored and are
/// dropped; candidates with out-of-range coordinates are skipped with a warning.
#[derive(Debug, Clone)]
pub struct RuleBasedRanker {
    max_results: usize,
}

impl RuleBasedRanker {
    pub fn new(max_results: usize) -> Self {
        Self { max_results }
    }
}

impl Default for RuleBasedRanker {
    fn default() -> Self {
        Self::new(MAX_RECOMMENDATIONS)
    }
}

pub(crate) fn origin_point(origin: &Property) -> Result<Option<GeoPoint>, RecommendationError> {
    let Some(point) = origin.coordinates().map(GeoPoint::from) else {
        return Ok(None);
    };

    if !point.is_valid() {
        return Err(RecommendationError::InvalidCoordinate {
            external_id: origin.external_id,
            latitude: point.latitude,
            longitude: point.longitude,
        });
    }

    Ok(Some(point))
}

fn price_key(property: &Property) -> f64 {
    property.price.unwrap_or(f64::INFINITY)
}

fn compare_scored(a: &(&Property, f64), b: &(&Property, f64)) -> Ordering {
    a.1.total_cmp(&b.1)
        .then_with(|| price_key(a.0).total_cmp(&price_key(b.0)))
        .then_with(|| a.0.external_id.cmp(&b.0.external_id))
}

impl Ranker for RuleBasedRanker {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn rank(
        &self,
        origin: &Property,
        catalog: &[Property],
    ) -> Result<Vec<RecommendationResult>, RecommendationError> {
        let Some(from) = origin_point(origin)? else {
            debug!(
                origin_id = origin.external_id,
                "origin has no coordinates; nothing can be distance-ranked"
            );
            return Ok(Vec::new());
        };

        let candidates = eligible_candidates(origin, catalog);
        let eligible = candidates.len();

        let mut scored: Vec<(&Property, f64)> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let to = GeoPoint::from(candidate.coordinates()?);
                if !to.is_valid() {
                    warn!(
                        external_id = candidate.external_id,
                        latitude = to.latitude,
                        longitude = to.longitude,
                        "skipping candidate with invalid coordinates"
                    );
                    return None;
                }
                Some((candidate, haversine_km(from, to)))
            })
            .collect();

        scored.sort_by(compare_scored);
        scored.truncate(self.max_results);

        debug!(
            origin_id = origin.external_id,
            eligible,
            returned = scored.len(),
            "rule-based ranking finished"
        );

        Ok(scored
            .into_iter()
            .map(|(property, distance_km)| RecommendationResult {
                property: property.clone(),
                distance_km,
                similarity_distance: None,
            })
            .collect())
    }
}
