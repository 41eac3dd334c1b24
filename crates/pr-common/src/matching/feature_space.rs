use tracing::{debug, warn};

use super::{
    Ranker,
    normalize::{FeatureNormalizer, euclidean},
    rule_based::origin_point,
};
use crate::{
    MAX_RECOMMENDATIONS, Property, RecommendationError, RecommendationResult,
    geo::{GeoPoint, haversine_km},
};

/// Number of features per row: latitude, longitude, price.
pub const FEATURE_COUNT: usize = 3;

/// k-nearest-neighbour ranking in standardized (latitude, longitude, price) space.
///
/// The origin is row 0 of the feature matrix and every remaining catalog entry
/// (optionally restricted to the origin's commune) is a candidate row. Absent
/// coordinates or price are fed in as `0.0`. Neighbours are returned by
/// ascending feature-space distance, ties broken by `external_id`.
#[derive(Debug, Clone)]
pub struct FeatureSpaceRanker {
    max_results: usize,
    commune_filter: bool,
}

impl FeatureSpaceRanker {
    pub fn new(max_results: usize, commune_filter: bool) -> Self {
        Self {
            max_results,
            commune_filter,
        }
    }

    fn candidates<'a>(&self, origin: &Property, catalog: &'a [Property]) -> Vec<&'a Property> {
        catalog
            .iter()
            .filter(|candidate| candidate.external_id != origin.external_id)
            .filter(|candidate| !self.commune_filter || candidate.shares_commune_with(origin))
            .filter(|candidate| match candidate.coordinates().map(GeoPoint::from) {
                Some(point) if !point.is_valid() => {
                    warn!(
                        external_id = candidate.external_id,
                        latitude = point.latitude,
                        longitude = point.longitude,
                        "skipping candidate with invalid coordinates"
                    );
                    false
                }
                _ => true,
            })
            .collect()
    }
}

impl Default for FeatureSpaceRanker {
    fn default() -> Self {
        Self::new(MAX_RECOMMENDATIONS, false)
    }
}

fn location_or_zero(property: &Property) -> GeoPoint {
    property
        .coordinates()
        .map(GeoPoint::from)
        .unwrap_or(GeoPoint::ORIGIN)
}

/// Raw feature row for a property, with `0.0` substituted for absent values.
pub fn feature_row(property: &Property) -> [f64; FEATURE_COUNT] {
    let location = location_or_zero(property);
    [
        location.latitude,
        location.longitude,
        property.price.unwrap_or(0.0),
    ]
}

impl Ranker for FeatureSpaceRanker {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn rank(
        &self,
        origin: &Property,
        catalog: &[Property],
    ) -> Result<Vec<RecommendationResult>, RecommendationError> {
        origin_point(origin)?;

        let candidates = self.candidates(origin, catalog);
        if candidates.is_empty() {
            debug!(
                origin_id = origin.external_id,
                commune_filter = self.commune_filter,
                "no knn candidates"
            );
            return Ok(Vec::new());
        }

        let rows: Vec<[f64; FEATURE_COUNT]> = std::iter::once(origin)
            .chain(candidates.iter().copied())
            .map(feature_row)
            .collect();
        let normalized = FeatureNormalizer::fit_transform(&rows);
        let anchor = normalized[0];

        let mut neighbours: Vec<(&Property, f64)> = candidates
            .iter()
            .zip(normalized.iter().skip(1))
            .map(|(candidate, row)| (*candidate, euclidean(&anchor, row)))
            .collect();

        neighbours.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.0.external_id.cmp(&b.0.external_id))
        });
        neighbours.truncate(self.max_results.min(candidates.len()));

        let from = location_or_zero(origin);

        debug!(
            origin_id = origin.external_id,
            candidates = candidates.len(),
            returned = neighbours.len(),
            commune_filter = self.commune_filter,
            "knn ranking finished"
        );

        Ok(neighbours
            .into_iter()
            .map(|(candidate, similarity)| RecommendationResult {
                property: candidate.clone(),
                distance_km: haversine_km(from, location_or_zero(candidate)),
                similarity_distance: Some(similarity),
            })
            .collect())
    }
}
