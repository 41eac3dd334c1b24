use thiserror::Error;

/// Terminal failures of a single recommendation computation.
///
/// An empty candidate set is not an error; rankers return an empty list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecommendationError {
    #[error("no properties provided")]
    NoPropertiesProvided,
    #[error("property {property_id} not found in catalog snapshot")]
    OriginNotFound { property_id: i64 },
    #[error("property {external_id} has invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinate {
        external_id: i64,
        latitude: f64,
        longitude: f64,
    },
}

impl RecommendationError {
    pub fn code(&self) -> &'static str {
        match self {
            RecommendationError::NoPropertiesProvided => "no_properties_provided",
            RecommendationError::OriginNotFound { .. } => "origin_not_found",
            RecommendationError::InvalidCoordinate { .. } => "invalid_coordinate",
        }
    }

    /// String sentinel that legacy job consumers expect in the result slot.
    pub fn wire_marker(&self) -> &'static str {
        match self {
            RecommendationError::NoPropertiesProvided => "error: no properties provided",
            RecommendationError::OriginNotFound { .. } => "error: property not found",
            RecommendationError::InvalidCoordinate { .. } => "error: invalid coordinate",
        }
    }
}
