use axum::{Json, extract::State};
use pr_common::Property;
use pr_common::db::PropertyUpsertResponse;
use pr_common::geo::GeoPoint;
use tracing::info;

use crate::SharedState;
use crate::error::ApiError;

fn validate_property(property: &Property) -> Result<(), ApiError> {
    if let Some(price) = property.price {
        if !price.is_finite() || price < 0.0 {
            return Err(ApiError::BadRequest("price must be a non-negative number".into()));
        }
    }

    if let Some(point) = property.coordinates().map(GeoPoint::from) {
        if !point.is_valid() {
            return Err(ApiError::BadRequest(
                "lat must be within [-90, 90] and lon within [-180, 180]".into(),
            ));
        }
    }

    Ok(())
}

pub async fn list_properties(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Property>>, ApiError> {
    let properties = state.catalog.fetch_all(state.config.catalog_limit).await?;
    Ok(Json(properties))
}

/// Upsert a catalog entry by `external_id`.
pub async fn notify_property(
    State(state): State<SharedState>,
    Json(property): Json<Property>,
) -> Result<Json<PropertyUpsertResponse>, ApiError> {
    validate_property(&property)?;

    let response = state.catalog.upsert(&property).await?;
    info!(
        external_id = property.external_id,
        id = response.id,
        status = response.status.as_str(),
        "property notified"
    );

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_price_and_bad_coordinates() {
        let negative = Property {
            external_id: 1,
            price: Some(-1.0),
            ..Property::default()
        };
        assert!(matches!(validate_property(&negative), Err(ApiError::BadRequest(_))));

        let off_globe = Property {
            external_id: 2,
            latitude: Some(95.0),
            longitude: Some(0.0),
            ..Property::default()
        };
        assert!(matches!(validate_property(&off_globe), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn accepts_sparse_property() {
        let sparse = Property {
            external_id: 3,
            ..Property::default()
        };
        assert!(validate_property(&sparse).is_ok());
    }
}
