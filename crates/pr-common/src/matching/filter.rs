use crate::Property;

/// Business eligibility of `candidate` as an alternative to `origin`.
///
/// Same commune (unknown never matches), same bedroom count, both prices known
/// with the candidate not more expensive, and not the origin itself.
pub fn is_eligible(origin: &Property, candidate: &Property) -> bool {
    if candidate.external_id == origin.external_id {
        return false;
    }

    if !candidate.shares_commune_with(origin) {
        return false;
    }

    if candidate.bedrooms != origin.bedrooms {
        return false;
    }

    matches!(
        (candidate.price, origin.price),
        (Some(candidate_price), Some(origin_price)) if candidate_price <= origin_price
    )
}

/// Catalog entries eligible for `origin`, in snapshot order.
pub fn eligible_candidates<'a>(origin: &Property, catalog: &'a [Property]) -> Vec<&'a Property> {
    catalog
        .iter()
        .filter(|candidate| is_eligible(origin, candidate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Property {
        Property {
            external_id: 3001,
            commune: Some("Centro".into()),
            latitude: Some(-33.45),
            longitude: Some(-70.65),
            bedrooms: Some(2),
            price: Some(100_000.0),
            ..Property::default()
        }
    }

    fn candidate(external_id: i64) -> Property {
        Property {
            external_id,
            price: Some(95_000.0),
            ..origin()
        }
    }

    #[test]
    fn accepts_cheaper_property_in_same_commune() {
        assert!(is_eligible(&origin(), &candidate(3002)));
    }

    #[test]
    fn equal_price_is_allowed() {
        let mut same_price = candidate(3002);
        same_price.price = Some(100_000.0);
        assert!(is_eligible(&origin(), &same_price));
    }

    #[test]
    fn rejects_self_match() {
        assert!(!is_eligible(&origin(), &origin()));
    }

    #[test]
    fn rejects_other_commune_and_bedrooms() {
        let mut other_commune = candidate(3002);
        other_commune.commune = Some("Norte".into());
        assert!(!is_eligible(&origin(), &other_commune));

        let mut more_bedrooms = candidate(3003);
        more_bedrooms.bedrooms = Some(3);
        assert!(!is_eligible(&origin(), &more_bedrooms));
    }

    #[test]
    fn rejects_more_expensive_or_unpriced() {
        let mut pricier = candidate(3002);
        pricier.price = Some(120_000.0);
        assert!(!is_eligible(&origin(), &pricier));

        let mut unpriced = candidate(3003);
        unpriced.price = None;
        assert!(!is_eligible(&origin(), &unpriced));

        let mut unpriced_origin = origin();
        unpriced_origin.price = None;
        assert!(!is_eligible(&unpriced_origin, &candidate(3004)));
    }

    #[test]
    fn unknown_commune_on_both_sides_is_not_a_match() {
        let mut origin = origin();
        origin.commune = None;
        let mut candidate = candidate(3002);
        candidate.commune = None;

        assert!(!is_eligible(&origin, &candidate));
    }

    #[test]
    fn keeps_snapshot_order() {
        let catalog = vec![candidate(5), origin(), candidate(2), candidate(9)];
        let ids: Vec<_> = eligible_candidates(&origin(), &catalog)
            .iter()
            .map(|p| p.external_id)
            .collect();

        assert_eq!(ids, vec![5, 2, 9]);
    }
}
