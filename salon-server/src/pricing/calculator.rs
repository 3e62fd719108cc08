//! Booking total calculator
//!
//! Uses rust_decimal for precise calculations, stores as f64.
//!
//! Two pricing modes:
//! - `RENT`: flat hourly rent, total = pricing_value x slot_count. Selected
//!   services do not affect the total.
//! - `PERCENT`: commission on services, total = sum(service prices) x
//!   pricing_value / 100.

use rust_decimal::prelude::*;

use shared::models::{PricingMode, ServiceOffering};

/// Rounding precision for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Convert f64 to Decimal for calculation
#[inline]
fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
#[inline]
fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Compute the booking total for a finalized selection.
///
/// Always recomputes from the inputs; callers must not add partial results
/// together across calls.
pub fn compute_total(
    mode: PricingMode,
    pricing_value: f64,
    slot_count: u32,
    offerings: &[ServiceOffering],
) -> f64 {
    let value = to_decimal(pricing_value);
    let total = match mode {
        PricingMode::Rent => value * Decimal::from(slot_count),
        PricingMode::Percent => {
            let service_sum: Decimal = offerings.iter().map(|o| to_decimal(o.price)).sum();
            service_sum * value / Decimal::ONE_HUNDRED
        }
    };
    to_f64(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offering(id: &str, price: f64) -> ServiceOffering {
        ServiceOffering {
            id: id.to_string(),
            name: format!("Service {id}"),
            owner_id: "owner-1".to_string(),
            price,
            duration_minutes: Some(60),
            is_active: true,
        }
    }

    #[test]
    fn test_rent_mode_multiplies_slot_count() {
        assert_eq!(compute_total(PricingMode::Rent, 50.0, 3, &[]), 150.00);
    }

    #[test]
    fn test_rent_mode_ignores_offerings() {
        let offerings = vec![offering("a", 200.0), offering("b", 35.5)];
        assert_eq!(compute_total(PricingMode::Rent, 50.0, 2, &offerings), 100.00);
    }

    #[test]
    fn test_percent_mode_single_offering() {
        let offerings = vec![offering("a", 200.0)];
        assert_eq!(compute_total(PricingMode::Percent, 20.0, 1, &offerings), 40.00);
    }

    #[test]
    fn test_percent_mode_sums_offerings() {
        let offerings = vec![offering("a", 80.0), offering("b", 45.0)];
        // (80 + 45) * 15 / 100 = 18.75
        assert_eq!(
            compute_total(PricingMode::Percent, 15.0, 4, &offerings),
            18.75
        );
    }

    #[test]
    fn test_percent_mode_no_offerings_is_zero() {
        assert_eq!(compute_total(PricingMode::Percent, 20.0, 3, &[]), 0.00);
    }

    #[test]
    fn test_rounding_half_up() {
        // 33.335 must round up to 33.34, not bankers-round to 33.33
        let offerings = vec![offering("a", 66.67)];
        assert_eq!(
            compute_total(PricingMode::Percent, 50.0, 1, &offerings),
            33.34
        );
    }

    #[test]
    fn test_fractional_rent() {
        // 12.345 * 2 = 24.69
        assert_eq!(compute_total(PricingMode::Rent, 12.345, 2, &[]), 24.69);
    }

    #[test]
    fn test_recompute_is_deterministic() {
        let offerings = vec![offering("a", 19.99), offering("b", 29.99)];
        let first = compute_total(PricingMode::Percent, 17.5, 2, &offerings);
        for _ in 0..100 {
            assert_eq!(
                compute_total(PricingMode::Percent, 17.5, 2, &offerings),
                first
            );
        }
    }

    #[test]
    fn test_zero_slots_rent_is_zero() {
        assert_eq!(compute_total(PricingMode::Rent, 50.0, 0, &[]), 0.00);
    }
}
