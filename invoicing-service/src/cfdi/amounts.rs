//! IVA breakdown at the 16% general rate. All figures are rounded to two
//! decimals with round-half-up, and the subtotal + iva = total identity is
//! preserved by deriving one leg from the other two.

use anyhow::anyhow;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

const IVA_RATE_FACTOR: Decimal = Decimal::from_parts(116, 0, 0, false, 2); // 1.16
const IVA_RATE: Decimal = Decimal::from_parts(16, 0, 0, false, 2); // 0.16

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amounts {
    pub subtotal: Decimal,
    pub iva: Decimal,
    pub total: Decimal,
}

impl Amounts {
    /// Breaks a tax-inclusive charge into subtotal and IVA. The subtotal is
    /// rounded and the IVA absorbs the remainder, so the parts always sum
    /// back to the charged total exactly.
    pub fn from_total(total: Decimal) -> Result<Self, AppError> {
        if total <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow!(
                "Invoice total must be positive"
            )));
        }
        let total = round2(total);
        let subtotal = round2(total / IVA_RATE_FACTOR);
        let iva = total - subtotal;
        Ok(Self {
            subtotal,
            iva,
            total,
        })
    }

    /// Adds IVA on top of a tax-exclusive base.
    pub fn from_subtotal(subtotal: Decimal) -> Result<Self, AppError> {
        if subtotal <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow!(
                "Invoice subtotal must be positive"
            )));
        }
        let subtotal = round2(subtotal);
        let iva = round2(subtotal * IVA_RATE);
        let total = subtotal + iva;
        Ok(Self {
            subtotal,
            iva,
            total,
        })
    }
}

pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_tax_inclusive_total() {
        let a = Amounts::from_total(Decimal::new(1000, 2)).unwrap();
        assert_eq!(a.subtotal, Decimal::new(862, 2));
        assert_eq!(a.iva, Decimal::new(138, 2));
        assert_eq!(a.total, Decimal::new(1000, 2));
    }

    #[test]
    fn adds_iva_on_top_of_base() {
        let a = Amounts::from_subtotal(Decimal::new(10000, 2)).unwrap();
        assert_eq!(a.subtotal, Decimal::new(10000, 2));
        assert_eq!(a.iva, Decimal::new(1600, 2));
        assert_eq!(a.total, Decimal::new(11600, 2));
    }

    #[test]
    fn parts_always_sum_to_total() {
        for cents in [1i64, 99, 116, 999, 14900, 29999, 123456789] {
            let a = Amounts::from_total(Decimal::new(cents, 2)).unwrap();
            assert_eq!(a.subtotal + a.iva, a.total, "failed for {} cents", cents);
        }
    }

    #[test]
    fn rounds_half_up() {
        // exact .005 midpoints round away from zero
        assert_eq!(round2(Decimal::new(865, 3)), Decimal::new(87, 2));
        assert_eq!(round2(Decimal::new(8649, 4)), Decimal::new(86, 2));
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(Amounts::from_total(Decimal::ZERO).is_err());
        assert!(Amounts::from_total(Decimal::new(-100, 2)).is_err());
        assert!(Amounts::from_subtotal(Decimal::ZERO).is_err());
    }
}
