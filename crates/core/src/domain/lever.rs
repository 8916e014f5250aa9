use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::experiment::SkuId;
use crate::errors::DomainError;

/// The pricing action under test. Closed sum type: matching on it is
/// exhaustive everywhere, so a new kind cannot silently fall through
/// the validator or the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeverKind {
    PriceDiscount { discount_pct: Decimal },
}

impl LeverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceDiscount { .. } => "price_discount",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lever {
    pub sku_id: SkuId,
    pub kind: LeverKind,
}

impl Lever {
    /// Builds a price-discount lever. The discount must sit in (0, 50].
    pub fn price_discount(sku_id: SkuId, discount_pct: Decimal) -> Result<Self, DomainError> {
        if discount_pct <= Decimal::ZERO || discount_pct > Decimal::from(50) {
            return Err(DomainError::InvariantViolation(format!(
                "discount percent must be in (0, 50], got {discount_pct}"
            )));
        }

        Ok(Self { sku_id, kind: LeverKind::PriceDiscount { discount_pct } })
    }

    pub fn discount_pct(&self) -> Decimal {
        match &self.kind {
            LeverKind::PriceDiscount { discount_pct } => *discount_pct,
        }
    }

    /// Rebuilds a lever from its storage form. Kinds this build does
    /// not know about are rejected rather than coerced.
    pub fn from_parts(
        kind: &str,
        sku_id: SkuId,
        discount_pct: Decimal,
    ) -> Result<Self, DomainError> {
        match kind {
            "price_discount" => Self::price_discount(sku_id, discount_pct),
            other => Err(DomainError::UnsupportedLeverKind { kind: other.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::experiment::SkuId;
    use crate::errors::DomainError;

    use super::Lever;

    fn sku() -> SkuId {
        SkuId("sku-cola".to_string())
    }

    #[test]
    fn accepts_discount_on_boundary() {
        let lever = Lever::price_discount(sku(), Decimal::from(50)).expect("50 is legal");
        assert_eq!(lever.discount_pct(), Decimal::from(50));
    }

    #[test]
    fn rejects_zero_and_oversized_discounts() {
        for raw in [Decimal::ZERO, Decimal::new(-10, 0), Decimal::new(5001, 2)] {
            let error = Lever::price_discount(sku(), raw).expect_err("out of range");
            assert!(matches!(error, DomainError::InvariantViolation(_)));
        }
    }

    #[test]
    fn kind_has_stable_storage_name() {
        let lever = Lever::price_discount(sku(), Decimal::from(10)).expect("valid");
        assert_eq!(lever.kind.as_str(), "price_discount");
    }

    #[test]
    fn from_parts_round_trips_the_storage_name() {
        let lever = Lever::from_parts("price_discount", sku(), Decimal::from(10)).expect("valid");
        assert_eq!(lever.discount_pct(), Decimal::from(10));
    }

    #[test]
    fn from_parts_rejects_unknown_kinds() {
        let error =
            Lever::from_parts("price_markup", sku(), Decimal::from(10)).expect_err("unknown kind");
        match error {
            DomainError::UnsupportedLeverKind { kind } => assert_eq!(kind, "price_markup"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
