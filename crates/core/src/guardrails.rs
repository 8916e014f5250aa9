//! Guardrail validator. Two entry points: [`check_bounds`] is the pure
//! sanity check over a candidate guardrail set; [`check_lever`] cross
//! checks the lever-implied price against currently effective reference
//! prices. The caller supplies the prices (looked up as of the
//! validation clock, deliberately not the experiment window) and
//! records the returned [`LeverCheck`] values in the audit trail.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::guardrail::GuardrailSet;
use crate::domain::lever::{Lever, LeverKind};
use crate::errors::DomainError;

const MAX_CHANGE_CAP: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// Money values round to cents, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Percentage intermediates carry four decimal places, half-up.
pub fn round_pct(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Values computed during a successful lever-consistency check, returned
/// so callers can record them without recomputation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverCheck {
    pub base_price: Decimal,
    pub lever_price: Decimal,
    pub change_pct: Decimal,
}

pub fn check_bounds(guardrails: &GuardrailSet) -> Result<(), DomainError> {
    if guardrails.price_floor <= Decimal::ZERO {
        return Err(DomainError::InvalidGuardrail {
            reason: format!("price floor must be positive, got {}", guardrails.price_floor),
        });
    }
    if guardrails.price_ceiling <= Decimal::ZERO {
        return Err(DomainError::InvalidGuardrail {
            reason: format!("price ceiling must be positive, got {}", guardrails.price_ceiling),
        });
    }
    if guardrails.price_floor >= guardrails.price_ceiling {
        return Err(DomainError::InvalidGuardrail {
            reason: format!(
                "price floor {} must be below price ceiling {}",
                guardrails.price_floor, guardrails.price_ceiling
            ),
        });
    }
    if guardrails.max_change_pct <= Decimal::ZERO || guardrails.max_change_pct > MAX_CHANGE_CAP {
        return Err(DomainError::InvalidGuardrail {
            reason: format!(
                "max change percent must be in (0, 50], got {}",
                guardrails.max_change_pct
            ),
        });
    }
    Ok(())
}

/// Verifies the lever-implied price against the guardrails using the
/// minimum effective price across stores as the conservative base.
pub fn check_lever(
    guardrails: &GuardrailSet,
    lever: &Lever,
    effective_prices: &[Decimal],
) -> Result<LeverCheck, DomainError> {
    let discount_pct = match &lever.kind {
        LeverKind::PriceDiscount { discount_pct } => *discount_pct,
    };

    let base_price = effective_prices.iter().min().copied().ok_or_else(|| {
        DomainError::MissingReferenceData {
            reason: format!("no effective reference price for SKU {}", lever.sku_id),
        }
    })?;

    let lever_price =
        round_money(base_price * (Decimal::ONE - discount_pct / Decimal::from(100)));
    let change_pct =
        round_pct((lever_price - base_price).abs() / base_price * Decimal::from(100));

    if lever_price < guardrails.price_floor {
        return Err(DomainError::GuardrailViolation {
            reason: format!(
                "lever price {lever_price} is below price floor {}",
                guardrails.price_floor
            ),
        });
    }
    if lever_price > guardrails.price_ceiling {
        return Err(DomainError::GuardrailViolation {
            reason: format!(
                "lever price {lever_price} is above price ceiling {}",
                guardrails.price_ceiling
            ),
        });
    }
    if change_pct > guardrails.max_change_pct {
        return Err(DomainError::GuardrailViolation {
            reason: format!(
                "price change {change_pct}% exceeds max change {}%",
                guardrails.max_change_pct
            ),
        });
    }

    Ok(LeverCheck { base_price, lever_price, change_pct })
}
