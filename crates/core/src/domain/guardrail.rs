use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Numeric constraints a lever-implied price must satisfy. One set per
/// experiment; persisted as an upsert keyed by the experiment id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailSet {
    pub price_floor: Decimal,
    pub price_ceiling: Decimal,
    pub max_change_pct: Decimal,
}

impl GuardrailSet {
    pub fn new(price_floor: Decimal, price_ceiling: Decimal, max_change_pct: Decimal) -> Self {
        Self { price_floor, price_ceiling, max_change_pct }
    }
}
