use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::experiment::{SkuId, StoreId};

/// A date-ranged retail price for a (SKU, store) pair. Read-only to the
/// validator and the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePrice {
    pub sku_id: SkuId,
    pub store_id: StoreId,
    pub price: Decimal,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
}

impl ReferencePrice {
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        effective_on(self.effective_from, self.effective_until, date)
    }
}

/// A date-ranged unit cost for a SKU (cost is store-independent).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCost {
    pub sku_id: SkuId,
    pub cost: Decimal,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
}

impl ReferenceCost {
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        effective_on(self.effective_from, self.effective_until, date)
    }
}

/// Effective on D means from <= D and (until absent or until >= D).
fn effective_on(from: NaiveDate, until: Option<NaiveDate>, date: NaiveDate) -> bool {
    from <= date && until.map_or(true, |until| until >= date)
}
