use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::experiment::{ExperimentId, SkuId, StoreId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// CONTROL carries baseline pricing; TEST carries the lever-discounted
/// pricing for the same store-SKU-day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Variant {
    Control,
    Test,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "CONTROL",
            Self::Test => "TEST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CONTROL" => Some(Self::Control),
            "TEST" => Some(Self::Test),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level totals, accumulated over every daily row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub control_units: i64,
    pub control_revenue: Decimal,
    pub control_margin: Decimal,
    pub test_units: i64,
    pub test_revenue: Decimal,
    pub test_margin: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub id: RunId,
    pub experiment_id: ExperimentId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub total_days: i64,
    pub totals: RunTotals,
    /// Unset when control revenue is zero; never computed by division
    /// through zero.
    pub revenue_lift_pct: Option<Decimal>,
}

/// One projected store-SKU-day outcome for one variant. Immutable once
/// written; the full set for a run is persisted atomically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyResult {
    pub run_id: RunId,
    pub date: NaiveDate,
    pub store_id: StoreId,
    pub sku_id: SkuId,
    pub variant: Variant,
    pub base_price: Decimal,
    pub simulated_price: Decimal,
    pub unit_cost: Decimal,
    pub units: i64,
    pub revenue: Decimal,
    pub cost: Decimal,
    pub margin: Decimal,
    pub baseline_units: i64,
    pub baseline_revenue: Decimal,
}

#[cfg(test)]
mod tests {
    use super::{RunStatus, Variant};

    #[test]
    fn run_status_round_trips() {
        let all =
            [RunStatus::Pending, RunStatus::Running, RunStatus::Completed, RunStatus::Failed];
        for status in all {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn variant_uses_upper_case_wire_form() {
        assert_eq!(Variant::Control.as_str(), "CONTROL");
        assert_eq!(Variant::parse("test"), Some(Variant::Test));
        assert_eq!(Variant::parse("baseline"), None);
    }
}
