use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::guardrail::GuardrailSet;
use crate::domain::lever::Lever;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentId(pub String);

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(pub String);

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkuId(pub String);

impl std::fmt::Display for SkuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a pricing experiment. Completed, Failed, and
/// Rejected are terminal; a closed experiment is recreated, never
/// resubmitted in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    PendingApproval,
    Approved,
    Running,
    Completed,
    Failed,
    Rejected,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending_approval" => Some(Self::PendingApproval),
            "approved" => Some(Self::Approved),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Upper-case form used in operator-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One (store, SKU) pair included in an experiment, tagged as the test
/// or control group for reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub store_id: StoreId,
    pub sku_id: SkuId,
    pub is_test_group: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub name: String,
    pub status: ExperimentStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub scope: Vec<ScopeEntry>,
    pub lever: Option<Lever>,
    pub guardrails: Option<GuardrailSet>,
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    pub fn new(
        id: ExperimentId,
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, DomainError> {
        if end_date <= start_date {
            return Err(DomainError::InvariantViolation(format!(
                "end date {end_date} must be after start date {start_date}"
            )));
        }

        Ok(Self {
            id,
            name: name.into(),
            status: ExperimentStatus::Draft,
            start_date,
            end_date,
            scope: Vec::new(),
            lever: None,
            guardrails: None,
            created_at: Utc::now(),
        })
    }

    /// Inclusive day count of the experiment window.
    pub fn total_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    fn ensure_draft(&self, what: &str) -> Result<(), DomainError> {
        if self.status != ExperimentStatus::Draft {
            return Err(DomainError::InvariantViolation(format!(
                "{what} can only be changed while the experiment is in state DRAFT (currently {})",
                self.status
            )));
        }
        Ok(())
    }

    pub fn add_scope_entry(&mut self, entry: ScopeEntry) -> Result<(), DomainError> {
        self.ensure_draft("scope")?;

        let duplicate = self
            .scope
            .iter()
            .any(|existing| existing.store_id == entry.store_id && existing.sku_id == entry.sku_id);
        if duplicate {
            return Err(DomainError::InvariantViolation(format!(
                "scope already contains ({}, {})",
                entry.store_id, entry.sku_id
            )));
        }

        self.scope.push(entry);
        Ok(())
    }

    /// Sets or replaces the single lever. The lever SKU must already be
    /// in scope so the projection has rows to apply it to.
    pub fn set_lever(&mut self, lever: Lever) -> Result<(), DomainError> {
        self.ensure_draft("lever")?;

        let in_scope = self.scope.iter().any(|entry| entry.sku_id == lever.sku_id);
        if !in_scope {
            return Err(DomainError::MissingPrerequisite {
                reason: format!("lever SKU {} is not in the experiment scope", lever.sku_id),
            });
        }

        self.lever = Some(lever);
        Ok(())
    }

    /// Upserts the guardrail set (1:1 with the experiment). Bounds are
    /// validated by the guardrail validator before this is called.
    pub fn set_guardrails(&mut self, guardrails: GuardrailSet) -> Result<(), DomainError> {
        self.ensure_draft("guardrails")?;
        self.guardrails = Some(guardrails);
        Ok(())
    }

    /// Everything that must be configured before a submit is legal.
    pub fn ensure_submittable(&self) -> Result<(), DomainError> {
        if self.scope.is_empty() {
            return Err(DomainError::MissingPrerequisite {
                reason: "experiment has no scope entries".to_string(),
            });
        }
        if self.lever.is_none() {
            return Err(DomainError::MissingPrerequisite {
                reason: "experiment has no lever".to_string(),
            });
        }
        if self.guardrails.is_none() {
            return Err(DomainError::MissingPrerequisite {
                reason: "experiment has no guardrail set".to_string(),
            });
        }
        Ok(())
    }
}
