//! Approval workflow over draft experiments: guardrail configuration,
//! submission with the lever-consistency check, and the approve/reject
//! decisions. Every outcome, including rejected transitions, lands in
//! the audit trail.

use chrono::NaiveDate;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::experiment::{Experiment, ExperimentId, ExperimentStatus};
use crate::domain::guardrail::GuardrailSet;
use crate::errors::{ApplicationError, DomainError};
use crate::guardrails::{check_bounds, check_lever, LeverCheck};
use crate::lifecycle::{self, ExperimentAction};
use crate::storage::{ExperimentStore, ReferenceDataProvider};

const ACTOR: &str = "experiment-workflow";

pub struct ExperimentWorkflow<E, R, A> {
    experiments: E,
    reference: R,
    audit: A,
}

impl<E, R, A> ExperimentWorkflow<E, R, A>
where
    E: ExperimentStore,
    R: ReferenceDataProvider,
    A: AuditSink,
{
    pub fn new(experiments: E, reference: R, audit: A) -> Self {
        Self { experiments, reference, audit }
    }

    /// Attaches guardrails to a draft experiment. When a lever is
    /// already configured the lever price is cross-checked against the
    /// reference prices effective on `validated_on`; the check values
    /// are returned for display and recorded in the audit trail.
    pub async fn configure_guardrails(
        &self,
        experiment_id: &ExperimentId,
        guardrails: GuardrailSet,
        validated_on: NaiveDate,
    ) -> Result<Option<LeverCheck>, ApplicationError> {
        check_bounds(&guardrails)?;

        let mut experiment = self.load(experiment_id).await?;
        let check = match &experiment.lever {
            Some(lever) => {
                let prices =
                    self.reference.all_effective_prices(&lever.sku_id, validated_on).await?;
                Some(self.checked(experiment_id, &guardrails, lever, &prices)?)
            }
            None => None,
        };

        experiment.set_guardrails(guardrails)?;
        self.experiments.save(&experiment).await?;
        Ok(check)
    }

    /// Submits a draft for approval. The experiment must carry scope,
    /// lever, and guardrails, and the lever price must clear every
    /// guardrail against prices effective on `validated_on` before the
    /// status moves to PENDING_APPROVAL.
    pub async fn submit(
        &self,
        experiment_id: &ExperimentId,
        validated_on: NaiveDate,
    ) -> Result<LeverCheck, ApplicationError> {
        let experiment = self.load(experiment_id).await?;
        lifecycle::ensure_allowed(experiment.status, ExperimentAction::Submit)?;
        experiment.ensure_submittable()?;

        let lever = experiment.lever.as_ref().ok_or_else(|| {
            DomainError::MissingPrerequisite {
                reason: format!("experiment {experiment_id} has no lever"),
            }
        })?;
        let guardrails = experiment.guardrails.as_ref().ok_or_else(|| {
            DomainError::MissingPrerequisite {
                reason: format!("experiment {experiment_id} has no guardrails"),
            }
        })?;

        let prices = self.reference.all_effective_prices(&lever.sku_id, validated_on).await?;
        let check = self.checked(experiment_id, guardrails, lever, &prices)?;

        self.transition(&experiment, ExperimentAction::Submit).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(experiment_id.clone()),
                None,
                "experiment.submitted",
                AuditCategory::Lifecycle,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("base_price", check.base_price.to_string())
            .with_metadata("lever_price", check.lever_price.to_string())
            .with_metadata("change_pct", check.change_pct.to_string()),
        );
        Ok(check)
    }

    pub async fn approve(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<ExperimentStatus, ApplicationError> {
        self.decide(experiment_id, ExperimentAction::Approve).await
    }

    pub async fn reject(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<ExperimentStatus, ApplicationError> {
        self.decide(experiment_id, ExperimentAction::Reject).await
    }

    async fn decide(
        &self,
        experiment_id: &ExperimentId,
        action: ExperimentAction,
    ) -> Result<ExperimentStatus, ApplicationError> {
        let experiment = self.load(experiment_id).await?;
        let target = self.transition(&experiment, action).await?;
        let event_type = match action {
            ExperimentAction::Approve => "experiment.approved",
            ExperimentAction::Reject => "experiment.rejected",
            _ => "experiment.transitioned",
        };
        self.audit.emit(AuditEvent::new(
            Some(experiment_id.clone()),
            None,
            event_type,
            AuditCategory::Lifecycle,
            ACTOR,
            AuditOutcome::Success,
        ));
        Ok(target)
    }

    async fn load(&self, experiment_id: &ExperimentId) -> Result<Experiment, ApplicationError> {
        self.experiments.find(experiment_id).await?.ok_or_else(|| {
            DomainError::MissingPrerequisite {
                reason: format!("experiment {experiment_id} not found"),
            }
            .into()
        })
    }

    /// Validates and applies a lifecycle transition through the
    /// compare-and-set, auditing the rejection when either step fails.
    async fn transition(
        &self,
        experiment: &Experiment,
        action: ExperimentAction,
    ) -> Result<ExperimentStatus, ApplicationError> {
        let target = match lifecycle::apply(experiment.status, action) {
            Ok(target) => target,
            Err(error) => {
                self.emit_rejected(&experiment.id, action, &error.to_string());
                return Err(error.into());
            }
        };

        let moved = self
            .experiments
            .transition_status(&experiment.id, experiment.status, target)
            .await?;
        if !moved {
            // Report the stored status, not the read the caller acted on.
            let current = self
                .experiments
                .find(&experiment.id)
                .await?
                .map(|latest| latest.status)
                .unwrap_or(experiment.status);
            let error = DomainError::InvalidState {
                current,
                action,
                allowed: action.allowed_sources().to_vec(),
            };
            self.emit_rejected(&experiment.id, action, &error.to_string());
            return Err(error.into());
        }
        Ok(target)
    }

    fn checked(
        &self,
        experiment_id: &ExperimentId,
        guardrails: &GuardrailSet,
        lever: &crate::domain::lever::Lever,
        prices: &[rust_decimal::Decimal],
    ) -> Result<LeverCheck, DomainError> {
        match check_lever(guardrails, lever, prices) {
            Ok(check) => {
                self.audit.emit(
                    AuditEvent::new(
                        Some(experiment_id.clone()),
                        None,
                        "guardrail.validated",
                        AuditCategory::Guardrail,
                        ACTOR,
                        AuditOutcome::Success,
                    )
                    .with_metadata("base_price", check.base_price.to_string())
                    .with_metadata("lever_price", check.lever_price.to_string())
                    .with_metadata("change_pct", check.change_pct.to_string()),
                );
                Ok(check)
            }
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        Some(experiment_id.clone()),
                        None,
                        "guardrail.violated",
                        AuditCategory::Guardrail,
                        ACTOR,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                Err(error)
            }
        }
    }

    fn emit_rejected(&self, experiment_id: &ExperimentId, action: ExperimentAction, message: &str) {
        self.audit.emit(
            AuditEvent::new(
                Some(experiment_id.clone()),
                None,
                "lifecycle.rejected",
                AuditCategory::Lifecycle,
                ACTOR,
                AuditOutcome::Rejected,
            )
            .with_metadata("action", action.verb().to_string())
            .with_metadata("error", message.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::experiment::{
        Experiment, ExperimentId, ExperimentStatus, ScopeEntry, SkuId, StoreId,
    };
    use crate::domain::guardrail::GuardrailSet;
    use crate::domain::lever::Lever;
    use crate::domain::reference::ReferencePrice;
    use crate::errors::{ApplicationError, DomainError};
    use crate::storage::{ExperimentStore, InMemoryExperimentStore, InMemoryReferenceData};

    use super::ExperimentWorkflow;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn money(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn draft_experiment() -> Experiment {
        let mut experiment = Experiment::new(
            ExperimentId("exp-1".to_string()),
            "cola winter discount".to_string(),
            date(2026, 2, 1),
            date(2026, 2, 5),
        )
        .expect("valid window");
        experiment
            .add_scope_entry(ScopeEntry {
                store_id: StoreId("store-1".to_string()),
                sku_id: SkuId("sku-cola".to_string()),
                is_test_group: true,
            })
            .expect("scope");
        experiment
            .set_lever(
                Lever::price_discount(SkuId("sku-cola".to_string()), Decimal::from(10))
                    .expect("lever"),
            )
            .expect("set lever");
        experiment
            .set_guardrails(GuardrailSet::new(money(5000), money(15000), Decimal::from(20)))
            .expect("guardrails");
        experiment
    }

    fn reference_data() -> InMemoryReferenceData {
        let reference = InMemoryReferenceData::default();
        reference.add_price(ReferencePrice {
            sku_id: SkuId("sku-cola".to_string()),
            store_id: StoreId("store-1".to_string()),
            price: money(10000),
            effective_from: date(2026, 1, 1),
            effective_until: None,
        });
        reference
    }

    fn workflow(
        experiments: InMemoryExperimentStore,
        reference: InMemoryReferenceData,
        audit: InMemoryAuditSink,
    ) -> ExperimentWorkflow<InMemoryExperimentStore, InMemoryReferenceData, InMemoryAuditSink>
    {
        ExperimentWorkflow::new(experiments, reference, audit)
    }

    #[tokio::test]
    async fn submit_moves_a_complete_draft_to_pending_approval() {
        let experiments = InMemoryExperimentStore::with_experiment(draft_experiment());
        let audit = InMemoryAuditSink::default();
        let workflow = workflow(experiments.clone(), reference_data(), audit.clone());

        let check = workflow
            .submit(&ExperimentId("exp-1".to_string()), date(2026, 1, 15))
            .await
            .expect("submit");
        assert_eq!(check.base_price, money(10000));
        assert_eq!(check.lever_price, money(9000));
        assert_eq!(check.change_pct, Decimal::from(10));

        let experiment = experiments
            .find(&ExperimentId("exp-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(experiment.status, ExperimentStatus::PendingApproval);

        let events = audit.events();
        assert!(events.iter().any(|event| event.event_type == "guardrail.validated"));
        assert!(events.iter().any(|event| event.event_type == "experiment.submitted"));
    }

    #[tokio::test]
    async fn submit_fails_when_the_lever_breaks_a_guardrail() {
        let mut experiment = draft_experiment();
        experiment
            .set_guardrails(GuardrailSet::new(money(9500), money(15000), Decimal::from(20)))
            .expect("tight floor");
        let experiments = InMemoryExperimentStore::with_experiment(experiment);
        let audit = InMemoryAuditSink::default();
        let workflow = workflow(experiments.clone(), reference_data(), audit.clone());

        let error = workflow
            .submit(&ExperimentId("exp-1".to_string()), date(2026, 1, 15))
            .await
            .expect_err("lever price 90.00 under floor 95.00");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::GuardrailViolation { .. })
        ));

        // Status unchanged; the violation is audited.
        let experiment = experiments
            .find(&ExperimentId("exp-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(experiment.status, ExperimentStatus::Draft);
        assert!(audit
            .events()
            .iter()
            .any(|event| event.event_type == "guardrail.violated"));
    }

    #[tokio::test]
    async fn submit_requires_scope_lever_and_guardrails() {
        let experiment = Experiment::new(
            ExperimentId("exp-empty".to_string()),
            "empty".to_string(),
            date(2026, 2, 1),
            date(2026, 2, 5),
        )
        .expect("valid window");
        let experiments = InMemoryExperimentStore::with_experiment(experiment);
        let workflow =
            workflow(experiments, reference_data(), InMemoryAuditSink::default());

        let error = workflow
            .submit(&ExperimentId("exp-empty".to_string()), date(2026, 1, 15))
            .await
            .expect_err("nothing configured");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::MissingPrerequisite { .. })
        ));
    }

    #[tokio::test]
    async fn approve_and_reject_only_apply_to_pending_experiments() {
        let mut experiment = draft_experiment();
        experiment.status = ExperimentStatus::PendingApproval;
        let experiments = InMemoryExperimentStore::with_experiment(experiment);
        let workflow =
            workflow(experiments.clone(), reference_data(), InMemoryAuditSink::default());

        let status =
            workflow.approve(&ExperimentId("exp-1".to_string())).await.expect("approve");
        assert_eq!(status, ExperimentStatus::Approved);

        // A second decision on the same experiment is now illegal.
        let error =
            workflow.reject(&ExperimentId("exp-1".to_string())).await.expect_err("already decided");
        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn reject_is_terminal() {
        let mut experiment = draft_experiment();
        experiment.status = ExperimentStatus::PendingApproval;
        let experiments = InMemoryExperimentStore::with_experiment(experiment);
        let workflow =
            workflow(experiments.clone(), reference_data(), InMemoryAuditSink::default());

        let status = workflow.reject(&ExperimentId("exp-1".to_string())).await.expect("reject");
        assert_eq!(status, ExperimentStatus::Rejected);
        assert!(status.is_terminal());
    }

    #[tokio::test]
    async fn configure_guardrails_without_a_lever_skips_the_cross_check() {
        let mut experiment = draft_experiment();
        experiment.lever = None;
        let experiments = InMemoryExperimentStore::with_experiment(experiment);
        let workflow =
            workflow(experiments.clone(), reference_data(), InMemoryAuditSink::default());

        let check = workflow
            .configure_guardrails(
                &ExperimentId("exp-1".to_string()),
                GuardrailSet::new(money(5000), money(15000), Decimal::from(20)),
                date(2026, 1, 15),
            )
            .await
            .expect("configure");
        assert!(check.is_none());
    }

    #[tokio::test]
    async fn configure_guardrails_rejects_inverted_bounds_before_touching_the_store() {
        let experiments = InMemoryExperimentStore::default();
        let workflow =
            workflow(experiments, reference_data(), InMemoryAuditSink::default());

        let error = workflow
            .configure_guardrails(
                &ExperimentId("exp-1".to_string()),
                GuardrailSet::new(money(15000), money(5000), Decimal::from(20)),
                date(2026, 1, 15),
            )
            .await
            .expect_err("floor above ceiling");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::InvalidGuardrail { .. })
        ));
    }
}
