pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod guardrails;
pub mod lifecycle;
pub mod results;
pub mod sim;
pub mod storage;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};
pub use domain::experiment::{
    Experiment, ExperimentId, ExperimentStatus, ScopeEntry, SkuId, StoreId,
};
pub use domain::guardrail::GuardrailSet;
pub use domain::lever::{Lever, LeverKind};
pub use domain::reference::{ReferenceCost, ReferencePrice};
pub use domain::run::{DailyResult, RunId, RunStatus, RunTotals, SimulationRun, Variant};
pub use errors::{ApplicationError, DomainError};
pub use guardrails::{check_bounds, check_lever, LeverCheck};
pub use lifecycle::ExperimentAction;
pub use results::{
    breakdown_by_sku, breakdown_by_store, summarize, timeseries_by_date, to_csv, RunSummary,
    VariantPair, VariantTotals,
};
pub use sim::{project, Projection, ScopePricing, SimulationParams, SimulationRunner};
pub use storage::{ExperimentStore, ReferenceDataProvider, SimulationRunStore};
pub use workflow::ExperimentWorkflow;
