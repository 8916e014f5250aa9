pub mod config;
pub mod experiment;
pub mod export;
pub mod migrate;
pub mod report;
pub mod seed;
pub mod simulate;

use serde::Serialize;

use pricelab_core::audit::{AuditEvent, AuditSink};
use pricelab_core::config::{AppConfig, LoadOptions};
use pricelab_core::errors::ApplicationError;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Forwards workflow and simulation audit events to the tracing
/// pipeline so operator invocations leave a log trail.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            event_type = %event.event_type,
            experiment_id = event.experiment_id.as_ref().map(|id| id.0.as_str()),
            run_id = event.run_id.as_ref().map(|id| id.0.as_str()),
            actor = %event.actor,
            outcome = ?event.outcome,
            "audit event"
        );
    }
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Maps application errors onto the error-tuple shape used inside each
/// command's async block. Domain rejections exit 6, persistence exits 5.
pub(crate) fn app_error(error: ApplicationError) -> (&'static str, String, u8) {
    let (error_class, exit_code) = match &error {
        ApplicationError::Domain(_) => ("domain_rule", 6),
        ApplicationError::Persistence(_) => ("persistence", 5),
        ApplicationError::Configuration(_) => ("config_validation", 2),
    };
    (error_class, error.to_string(), exit_code)
}
