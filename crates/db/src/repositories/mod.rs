use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use pricelab_core::errors::ApplicationError;

pub mod experiment;
pub mod reference;
pub mod simulation;

pub use experiment::SqlExperimentStore;
pub use reference::SqlReferenceData;
pub use simulation::SqlSimulationRunStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|err| {
        RepositoryError::Decode(format!("invalid {field} decimal '{value}': {err}"))
    })
}

pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::from_str(value)
        .map_err(|err| RepositoryError::Decode(format!("invalid {field} date '{value}': {err}")))
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {field} timestamp '{value}': {err}"))
    })
}
