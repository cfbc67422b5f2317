//! Error types for the offer scheduler.
//!
//! Business-level failures (a task crashing, a step that could not be built) are
//! reported through element status and error lists, not through this type. These
//! errors cover collaborator failures and invalid administrative requests.

use crate::config::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// No cluster driver has been registered yet.
    #[error("Not connected: no cluster driver is registered ({0})")]
    NotConnected(String),
    #[error("Driver error: {0}")]
    Driver(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Offer evaluation error: {0}")]
    Evaluation(String),
    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Plan not found: {0}")]
    PlanNotFound(String),
    #[error("Element not found: {element} in plan {plan}")]
    ElementNotFound { plan: String, element: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn element_not_found(plan: impl Into<String>, element: impl Into<String>) -> Self {
        Self::ElementNotFound {
            plan: plan.into(),
            element: element.into(),
        }
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected(_) | Self::Driver(_) | Self::Storage(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(error: serde_json::Error) -> Self {
        SchedulerError::Internal(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for SchedulerError {
    fn from(error: ConfigurationError) -> Self {
        SchedulerError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
