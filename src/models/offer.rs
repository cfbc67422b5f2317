//! Resource offers and the operations performed against them.

use super::task::TaskInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(String);

impl OfferId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A time-boxed bundle of resources on one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: String,
    pub hostname: String,
    /// Scalar resources by name (`cpus`, `mem`, `disk`, ...)
    pub resources: BTreeMap<String, f64>,
}

impl Offer {
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        Self {
            id: OfferId::new(id),
            hostname: agent_id.clone(),
            agent_id,
            resources: BTreeMap::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: f64) -> Self {
        self.resources.insert(name.into(), value);
        self
    }

    pub fn scalar(&self, name: &str) -> f64 {
        self.resources.get(name).copied().unwrap_or(0.0)
    }
}

/// A cluster operation recommended by the offer evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Launch a task. Transient launches only exist to hold a reservation and
    /// are never tracked by the step that requested them.
    Launch { task: TaskInfo, transient: bool },
    Reserve { resource: String, amount: f64 },
    Unreserve { resource: String, amount: f64 },
    CreateVolume { volume: String },
    DestroyVolume { volume: String },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Launch { .. } => "LAUNCH",
            Self::Reserve { .. } => "RESERVE",
            Self::Unreserve { .. } => "UNRESERVE",
            Self::CreateVolume { .. } => "CREATE",
            Self::DestroyVolume { .. } => "DESTROY",
        }
    }

    /// The launched task, for non-transient launches only
    pub fn launched_task(&self) -> Option<&TaskInfo> {
        match self {
            Self::Launch {
                task,
                transient: false,
            } => Some(task),
            _ => None,
        }
    }
}

/// One operation bound to the offer it consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRecommendation {
    pub offer_id: OfferId,
    pub agent_id: String,
    pub operation: Operation,
}

impl OfferRecommendation {
    pub fn new(offer: &Offer, operation: Operation) -> Self {
        Self {
            offer_id: offer.id.clone(),
            agent_id: offer.agent_id.clone(),
            operation,
        }
    }

    pub fn launch(offer: &Offer, task: TaskInfo) -> Self {
        Self::new(
            offer,
            Operation::Launch {
                task,
                transient: false,
            },
        )
    }
}
