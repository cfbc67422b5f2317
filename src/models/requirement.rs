//! Resource requirements produced for steps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a requirement relates to resources the service already holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryType {
    /// Not a recovery: a regular deployment launch
    None,
    /// Resources are still reserved; relaunch in place
    Transient,
    /// Resources are gone; a fresh reservation is needed
    Permanent,
}

impl fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Transient => "TRANSIENT",
            Self::Permanent => "PERMANENT",
        };
        f.write_str(name)
    }
}

/// What a step asks the offer evaluator for. The resource payload is opaque to
/// the scheduling core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// `<pod-type>-<index>`
    pub pod_instance: String,
    /// Short task names within the pod to launch
    pub tasks_to_launch: Vec<String>,
    pub recovery_type: RecoveryType,
    pub environment: BTreeMap<String, String>,
    pub resources: serde_json::Value,
}

impl ResourceRequirement {
    pub fn new<I, S>(pod_instance: impl Into<String>, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pod_instance: pod_instance.into(),
            tasks_to_launch: tasks.into_iter().map(Into::into).collect(),
            recovery_type: RecoveryType::None,
            environment: BTreeMap::new(),
            resources: serde_json::Value::Null,
        }
    }

    pub fn with_recovery_type(mut self, recovery_type: RecoveryType) -> Self {
        self.recovery_type = recovery_type;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_resources(mut self, resources: serde_json::Value) -> Self {
        self.resources = resources;
        self
    }

    /// Full task instance names, `<pod-instance>-<task>`
    pub fn task_instance_names(&self) -> Vec<String> {
        self.tasks_to_launch
            .iter()
            .map(|task| format!("{}-{}", self.pod_instance, task))
            .collect()
    }

    /// Canonical step name for this requirement: `<pod-instance>:[task, ...]`
    pub fn step_name(&self) -> String {
        step_name(&self.pod_instance, &self.tasks_to_launch)
    }
}

pub fn step_name(pod_instance: &str, tasks: &[String]) -> String {
    format!("{}:[{}]", pod_instance, tasks.join(", "))
}
