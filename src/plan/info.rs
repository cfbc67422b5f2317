//! Serializable read-only projection of a plan, for logs and the admin surface.

use super::{Element, Phase, Plan, Step};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub message: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub strategy: String,
    pub steps: Vec<StepInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanInfo {
    pub name: String,
    pub status: String,
    pub strategy: String,
    pub errors: Vec<String>,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub phases: Vec<PhaseInfo>,
}

impl From<&Step> for StepInfo {
    fn from(step: &Step) -> Self {
        Self {
            id: step.id(),
            name: step.name().to_string(),
            status: step.display_status(),
            message: step.message(),
            errors: step.errors(),
        }
    }
}

impl From<&Phase> for PhaseInfo {
    fn from(phase: &Phase) -> Self {
        Self {
            id: phase.id(),
            name: phase.name().to_string(),
            status: phase.status().to_string(),
            strategy: phase.strategy().name().to_string(),
            steps: phase.steps().iter().map(|s| StepInfo::from(s.as_ref())).collect(),
        }
    }
}

impl From<&Plan> for PlanInfo {
    fn from(plan: &Plan) -> Self {
        Self {
            name: plan.name().to_string(),
            status: plan.status().to_string(),
            strategy: plan.strategy().name().to_string(),
            errors: plan.errors(),
            total_steps: plan.total_steps(),
            completed_steps: plan.completed_steps(),
            phases: plan.phases().iter().map(|p| PhaseInfo::from(p.as_ref())).collect(),
        }
    }
}
