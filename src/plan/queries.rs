//! Administrative operations over the coordinator's plans.
//!
//! Thin translations onto plan, phase and step operations. Presentation
//! (HTTP codes, CLI exit codes) belongs to the caller.

use super::{Element, Phase, Plan, PlanCoordinator, PlanInfo, Step};
use crate::error::{Result, SchedulerError};
use std::sync::Arc;
use tracing::info;

/// Names of every managed plan, in priority order
pub fn list(coordinator: &PlanCoordinator) -> Vec<String> {
    coordinator.managers().iter().map(|m| m.name()).collect()
}

pub fn get(coordinator: &PlanCoordinator, plan_name: &str) -> Result<PlanInfo> {
    let plan = find_plan(coordinator, plan_name)?;
    Ok(PlanInfo::from(plan.as_ref()))
}

/// Interrupt a whole plan, or one phase within it
pub fn interrupt(coordinator: &PlanCoordinator, plan_name: &str, phase_name: Option<&str>) -> Result<()> {
    let plan = find_plan(coordinator, plan_name)?;
    match phase_name {
        Some(phase_name) => find_phase(&plan, phase_name)?.interrupt(),
        None => plan.interrupt(),
    }
    Ok(())
}

pub fn proceed(coordinator: &PlanCoordinator, plan_name: &str, phase_name: Option<&str>) -> Result<()> {
    let plan = find_plan(coordinator, plan_name)?;
    match phase_name {
        Some(phase_name) => find_phase(&plan, phase_name)?.proceed(),
        None => plan.proceed(),
    }
    Ok(())
}

/// Release the next canary step. Without a phase name, the first phase waiting
/// on approval is used.
pub fn approve_canary(coordinator: &PlanCoordinator, plan_name: &str, phase_name: Option<&str>) -> Result<()> {
    let plan = find_plan(coordinator, plan_name)?;
    let phase = match phase_name {
        Some(phase_name) => find_phase(&plan, phase_name)?,
        None => plan
            .phases()
            .iter()
            .find(|phase| {
                let steps: Vec<&dyn Element> =
                    phase.steps().iter().map(|s| s.as_ref() as &dyn Element).collect();
                phase.strategy().awaiting_approval(&steps)
            })
            .cloned()
            .ok_or_else(|| {
                SchedulerError::InvalidState(format!("no phase of plan {plan_name} is awaiting approval"))
            })?,
    };

    if !phase.approve() {
        return Err(SchedulerError::InvalidState(format!(
            "phase {} of plan {plan_name} holds no step back for approval",
            phase.name()
        )));
    }
    info!(plan = %plan_name, phase = %phase.name(), "Canary approved");
    Ok(())
}

pub fn force_complete(
    coordinator: &PlanCoordinator,
    plan_name: &str,
    phase_name: &str,
    step_name: &str,
) -> Result<()> {
    let plan = find_plan(coordinator, plan_name)?;
    let phase = find_phase(&plan, phase_name)?;
    find_step(&phase, plan_name, step_name)?.force_complete();
    Ok(())
}

/// Restart a plan, a phase, or a single step, depending on which names are given
pub fn restart(
    coordinator: &PlanCoordinator,
    plan_name: &str,
    phase_name: Option<&str>,
    step_name: Option<&str>,
) -> Result<()> {
    let plan = find_plan(coordinator, plan_name)?;
    match (phase_name, step_name) {
        (None, None) => plan.restart(),
        (Some(phase_name), None) => find_phase(&plan, phase_name)?.restart(),
        (Some(phase_name), Some(step_name)) => {
            let phase = find_phase(&plan, phase_name)?;
            find_step(&phase, plan_name, step_name)?.restart();
        }
        (None, Some(step_name)) => plan
            .find_step(None, step_name)
            .ok_or_else(|| SchedulerError::element_not_found(plan_name, step_name))?
            .restart(),
    }
    Ok(())
}

fn find_plan(coordinator: &PlanCoordinator, plan_name: &str) -> Result<Arc<Plan>> {
    coordinator
        .manager(plan_name)
        .map(|m| m.plan())
        .ok_or_else(|| SchedulerError::PlanNotFound(plan_name.to_string()))
}

fn find_phase(plan: &Plan, phase_name: &str) -> Result<Arc<Phase>> {
    plan.phase(phase_name)
        .ok_or_else(|| SchedulerError::element_not_found(plan.name(), phase_name))
}

fn find_step(phase: &Phase, plan_name: &str, step_name: &str) -> Result<Arc<Step>> {
    phase
        .step(step_name)
        .ok_or_else(|| SchedulerError::element_not_found(plan_name, step_name))
}
