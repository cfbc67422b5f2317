mod common;

use common::*;
use offer_scheduler::config::{LaunchConstrainerMode, SchedulerConfig};
use offer_scheduler::framework::{OfferHandler, ServiceScheduler, ServiceSchedulerBuilder};
use offer_scheduler::models::{OfferId, StatusReason, TaskId, TaskInfo, TaskState, TaskStatus};
use offer_scheduler::plan::strategy::SerialStrategy;
use offer_scheduler::plan::{DefaultPlanManager, Element, PlanManager, Status};
use offer_scheduler::state::StateStore;
use offer_scheduler::SchedulerError;
use std::sync::Arc;

fn config() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.recovery.launch_constrainer = LaunchConstrainerMode::Unthrottled;
    config.revive.poll_interval_ms = 10;
    config.task_killer.retry_interval_ms = 10;
    config
}

fn deploy_manager() -> Arc<dyn PlanManager> {
    Arc::new(DefaultPlanManager::new(plan(
        "deploy",
        vec![phase("hello", &["hello-0"], Arc::new(SerialStrategy))],
    )))
}

fn build(harness: &Harness, deploy: Arc<dyn PlanManager>) -> Arc<ServiceScheduler> {
    ServiceSchedulerBuilder::new(
        config(),
        harness.store.clone(),
        Arc::new(ScalarEvaluator::default()),
    )
    .with_session(harness.session.clone())
    .with_plan_manager(deploy)
    .with_ordered_recovery()
    .build()
    .unwrap()
}

#[test]
fn test_invalid_config_rejected() {
    let harness = Harness::new();
    let mut config = config();
    config.revive.capacity = 0;
    config.revive.initial_tokens = 0;

    let result = ServiceSchedulerBuilder::new(
        config,
        harness.store.clone(),
        Arc::new(ScalarEvaluator::default()),
    )
    .build();
    assert!(matches!(result, Err(SchedulerError::Configuration(_))));
}

#[test]
fn test_recovery_manager_runs_after_registered_managers() {
    let harness = Harness::new();
    let scheduler = build(&harness, deploy_manager());
    let names: Vec<String> = scheduler
        .coordinator()
        .managers()
        .iter()
        .map(|m| m.name())
        .collect();
    assert_eq!(names, vec!["deploy", "recovery"]);
}

#[test]
fn test_registered_requests_revive() {
    let harness = Harness::new();
    let scheduler = build(&harness, deploy_manager());
    assert!(!scheduler.is_ready());

    scheduler.registered(harness.driver.clone()).unwrap();

    assert!(scheduler.is_ready());
    assert!(scheduler.revive_manager().is_revive_requested());
    assert!(scheduler.revive_manager().revive_if_requested().unwrap());
    assert_eq!(harness.driver.count(&DriverCall::Revive), 1);
}

#[test]
fn test_status_update_completes_plan_then_suppresses() {
    let harness = Harness::new();
    let deploy = deploy_manager();
    let scheduler = build(&harness, deploy.clone());
    scheduler.registered(harness.driver.clone()).unwrap();

    let consumed = scheduler.process_offers(&[offer("o-1", 1.0)]);
    assert_eq!(consumed, vec![OfferId::new("o-1")]);
    assert_eq!(harness.driver.count(&DriverCall::Suppress), 0);

    let task = harness.driver.launched_tasks().remove(0);
    scheduler.status_update(&running(&task)).unwrap();
    assert_eq!(deploy.plan().status(), Status::Complete);
    assert_eq!(
        harness.store.fetch_status(&task.name).unwrap().unwrap().state,
        TaskState::Running
    );

    assert!(scheduler.process_offers(&[offer("o-2", 1.0)]).is_empty());
    assert_eq!(harness.driver.count(&DriverCall::Suppress), 1);
    assert!(scheduler.revive_manager().is_suppressed());
}

#[test]
fn test_failed_task_recovered_on_next_offer() {
    let harness = Harness::new();
    let scheduler = build(&harness, deploy_manager());
    scheduler.registered(harness.driver.clone()).unwrap();
    scheduler.process_offers(&[offer("o-1", 1.0)]);
    let task = harness.driver.launched_tasks().remove(0);
    scheduler.status_update(&running(&task)).unwrap();
    scheduler.revive_manager().revive_if_requested().unwrap();

    scheduler.status_update(&failed(&task)).unwrap();
    assert!(scheduler.revive_manager().is_revive_requested());

    scheduler.process_offers(&[offer("o-2", 1.0)]);
    let launched = harness.driver.launched_tasks();
    assert_eq!(launched.len(), 2);
    assert_eq!(launched[1].name, task.name);

    let recovery_plan = scheduler.recovery_manager().plan();
    assert_eq!(recovery_plan.total_steps(), 1);
    assert_eq!(recovery_plan.status(), Status::InProgress);
}

#[test]
fn test_status_for_untracked_task_kills_it() {
    let harness = Harness::new();
    let scheduler = build(&harness, deploy_manager());
    scheduler.registered(harness.driver.clone()).unwrap();

    let ghost = TaskId::generate("ghost-0-server");
    scheduler
        .status_update(&TaskStatus::new(ghost.clone(), TaskState::Running))
        .unwrap();
    assert_eq!(harness.driver.kills(), vec![ghost.clone()]);

    // Terminal updates for untracked tasks need no kill.
    scheduler
        .status_update(&TaskStatus::new(TaskId::generate("ghost-1-server"), TaskState::Failed))
        .unwrap();
    assert_eq!(harness.driver.kills().len(), 1);
}

#[test]
fn test_unknown_task_status_breaks_kill_loop() {
    let harness = Harness::new();
    let scheduler = build(&harness, deploy_manager());
    scheduler.registered(harness.driver.clone()).unwrap();

    let id = TaskId::generate("hello-0-server");
    scheduler.task_killer().kill_task(&id).unwrap();

    let unknown = TaskStatus::new(id.clone(), TaskState::Lost).with_reason(StatusReason::Reconciliation);
    scheduler.status_update(&unknown).unwrap();
    assert!(scheduler.task_killer().is_kill_requested(&id));

    scheduler
        .status_update(&TaskStatus::new(id.clone(), TaskState::Killed))
        .unwrap();
    assert!(!scheduler.task_killer().is_kill_requested(&id));
}

#[tokio::test]
async fn test_offers_declined_until_registered() {
    let harness = Harness::new();
    let scheduler = build(&harness, deploy_manager());
    let processor = scheduler.start();

    processor.enqueue(vec![offer("o-1", 1.0)]);
    processor.await_offers_processed().await;

    assert_eq!(
        harness.driver.declines(),
        vec![(OfferId::new("o-1"), config().offers.short_decline_seconds)]
    );
    assert!(harness.driver.launched_tasks().is_empty());

    processor.shutdown().await;
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_offer_pipeline_launches_and_declines_leftovers() {
    let harness = Harness::new();
    let scheduler = build(&harness, deploy_manager());
    let processor = scheduler.start();
    scheduler.registered(harness.driver.clone()).unwrap();

    processor.enqueue(vec![offer("o-1", 1.0), offer("o-2", 0.5)]);
    processor.await_offers_processed().await;

    assert_eq!(harness.driver.launched_tasks().len(), 1);
    assert_eq!(
        harness.driver.declines(),
        vec![(OfferId::new("o-2"), config().offers.long_decline_seconds)]
    );

    processor.shutdown().await;
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_offers_declined_until_stored_tasks_reconciled() {
    let harness = Harness::new();
    let task = TaskInfo::new("hello-0-server", "hello-0");
    harness.store.store_tasks(&[task.clone()]).unwrap();
    harness.store.store_status(&task.name, &running(&task)).unwrap();

    let scheduler = build(&harness, deploy_manager());
    let processor = scheduler.start();
    scheduler.registered(harness.driver.clone()).unwrap();
    assert_eq!(harness.driver.reconciles(), vec![vec![task.task_id.clone()]]);

    processor.enqueue(vec![offer("o-1", 1.0)]);
    processor.await_offers_processed().await;
    assert_eq!(
        harness.driver.declines(),
        vec![(OfferId::new("o-1"), config().offers.short_decline_seconds)]
    );
    assert!(harness.driver.launched_tasks().is_empty());
    // Still inside the backoff window.
    assert_eq!(harness.driver.reconciles().len(), 1);

    scheduler.status_update(&running(&task)).unwrap();
    assert!(scheduler.reconciler().remaining().is_empty());
    assert!(scheduler.is_ready());

    processor.shutdown().await;
    scheduler.shutdown().await;
}
