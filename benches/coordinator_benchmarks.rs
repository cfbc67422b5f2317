use criterion::{black_box, criterion_group, criterion_main, Criterion};
use offer_scheduler::framework::{ClusterDriver, DriverSession, TaskKiller};
use offer_scheduler::models::{
    Offer, OfferId, OfferRecommendation, Operation, ResourceRequirement, TaskId, TaskInfo,
    TaskStatus,
};
use offer_scheduler::offer::{DefaultOfferAccepter, OfferEvaluator};
use offer_scheduler::plan::strategy::{ParallelStrategy, SerialStrategy};
use offer_scheduler::plan::{
    aggregate_status, DefaultPlanManager, Phase, Plan, PlanCoordinator, PlanScheduler, Status, Step,
};
use offer_scheduler::state::MemStateStore;
use offer_scheduler::{PlanEventPublisher, Result};
use std::collections::HashSet;
use std::sync::Arc;

struct NullDriver;

impl ClusterDriver for NullDriver {
    fn accept_offers(&self, _: &[OfferId], _: &[Operation]) -> Result<()> {
        Ok(())
    }
    fn decline_offer(&self, _: &OfferId, _: u64) -> Result<()> {
        Ok(())
    }
    fn kill_task(&self, _: &TaskId) -> Result<()> {
        Ok(())
    }
    fn reconcile_tasks(&self, _: &[TaskStatus]) -> Result<()> {
        Ok(())
    }
    fn revive_offers(&self) -> Result<()> {
        Ok(())
    }
    fn suppress_offers(&self) -> Result<()> {
        Ok(())
    }
}

struct FirstOfferEvaluator;

impl OfferEvaluator for FirstOfferEvaluator {
    fn evaluate(&self, requirement: &ResourceRequirement, offers: &[Offer]) -> Result<Vec<OfferRecommendation>> {
        Ok(offers
            .first()
            .map(|offer| {
                requirement
                    .task_instance_names()
                    .into_iter()
                    .map(|name| OfferRecommendation::launch(offer, TaskInfo::new(name, &requirement.pod_instance)))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn deploy_plan(pods: usize) -> Arc<Plan> {
    let steps = (0..pods)
        .map(|i| {
            Arc::new(Step::from_requirement(ResourceRequirement::new(
                format!("node-{i}"),
                ["server"],
            )))
        })
        .collect();
    let phase = Arc::new(Phase::new("nodes", steps, Arc::new(ParallelStrategy)));
    Arc::new(Plan::new("deploy", vec![phase], Arc::new(SerialStrategy)))
}

fn benchmark_aggregation(c: &mut Criterion) {
    let children: Vec<Status> = (0..100)
        .map(|i| if i % 3 == 0 { Status::Complete } else { Status::Pending })
        .collect();
    c.bench_function("aggregate_status_100", |b| {
        b.iter(|| aggregate_status("bench", black_box(&children), false, false))
    });
}

fn benchmark_candidates(c: &mut Criterion) {
    let plan = deploy_plan(200);
    let dirty: HashSet<String> = (0..50).map(|i| format!("node-{i}:[server]")).collect();
    c.bench_function("plan_candidates_200", |b| {
        b.iter(|| plan.candidates(black_box(&dirty)))
    });
}

fn benchmark_offer_pass(c: &mut Criterion) {
    let offers: Vec<Offer> = (0..50).map(|i| Offer::new(format!("o-{i}"), format!("agent-{i}"))).collect();
    c.bench_function("coordinator_pass_50_pods", |b| {
        b.iter_with_setup(
            || {
                let session = DriverSession::connected(Arc::new(NullDriver));
                let store = Arc::new(MemStateStore::new());
                let scheduler = PlanScheduler::new(
                    Arc::new(FirstOfferEvaluator),
                    Arc::new(DefaultOfferAccepter::new(session.clone(), store.clone())),
                    store,
                    Arc::new(TaskKiller::new(session)),
                );
                PlanCoordinator::new(
                    vec![Arc::new(DefaultPlanManager::new(deploy_plan(50)))],
                    scheduler,
                    PlanEventPublisher::default(),
                )
            },
            |coordinator| coordinator.process_offers(black_box(&offers)),
        )
    });
}

criterion_group!(benches, benchmark_aggregation, benchmark_candidates, benchmark_offer_pass);
criterion_main!(benches);
