use super::Strategy;
use crate::plan::Element;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Holds back every child at or past the approved count until an operator approves more.
/// Within the approved prefix the inner strategy decides.
#[derive(Debug)]
pub struct CanaryStrategy {
    inner: Arc<dyn Strategy>,
    approved: AtomicUsize,
}

impl CanaryStrategy {
    pub fn new(inner: Arc<dyn Strategy>, approved: usize) -> Self {
        Self {
            inner,
            approved: AtomicUsize::new(approved),
        }
    }

    pub fn approved(&self) -> usize {
        self.approved.load(Ordering::Acquire)
    }
}

impl Strategy for CanaryStrategy {
    fn name(&self) -> &'static str {
        "canary"
    }

    fn select(&self, children: &[&dyn Element], eligible: &[bool]) -> Vec<usize> {
        let approved = self.approved();
        self.inner
            .select(children, eligible)
            .into_iter()
            .filter(|&index| index < approved)
            .collect()
    }

    fn awaiting_approval(&self, children: &[&dyn Element]) -> bool {
        let approved = self.approved().min(children.len());
        let (released, held) = children.split_at(approved);
        released.iter().all(|child| child.is_complete())
            && held.iter().any(|child| !child.is_complete())
    }

    fn approve(&self, children: &[&dyn Element]) -> bool {
        let released = self
            .approved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |approved| {
                (approved < children.len()).then_some(approved + 1)
            });
        match released {
            Ok(previous) => {
                info!(approved = previous + 1, "Canary approved one more child");
                true
            }
            Err(approved) => {
                info!(approved = approved, children = children.len(), "Every canary child already approved");
                false
            }
        }
    }
}
