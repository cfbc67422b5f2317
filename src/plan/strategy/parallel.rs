use super::Strategy;
use crate::plan::Element;

/// Every eligible child at once
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelStrategy;

impl Strategy for ParallelStrategy {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn select(&self, children: &[&dyn Element], eligible: &[bool]) -> Vec<usize> {
        (0..children.len())
            .filter(|&index| eligible.get(index).copied().unwrap_or(false))
            .collect()
    }
}

/// Parallel selection in shuffled order, so no single wedged child is always tried first
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomizedStrategy;

impl Strategy for RandomizedStrategy {
    fn name(&self) -> &'static str {
        "randomized"
    }

    fn select(&self, children: &[&dyn Element], eligible: &[bool]) -> Vec<usize> {
        let mut selected = ParallelStrategy.select(children, eligible);
        fastrand::shuffle(&mut selected);
        selected
    }
}
