//! # Strategies
//!
//! Policies deciding which children of a phase or plan may proceed next.
//! Every strategy shares one eligibility filter, applied by [`candidates`]
//! after the variant has made its selection: a child that is complete, has
//! errors, is interrupted, or whose asset is dirty is never a candidate.

pub mod canary;
pub mod parallel;
pub mod serial;

use super::Element;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub use canary::CanaryStrategy;
pub use parallel::{ParallelStrategy, RandomizedStrategy};
pub use serial::SerialStrategy;

/// Selection policy over an ordered list of children
pub trait Strategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Indices of the children allowed to proceed, in the order they should be tried.
    /// `eligible[i]` reports whether child `i` passes the shared filter.
    fn select(&self, children: &[&dyn Element], eligible: &[bool]) -> Vec<usize>;

    /// The strategy is holding children back until an operator approves more
    fn awaiting_approval(&self, _children: &[&dyn Element]) -> bool {
        false
    }

    /// Release one more held child. Returns `false` when the strategy has nothing to approve.
    /// Release one more held child. `false` when nothing is held back.
    fn approve(&self, _children: &[&dyn Element]) -> bool {
        false
    }
}

/// Shared eligibility filter applied to every strategy's selection
pub fn is_eligible(element: &dyn Element, dirty_assets: &HashSet<String>) -> bool {
    if element.is_interrupted() {
        return false;
    }
    if let Some(asset) = element.asset_name() {
        if dirty_assets.contains(asset) {
            return false;
        }
    }
    !element.is_complete() && !element.has_errors()
}

/// Children of `parent` that `strategy` allows to proceed given the dirty assets
pub fn candidates<E>(
    strategy: &dyn Strategy,
    children: &[Arc<E>],
    dirty_assets: &HashSet<String>,
) -> Vec<Arc<E>>
where
    E: Element + 'static,
{
    let views: Vec<&dyn Element> = children.iter().map(|c| c.as_ref() as &dyn Element).collect();
    let eligible: Vec<bool> = views
        .iter()
        .map(|element| is_eligible(*element, dirty_assets))
        .collect();

    let mut seen = HashSet::new();
    strategy
        .select(&views, &eligible)
        .into_iter()
        .filter(|&index| eligible.get(index).copied().unwrap_or(false) && seen.insert(index))
        .map(|index| Arc::clone(&children[index]))
        .collect()
}

/// Strategy names accepted by [`from_name`]
pub const STRATEGY_NAMES: [&str; 4] = ["serial", "parallel", "randomized", "canary"];

/// Build a strategy from its configuration name. `canary` wraps a serial strategy
/// with no children approved.
pub fn from_name(name: &str) -> Option<Arc<dyn Strategy>> {
    match name {
        "serial" => Some(Arc::new(SerialStrategy)),
        "parallel" => Some(Arc::new(ParallelStrategy)),
        "randomized" => Some(Arc::new(RandomizedStrategy)),
        "canary" => Some(Arc::new(CanaryStrategy::new(Arc::new(SerialStrategy), 0))),
        _ => None,
    }
}
