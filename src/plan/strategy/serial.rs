use super::Strategy;
use crate::plan::Element;

/// At most the first incomplete child, in declared order
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialStrategy;

impl Strategy for SerialStrategy {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn select(&self, children: &[&dyn Element], eligible: &[bool]) -> Vec<usize> {
        children
            .iter()
            .position(|child| !child.is_complete())
            .filter(|&index| eligible.get(index).copied().unwrap_or(false))
            .into_iter()
            .collect()
    }
}
