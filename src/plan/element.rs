//! Contract shared by steps, phases and plans.

use super::Status;
use crate::models::TaskStatus;
use uuid::Uuid;

/// A node in the plan tree.
///
/// Leaf elements (steps) own their status. Composite elements derive it from
/// their children on every read through [`aggregate_status`](super::aggregate_status).
pub trait Element: Send + Sync {
    fn id(&self) -> Uuid;

    /// Human-readable name, unique among siblings but not across plans
    fn name(&self) -> &str;

    fn status(&self) -> Status;

    /// Own errors followed by every descendant's errors
    fn errors(&self) -> Vec<String>;

    /// Feed a cluster status update down to the leaves
    fn update(&self, status: &TaskStatus);

    /// Administrative reset back to `PENDING`
    fn restart(&self);

    /// Administrative override to `COMPLETE`
    fn force_complete(&self);

    /// Operator hold, including a canary gate awaiting approval
    fn is_interrupted(&self) -> bool {
        false
    }

    /// Asset this element claims while in flight. Only steps claim assets.
    fn asset_name(&self) -> Option<&str> {
        None
    }

    fn is_complete(&self) -> bool {
        self.status().is_complete()
    }

    fn is_pending(&self) -> bool {
        self.status().is_pending()
    }

    fn is_running(&self) -> bool {
        self.status().is_running()
    }

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// One-line description for logs and admin responses
    fn message(&self) -> String {
        format!(
            "'{} [{}]' has status: '{}'",
            self.name(),
            self.id(),
            self.status()
        )
    }
}
