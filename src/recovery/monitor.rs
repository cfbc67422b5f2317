//! Failure monitors decide when a stopped task should be treated as permanently failed.

use crate::models::{TaskId, TaskInfo};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

pub trait FailureMonitor: Send + Sync + fmt::Debug {
    /// Whether `task`, currently stopped, can no longer be relaunched in place
    fn has_failed(&self, task: &TaskInfo) -> bool;

    /// Forget any state kept for tasks outside `still_stopped`
    fn retain_stopped(&self, _still_stopped: &HashSet<TaskId>) {}
}

/// Only the explicit permanently-failed label counts
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFailureMonitor;

impl FailureMonitor for NeverFailureMonitor {
    fn has_failed(&self, task: &TaskInfo) -> bool {
        task.is_permanently_failed()
    }
}

/// A task that has stayed stopped for longer than `timeout` is permanently failed
#[derive(Debug)]
pub struct TimedFailureMonitor {
    timeout: Duration,
    first_failure: Mutex<HashMap<TaskId, Instant>>,
}

impl TimedFailureMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            first_failure: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stopped tasks with a running failure timer
    pub fn timers(&self) -> usize {
        self.first_failure.lock().len()
    }

    pub fn has_failed_at(&self, task: &TaskInfo, now: Instant) -> bool {
        if task.is_permanently_failed() {
            return true;
        }
        let mut first_failure = self.first_failure.lock();
        let since = *first_failure.entry(task.task_id.clone()).or_insert(now);
        let failed = now.saturating_duration_since(since) >= self.timeout;
        if failed {
            info!(
                task = %task.name,
                task_id = %task.task_id,
                timeout_secs = self.timeout.as_secs(),
                "Task exceeded failure timeout"
            );
        }
        failed
    }
}

impl FailureMonitor for TimedFailureMonitor {
    fn has_failed(&self, task: &TaskInfo) -> bool {
        self.has_failed_at(task, Instant::now())
    }

    fn retain_stopped(&self, still_stopped: &HashSet<TaskId>) {
        self.first_failure.lock().retain(|task_id, _| still_stopped.contains(task_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_monitor_respects_label() {
        let task = TaskInfo::new("hello-0-server", "hello-0");
        assert!(!NeverFailureMonitor.has_failed(&task));
        assert!(NeverFailureMonitor.has_failed(&task.mark_permanently_failed()));
    }

    #[test]
    fn test_timed_monitor() {
        let monitor = TimedFailureMonitor::new(Duration::from_secs(60));
        let task = TaskInfo::new("hello-0-server", "hello-0");
        let start = Instant::now();
        assert!(!monitor.has_failed_at(&task, start));
        assert!(!monitor.has_failed_at(&task, start + Duration::from_secs(30)));
        assert!(monitor.has_failed_at(&task, start + Duration::from_secs(61)));

        monitor.retain_stopped(&HashSet::new());
        assert_eq!(monitor.timers(), 0);
        assert!(!monitor.has_failed_at(&task, start + Duration::from_secs(62)));
    }

    #[test]
    fn test_timers_kept_for_tasks_still_stopped() {
        let monitor = TimedFailureMonitor::new(Duration::from_secs(60));
        let stopped = TaskInfo::new("hello-0-server", "hello-0");
        let recovered = TaskInfo::new("world-0-server", "world-0");
        let start = Instant::now();
        monitor.has_failed_at(&stopped, start);
        monitor.has_failed_at(&recovered, start);

        monitor.retain_stopped(&[stopped.task_id.clone()].into_iter().collect());
        assert_eq!(monitor.timers(), 1);
        assert!(monitor.has_failed_at(&stopped, start + Duration::from_secs(61)));
    }
}
