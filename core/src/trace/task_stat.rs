//! Per-task lifecycle state maintained by the trace processor.

use idlescope_common::{TaskId, TraceTime};

/// Everything the processor knows about one task.
///
/// `stack` and `transition_stack` are filled only on the transition-creation
/// path: if a task is first observed through a non-transition event, its
/// stat is created with empty stacks, and those stacks are never later
/// overwritten even if a transition event for the same task arrives
/// afterward.
#[derive(Debug, Clone)]
pub struct TaskStat {
    pub id: TaskId,
    pub first_seen: TraceTime,
    pub stack: String,
    pub transition_stack: String,
    pub invoked_by: Option<TaskId>,
    pub exec_duration_nanos: u64,
    pub last_running: TraceTime,
    pub last_stop: TraceTime,
}

impl TaskStat {
    #[must_use]
    pub fn new_untransitioned(id: TaskId, first_seen: TraceTime) -> Self {
        Self {
            id,
            first_seen,
            stack: String::new(),
            transition_stack: String::new(),
            invoked_by: None,
            exec_duration_nanos: 0,
            last_running: TraceTime::ZERO,
            last_stop: TraceTime::ZERO,
        }
    }

    #[must_use]
    pub fn new_at_transition(
        id: TaskId,
        first_seen: TraceTime,
        stack: String,
        transition_stack: String,
        invoked_by: Option<TaskId>,
    ) -> Self {
        Self {
            id,
            first_seen,
            stack,
            transition_stack,
            invoked_by,
            exec_duration_nanos: 0,
            last_running: TraceTime::ZERO,
            last_stop: TraceTime::ZERO,
        }
    }

    /// Eligible for the Top-Idle index: it has stopped at least once, and
    /// that stop is not stale relative to a subsequent run.
    #[must_use]
    pub fn is_idle_eligible(&self) -> bool {
        self.last_stop.0 > 0 && self.last_stop >= self.last_running
    }

    /// Wall time since the task last left `Running`, measured against the
    /// most recent event time seen by the processor. Zero if the task is
    /// currently running (or has never stopped).
    #[must_use]
    pub fn idle_duration_nanos(&self, last_event_time: TraceTime) -> u64 {
        if self.last_stop.0 > 0 && self.last_stop >= self.last_running {
            last_event_time.saturating_sub(self.last_stop)
        } else {
            0
        }
    }
}
