//! The Trace Processor (C3): consumes an unbounded event stream and
//! maintains a bounded top-K index of the most idle live tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use idlescope_common::{EventKind, RawEvent, TaskId, TaskState, TopIdleView, TraceTime};

use super::source::TraceEventSource;
use super::task_stat::TaskStat;
use super::top_idle::TopIdleIndex;
use crate::error::CoreError;

/// Default top-K bound for the idle index.
pub const DEFAULT_TOP_IDLE_CAPACITY: usize = 100;

struct TraceProcessorState {
    living: HashMap<TaskId, TaskStat>,
    terminated: HashMap<TaskId, TaskStat>,
    top_idle: TopIdleIndex,
    last_event_time: TraceTime,
    err: Option<CoreError>,
}

impl TraceProcessorState {
    fn new(capacity: usize) -> Self {
        Self {
            living: HashMap::new(),
            terminated: HashMap::new(),
            top_idle: TopIdleIndex::new(capacity),
            last_event_time: TraceTime::ZERO,
            err: None,
        }
    }

    /// Apply one event: create/update the named task's lifecycle state,
    /// migrate it to `terminated` on exit, and keep the Top-Idle index
    /// in sync with running/stopped transitions.
    fn process_event(&mut self, event: RawEvent) {
        self.last_event_time = event.time;

        let (resource_task, from, to, resource_stack, originating_stack) = match event.kind {
            EventKind::Other => {
                self.living.entry(event.originating_task).or_insert_with(|| {
                    TaskStat::new_untransitioned(event.originating_task, event.time)
                });
                return;
            }
            EventKind::StateTransition { resource_task, from, to, resource_stack, originating_stack } => {
                (resource_task, from, to, resource_stack, originating_stack)
            }
        };

        if to == TaskState::NotExist {
            if let Some(stat) = self.living.remove(&resource_task) {
                self.terminated.insert(resource_task, stat);
            }
            self.top_idle.remove_by_id(resource_task);
            return;
        }

        if !self.living.contains_key(&resource_task) {
            // A task id can be reused after its previous incarnation
            // terminated; a fresh creation must not leave it present in
            // both `living` and `terminated` at once.
            self.terminated.remove(&resource_task);
            let invoked_by = if from == TaskState::NotExist {
                self.lookup_any(event.originating_task).map(|_| event.originating_task)
            } else {
                None
            };
            let stat = TaskStat::new_at_transition(
                resource_task,
                event.time,
                resource_stack.render(),
                originating_stack.render(),
                invoked_by,
            );
            self.living.insert(resource_task, stat);
        }

        let stat = self.living.get_mut(&resource_task).expect("just inserted or already present");

        if to == TaskState::Running {
            stat.last_running = event.time;
        }
        if to != TaskState::Running && stat.last_stop.0 == 0 {
            stat.last_stop = event.time;
        }
        if from == TaskState::Running {
            stat.exec_duration_nanos += event.time.saturating_sub(stat.last_running);
            stat.last_stop = event.time;
        }

        if to == TaskState::Running {
            self.top_idle.remove_by_id(resource_task);
        }
    }

    fn lookup_any(&self, id: TaskId) -> Option<&TaskStat> {
        self.living.get(&id).or_else(|| self.terminated.get(&id))
    }

    /// Refresh-on-query: unconditionally rescan `living` and rebuild the
    /// index, then render snapshots for every member.
    fn top_idling(&mut self) -> Vec<TopIdleView> {
        self.top_idle.clear();
        for stat in self.living.values() {
            if stat.is_idle_eligible() {
                self.top_idle.consider(stat.last_stop, stat.id);
            }
        }

        let last_event_time = self.last_event_time;
        self.top_idle
            .entries()
            .iter()
            .filter_map(|(_, id)| self.living.get(id))
            .map(|stat| self.render_snapshot(stat, last_event_time, 0))
            .collect()
    }

    fn render_snapshot(&self, stat: &TaskStat, last_event_time: TraceTime, depth: u8) -> TopIdleView {
        const MAX_INVOKED_BY_DEPTH: u8 = 64;

        let invoked_by = if depth < MAX_INVOKED_BY_DEPTH {
            stat.invoked_by
                .and_then(|parent_id| self.lookup_any(parent_id))
                .map(|parent| Box::new(self.render_snapshot(parent, last_event_time, depth + 1)))
        } else {
            None
        };

        TopIdleView {
            id: stat.id.0,
            stack: stat.stack.clone(),
            transition_stack: stat.transition_stack.clone(),
            execution_duration_nanos: stat.exec_duration_nanos,
            idle_duration_nanos: stat.idle_duration_nanos(last_event_time),
            invoked_by,
        }
    }
}

/// Public handle to a running trace processor.
pub struct TraceProcessor {
    source_path: String,
    state: Arc<Mutex<TraceProcessorState>>,
    cancelled: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TraceProcessor {
    /// Create a processor for `source_path`. Does not start ingestion;
    /// call `start` with a concrete `TraceEventSource`.
    pub fn new(source_path: impl Into<String>) -> Result<Self, CoreError> {
        let source_path = source_path.into();
        if source_path.is_empty() {
            return Err(CoreError::BadArgument("source path must not be empty".to_string()));
        }

        Ok(Self {
            source_path,
            state: Arc::new(Mutex::new(TraceProcessorState::new(DEFAULT_TOP_IDLE_CAPACITY))),
            cancelled: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Spawn the ingestion worker over `source`. Reads events until the
    /// source returns a clean end-of-stream, an error is hit, or
    /// `cancel()` is called.
    pub async fn start<S>(&self, mut source: S)
    where
        S: TraceEventSource + 'static,
    {
        let state = Arc::clone(&self.state);
        let cancelled = Arc::clone(&self.cancelled);

        let handle = tokio::spawn(async move {
            loop {
                if cancelled.load(Ordering::Relaxed) {
                    return;
                }

                match source.next_event().await {
                    Ok(Some(event)) => {
                        let mut guard = state.lock().await;
                        guard.process_event(event);
                    }
                    Ok(None) => return,
                    Err(err) => {
                        warn!("trace ingestion stopped: {err}");
                        let mut guard = state.lock().await;
                        guard.err = Some(err);
                        return;
                    }
                }
            }
        });

        *self.worker.lock().await = Some(handle);
    }

    /// Signal the ingestion worker to stop at its next opportunity.
    /// Does not interrupt an in-flight read.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Up to K snapshots of the most idle live tasks, ascending by how
    /// long they have been idle... ascending by `last_stop` (oldest pause
    /// first), which is the longest-idle-first ordering.
    pub async fn top_idling(&self) -> Vec<TopIdleView> {
        let mut guard = self.state.lock().await;
        guard.top_idling()
    }

    /// The error recorded on this processor, if ingestion stopped
    /// abnormally.
    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.err.as_ref().map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlescope_common::{RawStack, StackFrame};
    use std::sync::Mutex as StdMutex;

    fn transition(
        time: u64,
        originating_task: u64,
        resource_task: u64,
        from: TaskState,
        to: TaskState,
    ) -> RawEvent {
        RawEvent {
            time: TraceTime(time),
            originating_task: TaskId(originating_task),
            kind: EventKind::StateTransition {
                resource_task: TaskId(resource_task),
                from,
                to,
                resource_stack: RawStack(vec![StackFrame {
                    function: format!("task{resource_task}"),
                    pc: 0,
                    file: None,
                    line: None,
                }]),
                originating_stack: RawStack::default(),
            },
        }
    }

    struct VecSource {
        events: StdMutex<std::vec::IntoIter<RawEvent>>,
    }

    impl VecSource {
        fn new(events: Vec<RawEvent>) -> Self {
            Self { events: StdMutex::new(events.into_iter()) }
        }
    }

    #[async_trait::async_trait]
    impl TraceEventSource for VecSource {
        async fn next_event(&mut self) -> Result<Option<RawEvent>, CoreError> {
            Ok(self.events.lock().unwrap().next())
        }
    }

    #[tokio::test]
    async fn single_create_run_terminate() {
        let processor = TraceProcessor::new("trace.bin").unwrap();
        let events = vec![
            transition(100, 1, 1, TaskState::NotExist, TaskState::Waiting),
            transition(100, 1, 1, TaskState::Waiting, TaskState::Running),
            transition(200, 1, 1, TaskState::Running, TaskState::Waiting),
            transition(300, 1, 1, TaskState::Waiting, TaskState::NotExist),
        ];
        processor.start(VecSource::new(events)).await;

        // Let the spawned ingestion task drain the finite event vec.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let snapshots = processor.top_idling().await;
        assert!(snapshots.is_empty());

        let guard = processor.state.lock().await;
        let stat = guard.terminated.get(&TaskId(1)).expect("task moved to terminated");
        assert_eq!(stat.exec_duration_nanos, 100);
        assert!(!guard.living.contains_key(&TaskId(1)));
    }

    #[tokio::test]
    async fn long_idler_reports_idle_duration() {
        let processor = TraceProcessor::new("trace.bin").unwrap();
        let events = vec![
            transition(0, 1, 1, TaskState::NotExist, TaskState::Waiting),
            transition(0, 1, 1, TaskState::Waiting, TaskState::Running),
            transition(10, 1, 1, TaskState::Running, TaskState::Waiting),
        ];
        processor.start(VecSource::new(events)).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        {
            let mut guard = processor.state.lock().await;
            guard.last_event_time = TraceTime(10_000);
        }

        let snapshots = processor.top_idling().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, 1);
        assert_eq!(snapshots[0].idle_duration_nanos, 9_990);
        assert_eq!(snapshots[0].execution_duration_nanos, 10);
    }

    #[tokio::test]
    async fn top_k_plus_one_idlers_keeps_smallest_k() {
        let processor = TraceProcessor::new("trace.bin").unwrap();
        {
            let mut guard = processor.state.lock().await;
            guard.top_idle = TopIdleIndex::new(3);
        }

        let mut events = Vec::new();
        for id in 1..=4u64 {
            events.push(transition(id, id, id, TaskState::NotExist, TaskState::Waiting));
        }
        processor.start(VecSource::new(events)).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let snapshots = processor.top_idling().await;
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn reactivation_evicts_from_top_idle() {
        let processor = TraceProcessor::new("trace.bin").unwrap();
        let events = vec![
            transition(1, 1, 1, TaskState::NotExist, TaskState::Waiting),
            transition(2, 1, 2, TaskState::NotExist, TaskState::Waiting),
        ];
        processor.start(VecSource::new(events)).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(processor.top_idling().await.len(), 2);

        {
            let mut guard = processor.state.lock().await;
            guard.process_event(transition(3, 1, 1, TaskState::Waiting, TaskState::Running));
        }

        let snapshots = processor.top_idling().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, 2);
    }

    #[tokio::test]
    async fn invoked_by_resolves_parent_snapshot() {
        let processor = TraceProcessor::new("trace.bin").unwrap();
        let events = vec![
            transition(0, 1, 1, TaskState::NotExist, TaskState::Waiting),
            transition(1, 1, 2, TaskState::NotExist, TaskState::Waiting),
        ];
        processor.start(VecSource::new(events)).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let snapshots = processor.top_idling().await;
        let child = snapshots.iter().find(|s| s.id == 2).expect("child present");
        let parent = child.invoked_by.as_ref().expect("invoked_by resolved");
        assert_eq!(parent.id, 1);
    }

    #[tokio::test]
    async fn end_of_stream_is_not_an_error() {
        let processor = TraceProcessor::new("trace.bin").unwrap();
        processor.start(VecSource::new(vec![])).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(processor.last_error().await, None);
    }

    #[tokio::test]
    async fn stream_error_is_recorded_but_state_remains_queryable() {
        struct FailingSource;

        #[async_trait::async_trait]
        impl TraceEventSource for FailingSource {
            async fn next_event(&mut self) -> Result<Option<RawEvent>, CoreError> {
                Err(CoreError::StreamBroken("connection reset".to_string()))
            }
        }

        let processor = TraceProcessor::new("trace.bin").unwrap();
        processor.start(FailingSource).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(processor.last_error().await.is_some());
        assert_eq!(processor.top_idling().await, Vec::new());
    }

    #[test]
    fn empty_source_path_is_rejected() {
        let err = TraceProcessor::new("").unwrap_err();
        assert!(err.is_bad_argument());
    }

    #[test]
    fn recreated_task_id_is_not_left_in_both_living_and_terminated() {
        let mut state = TraceProcessorState::new(DEFAULT_TOP_IDLE_CAPACITY);
        state.process_event(transition(1, 1, 1, TaskState::NotExist, TaskState::Waiting));
        state.process_event(transition(2, 1, 1, TaskState::Waiting, TaskState::Running));
        state.process_event(transition(3, 1, 1, TaskState::Running, TaskState::Waiting));
        state.process_event(transition(4, 1, 1, TaskState::Waiting, TaskState::NotExist));
        assert!(!state.living.contains_key(&TaskId(1)));
        assert!(state.terminated.contains_key(&TaskId(1)));

        // The same id is reused by a later, unrelated creation.
        state.process_event(transition(5, 1, 1, TaskState::NotExist, TaskState::Waiting));
        assert!(state.living.contains_key(&TaskId(1)));
        assert!(!state.terminated.contains_key(&TaskId(1)));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn no_task_id_is_ever_in_both_living_and_terminated(
            num_tasks in 1usize..5,
            num_steps in 0usize..80,
            seed in any::<u64>(),
        ) {
            #[derive(Clone, Copy, PartialEq, Eq)]
            enum Local { NotExist, Waiting, Running }

            let mut local_states = vec![Local::NotExist; num_tasks];
            let mut state = TraceProcessorState::new(DEFAULT_TOP_IDLE_CAPACITY);
            let mut rng_state = seed.max(1);
            let mut next_rand = move || {
                rng_state ^= rng_state << 13;
                rng_state ^= rng_state >> 7;
                rng_state ^= rng_state << 17;
                rng_state
            };

            for step in 0..num_steps {
                let task = (next_rand() as usize) % num_tasks;
                let from = local_states[task];
                let to = match from {
                    Local::NotExist => Local::Waiting,
                    Local::Waiting => {
                        if next_rand() % 3 == 0 { Local::NotExist } else { Local::Running }
                    }
                    Local::Running => {
                        if next_rand() % 4 == 0 { Local::NotExist } else { Local::Waiting }
                    }
                };

                let to_task_state = |local: Local| match local {
                    Local::NotExist => TaskState::NotExist,
                    Local::Waiting => TaskState::Waiting,
                    Local::Running => TaskState::Running,
                };

                state.process_event(transition(
                    step as u64 + 1,
                    task as u64,
                    task as u64,
                    to_task_state(from),
                    to_task_state(to),
                ));
                local_states[task] = to;

                for id in state.living.keys() {
                    prop_assert!(!state.terminated.contains_key(id));
                }
            }
        }
    }
}
