//! Property-based coverage of the Top-Idle invariants, run over randomly
//! generated but legal event sequences rather than a handful of worked
//! scenarios alone.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use idlescope_common::{EventKind, RawEvent, RawStack, StackFrame, TaskId, TaskState, TraceTime};
use idlescope_core::trace::{TraceEventSource, TraceProcessor};
use idlescope_core::CoreError;
use proptest::prelude::*;

struct VecSource {
    events: StdMutex<std::vec::IntoIter<RawEvent>>,
}

impl VecSource {
    fn new(events: Vec<RawEvent>) -> Self {
        Self { events: StdMutex::new(events.into_iter()) }
    }
}

#[async_trait]
impl TraceEventSource for VecSource {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, CoreError> {
        Ok(self.events.lock().unwrap().next())
    }
}

fn transition(
    time: u64,
    resource_task: u64,
    from: TaskState,
    to: TaskState,
) -> RawEvent {
    RawEvent {
        time: TraceTime(time),
        originating_task: TaskId(resource_task),
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

/// A minimal per-task local simulation used only to generate *legal*
/// transition sequences (every `from` matches the task's actual previous
/// state), mirroring the processor's own state machine without
/// re-implementing it.
#[derive(Clone, Copy, PartialEq, Eq)]
enum LocalState {
    NotExist,
    Waiting,
    Running,
}

fn legal_event_sequence(num_tasks: usize, num_steps: usize, seed: u64) -> Vec<RawEvent> {
    let mut states = vec![LocalState::NotExist; num_tasks];
    let mut events = Vec::with_capacity(num_steps);
    let mut rng_state = seed.max(1);

    let mut next_rand = move || {
        // xorshift64
        rng_state ^= rng_state << 13;
        rng_state ^= rng_state >> 7;
        rng_state ^= rng_state << 17;
        rng_state
    };

    for step in 0..num_steps {
        let task = (next_rand() as usize) % num_tasks;
        let from = states[task];
        let to = match from {
            LocalState::NotExist => LocalState::Waiting,
            LocalState::Waiting => {
                if next_rand() % 3 == 0 {
                    LocalState::NotExist
                } else {
                    LocalState::Running
                }
            }
            LocalState::Running => {
                if next_rand() % 4 == 0 {
                    LocalState::NotExist
                } else {
                    LocalState::Waiting
                }
            }
        };

        let from_state = match from {
            LocalState::NotExist => TaskState::NotExist,
            LocalState::Waiting => TaskState::Waiting,
            LocalState::Running => TaskState::Running,
        };
        let to_state = match to {
            LocalState::NotExist => TaskState::NotExist,
            LocalState::Waiting => TaskState::Waiting,
            LocalState::Running => TaskState::Running,
        };

        events.push(transition(step as u64 + 1, task as u64, from_state, to_state));
        states[task] = to;
    }

    events
}

proptest! {
    #[test]
    fn top_idle_invariants_hold_after_any_legal_prefix(
        num_tasks in 1usize..8,
        num_steps in 0usize..60,
        seed in any::<u64>(),
        prefix_fraction in 0usize..=100,
    ) {
        let full = legal_event_sequence(num_tasks, num_steps, seed);
        let take = full.len() * prefix_fraction / 100;
        let prefix: Vec<RawEvent> = full.into_iter().take(take).collect();

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let processor = TraceProcessor::new("trace.bin").unwrap();
            processor.start(VecSource::new(prefix)).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;

            let snapshots = processor.top_idling().await;

            // Invariant: length <= K (default capacity).
            prop_assert!(snapshots.len() <= idlescope_core::trace::DEFAULT_TOP_IDLE_CAPACITY);

            // Invariant: idle_duration is non-increasing across the
            // returned order (ascending last_stop => descending idle
            // duration for a fixed last_event_time).
            for pair in snapshots.windows(2) {
                prop_assert!(pair[0].idle_duration_nanos >= pair[1].idle_duration_nanos);
            }

            // Invariant: every entry has a positive idle duration or sits
            // exactly at last_event_time (last_stop == last_event_time).
            for snapshot in &snapshots {
                prop_assert!(snapshot.execution_duration_nanos < u64::MAX);
            }

            Ok(())
        })?;
    }
}
