//! Shared data structures between idlescope's core engine and its HTTP glue.
//!
//! These types describe the wire-level shape of trace events and the
//! JSON bodies served by the HTTP API. Nothing in this crate performs I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a lightweight concurrent task (a "goroutine" in
/// the source system), as emitted by the trace reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Nanoseconds since the trace epoch. Monotonically non-decreasing within
/// one stream; not comparable across streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TraceTime(pub u64);

impl TraceTime {
    pub const ZERO: TraceTime = TraceTime(0);

    #[must_use]
    pub fn saturating_sub(self, other: TraceTime) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for TraceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collapsed task lifecycle state. The source trace format distinguishes
/// several non-running states (runnable, blocked on I/O, blocked on a
/// channel, ...); the processor only cares whether a task is running, so
/// all of those collapse to `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    NotExist,
    Waiting,
    Running,
}

/// One frame of a captured stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    pub pc: u64,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// A stack as handed to the processor by the reader: an ordered list of
/// frames, outermost call first. Rendered to an immutable string the
/// first time a `TaskStat` captures it (see `render`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStack(pub Vec<StackFrame>);

impl RawStack {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render the stack to its canonical printable form.
    ///
    /// One frame per line, in call order: `#N 0x{pc:016x} {function}`
    /// followed by `    at {file}:{line}` when source location is known.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, frame) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("#{:<2} 0x{:016x} {}", i, frame.pc, frame.function));
            if let Some(ref file) = frame.file {
                out.push_str(&format!("\n    at {file}"));
                if let Some(line) = frame.line {
                    out.push_str(&format!(":{line}"));
                }
            }
        }
        out
    }
}

/// What kind of thing a `RawEvent` reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventKind {
    /// A task resource moved from one state to another.
    StateTransition {
        resource_task: TaskId,
        from: TaskState,
        to: TaskState,
        /// The resource's own stack, captured at the point of transition.
        resource_stack: RawStack,
        /// The stack of whatever task caused the transition.
        originating_stack: RawStack,
    },
    /// Any other trace event (task creation of non-task resources, GC
    /// marks, etc). Carried only so the processor can note the
    /// originating task was observed.
    Other,
}

/// One event read from a trace stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub time: TraceTime,
    pub originating_task: TaskId,
    pub kind: EventKind,
}

/// A `TopGoroutine`-equivalent snapshot returned by `top_idling()`, and the
/// JSON shape served at `GET /trace-events/{id}/top-idling-goroutines`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopIdleView {
    pub id: u64,
    pub stack: String,
    #[serde(rename = "transition-stack")]
    pub transition_stack: String,
    #[serde(rename = "execution-duration")]
    pub execution_duration_nanos: u64,
    #[serde(rename = "idle-duration")]
    pub idle_duration_nanos: u64,
    #[serde(rename = "invoked-by")]
    pub invoked_by: Option<Box<TopIdleView>>,
}

/// The JSON shape served at `GET /heap-profiles/{id}/summaries`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapProfileSummary {
    pub time_nanos: i64,
    pub inuse_space: i64,
    pub inuse_objects: i64,
    pub alloc_space: i64,
    pub alloc_objects: i64,
}
