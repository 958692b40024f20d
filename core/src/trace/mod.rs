//! Trace Processor (C3): streaming state machine over task lifecycle
//! events, maintaining a bounded top-K index of the most idle live tasks.

mod processor;
mod source;
mod task_stat;
mod top_idle;

pub use processor::{TraceProcessor, DEFAULT_TOP_IDLE_CAPACITY};
pub use source::TraceEventSource;
pub use task_stat::TaskStat;
pub use top_idle::TopIdleIndex;
