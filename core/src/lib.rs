//! idlescope-core: the Trace Processor, Heap Collector, and Registry that
//! make up idlescope's engineering core.
//!
//! This crate performs no I/O of its own. Reading trace events and
//! fetching heap profiles are seams (`trace::TraceEventSource`,
//! `heap::HeapFetcher`) implemented by the `idlescope` binary crate.

pub mod error;
pub mod heap;
pub mod registry;
pub mod trace;

pub use error::CoreError;
pub use registry::Registry;
