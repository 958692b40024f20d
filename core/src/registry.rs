//! Registry / Session Manager (C6): the explicit construct a caller uses
//! to start and look up Trace Processors and Heap Collectors by handle.
//!
//! An explicitly-constructed type rather than a process-wide singleton,
//! so a test, or an embedding binary, can run more than one independent
//! registry.

use std::sync::{Arc, Mutex};

use crate::error::CoreError;
use crate::heap::{HeapCollector, HeapFetcher, Resolution};
use crate::trace::{TraceEventSource, TraceProcessor};

struct RegistryState {
    traces: Vec<(String, Arc<TraceProcessor>)>,
    heaps: Vec<(String, Arc<HeapCollector>)>,
}

/// Maintains two append-only sequences indexed by position (the handle
/// returned to callers). A single mutex serialises creation; lookups take
/// the same lock only briefly. Deletion is not supported.
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(RegistryState { traces: Vec::new(), heaps: Vec::new() }) }
    }

    /// Create and start a Trace Processor over `source`, rejecting a
    /// duplicate `source_path` already registered. Returns the handle to
    /// use with `trace`.
    pub async fn start_trace<S>(
        &self,
        source_path: impl Into<String>,
        source: S,
    ) -> Result<u64, CoreError>
    where
        S: TraceEventSource + 'static,
    {
        let source_path = source_path.into();
        let processor = Arc::new(TraceProcessor::new(&source_path)?);

        let handle = {
            let mut guard = self.state.lock().expect("registry mutex poisoned");
            if guard.traces.iter().any(|(existing, _)| existing == &source_path) {
                return Err(CoreError::Conflict(format!(
                    "trace source already running: {source_path}"
                )));
            }
            guard.traces.push((source_path, Arc::clone(&processor)));
            guard.traces.len() - 1
        };

        processor.start(source).await;
        Ok(handle as u64)
    }

    /// Create and start a Heap Collector fetching via `fetcher`,
    /// rejecting a duplicate `source_path`. Returns the handle to use
    /// with `heap`.
    pub async fn start_heap<F>(
        &self,
        source_path: impl Into<String>,
        resolutions: Vec<Resolution>,
        fetcher: Arc<F>,
    ) -> Result<u64, CoreError>
    where
        F: HeapFetcher + 'static,
    {
        let source_path = source_path.into();
        let collector = Arc::new(HeapCollector::new(&source_path)?);

        let handle = {
            let mut guard = self.state.lock().expect("registry mutex poisoned");
            if guard.heaps.iter().any(|(existing, _)| existing == &source_path) {
                return Err(CoreError::Conflict(format!(
                    "heap source already running: {source_path}"
                )));
            }
            guard.heaps.push((source_path, Arc::clone(&collector)));
            guard.heaps.len() - 1
        };

        collector.start(resolutions, fetcher).await;
        Ok(handle as u64)
    }

    /// Look up a Trace Processor by handle.
    pub fn trace(&self, handle: u64) -> Result<Arc<TraceProcessor>, CoreError> {
        let guard = self.state.lock().expect("registry mutex poisoned");
        usize::try_from(handle)
            .ok()
            .and_then(|index| guard.traces.get(index))
            .map(|(_, processor)| Arc::clone(processor))
            .ok_or_else(|| CoreError::BadArgument(format!("no trace processor with handle {handle}")))
    }

    /// Look up a Heap Collector by handle.
    pub fn heap(&self, handle: u64) -> Result<Arc<HeapCollector>, CoreError> {
        let guard = self.state.lock().expect("registry mutex poisoned");
        usize::try_from(handle)
            .ok()
            .and_then(|index| guard.heaps.get(index))
            .map(|(_, collector)| Arc::clone(collector))
            .ok_or_else(|| CoreError::BadArgument(format!("no heap collector with handle {handle}")))
    }
}
