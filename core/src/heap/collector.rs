//! The Heap Collector (C4): one independent sampler per configured
//! resolution, each filling its own ring; parsing is deferred to query
//! time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::warn;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use idlescope_common::HeapProfileSummary;

use super::fetcher::HeapFetcher;
use super::ring::{HeapRing, HeapSample};
use super::summary;
use crate::error::CoreError;

/// A `(sampling_interval, retention_window)` pair. One ring is maintained
/// per resolution.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub interval: Duration,
    pub window: Duration,
}

impl Resolution {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.interval > Duration::from_nanos(0) && self.window >= self.interval
    }

    /// `ceil(window / interval) + 1`.
    #[must_use]
    pub fn ring_capacity(&self) -> usize {
        let interval_nanos = self.interval.as_nanos().max(1);
        let window_nanos = self.window.as_nanos();
        let buckets = window_nanos.div_ceil(interval_nanos);
        buckets as usize + 1
    }
}

/// The default resolutions applied when `start` receives no valid pairs:
/// `(5s, 30min)`, `(1min, 3h)`, `(30min, 24h)`.
#[must_use]
pub fn default_resolutions() -> Vec<Resolution> {
    vec![
        Resolution { interval: Duration::from_secs(5), window: Duration::from_secs(30 * 60) },
        Resolution { interval: Duration::from_secs(60), window: Duration::from_secs(3 * 3600) },
        Resolution {
            interval: Duration::from_secs(30 * 60),
            window: Duration::from_secs(24 * 3600),
        },
    ]
}

struct HeapCollectorState {
    rings: Vec<(Resolution, HeapRing)>,
    err: Option<CoreError>,
}

/// Public handle to a running heap collector.
pub struct HeapCollector {
    source_path: String,
    state: Arc<Mutex<HeapCollectorState>>,
    cancelled: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl HeapCollector {
    /// Create a collector for `source_path`. Does not start sampling;
    /// call `start` with a concrete `HeapFetcher`.
    pub fn new(source_path: impl Into<String>) -> Result<Self, CoreError> {
        let source_path = source_path.into();
        if source_path.is_empty() {
            return Err(CoreError::BadArgument("source path must not be empty".to_string()));
        }

        Ok(Self {
            source_path,
            state: Arc::new(Mutex::new(HeapCollectorState { rings: Vec::new(), err: None })),
            cancelled: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Validate the requested resolutions, discarding invalid pairs and
    /// falling back to `default_resolutions()` if none remain, then spawn
    /// one independent sampler task per surviving resolution.
    pub async fn start<F>(&self, requested: Vec<Resolution>, fetcher: Arc<F>)
    where
        F: HeapFetcher + 'static,
    {
        let mut resolutions: Vec<Resolution> =
            requested.into_iter().filter(Resolution::is_valid).collect();
        if resolutions.is_empty() {
            resolutions = default_resolutions();
        }

        {
            let mut guard = self.state.lock().await;
            guard.rings = resolutions
                .iter()
                .map(|resolution| (*resolution, HeapRing::new(resolution.ring_capacity())))
                .collect();
        }

        let mut handles = Vec::with_capacity(resolutions.len());
        for (index, resolution) in resolutions.into_iter().enumerate() {
            let state = Arc::clone(&self.state);
            let cancelled = Arc::clone(&self.cancelled);
            let fetcher = Arc::clone(&fetcher);
            let source_path = self.source_path.clone();

            let handle = tokio::spawn(async move {
                // The first tick of a `tokio::time::interval` fires
                // immediately; consume it so the first sample is taken
                // one interval after the sampler starts, not at time 0.
                let mut ticker = tokio::time::interval(resolution.interval);
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    if cancelled.load(Ordering::Relaxed) {
                        return;
                    }

                    match fetcher.fetch(&source_path).await {
                        Ok((200, body)) => {
                            let mut guard = state.lock().await;
                            guard.rings[index].1.push(HeapSample {
                                payload: body,
                                received_at: SystemTime::now(),
                            });
                        }
                        Ok((status, _)) => {
                            warn!("heap sampler for {source_path} stopping on status {status}");
                            let mut guard = state.lock().await;
                            guard.err = Some(CoreError::UpstreamUnavailable(format!(
                                "heap source responded with status {status}"
                            )));
                            return;
                        }
                        Err(err) => {
                            warn!("heap sampler for {source_path} stopping: {err}");
                            let mut guard = state.lock().await;
                            guard.err = Some(err);
                            return;
                        }
                    }
                }
            });
            handles.push(handle);
        }

        *self.workers.lock().await = handles;
    }

    /// Signal every sampler to stop at its next tick. Does not interrupt
    /// an in-flight request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Per resolution (in the order passed to `start`), the ring's
    /// contents newest-first, parsed and reduced. A single consistent
    /// snapshot is taken under one lock acquisition.
    pub async fn summaries(&self) -> Result<Vec<Vec<HeapProfileSummary>>, CoreError> {
        let guard = self.state.lock().await;
        let mut result = Vec::with_capacity(guard.rings.len());
        for (_, ring) in &guard.rings {
            let mut resolution_summaries = Vec::with_capacity(ring.len());
            for sample in ring.samples() {
                resolution_summaries.push(summary::summarize(&sample.payload)?);
            }
            result.push(resolution_summaries);
        }
        Ok(result)
    }

    /// The error recorded on this collector, if any sampler stopped
    /// abnormally. Other samplers may still be running.
    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.err.as_ref().map(ToString::to_string)
    }
}
