//! Profiling support.
//!
//! # CPU Profiling
//!
//! CPU instrumentation goes through Tracy when the `profiling` feature is
//! enabled. When it is disabled (the default), the macros compile to no-ops.
//!
//! ```ignore
//! use frame_graph::profile_scope;
//!
//! fn expensive_operation() {
//!     profile_scope!("inner_work");
//!     // ... do work ...
//! }
//! ```
//!
//! # GPU Profiling
//!
//! [`GpuProfiler`] tracks timestamp queries written into command buffers.
//! Queries are opened and closed from whichever thread records the pass, so
//! the pending-query map is shared between workers behind a single mutex.
//! Once the device has executed the submitted buffers it reports raw
//! timestamps, and [`GpuProfiler::resolve`] turns them into per-label
//! durations.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::{Command, RecordingContext, RecordingThread, TimestampPoint};

// Re-export tracy-client types when profiling is enabled
#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, frame_mark as tracy_frame_mark, span};

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Profile the enclosing scope under `$name`.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Identifier of a GPU timestamp query pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u32);

/// A raw timestamp reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSample {
    pub query: QueryId,
    pub point: TimestampPoint,
    /// Device ticks
    pub ticks: u64,
}

/// An open GPU profiling region. Close it with [`GpuProfiler::end`].
#[derive(Debug)]
#[must_use = "a GPU scope must be closed with GpuProfiler::end"]
pub struct GpuScope {
    query: QueryId,
}

impl GpuScope {
    pub fn query(&self) -> QueryId {
        self.query
    }
}

/// Resolved GPU time for one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuTiming {
    pub label: String,
    pub thread: RecordingThread,
    pub duration: Duration,
    /// Number of regions accumulated under this label
    pub samples: u32,
}

#[derive(Debug)]
struct PendingQuery {
    label: String,
    thread: RecordingThread,
    begin: Option<u64>,
    /// The buffer holding the end timestamp reached the device
    submitted: bool,
}

#[derive(Debug, Default)]
struct ProfilerState {
    pending: HashMap<QueryId, PendingQuery>,
    resolved: BTreeMap<String, GpuTiming>,
}

/// Cross-thread GPU timestamp bookkeeping.
#[derive(Debug)]
pub struct GpuProfiler {
    timestamp_period_ns: f64,
    next_query: AtomicU32,
    state: Mutex<ProfilerState>,
}

impl GpuProfiler {
    /// Create a profiler for a device whose timestamps tick every
    /// `timestamp_period_ns` nanoseconds.
    pub fn new(timestamp_period_ns: f32) -> Self {
        Self {
            timestamp_period_ns: f64::from(timestamp_period_ns),
            next_query: AtomicU32::new(0),
            state: Mutex::new(ProfilerState::default()),
        }
    }

    /// Open a profiled region in `recorder`.
    pub fn begin(&self, recorder: &mut RecordingContext, label: impl Into<String>) -> GpuScope {
        let query = QueryId(self.next_query.fetch_add(1, Ordering::Relaxed));
        self.state.lock().pending.insert(
            query,
            PendingQuery {
                label: label.into(),
                thread: recorder.thread(),
                begin: None,
                submitted: false,
            },
        );
        recorder.push(Command::WriteTimestamp {
            query,
            point: TimestampPoint::Begin,
        });
        GpuScope { query }
    }

    /// Close a region opened with [`begin`](Self::begin).
    pub fn end(&self, recorder: &mut RecordingContext, scope: GpuScope) {
        recorder.push(Command::WriteTimestamp {
            query: scope.query,
            point: TimestampPoint::End,
        });
    }

    /// Number of queries still waiting for timestamps.
    pub fn pending_queries(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Note that the end timestamps of `queries` were handed to the device.
    pub fn mark_submitted(&self, queries: &[QueryId]) {
        let mut state = self.state.lock();
        for query in queries {
            if let Some(pending) = state.pending.get_mut(query) {
                pending.submitted = true;
            }
        }
    }

    /// Drop every query whose end timestamp never reached the device.
    ///
    /// Called once a frame's recording is over: a query left unsubmitted
    /// then belongs to a pending, panicked or abandoned pass and can no
    /// longer resolve.
    pub fn discard_unsubmitted(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.pending.len();
        state.pending.retain(|_, pending| pending.submitted);
        before - state.pending.len()
    }

    /// Feed device timestamps back into the profiler.
    ///
    /// Queries whose end timestamp arrives are moved to the resolved map,
    /// accumulating into any earlier timing with the same label. Samples for
    /// unknown queries are ignored.
    pub fn resolve(&self, samples: &[TimestampSample]) {
        let mut state = self.state.lock();
        for sample in samples {
            match sample.point {
                TimestampPoint::Begin => {
                    if let Some(pending) = state.pending.get_mut(&sample.query) {
                        pending.begin = Some(sample.ticks);
                    }
                }
                TimestampPoint::End => {
                    let Some(begin) = state
                        .pending
                        .get(&sample.query)
                        .and_then(|pending| pending.begin)
                    else {
                        log::trace!("Dropping end timestamp for unknown query {:?}", sample.query);
                        continue;
                    };
                    let Some(pending) = state.pending.remove(&sample.query) else {
                        continue;
                    };
                    let ticks = sample.ticks.saturating_sub(begin);
                    let nanos = (ticks as f64 * self.timestamp_period_ns) as u64;
                    let timing = state
                        .resolved
                        .entry(pending.label.clone())
                        .or_insert_with(|| GpuTiming {
                            label: pending.label,
                            thread: pending.thread,
                            duration: Duration::ZERO,
                            samples: 0,
                        });
                    timing.duration += Duration::from_nanos(nanos);
                    timing.samples += 1;
                }
            }
        }
    }

    /// Take the resolved timings, sorted by label.
    pub fn take_timings(&self) -> Vec<GpuTiming> {
        let resolved = std::mem::take(&mut self.state.lock().resolved);
        resolved.into_values().collect()
    }
}

impl Default for GpuProfiler {
    fn default() -> Self {
        Self::new(1.0)
    }
}
