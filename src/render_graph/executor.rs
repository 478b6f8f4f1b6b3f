//! Render graph executor
//!
//! One frame runs in three steps:
//!
//! 1. **Realize** - on the primary thread, every resource a live pass touches
//!    is realized in compiled order. Any failure aborts the frame before a
//!    single command is recorded.
//! 2. **Record** - deferred passes are spread over the worker pool, each
//!    worker recording its passes in compiled order into deferred contexts.
//!    Inline passes are recorded by the primary thread as it reaches them.
//! 3. **Submit** - the primary thread walks the compiled order and submits
//!    each pass's buffers. For a deferred pass it blocks on that pass's
//!    result channel exactly once; results that arrive early simply wait.
//!
//! GPU queries opened by passes whose buffers never reach the device are
//! dropped from the profiler at the end of the frame.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::command::{CommandBuffer, RecordingThread, TimestampPoint};
use crate::device::RenderDevice;
use crate::error::{FrameError, PassError};
use crate::profiling::{GpuProfiler, GpuTiming, QueryId};
use crate::render_graph::compiler::CompiledGraph;
use crate::render_graph::context::PassContext;
use crate::render_graph::factory::FactoryRegistry;
use crate::render_graph::pass::{PassHandle, PassNode, PassStatus, RecordMode};
use crate::render_graph::resource::ResourceRegistry;
use crate::thread_pool::{WorkerPool, run_guarded};

/// What happened to one pass during a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass: PassHandle,
    pub name: String,
    pub status: PassStatus,
    pub record_mode: RecordMode,
    pub thread: RecordingThread,
    /// CPU time spent in the execute callback
    pub cpu_time: Duration,
    pub buffers_submitted: usize,
    /// Error returned by the execute callback, if any
    pub error: Option<PassError>,
}

/// Summary of one executed frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Live passes in compiled order
    pub passes: Vec<PassReport>,
    pub culled_passes: usize,
    pub resources_realized: usize,
    pub buffers_submitted: usize,
    /// Filled after the device reports timestamps
    pub gpu_timings: Vec<GpuTiming>,
    /// True when a placeholder frame was shown instead
    pub placeholder: bool,
}

impl FrameReport {
    pub fn status_of(&self, name: &str) -> Option<PassStatus> {
        self.passes.iter().find(|p| p.name == name).map(|p| p.status)
    }

    fn count(&self, status: PassStatus) -> usize {
        self.passes.iter().filter(|p| p.status == status).count()
    }

    pub fn submitted_passes(&self) -> usize {
        self.count(PassStatus::Submitted)
    }

    pub fn failed_passes(&self) -> usize {
        self.count(PassStatus::Failed)
    }

    pub fn pending_passes(&self) -> usize {
        self.count(PassStatus::Pending)
    }

    /// Total CPU recording time across passes.
    pub fn cpu_time(&self) -> Duration {
        self.passes.iter().map(|p| p.cpu_time).sum()
    }
}

/// Result of recording one pass.
struct Recorded {
    result: Result<(), PassError>,
    buffers: Vec<CommandBuffer>,
    thread: RecordingThread,
    cpu_time: Duration,
}

struct Recorder<'a> {
    passes: &'a [PassNode],
    resources: &'a ResourceRegistry,
    pool: &'a WorkerPool,
    profiler: Option<&'a GpuProfiler>,
    frame_index: u64,
}

impl Recorder<'_> {
    fn record(&self, pass: PassHandle, thread: RecordingThread) -> Recorded {
        crate::profile_scope!("record_pass");
        let node = &self.passes[pass.index()];
        let start = Instant::now();
        let outcome = run_guarded(|| {
            let mut ctx = PassContext::new(
                pass,
                node,
                self.resources,
                self.pool,
                self.profiler,
                self.frame_index,
                thread,
            );
            let result = node.execute(&mut ctx);
            (result, ctx.finish())
        });
        let (result, buffers) = match outcome {
            Ok((result, buffers)) => (result, buffers),
            Err(message) => (Err(PassError::Panicked(message)), Vec::new()),
        };
        Recorded {
            result,
            buffers,
            thread,
            cpu_time: start.elapsed(),
        }
    }
}

/// Realize every resource accessed by a live pass.
fn realize_all(
    passes: &[PassNode],
    resources: &mut ResourceRegistry,
    factories: &FactoryRegistry,
    compiled: &CompiledGraph,
) -> Result<usize, FrameError> {
    crate::profile_scope!("realize_resources");
    let mut realized = 0;
    for &pass in compiled.pass_order() {
        for access in passes[pass.index()].accesses() {
            match resources.realize(access.resource, factories) {
                Ok(true) => realized += 1,
                Ok(false) => {}
                Err(err) => {
                    let descriptor = resources
                        .get(access.resource)
                        .map(|r| r.descriptor().summary())
                        .unwrap_or_default();
                    log::error!(
                        "Failed to realize '{}' ({}) for pass '{}': {}",
                        err.resource(),
                        descriptor,
                        passes[pass.index()].name(),
                        err
                    );
                    return Err(err.into());
                }
            }
        }
    }
    Ok(realized)
}

/// Execute one frame of a compiled graph.
#[allow(clippy::too_many_arguments)]
pub(crate) fn execute_frame(
    passes: &[PassNode],
    resources: &mut ResourceRegistry,
    factories: &FactoryRegistry,
    compiled: &CompiledGraph,
    device: &mut dyn RenderDevice,
    pool: &WorkerPool,
    profiler: Option<&GpuProfiler>,
    frame_index: u64,
) -> Result<FrameReport, FrameError> {
    crate::profile_scope!("execute_graph");
    let resources_realized = realize_all(passes, resources, factories, compiled)?;
    let resources: &ResourceRegistry = resources;

    let recorder = Recorder {
        passes,
        resources,
        pool,
        profiler,
        frame_index,
    };

    // Deferred passes are dealt round-robin to the workers in compiled order.
    let order = compiled.pass_order();
    let deferred: Vec<usize> = order
        .iter()
        .enumerate()
        .filter(|(_, pass)| passes[pass.index()].record_mode() == RecordMode::Deferred)
        .map(|(position, _)| position)
        .collect();
    let worker_count = pool.num_threads().min(deferred.len());

    let mut receivers: Vec<Option<mpsc::Receiver<Recorded>>> = order.iter().map(|_| None).collect();
    let mut jobs: Vec<Vec<(PassHandle, mpsc::SyncSender<Recorded>)>> =
        (0..worker_count).map(|_| Vec::new()).collect();
    for (k, &position) in deferred.iter().enumerate() {
        let (sender, receiver) = mpsc::sync_channel(1);
        jobs[k % worker_count].push((order[position], sender));
        receivers[position] = Some(receiver);
    }

    let mut report = FrameReport {
        frame_index,
        culled_passes: compiled.culled().len(),
        resources_realized,
        ..FrameReport::default()
    };

    let submitted = pool.scope(|s| {
        let recorder = &recorder;
        let workers: Vec<_> = jobs
            .into_iter()
            .enumerate()
            .map(|(worker, job)| {
                s.spawn(worker, move || {
                    for (pass, sender) in job {
                        let recorded = recorder.record(pass, RecordingThread::Worker(worker));
                        // The primary thread stops listening only after a
                        // device failure; the result is dropped then.
                        let _ = sender.send(recorded);
                    }
                })
            })
            .collect();

        let submitted = submit_in_order(recorder, order, &mut receivers, device, &mut report);

        for worker in workers {
            let index = worker.index();
            if let Err(message) = worker.join() {
                log::error!("Recording worker {index} panicked: {message}");
            }
        }
        submitted
    });

    // Every buffer of this frame is either on the device or dropped by now.
    if let Some(profiler) = profiler {
        let discarded = profiler.discard_unsubmitted();
        if discarded > 0 {
            log::trace!("Frame {frame_index}: discarded {discarded} unsubmitted GPU queries");
        }
    }
    submitted?;

    Ok(report)
}

/// Queries whose end timestamp is written by `buffer`.
fn closed_queries(buffer: &CommandBuffer) -> Vec<QueryId> {
    buffer
        .timestamps()
        .filter(|(_, point)| *point == TimestampPoint::End)
        .map(|(query, _)| query)
        .collect()
}

fn submit_in_order(
    recorder: &Recorder<'_>,
    order: &[PassHandle],
    receivers: &mut [Option<mpsc::Receiver<Recorded>>],
    device: &mut dyn RenderDevice,
    report: &mut FrameReport,
) -> Result<(), FrameError> {
    for (position, &pass) in order.iter().enumerate() {
        let node = &recorder.passes[pass.index()];
        let recorded = match receivers[position].take() {
            // The single blocking point for a deferred pass.
            Some(receiver) => receiver.recv().unwrap_or_else(|_| Recorded {
                result: Err(PassError::Panicked(
                    "recording worker exited before finishing".to_string(),
                )),
                buffers: Vec::new(),
                thread: RecordingThread::Worker(0),
                cpu_time: Duration::ZERO,
            }),
            None => recorder.record(pass, RecordingThread::Primary),
        };

        let status = match &recorded.result {
            Ok(()) => PassStatus::Submitted,
            Err(PassError::NotReady(reason)) => {
                log::trace!("Pass '{}' not ready: {}", node.name(), reason);
                PassStatus::Pending
            }
            Err(err) => {
                log::warn!("Pass '{}' failed: {}", node.name(), err);
                PassStatus::Failed
            }
        };
        let mut pass_report = PassReport {
            pass,
            name: node.name().to_string(),
            status,
            record_mode: node.record_mode(),
            thread: recorded.thread,
            cpu_time: recorded.cpu_time,
            buffers_submitted: 0,
            error: recorded.result.err(),
        };

        // A pending pass submits nothing. A failed one still submits what it
        // recorded before failing.
        if status != PassStatus::Pending {
            for buffer in recorded.buffers {
                let queries = recorder
                    .profiler
                    .map(|_| closed_queries(&buffer))
                    .unwrap_or_default();
                device.submit(buffer)?;
                if let Some(profiler) = recorder.profiler {
                    profiler.mark_submitted(&queries);
                }
                pass_report.buffers_submitted += 1;
                report.buffers_submitted += 1;
            }
        }
        report.passes.push(pass_report);
    }
    Ok(())
}
