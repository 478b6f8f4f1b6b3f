//! Draw scheduling across recording workers.
//!
//! A pass that draws many objects splits its work across the worker pool. The
//! [`DrawScheduler`] partitions material groups into per-thread task lists
//! with a greedy heuristic:
//!
//! 1. Each material group is split into `T` near-equal chunks (sizes differ by
//!    at most one, the remainder going to the first chunks).
//! 2. Each chunk, largest first, goes to the thread with the fewest assigned
//!    items, then the fewest material switches so far, then the lowest index.
//!    A thread receives at most one chunk per group.
//! 3. The chosen thread's switch counter grows by one and its item counter by
//!    the chunk size.
//!
//! Since every thread gets at most one chunk per group and switches only grow
//! per chunk, switch counts never drift apart by more than the number of
//! groups smaller than `T`. Ordering by items first keeps the item counts of
//! all threads within one of each other after every group: the one-larger
//! chunks always land on the lightest threads.
//!
//! Each thread's task list is then recorded into its own command buffer,
//! binding a material only when it actually changes.
//!
//! # Example
//!
//! ```
//! use frame_graph::scene::{DrawItem, MaterialGroup, MaterialId, MeshId};
//! use frame_graph::DrawScheduler;
//!
//! let items = (0..10).map(|i| DrawItem { mesh: MeshId(i), instance: i }).collect();
//! let group = MaterialGroup::new(MaterialId(0), items);
//!
//! let schedule = DrawScheduler::schedule(&[group], 4);
//! assert_eq!(schedule.item_counts(), vec![3, 3, 2, 2]);
//! ```

use crate::command::{CommandBuffer, RecordingContext, RecordingThread};
use crate::error::PassError;
use crate::profiling::GpuProfiler;
use crate::scene::{DrawItem, MaterialGroup, MaterialId};
use crate::thread_pool::WorkerPool;

/// A contiguous slice of one material group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawChunk {
    pub material: MaterialId,
    pub items: Vec<DrawItem>,
}

impl DrawChunk {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Work assigned to one recording thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadTasks {
    chunks: Vec<DrawChunk>,
    switches: u32,
    items: usize,
}

impl ThreadTasks {
    /// Chunks in assignment order.
    pub fn chunks(&self) -> &[DrawChunk] {
        &self.chunks
    }

    /// Material switches counted by the scheduler.
    pub fn switches(&self) -> u32 {
        self.switches
    }

    /// Total assigned items.
    pub fn items(&self) -> usize {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Record this thread's chunks into `recorder`.
    pub fn record(&self, recorder: &mut RecordingContext) {
        for chunk in &self.chunks {
            recorder.bind_material(chunk.material);
            for item in &chunk.items {
                recorder.draw(item.mesh, item.instance);
            }
        }
    }
}

/// Greedy partitioner of material groups into per-thread task lists.
///
/// Scratch state only; build a new scheduler every invocation.
#[derive(Debug, Clone)]
pub struct DrawScheduler {
    threads: Vec<ThreadTasks>,
}

impl DrawScheduler {
    /// A scheduler for `threads` workers with zeroed counters.
    pub fn new(threads: usize) -> Self {
        Self {
            threads: vec![ThreadTasks::default(); threads.max(1)],
        }
    }

    /// A scheduler whose threads already carry switch and item counts.
    ///
    /// `items` may be shorter than `switches`; missing entries are zero.
    pub fn from_counts(switches: &[u32], items: &[usize]) -> Self {
        let mut scheduler = Self::new(switches.len());
        for (i, thread) in scheduler.threads.iter_mut().enumerate() {
            thread.switches = switches.get(i).copied().unwrap_or(0);
            thread.items = items.get(i).copied().unwrap_or(0);
        }
        scheduler
    }

    /// Schedule every group with a fresh scheduler.
    pub fn schedule(groups: &[MaterialGroup], threads: usize) -> DrawSchedule {
        let mut scheduler = Self::new(threads);
        for group in groups {
            scheduler.schedule_group(group);
        }
        scheduler.finish()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn threads(&self) -> &[ThreadTasks] {
        &self.threads
    }

    /// Split `group` into chunks and assign them.
    pub fn schedule_group(&mut self, group: &MaterialGroup) {
        let thread_count = self.threads.len();
        let base = group.len() / thread_count;
        let remainder = group.len() % thread_count;

        let mut used = vec![false; thread_count];
        let mut start = 0;
        for chunk_index in 0..thread_count {
            let size = base + usize::from(chunk_index < remainder);
            if size == 0 {
                break;
            }
            let Some(target) = self.pick_thread(&used) else {
                break;
            };
            used[target] = true;

            let thread = &mut self.threads[target];
            thread.switches += 1;
            thread.items += size;
            thread.chunks.push(DrawChunk {
                material: group.material,
                items: group.items[start..start + size].to_vec(),
            });
            start += size;
        }
    }

    fn pick_thread(&self, used: &[bool]) -> Option<usize> {
        self.threads
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .min_by_key(|(i, t)| (t.items, t.switches, *i))
            .map(|(i, _)| i)
    }

    pub fn finish(self) -> DrawSchedule {
        DrawSchedule {
            threads: self.threads,
        }
    }
}

/// Final per-thread task lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawSchedule {
    threads: Vec<ThreadTasks>,
}

impl DrawSchedule {
    pub fn threads(&self) -> &[ThreadTasks] {
        &self.threads
    }

    pub fn item_counts(&self) -> Vec<usize> {
        self.threads.iter().map(ThreadTasks::items).collect()
    }

    pub fn total_items(&self) -> usize {
        self.threads.iter().map(ThreadTasks::items).sum()
    }

    /// Record each non-empty thread's tasks on its own worker.
    ///
    /// Buffers come back in thread index order regardless of which worker
    /// finishes first. A panicking worker is reported as
    /// [`PassError::Panicked`] once every worker has been joined.
    pub fn record_parallel(
        &self,
        pool: &WorkerPool,
        label: &str,
        profiler: Option<&GpuProfiler>,
    ) -> Result<Vec<CommandBuffer>, PassError> {
        pool.scope(|s| {
            let handles: Vec<_> = self
                .threads
                .iter()
                .enumerate()
                .filter(|(_, tasks)| !tasks.is_empty())
                .map(|(index, tasks)| {
                    s.spawn(index, move || {
                        let mut recorder =
                            RecordingContext::new(label, RecordingThread::Worker(index));
                        let scope = profiler
                            .map(|p| p.begin(&mut recorder, format!("{label} draws {index}")));
                        tasks.record(&mut recorder);
                        if let (Some(p), Some(scope)) = (profiler, scope) {
                            p.end(&mut recorder, scope);
                        }
                        recorder.finish()
                    })
                })
                .collect();

            let mut buffers = Vec::with_capacity(handles.len());
            let mut panic = None;
            for handle in handles {
                match handle.join() {
                    Ok(buffer) => buffers.push(buffer),
                    Err(message) => {
                        panic.get_or_insert(message);
                    }
                }
            }
            match panic {
                Some(message) => Err(PassError::Panicked(message)),
                None => Ok(buffers),
            }
        })
    }
}
