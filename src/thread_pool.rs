//! Worker threads for deferred command recording.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A fixed-size pool of recording workers.
///
/// Uses `std::thread::scope` for scoped parallel execution, so jobs can borrow
/// the graph and its realized resources without reference counting. The pool
/// size is normally the device-reported parallel recording capacity.
///
/// # Example
///
/// ```
/// use frame_graph::WorkerPool;
///
/// let pool = WorkerPool::new(4);
///
/// let mut results = vec![0u32; 4];
/// pool.scope(|s| {
///     for (i, slot) in results.iter_mut().enumerate() {
///         s.spawn(i, move || {
///             *slot = (i as u32) * 10;
///         });
///     }
/// });
/// assert_eq!(results, vec![0, 10, 20, 30]);
/// ```
#[derive(Debug, Clone)]
pub struct WorkerPool {
    num_threads: usize,
}

impl WorkerPool {
    /// Creates a new pool with the given number of worker threads.
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
        }
    }

    /// Creates a pool sized to the number of available CPU cores.
    pub fn default_threads() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Executes tasks within a scoped context.
    ///
    /// All tasks spawned within the closure are guaranteed to complete
    /// before this method returns. Tasks can borrow local variables
    /// thanks to scoped lifetimes.
    pub fn scope<'env, F, R>(&self, f: F) -> R
    where
        F: for<'scope> FnOnce(&Scope<'scope, 'env>) -> R,
    {
        std::thread::scope(|s| {
            let scope = Scope { inner: s };
            f(&scope)
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::default_threads()
    }
}

/// A scope for spawning worker tasks that must complete before the scope exits.
pub struct Scope<'scope, 'env: 'scope> {
    inner: &'scope std::thread::Scope<'scope, 'env>,
}

impl<'scope, 'env> Scope<'scope, 'env> {
    /// Spawns a task on worker `index`.
    ///
    /// The returned handle is the task's future: joining it blocks until the
    /// task finishes and re-raises a panic as an error message.
    pub fn spawn<F, T>(&self, index: usize, f: F) -> WorkerHandle<'scope, T>
    where
        F: FnOnce() -> T + Send + 'scope,
        T: Send + 'scope,
    {
        let handle = self.inner.spawn(f);
        WorkerHandle { index, handle }
    }
}

/// Pending result of a worker task.
pub struct WorkerHandle<'scope, T> {
    index: usize,
    handle: std::thread::ScopedJoinHandle<'scope, T>,
}

impl<T> WorkerHandle<'_, T> {
    /// Index of the worker running this task.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Block until the task finishes.
    ///
    /// A panic on the worker is returned as `Err` with the panic message.
    pub fn join(self) -> Result<T, String> {
        self.handle.join().map_err(panic_message)
    }
}

/// Run `f`, converting a panic into `Err` with the panic message.
pub(crate) fn run_guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
