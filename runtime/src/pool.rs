//! Worker pool for parallel loops.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Executes loop iterations concurrently. The call returns only when every
/// iteration that was started has finished.
pub trait ThreadPool: Send + Sync {
    /// Run `body(0), body(1), ..., body(n - 1)`, possibly concurrently and
    /// in any order.
    fn parallel_for(&self, n: usize, body: &(dyn Fn(usize) + Send + Sync));
}

/// A pool of scoped OS threads pulling iteration indices from a shared
/// counter. Threads live for one `parallel_for` call; loop bodies in this
/// system are large (whole pipeline stages), so spawn cost is noise.
#[derive(Debug, Clone)]
pub struct StdThreadPool {
    threads: usize,
}

impl StdThreadPool {
    pub fn new(threads: usize) -> Self {
        Self { threads: threads.max(1) }
    }
}

impl Default for StdThreadPool {
    fn default() -> Self {
        let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::new(threads)
    }
}

impl ThreadPool for StdThreadPool {
    fn parallel_for(&self, n: usize, body: &(dyn Fn(usize) + Send + Sync)) {
        if n == 0 {
            return;
        }
        let workers = self.threads.min(n);
        if workers == 1 {
            for i in 0..n {
                body(i);
            }
            return;
        }
        let next = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= n {
                        break;
                    }
                    body(i);
                });
            }
        });
    }
}
