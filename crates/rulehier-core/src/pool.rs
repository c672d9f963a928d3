//! Worker pool primitives: a bounded work queue and scoped worker threads.

use crate::error::MineError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::thread::{Scope, ScopedJoinHandle};

// ============================================================================
// Work queue
// ============================================================================

/// Bounded FIFO shared by the workers.
///
/// `push` blocks while the queue is full; `poll` never blocks.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_full: Condvar,
    capacity: usize,
}

impl<T> WorkQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        while items.len() >= self.capacity {
            self.not_full.wait(&mut items);
        }
        items.push_back(item);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    pub fn poll(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

// ============================================================================
// Worker pool
// ============================================================================

/// Running workers of one pass, each identified by its task index.
pub struct WorkerPool<'scope, R> {
    handles: Vec<(usize, ScopedJoinHandle<'scope, Result<R, MineError>>)>,
}

impl<'scope, R: Send + 'scope> WorkerPool<'scope, R> {
    /// Spawn one named thread per task, each running `work` on its task.
    pub fn start<'env, T, F>(
        scope: &'scope Scope<'scope, 'env>,
        name: &str,
        tasks: Vec<T>,
        work: &'env F,
    ) -> Result<Self, MineError>
    where
        T: Send + 'scope,
        F: Fn(T) -> Result<R, MineError> + Sync,
    {
        let mut handles = Vec::with_capacity(tasks.len());
        for (id, task) in tasks.into_iter().enumerate() {
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn_scoped(scope, move || work(task))
                .map_err(|e| MineError::io(format!("<{name} thread>"), e))?;
            handles.push((id, handle));
        }
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker; the first failure is returned after all joined.
    pub fn join(self) -> Result<Vec<R>, MineError> {
        let mut results = Vec::with_capacity(self.handles.len());
        let mut first_error = None;
        for (id, handle) in self.handles {
            match handle.join() {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    first_error.get_or_insert(MineError::WorkerPanicked(id));
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn queue_is_fifo_and_poll_does_not_block() {
        let queue = WorkQueue::with_capacity(4);
        assert_eq!(queue.poll(), None::<u32>);
        queue.extend([1, 2, 3]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.poll(), Some(1));
        assert_eq!(queue.poll(), Some(2));
        assert_eq!(queue.poll(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_blocks_until_polled() {
        let queue = WorkQueue::with_capacity(1);
        queue.push(1);
        std::thread::scope(|scope| {
            let pusher = scope.spawn(|| queue.push(2));
            std::thread::sleep(std::time::Duration::from_millis(10));
            assert_eq!(queue.poll(), Some(1));
            pusher.join().unwrap();
        });
        assert_eq!(queue.poll(), Some(2));
    }

    #[test]
    fn pool_drains_shared_queue() {
        let queue = WorkQueue::with_capacity(100);
        queue.extend(0..100usize);
        let sum = AtomicUsize::new(0);
        let work = |_: usize| -> Result<usize, MineError> {
            let mut taken = 0;
            while let Some(item) = queue.poll() {
                sum.fetch_add(item, Ordering::Relaxed);
                taken += 1;
            }
            Ok(taken)
        };

        let taken: usize = std::thread::scope(|scope| {
            let pool = WorkerPool::start(scope, "worker", vec![0, 1, 2, 3], &work).unwrap();
            assert_eq!(pool.len(), 4);
            pool.join().unwrap().into_iter().sum()
        });
        assert_eq!(taken, 100);
        assert_eq!(sum.load(Ordering::Relaxed), 4950);
    }

    #[test]
    fn failing_worker_is_reported_after_join() {
        let work = |id: usize| -> Result<(), MineError> {
            if id == 1 {
                Err(MineError::WorkerPanicked(id))
            } else {
                Ok(())
            }
        };
        let result = std::thread::scope(|scope| {
            WorkerPool::start(scope, "worker", vec![0, 1, 2], &work)
                .unwrap()
                .join()
        });
        assert!(matches!(result, Err(MineError::WorkerPanicked(1))));
    }
}
