//! # Parallel block pipeline
//!
//! A fixed pool of worker threads pulls sequence-numbered items from a shared
//! queue, runs the session's block function on them and deposits the results
//! into a reorder buffer. The consumer receives results strictly in
//! submission order.
//!
//! Every submitted item moves through [`BlockState`]:
//!
//! ```text
//! Pending -> InFlight -> Completed -> Flushed
//! ```
//!
//! The work queue holds at most a window of items (twice the worker count)
//! and [`Pipeline::submit`] blocks while it is full. A producer that is also
//! the consumer should drain results with [`Pipeline::next`] while
//! [`Pipeline::is_saturated`] holds, which keeps the unflushed items within
//! the window as well.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::{Result, error::PipelineError};

/// Lifecycle of a submitted item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Waiting in the queue
    Pending,
    /// Picked up by a worker
    InFlight,
    /// Result waiting in the reorder buffer
    Completed,
    /// Result handed to the consumer
    Flushed,
}

struct QueueState<T> {
    items: VecDeque<(u64, T)>,
    closed: bool,
}

/// Bounded pending work shared by all workers
struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    available: Condvar,
    space: Condvar,
}
impl<T> WorkQueue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            available: Condvar::new(),
            space: Condvar::new(),
        }
    }

    /// Blocks while the queue is full, returning false if it was closed
    fn push(&self, id: u64, item: T) -> bool {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && !state.closed {
            self.space.wait(&mut state);
        }
        if state.closed {
            return false;
        }
        state.items.push_back((id, item));
        drop(state);
        self.available.notify_one();
        true
    }

    fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Blocks until an item is available, or returns `None` once closed and empty
    fn pop(&self) -> Option<(u64, T)> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.space.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Stops accepting items; queued items are still handed out
    fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
        self.space.notify_all();
    }

    /// Closes the queue and drops all pending items
    fn drain(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let dropped = state.items.len();
        state.items.clear();
        drop(state);
        self.available.notify_all();
        self.space.notify_all();
        dropped
    }
}

struct ReorderState<U> {
    in_flight: BTreeSet<u64>,
    completed: BTreeMap<u64, Result<U>>,
    next_expected: u64,
    aborted: bool,
}

/// Holds completed results until every earlier result has been flushed
struct ReorderBuffer<U> {
    state: Mutex<ReorderState<U>>,
    ready: Condvar,
}
impl<U> ReorderBuffer<U> {
    fn new() -> Self {
        Self {
            state: Mutex::new(ReorderState {
                in_flight: BTreeSet::new(),
                completed: BTreeMap::new(),
                next_expected: 0,
                aborted: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn start(&self, id: u64) {
        self.state.lock().in_flight.insert(id);
    }

    fn complete(&self, id: u64, result: Result<U>) {
        let mut state = self.state.lock();
        state.in_flight.remove(&id);
        if state.aborted {
            return;
        }
        state.completed.insert(id, result);
        if id == state.next_expected {
            self.ready.notify_all();
        }
    }

    /// Removes the next in-order result if it has completed
    fn try_take(&self) -> Option<Result<U>> {
        let mut state = self.state.lock();
        Self::take_locked(&mut state)
    }

    /// Blocks until the next in-order result has completed
    fn take(&self) -> Result<U> {
        let mut state = self.state.lock();
        loop {
            if let Some(result) = Self::take_locked(&mut state) {
                return result;
            }
            if state.aborted {
                return Err(PipelineError::Aborted.into());
            }
            self.ready.wait(&mut state);
        }
    }

    fn take_locked(state: &mut ReorderState<U>) -> Option<Result<U>> {
        let next = state.next_expected;
        let result = state.completed.remove(&next)?;
        state.next_expected += 1;
        Some(result)
    }

    fn next_expected(&self) -> u64 {
        self.state.lock().next_expected
    }

    fn state(&self, id: u64) -> Option<BlockState> {
        let state = self.state.lock();
        if id < state.next_expected {
            Some(BlockState::Flushed)
        } else if state.completed.contains_key(&id) {
            Some(BlockState::Completed)
        } else if state.in_flight.contains(&id) {
            Some(BlockState::InFlight)
        } else {
            None
        }
    }

    fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        state.completed.clear();
        drop(state);
        self.ready.notify_all();
    }
}

/// A worker pool delivering results in submission order
pub struct Pipeline<T, U> {
    queue: Arc<WorkQueue<T>>,
    reorder: Arc<ReorderBuffer<U>>,
    workers: Vec<JoinHandle<()>>,
    window: usize,
    /// Sequence number of the next submission
    next_id: u64,
    aborted: bool,
}
impl<T, U> Pipeline<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    /// Spawns `num_workers` threads running `f` on every submitted item
    ///
    /// Every worker runs its own clone of `f`, so scratch state captured by
    /// the closure is reused across the items of one worker.
    pub fn spawn<F>(num_workers: usize, f: F) -> Result<Self>
    where
        F: FnMut(u64, T) -> Result<U> + Clone + Send + 'static,
    {
        let num_workers = num_workers.max(1);
        let window = 2 * num_workers;
        let queue = Arc::new(WorkQueue::new(window));
        let reorder = Arc::new(ReorderBuffer::new());

        let mut workers = Vec::with_capacity(num_workers);
        for idx in 0..num_workers {
            let queue = Arc::clone(&queue);
            let reorder = Arc::clone(&reorder);
            let mut f = f.clone();
            let handle = thread::Builder::new()
                .name(format!("fqarc-worker-{idx}"))
                .spawn(move || worker_loop(&queue, &reorder, &mut f))?;
            workers.push(handle);
        }
        debug!(workers = num_workers, "spawned block pipeline");

        Ok(Self {
            queue,
            reorder,
            workers,
            window,
            next_id: 0,
            aborted: false,
        })
    }

    /// Maximum number of unflushed items
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of submitted items not yet handed to the consumer
    #[must_use]
    pub fn in_flight(&self) -> usize {
        (self.next_id - self.reorder.next_expected()) as usize
    }

    /// True when the window is full and results must be drained before submitting
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.in_flight() >= self.window
    }

    /// Number of items waiting for a worker
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queues an item, returning its sequence number
    ///
    /// Blocks while the work queue holds a full window of items.
    pub fn submit(&mut self, item: T) -> Result<u64> {
        if self.aborted {
            return Err(PipelineError::Aborted.into());
        }
        let id = self.next_id;
        if !self.queue.push(id, item) {
            return Err(PipelineError::Aborted.into());
        }
        self.next_id += 1;
        Ok(id)
    }

    /// Returns the next in-order result if it is already available
    pub fn try_next(&mut self) -> Option<Result<U>> {
        if self.aborted {
            return None;
        }
        self.reorder.try_take()
    }

    /// Waits for the next in-order result
    ///
    /// Returns `None` once every submitted item has been flushed.
    pub fn next(&mut self) -> Option<Result<U>> {
        if self.aborted {
            return Some(Err(PipelineError::Aborted.into()));
        }
        if self.in_flight() == 0 {
            return None;
        }
        Some(self.reorder.take())
    }

    /// Current state of a submitted item, or `None` for an unknown id
    #[must_use]
    pub fn state(&self, id: u64) -> Option<BlockState> {
        if id >= self.next_id {
            return None;
        }
        Some(self.reorder.state(id).unwrap_or(BlockState::Pending))
    }

    /// Drops pending work, discards results and joins the workers
    ///
    /// Items already picked up by a worker run to completion and are discarded.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        let dropped = self.queue.drain();
        self.reorder.abort();
        self.join();
        debug!(dropped, "aborted block pipeline");
    }

    /// Lets the workers finish the queue and joins them
    pub fn close(mut self) {
        self.queue.close();
        self.join();
    }

    fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("pipeline worker terminated abnormally");
            }
        }
    }
}

impl<T, U> Drop for Pipeline<T, U> {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.queue.drain();
        self.reorder.abort();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("pipeline worker terminated abnormally during shutdown");
            }
        }
    }
}

fn worker_loop<T, U, F>(queue: &WorkQueue<T>, reorder: &ReorderBuffer<U>, f: &mut F)
where
    F: FnMut(u64, T) -> Result<U>,
{
    while let Some((id, item)) = queue.pop() {
        reorder.start(id);
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(id, item)))
            .unwrap_or_else(|_| Err(PipelineError::WorkerPanic(id).into()));
        reorder.complete(id, result);
    }
}
