//! Unbounded task queue shared by the pool's workers.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing;

/// A queued unit of work: the full execution of one submission.
///
/// Dropping a task without polling it to completion releases its result
/// slot, which resolves the submitter's handle as cancelled.
pub(crate) type Task = BoxFuture<'static, ()>;

/// Outcome of waiting for the next task.
pub(crate) enum Dequeued {
    /// A task is ready to run
    Task(Task),
    /// Nothing arrived within the idle bound
    Idle,
    /// The queue is closed and drained
    Closed,
}

/// FIFO queue of tasks with a depth counter.
#[derive(Debug)]
pub(crate) struct TaskQueue {
    /// Sending half; `None` once the queue is closed
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    /// Receiving half, shared by all workers
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>,
    /// Tasks enqueued but not yet taken by a worker
    depth: AtomicUsize,
}

impl TaskQueue {
    /// Create an open, empty queue
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            depth: AtomicUsize::new(0),
        }
    }

    /// Enqueue a task; hands it back if the queue is closed.
    pub(crate) fn push(&self, task: Task) -> Result<(), Task> {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = sender.as_ref() else {
            return Err(task);
        };
        self.depth.fetch_add(1, Ordering::SeqCst);
        sender.send(task).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            e.0
        })
    }

    /// Wait up to `idle` for the next task.
    pub(crate) async fn pop(&self, idle: Duration) -> Dequeued {
        let next = async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        };
        match tokio::time::timeout(idle, next).await {
            Ok(Some(task)) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Dequeued::Task(task)
            }
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::Idle,
        }
    }

    /// Stop accepting tasks. Already queued tasks can still be popped.
    pub(crate) fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if sender.is_some() {
            tracing::debug!("Task queue closed with {} task(s) pending", self.depth());
        }
    }

    /// Whether [`close`](Self::close) has been called
    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Drop every task still queued, returning how many were discarded
    pub(crate) async fn discard_pending(&self) -> usize {
        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut discarded = 0;
        while let Ok(task) = receiver.try_recv() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            drop(task);
            discarded += 1;
        }
        discarded
    }

    /// Number of tasks waiting for a worker
    pub(crate) fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
