use crate::models::Monitor;
use std::time::Instant;
use tokio::sync::mpsc;

/// One unit of dispatch work: a monitor snapshot plus the deadline its probe
/// must honor. The scheduler pushes these; workers pop them.
#[derive(Debug, Clone)]
pub struct Job {
    pub monitor: Monitor,
    pub deadline: Instant,
}

/// Bounded FIFO between the scheduler and the worker pool. Capacity is
/// `workers * 4` (floor 64) per the scheduler's sizing rule. `try_push`
/// never blocks — a full queue means drop-and-count, not backpressure onto
/// the scheduler's clock.
pub struct DispatchQueue {
    tx: mpsc::Sender<Job>,
}

pub struct DispatchReceiver {
    rx: mpsc::Receiver<Job>,
}

impl DispatchQueue {
    pub fn bounded(capacity: usize) -> (Self, DispatchReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (DispatchQueue { tx }, DispatchReceiver { rx })
    }

    /// Returns `false` if the queue was full and the job was dropped.
    pub fn try_push(&self, job: Job) -> bool {
        self.tx.try_send(job).is_ok()
    }
}

impl Clone for DispatchQueue {
    fn clone(&self) -> Self {
        DispatchQueue { tx: self.tx.clone() }
    }
}

impl DispatchReceiver {
    pub async fn recv(&mut self) -> Option<Job> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Job> {
        self.rx.try_recv().ok()
    }
}
