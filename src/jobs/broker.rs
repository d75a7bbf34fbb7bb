use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use super::{Job, Queue};
use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct EnqueueOptions {
    pub queue: Queue,
    pub max_retry: u32,
    pub timeout: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            queue: Queue::Default,
            max_retry: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Receiving halves of the named queues, consumed by the processor.
pub struct QueueReceivers {
    pub critical: mpsc::UnboundedReceiver<Job>,
    pub default: mpsc::UnboundedReceiver<Job>,
    pub low: mpsc::UnboundedReceiver<Job>,
}

/// Client half of the job system: serializes a typed payload and drops it on
/// a named queue. Cheap to clone; enqueue never blocks the caller.
#[derive(Clone)]
pub struct JobBroker {
    critical: mpsc::UnboundedSender<Job>,
    default: mpsc::UnboundedSender<Job>,
    low: mpsc::UnboundedSender<Job>,
}

impl JobBroker {
    pub fn new() -> (Self, QueueReceivers) {
        let (critical_tx, critical_rx) = mpsc::unbounded_channel();
        let (default_tx, default_rx) = mpsc::unbounded_channel();
        let (low_tx, low_rx) = mpsc::unbounded_channel();

        (
            Self {
                critical: critical_tx,
                default: default_tx,
                low: low_tx,
            },
            QueueReceivers {
                critical: critical_rx,
                default: default_rx,
                low: low_rx,
            },
        )
    }

    pub fn enqueue<P: Serialize>(
        &self,
        name: &str,
        payload: &P,
        opts: EnqueueOptions,
    ) -> Result<(), AppError> {
        let payload = serde_json::to_value(payload)
            .map_err(|err| AppError::internal(format!("failed to serialize task payload: {err}")))?;

        let job = Job {
            name: name.to_string(),
            payload,
            queue: opts.queue,
            max_retry: opts.max_retry,
            timeout: opts.timeout,
            attempt: 0,
        };

        self.send(job)?;

        info!(
            r#type = name,
            queue = opts.queue.as_str(),
            max_retry = opts.max_retry,
            "enqueued task"
        );
        Ok(())
    }

    /// Used by the processor to push a job back for a later attempt.
    pub(super) fn send(&self, job: Job) -> Result<(), AppError> {
        let sender = match job.queue {
            Queue::Critical => &self.critical,
            Queue::Default => &self.default,
            Queue::Low => &self.low,
        };

        sender
            .send(job)
            .map_err(|_| AppError::internal("job queue is closed"))
    }
}
