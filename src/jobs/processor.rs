use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::{Job, JobBroker, JobError, Queue, QueueReceivers};

const CONCURRENCY: usize = 10;
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(600);

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), JobError>;
}

/// Task-name → handler registry, the serve-mux of the job system.
#[derive(Default)]
pub struct TaskMux {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(mut self, name: &str, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }
}

/// Weighted dispatch order: six critical slots, three default, one low.
const SCHEDULE: [Queue; 10] = [
    Queue::Critical,
    Queue::Critical,
    Queue::Critical,
    Queue::Critical,
    Queue::Critical,
    Queue::Critical,
    Queue::Default,
    Queue::Default,
    Queue::Default,
    Queue::Low,
];

pub struct JobProcessor {
    mux: Arc<TaskMux>,
    broker: JobBroker,
    receivers: QueueReceivers,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl JobProcessor {
    pub fn new(
        mux: TaskMux,
        broker: JobBroker,
        receivers: QueueReceivers,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            mux: Arc::new(mux),
            broker,
            receivers,
            semaphore: Arc::new(Semaphore::new(CONCURRENCY)),
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Dispatch loop: drains the queues in weighted order while permits are
    /// available, parking on all three when everything is empty.
    pub async fn run(mut self) {
        info!(concurrency = CONCURRENCY, "job processor started");
        let mut cursor = 0usize;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let mut dispatched = false;
            for step in 0..SCHEDULE.len() {
                let queue = SCHEDULE[(cursor + step) % SCHEDULE.len()];
                match self.try_recv(queue) {
                    Ok(job) => {
                        cursor = (cursor + step + 1) % SCHEDULE.len();
                        self.dispatch(job).await;
                        dispatched = true;
                        break;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
                }
            }

            if dispatched {
                continue;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                job = self.receivers.critical.recv() => {
                    match job {
                        Some(job) => self.dispatch(job).await,
                        None => break,
                    }
                }
                job = self.receivers.default.recv() => {
                    match job {
                        Some(job) => self.dispatch(job).await,
                        None => break,
                    }
                }
                job = self.receivers.low.recv() => {
                    match job {
                        Some(job) => self.dispatch(job).await,
                        None => break,
                    }
                }
            }
        }

        self.drain().await;
    }

    fn try_recv(&mut self, queue: Queue) -> Result<Job, TryRecvError> {
        match queue {
            Queue::Critical => self.receivers.critical.try_recv(),
            Queue::Default => self.receivers.default.try_recv(),
            Queue::Low => self.receivers.low.try_recv(),
        }
    }

    async fn dispatch(&self, job: Job) {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let mux = Arc::clone(&self.mux);
        let broker = self.broker.clone();
        let tracker = self.tracker.clone();
        self.tracker.spawn(async move {
            process_job(mux, broker, tracker, job).await;
            drop(permit);
        });
    }

    /// Graceful shutdown: stop intake, give in-flight work a bounded window,
    /// then force-stop.
    async fn drain(self) {
        info!("job processor draining in-flight tasks");
        self.tracker.close();
        if tokio::time::timeout(DRAIN_DEADLINE, self.tracker.wait())
            .await
            .is_err()
        {
            warn!("drain deadline exceeded, abandoning in-flight tasks");
        }
        info!("job processor stopped");
    }
}

async fn process_job(mux: Arc<TaskMux>, broker: JobBroker, tracker: TaskTracker, job: Job) {
    let Some(handler) = mux.get(&job.name) else {
        error!(r#type = %job.name, "no handler registered for task, dropping");
        return;
    };

    info!(r#type = %job.name, queue = job.queue.as_str(), attempt = job.attempt, "task active");

    let outcome = tokio::time::timeout(job.timeout, handler.handle(job.payload.clone())).await;

    match outcome {
        Ok(Ok(())) => {
            info!(r#type = %job.name, "task completed");
        }
        Ok(Err(JobError::SkipRetry(message))) => {
            error!(r#type = %job.name, payload = %job.payload, error = %message, "task dead (skip retry)");
        }
        Ok(Err(JobError::Failed(message))) => {
            retry_or_kill(&broker, &tracker, job, &message);
        }
        Err(_) => {
            retry_or_kill(&broker, &tracker, job, "task deadline exceeded");
        }
    }
}

fn retry_or_kill(broker: &JobBroker, tracker: &TaskTracker, mut job: Job, message: &str) {
    if job.attempt >= job.max_retry {
        error!(
            r#type = %job.name,
            payload = %job.payload,
            error = %message,
            attempts = job.attempt + 1,
            "task dead (retries exhausted)"
        );
        return;
    }

    job.attempt += 1;
    let backoff = exponential_backoff(job.attempt);
    warn!(
        r#type = %job.name,
        error = %message,
        attempt = job.attempt,
        backoff_secs = backoff.as_secs(),
        "task retry scheduled"
    );

    let broker = broker.clone();
    tracker.spawn(async move {
        tokio::time::sleep(backoff).await;
        if let Err(err) = broker.send(job) {
            error!(error = %err, "failed to re-enqueue task for retry");
        }
    });
}

fn exponential_backoff(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::{exponential_backoff, JobProcessor, TaskHandler, TaskMux};
    use crate::jobs::{EnqueueOptions, JobBroker, JobError, Queue};

    struct Counting {
        calls: Arc<AtomicU32>,
        fail_first: u32,
        skip_retry: bool,
    }

    #[async_trait]
    impl TaskHandler for Counting {
        async fn handle(&self, _payload: serde_json::Value) -> Result<(), JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.skip_retry {
                return Err(JobError::SkipRetry("bad payload".to_string()));
            }
            if call < self.fail_first {
                return Err(JobError::Failed("transient".to_string()));
            }
            Ok(())
        }
    }

    async fn wait_for(calls: &Arc<AtomicU32>, expected: u32) {
        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!(
            "expected at least {expected} handler calls, saw {}",
            calls.load(Ordering::SeqCst)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_is_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let mux = TaskMux::new().handle(
            "task:test:flaky",
            Arc::new(Counting {
                calls: Arc::clone(&calls),
                fail_first: 2,
                skip_retry: false,
            }),
        );

        let (broker, receivers) = JobBroker::new();
        let shutdown = CancellationToken::new();
        let processor = JobProcessor::new(mux, broker.clone(), receivers, shutdown.clone());
        let handle = tokio::spawn(processor.run());

        broker
            .enqueue(
                "task:test:flaky",
                &serde_json::json!({}),
                EnqueueOptions {
                    queue: Queue::Default,
                    max_retry: 3,
                    timeout: Duration::from_secs(5),
                },
            )
            .unwrap();

        wait_for(&calls, 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        shutdown.cancel();
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn skip_retry_failure_is_terminal() {
        let calls = Arc::new(AtomicU32::new(0));
        let mux = TaskMux::new().handle(
            "task:test:poison",
            Arc::new(Counting {
                calls: Arc::clone(&calls),
                fail_first: 0,
                skip_retry: true,
            }),
        );

        let (broker, receivers) = JobBroker::new();
        let shutdown = CancellationToken::new();
        let processor = JobProcessor::new(mux, broker.clone(), receivers, shutdown.clone());
        let handle = tokio::spawn(processor.run());

        broker
            .enqueue(
                "task:test:poison",
                &serde_json::json!({}),
                EnqueueOptions {
                    queue: Queue::Critical,
                    max_retry: 5,
                    timeout: Duration::from_secs(5),
                },
            )
            .unwrap();

        wait_for(&calls, 1).await;
        // Give the scheduler room to (incorrectly) retry before asserting.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_after_max_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let mux = TaskMux::new().handle(
            "task:test:always-fails",
            Arc::new(Counting {
                calls: Arc::clone(&calls),
                fail_first: u32::MAX,
                skip_retry: false,
            }),
        );

        let (broker, receivers) = JobBroker::new();
        let shutdown = CancellationToken::new();
        let processor = JobProcessor::new(mux, broker.clone(), receivers, shutdown.clone());
        let handle = tokio::spawn(processor.run());

        broker
            .enqueue(
                "task:test:always-fails",
                &serde_json::json!({}),
                EnqueueOptions {
                    queue: Queue::Low,
                    max_retry: 2,
                    timeout: Duration::from_secs(5),
                },
            )
            .unwrap();

        // 1 initial attempt + 2 retries, then dead.
        wait_for(&calls, 3).await;
        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        shutdown.cancel();
        let _ = handle.await;
    }

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        assert_eq!(exponential_backoff(1), Duration::from_secs(2));
        assert_eq!(exponential_backoff(2), Duration::from_secs(4));
        assert_eq!(exponential_backoff(3), Duration::from_secs(8));
        assert_eq!(exponential_backoff(30), Duration::from_secs(600));
    }
}
