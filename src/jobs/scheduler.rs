use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{EnqueueOptions, JobBroker, Queue};

struct Entry {
    schedule: Schedule,
    task_name: String,
    opts: EnqueueOptions,
}

/// Cron-style periodic enqueuer. Registration parses the expression up
/// front; a bad expression must abort startup rather than silently degrade.
pub struct JobScheduler {
    broker: JobBroker,
    entries: Vec<Entry>,
    shutdown: CancellationToken,
}

impl JobScheduler {
    pub fn new(broker: JobBroker, shutdown: CancellationToken) -> Self {
        Self {
            broker,
            entries: Vec::new(),
            shutdown,
        }
    }

    pub fn register(
        &mut self,
        expression: &str,
        task_name: &str,
        opts: EnqueueOptions,
    ) -> anyhow::Result<()> {
        // The cron crate expects a seconds field; prepend one for the
        // conventional five-field form.
        let with_seconds = format!("0 {expression}");
        let schedule = Schedule::from_str(&with_seconds).map_err(|err| {
            anyhow::anyhow!("failed to register periodic task {task_name}: {err}")
        })?;

        self.entries.push(Entry {
            schedule,
            task_name: task_name.to_string(),
            opts,
        });
        Ok(())
    }

    pub async fn run(self) {
        info!(entries = self.entries.len(), "scheduler started and cron jobs registered");

        let mut handles = Vec::new();
        for entry in self.entries {
            let broker = self.broker.clone();
            let shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(run_entry(entry, broker, shutdown)));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn run_entry(entry: Entry, broker: JobBroker, shutdown: CancellationToken) {
    loop {
        let Some(next) = entry.schedule.upcoming(Utc).next() else {
            error!(task = %entry.task_name, "cron schedule has no upcoming firing, stopping");
            return;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        if let Err(err) = broker.enqueue(&entry.task_name, &serde_json::json!({}), entry.opts) {
            error!(task = %entry.task_name, error = %err, "failed to enqueue periodic task");
        }
    }
}

/// Registers the standing schedule: daily cleanup at 03:00.
pub fn register_default_schedule(scheduler: &mut JobScheduler) -> anyhow::Result<()> {
    scheduler.register(
        "0 3 * * *",
        super::TASK_CLEANUP_EXPIRED,
        EnqueueOptions {
            queue: Queue::Low,
            max_retry: 3,
            timeout: std::time::Duration::from_secs(120),
        },
    )
}
