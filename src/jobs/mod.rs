mod broker;
mod handlers;
mod processor;
mod scheduler;

pub use broker::{EnqueueOptions, JobBroker, QueueReceivers};
pub use handlers::{CleanupHandler, EmailHandler, ThumbnailHandler};
pub use processor::{JobProcessor, TaskHandler, TaskMux};
pub use scheduler::{register_default_schedule, JobScheduler};

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TASK_GENERATE_THUMBNAIL: &str = "task:image:generate_thumbnail";
pub const TASK_SEND_EMAIL: &str = "task:email:send";
pub const TASK_CLEANUP_EXPIRED: &str = "task:system:cleanup_expired";

/// Named queues consumed with weighted fairness 6:3:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    Critical,
    Default,
    Low,
}

impl Queue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Queue::Critical => "critical",
            Queue::Default => "default",
            Queue::Low => "low",
        }
    }

    pub fn weight(&self) -> usize {
        match self {
            Queue::Critical => 6,
            Queue::Default => 3,
            Queue::Low => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailPayload {
    pub file_id: Uuid,
    pub storage_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailPayload {
    pub recipient: String,
    pub user_id: Uuid,
    pub template_file: String,
    pub data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupPayload {}

/// A queued unit of work. `attempt` counts completed tries; it starts at 0
/// and is bumped each time the job is re-enqueued for retry.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub payload: serde_json::Value,
    pub queue: Queue,
    pub max_retry: u32,
    pub timeout: Duration,
    pub attempt: u32,
}

/// Handler outcome that skips the retry policy and kills the job outright,
/// e.g. a payload that will never deserialize.
#[derive(Debug)]
pub enum JobError {
    SkipRetry(String),
    Failed(String),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::SkipRetry(message) => write!(f, "terminal failure: {message}"),
            JobError::Failed(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for JobError {}

#[cfg(test)]
mod tests {
    use super::Queue;

    #[test]
    fn queue_weights_are_six_three_one() {
        assert_eq!(Queue::Critical.weight(), 6);
        assert_eq!(Queue::Default.weight(), 3);
        assert_eq!(Queue::Low.weight(), 1);
    }

    #[test]
    fn task_names_are_namespaced() {
        assert_eq!(super::TASK_GENERATE_THUMBNAIL, "task:image:generate_thumbnail");
        assert_eq!(super::TASK_SEND_EMAIL, "task:email:send");
        assert_eq!(super::TASK_CLEANUP_EXPIRED, "task:system:cleanup_expired");
    }
}
