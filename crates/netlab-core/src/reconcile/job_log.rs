// ── Job log projector ──
//
// Turns successive job-list polls into log lines, one per new job or
// status change. The very first poll only seeds the baseline.

use std::collections::HashMap;

use crate::log::{LogEntry, LogLevel};
use crate::model::{Job, JobStatus};

#[derive(Debug, Default)]
pub struct JobLogProjector {
    /// `None` until the first poll has been seen.
    previous: Option<HashMap<String, JobStatus>>,
}

impl JobLogProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `jobs` against the last observation.
    pub fn observe(&mut self, jobs: &[Job]) -> Vec<LogEntry> {
        let current: HashMap<String, JobStatus> =
            jobs.iter().map(|j| (j.id.clone(), j.status)).collect();

        let Some(previous) = self.previous.replace(current) else {
            return Vec::new();
        };

        jobs.iter()
            .filter(|job| previous.get(&job.id) != Some(&job.status))
            .map(log_entry)
            .collect()
    }

    /// Forget the baseline; the next poll seeds again.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn is_seeded(&self) -> bool {
        self.previous.is_some()
    }
}

fn log_entry(job: &Job) -> LogEntry {
    let level = match job.status {
        JobStatus::Queued | JobStatus::Running => LogLevel::Info,
        JobStatus::Completed => LogLevel::Success,
        JobStatus::Failed => LogLevel::Error,
    };
    let mut message = format!("{}: {}", job.action.label(), job.status);
    if let (JobStatus::Failed, Some(err)) = (job.status, &job.error_message) {
        message = format!("{message} ({err})");
    }
    LogEntry::new(level, message).with_job(job.id.clone())
}
