//! Append-only purge history

use crate::types::{PurgeJob, PurgeJobId, PurgeRecord, PurgeStatistics};
use parking_lot::Mutex;

/// Process-lifetime record of change-driven purges and finished jobs
///
/// Neither list is mutated after an append.
#[derive(Debug, Default)]
pub struct PurgeHistory {
    inner: Mutex<Vec<PurgeRecord>>,
    finished: Mutex<Vec<PurgeJob>>,
}

impl PurgeHistory {
    /// Empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn append(&self, record: PurgeRecord) {
        self.inner.lock().push(record);
    }

    /// Copy of all records, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<PurgeRecord> {
        self.inner.lock().clone()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Archive a job that reached a terminal status
    pub fn archive(&self, job: PurgeJob) {
        self.finished.lock().push(job);
    }

    /// Copy of archived jobs, oldest first
    #[must_use]
    pub fn archived_jobs(&self) -> Vec<PurgeJob> {
        self.finished.lock().clone()
    }

    /// Archived job with `job_id`
    #[must_use]
    pub fn archived_job(&self, job_id: &PurgeJobId) -> Option<PurgeJob> {
        self.finished.lock().iter().rev().find(|j| &j.id == job_id).cloned()
    }

    /// Aggregate view
    #[must_use]
    pub fn statistics(&self) -> PurgeStatistics {
        let guard = self.inner.lock();
        PurgeStatistics {
            total_purges: guard.len(),
            total_files_purged: guard.iter().map(|r| r.file_count).sum(),
            last_purge: guard.last().map(|r| r.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PurgeMode, PurgeStatus};
    use chrono::Utc;

    #[test]
    fn statistics_over_records() {
        let history = PurgeHistory::new();
        assert_eq!(history.statistics(), PurgeStatistics::default());

        let first = Utc::now();
        history.append(PurgeRecord {
            timestamp: first,
            file_count: 3,
            job_id: PurgeJobId::from("a"),
        });
        let second = Utc::now();
        history.append(PurgeRecord {
            timestamp: second,
            file_count: 2,
            job_id: PurgeJobId::from("b"),
        });

        let stats = history.statistics();
        assert_eq!(stats.total_purges, 2);
        assert_eq!(stats.total_files_purged, 5);
        assert_eq!(stats.last_purge, Some(second));
        assert_eq!(history.records()[0].job_id.as_str(), "a");
    }

    #[test]
    fn archived_jobs_do_not_count_as_purges() {
        let history = PurgeHistory::new();
        history.archive(PurgeJob {
            id: PurgeJobId::from("done"),
            status: PurgeStatus::Completed,
            mode: PurgeMode::All,
            paths: Vec::new(),
            created_at: Utc::now(),
            estimated_seconds: 0,
        });

        assert_eq!(history.statistics().total_purges, 0);
        assert_eq!(history.archived_jobs().len(), 1);
        let job = history.archived_job(&PurgeJobId::from("done")).unwrap();
        assert_eq!(job.status, PurgeStatus::Completed);
        assert!(history.archived_job(&PurgeJobId::from("other")).is_none());
    }
}
