use crate::{ConnectionState, JobId, JobRecord, JobStatus, SyncState};

/// Read-only copy of what a renderer needs, detached from the live state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncViewModel {
    pub connection: ConnectionState,
    pub last_error: Option<String>,
    pub reconnect_attempt: u32,
    pub jobs: Vec<JobRowView>,
    pub active_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub kind: String,
    pub status: JobStatus,
    pub progress: f64,
    pub current_step: String,
    pub processed_items: u64,
    pub total_items: u64,
    pub error: Option<String>,
}

impl From<&JobRecord> for JobRowView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            kind: record.kind.clone(),
            status: record.status,
            progress: record.progress,
            current_step: record.current_step.clone(),
            processed_items: record.processed_items,
            total_items: record.total_items,
            error: record.error.clone(),
        }
    }
}

impl SyncState {
    pub fn view(&self) -> SyncViewModel {
        let jobs: Vec<JobRowView> = self.store.iter().map(JobRowView::from).collect();
        let active_count = jobs.iter().filter(|row| !row.status.is_terminal()).count();
        SyncViewModel {
            connection: self.connection,
            last_error: self.last_error.clone(),
            reconnect_attempt: self.reconnect_attempt,
            jobs,
            active_count,
        }
    }
}
