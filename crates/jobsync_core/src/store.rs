//! In-memory job map and the event-application fold.
//!
//! Records are keyed by job id in a `BTreeMap` so iteration order is stable.
//! A record whose status is terminal is frozen: no event mutates it again and
//! only a snapshot or an explicit removal takes it out of the map.

use std::collections::BTreeMap;

use crate::codec::{EnvelopeBody, EventEnvelope, EventKind, JobPayload};
use crate::filter::SubscriptionFilter;
use crate::timestamp::Timestamp;
use crate::types::{video_id_from_metadata, JobId, JobRecord, JobStatus, VideoId, VIDEO_ID_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The active filter excludes the job.
    OutOfScope,
    /// Progress for a job this store never saw start.
    UnknownJob,
    /// The job already reached a terminal status.
    AlreadyTerminal,
    /// The envelope carries no job lifecycle change.
    NotAJobEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Finalized,
    Replaced { count: usize },
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobStateStore {
    jobs: BTreeMap<JobId, JobRecord>,
}

impl JobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, job_id: &str) -> Option<&JobRecord> {
        self.jobs.get(job_id)
    }

    /// All records in ascending job-id order.
    pub fn iter(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.values()
    }

    pub fn jobs_for_video(&self, video_id: VideoId) -> Vec<&JobRecord> {
        self.iter()
            .filter(|record| record.video_id() == Some(video_id))
            .collect()
    }

    pub fn active_jobs(&self) -> Vec<&JobRecord> {
        self.iter().filter(|record| !record.is_terminal()).collect()
    }

    /// Consumer-level removal ("clear from view").
    pub fn remove(&mut self, job_id: &str) -> Option<JobRecord> {
        self.jobs.remove(job_id)
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    /// Replace the whole map with the in-scope part of a server snapshot.
    pub fn apply_snapshot(
        &mut self,
        jobs: Vec<JobRecord>,
        filter: &SubscriptionFilter,
    ) -> ApplyOutcome {
        self.jobs = jobs
            .into_iter()
            .filter(|record| filter.matches_record(record))
            .map(|mut record| {
                record.progress = clamp_progress(record.progress).unwrap_or(0.0);
                (record.id.clone(), record)
            })
            .collect();
        ApplyOutcome::Replaced {
            count: self.jobs.len(),
        }
    }

    /// Merge records fetched out-of-band (REST); returns how many were
    /// inserted. Only unknown ids are added. A tracked record is kept whole,
    /// with no per-field merge from the REST copy.
    pub fn merge_records(&mut self, records: Vec<JobRecord>, filter: &SubscriptionFilter) -> usize {
        let mut inserted = 0;
        for record in records {
            if !filter.matches_record(&record) || self.jobs.contains_key(&record.id) {
                continue;
            }
            self.jobs.insert(record.id.clone(), record);
            inserted += 1;
        }
        inserted
    }

    /// Fold one envelope into the map.
    pub fn apply_event(
        &mut self,
        envelope: EventEnvelope,
        filter: &SubscriptionFilter,
    ) -> ApplyOutcome {
        let EventEnvelope {
            kind,
            timestamp,
            body,
        } = envelope;
        let payload = match body {
            EnvelopeBody::Snapshot(jobs) => return self.apply_snapshot(jobs, filter),
            EnvelopeBody::Job(payload) => payload,
            EnvelopeBody::Empty | EnvelopeBody::AuthError { .. } | EnvelopeBody::Other(_) => {
                return ApplyOutcome::Discarded(DiscardReason::NotAJobEvent);
            }
        };

        let existing = self.jobs.get(&payload.job_id);
        if !in_scope(filter, &payload, existing) {
            return ApplyOutcome::Discarded(DiscardReason::OutOfScope);
        }
        if existing.is_some_and(JobRecord::is_terminal) {
            return ApplyOutcome::Discarded(DiscardReason::AlreadyTerminal);
        }

        match kind {
            EventKind::JobStarted => self.start(payload, timestamp),
            EventKind::JobProgress => self.progress(payload),
            other => match other.terminal_status() {
                Some(status) => self.finalize(payload, status, timestamp),
                None => ApplyOutcome::Discarded(DiscardReason::NotAJobEvent),
            },
        }
    }

    fn start(&mut self, payload: JobPayload, timestamp: Option<Timestamp>) -> ApplyOutcome {
        if let Some(record) = self.jobs.get_mut(&payload.job_id) {
            record.status = JobStatus::Running;
            if record.created_at.is_none() {
                record.created_at = payload.created_at.or(timestamp);
            }
            if record.started_at.is_none() {
                record.started_at = payload.started_at.or(timestamp);
            }
            overwrite_present(record, payload);
            return ApplyOutcome::Updated;
        }

        let record = JobRecord {
            kind: payload.job_type.unwrap_or_default(),
            status: JobStatus::Running,
            progress: payload.progress.and_then(clamp_progress).unwrap_or(0.0),
            current_step: payload.current_step.unwrap_or_default(),
            processed_items: payload.processed_items.unwrap_or(0),
            total_items: payload.total_items.unwrap_or(0),
            created_at: payload.created_at.or(timestamp),
            started_at: payload.started_at.or(timestamp),
            completed_at: None,
            metadata: payload.metadata.unwrap_or_default(),
            error: None,
            result: None,
            speed: payload.speed,
            eta_seconds: payload.eta_seconds,
            id: payload.job_id,
        };
        self.jobs.insert(record.id.clone(), record);
        ApplyOutcome::Created
    }

    fn progress(&mut self, payload: JobPayload) -> ApplyOutcome {
        let Some(record) = self.jobs.get_mut(&payload.job_id) else {
            return ApplyOutcome::Discarded(DiscardReason::UnknownJob);
        };
        record.status = JobStatus::Running;
        overwrite_present(record, payload);
        ApplyOutcome::Updated
    }

    fn finalize(
        &mut self,
        payload: JobPayload,
        status: JobStatus,
        timestamp: Option<Timestamp>,
    ) -> ApplyOutcome {
        let completed_at = payload.completed_at.or(timestamp);

        if let Some(record) = self.jobs.get_mut(&payload.job_id) {
            record.status = status;
            record.progress = 1.0;
            record.completed_at = completed_at;
            if let Some(kind) = payload.job_type {
                record.kind = kind;
            }
            if let Some(metadata) = payload.metadata {
                record.metadata.extend(metadata);
            }
            if payload.error.is_some() {
                record.error = payload.error;
            }
            if payload.result.is_some() {
                record.result = payload.result;
            }
            return ApplyOutcome::Finalized;
        }

        // Start was missed (e.g. it happened before we subscribed).
        let record = JobRecord {
            id: payload.job_id,
            kind: payload.job_type.unwrap_or_default(),
            status,
            progress: 1.0,
            current_step: String::new(),
            processed_items: 0,
            total_items: 0,
            created_at: payload.created_at.or(timestamp),
            started_at: payload.started_at.or(timestamp),
            completed_at,
            metadata: payload.metadata.unwrap_or_default(),
            error: payload.error,
            result: payload.result,
            speed: None,
            eta_seconds: None,
        };
        self.jobs.insert(record.id.clone(), record);
        ApplyOutcome::Finalized
    }
}

/// Video id an event refers to: payload metadata first, then a top-level
/// `video_id` next to the known fields.
pub fn payload_video_id(payload: &JobPayload) -> Option<VideoId> {
    payload
        .metadata
        .as_ref()
        .and_then(video_id_from_metadata)
        .or_else(|| {
            payload.extra.get(VIDEO_ID_KEY).and_then(|value| {
                value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
            })
        })
}

fn in_scope(filter: &SubscriptionFilter, payload: &JobPayload, existing: Option<&JobRecord>) -> bool {
    if filter.is_unconstrained() {
        return true;
    }
    let video_id = payload_video_id(payload).or_else(|| existing.and_then(JobRecord::video_id));
    let job_type = payload
        .job_type
        .as_deref()
        .or_else(|| existing.map(|record| record.kind.as_str()))
        .filter(|kind| !kind.is_empty());
    filter.matches(&payload.job_id, job_type, video_id)
}

/// Copy over only the fields the payload actually carries.
fn overwrite_present(record: &mut JobRecord, payload: JobPayload) {
    if let Some(progress) = payload.progress.and_then(clamp_progress) {
        record.progress = progress;
    }
    if let Some(step) = payload.current_step {
        record.current_step = step;
    }
    if let Some(processed) = payload.processed_items {
        record.processed_items = processed;
    }
    if let Some(total) = payload.total_items {
        record.total_items = total;
    }
    if let Some(kind) = payload.job_type {
        record.kind = kind;
    }
    if let Some(metadata) = payload.metadata {
        record.metadata.extend(metadata);
    }
    if payload.speed.is_some() {
        record.speed = payload.speed;
    }
    if payload.eta_seconds.is_some() {
        record.eta_seconds = payload.eta_seconds;
    }
}

/// Non-finite values are ignored; the rest is pinned to `[0, 1]`.
fn clamp_progress(progress: f64) -> Option<f64> {
    progress.is_finite().then(|| progress.clamp(0.0, 1.0))
}
