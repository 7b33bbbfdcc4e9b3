use serde::{Deserialize, Serialize};

use crate::types::{JobId, JobRecord, VideoId};

/// Narrows which jobs are tracked. Each non-empty dimension must match; an
/// empty filter matches every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionFilter {
    pub job_ids: Option<Vec<JobId>>,
    pub job_types: Option<Vec<String>>,
    pub video_ids: Option<Vec<VideoId>>,
    /// Ask the server for a `job_state` snapshot right after subscribing.
    pub include_active_state: bool,
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self {
            job_ids: None,
            job_types: None,
            video_ids: None,
            include_active_state: true,
        }
    }
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<JobId>,
    {
        self.job_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_job_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.job_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_video_ids(mut self, video_ids: impl IntoIterator<Item = VideoId>) -> Self {
        self.video_ids = Some(video_ids.into_iter().collect());
        self
    }

    pub fn with_active_state(mut self, include: bool) -> Self {
        self.include_active_state = include;
        self
    }

    /// True when no dimension constrains anything.
    pub fn is_unconstrained(&self) -> bool {
        active(&self.job_ids).is_none()
            && active(&self.job_types).is_none()
            && active(&self.video_ids).is_none()
    }

    /// Checks already-resolved attributes of a job against every dimension.
    ///
    /// The server narrows by id and type already, so an unknown type passes;
    /// only a type that is present and unlisted is rejected. Video ids are
    /// never sent upstream and must be known to match.
    pub fn matches(&self, job_id: &str, job_type: Option<&str>, video_id: Option<VideoId>) -> bool {
        let id_ok = active(&self.job_ids).is_none_or(|ids| ids.iter().any(|id| id == job_id));
        let type_ok = active(&self.job_types)
            .is_none_or(|types| job_type.is_none_or(|kind| types.iter().any(|t| t == kind)));
        let video_ok = active(&self.video_ids)
            .is_none_or(|videos| video_id.is_some_and(|video| videos.contains(&video)));
        id_ok && type_ok && video_ok
    }

    pub fn matches_record(&self, record: &JobRecord) -> bool {
        let kind = Some(record.kind.as_str()).filter(|kind| !kind.is_empty());
        self.matches(&record.id, kind, record.video_id())
    }
}

fn active<T>(dimension: &Option<Vec<T>>) -> Option<&[T]> {
    dimension.as_deref().filter(|values| !values.is_empty())
}

/// Wire payload of a `subscribe_jobs` frame. Video ids are applied on this
/// side only and never sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub job_types: Option<Vec<String>>,
    pub job_ids: Option<Vec<JobId>>,
    pub include_active_state: bool,
}

/// Holds the active filter and turns it into subscribe requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionController {
    filter: SubscriptionFilter,
}

impl SubscriptionController {
    pub fn new(filter: SubscriptionFilter) -> Self {
        Self { filter }
    }

    pub fn set_filter(&mut self, filter: SubscriptionFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    pub fn current_subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest {
            job_types: active(&self.filter.job_types).map(<[String]>::to_vec),
            job_ids: active(&self.filter.job_ids).map(<[JobId]>::to_vec),
            include_active_state: self.filter.include_active_state,
        }
    }
}
