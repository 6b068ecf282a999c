//! Persistence of job records
//!
//! Every write that depends on the stored state (completing a job, recording regulation
//! progress) is a single atomic read-modify-write on one record, so concurrent result
//! deliveries for the same job cannot both be applied.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::jobs::{CorrelationId, JobId, JobOutcome, JobRecord, NetworkId, RegulationState};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Job {0} already exists")]
    Duplicate(JobId),
    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}

/// What happened to a result handed to [`JobStore::complete`]
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The result was written, the record after the write is attached
    Applied(Box<JobRecord>),
    /// The job was deleted before its result arrived
    Missing,
    /// The result belongs to an earlier request for this job
    CorrelationMismatch { stored: CorrelationId },
    /// A result was already written for this request
    AlreadyCompleted,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new record, failing if the id is taken
    async fn insert(&self, record: JobRecord) -> Result<(), StoreError>;

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Write `outcome` if the record exists, is still pending, and carries
    /// `correlation_id`
    async fn complete(
        &self,
        job_id: JobId,
        correlation_id: CorrelationId,
        outcome: JobOutcome,
    ) -> Result<Completion, StoreError>;

    /// Record regulation progress, returning `None` if the job no longer exists
    async fn set_regulation(
        &self,
        job_id: JobId,
        state: RegulationState,
    ) -> Result<Option<JobRecord>, StoreError>;

    async fn remove(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Records of one network, oldest first
    async fn list_for_network(&self, network_id: &NetworkId) -> Result<Vec<JobRecord>, StoreError>;
}

/// Job store held in memory
#[derive(Default)]
pub struct InMemoryJobStore {
    records: DashMap<JobId, JobRecord>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, record: JobRecord) -> Result<(), StoreError> {
        match self.records.entry(record.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.get(&job_id).map(|r| r.value().clone()))
    }

    async fn complete(
        &self,
        job_id: JobId,
        correlation_id: CorrelationId,
        outcome: JobOutcome,
    ) -> Result<Completion, StoreError> {
        // The shard stays write locked until `record` is dropped
        let Some(mut record) = self.records.get_mut(&job_id) else {
            return Ok(Completion::Missing);
        };
        if record.correlation_id != correlation_id {
            return Ok(Completion::CorrelationMismatch {
                stored: record.correlation_id,
            });
        }
        if !record.outcome.is_pending() {
            return Ok(Completion::AlreadyCompleted);
        }
        record.outcome = outcome;
        record.completed_at = Some(Utc::now());
        Ok(Completion::Applied(Box::new(record.clone())))
    }

    async fn set_regulation(
        &self,
        job_id: JobId,
        state: RegulationState,
    ) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.get_mut(&job_id).map(|mut record| {
            record.regulation = Some(state);
            record.clone()
        }))
    }

    async fn remove(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.remove(&job_id).map(|(_, record)| record))
    }

    async fn list_for_network(&self, network_id: &NetworkId) -> Result<Vec<JobRecord>, StoreError> {
        let mut records: Vec<JobRecord> = self
            .records
            .iter()
            .filter(|r| &r.network_id == network_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
