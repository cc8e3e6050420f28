//! Persistent row store interface.
//!
//! The coordinator only talks to storage through [`JobStore`]. Implementations
//! must make [`JobStore::claim_step`] and [`JobStore::insert_steps`] atomic;
//! every other call is a plain point read or row write.

mod memory;
mod retrying;

pub use memory::InMemoryJobStore;
pub use retrying::RetryingStore;

use crate::core::StepName;
use crate::errors::PersistenceError;
use crate::ledger::{Job, PipelineStepRecord};
use crate::utils::Timestamp;
use async_trait::async_trait;
use uuid::Uuid;

/// Row-level storage for jobs and their step ledgers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job row.
    async fn insert_job(&self, job: Job) -> Result<(), PersistenceError>;

    /// Point read of a job row.
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, PersistenceError>;

    /// Overwrites a job row.
    async fn update_job(&self, job: Job) -> Result<(), PersistenceError>;

    /// Inserts the ledger rows for a job if it has none.
    ///
    /// Returns `false` without writing when rows already exist.
    async fn insert_steps(
        &self,
        job_id: Uuid,
        steps: Vec<PipelineStepRecord>,
    ) -> Result<bool, PersistenceError>;

    /// All ledger rows of a job ordered by `step_order`.
    async fn get_steps(&self, job_id: Uuid) -> Result<Vec<PipelineStepRecord>, PersistenceError>;

    /// Point read of one ledger row.
    async fn get_step(
        &self,
        job_id: Uuid,
        step: StepName,
    ) -> Result<Option<PipelineStepRecord>, PersistenceError>;

    /// Overwrites one ledger row.
    async fn update_step(&self, record: PipelineStepRecord) -> Result<(), PersistenceError>;

    /// Atomically moves a `pending` or `failed` row to `processing`.
    ///
    /// Returns the updated row, or `None` when the row is in any other status
    /// (typically because another worker claimed it first).
    async fn claim_step(
        &self,
        job_id: Uuid,
        step: StepName,
        at: Timestamp,
    ) -> Result<Option<PipelineStepRecord>, PersistenceError>;
}
