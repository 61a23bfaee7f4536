use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    reconciliation::{ReconciliationRun, ReconciliationStatus},
    standing::{AcademicRecord, PortalSyncState, StandingCounts},
    student::Student,
};

#[async_trait]
pub trait StudentRepository: Send + Sync {
    async fn upsert_student(&self, student: &Student) -> Result<()>;
    async fn get_student(&self, student_id: &str) -> Result<Option<Student>>;
    async fn find_student_by_position(
        &self,
        grade: i64,
        class_no: i64,
        student_no: i64,
    ) -> Result<Option<Student>>;
    async fn list_students(&self) -> Result<Vec<Student>>;
    /// Currently enrolled students only (grade != 0), in roster order.
    async fn list_active_students(&self) -> Result<Vec<Student>>;
    async fn get_standing_counts(&self) -> Result<StandingCounts>;
}

#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    async fn upsert_sync_state(&self, state: &PortalSyncState) -> Result<()>;
    async fn get_sync_state(&self, student_id: &str) -> Result<Option<PortalSyncState>>;
    async fn list_sync_states(&self) -> Result<Vec<PortalSyncState>>;
}

#[async_trait]
pub trait AcademicRecordRepository: Send + Sync {
    async fn upsert_record(&self, record: &AcademicRecord) -> Result<()>;
    async fn get_record(&self, student_id: &str) -> Result<Option<AcademicRecord>>;
    async fn list_records(&self) -> Result<Vec<AcademicRecord>>;
    /// Persist a refresh outcome — sync state and academic record together,
    /// atomically, so two concurrent refreshes of the same student never
    /// interleave partial writes.
    async fn persist_refresh(
        &self,
        state: &PortalSyncState,
        record: &AcademicRecord,
    ) -> Result<()>;
}

#[async_trait]
pub trait ReconciliationRunRepository: Send + Sync {
    async fn create_reconciliation_run(&self) -> Result<ReconciliationRun>;
    #[allow(clippy::too_many_arguments)]
    async fn update_reconciliation_run(
        &self,
        id: i64,
        status: ReconciliationStatus,
        students_attempted: i64,
        refreshed: i64,
        credential_failures: i64,
        transient_failures: i64,
        skipped: i64,
        error_message: Option<&str>,
    ) -> Result<()>;
    async fn get_reconciliation_run(&self, id: i64) -> Result<Option<ReconciliationRun>>;
    async fn get_latest_reconciliation_run(&self) -> Result<Option<ReconciliationRun>>;
}

/// Combined repository trait for all entity types.
pub trait StandingsRepository:
    StudentRepository + SyncStateRepository + AcademicRecordRepository + ReconciliationRunRepository
{
}
