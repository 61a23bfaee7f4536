//! In-memory repository for engine, ranking, and scheduler tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use standings_core::db::repository::{
    AcademicRecordRepository, ReconciliationRunRepository, StandingsRepository, StudentRepository,
    SyncStateRepository,
};
use standings_core::error::Result;
use standings_core::models::reconciliation::{ReconciliationRun, ReconciliationStatus};
use standings_core::models::standing::{AcademicRecord, PortalSyncState, StandingCounts};
use standings_core::models::student::Student;

pub(crate) struct MemoryRepo {
    students: Vec<Student>,
    states: Mutex<HashMap<String, PortalSyncState>>,
    records: Mutex<HashMap<String, AcademicRecord>>,
    runs: Mutex<Vec<ReconciliationRun>>,
}

impl MemoryRepo {
    pub(crate) fn new(students: Vec<Student>) -> Self {
        Self {
            students,
            states: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn seed_state(&self, state: PortalSyncState) {
        self.states
            .lock()
            .unwrap()
            .insert(state.student_id.clone(), state);
    }

    pub(crate) fn seed_record(&self, record: AcademicRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.student_id.clone(), record);
    }

    pub(crate) fn state(&self, student_id: &str) -> Option<PortalSyncState> {
        self.states.lock().unwrap().get(student_id).cloned()
    }

    pub(crate) fn record(&self, student_id: &str) -> Option<AcademicRecord> {
        self.records.lock().unwrap().get(student_id).cloned()
    }

    pub(crate) fn runs(&self) -> Vec<ReconciliationRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl StudentRepository for MemoryRepo {
    async fn upsert_student(&self, _student: &Student) -> Result<()> {
        Ok(())
    }

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        Ok(self
            .students
            .iter()
            .find(|s| s.student_id == student_id)
            .cloned())
    }

    async fn find_student_by_position(
        &self,
        grade: i64,
        class_no: i64,
        student_no: i64,
    ) -> Result<Option<Student>> {
        Ok(self
            .students
            .iter()
            .find(|s| s.grade == grade && s.class_no == class_no && s.student_no == student_no)
            .cloned())
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        Ok(self.students.clone())
    }

    async fn list_active_students(&self) -> Result<Vec<Student>> {
        Ok(self
            .students
            .iter()
            .filter(|s| s.is_active())
            .cloned()
            .collect())
    }

    async fn get_standing_counts(&self) -> Result<StandingCounts> {
        Ok(StandingCounts {
            students: self.students.len() as i64,
            active_students: self.students.iter().filter(|s| s.is_active()).count() as i64,
            cached_records: self.records.lock().unwrap().len() as i64,
            login_errors: 0,
            privacy_opt_outs: 0,
        })
    }
}

#[async_trait]
impl SyncStateRepository for MemoryRepo {
    async fn upsert_sync_state(&self, state: &PortalSyncState) -> Result<()> {
        self.seed_state(state.clone());
        Ok(())
    }

    async fn get_sync_state(&self, student_id: &str) -> Result<Option<PortalSyncState>> {
        Ok(self.state(student_id))
    }

    async fn list_sync_states(&self) -> Result<Vec<PortalSyncState>> {
        Ok(self.states.lock().unwrap().values().cloned().collect())
    }
}

#[async_trait]
impl AcademicRecordRepository for MemoryRepo {
    async fn upsert_record(&self, record: &AcademicRecord) -> Result<()> {
        self.seed_record(record.clone());
        Ok(())
    }

    async fn get_record(&self, student_id: &str) -> Result<Option<AcademicRecord>> {
        Ok(self.record(student_id))
    }

    async fn list_records(&self) -> Result<Vec<AcademicRecord>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn persist_refresh(
        &self,
        state: &PortalSyncState,
        record: &AcademicRecord,
    ) -> Result<()> {
        self.seed_state(state.clone());
        self.seed_record(record.clone());
        Ok(())
    }
}

#[async_trait]
impl ReconciliationRunRepository for MemoryRepo {
    async fn create_reconciliation_run(&self) -> Result<ReconciliationRun> {
        let mut runs = self.runs.lock().unwrap();
        let run = ReconciliationRun {
            id: runs.len() as i64 + 1,
            status: ReconciliationStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            students_attempted: 0,
            refreshed: 0,
            credential_failures: 0,
            transient_failures: 0,
            skipped: 0,
            error_message: None,
        };
        runs.push(run.clone());
        Ok(run)
    }

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
    ) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.iter_mut().find(|r| r.id == id) {
            run.status = status;
            run.completed_at = Some(Utc::now());
            run.students_attempted = students_attempted;
            run.refreshed = refreshed;
            run.credential_failures = credential_failures;
            run.transient_failures = transient_failures;
            run.skipped = skipped;
            run.error_message = error_message.map(|s| s.to_string());
        }
        Ok(())
    }

    async fn get_reconciliation_run(&self, id: i64) -> Result<Option<ReconciliationRun>> {
        Ok(self.runs.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn get_latest_reconciliation_run(&self) -> Result<Option<ReconciliationRun>> {
        Ok(self.runs.lock().unwrap().last().cloned())
    }
}

impl StandingsRepository for MemoryRepo {}
