use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::{
    reconciliation::{ReconciliationRun, ReconciliationStatus},
    standing::{AcademicRecord, PortalSyncState, StandingCounts},
    student::Student,
};

use super::repository::{
    AcademicRecordRepository, ReconciliationRunRepository, StandingsRepository, StudentRepository,
    SyncStateRepository,
};

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl StandingsRepository for SqliteRepository {}

// -- Helper functions for mapping rows and enums --

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn datetime_to_str(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_reconciliation_status(s: &str) -> ReconciliationStatus {
    match s {
        "running" => ReconciliationStatus::Running,
        "failed" => ReconciliationStatus::Failed,
        _ => ReconciliationStatus::Completed,
    }
}

fn reconciliation_status_to_str(status: &ReconciliationStatus) -> &'static str {
    match status {
        ReconciliationStatus::Running => "running",
        ReconciliationStatus::Completed => "completed",
        ReconciliationStatus::Failed => "failed",
    }
}

fn row_to_student(r: &sqlx::sqlite::SqliteRow) -> Student {
    Student {
        student_id: r.get("student_id"),
        grade: r.get("grade"),
        class_no: r.get("class_no"),
        student_no: r.get("student_no"),
        name: r.get("name"),
    }
}

fn row_to_sync_state(r: &sqlx::sqlite::SqliteRow) -> PortalSyncState {
    PortalSyncState {
        student_id: r.get("student_id"),
        login_error: r.get("login_error"),
        private_ranking: r.get("private_ranking"),
        last_privacy_change_at: parse_datetime(r.get("last_privacy_change_at")),
        created_at: parse_datetime(r.get("created_at")),
        updated_at: parse_datetime(r.get("updated_at")),
    }
}

fn row_to_record(r: &sqlx::sqlite::SqliteRow) -> AcademicRecord {
    AcademicRecord {
        student_id: r.get("student_id"),
        score: r.get("score"),
        positive_point: r.get("positive_point"),
        negative_point: r.get("negative_point"),
        raw_score_html: r.get("raw_score_html"),
        raw_point_html: r.get("raw_point_html"),
        modified_at: r
            .get::<Option<String>, _>("modified_at")
            .map(|s| parse_datetime(&s)),
    }
}

fn row_to_run(r: &sqlx::sqlite::SqliteRow) -> ReconciliationRun {
    ReconciliationRun {
        id: r.get("id"),
        status: parse_reconciliation_status(r.get("status")),
        started_at: parse_datetime(r.get("started_at")),
        completed_at: r
            .get::<Option<String>, _>("completed_at")
            .map(|s| parse_datetime(&s)),
        students_attempted: r.get("students_attempted"),
        refreshed: r.get("refreshed"),
        credential_failures: r.get("credential_failures"),
        transient_failures: r.get("transient_failures"),
        skipped: r.get("skipped"),
        error_message: r.get("error_message"),
    }
}

// -- StudentRepository --

#[async_trait]
impl StudentRepository for SqliteRepository {
    async fn upsert_student(&self, student: &Student) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO students (student_id, grade, class_no, student_no, name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&student.student_id)
        .bind(student.grade)
        .bind(student.class_no)
        .bind(student.student_no)
        .bind(&student.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        let row = sqlx::query(
            "SELECT student_id, grade, class_no, student_no, name FROM students
             WHERE student_id = ?1",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_student(&r)))
    }

    async fn find_student_by_position(
        &self,
        grade: i64,
        class_no: i64,
        student_no: i64,
    ) -> Result<Option<Student>> {
        let row = sqlx::query(
            "SELECT student_id, grade, class_no, student_no, name FROM students
             WHERE grade = ?1 AND class_no = ?2 AND student_no = ?3",
        )
        .bind(grade)
        .bind(class_no)
        .bind(student_no)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_student(&r)))
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query(
            "SELECT student_id, grade, class_no, student_no, name FROM students
             ORDER BY grade, class_no, student_no",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_student).collect())
    }

    async fn list_active_students(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query(
            "SELECT student_id, grade, class_no, student_no, name FROM students
             WHERE grade != 0 ORDER BY grade, class_no, student_no",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_student).collect())
    }

    async fn get_standing_counts(&self) -> Result<StandingCounts> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM students) AS students,
                (SELECT COUNT(*) FROM students WHERE grade != 0) AS active_students,
                (SELECT COUNT(*) FROM academic_records) AS cached_records,
                (SELECT COUNT(*) FROM portal_sync_state WHERE login_error = 1) AS login_errors,
                (SELECT COUNT(*) FROM portal_sync_state WHERE private_ranking = 1) AS privacy_opt_outs",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StandingCounts {
            students: row.get("students"),
            active_students: row.get("active_students"),
            cached_records: row.get("cached_records"),
            login_errors: row.get("login_errors"),
            privacy_opt_outs: row.get("privacy_opt_outs"),
        })
    }
}

// -- SyncStateRepository --

#[async_trait]
impl SyncStateRepository for SqliteRepository {
    async fn upsert_sync_state(&self, state: &PortalSyncState) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO portal_sync_state
                 (student_id, login_error, private_ranking, last_privacy_change_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&state.student_id)
        .bind(state.login_error)
        .bind(state.private_ranking)
        .bind(datetime_to_str(&state.last_privacy_change_at))
        .bind(datetime_to_str(&state.created_at))
        .bind(datetime_to_str(&state.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_sync_state(&self, student_id: &str) -> Result<Option<PortalSyncState>> {
        let row = sqlx::query(
            "SELECT student_id, login_error, private_ranking, last_privacy_change_at, created_at, updated_at
             FROM portal_sync_state WHERE student_id = ?1",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_sync_state(&r)))
    }

    async fn list_sync_states(&self) -> Result<Vec<PortalSyncState>> {
        let rows = sqlx::query(
            "SELECT student_id, login_error, private_ranking, last_privacy_change_at, created_at, updated_at
             FROM portal_sync_state",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_sync_state).collect())
    }
}

// -- AcademicRecordRepository --

#[async_trait]
impl AcademicRecordRepository for SqliteRepository {
    async fn upsert_record(&self, record: &AcademicRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO academic_records
                 (student_id, score, positive_point, negative_point, raw_score_html, raw_point_html, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.student_id)
        .bind(record.score)
        .bind(record.positive_point)
        .bind(record.negative_point)
        .bind(&record.raw_score_html)
        .bind(&record.raw_point_html)
        .bind(record.modified_at.as_ref().map(datetime_to_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_record(&self, student_id: &str) -> Result<Option<AcademicRecord>> {
        let row = sqlx::query(
            "SELECT student_id, score, positive_point, negative_point, raw_score_html, raw_point_html, modified_at
             FROM academic_records WHERE student_id = ?1",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_record(&r)))
    }

    async fn list_records(&self) -> Result<Vec<AcademicRecord>> {
        let rows = sqlx::query(
            "SELECT student_id, score, positive_point, negative_point, raw_score_html, raw_point_html, modified_at
             FROM academic_records ORDER BY score DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn persist_refresh(
        &self,
        state: &PortalSyncState,
        record: &AcademicRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO portal_sync_state
                 (student_id, login_error, private_ranking, last_privacy_change_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&state.student_id)
        .bind(state.login_error)
        .bind(state.private_ranking)
        .bind(datetime_to_str(&state.last_privacy_change_at))
        .bind(datetime_to_str(&state.created_at))
        .bind(datetime_to_str(&state.updated_at))
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT OR REPLACE INTO academic_records
                 (student_id, score, positive_point, negative_point, raw_score_html, raw_point_html, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.student_id)
        .bind(record.score)
        .bind(record.positive_point)
        .bind(record.negative_point)
        .bind(&record.raw_score_html)
        .bind(&record.raw_point_html)
        .bind(record.modified_at.as_ref().map(datetime_to_str))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

// -- ReconciliationRunRepository --

#[async_trait]
impl ReconciliationRunRepository for SqliteRepository {
    async fn create_reconciliation_run(&self) -> Result<ReconciliationRun> {
        let started_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO reconciliation_runs (status, started_at) VALUES ('running', ?1)",
        )
        .bind(datetime_to_str(&started_at))
        .execute(&self.pool)
        .await?;
        Ok(ReconciliationRun {
            id: result.last_insert_rowid(),
            status: ReconciliationStatus::Running,
            started_at,
            completed_at: None,
            students_attempted: 0,
            refreshed: 0,
            credential_failures: 0,
            transient_failures: 0,
            skipped: 0,
            error_message: None,
        })
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
        sqlx::query(
            "UPDATE reconciliation_runs
             SET status = ?2, completed_at = ?3, students_attempted = ?4, refreshed = ?5,
                 credential_failures = ?6, transient_failures = ?7, skipped = ?8, error_message = ?9
             WHERE id = ?1",
        )
        .bind(id)
        .bind(reconciliation_status_to_str(&status))
        .bind(datetime_to_str(&Utc::now()))
        .bind(students_attempted)
        .bind(refreshed)
        .bind(credential_failures)
        .bind(transient_failures)
        .bind(skipped)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_reconciliation_run(&self, id: i64) -> Result<Option<ReconciliationRun>> {
        let row = sqlx::query("SELECT * FROM reconciliation_runs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_run(&r)))
    }

    async fn get_latest_reconciliation_run(&self) -> Result<Option<ReconciliationRun>> {
        let row = sqlx::query("SELECT * FROM reconciliation_runs ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_run(&r)))
    }
}
