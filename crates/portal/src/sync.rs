//! Sync engine — answers "fresh-enough standing for student X" from the
//! cache, refreshing through a portal session when the cache is stale.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, info};

use standings_core::db::repository::StandingsRepository;
use standings_core::error::{Result, StandingsError};
use standings_core::models::standing::{AcademicRecord, PortalSyncState};
use standings_core::models::student::Student;

use crate::client::PortalClient;
use crate::extract;

/// A student's standing as rendered to its owner. In the login-error state
/// the cached numbers are untrustworthy and are omitted.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StandingStatus {
    pub student_id: String,
    pub login_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_point: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_point: Option<i64>,
    pub last_update: DateTime<Utc>,
}

impl StandingStatus {
    fn render(state: &PortalSyncState, record: &AcademicRecord) -> Self {
        if state.login_error {
            Self {
                student_id: state.student_id.clone(),
                login_error: true,
                score: None,
                positive_point: None,
                negative_point: None,
                last_update: Utc::now(),
            }
        } else {
            Self {
                student_id: state.student_id.clone(),
                login_error: false,
                score: Some(record.score),
                positive_point: Some(record.positive_point),
                negative_point: Some(record.negative_point),
                last_update: record.modified_at.unwrap_or_else(Utc::now),
            }
        }
    }
}

/// Detail view of a freshly refreshed standing, raw portal payloads
/// included for audit.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StandingDetail {
    pub student_id: String,
    pub login_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_point: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_point: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_score_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_point_html: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl StandingDetail {
    fn render(state: &PortalSyncState, record: &AcademicRecord) -> Self {
        if state.login_error {
            Self {
                student_id: state.student_id.clone(),
                login_error: true,
                score: None,
                positive_point: None,
                negative_point: None,
                raw_score_html: None,
                raw_point_html: None,
                last_update: Utc::now(),
            }
        } else {
            Self {
                student_id: state.student_id.clone(),
                login_error: false,
                score: Some(record.score),
                positive_point: Some(record.positive_point),
                negative_point: Some(record.negative_point),
                raw_score_html: record.raw_score_html.clone(),
                raw_point_html: record.raw_point_html.clone(),
                last_update: record.modified_at.unwrap_or_else(Utc::now),
            }
        }
    }
}

/// Whether a timestamp falls on the current local calendar day. Cache
/// freshness is day-granular: one successful sync per day is enough.
fn is_current_day(ts: DateTime<Utc>) -> bool {
    ts.with_timezone(&Local).date_naive() == Local::now().date_naive()
}

/// Orchestrates portal sessions, extraction, and the record store.
pub struct SyncEngine<R: StandingsRepository> {
    repo: Arc<R>,
    portal: PortalClient,
}

impl<R: StandingsRepository> SyncEngine<R> {
    pub fn new(repo: Arc<R>, portal: PortalClient) -> Self {
        Self { repo, portal }
    }

    /// The student's own standing, served from cache when it was refreshed
    /// on the current calendar day (a login-error state renders as such
    /// without touching the portal), refreshed otherwise.
    pub async fn get_own_status(&self, student_id: &str) -> Result<StandingStatus> {
        let student = self.require_student(student_id).await?;

        if let (Some(state), Some(record)) = (
            self.repo.get_sync_state(student_id).await?,
            self.repo.get_record(student_id).await?,
        ) {
            if record.modified_at.is_some_and(is_current_day) {
                debug!(student_id, "serving cached standing");
                return Ok(StandingStatus::render(&state, &record));
            }
        }

        let (state, record) = self.refresh(&student, None).await?;
        Ok(StandingStatus::render(&state, &record))
    }

    /// Force a refresh of the student's own standing, bypassing the cache.
    pub async fn refresh_own_status(&self, student_id: &str) -> Result<StandingStatus> {
        let student = self.require_student(student_id).await?;
        let (state, record) = self.refresh(&student, None).await?;
        Ok(StandingStatus::render(&state, &record))
    }

    /// Detail lookup of a student addressed by position. A non-self viewer
    /// must pass the permission check and the subject must not have opted
    /// out of sharing. Always refreshes, using the supplied password or the
    /// subject's own identifier.
    pub async fn get_detail(
        &self,
        viewer_id: &str,
        grade: i64,
        class_no: i64,
        student_no: i64,
        password: Option<&str>,
    ) -> Result<StandingDetail> {
        let target = self
            .repo
            .find_student_by_position(grade, class_no, student_no)
            .await?
            .ok_or_else(|| {
                StandingsError::NotFound(format!(
                    "no student at {grade}-{class_no}-{student_no}"
                ))
            })?;

        if target.student_id != viewer_id {
            let viewer_state = self
                .repo
                .get_sync_state(viewer_id)
                .await?
                .ok_or_else(|| {
                    StandingsError::NotFound(format!("no sync state for viewer {viewer_id}"))
                })?;
            viewer_state.permission_check()?;

            if let Some(target_state) = self.repo.get_sync_state(&target.student_id).await? {
                if target_state.private_ranking {
                    return Err(StandingsError::PermissionDenied(
                        "the student declined to share their standing".into(),
                    ));
                }
            }
        }

        let (state, record) = self.refresh(&target, password).await?;
        Ok(StandingDetail::render(&state, &record))
    }

    /// Run one full portal sync for a student: login, fetch both pages,
    /// extract, persist. State and record are created lazily on first
    /// contact.
    ///
    /// A rejected login is a recognized, renderable state: the login-error
    /// flag is set, the stale record is stamped and returned, and nothing is
    /// raised. Transport and parse failures propagate and persist nothing.
    pub async fn refresh(
        &self,
        student: &Student,
        password: Option<&str>,
    ) -> Result<(PortalSyncState, AcademicRecord)> {
        let now = Utc::now();
        let (mut state, mut record) = self.find_or_create(&student.student_id).await?;
        let session = self.portal.open_session()?;
        let password = password.unwrap_or(&student.student_id);

        match session.login(student, password).await {
            Ok(()) => {}
            Err(StandingsError::CredentialRejected) => {
                info!(student_id = %student.student_id, "portal rejected credentials; flagging login error");
                state.login_error = true;
                state.updated_at = now;
                record.modified_at = Some(now);
                self.repo.persist_refresh(&state, &record).await?;
                return Ok((state, record));
            }
            Err(e) => return Err(e),
        }

        let score_html = session.fetch_score_html(&student.student_id).await?;
        let point_html = session.fetch_point_html().await?;
        session.logout().await;

        let score = extract::extract_score(&score_html)?;
        let (positive_point, negative_point) = extract::extract_points(&point_html);

        if state.login_error {
            info!(student_id = %student.student_id, "portal login recovered; clearing login error");
        }
        state.login_error = false;
        state.updated_at = now;
        record.score = score;
        record.positive_point = positive_point;
        record.negative_point = negative_point;
        record.raw_score_html = Some(score_html);
        record.raw_point_html = Some(point_html);
        record.modified_at = Some(now);
        self.repo.persist_refresh(&state, &record).await?;

        Ok((state, record))
    }

    async fn require_student(&self, student_id: &str) -> Result<Student> {
        self.repo
            .get_student(student_id)
            .await?
            .ok_or_else(|| StandingsError::NotFound(format!("unknown student {student_id}")))
    }

    async fn find_or_create(
        &self,
        student_id: &str,
    ) -> Result<(PortalSyncState, AcademicRecord)> {
        let state = match self.repo.get_sync_state(student_id).await? {
            Some(state) => state,
            None => PortalSyncState::new(student_id, Utc::now()),
        };
        let record = match self.repo.get_record(student_id).await? {
            Some(record) => record,
            None => AcademicRecord::new(student_id),
        };
        Ok((state, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryRepo;
    use chrono::Duration;
    use standings_core::config::{PortalConfig, TrackConfig};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCORE_PAGE: &str = "<table><tr><td>이름</td><td>87.5</td></tr></table>";
    const POINT_PAGE: &str = "(상점 : 3점) 내역 (상점 : 2점) 내역 (벌점 : 1점)";

    fn sample_student(id: &str, grade: i64, class_no: i64, student_no: i64) -> Student {
        Student {
            student_id: id.to_string(),
            grade,
            class_no,
            student_no,
            name: format!("Student {id}"),
        }
    }

    fn make_engine(repo: Arc<MemoryRepo>, base_url: &str) -> SyncEngine<MemoryRepo> {
        let config = PortalConfig {
            enabled: true,
            base_url: base_url.to_string(),
            request_timeout_secs: 2,
            pace_ms: 0,
            tracks: TrackConfig::default(),
        };
        SyncEngine::new(repo, PortalClient::new(&config))
    }

    async fn mount_portal_success(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_suCert/bssm/B002/jnv_201j.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SCORE_PAGE))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ss/ss_a40j.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(POINT_PAGE))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logout.php"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn refresh_creates_and_fills_record() {
        let server = MockServer::start().await;
        mount_portal_success(&server).await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let engine = make_engine(repo.clone(), &server.uri());

        let status = engine.refresh_own_status("2201").await.unwrap();
        assert!(!status.login_error);
        assert_eq!(status.score, Some(87.5));
        assert_eq!(status.positive_point, Some(5));
        assert_eq!(status.negative_point, Some(1));

        let record = repo.record("2201").unwrap();
        assert_eq!(record.raw_score_html.as_deref(), Some(SCORE_PAGE));
        assert_eq!(record.raw_point_html.as_deref(), Some(POINT_PAGE));
        assert!(record.modified_at.is_some());
        assert!(!repo.state("2201").unwrap().login_error);
    }

    #[tokio::test]
    async fn cached_today_served_without_portal_calls() {
        // The portal is unreachable; a same-day record must be served as-is.
        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        repo.seed_state(PortalSyncState::new("2201", Utc::now()));
        let mut record = AcademicRecord::new("2201");
        record.score = 91.0;
        record.positive_point = 4;
        record.modified_at = Some(Utc::now());
        repo.seed_record(record);

        let engine = make_engine(repo, "http://127.0.0.1:1");
        let status = engine.get_own_status("2201").await.unwrap();
        assert_eq!(status.score, Some(91.0));
        assert_eq!(status.positive_point, Some(4));
    }

    #[tokio::test]
    async fn login_error_cached_today_renders_without_portal_calls() {
        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let mut state = PortalSyncState::new("2201", Utc::now());
        state.login_error = true;
        repo.seed_state(state);
        let mut record = AcademicRecord::new("2201");
        record.score = 91.0;
        record.modified_at = Some(Utc::now());
        repo.seed_record(record);

        let engine = make_engine(repo, "http://127.0.0.1:1");
        let status = engine.get_own_status("2201").await.unwrap();
        assert!(status.login_error);
        assert_eq!(status.score, None);
        assert_eq!(status.positive_point, None);
    }

    #[tokio::test]
    async fn stale_record_triggers_refresh() {
        let server = MockServer::start().await;
        mount_portal_success(&server).await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        repo.seed_state(PortalSyncState::new("2201", Utc::now()));
        let mut record = AcademicRecord::new("2201");
        record.score = 10.0;
        record.modified_at = Some(Utc::now() - Duration::days(2));
        repo.seed_record(record);

        let engine = make_engine(repo.clone(), &server.uri());
        let status = engine.get_own_status("2201").await.unwrap();
        assert_eq!(status.score, Some(87.5));
        assert!(repo
            .record("2201")
            .unwrap()
            .modified_at
            .is_some_and(is_current_day));
    }

    #[tokio::test]
    async fn never_synced_triggers_refresh() {
        let server = MockServer::start().await;
        mount_portal_success(&server).await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let engine = make_engine(repo, &server.uri());
        let status = engine.get_own_status("2201").await.unwrap();
        assert_eq!(status.score, Some(87.5));
    }

    #[tokio::test]
    async fn unknown_student_is_not_found() {
        let repo = Arc::new(MemoryRepo::new(vec![]));
        let engine = make_engine(repo, "http://127.0.0.1:1");
        let err = engine.get_own_status("nope").await.unwrap_err();
        assert!(matches!(err, StandingsError::NotFound(_)));
    }

    #[tokio::test]
    async fn credential_rejected_flags_without_failing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("false"))
            .mount(&server)
            .await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let engine = make_engine(repo.clone(), &server.uri());

        let status = engine.refresh_own_status("2201").await.unwrap();
        assert!(status.login_error);
        assert_eq!(status.score, None);

        let state = repo.state("2201").unwrap();
        assert!(state.login_error);
        // The record is stamped so the login-error state is served from
        // cache for the rest of the day.
        assert!(repo
            .record("2201")
            .unwrap()
            .modified_at
            .is_some_and(is_current_day));
    }

    #[tokio::test]
    async fn successful_login_clears_login_error() {
        let server = MockServer::start().await;
        mount_portal_success(&server).await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let mut state = PortalSyncState::new("2201", Utc::now());
        state.login_error = true;
        repo.seed_state(state);
        repo.seed_record(AcademicRecord::new("2201"));

        let engine = make_engine(repo.clone(), &server.uri());
        let status = engine.refresh_own_status("2201").await.unwrap();
        assert!(!status.login_error);
        assert!(!repo.state("2201").unwrap().login_error);
    }

    #[tokio::test]
    async fn transport_error_propagates_and_persists_nothing() {
        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let engine = make_engine(repo.clone(), "http://127.0.0.1:1");

        let err = engine.refresh_own_status("2201").await.unwrap_err();
        assert!(matches!(err, StandingsError::Transport(_)));
        assert!(repo.state("2201").is_none());
        assert!(repo.record("2201").is_none());
    }

    #[tokio::test]
    async fn fetch_failure_leaves_record_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_suCert/bssm/B002/jnv_201j.php"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let mut record = AcademicRecord::new("2201");
        record.score = 55.0;
        record.modified_at = Some(Utc::now() - Duration::days(3));
        repo.seed_state(PortalSyncState::new("2201", Utc::now()));
        repo.seed_record(record.clone());

        let engine = make_engine(repo.clone(), &server.uri());
        let err = engine.refresh_own_status("2201").await.unwrap_err();
        assert!(matches!(err, StandingsError::Transport(_)));
        assert_eq!(repo.record("2201").unwrap(), record);
        assert!(!repo.state("2201").unwrap().login_error);
    }

    #[tokio::test]
    async fn drifted_score_page_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_suCert/bssm/B002/jnv_201j.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<td>1.2.3</td>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ss/ss_a40j.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logout.php"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let engine = make_engine(repo.clone(), &server.uri());
        let err = engine.refresh_own_status("2201").await.unwrap_err();
        assert!(matches!(err, StandingsError::Parse(_)));
        assert!(repo.record("2201").is_none());
    }

    #[tokio::test]
    async fn detail_self_uses_supplied_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .and(body_string_contains("pw=custom-password"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_suCert/bssm/B002/jnv_201j.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SCORE_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ss/ss_a40j.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(POINT_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logout.php"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let engine = make_engine(repo, &server.uri());

        let detail = engine
            .get_detail("2201", 2, 2, 1, Some("custom-password"))
            .await
            .unwrap();
        assert_eq!(detail.score, Some(87.5));
        assert_eq!(detail.raw_score_html.as_deref(), Some(SCORE_PAGE));
        assert_eq!(detail.raw_point_html.as_deref(), Some(POINT_PAGE));
    }

    #[tokio::test]
    async fn detail_unknown_position_is_not_found() {
        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let engine = make_engine(repo, "http://127.0.0.1:1");
        let err = engine.get_detail("2201", 3, 1, 9, None).await.unwrap_err();
        assert!(matches!(err, StandingsError::NotFound(_)));
    }

    #[tokio::test]
    async fn detail_viewer_without_state_is_not_found() {
        let repo = Arc::new(MemoryRepo::new(vec![
            sample_student("2201", 2, 2, 1),
            sample_student("3105", 3, 1, 5),
        ]));
        let engine = make_engine(repo, "http://127.0.0.1:1");
        let err = engine.get_detail("3105", 2, 2, 1, None).await.unwrap_err();
        assert!(matches!(err, StandingsError::NotFound(_)));
    }

    #[tokio::test]
    async fn detail_viewer_with_login_error_denied() {
        let repo = Arc::new(MemoryRepo::new(vec![
            sample_student("2201", 2, 2, 1),
            sample_student("3105", 3, 1, 5),
        ]));
        let mut viewer_state = PortalSyncState::new("3105", Utc::now());
        viewer_state.login_error = true;
        repo.seed_state(viewer_state);

        let engine = make_engine(repo, "http://127.0.0.1:1");
        let err = engine.get_detail("3105", 2, 2, 1, None).await.unwrap_err();
        assert!(matches!(err, StandingsError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn detail_private_viewer_denied() {
        let repo = Arc::new(MemoryRepo::new(vec![
            sample_student("2201", 2, 2, 1),
            sample_student("3105", 3, 1, 5),
        ]));
        let mut viewer_state = PortalSyncState::new("3105", Utc::now());
        viewer_state.private_ranking = true;
        repo.seed_state(viewer_state);

        let engine = make_engine(repo, "http://127.0.0.1:1");
        let err = engine.get_detail("3105", 2, 2, 1, None).await.unwrap_err();
        assert!(matches!(err, StandingsError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn detail_private_subject_blocks_others() {
        let repo = Arc::new(MemoryRepo::new(vec![
            sample_student("2201", 2, 2, 1),
            sample_student("3105", 3, 1, 5),
        ]));
        repo.seed_state(PortalSyncState::new("3105", Utc::now()));
        let mut subject_state = PortalSyncState::new("2201", Utc::now());
        subject_state.private_ranking = true;
        repo.seed_state(subject_state);

        let engine = make_engine(repo, "http://127.0.0.1:1");
        let err = engine.get_detail("3105", 2, 2, 1, None).await.unwrap_err();
        assert!(matches!(err, StandingsError::PermissionDenied(_)));
    }

    #[test]
    fn login_error_status_serializes_without_numbers() {
        let mut state = PortalSyncState::new("2201", Utc::now());
        state.login_error = true;
        let status = StandingStatus::render(&state, &AcademicRecord::new("2201"));
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"loginError\":true"));
        assert!(!json.contains("\"score\""));
        assert!(!json.contains("\"positivePoint\""));
    }

    #[tokio::test]
    async fn detail_private_subject_still_visible_to_self() {
        let server = MockServer::start().await;
        mount_portal_success(&server).await;

        let repo = Arc::new(MemoryRepo::new(vec![sample_student("2201", 2, 2, 1)]));
        let mut state = PortalSyncState::new("2201", Utc::now());
        state.private_ranking = true;
        repo.seed_state(state);

        let engine = make_engine(repo, &server.uri());
        let detail = engine.get_detail("2201", 2, 2, 1, None).await.unwrap();
        assert_eq!(detail.score, Some(87.5));
    }
}
