//! HTTP client for the certification portal.
//!
//! The portal is session-authenticated: every operation opens a fresh
//! cookie-jar client, logs in with form-encoded POSTs, fetches the score and
//! point pages, and logs out. Nothing about the session outlives one
//! operation.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use standings_core::config::{PortalConfig, TrackConfig};
use standings_core::error::{Result, StandingsError};
use standings_core::models::student::Student;

const LOGIN_PATH: &str = "/inc/common_json.php";
const SCORE_PATH: &str = "/_suCert/bssm/B002/jnv_201j.php";
const POINT_PATH: &str = "/ss/ss_a40j.php";
const LOGOUT_PATH: &str = "/logout.php";

/// Department track name the portal login form expects for a student.
/// First-grade students share the common track; from the second grade on,
/// classes 1–2 are the software track and the rest the embedded track.
pub fn track_name(grade: i64, class_no: i64, tracks: &TrackConfig) -> &str {
    if grade == 1 {
        &tracks.common
    } else if class_no <= 2 {
        &tracks.software
    } else {
        &tracks.embedded
    }
}

/// Factory for portal sessions. Holds portal configuration only; the
/// cookie-bearing HTTP client lives in the [`PortalSession`] it hands out.
#[derive(Clone)]
pub struct PortalClient {
    base_url: String,
    timeout: Duration,
    tracks: TrackConfig,
}

impl PortalClient {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            tracks: config.tracks.clone(),
        }
    }

    /// Open a fresh session against the portal. Each session carries its own
    /// cookie jar, so the portal-side login is scoped to one operation.
    pub fn open_session(&self) -> Result<PortalSession> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .build()?;
        Ok(PortalSession {
            http,
            base_url: self.base_url.clone(),
            tracks: self.tracks.clone(),
        })
    }
}

/// One authenticated scrape session: login, two fetches, logout.
pub struct PortalSession {
    http: Client,
    base_url: String,
    tracks: TrackConfig,
}

impl PortalSession {
    /// Log in as the given student. The portal answers a bare `true` body on
    /// success; any other completed response means the credentials were
    /// rejected. Network and protocol failures are transport errors.
    pub async fn login(&self, student: &Student, password: &str) -> Result<()> {
        let track = track_name(student.grade, student.class_no, &self.tracks);
        let grade = student.grade.to_string();
        let class_no = student.class_no.to_string();
        let student_no = student.student_no.to_string();

        let response = self
            .http
            .post(format!("{}{LOGIN_PATH}", self.base_url))
            .form(&[
                ("caseBy", "login"),
                ("pw", password),
                ("lgtype", "S"),
                ("hakgwa", track),
                ("hak", &grade),
                ("ban", &class_no),
                ("bun", &student_no),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "portal login returned non-success status");
            return Err(StandingsError::CredentialRejected);
        }

        let body = response.text().await?;
        if body != "true" {
            return Err(StandingsError::CredentialRejected);
        }
        Ok(())
    }

    /// Fetch the raw HTML of the score page for the logged-in session.
    pub async fn fetch_score_html(&self, student_id: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}{SCORE_PATH}", self.base_url))
            .form(&[("caseBy", "getViewer"), ("uniqNo", student_id)])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Fetch the raw HTML of the conduct-point listing page. The page size
    /// is large enough to merge every entry onto one page.
    pub async fn fetch_point_html(&self) -> Result<String> {
        let response = self
            .http
            .post(format!("{}{POINT_PATH}", self.base_url))
            .form(&[
                ("caseBy", "listview"),
                ("pageNumber", "1"),
                ("onPageCnt", "100"),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// End the portal session. Best effort: a failed logout is logged and
    /// swallowed, the cookie jar dies with the session either way.
    pub async fn logout(&self) {
        if let Err(e) = self
            .http
            .get(format!("{}{LOGOUT_PATH}", self.base_url))
            .send()
            .await
        {
            debug!(error = %e, "portal logout failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use standings_core::config::PortalConfig;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> PortalConfig {
        PortalConfig {
            enabled: true,
            base_url: base_url.to_string(),
            request_timeout_secs: 2,
            pace_ms: 0,
            tracks: TrackConfig::default(),
        }
    }

    fn sample_student() -> Student {
        Student {
            student_id: "2201".to_string(),
            grade: 2,
            class_no: 2,
            student_no: 1,
            name: "Kim Cheolsu".to_string(),
        }
    }

    #[test]
    fn track_name_first_grade_is_common() {
        let tracks = TrackConfig::default();
        assert_eq!(track_name(1, 1, &tracks), "공통과정");
        assert_eq!(track_name(1, 4, &tracks), "공통과정");
    }

    #[test]
    fn track_name_lower_classes_are_software() {
        let tracks = TrackConfig::default();
        assert_eq!(track_name(2, 1, &tracks), "소프트웨어개발과");
        assert_eq!(track_name(2, 2, &tracks), "소프트웨어개발과");
        assert_eq!(track_name(3, 2, &tracks), "소프트웨어개발과");
    }

    #[test]
    fn track_name_upper_classes_are_embedded() {
        let tracks = TrackConfig::default();
        assert_eq!(track_name(2, 3, &tracks), "임베디드소프트웨어과");
        assert_eq!(track_name(3, 4, &tracks), "임베디드소프트웨어과");
    }

    #[tokio::test]
    async fn login_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .and(body_string_contains("caseBy=login"))
            .and(body_string_contains("lgtype=S"))
            .and(body_string_contains("hak=2&ban=2&bun=1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .expect(1)
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        session.login(&sample_student(), "2201").await.unwrap();
    }

    #[tokio::test]
    async fn login_sends_supplied_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .and(body_string_contains("pw=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .expect(1)
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        session.login(&sample_student(), "secret").await.unwrap();
    }

    #[tokio::test]
    async fn login_wrong_body_is_credential_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("false"))
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        let err = session.login(&sample_student(), "wrong").await.unwrap_err();
        assert!(matches!(err, StandingsError::CredentialRejected));
    }

    #[tokio::test]
    async fn login_error_status_is_credential_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        let err = session.login(&sample_student(), "2201").await.unwrap_err();
        assert!(matches!(err, StandingsError::CredentialRejected));
    }

    #[tokio::test]
    async fn login_connection_refused_is_transport() {
        let client = PortalClient::new(&test_config("http://127.0.0.1:1"));
        let session = client.open_session().unwrap();
        let err = session.login(&sample_student(), "2201").await.unwrap_err();
        assert!(matches!(err, StandingsError::Transport(_)));
    }

    #[tokio::test]
    async fn login_timeout_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("true")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        let err = session.login(&sample_student(), "2201").await.unwrap_err();
        assert!(matches!(err, StandingsError::Transport(_)));
    }

    #[tokio::test]
    async fn fetch_score_html_posts_student_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_suCert/bssm/B002/jnv_201j.php"))
            .and(body_string_contains("caseBy=getViewer"))
            .and(body_string_contains("uniqNo=2201"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<td>87.5</td>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        let html = session.fetch_score_html("2201").await.unwrap();
        assert_eq!(html, "<td>87.5</td>");
    }

    #[tokio::test]
    async fn fetch_score_error_status_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_suCert/bssm/B002/jnv_201j.php"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        let err = session.fetch_score_html("2201").await.unwrap_err();
        assert!(matches!(err, StandingsError::Transport(_)));
    }

    #[tokio::test]
    async fn fetch_point_html_requests_merged_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ss/ss_a40j.php"))
            .and(body_string_contains("caseBy=listview"))
            .and(body_string_contains("pageNumber=1"))
            .and(body_string_contains("onPageCnt=100"))
            .respond_with(ResponseTemplate::new(200).set_body_string("(상점 : 3"))
            .expect(1)
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        let html = session.fetch_point_html().await.unwrap();
        assert_eq!(html, "(상점 : 3");
    }

    #[tokio::test]
    async fn logout_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logout.php"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = PortalClient::new(&test_config(&server.uri()));
        let session = client.open_session().unwrap();
        session.logout().await;
    }

    #[tokio::test]
    async fn logout_unreachable_is_swallowed() {
        let client = PortalClient::new(&test_config("http://127.0.0.1:1"));
        let session = client.open_session().unwrap();
        session.logout().await;
    }

    #[tokio::test]
    async fn base_url_trailing_slash_trimmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inc/common_json.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.base_url = format!("{}/", server.uri());
        let client = PortalClient::new(&config);
        let session = client.open_session().unwrap();
        session.login(&sample_student(), "2201").await.unwrap();
    }
}
