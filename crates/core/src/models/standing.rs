use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StandingsError};

/// Per-student portal synchronization state, created lazily alongside the
/// first [`AcademicRecord`] and keyed by the same student identifier.
///
/// `last_privacy_change_at` moves only on a successful privacy toggle (it
/// is seeded to creation time), never by synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortalSyncState {
    pub student_id: String,
    /// True when the last sync attempt was rejected by the portal as a
    /// credential failure. Stays set until a successful login clears it;
    /// while set, the paired record's numbers are stale and must not be
    /// shown as real values.
    pub login_error: bool,
    /// Student opt-out from appearing with real numbers on the ranking.
    pub private_ranking: bool,
    pub last_privacy_change_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PortalSyncState {
    /// Fresh state for a student seen for the first time.
    pub fn new(student_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            student_id: student_id.to_string(),
            login_error: false,
            private_ranking: false,
            last_privacy_change_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check that the owner of this state may inspect other students'
    /// details or the shared ranking. A viewer whose own sync is broken, or
    /// who hides their own numbers, may not probe others.
    pub fn permission_check(&self) -> Result<()> {
        if self.login_error {
            return Err(StandingsError::PermissionDenied(
                "own portal sync is broken; re-authenticate through the portal first".into(),
            ));
        }
        if self.private_ranking {
            return Err(StandingsError::PermissionDenied(
                "ranking sharing must be enabled to view others".into(),
            ));
        }
        Ok(())
    }
}

/// Cached academic data scraped from the portal, 1:1 with
/// [`PortalSyncState`]. `modified_at` is `None` until the first sync
/// attempt completes; the raw HTML payloads are retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcademicRecord {
    pub student_id: String,
    pub score: f64,
    pub positive_point: i64,
    pub negative_point: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_score_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_point_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl AcademicRecord {
    /// Empty record for a student seen for the first time.
    pub fn new(student_id: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            score: 0.0,
            positive_point: 0,
            negative_point: 0,
            raw_score_html: None,
            raw_point_html: None,
            modified_at: None,
        }
    }
}

/// Aggregated roster and sync-state counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StandingCounts {
    pub students: i64,
    pub active_students: i64,
    pub cached_records: i64,
    pub login_errors: i64,
    pub privacy_opt_outs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_state() -> PortalSyncState {
        PortalSyncState::new("2201", Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap())
    }

    #[test]
    fn new_state_defaults() {
        let state = sample_state();
        assert!(!state.login_error);
        assert!(!state.private_ranking);
        assert_eq!(state.last_privacy_change_at, state.created_at);
    }

    #[test]
    fn state_round_trip() {
        let state = sample_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: PortalSyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn state_camel_case_fields() {
        let json = serde_json::to_string(&sample_state()).unwrap();
        assert!(json.contains("\"studentId\""));
        assert!(json.contains("\"loginError\""));
        assert!(json.contains("\"privateRanking\""));
        assert!(json.contains("\"lastPrivacyChangeAt\""));
    }

    #[test]
    fn permission_check_passes_for_clean_state() {
        sample_state().permission_check().unwrap();
    }

    #[test]
    fn permission_check_rejects_login_error() {
        let mut state = sample_state();
        state.login_error = true;
        let err = state.permission_check().unwrap_err();
        assert!(matches!(err, StandingsError::PermissionDenied(_)));
    }

    #[test]
    fn permission_check_rejects_private_ranking() {
        let mut state = sample_state();
        state.private_ranking = true;
        let err = state.permission_check().unwrap_err();
        assert!(matches!(err, StandingsError::PermissionDenied(_)));
    }

    #[test]
    fn new_record_is_empty() {
        let record = AcademicRecord::new("2201");
        assert_eq!(record.score, 0.0);
        assert_eq!(record.positive_point, 0);
        assert_eq!(record.negative_point, 0);
        assert!(record.modified_at.is_none());
    }

    #[test]
    fn record_optional_fields_omitted() {
        let record = AcademicRecord::new("2201");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("rawScoreHtml"));
        assert!(!json.contains("rawPointHtml"));
        assert!(!json.contains("modifiedAt"));
    }

    #[test]
    fn record_round_trip() {
        let record = AcademicRecord {
            student_id: "2201".into(),
            score: 87.5,
            positive_point: 5,
            negative_point: 1,
            raw_score_html: Some("<td>87.5</td>".into()),
            raw_point_html: Some("(상점 : 5".into()),
            modified_at: Some(Utc.with_ymd_and_hms(2025, 3, 2, 0, 10, 0).unwrap()),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: AcademicRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
