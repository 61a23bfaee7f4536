//! Shared leaderboard over the cached records, with the privacy and
//! permission model applied per viewer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use standings_core::db::repository::StandingsRepository;
use standings_core::error::{Result, StandingsError};
use standings_core::models::standing::{AcademicRecord, PortalSyncState};
use standings_core::models::student::Student;

/// Privacy toggles are limited to once per rolling 24-hour window.
const PRIVACY_COOLDOWN_HOURS: i64 = 24;

/// Classification of a ranking entry. Doubles as the primary sort tier:
/// entries order by `(tier, -score)`, with `Success(0)` ahead of
/// `LoginError(1)` ahead of `Private(2)` and score descending inside the
/// success tier.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RankingResult {
    Success,
    LoginError,
    Private,
}

impl RankingResult {
    fn tier(self) -> u8 {
        match self {
            RankingResult::Success => 0,
            RankingResult::LoginError => 1,
            RankingResult::Private => 2,
        }
    }

    fn classify(state: &PortalSyncState) -> Self {
        if state.private_ranking {
            RankingResult::Private
        } else if state.login_error {
            RankingResult::LoginError
        } else {
            RankingResult::Success
        }
    }
}

/// Identity of a ranked student.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub grade: i64,
    pub class_no: i64,
    pub student_no: i64,
    pub name: String,
}

/// One leaderboard row. Numeric fields are present only for `Success`
/// entries; `Private` entries hide them by choice, `LoginError` entries
/// because the cached values are untrustworthy.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub student: RankedStudent,
    pub result: RankingResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_point: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_point: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl RankingEntry {
    fn build(student: &Student, state: &PortalSyncState, record: &AcademicRecord) -> Self {
        let result = RankingResult::classify(state);
        let ranked = RankedStudent {
            grade: student.grade,
            class_no: student.class_no,
            student_no: student.student_no,
            name: student.name.clone(),
        };
        match result {
            RankingResult::Success => Self {
                student: ranked,
                result,
                score: Some(record.score),
                positive_point: Some(record.positive_point),
                negative_point: Some(record.negative_point),
                last_update: record.modified_at,
            },
            RankingResult::LoginError | RankingResult::Private => Self {
                student: ranked,
                result,
                score: None,
                positive_point: None,
                negative_point: None,
                last_update: None,
            },
        }
    }
}

/// Composite leaderboard ordering: classification tier first, then score
/// descending. Entries without a score (non-success tiers) compare equal on
/// the secondary key, so the stable sort preserves their relative order.
fn ranking_order(a: &RankingEntry, b: &RankingEntry) -> Ordering {
    a.result.tier().cmp(&b.result.tier()).then_with(|| {
        b.score
            .unwrap_or(f64::NEG_INFINITY)
            .total_cmp(&a.score.unwrap_or(f64::NEG_INFINITY))
    })
}

/// Reads the cached records and renders the viewer-specific leaderboard.
pub struct RankingService<R: StandingsRepository> {
    repo: Arc<R>,
}

impl<R: StandingsRepository> RankingService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Toggle the viewer's privacy opt-out. Allowed once per rolling
    /// 24-hour window; a premature call reports the remaining wait.
    pub async fn update_privacy(&self, student_id: &str, make_private: bool) -> Result<()> {
        let mut state = self
            .repo
            .get_sync_state(student_id)
            .await?
            .ok_or_else(|| {
                StandingsError::NotFound(format!("no sync state for student {student_id}"))
            })?;

        let now = Utc::now();
        let available_at =
            state.last_privacy_change_at + chrono::Duration::hours(PRIVACY_COOLDOWN_HOURS);
        if now < available_at {
            return Err(StandingsError::RateLimited {
                retry_after_secs: (available_at - now).num_seconds(),
            });
        }

        state.private_ranking = make_private;
        state.last_privacy_change_at = now;
        state.updated_at = now;
        self.repo.upsert_sync_state(&state).await?;
        Ok(())
    }

    /// The full leaderboard as visible to the given viewer. A viewer whose
    /// own sync is broken or who hides their own numbers is refused
    /// entirely — no partial list.
    pub async fn get_ranking(&self, viewer_id: &str) -> Result<Vec<RankingEntry>> {
        let viewer_state = self
            .repo
            .get_sync_state(viewer_id)
            .await?
            .ok_or_else(|| {
                StandingsError::NotFound(format!("no sync state for viewer {viewer_id}"))
            })?;
        viewer_state.permission_check()?;

        let students: HashMap<String, Student> = self
            .repo
            .list_students()
            .await?
            .into_iter()
            .map(|s| (s.student_id.clone(), s))
            .collect();
        let states: HashMap<String, PortalSyncState> = self
            .repo
            .list_sync_states()
            .await?
            .into_iter()
            .map(|s| (s.student_id.clone(), s))
            .collect();

        let mut entries = Vec::new();
        for record in self.repo.list_records().await? {
            let (Some(student), Some(state)) = (
                students.get(&record.student_id),
                states.get(&record.student_id),
            ) else {
                debug!(student_id = %record.student_id, "record without roster entry or state; skipping");
                continue;
            };
            entries.push(RankingEntry::build(student, state, &record));
        }

        entries.sort_by(ranking_order);
        Ok(entries)
    }
}
