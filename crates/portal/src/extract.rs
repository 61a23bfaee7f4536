//! Extraction of numeric facts from raw portal HTML.
//!
//! The portal renders data as server-side HTML with no stable ids or
//! classes, so extraction works on textual patterns. Pure functions, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;

use standings_core::error::{Result, StandingsError};

/// First table cell whose content is a decimal number.
static SCORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<td>([0-9.]+)</td>").unwrap());

/// Merit point entries, e.g. `(상점 : 3점)`.
static MERIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(상점 : ([0-9]+)").unwrap());

/// Demerit point entries, e.g. `(벌점 : 1점)`.
static DEMERIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(벌점 : ([0-9]+)").unwrap());

/// Extract the academic score from the score page.
///
/// A page with no matching cell yields `0.0` — some students simply have no
/// recorded score yet. A matching cell that fails to parse as a number means
/// the page shape has drifted and is reported as a parse error.
pub fn extract_score(html: &str) -> Result<f64> {
    match SCORE_RE.captures(html) {
        Some(caps) => caps[1].parse::<f64>().map_err(|_| {
            StandingsError::Parse(format!("score cell is not a number: {}", &caps[1]))
        }),
        None => Ok(0.0),
    }
}

/// Extract `(merit, demerit)` totals from the point listing page.
///
/// The listing merges multiple point entries onto one page; every marker
/// occurrence contributes its count once. An occurrence that fails to parse
/// is skipped without aborting the scan, and a page with no markers at all
/// is a valid `(0, 0)`.
pub fn extract_points(html: &str) -> (i64, i64) {
    let sum = |re: &Regex| -> i64 {
        re.captures_iter(html)
            .filter_map(|caps| caps[1].parse::<i64>().ok())
            .sum()
    };
    (sum(&MERIT_RE), sum(&DEMERIT_RE))
}
