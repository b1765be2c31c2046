//! Booth window derivation
//!
//! Resolution order: explicit end date, then `start + duration_weeks * 7 days`,
//! otherwise the booth is pending schedule. A resolved window with
//! `end <= start` is rejected, never corrected.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Deserialize;
use shared::error::ErrorCode;

use crate::error::{ServiceError, ServiceResult};

const MILLIS_PER_WEEK: f64 = 7.0 * 24.0 * 60.0 * 60.0 * 1000.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoothWindowInput {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub duration_weeks: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoothWindow {
    Scheduled {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Not enough information to place the booth in time yet
    PendingSchedule { start: Option<DateTime<Utc>> },
}

impl BoothWindow {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Scheduled { start, .. } => Some(*start),
            Self::PendingSchedule { start } => *start,
        }
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Scheduled { end, .. } => Some(*end),
            Self::PendingSchedule { .. } => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled { .. })
    }
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn window_error(message: impl Into<String>) -> ServiceError {
    ServiceError::validation_code(ErrorCode::InvalidBoothWindow, message)
}

pub fn resolve(input: &BoothWindowInput) -> ServiceResult<BoothWindow> {
    let start = match input.start_date.as_deref().map(str::trim) {
        None | Some("") => return Ok(BoothWindow::PendingSchedule { start: None }),
        Some(raw) => parse_date(raw)
            .ok_or_else(|| window_error(format!("Invalid booth start date: {raw}")))?,
    };

    // An unparseable end date counts as absent
    let explicit_end = input.end_date.as_deref().and_then(parse_date);

    let end = match (explicit_end, input.duration_weeks) {
        (Some(end), _) => end,
        (None, Some(weeks)) if weeks.is_finite() && weeks > 0.0 => {
            let millis = (weeks * MILLIS_PER_WEEK).round();
            TimeDelta::try_milliseconds(millis as i64)
                .and_then(|d| start.checked_add_signed(d))
                .ok_or_else(|| window_error(format!("Booth duration out of range: {weeks} weeks")))?
        }
        _ => return Ok(BoothWindow::PendingSchedule { start: Some(start) }),
    };

    if end <= start {
        return Err(window_error("Booth end time must be after its start time"));
    }

    Ok(BoothWindow::Scheduled { start, end })
}
