use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, FixedOffset};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{AttendanceRecord, MessageResponse, SharedState};
use crate::db::TIMESTAMP_FMT;
use crate::policy::{self, ClosedReason, Verdict, WindowConfig};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRequest {
    pub identity_key: String,
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceOutcome {
    CheckedIn,
    CheckedOut,
}

impl AttendanceOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            AttendanceOutcome::CheckedIn => "check-in recorded successfully",
            AttendanceOutcome::CheckedOut => "check-out recorded successfully",
        }
    }
}

pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<AttendanceRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let now = state.now_local();
    let conn = state.conn()?;
    let outcome = record_attendance(&conn, &state.config.windows, now, &req)?;
    Ok(Json(MessageResponse {
        message: outcome.message().to_string(),
    }))
}

pub async fn history(
    State(state): State<SharedState>,
    Path(email): Path<String>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    let conn = state.conn()?;
    Ok(Json(student_history(&conn, &email)?))
}

/// Decide whether the request is a check-in, a check-out, a duplicate,
/// or invalid, and apply exactly one insert or one update. The window
/// verdict names the action; the record state decides whether it fits.
pub fn record_attendance(
    conn: &Connection,
    windows: &WindowConfig,
    now: DateTime<FixedOffset>,
    req: &AttendanceRequest,
) -> Result<AttendanceOutcome, ApiError> {
    let email = req.identity_key.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::Validation("identityKey is required".into()));
    }
    if let Some(rating) = req.rating {
        if !(1..=5).contains(&rating) {
            return Err(ApiError::Validation(
                "rating must be between 1 and 5".into(),
            ));
        }
    }

    let action = match policy::decide(windows, now) {
        Verdict::CheckIn => Action::In,
        Verdict::CheckOut => Action::Out,
        Verdict::Closed(reason) => return Err(outside_window(windows, reason)),
    };

    let student_id: Option<String> = conn
        .query_row("SELECT id FROM students WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(student_id) = student_id else {
        return Err(ApiError::NotFound(
            "unknown student; sign in before registering attendance".into(),
        ));
    };

    let today = now.date_naive().to_string();
    let existing: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT id, check_out FROM attendance WHERE student_id = ? AND date = ?",
            (&student_id, &today),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let stamp = now.format(TIMESTAMP_FMT).to_string();

    match (action, existing) {
        (Action::In, None) => {
            // Conditional insert: losing a concurrent race reads as a
            // duplicate check-in, never as a second row.
            let inserted = conn.execute(
                "INSERT INTO attendance(id, student_id, date, check_in)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(student_id, date) DO NOTHING",
                (&Uuid::new_v4().to_string(), &student_id, &today, &stamp),
            )?;
            if inserted == 0 {
                return Err(already_checked_in());
            }
            Ok(AttendanceOutcome::CheckedIn)
        }
        (Action::In, Some((_, None))) => Err(already_checked_in()),
        (Action::Out, None) => Err(ApiError::NotFound(
            "no check-in recorded for today; nothing to check out".into(),
        )),
        (Action::Out, Some((record_id, None))) => {
            let updated = conn.execute(
                "UPDATE attendance SET check_out = ?, rating = ?, comment = ?
                 WHERE id = ? AND check_out IS NULL",
                (&stamp, &req.rating, &req.comment, &record_id),
            )?;
            if updated == 0 {
                return Err(ApiError::AlreadyCheckedOut(
                    "check-out already recorded for today".into(),
                ));
            }
            Ok(AttendanceOutcome::CheckedOut)
        }
        (_, Some((_, Some(_)))) => Err(ApiError::AttendanceAlreadyComplete(
            "attendance for today is already complete".into(),
        )),
    }
}

enum Action {
    In,
    Out,
}

/// Attendance rows for one student, newest first. A key with no rows
/// (including a deleted student) yields the empty list.
pub fn student_history(conn: &Connection, email: &str) -> Result<Vec<AttendanceRecord>, ApiError> {
    let email = email.trim().to_lowercase();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE s.email = ?
         ORDER BY a.date DESC",
        qualified_record_cols()
    ))?;
    let rows = stmt
        .query_map([&email], AttendanceRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn qualified_record_cols() -> String {
    AttendanceRecord::SELECT_COLS
        .split(", ")
        .map(|c| format!("a.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn already_checked_in() -> ApiError {
    ApiError::AlreadyCheckedIn("check-in already recorded for today".into())
}

fn outside_window(windows: &WindowConfig, reason: ClosedReason) -> ApiError {
    match reason {
        ClosedReason::WrongWeekday(today) => ApiError::OutsideWindow(format!(
            "attendance is only collected on {}; today is {}",
            windows.weekday, today
        )),
        ClosedReason::OutsideBands => ApiError::OutsideWindow(format!(
            "neither the check-in window ({}) nor the check-out window ({}) is open right now",
            windows.check_in.label(),
            windows.check_out.label()
        )),
    }
}
