use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{is_unique_violation, ApiError};
use crate::api::types::{MessageResponse, SharedState, Student};
use crate::db::TIMESTAMP_FMT;

/// The cohort path/query value meaning "no cohort filter".
pub const ALL_COHORTS: &str = "all";

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub cohort: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStudentUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub supplementary_id: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAttendance {
    pub identity_key: String,
    pub date: NaiveDate,
    pub check_in: NaiveDateTime,
    pub check_out: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortStats {
    pub total_records: i64,
    pub sessions_today: i64,
    pub pending_checkout: i64,
    pub cohort_size: i64,
    pub absences_today: i64,
}

pub async fn search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Student>>, ApiError> {
    let today = state.now_local().date_naive();
    let conn = state.conn()?;
    Ok(Json(search_students(&conn, &params, today)?))
}

pub async fn update_student(
    State(state): State<SharedState>,
    Path(email): Path<String>,
    Json(req): Json<AdminStudentUpdate>,
) -> Result<Json<MessageResponse>, ApiError> {
    let now = state.now_local();
    let conn = state.conn()?;
    apply_student_update(&conn, now, &email, &req)?;
    Ok(Json(MessageResponse {
        message: "student record updated successfully".to_string(),
    }))
}

pub async fn delete_student(
    State(state): State<SharedState>,
    Path(email): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let conn = state.conn()?;
    remove_student(&conn, &email)?;
    Ok(Json(MessageResponse {
        message: "student record deleted successfully".to_string(),
    }))
}

pub async fn manual_attendance(
    State(state): State<SharedState>,
    Json(req): Json<ManualAttendance>,
) -> Result<Json<MessageResponse>, ApiError> {
    let conn = state.conn()?;
    insert_manual_attendance(&conn, &req)?;
    Ok(Json(MessageResponse {
        message: "manual attendance recorded successfully".to_string(),
    }))
}

pub async fn stats(
    State(state): State<SharedState>,
    Path(cohort): Path<String>,
) -> Result<Json<CohortStats>, ApiError> {
    let now = state.now_local();
    let class_day = now.weekday() == state.config.windows.weekday;
    let conn = state.conn()?;
    Ok(Json(cohort_stats(
        &conn,
        &cohort,
        now.date_naive(),
        class_day,
    )?))
}

pub async fn report(
    State(state): State<SharedState>,
    Path(cohort): Path<String>,
) -> Result<Response, ApiError> {
    let conn = state.conn()?;
    let csv = cohort_report_csv(&conn, &cohort)?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response())
}

/// Text search across name/email/national id, plus cohort and status
/// filters, composed into one statement.
pub fn search_students(
    conn: &Connection,
    params: &SearchParams,
    today: NaiveDate,
) -> Result<Vec<Student>, ApiError> {
    let mut sql = format!("SELECT {} FROM students WHERE 1=1", Student::SELECT_COLS);
    let mut args: Vec<String> = Vec::new();

    if let Some(cohort) = params
        .cohort
        .as_deref()
        .filter(|c| !c.is_empty() && *c != ALL_COHORTS)
    {
        sql.push_str(" AND cohort = ?");
        args.push(cohort.to_string());
    }
    if let Some(q) = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
    {
        sql.push_str(
            " AND (lower(coalesce(name, '')) LIKE ?
               OR email LIKE ?
               OR coalesce(national_id, '') LIKE ?)",
        );
        let pattern = format!("%{}%", q.to_lowercase());
        args.push(pattern.clone());
        args.push(pattern.clone());
        args.push(pattern);
    }
    match params.status.as_deref().filter(|s| !s.is_empty()) {
        None => {}
        Some("incomplete") => sql.push_str(
            " AND (name IS NULL OR name = '' OR national_id IS NULL OR national_id = '')",
        ),
        Some("pending-checkout") => {
            sql.push_str(
                " AND id IN (SELECT student_id FROM attendance
                             WHERE date = ? AND check_out IS NULL)",
            );
            args.push(today.to_string());
        }
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "unknown status filter: {other}"
            )))
        }
    }
    sql.push_str(" ORDER BY email");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), Student::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn apply_student_update(
    conn: &Connection,
    now: DateTime<FixedOffset>,
    email_key: &str,
    req: &AdminStudentUpdate,
) -> Result<(), ApiError> {
    let key = email_key.trim().to_lowercase();
    let new_email = req.email.as_deref().map(|e| e.trim().to_lowercase());
    let birth_date = req.birthdate.map(|d| d.to_string());
    let stamp = now.format(TIMESTAMP_FMT).to_string();

    let updated = match conn.execute(
        "UPDATE students SET
            name = COALESCE(?1, name),
            email = COALESCE(?2, email),
            national_id = COALESCE(?3, national_id),
            birth_date = COALESCE(?4, birth_date),
            updated_at = ?5
         WHERE email = ?6",
        (
            &req.name,
            &new_email,
            &req.supplementary_id,
            &birth_date,
            &stamp,
            &key,
        ),
    ) {
        Ok(n) => n,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::Validation(
                "email or supplementary id already registered to another student".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    if updated == 0 {
        return Err(ApiError::NotFound("student not found".into()));
    }
    Ok(())
}

/// Delete a student and every attendance row that points at them, in
/// one transaction.
pub fn remove_student(conn: &Connection, email: &str) -> Result<(), ApiError> {
    let email = email.trim().to_lowercase();
    let tx = conn.unchecked_transaction()?;
    let student_id: Option<String> = tx
        .query_row("SELECT id FROM students WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(student_id) = student_id else {
        return Err(ApiError::NotFound("student not found".into()));
    };
    tx.execute("DELETE FROM attendance WHERE student_id = ?", [&student_id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])?;
    tx.commit()?;
    Ok(())
}

/// Backdated record entered by an administrator. The (student, date)
/// slot must be free and the pair must be ordered.
pub fn insert_manual_attendance(conn: &Connection, req: &ManualAttendance) -> Result<(), ApiError> {
    let email = req.identity_key.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::Validation("identityKey is required".into()));
    }
    if let Some(out) = req.check_out {
        if out <= req.check_in {
            return Err(ApiError::Validation(
                "check-out must be later than check-in".into(),
            ));
        }
    }

    let student_id: Option<String> = conn
        .query_row("SELECT id FROM students WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(student_id) = student_id else {
        return Err(ApiError::NotFound("student not found".into()));
    };

    let inserted = conn.execute(
        "INSERT INTO attendance(id, student_id, date, check_in, check_out)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO NOTHING",
        (
            &Uuid::new_v4().to_string(),
            &student_id,
            &req.date.to_string(),
            &req.check_in.format(TIMESTAMP_FMT).to_string(),
            &req.check_out.map(|t| t.format(TIMESTAMP_FMT).to_string()),
        ),
    )?;
    if inserted == 0 {
        return Err(ApiError::AlreadyCheckedIn(
            "an attendance record already exists for that date".into(),
        ));
    }
    Ok(())
}

pub fn cohort_stats(
    conn: &Connection,
    cohort: &str,
    today: NaiveDate,
    class_day: bool,
) -> Result<CohortStats, ApiError> {
    let today_s = today.to_string();
    let total_records: i64 =
        conn.query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))?;
    let sessions_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance WHERE date = ?",
        [&today_s],
        |r| r.get(0),
    )?;
    let pending_checkout: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance WHERE date = ? AND check_out IS NULL",
        [&today_s],
        |r| r.get(0),
    )?;
    let cohort_size: i64 = if cohort == ALL_COHORTS {
        conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?
    } else {
        conn.query_row(
            "SELECT COUNT(*) FROM students WHERE cohort = ?",
            [&cohort],
            |r| r.get(0),
        )?
    };
    // Off-day requests read as zero absences rather than the whole cohort.
    let absences_today = if class_day {
        (cohort_size - sessions_today).max(0)
    } else {
        0
    };

    Ok(CohortStats {
        total_records,
        sessions_today,
        pending_checkout,
        cohort_size,
        absences_today,
    })
}

/// One line per student in the cohort: `name,identityKey,presenceCount`.
pub fn cohort_report_csv(conn: &Connection, cohort: &str) -> Result<String, ApiError> {
    let mut sql = String::from(
        "SELECT s.name, s.email, COUNT(a.id)
         FROM students s
         LEFT JOIN attendance a ON a.student_id = s.id",
    );
    let mut args: Vec<String> = Vec::new();
    if cohort != ALL_COHORTS {
        sql.push_str(" WHERE s.cohort = ?");
        args.push(cohort.to_string());
    }
    sql.push_str(" GROUP BY s.id ORDER BY s.name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok((
                r.get::<_, Option<String>>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut csv = String::from("name,identityKey,presenceCount\n");
    for (name, email, count) in rows {
        csv.push_str(&format!(
            "{},{},{}\n",
            csv_field(name.as_deref().unwrap_or("")),
            csv_field(&email),
            count
        ));
    }
    Ok(csv)
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
