use axum::extract::State;
use axum::Json;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{Role, SharedState, Student};
use crate::config::Config;
use crate::db::TIMESTAMP_FMT;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub identity_key: String,
    pub birthdate: NaiveDate,
    pub cohort: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub student: Student,
    pub role: Role,
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let now = state.now_local();
    let conn = state.conn()?;
    Ok(Json(authenticate(&conn, &state.config, now, req)?))
}

/// Resolve a login attempt: admin credential match, first-access
/// auto-registration, birthdate check, cohort consistency.
pub fn authenticate(
    conn: &Connection,
    config: &Config,
    now: DateTime<FixedOffset>,
    req: LoginRequest,
) -> Result<LoginResponse, ApiError> {
    let email = req.identity_key.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::Validation("identityKey is required".into()));
    }

    if let Some(admin) = &config.admin {
        if admin.email == email && admin.birth_date == req.birthdate {
            return Ok(LoginResponse {
                student: Student {
                    id: "admin".into(),
                    email,
                    name: Some("Administrator".into()),
                    birth_date: req.birthdate,
                    cohort: None,
                    national_id: None,
                    avatar: None,
                },
                role: Role::Admin,
            });
        }
    }

    if let Some(cohort) = &req.cohort {
        if !config.cohorts.iter().any(|c| c == cohort) {
            return Err(ApiError::Validation(format!("unknown cohort: {cohort}")));
        }
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students WHERE email = ?",
        Student::SELECT_COLS
    ))?;
    let matches = stmt
        .query_map([&email], Student::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    if matches.len() > 1 {
        return Err(ApiError::DuplicateIdentity(format!(
            "{} student records share email {}",
            matches.len(),
            email
        )));
    }

    let Some(mut student) = matches.into_iter().next() else {
        // First access: register on the spot.
        let id = Uuid::new_v4().to_string();
        let stamp = now.format(TIMESTAMP_FMT).to_string();
        conn.execute(
            "INSERT INTO students(id, email, name, birth_date, cohort, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &id,
                &email,
                &req.name,
                &req.birthdate.to_string(),
                &req.cohort,
                &stamp,
            ),
        )?;
        return Ok(LoginResponse {
            student: Student {
                id,
                email,
                name: req.name,
                birth_date: req.birthdate,
                cohort: req.cohort,
                national_id: None,
                avatar: None,
            },
            role: Role::Student,
        });
    };

    // The birthdate acts as a weak password: compared as a pure
    // calendar date, never with a time component attached.
    if student.birth_date != req.birthdate {
        return Err(ApiError::InvalidCredentials(
            "this e-mail is already registered with a different birthdate; \
             contact the coordination team if you mistyped it"
                .into(),
        ));
    }

    match (student.cohort.clone(), req.cohort) {
        (Some(current), Some(wanted)) if current != wanted => {
            if config.cohort_locked {
                return Err(ApiError::CohortLocked(format!(
                    "already enrolled in cohort {current}; switching cohorts is not allowed"
                )));
            }
            set_cohort(conn, &student.id, &wanted, now)?;
            student.cohort = Some(wanted);
        }
        (None, Some(wanted)) => {
            // One-time backfill for records created before a cohort was picked.
            set_cohort(conn, &student.id, &wanted, now)?;
            student.cohort = Some(wanted);
        }
        _ => {}
    }

    Ok(LoginResponse {
        student,
        role: Role::Student,
    })
}

fn set_cohort(
    conn: &Connection,
    student_id: &str,
    cohort: &str,
    now: DateTime<FixedOffset>,
) -> Result<(), ApiError> {
    conn.execute(
        "UPDATE students SET cohort = ?, updated_at = ? WHERE id = ?",
        (cohort, &now.format(TIMESTAMP_FMT).to_string(), student_id),
    )?;
    Ok(())
}
