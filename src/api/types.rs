use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::clock::Clock;
use crate::config::Config;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    db: Mutex<Connection>,
    pub config: Config,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Mutex::new(conn),
            config,
            clock,
        }
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Store("database connection poisoned".into()))
    }

    /// Current instant in the program's reference timezone.
    pub fn now_local(&self) -> DateTime<FixedOffset> {
        self.clock.now_utc().with_timezone(&self.config.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub birth_date: NaiveDate,
    pub cohort: Option<String>,
    #[serde(rename = "supplementaryId")]
    pub national_id: Option<String>,
    pub avatar: Option<String>,
}

impl Student {
    pub const SELECT_COLS: &'static str =
        "id, email, name, birth_date, cohort, national_id, avatar";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
        Ok(Student {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            birth_date: parse_date_col(row, 3)?,
            cohort: row.get(4)?,
            national_id: row.get(5)?,
            avatar: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub date: NaiveDate,
    pub check_in: String,
    pub check_out: Option<String>,
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

impl AttendanceRecord {
    pub const SELECT_COLS: &'static str = "id, date, check_in, check_out, rating, comment";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
        Ok(AttendanceRecord {
            id: row.get(0)?,
            date: parse_date_col(row, 1)?,
            check_in: row.get(2)?,
            check_out: row.get(3)?,
            rating: row.get(4)?,
            comment: row.get(5)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn parse_date_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
