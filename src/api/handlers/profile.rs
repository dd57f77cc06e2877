use axum::extract::State;
use axum::Json;
use chrono::{DateTime, FixedOffset};
use rusqlite::Connection;
use serde::Deserialize;

use crate::api::error::{is_unique_violation, ApiError};
use crate::api::types::{MessageResponse, SharedState};
use crate::db::TIMESTAMP_FMT;

const MIN_NATIONAL_ID_LEN: usize = 11;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub identity_key: String,
    pub name: Option<String>,
    pub supplementary_id: Option<String>,
    pub avatar: Option<String>,
}

pub async fn update(
    State(state): State<SharedState>,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<MessageResponse>, ApiError> {
    let now = state.now_local();
    let conn = state.conn()?;
    apply_profile_update(&conn, now, &req)?;
    Ok(Json(MessageResponse {
        message: "profile updated successfully".to_string(),
    }))
}

/// Amend name, supplementary id and avatar. Only supplied fields are
/// touched; omitted ones keep their stored value.
pub fn apply_profile_update(
    conn: &Connection,
    now: DateTime<FixedOffset>,
    req: &ProfileUpdate,
) -> Result<(), ApiError> {
    let email = req.identity_key.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::Validation("identityKey is required".into()));
    }

    let national_id = req.supplementary_id.as_deref().map(str::trim);
    if let Some(nid) = national_id {
        if nid.len() < MIN_NATIONAL_ID_LEN {
            return Err(ApiError::Validation(format!(
                "supplementary id must have at least {MIN_NATIONAL_ID_LEN} characters"
            )));
        }
    }

    let stamp = now.format(TIMESTAMP_FMT).to_string();
    let updated = match conn.execute(
        "UPDATE students SET
            name = COALESCE(?1, name),
            national_id = COALESCE(?2, national_id),
            avatar = COALESCE(?3, avatar),
            updated_at = ?4
         WHERE email = ?5",
        (&req.name, &national_id, &req.avatar, &stamp, &email),
    ) {
        Ok(n) => n,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::Validation(
                "supplementary id already registered to another student".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    if updated == 0 {
        return Err(ApiError::NotFound("student not found".into()));
    }
    Ok(())
}
