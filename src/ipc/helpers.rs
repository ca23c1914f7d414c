use crate::error::{AppError, AppResult};
use crate::ipc::error::{app_err, ok};
use crate::model::{parse_iso_date, Role};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

/// Roles that may hold a teacher profile.
pub const TEACHING_ROLES: [Role; 2] = [Role::Teacher, Role::Coordinator];

pub fn conn(db: &Option<Connection>) -> AppResult<&Connection> {
    db.as_ref().ok_or(AppError::NoWorkspace)
}

/// Maps a handler result onto the response envelope.
pub fn respond(id: &str, method: &str, result: AppResult<serde_json::Value>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => {
            match &e {
                AppError::Db(_) | AppError::Other(_) => log::warn!("{} failed: {:#}", method, e),
                _ => log::debug!("{} rejected: {}", method, e),
            }
            app_err(id, &e)
        }
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> AppResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadParams(format!("missing {}", key)))
}

/// Secrets are taken verbatim; only an empty value is rejected.
pub fn required_password(params: &serde_json::Value, key: &str) -> AppResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadParams(format!("missing {}", key)))
}

/// Absent, null and blank strings all read as `None`.
pub fn optional_str(params: &serde_json::Value, key: &str) -> AppResult<Option<String>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
        Some(_) => Err(AppError::BadParams(format!("{} must be a string", key))),
    }
}

pub fn required_date(params: &serde_json::Value, key: &str) -> AppResult<NaiveDate> {
    let raw = required_str(params, key)?;
    parse_iso_date(&raw)
        .ok_or_else(|| AppError::BadParams(format!("{} must be YYYY-MM-DD", key)))
}

pub fn optional_date(params: &serde_json::Value, key: &str) -> AppResult<Option<NaiveDate>> {
    match optional_str(params, key)? {
        Some(raw) => parse_iso_date(&raw)
            .map(Some)
            .ok_or_else(|| AppError::BadParams(format!("{} must be YYYY-MM-DD", key))),
        None => Ok(None),
    }
}

pub fn string_list(params: &serde_json::Value, key: &str) -> AppResult<Option<Vec<String>>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| AppError::BadParams(format!("{} must hold strings", key)))
            })
            .collect::<AppResult<Vec<_>>>()
            .map(Some),
        Some(_) => Err(AppError::BadParams(format!("{} must be an array", key))),
    }
}

/// Checks that a profile may link to `user_id`: the user exists, has left
/// `pending`, holds one of `allowed`, and is not linked elsewhere.
pub fn ensure_profile_user(
    conn: &Connection,
    user_id: &str,
    allowed: &[Role],
    profile_table: &str,
    profile_id: Option<&str>,
) -> AppResult<()> {
    let role: String = conn
        .query_row("SELECT role FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    match Role::parse(&role) {
        Some(Role::Pending) => {
            return Err(AppError::Forbidden(
                "user is pending activation and cannot hold a profile".into(),
            ))
        }
        Some(r) if allowed.contains(&r) => {}
        _ => {
            return Err(AppError::Forbidden(format!(
                "a user with role {} cannot hold this profile",
                role
            )))
        }
    }
    let linked: Option<String> = conn
        .query_row(
            &format!("SELECT id FROM {} WHERE user_id = ?", profile_table),
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    match linked {
        Some(id) if Some(id.as_str()) != profile_id => {
            Err(AppError::Conflict("user already has a profile".into()))
        }
        _ => Ok(()),
    }
}

pub fn to_json<T: serde::Serialize>(value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AppError::Other(e.into()))
}

/// Update semantics for a nullable field: absent keeps `current`, null or
/// blank clears it, a string replaces it.
pub fn patch_optional(
    params: &serde_json::Value,
    key: &str,
    current: Option<String>,
) -> AppResult<Option<String>> {
    match params.get(key) {
        None => Ok(current),
        Some(_) => optional_str(params, key),
    }
}

pub fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(value).map_err(|e| AppError::Other(e.into()))
}
