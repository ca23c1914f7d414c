use crate::cache::CacheKey;
use crate::error::{AppError, AppResult};
use crate::ipc::helpers::{conn, optional_str, required_str, respond, to_json, TEACHING_ROLES};
use crate::ipc::types::{AppState, Request};
use crate::model::{Role, User};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const USER_SELECT: &str = "SELECT u.id, u.email, u.full_name, u.role, u.created_at, s.id, t.id
     FROM users u
     LEFT JOIN students s ON s.user_id = u.id
     LEFT JOIN teachers t ON t.user_id = u.id";

fn user_from_row(r: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: r.get(0)?,
        email: r.get(1)?,
        full_name: r.get(2)?,
        role: r.get(3)?,
        created_at: r.get(4)?,
        student_id: r.get(5)?,
        teacher_id: r.get(6)?,
    })
}

fn list_users(conn: &Connection) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY u.full_name, u.email", USER_SELECT))?;
    let rows = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_user(conn: &Connection, id: &str) -> AppResult<User> {
    conn.query_row(&format!("{} WHERE u.id = ?", USER_SELECT), [id], user_from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("user not found"))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let role = optional_str(&req.params, "role")?.map(|r| r.to_ascii_lowercase());
    let all = state
        .cache
        .get_or_fetch(CacheKey::Users, || to_json(&list_users(conn)?))?;
    let users: Vec<serde_json::Value> = all
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|u| match &role {
            Some(r) => u.get("role").and_then(|v| v.as_str()) == Some(r.as_str()),
            None => true,
        })
        .collect();
    Ok(json!({ "users": users }))
}

fn handle_users_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let user_id = required_str(&req.params, "userId")?;
    Ok(json!({ "user": load_user(conn, &user_id)? }))
}

fn handle_users_set_role(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let admin_id = state.auth.require_role(&[Role::Admin])?.user_id.clone();
    let user_id = required_str(&req.params, "userId")?;
    let raw = required_str(&req.params, "role")?;
    let role = Role::parse(&raw).ok_or_else(|| AppError::BadParams(format!("unknown role: {}", raw)))?;
    if user_id == admin_id && role != Role::Admin {
        return Err(AppError::Conflict("admins cannot demote themselves".into()));
    }
    // A linked profile must stay consistent with the account's role.
    let current = load_user(conn, &user_id)?;
    if current.student_id.is_some() && role != Role::Student {
        return Err(AppError::Conflict(
            "user is linked to a student profile; unlink it first".into(),
        ));
    }
    if current.teacher_id.is_some() && !TEACHING_ROLES.contains(&role) {
        return Err(AppError::Conflict(
            "user is linked to a teacher profile; unlink it first".into(),
        ));
    }

    conn.execute(
        "UPDATE users SET role = ? WHERE id = ?",
        (role.as_str(), &user_id),
    )?;
    state.cache.invalidate(&CacheKey::Users);
    log::info!("user {} set to role {} by {}", user_id, role.as_str(), admin_id);
    Ok(json!({ "user": load_user(conn, &user_id)? }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let admin_id = state.auth.require_role(&[Role::Admin])?.user_id.clone();
    let user_id = required_str(&req.params, "userId")?;
    if user_id == admin_id {
        return Err(AppError::Conflict("admins cannot delete themselves".into()));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE students SET user_id = NULL WHERE user_id = ?", [&user_id])?;
    tx.execute("UPDATE teachers SET user_id = NULL WHERE user_id = ?", [&user_id])?;
    tx.execute("DELETE FROM sessions WHERE user_id = ?", [&user_id])?;
    let deleted = tx.execute("DELETE FROM users WHERE id = ?", [&user_id])?;
    if deleted == 0 {
        return Err(AppError::not_found("user not found"));
    }
    tx.commit()?;

    for key in [CacheKey::Users, CacheKey::Students, CacheKey::Teachers] {
        state.cache.invalidate(&key);
    }
    log::info!("user {} deleted by {}", user_id, admin_id);
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.list" => handle_users_list(state, req),
        "users.get" => handle_users_get(state, req),
        "users.setRole" => handle_users_set_role(state, req),
        "users.delete" => handle_users_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
