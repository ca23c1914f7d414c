use crate::cache::CacheKey;
use crate::error::{AppError, AppResult};
use crate::ipc::helpers::{
    conn, ensure_profile_user, optional_str, patch_optional, required_str, respond, to_json,
    TEACHING_ROLES,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{teacher_from_row, Teacher, TEACHER_COLUMNS};
use crate::store;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn list_teachers(conn: &Connection) -> AppResult<Vec<Teacher>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM teachers ORDER BY last_name, first_name",
        TEACHER_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], teacher_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_teacher(conn: &Connection, id: &str) -> AppResult<Teacher> {
    conn.query_row(
        &format!("SELECT {} FROM teachers WHERE id = ?", TEACHER_COLUMNS),
        [id],
        teacher_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("teacher not found"))
}

fn handle_teachers_list(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let teachers = state
        .cache
        .get_or_fetch(CacheKey::Teachers, || to_json(&list_teachers(conn)?))?;
    Ok(json!({ "teachers": teachers }))
}

fn handle_teachers_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "teacherId")?;
    let teacher = load_teacher(conn, &id)?;
    let mut stmt = conn.prepare("SELECT id FROM classrooms WHERE teacher_id = ? ORDER BY name")?;
    let classroom_ids = stmt
        .query_map([&id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "teacher": teacher, "classroomIds": classroom_ids }))
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let p = &req.params;
    let first = required_str(p, "firstName")?;
    let last = required_str(p, "lastName")?;
    let user_id = optional_str(p, "userId")?;
    if let Some(uid) = &user_id {
        ensure_profile_user(conn, uid, &TEACHING_ROLES, "teachers", None)?;
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, user_id, first_name, last_name, email, phone)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &user_id,
            &first,
            &last,
            optional_str(p, "email")?,
            optional_str(p, "phone")?,
        ),
    )?;
    state.cache.invalidate(&CacheKey::Teachers);
    if user_id.is_some() {
        state.cache.invalidate(&CacheKey::Users);
    }
    log::info!("created teacher {}", id);
    Ok(json!({ "teacherId": id, "teacher": load_teacher(conn, &id)? }))
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let p = &req.params;
    let id = required_str(p, "teacherId")?;
    let current = load_teacher(conn, &id)?;

    let user_id = patch_optional(p, "userId", current.user_id.clone())?;
    if let Some(uid) = &user_id {
        if current.user_id.as_deref() != Some(uid.as_str()) {
            ensure_profile_user(conn, uid, &TEACHING_ROLES, "teachers", Some(&id))?;
        }
    }
    conn.execute(
        "UPDATE teachers SET user_id = ?, first_name = ?, last_name = ?, email = ?, phone = ?
         WHERE id = ?",
        (
            &user_id,
            optional_str(p, "firstName")?.unwrap_or(current.first_name),
            optional_str(p, "lastName")?.unwrap_or(current.last_name),
            patch_optional(p, "email", current.email)?,
            patch_optional(p, "phone", current.phone)?,
            &id,
        ),
    )?;
    for key in [CacheKey::Teachers, CacheKey::Users, CacheKey::Classrooms] {
        state.cache.invalidate(&key);
    }
    Ok(json!({ "teacher": load_teacher(conn, &id)? }))
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "teacherId")?;
    if !store::exists(conn, "teachers", &id)? {
        return Err(AppError::not_found("teacher not found"));
    }
    let tx = conn.unchecked_transaction()?;
    let unassigned = tx.execute(
        "UPDATE classrooms SET teacher_id = NULL WHERE teacher_id = ?",
        [&id],
    )?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [&id])?;
    tx.commit()?;

    for key in [CacheKey::Teachers, CacheKey::Users, CacheKey::Classrooms] {
        state.cache.invalidate(&key);
    }
    log::info!("deleted teacher {} ({} classrooms unassigned)", id, unassigned);
    Ok(json!({ "deleted": true, "classroomsUnassigned": unassigned }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.list" => handle_teachers_list(state, req),
        "teachers.get" => handle_teachers_get(state, req),
        "teachers.create" => handle_teachers_create(state, req),
        "teachers.update" => handle_teachers_update(state, req),
        "teachers.delete" => handle_teachers_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
