use crate::cache::CacheKey;
use crate::error::{AppError, AppResult};
use crate::ipc::helpers::{
    conn, ensure_profile_user, optional_date, optional_str, patch_optional, required_str, respond,
    to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{student_from_row, Role, STUDENT_COLUMNS};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn list_students(conn: &Connection) -> AppResult<Vec<crate::model::Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY last_name, first_name",
        STUDENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn student_classrooms(conn: &Connection, student_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT classroom_id FROM classroom_students WHERE student_id = ? ORDER BY classroom_id",
    )?;
    let ids = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn birth_date(params: &serde_json::Value, current: Option<String>) -> AppResult<Option<String>> {
    if params.get("birthDate").is_none() {
        return Ok(current);
    }
    Ok(optional_date(params, "birthDate")?.map(|d| d.format("%Y-%m-%d").to_string()))
}

fn check_level(conn: &Connection, level_id: Option<&str>) -> AppResult<()> {
    match level_id {
        Some(id) if !store::exists(conn, "levels", id)? => Err(AppError::not_found("level not found")),
        _ => Ok(()),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    if let Some(classroom_id) = optional_str(&req.params, "classroomId")? {
        let roster = store::classroom_roster(conn, &classroom_id)?;
        return Ok(json!({ "students": roster }));
    }
    let level = optional_str(&req.params, "levelId")?;
    let all = state
        .cache
        .get_or_fetch(CacheKey::Students, || to_json(&list_students(conn)?))?;
    let students: Vec<serde_json::Value> = all
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|s| match &level {
            Some(l) => s.get("levelId").and_then(|v| v.as_str()) == Some(l.as_str()),
            None => true,
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "studentId")?;
    let student = store::load_student(conn, &id)?;
    Ok(json!({
        "student": student,
        "classroomIds": student_classrooms(conn, &id)?,
    }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let p = &req.params;
    let first = required_str(p, "firstName")?;
    let last = required_str(p, "lastName")?;
    let user_id = optional_str(p, "userId")?;
    let level_id = optional_str(p, "levelId")?;
    check_level(conn, level_id.as_deref())?;
    if let Some(uid) = &user_id {
        ensure_profile_user(conn, uid, &[Role::Student], "students", None)?;
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, user_id, first_name, last_name, email, phone, birth_date, level_id)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &user_id,
            &first,
            &last,
            optional_str(p, "email")?,
            optional_str(p, "phone")?,
            birth_date(p, None)?,
            &level_id,
        ),
    )?;
    state.cache.invalidate(&CacheKey::Students);
    if user_id.is_some() {
        state.cache.invalidate(&CacheKey::Users);
    }
    log::info!("created student {}", id);
    Ok(json!({ "studentId": id, "student": store::load_student(conn, &id)? }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let p = &req.params;
    let id = required_str(p, "studentId")?;
    let current = store::load_student(conn, &id)?;

    let user_id = patch_optional(p, "userId", current.user_id.clone())?;
    if let Some(uid) = &user_id {
        if current.user_id.as_deref() != Some(uid.as_str()) {
            ensure_profile_user(conn, uid, &[Role::Student], "students", Some(&id))?;
        }
    }
    let level_id = patch_optional(p, "levelId", current.level_id)?;
    check_level(conn, level_id.as_deref())?;

    conn.execute(
        "UPDATE students
         SET user_id = ?, first_name = ?, last_name = ?, email = ?, phone = ?, birth_date = ?, level_id = ?
         WHERE id = ?",
        (
            &user_id,
            optional_str(p, "firstName")?.unwrap_or(current.first_name),
            optional_str(p, "lastName")?.unwrap_or(current.last_name),
            patch_optional(p, "email", current.email)?,
            patch_optional(p, "phone", current.phone)?,
            birth_date(p, current.birth_date)?,
            &level_id,
            &id,
        ),
    )?;
    for key in [CacheKey::Students, CacheKey::Users] {
        state.cache.invalidate(&key);
    }
    Ok(json!({ "student": store::load_student(conn, &id)? }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "studentId")?;
    if !store::exists(conn, "students", &id)? {
        return Err(AppError::not_found("student not found"));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM attendance WHERE student_id = ?", [&id])?;
    tx.execute("DELETE FROM grading WHERE student_id = ?", [&id])?;
    tx.execute("DELETE FROM classroom_students WHERE student_id = ?", [&id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [&id])?;
    tx.commit()?;

    for key in [CacheKey::Students, CacheKey::Users, CacheKey::Classrooms] {
        state.cache.invalidate(&key);
    }
    state.cache.invalidate_records();
    state.attendance_sheet = None;
    log::info!("deleted student {}", id);
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
