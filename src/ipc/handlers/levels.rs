use crate::cache::CacheKey;
use crate::error::{AppError, AppResult};
use crate::ipc::helpers::{conn, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Level {
    id: String,
    name: String,
    sort_order: i64,
}

fn list_levels(conn: &Connection) -> AppResult<Vec<Level>> {
    let mut stmt = conn.prepare("SELECT id, name, sort_order FROM levels ORDER BY sort_order, name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Level {
                id: r.get(0)?,
                name: r.get(1)?,
                sort_order: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn handle_levels_list(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let levels = state
        .cache
        .get_or_fetch(CacheKey::Levels, || to_json(&list_levels(conn)?))?;
    Ok(json!({ "levels": levels }))
}

fn handle_levels_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let name = required_str(&req.params, "name")?;
    let taken = conn
        .query_row("SELECT 1 FROM levels WHERE name = ?", [&name], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some();
    if taken {
        return Err(AppError::Conflict(format!("level {} already exists", name)));
    }
    let sort_order = match req.params.get("sortOrder").and_then(|v| v.as_i64()) {
        Some(n) => n,
        None => conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM levels",
            [],
            |r| r.get(0),
        )?,
    };
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO levels(id, name, sort_order) VALUES(?, ?, ?)",
        (&id, &name, sort_order),
    )?;
    state.cache.invalidate(&CacheKey::Levels);
    Ok(json!({ "levelId": id }))
}

fn handle_levels_delete(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "levelId")?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE classrooms SET level_id = NULL WHERE level_id = ?", [&id])?;
    tx.execute("UPDATE students SET level_id = NULL WHERE level_id = ?", [&id])?;
    if tx.execute("DELETE FROM levels WHERE id = ?", [&id])? == 0 {
        return Err(AppError::not_found("level not found"));
    }
    tx.commit()?;
    for key in [CacheKey::Levels, CacheKey::Classrooms, CacheKey::Students] {
        state.cache.invalidate(&key);
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "levels.list" => handle_levels_list(state, req),
        "levels.create" => handle_levels_create(state, req),
        "levels.delete" => handle_levels_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
