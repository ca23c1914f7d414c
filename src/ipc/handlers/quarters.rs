use crate::attendance::AttendanceSheet;
use crate::cache::CacheKey;
use crate::error::{AppError, AppResult};
use crate::ipc::error::notice;
use crate::ipc::helpers::{conn, optional_date, optional_str, required_date, required_str, respond, string_list, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::parse_iso_date;
use crate::schedule::normalize_date_key;
use crate::store;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Sorted, deduplicated `YYYY-MM-DD` keys.
fn normalize_breaks(raw: Vec<String>) -> AppResult<Vec<String>> {
    let mut out = BTreeSet::new();
    for b in raw {
        let key = normalize_date_key(&b);
        if parse_iso_date(&key).is_none() {
            return Err(AppError::BadParams(format!("invalid break date: {}", b)));
        }
        out.insert(key);
    }
    Ok(out.into_iter().collect())
}

fn check_range(start: NaiveDate, end: NaiveDate) -> AppResult<()> {
    if start > end {
        return Err(AppError::bad_params("startDate must not be after endDate"));
    }
    Ok(())
}

fn break_json(breaks: &[String]) -> AppResult<String> {
    serde_json::to_string(breaks).map_err(|e| AppError::Other(e.into()))
}

/// Makes `quarter_id` the only active quarter. Runs inside the caller's
/// transaction.
fn set_active(conn: &Connection, quarter_id: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE quarters SET active = CASE WHEN id = ? THEN 1 ELSE 0 END",
        [quarter_id],
    )?;
    Ok(())
}

/// Closes an open attendance sheet whose dates came from `quarter_id`.
fn drop_sheet_for_quarter(sheet: &mut Option<AttendanceSheet>, quarter_id: &str) {
    if sheet.as_ref().is_some_and(|s| s.key().quarter_id == quarter_id) {
        *sheet = None;
    }
}

fn handle_quarters_list(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let quarters = state
        .cache
        .get_or_fetch(CacheKey::Quarters, || to_json(&store::list_quarters(conn)?))?;
    Ok(json!({ "quarters": quarters }))
}

fn handle_quarters_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "quarterId")?;
    Ok(json!({ "quarter": store::load_quarter(conn, &id)? }))
}

fn handle_quarters_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let name = required_str(&req.params, "name")?;
    let start = required_date(&req.params, "startDate")?;
    let end = required_date(&req.params, "endDate")?;
    check_range(start, end)?;
    let breaks = normalize_breaks(string_list(&req.params, "breakDates")?.unwrap_or_default())?;
    let activate = req.params.get("active").and_then(|v| v.as_bool()).unwrap_or(false);

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO quarters(id, name, start_date, end_date, break_dates, active)
         VALUES(?, ?, ?, ?, ?, 0)",
        (
            &id,
            &name,
            start.format("%Y-%m-%d").to_string(),
            end.format("%Y-%m-%d").to_string(),
            break_json(&breaks)?,
        ),
    )?;
    if activate {
        set_active(&tx, &id)?;
    }
    tx.commit()?;

    let quarter = store::load_quarter(conn, &id)?;
    if activate {
        state.session.set(conn, Some(quarter.clone()))?;
    }
    state.cache.invalidate(&CacheKey::Quarters);
    log::info!("created quarter {} ({})", quarter.name, id);
    Ok(json!({ "quarterId": id, "quarter": quarter }))
}

fn handle_quarters_update(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "quarterId")?;
    let current = store::load_quarter(conn, &id)?;

    let name = optional_str(&req.params, "name")?.unwrap_or(current.name);
    let start = optional_date(&req.params, "startDate")?.unwrap_or(current.start_date);
    let end = optional_date(&req.params, "endDate")?.unwrap_or(current.end_date);
    check_range(start, end)?;
    let breaks = match string_list(&req.params, "breakDates")? {
        Some(raw) => normalize_breaks(raw)?,
        None => current.break_dates,
    };

    conn.execute(
        "UPDATE quarters SET name = ?, start_date = ?, end_date = ?, break_dates = ? WHERE id = ?",
        (
            &name,
            start.format("%Y-%m-%d").to_string(),
            end.format("%Y-%m-%d").to_string(),
            break_json(&breaks)?,
            &id,
        ),
    )?;
    let quarter = store::load_quarter(conn, &id)?;
    if quarter.active {
        state.session.set(conn, Some(quarter.clone()))?;
    }
    drop_sheet_for_quarter(&mut state.attendance_sheet, &id);
    state.cache.invalidate(&CacheKey::Quarters);
    Ok(json!({ "quarter": quarter }))
}

fn handle_quarters_delete(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "quarterId")?;
    let quarter = store::load_quarter(conn, &id)?;

    let tx = conn.unchecked_transaction()?;
    let attendance = tx.execute("DELETE FROM attendance WHERE quarter_id = ?", [&id])?;
    let grading = tx.execute("DELETE FROM grading WHERE quarter_id = ?", [&id])?;
    tx.execute("DELETE FROM quarters WHERE id = ?", [&id])?;
    tx.commit()?;

    if quarter.active {
        state.session.set(conn, None)?;
    }
    drop_sheet_for_quarter(&mut state.attendance_sheet, &id);
    state.cache.invalidate(&CacheKey::Quarters);
    state.cache.invalidate_quarter(&id);
    log::info!(
        "deleted quarter {} with {} attendance and {} grading rows",
        id,
        attendance,
        grading
    );
    Ok(json!({
        "deleted": true,
        "attendanceRemoved": attendance,
        "gradingRemoved": grading,
    }))
}

fn handle_quarters_activate(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "quarterId")?;
    store::load_quarter(conn, &id)?;

    let tx = conn.unchecked_transaction()?;
    set_active(&tx, &id)?;
    tx.commit()?;

    let quarter = store::load_quarter(conn, &id)?;
    state.session.set(conn, Some(quarter.clone()))?;
    state.cache.invalidate(&CacheKey::Quarters);
    log::info!("activated quarter {} ({})", quarter.name, id);
    Ok(json!({ "quarter": quarter }))
}

fn handle_quarters_active(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    match state.session.active() {
        Some(q) => Ok(json!({ "quarter": q })),
        None => {
            let mut out = notice("no_active_quarter", "No quarter is active yet.");
            out["quarter"] = serde_json::Value::Null;
            Ok(out)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "quarters.list" => handle_quarters_list(state, req),
        "quarters.get" => handle_quarters_get(state, req),
        "quarters.create" => handle_quarters_create(state, req),
        "quarters.update" => handle_quarters_update(state, req),
        "quarters.delete" => handle_quarters_delete(state, req),
        "quarters.activate" => handle_quarters_activate(state, req),
        "quarters.active" => handle_quarters_active(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaks_are_normalized_sorted_and_deduplicated() {
        let out = normalize_breaks(vec![
            "2024-02-05T00:00:00Z".into(),
            "2024-01-08".into(),
            "2024-02-05".into(),
        ])
        .expect("breaks");
        assert_eq!(out, vec!["2024-01-08".to_string(), "2024-02-05".to_string()]);
        assert!(normalize_breaks(vec!["soon".into()]).is_err());
    }
}
