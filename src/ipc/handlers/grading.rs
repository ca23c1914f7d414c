use crate::cache::CacheKey;
use crate::error::{AppError, AppResult};
use crate::grading::{self, GradingForm};
use crate::ipc::error::notice;
use crate::ipc::helpers::{conn, from_json, optional_str, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::{GradingRecord, Quarter};
use crate::session::QuarterScope;
use crate::store;
use rusqlite::Connection;
use serde_json::json;

struct Target {
    student_id: String,
    classroom_id: String,
    quarter: Quarter,
}

impl Target {
    fn cache_key(&self) -> CacheKey {
        CacheKey::Grading {
            student_id: self.student_id.clone(),
            classroom_id: self.classroom_id.clone(),
            quarter_id: self.quarter.id.clone(),
        }
    }
}

/// Resolves the (student, classroom, quarter) triple. `None` means no
/// quarter was named and none is active.
fn resolve_target(
    state: &AppState,
    conn: &Connection,
    params: &serde_json::Value,
) -> AppResult<Option<Target>> {
    let student_id = required_str(params, "studentId")?;
    let classroom_id = required_str(params, "classroomId")?;
    let quarter_id = optional_str(params, "quarterId")?;
    if !store::exists(conn, "classrooms", &classroom_id)? {
        return Err(AppError::not_found("classroom not found"));
    }
    if !store::is_member(conn, &classroom_id, &student_id)? {
        return Err(AppError::not_found("student is not in this classroom"));
    }
    Ok(match state.session.scope(conn, quarter_id.as_deref())? {
        QuarterScope::Selected(quarter) => Some(Target {
            student_id,
            classroom_id,
            quarter,
        }),
        QuarterScope::Unset => None,
    })
}

fn no_quarter() -> serde_json::Value {
    notice("no_active_quarter", "Activate a quarter to record grades.")
}

fn handle_grading_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let Some(t) = resolve_target(state, conn, &req.params)? else {
        return Ok(no_quarter());
    };
    let cached = state.cache.get_or_fetch(t.cache_key(), || {
        to_json(&grading::fetch(conn, &t.student_id, &t.classroom_id, &t.quarter.id)?)
    })?;
    let record: Option<GradingRecord> = from_json(cached)?;
    let form = GradingForm::from_record(record.as_ref());
    Ok(json!({
        "quarterId": t.quarter.id,
        "record": record,
        "form": form,
    }))
}

fn handle_grading_save(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let Some(t) = resolve_target(state, conn, &req.params)? else {
        return Ok(no_quarter());
    };
    let form = GradingForm {
        scores: grading::parse_scores(req.params.get("scores"))?,
        comment: match req.params.get("comment") {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(_) => return Err(AppError::bad_params("comment must be a string")),
        },
    };
    let record = grading::upsert(conn, &t.student_id, &t.classroom_id, &t.quarter.id, form)?;
    state.cache.invalidate(&t.cache_key());
    Ok(json!({ "record": record }))
}

fn handle_grading_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let classroom_id = required_str(&req.params, "classroomId")?;
    let quarter_id = optional_str(&req.params, "quarterId")?;
    if !store::exists(conn, "classrooms", &classroom_id)? {
        return Err(AppError::not_found("classroom not found"));
    }
    let QuarterScope::Selected(quarter) = state.session.scope(conn, quarter_id.as_deref())? else {
        let mut out = no_quarter();
        out["records"] = json!([]);
        return Ok(out);
    };
    let records = grading::list_for_classroom(conn, &classroom_id, &quarter.id)?;
    Ok(json!({ "quarterId": quarter.id, "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grading.get" => handle_grading_get(state, req),
        "grading.save" => handle_grading_save(state, req),
        "grading.list" => handle_grading_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
