use crate::attendance::{self, AttendanceSheet, RecordFilter, SheetKey};
use crate::cache::CacheKey;
use crate::error::{AppError, AppResult};
use crate::ipc::error::notice;
use crate::ipc::helpers::{
    conn, from_json, optional_date, optional_str, required_date, required_str, respond, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceRecord, AttendanceStatus};
use crate::session::QuarterScope;
use crate::store;
use serde_json::json;

fn cache_key(key: &SheetKey) -> CacheKey {
    CacheKey::Attendance {
        classroom_id: key.classroom_id.clone(),
        class_date: key.date_key(),
        quarter_id: key.quarter_id.clone(),
    }
}

fn parse_status(value: &serde_json::Value) -> AppResult<Option<AttendanceStatus>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => AttendanceStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::BadParams(format!("unknown attendance status: {}", s))),
        _ => Err(AppError::bad_params("status must be a string or null")),
    }
}

fn no_sheet() -> serde_json::Value {
    notice("no_selection", "Select a classroom and class date first.")
}

fn handle_attendance_open(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let classroom_id = required_str(&req.params, "classroomId")?;
    let date = required_date(&req.params, "date")?;
    let quarter_id = optional_str(&req.params, "quarterId")?;

    let classroom = store::load_classroom(conn, &classroom_id)?;
    let QuarterScope::Selected(quarter) = state.session.scope(conn, quarter_id.as_deref())? else {
        state.attendance_sheet = None;
        return Ok(notice("no_active_quarter", "Activate a quarter to take attendance."));
    };
    attendance::ensure_class_date(&classroom, &quarter, date)?;

    let key = SheetKey {
        classroom_id,
        class_date: date,
        quarter_id: quarter.id.clone(),
    };
    let cached = state
        .cache
        .get_or_fetch(cache_key(&key), || to_json(&attendance::fetch_records(conn, &key)?))?;
    let records: Vec<AttendanceRecord> = from_json(cached)?;
    let roster = store::classroom_roster(conn, &key.classroom_id)?;
    let sheet = AttendanceSheet::seed(key, roster, &records);
    let out = json!({ "sheet": sheet.to_json() });
    state.attendance_sheet = Some(sheet);
    Ok(out)
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let Some(sheet) = state.attendance_sheet.as_mut() else {
        return Ok(no_sheet());
    };
    let student_id = required_str(&req.params, "studentId")?;
    let status = parse_status(req.params.get("status").unwrap_or(&serde_json::Value::Null))?;
    let comment = match req.params.get("comment") {
        None => None,
        Some(serde_json::Value::Null) => Some(String::new()),
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(AppError::bad_params("comment must be a string")),
    };
    sheet.mark(&student_id, status, comment)?;
    Ok(json!({ "sheet": sheet.to_json() }))
}

fn handle_attendance_save(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let Some(current) = state.attendance_sheet.as_ref() else {
        return Ok(no_sheet());
    };

    // Work on a copy so a rejected merge or failed write leaves the open
    // sheet untouched.
    let mut sheet = current.clone();
    match req.params.get("statuses") {
        None | Some(serde_json::Value::Null) => {}
        Some(serde_json::Value::Object(map)) => {
            for (student_id, value) in map {
                sheet.mark(student_id, parse_status(value)?, None)?;
            }
        }
        Some(_) => return Err(AppError::bad_params("statuses must be an object")),
    }

    // The quarter or schedule may have changed since the sheet was opened.
    let key = sheet.key();
    let classroom = store::load_classroom(conn, &key.classroom_id)?;
    let quarter = store::load_quarter(conn, &key.quarter_id)?;
    attendance::ensure_class_date(&classroom, &quarter, key.class_date)?;

    let saved = attendance::save(conn, &sheet)?;
    state.cache.invalidate(&cache_key(sheet.key()));
    let out = json!({ "saved": saved, "sheet": sheet.to_json() });
    state.attendance_sheet = Some(sheet);
    Ok(out)
}

fn handle_attendance_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let classroom_id = required_str(&req.params, "classroomId")?;
    if !store::exists(conn, "classrooms", &classroom_id)? {
        return Err(AppError::not_found("classroom not found"));
    }
    let filter = RecordFilter {
        quarter_id: optional_str(&req.params, "quarterId")?,
        from: optional_date(&req.params, "from")?,
        to: optional_date(&req.params, "to")?,
    };
    let records = attendance::list_records(conn, &classroom_id, &filter)?;
    Ok(json!({ "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.open" => handle_attendance_open(state, req),
        "attendance.mark" => handle_attendance_mark(state, req),
        "attendance.save" => handle_attendance_save(state, req),
        "attendance.list" => handle_attendance_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
