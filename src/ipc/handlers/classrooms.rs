use crate::attendance::AttendanceSheet;
use crate::cache::CacheKey;
use crate::error::{AppError, AppResult};
use crate::ipc::error::notice;
use crate::ipc::helpers::{
    conn, optional_str, patch_optional, required_str, respond, string_list,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, parse_weekday, weekday_name};
use crate::session::QuarterScope;
use crate::store;
use chrono::{Datelike, NaiveTime, Weekday};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// Canonical day names in week order. Unknown names are rejected here so
/// stored schedules always derive dates.
fn normalize_days(raw: Vec<String>) -> AppResult<Vec<String>> {
    let mut days: Vec<Weekday> = Vec::new();
    for name in raw {
        let day = parse_weekday(&name)
            .ok_or_else(|| AppError::BadParams(format!("unknown weekday: {}", name)))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    Ok(days.into_iter().map(|d| weekday_name(d).to_string()).collect())
}

fn parse_time(params: &serde_json::Value, key: &str) -> AppResult<Option<NaiveTime>> {
    match optional_str(params, key)? {
        Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M")
            .map(Some)
            .map_err(|_| AppError::BadParams(format!("{} must be HH:MM", key))),
        None => Ok(None),
    }
}

fn check_reference(conn: &Connection, table: &str, id: Option<&str>, what: &str) -> AppResult<()> {
    match id {
        Some(id) if !store::exists(conn, table, id)? => {
            Err(AppError::NotFound(format!("{} not found", what)))
        }
        _ => Ok(()),
    }
}

/// Replaces the membership list. Runs inside the caller's transaction.
fn replace_members(conn: &Connection, classroom_id: &str, student_ids: &[String]) -> AppResult<()> {
    for sid in student_ids {
        if !store::exists(conn, "students", sid)? {
            return Err(AppError::NotFound(format!("student {} not found", sid)));
        }
    }
    conn.execute(
        "DELETE FROM classroom_students WHERE classroom_id = ?",
        [classroom_id],
    )?;
    for sid in student_ids {
        conn.execute(
            "INSERT OR IGNORE INTO classroom_students(classroom_id, student_id) VALUES(?, ?)",
            (classroom_id, sid),
        )?;
    }
    Ok(())
}

fn drop_sheet_for(sheet: &mut Option<AttendanceSheet>, classroom_id: &str) {
    if sheet
        .as_ref()
        .is_some_and(|s| s.key().classroom_id == classroom_id)
    {
        *sheet = None;
    }
}

fn list_classrooms(conn: &Connection) -> AppResult<serde_json::Value> {
    let mut stmt = conn.prepare(
        "SELECT
           c.id, c.name, c.level_id, l.name, c.days, c.start_time, c.end_time,
           c.teacher_id, t.last_name, t.first_name,
           (SELECT COUNT(*) FROM classroom_students cs WHERE cs.classroom_id = c.id)
         FROM classrooms c
         LEFT JOIN levels l ON l.id = c.level_id
         LEFT JOIN teachers t ON t.id = c.teacher_id
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let teacher_last: Option<String> = r.get(8)?;
            let teacher_first: Option<String> = r.get(9)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "levelId": r.get::<_, Option<String>>(2)?,
                "levelName": r.get::<_, Option<String>>(3)?,
                "days": crate::model::json_list_column(r, 4)?,
                "startTime": r.get::<_, Option<String>>(5)?,
                "endTime": r.get::<_, Option<String>>(6)?,
                "teacherId": r.get::<_, Option<String>>(7)?,
                "teacherName": teacher_last.map(|l| {
                    crate::model::display_name(&l, teacher_first.as_deref().unwrap_or(""))
                }),
                "studentCount": r.get::<_, i64>(10)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::Value::Array(rows))
}

fn handle_classrooms_list(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let teacher = optional_str(&req.params, "teacherId")?;
    let all = state
        .cache
        .get_or_fetch(CacheKey::Classrooms, || list_classrooms(conn))?;
    let classrooms: Vec<serde_json::Value> = all
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|c| match &teacher {
            Some(t) => c.get("teacherId").and_then(|v| v.as_str()) == Some(t.as_str()),
            None => true,
        })
        .collect();
    Ok(json!({ "classrooms": classrooms }))
}

fn handle_classrooms_get(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "classroomId")?;
    let classroom = store::load_classroom(conn, &id)?;
    let roster = store::classroom_roster(conn, &id)?;
    Ok(json!({ "classroom": classroom, "students": roster }))
}

struct ClassroomFields {
    name: String,
    level_id: Option<String>,
    days: Vec<String>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    teacher_id: Option<String>,
}

impl ClassroomFields {
    fn validate(&self, conn: &Connection) -> AppResult<()> {
        if let (Some(s), Some(e)) = (self.start_time, self.end_time) {
            if s >= e {
                return Err(AppError::bad_params("startTime must be before endTime"));
            }
        }
        check_reference(conn, "levels", self.level_id.as_deref(), "level")?;
        check_reference(conn, "teachers", self.teacher_id.as_deref(), "teacher")
    }

    fn days_json(&self) -> AppResult<String> {
        serde_json::to_string(&self.days).map_err(|e| AppError::Other(e.into()))
    }
}

fn fmt_time(t: Option<NaiveTime>) -> Option<String> {
    t.map(|t| t.format("%H:%M").to_string())
}

fn handle_classrooms_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let fields = ClassroomFields {
        name: required_str(&req.params, "name")?,
        level_id: optional_str(&req.params, "levelId")?,
        days: normalize_days(string_list(&req.params, "days")?.unwrap_or_default())?,
        start_time: parse_time(&req.params, "startTime")?,
        end_time: parse_time(&req.params, "endTime")?,
        teacher_id: optional_str(&req.params, "teacherId")?,
    };
    fields.validate(conn)?;
    let student_ids = string_list(&req.params, "studentIds")?.unwrap_or_default();

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO classrooms(id, name, level_id, days, start_time, end_time, teacher_id)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &fields.name,
            &fields.level_id,
            fields.days_json()?,
            fmt_time(fields.start_time),
            fmt_time(fields.end_time),
            &fields.teacher_id,
        ),
    )?;
    replace_members(&tx, &id, &student_ids)?;
    tx.commit()?;

    state.cache.invalidate(&CacheKey::Classrooms);
    log::info!("created classroom {} ({})", fields.name, id);
    Ok(json!({ "classroomId": id, "classroom": store::load_classroom(conn, &id)? }))
}

fn handle_classrooms_update(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "classroomId")?;
    let current = store::load_classroom(conn, &id)?;
    let p = &req.params;

    let time = |key: &str, current: Option<String>| -> AppResult<Option<NaiveTime>> {
        match p.get(key) {
            None => Ok(current.and_then(|t| NaiveTime::parse_from_str(&t, "%H:%M").ok())),
            Some(_) => parse_time(p, key),
        }
    };
    let fields = ClassroomFields {
        name: optional_str(p, "name")?.unwrap_or(current.name),
        level_id: patch_optional(p, "levelId", current.level_id)?,
        days: match string_list(p, "days")? {
            Some(raw) => normalize_days(raw)?,
            None => current.days,
        },
        start_time: time("startTime", current.start_time)?,
        end_time: time("endTime", current.end_time)?,
        teacher_id: patch_optional(p, "teacherId", current.teacher_id)?,
    };
    fields.validate(conn)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE classrooms
         SET name = ?, level_id = ?, days = ?, start_time = ?, end_time = ?, teacher_id = ?
         WHERE id = ?",
        (
            &fields.name,
            &fields.level_id,
            fields.days_json()?,
            fmt_time(fields.start_time),
            fmt_time(fields.end_time),
            &fields.teacher_id,
            &id,
        ),
    )?;
    if let Some(student_ids) = string_list(p, "studentIds")? {
        replace_members(&tx, &id, &student_ids)?;
    }
    tx.commit()?;

    state.cache.invalidate(&CacheKey::Classrooms);
    drop_sheet_for(&mut state.attendance_sheet, &id);
    Ok(json!({ "classroom": store::load_classroom(conn, &id)? }))
}

fn handle_classrooms_delete(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "classroomId")?;
    if !store::exists(conn, "classrooms", &id)? {
        return Err(AppError::not_found("classroom not found"));
    }

    // No ON DELETE CASCADE; dependents go first.
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM attendance WHERE classroom_id = ?", [&id])?;
    tx.execute("DELETE FROM grading WHERE classroom_id = ?", [&id])?;
    tx.execute("DELETE FROM classroom_students WHERE classroom_id = ?", [&id])?;
    tx.execute("DELETE FROM classrooms WHERE id = ?", [&id])?;
    tx.commit()?;

    state.cache.invalidate(&CacheKey::Classrooms);
    state.cache.invalidate_classroom(&id);
    drop_sheet_for(&mut state.attendance_sheet, &id);
    log::info!("deleted classroom {}", id);
    Ok(json!({ "deleted": true }))
}

fn handle_classrooms_set_students(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "classroomId")?;
    if !store::exists(conn, "classrooms", &id)? {
        return Err(AppError::not_found("classroom not found"));
    }
    let student_ids = string_list(&req.params, "studentIds")?
        .ok_or_else(|| AppError::bad_params("missing studentIds"))?;

    let tx = conn.unchecked_transaction()?;
    replace_members(&tx, &id, &student_ids)?;
    tx.commit()?;

    state.cache.invalidate(&CacheKey::Classrooms);
    drop_sheet_for(&mut state.attendance_sheet, &id);
    Ok(json!({ "studentIds": store::classroom_student_ids(conn, &id)? }))
}

fn handle_classrooms_class_dates(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let id = required_str(&req.params, "classroomId")?;
    let classroom = store::load_classroom(conn, &id)?;
    let quarter_id = optional_str(&req.params, "quarterId")?;
    let scope = state.session.scope(conn, quarter_id.as_deref())?;
    let QuarterScope::Selected(quarter) = scope else {
        let mut out = notice("no_active_quarter", "Activate a quarter to see class dates.");
        out["dates"] = json!([]);
        return Ok(out);
    };
    let dates = schedule::class_dates(
        quarter.start_date,
        quarter.end_date,
        &classroom.days,
        &quarter.break_dates,
    );
    let dates: Vec<serde_json::Value> = dates
        .iter()
        .map(|d| {
            json!({
                "date": d.format("%Y-%m-%d").to_string(),
                "weekday": weekday_name(d.weekday()),
            })
        })
        .collect();
    Ok(json!({
        "classroomId": id,
        "quarterId": quarter.id,
        "dates": dates,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classrooms.list" => handle_classrooms_list(state, req),
        "classrooms.get" => handle_classrooms_get(state, req),
        "classrooms.create" => handle_classrooms_create(state, req),
        "classrooms.update" => handle_classrooms_update(state, req),
        "classrooms.delete" => handle_classrooms_delete(state, req),
        "classrooms.setStudents" => handle_classrooms_set_students(state, req),
        "classrooms.classDates" => handle_classrooms_class_dates(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_are_canonical_and_ordered() {
        let days = normalize_days(vec!["wed".into(), "Monday".into(), "WEDNESDAY".into()])
            .expect("days");
        assert_eq!(days, vec!["Monday".to_string(), "Wednesday".to_string()]);
        assert!(normalize_days(vec!["Funday".into()]).is_err());
    }
}
