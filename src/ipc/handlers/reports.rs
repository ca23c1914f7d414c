use crate::attendance::{self, RecordFilter};
use crate::config::ReportConfig;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::grading;
use crate::ipc::error::notice;
use crate::ipc::helpers::{conn, optional_str, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::{display_name, Classroom, Quarter};
use crate::report::export::{self, ReportMeta, Strategy};
use crate::report::pivot::{self, PivotTable, ReportKind};
use crate::session::QuarterScope;
use crate::store;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// `YYYY-MM` to the first and last day of that month.
fn parse_month(raw: &str) -> AppResult<(NaiveDate, NaiveDate)> {
    let bad = || AppError::bad_params("month must be YYYY-MM");
    let (y, m) = raw.trim().split_once('-').ok_or_else(bad)?;
    let year = y.parse::<i32>().map_err(|_| bad())?;
    let month = m.parse::<u32>().map_err(|_| bad())?;
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(bad)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(bad)?;
    Ok((first, next.pred_opt().unwrap_or(first)))
}

/// Display names for every student id, including students who have since
/// left the classroom.
fn student_names(conn: &Connection, ids: BTreeSet<String>) -> AppResult<HashMap<String, String>> {
    let mut names = HashMap::new();
    for id in ids {
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT last_name, first_name FROM students WHERE id = ?",
                [&id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        if let Some((last, first)) = row {
            names.insert(id, display_name(&last, &first));
        }
    }
    Ok(names)
}

fn attendance_table(
    conn: &Connection,
    classroom: &Classroom,
    month: &str,
    quarter: Option<&Quarter>,
) -> AppResult<PivotTable> {
    let (from, to) = parse_month(month)?;
    let filter = RecordFilter {
        quarter_id: quarter.map(|q| q.id.clone()),
        from: Some(from),
        to: Some(to),
    };
    let records = attendance::list_records(conn, &classroom.id, &filter)?;
    let names = student_names(conn, records.iter().map(|r| r.student_id.clone()).collect())?;
    Ok(pivot::pivot_attendance(&records, &names))
}

fn grades_table(
    conn: &Connection,
    cfg: &ReportConfig,
    classroom: &Classroom,
    quarter: &Quarter,
) -> AppResult<PivotTable> {
    let records = grading::list_for_classroom(conn, &classroom.id, &quarter.id)?;
    let names = student_names(conn, records.iter().map(|r| r.student_id.clone()).collect())?;
    Ok(pivot::pivot_grades(&records, &names, cfg.low_score_threshold))
}

fn table_json(table: &PivotTable) -> AppResult<serde_json::Value> {
    let mut out = to_json(table)?;
    out["columnLabels"] = json!(table.column_labels());
    if table.is_empty() {
        out["notice"] = notice("no_records", "Nothing has been recorded for this selection.")["notice"].clone();
    }
    Ok(out)
}

fn no_quarter() -> serde_json::Value {
    notice("no_active_quarter", "Activate a quarter to build this report.")
}

fn handle_reports_attendance(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let classroom = store::load_classroom(conn, &required_str(&req.params, "classroomId")?)?;
    let month = required_str(&req.params, "month")?;
    let quarter_id = optional_str(&req.params, "quarterId")?;
    let scope = state.session.scope(conn, quarter_id.as_deref())?;
    let table = attendance_table(conn, &classroom, &month, scope.quarter())?;
    let mut out = table_json(&table)?;
    out["month"] = json!(month);
    Ok(out)
}

fn handle_reports_grades(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let classroom = store::load_classroom(conn, &required_str(&req.params, "classroomId")?)?;
    let quarter_id = optional_str(&req.params, "quarterId")?;
    let QuarterScope::Selected(quarter) = state.session.scope(conn, quarter_id.as_deref())? else {
        return Ok(no_quarter());
    };
    let table = grades_table(conn, &state.config.report, &classroom, &quarter)?;
    let mut out = table_json(&table)?;
    out["quarterId"] = json!(quarter.id);
    out["lowScoreThreshold"] = json!(state.config.report.low_score_threshold);
    Ok(out)
}

fn export_dir(state: &AppState, req: &Request) -> AppResult<PathBuf> {
    if let Some(dir) = optional_str(&req.params, "outDir")? {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = &state.config.report.export_dir {
        return Ok(dir.clone());
    }
    state
        .workspace
        .as_ref()
        .map(|w| w.join("exports"))
        .ok_or(AppError::NoWorkspace)
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> AppResult<PathBuf> {
    export::write_export(dir, name, bytes).map_err(|e| {
        log::error!("failed to save {}: {:#}", name, e);
        AppError::Report(format!("{:#}", e))
    })
}

fn handle_reports_export(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let raw_kind = required_str(&req.params, "kind")?;
    let kind = ReportKind::parse(&raw_kind)
        .ok_or_else(|| AppError::BadParams(format!("unknown report kind: {}", raw_kind)))?;
    let strategy = Strategy::parse(optional_str(&req.params, "strategy")?.as_deref())?;
    let classroom = store::load_classroom(conn, &required_str(&req.params, "classroomId")?)?;
    let quarter_id = optional_str(&req.params, "quarterId")?;
    let scope = state.session.scope(conn, quarter_id.as_deref())?;

    let (table, period) = match kind {
        ReportKind::Attendance => {
            let month = required_str(&req.params, "month")?;
            (attendance_table(conn, &classroom, &month, scope.quarter())?, month)
        }
        ReportKind::Grades => {
            let Some(quarter) = scope.quarter() else {
                return Ok(no_quarter());
            };
            (
                grades_table(conn, &state.config.report, &classroom, quarter)?,
                quarter.name.clone(),
            )
        }
    };

    let meta = ReportMeta {
        kind,
        classroom_name: classroom.name.clone(),
        period_label: period,
        generated_at: db::now_timestamp(),
    };
    let bytes = export::render_pdf(&table, &meta, strategy, &state.config.report)?;
    let dir = export_dir(state, req)?;
    let file_name = meta.file_name();
    let path = write_file(&dir, &file_name, &bytes)?;
    log::info!(
        "exported {} ({} strategy, {} rows, {} bytes)",
        path.to_string_lossy(),
        strategy.as_str(),
        table.rows.len(),
        bytes.len()
    );
    Ok(json!({
        "path": path.to_string_lossy(),
        "fileName": file_name,
        "strategy": strategy.as_str(),
        "rows": table.rows.len(),
        "bytes": bytes.len(),
    }))
}

fn handle_reports_export_bundle(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let conn = conn(&state.db)?;
    let classroom = store::load_classroom(conn, &required_str(&req.params, "classroomId")?)?;
    let month = required_str(&req.params, "month")?;
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);
    let quarter_id = optional_str(&req.params, "quarterId")?;
    let QuarterScope::Selected(quarter) = state.session.scope(conn, quarter_id.as_deref())? else {
        return Ok(no_quarter());
    };
    let cfg = &state.config.report;
    let now = db::now_timestamp();

    let mut entries = Vec::new();
    for (kind, table, period) in [
        (
            ReportKind::Attendance,
            attendance_table(conn, &classroom, &month, Some(&quarter))?,
            month.clone(),
        ),
        (
            ReportKind::Grades,
            grades_table(conn, cfg, &classroom, &quarter)?,
            quarter.name.clone(),
        ),
    ] {
        let meta = ReportMeta {
            kind,
            classroom_name: classroom.name.clone(),
            period_label: period,
            generated_at: now.clone(),
        };
        let bytes = export::render_pdf(&table, &meta, Strategy::Table, cfg)?;
        entries.push((meta.file_name(), bytes));
    }

    let summary = export::write_bundle(
        &out_path,
        &entries,
        json!({
            "exportedAt": now,
            "classroomId": classroom.id,
            "classroomName": classroom.name,
            "month": month,
            "quarterId": quarter.id,
            "quarterName": quarter.name,
        }),
    )
    .map_err(|e| {
        log::error!("report bundle failed: {:#}", e);
        AppError::Report(format!("{:#}", e))
    })?;
    log::info!(
        "wrote report bundle {} ({} entries)",
        summary.path.to_string_lossy(),
        summary.entry_count
    );
    Ok(json!({
        "path": summary.path.to_string_lossy(),
        "entryCount": summary.entry_count,
        "files": entries.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.attendance" => handle_reports_attendance(state, req),
        "reports.grades" => handle_reports_grades(state, req),
        "reports.export" => handle_reports_export(state, req),
        "reports.exportBundle" => handle_reports_export_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn month_bounds_cover_the_whole_month() {
        let (from, to) = parse_month("2024-02").expect("month");
        assert_eq!(from.to_string(), "2024-02-01");
        assert_eq!(to.to_string(), "2024-02-29");
        let (_, dec_end) = parse_month("2023-12").expect("december");
        assert_eq!(dec_end.day(), 31);
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("January").is_err());
    }
}
