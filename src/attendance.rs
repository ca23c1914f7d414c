//! Attendance capture for one (classroom, date, quarter) selection.

use crate::db;
use crate::error::{AppError, AppResult};
use crate::model::{AttendanceRecord, AttendanceStatus, Classroom, Quarter, Student};
use crate::schedule;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetKey {
    pub classroom_id: String,
    pub class_date: NaiveDate,
    pub quarter_id: String,
}

impl SheetKey {
    pub fn date_key(&self) -> String {
        self.class_date.format("%Y-%m-%d").to_string()
    }
}

/// In-memory statuses for the selected class date. Students without a
/// persisted record stay unset until marked.
#[derive(Debug, Clone)]
pub struct AttendanceSheet {
    key: SheetKey,
    roster: Vec<Student>,
    statuses: HashMap<String, AttendanceStatus>,
    comments: HashMap<String, String>,
}

impl AttendanceSheet {
    pub fn seed(key: SheetKey, roster: Vec<Student>, records: &[AttendanceRecord]) -> Self {
        let mut statuses = HashMap::new();
        let mut comments = HashMap::new();
        for rec in records {
            if let Some(status) = AttendanceStatus::parse(&rec.status) {
                statuses.insert(rec.student_id.clone(), status);
            }
            if let Some(c) = rec.comment.as_ref().filter(|c| !c.is_empty()) {
                comments.insert(rec.student_id.clone(), c.clone());
            }
        }
        Self {
            key,
            roster,
            statuses,
            comments,
        }
    }

    pub fn key(&self) -> &SheetKey {
        &self.key
    }

    pub fn status(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.statuses.get(student_id).copied()
    }

    pub fn mark(
        &mut self,
        student_id: &str,
        status: Option<AttendanceStatus>,
        comment: Option<String>,
    ) -> AppResult<()> {
        if !self.roster.iter().any(|s| s.id == student_id) {
            return Err(AppError::not_found("student is not in this classroom"));
        }
        match status {
            Some(s) => {
                self.statuses.insert(student_id.to_string(), s);
            }
            None => {
                self.statuses.remove(student_id);
            }
        }
        if let Some(c) = comment {
            let c = c.trim().to_string();
            if c.is_empty() {
                self.comments.remove(student_id);
            } else {
                self.comments.insert(student_id.to_string(), c);
            }
        }
        Ok(())
    }

    /// One row per rostered student holding a status, in roster order.
    pub fn rows_to_save(&self) -> Vec<(String, AttendanceStatus, Option<String>)> {
        self.roster
            .iter()
            .filter_map(|s| {
                self.statuses
                    .get(&s.id)
                    .map(|st| (s.id.clone(), *st, self.comments.get(&s.id).cloned()))
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let students: Vec<serde_json::Value> = self
            .roster
            .iter()
            .map(|s| {
                json!({
                    "studentId": s.id,
                    "displayName": s.display_name(),
                    "status": self.status(&s.id).map(|st| st.as_str()),
                    "comment": self.comments.get(&s.id),
                })
            })
            .collect();
        json!({
            "classroomId": self.key.classroom_id,
            "classDate": self.key.date_key(),
            "quarterId": self.key.quarter_id,
            "students": students,
        })
    }
}

/// Rejects dates that the classroom schedule does not produce for the quarter.
pub fn ensure_class_date(classroom: &Classroom, quarter: &Quarter, date: NaiveDate) -> AppResult<()> {
    if schedule::is_class_date(
        date,
        quarter.start_date,
        quarter.end_date,
        &classroom.days,
        &quarter.break_dates,
    ) {
        Ok(())
    } else {
        Err(AppError::BadParams(format!(
            "{} is not a class date for {} in {}",
            date, classroom.name, quarter.name
        )))
    }
}

fn record_from_row(r: &rusqlite::Row) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        classroom_id: r.get(0)?,
        student_id: r.get(1)?,
        quarter_id: r.get(2)?,
        class_date: crate::model::date_column(r, 3)?,
        status: r.get(4)?,
        comment: r.get(5)?,
    })
}

pub fn fetch_records(conn: &Connection, key: &SheetKey) -> AppResult<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT classroom_id, student_id, quarter_id, class_date, status, comment
         FROM attendance
         WHERE classroom_id = ? AND class_date = ? AND quarter_id = ?",
    )?;
    let rows = stmt
        .query_map((&key.classroom_id, key.date_key(), &key.quarter_id), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub quarter_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Flat listing for a classroom, ordered by date then student name.
pub fn list_records(
    conn: &Connection,
    classroom_id: &str,
    filter: &RecordFilter,
) -> AppResult<Vec<AttendanceRecord>> {
    let mut sql = String::from(
        "SELECT a.classroom_id, a.student_id, a.quarter_id, a.class_date, a.status, a.comment
         FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE a.classroom_id = ?",
    );
    let mut bind: Vec<Value> = vec![Value::Text(classroom_id.to_string())];
    if let Some(q) = &filter.quarter_id {
        sql.push_str(" AND a.quarter_id = ?");
        bind.push(Value::Text(q.clone()));
    }
    if let Some(from) = filter.from {
        sql.push_str(" AND a.class_date >= ?");
        bind.push(Value::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = filter.to {
        sql.push_str(" AND a.class_date <= ?");
        bind.push(Value::Text(to.format("%Y-%m-%d").to_string()));
    }
    sql.push_str(" ORDER BY a.class_date, s.last_name, s.first_name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Upserts every marked student on the four-part key, overwriting status
/// and comment. All rows commit together or not at all.
pub fn save(conn: &Connection, sheet: &AttendanceSheet) -> AppResult<usize> {
    let rows = sheet.rows_to_save();
    let key = sheet.key();
    let date = key.date_key();
    let now = db::now_timestamp();

    let tx = conn.unchecked_transaction()?;
    for (student_id, status, comment) in &rows {
        tx.execute(
            "INSERT INTO attendance(id, classroom_id, student_id, quarter_id, class_date, status, comment, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(classroom_id, student_id, quarter_id, class_date) DO UPDATE SET
               status = excluded.status,
               comment = excluded.comment,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &key.classroom_id,
                student_id,
                &key.quarter_id,
                &date,
                status.as_str(),
                comment,
                &now,
            ),
        )?;
    }
    tx.commit()?;
    log::info!(
        "saved {} attendance rows for classroom {} on {}",
        rows.len(),
        key.classroom_id,
        date
    );
    Ok(rows.len())
}
