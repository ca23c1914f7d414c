//! Skill grading, one record per (student, classroom, quarter).

use crate::db;
use crate::error::{AppError, AppResult};
use crate::model::{grading_from_row, GradingRecord, Skill, SkillScores, GRADING_COLUMNS};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

pub fn clamp_score(v: f64) -> f64 {
    if v.is_nan() {
        return MIN_SCORE;
    }
    v.clamp(MIN_SCORE, MAX_SCORE)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingForm {
    pub scores: SkillScores,
    pub comment: String,
}

impl GradingForm {
    /// Prior record values, or all-zero scores and an empty comment.
    pub fn from_record(record: Option<&GradingRecord>) -> Self {
        match record {
            Some(r) => Self {
                scores: r.scores,
                comment: r.comment.clone(),
            },
            None => Self::default(),
        }
    }

    pub fn clamped(mut self) -> Self {
        for skill in Skill::ALL {
            let v = clamp_score(self.scores.get(skill));
            self.scores.set(skill, v);
        }
        self
    }
}

/// Reads a `{skill: number}` object. Missing skills are zero; numeric
/// strings are accepted; anything else is rejected.
pub fn parse_scores(raw: Option<&serde_json::Value>) -> AppResult<SkillScores> {
    let mut scores = SkillScores::default();
    let Some(raw) = raw else {
        return Ok(scores);
    };
    let Some(obj) = raw.as_object() else {
        return Err(AppError::bad_params("scores must be an object"));
    };
    for (name, value) in obj {
        let skill = Skill::ALL
            .into_iter()
            .find(|s| s.column() == name.to_ascii_lowercase())
            .ok_or_else(|| AppError::BadParams(format!("unknown skill: {}", name)))?;
        let v = match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            serde_json::Value::Null => Some(0.0),
            _ => None,
        }
        .ok_or_else(|| AppError::BadParams(format!("score for {} must be numeric", name)))?;
        scores.set(skill, v);
    }
    Ok(scores)
}

pub fn fetch(
    conn: &Connection,
    student_id: &str,
    classroom_id: &str,
    quarter_id: &str,
) -> AppResult<Option<GradingRecord>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM grading WHERE student_id = ? AND classroom_id = ? AND quarter_id = ?",
                GRADING_COLUMNS
            ),
            (student_id, classroom_id, quarter_id),
            grading_from_row,
        )
        .optional()?)
}

/// Inserts or fully overwrites the record on the three-part key.
pub fn upsert(
    conn: &Connection,
    student_id: &str,
    classroom_id: &str,
    quarter_id: &str,
    form: GradingForm,
) -> AppResult<GradingRecord> {
    let form = form.clamped();
    let skill_cols: Vec<&str> = Skill::ALL.iter().map(|s| s.column()).collect();
    let updates = skill_cols
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(",\n               ");
    let sql = format!(
        "INSERT INTO grading(id, student_id, classroom_id, quarter_id, {cols}, comment, updated_at)
         VALUES(?, ?, ?, ?, {marks}, ?, ?)
         ON CONFLICT(student_id, classroom_id, quarter_id) DO UPDATE SET
               {updates},
               comment = excluded.comment,
               updated_at = excluded.updated_at",
        cols = skill_cols.join(", "),
        marks = vec!["?"; skill_cols.len()].join(", "),
        updates = updates,
    );

    let mut bind: Vec<rusqlite::types::Value> = vec![
        Uuid::new_v4().to_string().into(),
        student_id.to_string().into(),
        classroom_id.to_string().into(),
        quarter_id.to_string().into(),
    ];
    for skill in Skill::ALL {
        bind.push(form.scores.get(skill).into());
    }
    bind.push(form.comment.trim().to_string().into());
    bind.push(db::now_timestamp().into());
    conn.execute(&sql, rusqlite::params_from_iter(bind))?;

    log::info!(
        "saved grading for student {} in classroom {} ({})",
        student_id,
        classroom_id,
        quarter_id
    );
    fetch(conn, student_id, classroom_id, quarter_id)?
        .ok_or_else(|| AppError::Other(anyhow::anyhow!("grading row missing after upsert")))
}

pub fn list_for_classroom(
    conn: &Connection,
    classroom_id: &str,
    quarter_id: &str,
) -> AppResult<Vec<GradingRecord>> {
    let cols = GRADING_COLUMNS
        .split(", ")
        .map(|c| format!("g.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {}
         FROM grading g
         JOIN students s ON s.id = g.student_id
         WHERE g.classroom_id = ? AND g.quarter_id = ?
         ORDER BY s.last_name, s.first_name",
        cols
    ))?;
    let rows = stmt
        .query_map((classroom_id, quarter_id), grading_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;
    use serde_json::json;

    #[test]
    fn clamp_bounds_and_nan() {
        assert_eq!(clamp_score(-5.0), 0.0);
        assert_eq!(clamp_score(104.0), 100.0);
        assert_eq!(clamp_score(72.5), 72.5);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }

    #[test]
    fn form_defaults_to_zeros_without_record() {
        let form = GradingForm::from_record(None);
        for skill in Skill::ALL {
            assert_eq!(form.scores.get(skill), 0.0);
        }
        assert!(form.comment.is_empty());
    }

    #[test]
    fn parse_scores_accepts_numbers_and_numeric_strings() {
        let s = parse_scores(Some(&json!({ "listening": 80, "Reading": "65.5" }))).expect("parse");
        assert_eq!(s.listening, 80.0);
        assert_eq!(s.reading, 65.5);
        assert_eq!(s.writing, 0.0);
        assert!(parse_scores(Some(&json!({ "cooking": 1 }))).is_err());
        assert!(parse_scores(Some(&json!({ "grammar": true }))).is_err());
    }

    #[test]
    fn missing_record_is_not_an_error() {
        let conn = fixtures::seeded();
        assert!(fetch(&conn, "s1", "c1", "q1").expect("fetch").is_none());
    }

    #[test]
    fn upsert_overwrites_every_field_and_clamps() {
        let conn = fixtures::seeded();
        let mut scores = SkillScores::default();
        scores.listening = 150.0;
        scores.grammar = 40.0;
        upsert(
            &conn,
            "s1",
            "c1",
            "q1",
            GradingForm {
                scores,
                comment: "first".into(),
            },
        )
        .expect("first");

        let mut second = SkillScores::default();
        second.speaking = 90.0;
        let rec = upsert(
            &conn,
            "s1",
            "c1",
            "q1",
            GradingForm {
                scores: second,
                comment: "second".into(),
            },
        )
        .expect("second");
        assert_eq!(rec.scores.listening, 0.0);
        assert_eq!(rec.scores.grammar, 0.0);
        assert_eq!(rec.scores.speaking, 90.0);
        assert_eq!(rec.comment, "second");

        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM grading", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 1);
    }

    #[test]
    fn clamps_on_write() {
        let conn = fixtures::seeded();
        let mut scores = SkillScores::default();
        scores.vocabulary = -3.0;
        scores.participation = 101.0;
        let rec = upsert(
            &conn,
            "s2",
            "c1",
            "q1",
            GradingForm {
                scores,
                comment: String::new(),
            },
        )
        .expect("upsert");
        assert_eq!(rec.scores.vocabulary, 0.0);
        assert_eq!(rec.scores.participation, 100.0);
    }
}
