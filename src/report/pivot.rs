//! Student-by-column pivots of attendance and grading rows.
//!
//! Columns are an explicit ordered list of [`ColumnKey`]s and every row holds
//! exactly one [`Cell`] per column, in the same order.

use crate::model::{AttendanceRecord, GradingRecord, Skill};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

pub const NO_RECORD: &str = "No Record";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Attendance,
    Grades,
}

impl ReportKind {
    pub fn parse(raw: &str) -> Option<ReportKind> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "attendance" => Some(ReportKind::Attendance),
            "grades" | "grading" => Some(ReportKind::Grades),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportKind::Attendance => "Attendance",
            ReportKind::Grades => "Grades",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ColumnKey {
    Date(NaiveDate),
    Skill(Skill),
    Comment,
}

impl ColumnKey {
    pub fn label(&self) -> String {
        match self {
            ColumnKey::Date(d) => d.format("%m/%d").to_string(),
            ColumnKey::Skill(s) => s.label().to_string(),
            ColumnKey::Comment => "Comment".to_string(),
        }
    }
}

/// Visual treatment of a cell, independent of the output medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Plain,
    Positive,
    Negative,
    Caution,
    Neutral,
    Muted,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Cell {
    Status {
        /// Stored status, or [`NO_RECORD`].
        value: String,
        glyph: String,
        tone: Tone,
    },
    Score {
        value: f64,
        low: bool,
    },
    Text {
        value: String,
    },
}

impl Cell {
    /// present/absent/tardy match case-insensitively; any other non-empty
    /// value shows its first character uppercased.
    pub fn status(raw: Option<&str>) -> Cell {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Cell::Status {
                value: NO_RECORD.to_string(),
                glyph: "-".to_string(),
                tone: Tone::Muted,
            };
        };
        let (glyph, tone) = match raw.to_ascii_lowercase().as_str() {
            "present" => ("P".to_string(), Tone::Positive),
            "absent" => ("A".to_string(), Tone::Negative),
            "tardy" => ("T".to_string(), Tone::Caution),
            _ => (
                raw.chars()
                    .next()
                    .map(|c| c.to_uppercase().collect::<String>())
                    .unwrap_or_default(),
                Tone::Neutral,
            ),
        };
        Cell::Status {
            value: raw.to_string(),
            glyph,
            tone,
        }
    }

    pub fn score(value: f64, low_threshold: f64) -> Cell {
        Cell::Score {
            value,
            low: is_low_score(value, low_threshold),
        }
    }

    pub fn tone(&self) -> Tone {
        match self {
            Cell::Status { tone, .. } => *tone,
            Cell::Score { low: true, .. } => Tone::Warning,
            Cell::Score { .. } | Cell::Text { .. } => Tone::Plain,
        }
    }

    /// Short text for rendering.
    pub fn display(&self) -> String {
        match self {
            Cell::Status { glyph, .. } => glyph.clone(),
            Cell::Score { value, .. } => format_score(*value),
            Cell::Text { value } => value.clone(),
        }
    }

    /// Underlying value as shown in listings (`No Record` for missing).
    #[cfg(test)]
    pub fn value_label(&self) -> String {
        match self {
            Cell::Status { value, .. } => value.clone(),
            Cell::Score { value, .. } => format_score(*value),
            Cell::Text { value } => value.clone(),
        }
    }
}

pub fn is_low_score(value: f64, threshold: f64) -> bool {
    value < threshold
}

fn format_score(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.1}", v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotRow {
    pub student_id: String,
    pub student_name: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotTable {
    pub kind: ReportKind,
    pub columns: Vec<ColumnKey>,
    pub rows: Vec<PivotRow>,
}

impl PivotTable {
    pub fn column_labels(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label()).collect()
    }

    #[cfg(test)]
    pub fn cell(&self, student_id: &str, column: &ColumnKey) -> Option<&Cell> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|r| r.student_id == student_id)
            .and_then(|r| r.cells.get(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn name_of(names: &HashMap<String, String>, id: &str) -> String {
    names.get(id).cloned().unwrap_or_else(|| id.to_string())
}

fn sort_students(ids: impl IntoIterator<Item = String>, names: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = ids
        .into_iter()
        .map(|id| {
            let name = name_of(names, &id);
            (id, name)
        })
        .collect();
    out.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()).then(a.0.cmp(&b.0)));
    out
}

/// One row per student appearing in `records`, one column per distinct date.
pub fn pivot_attendance(records: &[AttendanceRecord], names: &HashMap<String, String>) -> PivotTable {
    let dates: BTreeSet<NaiveDate> = records.iter().map(|r| r.class_date).collect();
    let students: BTreeSet<String> = records.iter().map(|r| r.student_id.clone()).collect();
    let by_key: HashMap<(&str, NaiveDate), &str> = records
        .iter()
        .map(|r| ((r.student_id.as_str(), r.class_date), r.status.as_str()))
        .collect();

    let rows = sort_students(students, names)
        .into_iter()
        .map(|(id, name)| {
            let cells = dates
                .iter()
                .map(|d| Cell::status(by_key.get(&(id.as_str(), *d)).copied()))
                .collect();
            PivotRow {
                student_id: id,
                student_name: name,
                cells,
            }
        })
        .collect();

    PivotTable {
        kind: ReportKind::Attendance,
        columns: dates.into_iter().map(ColumnKey::Date).collect(),
        rows,
    }
}

/// Skill columns followed by a comment column.
pub fn pivot_grades(
    records: &[GradingRecord],
    names: &HashMap<String, String>,
    low_threshold: f64,
) -> PivotTable {
    let by_student: HashMap<&str, &GradingRecord> = records
        .iter()
        .map(|r| (r.student_id.as_str(), r))
        .collect();
    let ids = by_student.keys().map(|s| s.to_string()).collect::<Vec<_>>();

    let rows = sort_students(ids, names)
        .into_iter()
        .map(|(id, name)| {
            let rec = by_student[id.as_str()];
            let mut cells: Vec<Cell> = Skill::ALL
                .iter()
                .map(|s| Cell::score(rec.scores.get(*s), low_threshold))
                .collect();
            cells.push(Cell::Text {
                value: rec.comment.clone(),
            });
            PivotRow {
                student_id: id,
                student_name: name,
                cells,
            }
        })
        .collect();

    let mut columns: Vec<ColumnKey> = Skill::ALL.iter().map(|s| ColumnKey::Skill(*s)).collect();
    columns.push(ColumnKey::Comment);
    PivotTable {
        kind: ReportKind::Grades,
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_iso_date, SkillScores};

    fn rec(student: &str, date: &str, status: &str) -> AttendanceRecord {
        AttendanceRecord {
            classroom_id: "c1".into(),
            student_id: student.into(),
            quarter_id: "q1".into(),
            class_date: parse_iso_date(date).expect("date"),
            status: status.into(),
            comment: None,
        }
    }

    fn names() -> HashMap<String, String> {
        HashMap::from([
            ("a".to_string(), "Alvarez, Ana".to_string()),
            ("b".to_string(), "Brooks, Ben".to_string()),
        ])
    }

    #[test]
    fn missing_cells_read_no_record() {
        let d1 = parse_iso_date("2024-01-01").expect("d1");
        let d2 = parse_iso_date("2024-01-03").expect("d2");
        let records = vec![
            rec("a", "2024-01-01", "present"),
            rec("b", "2024-01-03", "absent"),
        ];
        let t = pivot_attendance(&records, &names());
        assert_eq!(t.columns, vec![ColumnKey::Date(d1), ColumnKey::Date(d2)]);

        let a_d1 = t.cell("a", &ColumnKey::Date(d1)).expect("cell");
        let a_d2 = t.cell("a", &ColumnKey::Date(d2)).expect("cell");
        let b_d1 = t.cell("b", &ColumnKey::Date(d1)).expect("cell");
        assert_eq!(a_d1.value_label(), "present");
        assert_eq!(a_d2.value_label(), NO_RECORD);
        assert_eq!(b_d1.value_label(), NO_RECORD);
        assert_eq!(b_d1.display(), "-");
        assert_eq!(b_d1.tone(), Tone::Muted);
    }

    #[test]
    fn students_without_rows_are_absent_from_report() {
        let t = pivot_attendance(&[rec("a", "2024-01-01", "present")], &names());
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.rows[0].student_name, "Alvarez, Ana");
        assert!(pivot_attendance(&[], &names()).is_empty());
    }

    #[test]
    fn status_mapping_glyphs_and_tones() {
        let cases = [
            ("present", "P", Tone::Positive),
            ("ABSENT", "A", Tone::Negative),
            ("Tardy", "T", Tone::Caution),
            ("excused", "E", Tone::Neutral),
        ];
        for (raw, glyph, tone) in cases {
            let c = Cell::status(Some(raw));
            assert_eq!(c.display(), glyph, "{}", raw);
            assert_eq!(c.tone(), tone, "{}", raw);
        }
        assert_eq!(Cell::status(Some("")).display(), "-");
    }

    #[test]
    fn low_score_threshold_is_strict() {
        assert!(is_low_score(65.0, 70.0));
        assert!(!is_low_score(70.0, 70.0));
        assert_eq!(Cell::score(65.0, 70.0).tone(), Tone::Warning);
        assert_eq!(Cell::score(70.0, 70.0).tone(), Tone::Plain);
    }

    #[test]
    fn grade_pivot_has_skill_columns_then_comment() {
        let mut scores = SkillScores::default();
        scores.listening = 65.0;
        scores.speaking = 88.5;
        let records = vec![GradingRecord {
            student_id: "b".into(),
            classroom_id: "c1".into(),
            quarter_id: "q1".into(),
            scores,
            comment: "steady".into(),
            updated_at: None,
        }];
        let t = pivot_grades(&records, &names(), 70.0);
        assert_eq!(t.columns.len(), 8);
        assert_eq!(t.columns[7], ColumnKey::Comment);
        let listening = t.cell("b", &ColumnKey::Skill(Skill::Listening)).expect("cell");
        assert_eq!(listening, &Cell::Score { value: 65.0, low: true });
        let speaking = t.cell("b", &ColumnKey::Skill(Skill::Speaking)).expect("cell");
        assert_eq!(speaking.display(), "88.5");
        assert_eq!(t.cell("b", &ColumnKey::Comment).map(|c| c.display()), Some("steady".into()));
    }

    #[test]
    fn rows_sort_by_display_name() {
        let records = vec![rec("b", "2024-01-01", "present"), rec("a", "2024-01-01", "tardy")];
        let t = pivot_attendance(&records, &names());
        let order: Vec<&str> = t.rows.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }
}
