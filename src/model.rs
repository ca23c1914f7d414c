//! Records as stored in the workspace database.

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Pending,
    Student,
    Teacher,
    Coordinator,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Role::Pending),
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "coordinator" => Some(Role::Coordinator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Pending => "pending",
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Coordinator => "coordinator",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quarter {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub break_dates: Vec<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub name: String,
    pub level_id: Option<String>,
    pub days: Vec<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub teacher_id: Option<String>,
    pub student_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub user_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
    pub level_id: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        display_name(&self.last_name, &self.first_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub user_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    /// Raw stored value; see [`Role::parse`].
    pub role: String,
    pub created_at: String,
    pub student_id: Option<String>,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Tardy,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<AttendanceStatus> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "tardy" => Some(AttendanceStatus::Tardy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Tardy => "tardy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub classroom_id: String,
    pub student_id: String,
    pub quarter_id: String,
    pub class_date: NaiveDate,
    /// Free-form as stored; well-formed rows hold an [`AttendanceStatus`].
    pub status: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    Listening,
    Speaking,
    Reading,
    Writing,
    Grammar,
    Vocabulary,
    Participation,
}

impl Skill {
    pub const ALL: [Skill; 7] = [
        Skill::Listening,
        Skill::Speaking,
        Skill::Reading,
        Skill::Writing,
        Skill::Grammar,
        Skill::Vocabulary,
        Skill::Participation,
    ];

    /// Column name in the `grading` table.
    pub fn column(self) -> &'static str {
        match self {
            Skill::Listening => "listening",
            Skill::Speaking => "speaking",
            Skill::Reading => "reading",
            Skill::Writing => "writing",
            Skill::Grammar => "grammar",
            Skill::Vocabulary => "vocabulary",
            Skill::Participation => "participation",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Skill::Listening => "Listening",
            Skill::Speaking => "Speaking",
            Skill::Reading => "Reading",
            Skill::Writing => "Writing",
            Skill::Grammar => "Grammar",
            Skill::Vocabulary => "Vocabulary",
            Skill::Participation => "Participation",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillScores {
    pub listening: f64,
    pub speaking: f64,
    pub reading: f64,
    pub writing: f64,
    pub grammar: f64,
    pub vocabulary: f64,
    pub participation: f64,
}

impl SkillScores {
    pub fn get(&self, skill: Skill) -> f64 {
        match skill {
            Skill::Listening => self.listening,
            Skill::Speaking => self.speaking,
            Skill::Reading => self.reading,
            Skill::Writing => self.writing,
            Skill::Grammar => self.grammar,
            Skill::Vocabulary => self.vocabulary,
            Skill::Participation => self.participation,
        }
    }

    pub fn set(&mut self, skill: Skill, value: f64) {
        let slot = match skill {
            Skill::Listening => &mut self.listening,
            Skill::Speaking => &mut self.speaking,
            Skill::Reading => &mut self.reading,
            Skill::Writing => &mut self.writing,
            Skill::Grammar => &mut self.grammar,
            Skill::Vocabulary => &mut self.vocabulary,
            Skill::Participation => &mut self.participation,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub student_id: String,
    pub classroom_id: String,
    pub quarter_id: String,
    pub scores: SkillScores,
    pub comment: String,
    pub updated_at: Option<String>,
}

pub fn display_name(last: &str, first: &str) -> String {
    match (last.trim().is_empty(), first.trim().is_empty()) {
        (false, false) => format!("{}, {}", last.trim(), first.trim()),
        (false, true) => last.trim().to_string(),
        _ => first.trim().to_string(),
    }
}

pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    let head = t.get(..10).unwrap_or(t);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn conversion_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_iso_date(&raw).ok_or_else(|| conversion_err(idx, format!("invalid date: {}", raw)))
}

pub fn json_list_column(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e.to_string()))
}

pub const QUARTER_COLUMNS: &str = "id, name, start_date, end_date, break_dates, active";

pub fn quarter_from_row(row: &Row) -> rusqlite::Result<Quarter> {
    Ok(Quarter {
        id: row.get(0)?,
        name: row.get(1)?,
        start_date: date_column(row, 2)?,
        end_date: date_column(row, 3)?,
        break_dates: json_list_column(row, 4)?,
        active: row.get::<_, i64>(5)? != 0,
    })
}

pub const STUDENT_COLUMNS: &str =
    "id, user_id, first_name, last_name, email, phone, birth_date, level_id";

pub fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        user_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        birth_date: row.get(6)?,
        level_id: row.get(7)?,
    })
}

pub const TEACHER_COLUMNS: &str = "id, user_id, first_name, last_name, email, phone";

pub fn teacher_from_row(row: &Row) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: row.get(0)?,
        user_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
    })
}

pub const CLASSROOM_COLUMNS: &str = "id, name, level_id, days, start_time, end_time, teacher_id";

/// Member ids are loaded separately; see `load_classroom`.
pub fn classroom_from_row(row: &Row) -> rusqlite::Result<Classroom> {
    Ok(Classroom {
        id: row.get(0)?,
        name: row.get(1)?,
        level_id: row.get(2)?,
        days: json_list_column(row, 3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        teacher_id: row.get(6)?,
        student_ids: Vec::new(),
    })
}

pub const GRADING_COLUMNS: &str = "student_id, classroom_id, quarter_id, listening, speaking, reading, writing, grammar, vocabulary, participation, comment, updated_at";

pub fn grading_from_row(row: &Row) -> rusqlite::Result<GradingRecord> {
    let mut scores = SkillScores::default();
    for (i, skill) in Skill::ALL.iter().enumerate() {
        scores.set(*skill, row.get(3 + i)?);
    }
    Ok(GradingRecord {
        student_id: row.get(0)?,
        classroom_id: row.get(1)?,
        quarter_id: row.get(2)?,
        scores,
        comment: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
