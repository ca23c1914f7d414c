//! Shared lookups used by several method families.

use crate::error::{AppError, AppResult};
use crate::model::{
    classroom_from_row, quarter_from_row, student_from_row, Classroom, Quarter, Student,
    CLASSROOM_COLUMNS, QUARTER_COLUMNS, STUDENT_COLUMNS,
};
use rusqlite::{Connection, OptionalExtension};

pub fn exists(conn: &Connection, table: &str, id: &str) -> AppResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    Ok(conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

pub fn load_quarter(conn: &Connection, id: &str) -> AppResult<Quarter> {
    conn.query_row(
        &format!("SELECT {} FROM quarters WHERE id = ?", QUARTER_COLUMNS),
        [id],
        quarter_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("quarter not found"))
}

pub fn list_quarters(conn: &Connection) -> AppResult<Vec<Quarter>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM quarters ORDER BY start_date, name",
        QUARTER_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], quarter_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn classroom_student_ids(conn: &Connection, classroom_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT cs.student_id
         FROM classroom_students cs
         JOIN students s ON s.id = cs.student_id
         WHERE cs.classroom_id = ?
         ORDER BY s.last_name, s.first_name",
    )?;
    let ids = stmt
        .query_map([classroom_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn load_classroom(conn: &Connection, id: &str) -> AppResult<Classroom> {
    let mut classroom = conn
        .query_row(
            &format!("SELECT {} FROM classrooms WHERE id = ?", CLASSROOM_COLUMNS),
            [id],
            classroom_from_row,
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("classroom not found"))?;
    classroom.student_ids = classroom_student_ids(conn, id)?;
    Ok(classroom)
}

pub fn load_student(conn: &Connection, id: &str) -> AppResult<Student> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
        [id],
        student_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("student not found"))
}

/// Members of a classroom, ordered by last then first name.
pub fn classroom_roster(conn: &Connection, classroom_id: &str) -> AppResult<Vec<Student>> {
    let cols = STUDENT_COLUMNS
        .split(", ")
        .map(|c| format!("s.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {}
         FROM students s
         JOIN classroom_students cs ON cs.student_id = s.id
         WHERE cs.classroom_id = ?
         ORDER BY s.last_name, s.first_name",
        cols
    ))?;
    let rows = stmt
        .query_map([classroom_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn is_member(conn: &Connection, classroom_id: &str, student_id: &str) -> AppResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM classroom_students WHERE classroom_id = ? AND student_id = ?",
            (classroom_id, student_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small seeded databases for unit tests.

    use crate::db;
    use rusqlite::Connection;

    pub fn seeded() -> Connection {
        let conn = Connection::open_in_memory().expect("memory db");
        db::init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO quarters(id, name, start_date, end_date, break_dates, active)
               VALUES('q1', 'Winter 2024', '2024-01-01', '2024-01-31', '[\"2024-01-08\"]', 1);
             INSERT INTO students(id, first_name, last_name) VALUES('s1', 'Ana', 'Alvarez');
             INSERT INTO students(id, first_name, last_name) VALUES('s2', 'Ben', 'Brooks');
             INSERT INTO students(id, first_name, last_name) VALUES('s3', 'Cy', 'Cole');
             INSERT INTO classrooms(id, name, days) VALUES('c1', 'Level 1A', '[\"Monday\",\"Wednesday\"]');
             INSERT INTO classroom_students(classroom_id, student_id) VALUES('c1', 's2');
             INSERT INTO classroom_students(classroom_id, student_id) VALUES('c1', 's1');",
        )
        .expect("seed");
        conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_is_sorted_by_name_and_limited_to_members() {
        let conn = fixtures::seeded();
        let roster = classroom_roster(&conn, "c1").expect("roster");
        let ids: Vec<&str> = roster.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert!(is_member(&conn, "c1", "s1").expect("member"));
        assert!(!is_member(&conn, "c1", "s3").expect("member"));
    }

    #[test]
    fn classroom_loads_with_members() {
        let conn = fixtures::seeded();
        let c = load_classroom(&conn, "c1").expect("classroom");
        assert_eq!(c.days, vec!["Monday", "Wednesday"]);
        assert_eq!(c.student_ids, vec!["s1", "s2"]);
        let missing = load_classroom(&conn, "nope").expect_err("missing");
        assert_eq!(missing.code(), "not_found");
    }
}
