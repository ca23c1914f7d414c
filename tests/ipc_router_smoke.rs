mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{seed, spawn_sidecar, spawn_with_workspace, str_at};

#[test]
fn requests_before_workspace_report_no_workspace() {
    let mut sc = spawn_sidecar();
    let health = sc.ok("health", json!({}));
    assert!(health["workspacePath"].is_null());
    assert_eq!(health["guard"], "loading");
    assert_eq!(sc.err_code("quarters.list", json!({})), "no_workspace");
    assert_eq!(sc.err_code("no.such.method", json!({})), "not_implemented");
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let mut sc = spawn_sidecar();
    writeln!(sc.stdin, "{{not json").expect("write");
    sc.stdin.flush().expect("flush");
    let mut line = String::new();
    sc.reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"]["code"], "bad_json");
    sc.ok("health", json!({}));
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut sc, workspace) = spawn_with_workspace("schoold-router-smoke");
    let s = seed(&mut sc);

    let methods: Vec<(&str, serde_json::Value)> = vec![
        ("health", json!({})),
        ("auth.session", json!({})),
        ("route.resolve", json!({ "path": "/sign-in" })),
        ("users.list", json!({})),
        ("quarters.list", json!({})),
        ("quarters.active", json!({})),
        ("levels.list", json!({})),
        ("classrooms.list", json!({})),
        ("classrooms.get", json!({ "classroomId": s.classroom_id })),
        ("classrooms.classDates", json!({ "classroomId": s.classroom_id })),
        ("students.list", json!({})),
        ("teachers.list", json!({})),
        (
            "attendance.open",
            json!({ "classroomId": s.classroom_id, "date": "2024-01-03" }),
        ),
        ("attendance.list", json!({ "classroomId": s.classroom_id })),
        ("grading.list", json!({ "classroomId": s.classroom_id })),
        (
            "reports.attendance",
            json!({ "classroomId": s.classroom_id, "month": "2024-01" }),
        ),
        ("reports.grades", json!({ "classroomId": s.classroom_id })),
    ];
    for (method, params) in methods {
        let resp = sc.request(method, params);
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
    }

    let level = sc.ok("levels.create", json!({ "name": "Beginner" }));
    let level_id = str_at(&level, "levelId").to_string();
    assert_eq!(sc.err_code("levels.create", json!({ "name": "Beginner" })), "conflict");
    sc.ok(
        "classrooms.update",
        json!({ "classroomId": s.classroom_id, "levelId": level_id }),
    );
    sc.ok("levels.delete", json!({ "levelId": level_id }));
    let classroom = sc.ok("classrooms.get", json!({ "classroomId": s.classroom_id }));
    assert!(classroom["classroom"]["levelId"].is_null());

    let health = sc.ok("health", json!({}));
    assert_eq!(health["workspacePath"], workspace.to_string_lossy().to_string());
    assert_eq!(health["activeQuarterId"], s.quarter_id.as_str());
    assert!(workspace.join("school.sqlite3").is_file());
}

#[test]
fn classroom_delete_removes_dependent_rows() {
    let (mut sc, _ws) = spawn_with_workspace("schoold-classroom-delete");
    let s = seed(&mut sc);
    sc.ok(
        "attendance.open",
        json!({ "classroomId": s.classroom_id, "date": "2024-01-03" }),
    );
    sc.ok("attendance.save", json!({ "statuses": { (s.ana.clone()): "present" } }));
    sc.ok(
        "grading.save",
        json!({ "studentId": s.ben, "classroomId": s.classroom_id, "scores": { "reading": 80 } }),
    );

    sc.ok("classrooms.delete", json!({ "classroomId": s.classroom_id }));
    assert_eq!(
        sc.err_code("classrooms.get", json!({ "classroomId": s.classroom_id })),
        "not_found"
    );
    // The open sheet belonged to the deleted classroom.
    let mark = sc.ok("attendance.mark", json!({ "studentId": s.ana, "status": "absent" }));
    assert_eq!(mark["notice"]["code"], "no_selection");
    let students = sc.ok("students.list", json!({}));
    assert_eq!(students["students"].as_array().map(|a| a.len()), Some(2));
}
