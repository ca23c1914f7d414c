mod test_support;

use serde_json::json;
use test_support::{spawn_with_workspace, str_at, Sidecar};

fn sign_up(sc: &mut Sidecar, email: &str) -> String {
    let out = sc.ok(
        "auth.signUp",
        json!({ "email": email, "password": "password123", "fullName": email }),
    );
    str_at(&out["user"], "userId").to_string()
}

/// Admin plus three pending accounts, with the admin signed back in.
fn accounts(sc: &mut Sidecar) -> (String, String, String) {
    sign_up(sc, "admin@school.test");
    let a = sign_up(sc, "ana@school.test");
    let b = sign_up(sc, "bo@school.test");
    let c = sign_up(sc, "cam@school.test");
    sc.ok(
        "auth.signIn",
        json!({ "email": "admin@school.test", "password": "password123" }),
    );
    (a, b, c)
}

#[test]
fn student_profiles_need_an_activated_student_account() {
    let (mut sc, _ws) = spawn_with_workspace("schoold-profiles-student");
    let (ana, bo, _) = accounts(&mut sc);

    assert_eq!(
        sc.err_code(
            "students.create",
            json!({ "firstName": "Ana", "lastName": "Alvarez", "userId": ana }),
        ),
        "forbidden"
    );
    assert_eq!(
        sc.err_code(
            "students.create",
            json!({ "firstName": "Ana", "lastName": "Alvarez", "userId": "ghost" }),
        ),
        "not_found"
    );

    sc.ok("users.setRole", json!({ "userId": ana, "role": "student" }));
    let created = sc.ok(
        "students.create",
        json!({ "firstName": "Ana", "lastName": "Alvarez", "userId": ana }),
    );
    let student_id = str_at(&created, "studentId").to_string();
    assert_eq!(created["student"]["userId"], ana.as_str());

    assert_eq!(
        sc.err_code(
            "students.create",
            json!({ "firstName": "Ana", "lastName": "Again", "userId": ana }),
        ),
        "conflict"
    );

    let user = sc.ok("users.get", json!({ "userId": ana }));
    assert_eq!(user["user"]["studentId"], student_id.as_str());
    assert!(user["user"]["teacherId"].is_null());

    let students = sc.ok("users.list", json!({ "role": "student" }));
    assert_eq!(students["users"][0]["studentId"], student_id.as_str());

    // A teacher-role account cannot hold a student profile.
    sc.ok("users.setRole", json!({ "userId": bo, "role": "teacher" }));
    assert_eq!(
        sc.err_code(
            "students.create",
            json!({ "firstName": "Bo", "lastName": "Bell", "userId": bo }),
        ),
        "forbidden"
    );

    // Deleting the account leaves the profile unlinked.
    sc.ok("users.delete", json!({ "userId": ana }));
    let student = sc.ok("students.get", json!({ "studentId": student_id }));
    assert!(student["student"]["userId"].is_null());
}

#[test]
fn teacher_profiles_accept_teachers_and_coordinators() {
    let (mut sc, _ws) = spawn_with_workspace("schoold-profiles-teacher");
    let (ana, bo, cam) = accounts(&mut sc);

    sc.ok("users.setRole", json!({ "userId": ana, "role": "student" }));
    sc.ok("users.setRole", json!({ "userId": bo, "role": "teacher" }));
    sc.ok("users.setRole", json!({ "userId": cam, "role": "coordinator" }));

    assert_eq!(
        sc.err_code(
            "teachers.create",
            json!({ "firstName": "Ana", "lastName": "Alvarez", "userId": ana }),
        ),
        "forbidden"
    );
    let bo_teacher = sc.ok(
        "teachers.create",
        json!({ "firstName": "Bo", "lastName": "Bell", "userId": bo }),
    );
    let cam_teacher = sc.ok(
        "teachers.create",
        json!({ "firstName": "Cam", "lastName": "Cruz", "userId": cam }),
    );
    assert_eq!(cam_teacher["teacher"]["userId"], cam.as_str());
    assert_eq!(
        sc.err_code(
            "teachers.create",
            json!({ "firstName": "Bo", "lastName": "Twice", "userId": bo }),
        ),
        "conflict"
    );

    let bo_id = str_at(&bo_teacher, "teacherId").to_string();
    let classroom = sc.ok(
        "classrooms.create",
        json!({ "name": "Level 4D", "days": ["Thursday"], "teacherId": bo_id }),
    );
    let classroom_id = str_at(&classroom, "classroomId").to_string();
    let mine = sc.ok("classrooms.list", json!({ "teacherId": bo_id }));
    assert_eq!(mine["classrooms"].as_array().map(|c| c.len()), Some(1));

    let removed = sc.ok("teachers.delete", json!({ "teacherId": bo_id }));
    assert_eq!(removed["classroomsUnassigned"], 1);
    let after = sc.ok("classrooms.get", json!({ "classroomId": classroom_id }));
    assert!(after["classroom"]["teacherId"].is_null());
    let user = sc.ok("users.get", json!({ "userId": bo }));
    assert!(user["user"]["teacherId"].is_null());
}

#[test]
fn role_changes_must_fit_the_linked_profile() {
    let (mut sc, _ws) = spawn_with_workspace("schoold-profiles-relink");
    let (ana, _, cam) = accounts(&mut sc);

    sc.ok("users.setRole", json!({ "userId": ana, "role": "student" }));
    let created = sc.ok(
        "students.create",
        json!({ "firstName": "Ana", "lastName": "Alvarez", "userId": ana }),
    );
    let student_id = str_at(&created, "studentId").to_string();

    assert_eq!(
        sc.err_code("users.setRole", json!({ "userId": ana, "role": "teacher" })),
        "conflict"
    );
    let user = sc.ok("users.get", json!({ "userId": ana }));
    assert_eq!(user["user"]["role"], "student");
    assert_eq!(user["user"]["studentId"], student_id.as_str());

    sc.ok("students.update", json!({ "studentId": student_id, "userId": null }));
    let promoted = sc.ok("users.setRole", json!({ "userId": ana, "role": "teacher" }));
    assert_eq!(promoted["user"]["role"], "teacher");
    assert!(promoted["user"]["studentId"].is_null());

    // Moving between teaching roles keeps a teacher profile valid.
    sc.ok("users.setRole", json!({ "userId": cam, "role": "coordinator" }));
    sc.ok(
        "teachers.create",
        json!({ "firstName": "Cam", "lastName": "Cruz", "userId": cam }),
    );
    let moved = sc.ok("users.setRole", json!({ "userId": cam, "role": "teacher" }));
    assert_eq!(moved["user"]["role"], "teacher");
    assert_eq!(
        sc.err_code("users.setRole", json!({ "userId": cam, "role": "student" })),
        "conflict"
    );
    assert_eq!(
        sc.err_code("users.setRole", json!({ "userId": cam, "role": "pending" })),
        "conflict"
    );
}
