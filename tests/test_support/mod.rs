#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .env_remove("SCHOOLD_CONFIG")
        .env_remove("SCHOOLD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

/// Spawns the sidecar with a fresh workspace already selected.
pub fn spawn_with_workspace(prefix: &str) -> (Sidecar, PathBuf) {
    let workspace = temp_dir(prefix);
    let mut sc = spawn_sidecar();
    sc.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (sc, workspace)
}

impl Sidecar {
    /// Sends one request and returns the full response envelope.
    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// Asserts success and returns `result`.
    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Asserts failure and returns `error.code`.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

pub fn str_at<'a>(v: &'a serde_json::Value, key: &str) -> &'a str {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing string {} in {}", key, v))
}

/// Quarter "Winter 2024" (2024-01-01..2024-01-31, break 2024-01-08, active),
/// two students, and classroom "Level 1A" meeting Monday and Wednesday.
pub struct Seed {
    pub quarter_id: String,
    pub classroom_id: String,
    pub ana: String,
    pub ben: String,
}

pub fn seed(sc: &mut Sidecar) -> Seed {
    let quarter = sc.ok(
        "quarters.create",
        json!({
            "name": "Winter 2024",
            "startDate": "2024-01-01",
            "endDate": "2024-01-31",
            "breakDates": ["2024-01-08"],
            "active": true,
        }),
    );
    let ana = sc.ok(
        "students.create",
        json!({ "firstName": "Ana", "lastName": "Alvarez" }),
    );
    let ben = sc.ok(
        "students.create",
        json!({ "firstName": "Ben", "lastName": "Brooks" }),
    );
    let ana = str_at(&ana, "studentId").to_string();
    let ben = str_at(&ben, "studentId").to_string();
    let classroom = sc.ok(
        "classrooms.create",
        json!({
            "name": "Level 1A",
            "days": ["Monday", "Wednesday"],
            "startTime": "09:00",
            "endTime": "10:30",
            "studentIds": [ana, ben],
        }),
    );
    Seed {
        quarter_id: str_at(&quarter, "quarterId").to_string(),
        classroom_id: str_at(&classroom, "classroomId").to_string(),
        ana,
        ben,
    }
}
