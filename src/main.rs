mod attendance;
mod auth;
mod cache;
mod config;
mod db;
mod error;
mod grading;
mod guard;
mod ipc;
mod model;
mod report;
mod schedule;
mod session;
mod store;

use std::io::{self, BufRead, Write};

use env_logger::{Builder, Env, Target};

fn main() {
    // stdout carries responses; logs go to stderr.
    Builder::from_env(Env::default().filter_or("SCHOOLD_LOG", "info"))
        .target(Target::Stderr)
        .init();

    let config = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            log::error!("failed to load config, using defaults: {:#}", e);
            config::Config::default()
        }
    };
    let startup_workspace = config.workspace.clone();
    let mut state = ipc::AppState::new(config);
    if let Some(path) = startup_workspace {
        if let Err(e) = ipc::open_workspace(&mut state, &path) {
            log::error!(
                "failed to open configured workspace {}: {:#}",
                path.to_string_lossy(),
                e
            );
        }
    }
    log::info!("schoold {} ready", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin closed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("unparseable request: {}", e);
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
