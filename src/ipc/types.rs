use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::attendance::AttendanceSheet;
use crate::auth::Auth;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::guard::RouteGuard;
use crate::session::SessionStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    /// Process-level config. Each opened workspace layers its own file over it.
    pub base_config: Config,
    /// Effective config for the open workspace.
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: SessionStore,
    pub auth: Auth,
    pub guard: RouteGuard,
    pub cache: QueryCache,
    /// Sheet for the class date last opened with `attendance.open`.
    pub attendance_sheet: Option<AttendanceSheet>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let mut auth = Auth::default();
        let guard = RouteGuard::new(auth.subscribe());
        Self {
            base_config: config.clone(),
            config,
            workspace: None,
            db: None,
            session: SessionStore::default(),
            auth,
            guard,
            cache: QueryCache::default(),
            attendance_sheet: None,
        }
    }
}
