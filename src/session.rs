//! Locally persisted active-quarter value.
//!
//! Read once when a workspace opens and written on every change. Consumers
//! receive it as an explicit [`QuarterScope`] instead of reading it ambiently.

use crate::db;
use crate::error::{AppError, AppResult};
use crate::model::{quarter_from_row, Quarter, QUARTER_COLUMNS};
use rusqlite::{Connection, OptionalExtension};

pub const ACTIVE_QUARTER_KEY: &str = "session.activeQuarter";

#[derive(Debug, Default)]
pub struct SessionStore {
    active: Option<Quarter>,
}

/// The quarter a request operates on, resolved once per request.
#[derive(Debug, Clone, PartialEq)]
pub enum QuarterScope {
    Selected(Quarter),
    /// No quarter was named and none is active.
    Unset,
}

impl QuarterScope {
    pub fn quarter(&self) -> Option<&Quarter> {
        match self {
            QuarterScope::Selected(q) => Some(q),
            QuarterScope::Unset => None,
        }
    }
}

impl SessionStore {
    pub fn active(&self) -> Option<&Quarter> {
        self.active.as_ref()
    }

    /// Loads the cached value, falling back to the quarter flagged active.
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        if let Some(v) = db::settings_get_json(conn, ACTIVE_QUARTER_KEY)? {
            if v.is_null() {
                return Ok(Self { active: None });
            }
            match serde_json::from_value::<Quarter>(v) {
                Ok(q) => return Ok(Self { active: Some(q) }),
                Err(e) => log::warn!("discarding unreadable cached active quarter: {}", e),
            }
        }
        let mut store = Self::default();
        store.refresh(conn)?;
        Ok(store)
    }

    /// Re-reads the active quarter from the quarters table and persists it.
    pub fn refresh(&mut self, conn: &Connection) -> anyhow::Result<()> {
        let active = conn
            .query_row(
                &format!("SELECT {} FROM quarters WHERE active = 1 LIMIT 1", QUARTER_COLUMNS),
                [],
                quarter_from_row,
            )
            .optional()?;
        self.set(conn, active)
    }

    pub fn set(&mut self, conn: &Connection, active: Option<Quarter>) -> anyhow::Result<()> {
        let value = serde_json::to_value(&active)?;
        db::settings_set_json(conn, ACTIVE_QUARTER_KEY, &value)?;
        self.active = active;
        Ok(())
    }

    /// Resolves the quarter for a request: an explicit id wins, otherwise
    /// the active quarter.
    pub fn scope(&self, conn: &Connection, quarter_id: Option<&str>) -> AppResult<QuarterScope> {
        match quarter_id {
            Some(id) => {
                let q = conn
                    .query_row(
                        &format!("SELECT {} FROM quarters WHERE id = ?", QUARTER_COLUMNS),
                        [id],
                        quarter_from_row,
                    )
                    .optional()?
                    .ok_or_else(|| AppError::not_found("quarter not found"))?;
                Ok(QuarterScope::Selected(q))
            }
            None => Ok(match &self.active {
                Some(q) => QuarterScope::Selected(q.clone()),
                None => QuarterScope::Unset,
            }),
        }
    }
}
