//! Error type shared by the domain modules and the IPC handlers.

use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("select a workspace first")]
    NoWorkspace,

    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Report(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        AppError::BadParams(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    /// Stable wire code for the `error.code` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NoWorkspace => "no_workspace",
            AppError::BadParams(_) => "bad_params",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Report(_) => "report_failed",
            AppError::Db(_) => "db_query_failed",
            AppError::Other(_) => "internal",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Db(rusqlite::Error::SqliteFailure(e, _)) => {
                Some(json!({ "sqliteCode": e.extended_code }))
            }
            AppError::Other(e) => {
                let chain: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
                if chain.is_empty() {
                    None
                } else {
                    Some(json!({ "causes": chain }))
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::bad_params("x").code(), "bad_params");
        assert_eq!(AppError::not_found("x").code(), "not_found");
        assert_eq!(AppError::Report("x".into()).code(), "report_failed");
        assert_eq!(AppError::NoWorkspace.code(), "no_workspace");
        let db: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(db.code(), "db_query_failed");
    }

    #[test]
    fn anyhow_context_is_reported_as_causes() {
        let e: AppError = anyhow::anyhow!("disk full")
            .context("failed to write export")
            .into();
        assert_eq!(e.to_string(), "failed to write export");
        let details = e.details().expect("details");
        assert_eq!(details["causes"][0], "disk full");
    }
}
