//! Runtime configuration.
//!
//! Resolution order: `SCHOOLD_CONFIG` file, then `<workspace>/schoold.toml`
//! once a workspace is opened, then environment overrides.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const WORKSPACE_CONFIG_FILE: &str = "schoold.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub auth: AuthConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_len: 6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub low_score_threshold: f64,
    pub export_dir: Option<PathBuf>,
    pub name_column_width: f32,
    pub comment_column_width: f32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            low_score_threshold: 70.0,
            export_dir: None,
            name_column_width: 130.0,
            comment_column_width: 170.0,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os("SCHOOLD_CONFIG") {
            Some(p) => Self::from_file(Path::new(&p))?,
            None => Self::default(),
        };
        if let Some(ws) = std::env::var_os("SCHOOLD_WORKSPACE") {
            cfg.workspace = Some(PathBuf::from(ws));
        }
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        Self::parse(&text)
            .with_context(|| format!("failed to parse config {}", path.to_string_lossy()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Layers `<workspace>/schoold.toml` over the current values. Sections
    /// present in the file replace the current ones wholesale.
    pub fn merge_workspace_file(&mut self, workspace: &Path) -> anyhow::Result<bool> {
        let path = workspace.join(WORKSPACE_CONFIG_FILE);
        if !path.is_file() {
            return Ok(false);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        let table: toml::Table = text
            .parse()
            .with_context(|| format!("failed to parse config {}", path.to_string_lossy()))?;
        let parsed = Self::parse(&text)?;
        if table.contains_key("auth") {
            self.auth = parsed.auth;
        }
        if table.contains_key("report") {
            self.report = parsed.report;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.auth.min_password_len, 6);
        assert_eq!(cfg.report.low_score_threshold, 70.0);
        assert!(cfg.report.export_dir.is_none());
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let cfg = Config::parse("[report]\nlow_score_threshold = 60.0\n").expect("parse");
        assert_eq!(cfg.report.low_score_threshold, 60.0);
        assert_eq!(cfg.report.name_column_width, 130.0);
        assert_eq!(cfg.auth.min_password_len, 6);
    }

    #[test]
    fn workspace_file_overrides_present_sections_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(WORKSPACE_CONFIG_FILE),
            "[auth]\nmin_password_len = 10\n",
        )
        .expect("write config");

        let mut cfg = Config::default();
        cfg.report.low_score_threshold = 55.0;
        assert!(cfg.merge_workspace_file(dir.path()).expect("merge"));
        assert_eq!(cfg.auth.min_password_len, 10);
        assert_eq!(cfg.report.low_score_threshold, 55.0);
    }

    #[test]
    fn missing_workspace_file_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::default();
        assert!(!cfg.merge_workspace_file(dir.path()).expect("merge"));
    }
}
