//! Engine configuration.
//!
//! Paths set explicitly take precedence; `apply_env` only fills what is
//! still unset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming the Quality Issue Report to load.
pub const REPORT_ENV: &str = "CODA_QIAP_REPORT";
/// Environment variable naming the action log file.
pub const ACTION_LOG_ENV: &str = "CODA_QIAP_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QiapConfig {
    pub report: Option<PathBuf>,
    pub action_log: Option<PathBuf>,
    /// A disabled configuration never loads a report or attaches rules.
    pub enabled: bool,
}

impl Default for QiapConfig {
    fn default() -> Self {
        Self {
            report: None,
            action_log: None,
            enabled: true,
        }
    }
}

impl QiapConfig {
    pub fn with_report(mut self, report: impl Into<PathBuf>) -> Self {
        self.report = Some(report.into());
        self
    }

    pub fn with_action_log(mut self, action_log: impl Into<PathBuf>) -> Self {
        self.action_log = Some(action_log.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fill unset paths from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var_os(key))
    }

    /// Fill unset paths through `lookup`.
    ///
    /// A variable that is set but empty counts as unset, so `CODA_QIAP_LOG=`
    /// switches the action log off rather than naming a file called "".
    pub fn apply_env_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<std::ffi::OsString>,
    {
        let from_env = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        if self.report.is_none() {
            self.report = from_env(REPORT_ENV);
        }
        if self.action_log.is_none() {
            self.action_log = from_env(ACTION_LOG_ENV);
        }
        self
    }
}
