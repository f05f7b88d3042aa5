//! Append-only log of performed actions.
//!
//! One line per action:
//! `<filename>: issue=<id>, product=<id>, value=<id>, type="<type>", last-modified=<date>`.
//! Writes are best-effort; a failure is reported through `tracing` and never
//! affects the read that performed the action.

use crate::rule::RuleItem;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ActionLog {
    path: PathBuf,
}

impl ActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, filename: &str, item: &RuleItem) {
        let line = format_entry(filename, item);
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = written {
            warn!(
                path = %self.path.display(),
                error = %err,
                "could not write QIAP action log entry"
            );
        }
    }
}

fn format_entry(filename: &str, item: &RuleItem) -> String {
    format!(
        "{filename}: issue={}, product={}, value={}, type=\"{}\", last-modified={}\n",
        item.issue_id,
        item.affected_product_id,
        item.affected_value_id,
        item.action_type().name(),
        item.action.last_modified()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use qiap_report::{Action, ActionType};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn item() -> RuleItem {
        RuleItem {
            issue_id: 7,
            affected_product_id: 2,
            affected_value_id: 3,
            extent: None,
            action: Arc::new(Action::new("2008-07-14", ActionType::DiscardValue)),
        }
    }

    #[test]
    fn test_entries_are_appended() {
        let dir = tempdir().unwrap();
        let log = ActionLog::new(dir.path().join("actions.log"));
        log.record("/data/a.N1", &item());
        log.record("/data/b.N1", &item());
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            text,
            "/data/a.N1: issue=7, product=2, value=3, type=\"discard value\", last-modified=2008-07-14\n\
             /data/b.N1: issue=7, product=2, value=3, type=\"discard value\", last-modified=2008-07-14\n"
        );
    }

    #[test]
    fn test_unwritable_log_is_ignored() {
        let dir = tempdir().unwrap();
        let log = ActionLog::new(dir.path().join("missing").join("actions.log"));
        log.record("a.N1", &item());
        assert!(!log.path().exists());
    }
}
