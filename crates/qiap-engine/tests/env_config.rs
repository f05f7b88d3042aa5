//! Context initialisation from the process environment.
//!
//! Kept in its own test binary: it sets process-wide variables.

use qiap_engine::{QiapConfig, QiapContext, ACTION_LOG_ENV, REPORT_ENV};
use qiap_report::{write_report_file, Report};

#[test]
fn init_reads_unset_paths_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("empty.xml");
    let log_path = dir.path().join("actions.log");
    write_report_file(&Report::new("ESA"), &report_path).unwrap();

    std::env::set_var(REPORT_ENV, &report_path);
    std::env::set_var(ACTION_LOG_ENV, &log_path);

    let context = QiapContext::init(&QiapConfig::default()).unwrap();
    assert_eq!(context.report().map(|r| r.organisation()), Some("ESA"));
    assert!(context.action_log().is_some());

    let disabled = QiapContext::init(&QiapConfig::default().with_enabled(false)).unwrap();
    assert!(disabled.report().is_none());

    std::env::remove_var(REPORT_ENV);
    std::env::remove_var(ACTION_LOG_ENV);
}
