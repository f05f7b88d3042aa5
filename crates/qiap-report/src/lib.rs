//! Quality Issue Reports.
//!
//! A report lists quality issues; each issue names the products it affects
//! (by product type plus an extent or explicit filenames), the values inside
//! those products, and the actions to apply to them.
//!
//! - [`action`]: action types, actions and custom-correction algorithms
//! - [`issue`]: affected values, affected products, issues and the report
//! - [`xml_read`]: the validating document reader
//! - [`xml_write`]: the document writer

pub mod action;
pub mod issue;
pub mod xml_read;
pub mod xml_write;

/// XML namespace of Quality Issue Report documents.
pub const NAMESPACE: &str = "http://geca.esa.int/qiap/issue/2008/07";

pub use action::{Action, ActionType, Algorithm, SharedExpression};
pub use issue::{AffectedProduct, AffectedValue, QualityIssue, Report, ReportSummary};
pub use xml_read::{parse_report, read_report};
pub use xml_write::{report_to_string, write_report, write_report_file};
