//! Shared quality-issue context.
//!
//! One context is created by the application and handed to every product
//! open. Cloning a [`QiapContext`] takes another handle on the same loaded
//! report; the report is released when the last handle is dropped.

use crate::action_log::ActionLog;
use crate::config::QiapConfig;
use crate::evaluator::RuleSet;
use crate::initializer::init_actions;
use qiap_error::Result;
use qiap_model::Product;
use qiap_report::{read_report, Report};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::info;

#[derive(Debug)]
struct ContextInner {
    report: Option<Arc<Report>>,
    action_log: Option<ActionLog>,
    enabled: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct QiapContext {
    inner: Arc<ContextInner>,
}

/// A non-owning handle that does not keep the report loaded.
#[derive(Debug, Clone)]
pub struct WeakQiapContext {
    inner: Weak<ContextInner>,
}

impl WeakQiapContext {
    pub fn upgrade(&self) -> Option<QiapContext> {
        self.inner.upgrade().map(|inner| QiapContext { inner })
    }
}

impl QiapContext {
    /// Build a context from `config`.
    ///
    /// Paths left unset in `config` are taken from `CODA_QIAP_REPORT` and
    /// `CODA_QIAP_LOG`. The report is only read when the configuration is
    /// enabled and names one.
    pub fn init(config: &QiapConfig) -> Result<Self> {
        Self::init_with_env(config, |key| std::env::var_os(key))
    }

    /// [`QiapContext::init`] with environment lookups going through `lookup`.
    pub fn init_with_env<F>(config: &QiapConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let config = config.clone().apply_env_with(lookup);
        let report = match (&config.report, config.enabled) {
            (Some(path), true) => Some(Arc::new(read_report(path)?)),
            _ => None,
        };
        Ok(Self::build(report, config.action_log, config.enabled))
    }

    pub fn from_report(report: Report) -> Self {
        Self::build(Some(Arc::new(report)), None, true)
    }

    /// A context that never attaches rules.
    pub fn empty() -> Self {
        Self::build(None, None, true)
    }

    fn build(report: Option<Arc<Report>>, action_log: Option<PathBuf>, enabled: bool) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                report,
                action_log: action_log.map(ActionLog::new),
                enabled: Arc::new(AtomicBool::new(enabled)),
            }),
        }
    }

    /// Same report and enable flag, with performed actions appended to `path`.
    pub fn with_action_log(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                report: self.inner.report.clone(),
                action_log: Some(ActionLog::new(path)),
                enabled: Arc::clone(&self.inner.enabled),
            }),
        }
    }

    pub fn report(&self) -> Option<&Report> {
        self.inner.report.as_deref()
    }

    pub fn action_log(&self) -> Option<&ActionLog> {
        self.inner.action_log.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Switch interception on or off for every product attached through this
    /// context, including products already open.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Number of live handles on this context.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn downgrade(&self) -> WeakQiapContext {
        WeakQiapContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Install the rule set for `product` as its read hook.
    ///
    /// Any previously attached rule set is removed first. Returns whether a
    /// rule set was attached; products no issue applies to are left without
    /// a hook. A discard-product verdict or a path that does not fit the
    /// product is returned as an error, with the product left unhooked.
    pub fn attach(&self, product: &mut Product) -> Result<bool> {
        product.clear_read_hook();
        if !self.is_enabled() {
            return Ok(false);
        }
        let Some(report) = self.report() else {
            return Ok(false);
        };

        let rules = init_actions(product, report)?;
        if rules.is_empty() {
            return Ok(false);
        }
        let rules: RuleSet = rules
            .with_action_log(self.inner.action_log.clone())
            .with_enabled_flag(Arc::clone(&self.inner.enabled));
        product.set_read_hook(Box::new(rules));
        info!(product = product.filename(), "attached quality issue rule set");
        Ok(true)
    }

    /// Remove the rule set from `product`. Returns whether one was attached.
    pub fn detach(&self, product: &mut Product) -> bool {
        product.clear_read_hook().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REPORT_ENV;
    use qiap_error::ErrorKind;
    use qiap_model::{DataType, NativeType, Node};
    use qiap_report::{Action, ActionType, AffectedProduct, AffectedValue, QualityIssue};

    fn product() -> Product {
        let ty = DataType::record(vec![("level", DataType::integer(NativeType::Int32))]);
        Product::new("/data/ASA_IMP_1P.N1", ty, Node::record(vec![Node::int(40)]))
            .with_class("ENVISAT")
            .with_product_type("ASA_IMP_1P")
    }

    fn report() -> Report {
        let mut value = AffectedValue::new(3, "/level");
        let mut action = Action::new("2008-07-01", ActionType::CorrectValue);
        action.set_correction("42").unwrap();
        value.add_action(action).unwrap();
        let mut affected = AffectedProduct::new(2, "ASA_IMP_1P");
        affected.add_affected_value(value);
        let mut issue = QualityIssue::new(1, "2008-07-01", "ENVISAT");
        issue.set_title("level offset").unwrap();
        issue.set_description("").unwrap();
        issue.add_affected_product(affected);
        let mut report = Report::new("ESA");
        report.add_issue(issue).unwrap();
        report
    }

    fn read_level(product: &Product) -> i32 {
        let mut cursor = product.cursor();
        cursor.goto("/level").unwrap();
        cursor.read_int32().unwrap()
    }

    #[test]
    fn test_attach_and_detach() {
        let context = QiapContext::from_report(report());
        let mut product = product();
        assert!(context.attach(&mut product).unwrap());
        assert_eq!(read_level(&product), 42);
        assert!(context.detach(&mut product));
        assert_eq!(read_level(&product), 40);
        assert!(!context.detach(&mut product));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let context = QiapContext::from_report(report());
        let mut product = product();
        assert!(context.attach(&mut product).unwrap());
        assert!(context.attach(&mut product).unwrap());
        assert_eq!(read_level(&product), 42);
    }

    #[test]
    fn test_runtime_switch_reaches_open_products() {
        let context = QiapContext::from_report(report());
        let mut product = product();
        context.attach(&mut product).unwrap();
        context.set_enabled(false);
        assert_eq!(read_level(&product), 40);
        context.set_enabled(true);
        assert_eq!(read_level(&product), 42);
    }

    #[test]
    fn test_disabled_context_attaches_nothing() {
        let context = QiapContext::from_report(report());
        context.set_enabled(false);
        let mut product = product();
        assert!(!context.attach(&mut product).unwrap());
        assert!(product.hook().is_none());
    }

    #[test]
    fn test_empty_context() {
        let mut product = product();
        assert!(!QiapContext::empty().attach(&mut product).unwrap());
    }

    #[test]
    fn test_disabled_config_skips_loading() {
        let config = QiapConfig::default()
            .with_report("/nonexistent/report.xml")
            .with_enabled(false);
        let context = QiapContext::init(&config).unwrap();
        assert!(context.report().is_none());
        assert!(!context.is_enabled());
    }

    #[test]
    fn test_missing_report_file() {
        let config = QiapConfig::default().with_report("/nonexistent/report.xml");
        let err = QiapContext::init(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_env_names_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xml");
        qiap_report::write_report_file(&report(), &path).unwrap();
        let env_path = OsString::from(&path);
        let lookup = |key: &str| (key == REPORT_ENV).then(|| env_path.clone());

        let context = QiapContext::init_with_env(&QiapConfig::default(), lookup).unwrap();
        assert_eq!(context.report().map(|r| r.issues().len()), Some(1));
        assert!(context.action_log().is_none());

        let explicit = QiapConfig::default().with_report("/nonexistent/report.xml");
        let err = QiapContext::init_with_env(&explicit, lookup).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_handles_share_the_report() {
        let context = QiapContext::from_report(report());
        let weak = context.downgrade();
        let second = context.clone();
        assert_eq!(context.handle_count(), 2);
        drop(context);
        assert!(weak.upgrade().is_some());
        assert_eq!(second.report().map(|r| r.issues().len()), Some(1));
        drop(second);
        assert!(weak.upgrade().is_none());
    }
}
