//! Quality issues and the scopes they affect.
//!
//! Setters are write-once: assigning a field that is already set fails, which
//! is how duplicate elements in a report document are caught. Extents and
//! explicit lists (filenames for products, value paths for values) exclude
//! each other.

use crate::action::{parse_extent, serialize_expression, Action, ActionType, SharedExpression};
use qiap_error::{QiapError, Result};
use serde::Serialize;
use std::sync::Arc;

fn ensure_unique_type(actions: &[Arc<Action>], action: &Action, scope: &str) -> Result<()> {
    if actions
        .iter()
        .any(|existing| existing.action_type() == action.action_type())
    {
        return Err(QiapError::invalid_argument(format!(
            "{scope} already has an action of type '{}'",
            action.action_type()
        )));
    }
    Ok(())
}

fn set_once(slot: &mut Option<String>, value: &str, what: &str) -> Result<()> {
    if slot.is_some() {
        return Err(QiapError::invalid_argument(format!(
            "quality issue already has a {what}"
        )));
    }
    *slot = Some(value.to_string());
    Ok(())
}

// ============================================================================
// Affected value
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AffectedValue {
    id: i64,
    parameter: String,
    #[serde(serialize_with = "serialize_expression")]
    extent: Option<SharedExpression>,
    values: Vec<String>,
    actions: Vec<Arc<Action>>,
}

impl AffectedValue {
    pub fn new(id: i64, parameter: impl Into<String>) -> Self {
        Self {
            id,
            parameter: parameter.into(),
            extent: None,
            values: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Path of the parameter within the product.
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn extent(&self) -> Option<&SharedExpression> {
        self.extent.as_ref()
    }

    pub fn set_extent(&mut self, text: &str) -> Result<()> {
        if self.extent.is_some() || !self.values.is_empty() {
            return Err(QiapError::invalid_argument(
                "affected value already has an extent definition",
            ));
        }
        self.extent = Some(parse_extent(text)?);
        Ok(())
    }

    /// Literal paths of the affected values.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn add_value(&mut self, path: impl Into<String>) -> Result<()> {
        if self.extent.is_some() {
            return Err(QiapError::invalid_argument(
                "affected value already has an extent definition",
            ));
        }
        self.values.push(path.into());
        Ok(())
    }

    pub fn actions(&self) -> &[Arc<Action>] {
        &self.actions
    }

    pub fn add_action(&mut self, action: Action) -> Result<()> {
        ensure_unique_type(&self.actions, &action, "affected value")?;
        self.actions.push(Arc::new(action));
        Ok(())
    }
}

// ============================================================================
// Affected product
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AffectedProduct {
    id: i64,
    product_type: String,
    #[serde(serialize_with = "serialize_expression")]
    extent: Option<SharedExpression>,
    products: Vec<String>,
    values: Vec<AffectedValue>,
    actions: Vec<Arc<Action>>,
}

impl AffectedProduct {
    pub fn new(id: i64, product_type: impl Into<String>) -> Self {
        Self {
            id,
            product_type: product_type.into(),
            extent: None,
            products: Vec::new(),
            values: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn product_type(&self) -> &str {
        &self.product_type
    }

    pub fn extent(&self) -> Option<&SharedExpression> {
        self.extent.as_ref()
    }

    pub fn set_extent(&mut self, text: &str) -> Result<()> {
        if self.extent.is_some() || !self.products.is_empty() {
            return Err(QiapError::invalid_argument(
                "affected product already has an extent definition",
            ));
        }
        self.extent = Some(parse_extent(text)?);
        Ok(())
    }

    /// Base filenames of the affected products.
    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn add_product(&mut self, name: impl Into<String>) -> Result<()> {
        if self.extent.is_some() {
            return Err(QiapError::invalid_argument(
                "affected product already has an extent definition",
            ));
        }
        self.products.push(name.into());
        Ok(())
    }

    pub fn affected_values(&self) -> &[AffectedValue] {
        &self.values
    }

    pub fn add_affected_value(&mut self, value: AffectedValue) {
        self.values.push(value);
    }

    pub fn actions(&self) -> &[Arc<Action>] {
        &self.actions
    }

    pub fn add_action(&mut self, action: Action) -> Result<()> {
        if !action.action_type().is_product_level() {
            return Err(QiapError::invalid_argument(format!(
                "affected product can not have an action of type '{}'",
                action.action_type()
            )));
        }
        ensure_unique_type(&self.actions, &action, "affected product")?;
        self.actions.push(Arc::new(action));
        Ok(())
    }

    pub fn has_action(&self, action_type: ActionType) -> bool {
        self.actions
            .iter()
            .any(|action| action.action_type() == action_type)
    }
}

// ============================================================================
// Quality issue
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct QualityIssue {
    id: i64,
    last_modified: String,
    mission: String,
    title: Option<String>,
    description: Option<String>,
    instrument: Option<String>,
    cause: Option<String>,
    resolution: Option<String>,
    affected_products: Vec<AffectedProduct>,
}

impl QualityIssue {
    pub fn new(id: i64, last_modified: impl Into<String>, mission: impl Into<String>) -> Self {
        Self {
            id,
            last_modified: last_modified.into(),
            mission: mission.into(),
            title: None,
            description: None,
            instrument: None,
            cause: None,
            resolution: None,
            affected_products: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    pub fn mission(&self) -> &str {
        &self.mission
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn instrument(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref()
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        set_once(&mut self.title, title, "title")
    }

    pub fn set_description(&mut self, description: &str) -> Result<()> {
        set_once(&mut self.description, description, "description")
    }

    pub fn set_instrument(&mut self, instrument: &str) -> Result<()> {
        set_once(&mut self.instrument, instrument, "instrument")
    }

    pub fn set_cause(&mut self, cause: &str) -> Result<()> {
        set_once(&mut self.cause, cause, "cause")
    }

    pub fn set_resolution(&mut self, resolution: &str) -> Result<()> {
        set_once(&mut self.resolution, resolution, "resolution")
    }

    pub fn affected_products(&self) -> &[AffectedProduct] {
        &self.affected_products
    }

    pub fn add_affected_product(&mut self, affected_product: AffectedProduct) {
        self.affected_products.push(affected_product);
    }

    /// Title and description are mandatory.
    pub fn check_complete(&self) -> Result<()> {
        if self.title.is_none() {
            return Err(QiapError::invalid_argument(
                "mandatory element Title missing for QualityIssue",
            ));
        }
        if self.description.is_none() {
            return Err(QiapError::invalid_argument(
                "mandatory element Description missing for QualityIssue",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    organisation: String,
    issues: Vec<QualityIssue>,
}

impl Report {
    pub fn new(organisation: impl Into<String>) -> Self {
        Self {
            organisation: organisation.into(),
            issues: Vec::new(),
        }
    }

    pub fn organisation(&self) -> &str {
        &self.organisation
    }

    /// Issues in document order.
    pub fn issues(&self) -> &[QualityIssue] {
        &self.issues
    }

    pub fn add_issue(&mut self, issue: QualityIssue) -> Result<()> {
        issue.check_complete()?;
        self.issues.push(issue);
        Ok(())
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            issues: self.issues.len(),
            ..ReportSummary::default()
        };
        for issue in &self.issues {
            for product in issue.affected_products() {
                summary.affected_products += 1;
                summary.count(product.actions());
                for value in product.affected_values() {
                    summary.affected_values += 1;
                    summary.count(value.actions());
                }
            }
        }
        summary
    }
}

/// Counts over a report, per scope and per action type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub issues: usize,
    pub affected_products: usize,
    pub affected_values: usize,
    pub discard_product: usize,
    pub discard_value: usize,
    pub correct_value: usize,
    pub custom_correction: usize,
}

impl ReportSummary {
    fn count(&mut self, actions: &[Arc<Action>]) {
        for action in actions {
            match action.action_type() {
                ActionType::DiscardProduct => self.discard_product += 1,
                ActionType::DiscardValue => self.discard_value += 1,
                ActionType::CorrectValue => self.correct_value += 1,
                ActionType::CustomCorrection => self.custom_correction += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qiap_error::ErrorKind;

    #[test]
    fn test_value_extent_excludes_literal_values() {
        let mut value = AffectedValue::new(1, "/temperature");
        value.add_value("/temperature[2]").unwrap();
        assert!(value.set_extent("true").is_err());

        let mut value = AffectedValue::new(1, "/temperature");
        value.set_extent("int(/flag) == 1").unwrap();
        assert!(value.add_value("/temperature[2]").is_err());
        assert!(value.set_extent("true").is_err());
    }

    #[test]
    fn test_product_extent_excludes_filenames() {
        let mut product = AffectedProduct::new(1, "MER_RR__2P");
        product.add_product("a.N1").unwrap();
        assert!(product.set_extent("true").is_err());

        let mut product = AffectedProduct::new(1, "MER_RR__2P");
        product.set_extent("true").unwrap();
        assert!(product.add_product("a.N1").is_err());
    }

    #[test]
    fn test_one_action_per_type_per_scope() {
        let mut value = AffectedValue::new(1, "/a");
        value
            .add_action(Action::new("d", ActionType::DiscardValue))
            .unwrap();
        let err = value
            .add_action(Action::new("e", ActionType::DiscardValue))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let mut correct = Action::new("d", ActionType::CorrectValue);
        correct.set_correction("1").unwrap();
        value.add_action(correct).unwrap();
        assert_eq!(value.actions().len(), 2);
    }

    #[test]
    fn test_product_scope_rejects_value_actions() {
        let mut product = AffectedProduct::new(1, "X");
        assert!(product
            .add_action(Action::new("d", ActionType::DiscardValue))
            .is_err());
        assert!(product
            .add_action(Action::new("d", ActionType::CorrectValue))
            .is_err());
        product
            .add_action(Action::new("d", ActionType::DiscardProduct))
            .unwrap();
        assert!(product.has_action(ActionType::DiscardProduct));
    }

    #[test]
    fn test_issue_fields_are_write_once() {
        let mut issue = QualityIssue::new(7, "2008-07-01", "ENVISAT");
        issue.set_title("Bad calibration").unwrap();
        assert!(issue.set_title("again").is_err());
        assert!(issue.check_complete().is_err());
        issue.set_description("Offset in band 3").unwrap();
        assert!(issue.check_complete().is_ok());
        assert!(issue.set_description("again").is_err());
    }

    #[test]
    fn test_report_rejects_incomplete_issue() {
        let mut report = Report::new("ESA");
        assert!(report
            .add_issue(QualityIssue::new(1, "d", "ENVISAT"))
            .is_err());
        assert!(report.issues().is_empty());
    }

    #[test]
    fn test_summary_counts_actions() {
        let mut issue = QualityIssue::new(1, "d", "ENVISAT");
        issue.set_title("t").unwrap();
        issue.set_description("d").unwrap();
        let mut product = AffectedProduct::new(2, "X");
        product
            .add_action(Action::new("d", ActionType::DiscardProduct))
            .unwrap();
        let mut value = AffectedValue::new(3, "/a");
        value
            .add_action(Action::new("d", ActionType::DiscardValue))
            .unwrap();
        product.add_affected_value(value);
        issue.add_affected_product(product);
        let mut report = Report::new("ESA");
        report.add_issue(issue).unwrap();

        let summary = report.summary();
        assert_eq!(summary.issues, 1);
        assert_eq!(summary.affected_products, 1);
        assert_eq!(summary.affected_values, 1);
        assert_eq!(summary.discard_product, 1);
        assert_eq!(summary.discard_value, 1);
        assert_eq!(summary.correct_value, 0);
    }
}
