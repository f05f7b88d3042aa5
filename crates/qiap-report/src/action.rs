//! Actions and custom-correction algorithms.

use qiap_error::{QiapError, Result};
use qiap_model::{parse_expression, Expression, ExpressionType};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub type SharedExpression = Arc<dyn Expression>;

pub(crate) fn serialize_expression<S: Serializer>(
    expression: &Option<SharedExpression>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match expression {
        Some(expression) => serializer.serialize_some(expression.text()),
        None => serializer.serialize_none(),
    }
}

/// Parse an extent and check it is a boolean predicate.
pub(crate) fn parse_extent(text: &str) -> Result<SharedExpression> {
    let extent = parse_expression(text).map_err(|err| {
        QiapError::invalid_argument(format!("invalid extent expression ({err})"))
    })?;
    if extent.result_type() != ExpressionType::Boolean {
        return Err(QiapError::invalid_argument(
            "extent expression is not a boolean expression",
        ));
    }
    Ok(extent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionType {
    DiscardProduct,
    DiscardValue,
    CorrectValue,
    CustomCorrection,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        Self::DiscardProduct,
        Self::DiscardValue,
        Self::CorrectValue,
        Self::CustomCorrection,
    ];

    /// Name used in the `type` attribute and in the action log.
    pub fn name(self) -> &'static str {
        match self {
            Self::DiscardProduct => "discard product",
            Self::DiscardValue => "discard value",
            Self::CorrectValue => "correct value",
            Self::CustomCorrection => "custom correction",
        }
    }

    pub fn is_discard(self) -> bool {
        matches!(self, Self::DiscardProduct | Self::DiscardValue)
    }

    /// Whether the action type is allowed on an affected product.
    pub fn is_product_level(self) -> bool {
        matches!(self, Self::DiscardProduct | Self::CustomCorrection)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionType {
    type Err = QiapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|action_type| action_type.name() == s)
            .ok_or_else(|| QiapError::invalid_argument(format!("unknown action type '{s}'")))
    }
}

// ============================================================================
// Algorithm
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Algorithm {
    name: String,
    reference: Option<String>,
    parameters: Vec<(String, String)>,
}

impl Algorithm {
    pub fn new(name: impl Into<String>, reference: Option<&str>) -> Self {
        Self {
            name: name.into(),
            reference: reference.map(str::to_string),
            parameters: Vec::new(),
        }
    }

    /// Parameters keep insertion order.
    pub fn add_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.push((key.into(), value.into()));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// ============================================================================
// Action
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Action {
    last_modified: String,
    action_type: ActionType,
    order: Option<i64>,
    #[serde(serialize_with = "serialize_expression")]
    correction: Option<SharedExpression>,
    algorithm: Option<Algorithm>,
}

impl Action {
    pub fn new(last_modified: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            last_modified: last_modified.into(),
            action_type,
            order: None,
            correction: None,
            algorithm: None,
        }
    }

    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    /// Precedence among correct-value actions; unset means 0.
    pub fn order(&self) -> i64 {
        self.order.unwrap_or(0)
    }

    pub fn explicit_order(&self) -> Option<i64> {
        self.order
    }

    pub fn set_order(&mut self, order: i64) -> Result<()> {
        if self.action_type.is_discard() {
            return Err(QiapError::invalid_argument(format!(
                "order can not be set for a '{}' action",
                self.action_type
            )));
        }
        if self.order.is_some() {
            return Err(QiapError::invalid_argument("action already has an order"));
        }
        self.order = Some(order);
        Ok(())
    }

    pub fn correction(&self) -> Option<&SharedExpression> {
        self.correction.as_ref()
    }

    /// Parse and attach the correction expression of a correct-value action.
    pub fn set_correction(&mut self, text: &str) -> Result<()> {
        if self.action_type != ActionType::CorrectValue {
            return Err(QiapError::invalid_argument(format!(
                "can not assign a 'correction expression' to a '{}' action",
                self.action_type
            )));
        }
        if self.correction.is_some() {
            return Err(QiapError::invalid_argument(
                "action already has a correction definition",
            ));
        }
        let correction = parse_expression(text).map_err(|err| {
            QiapError::invalid_argument(format!("invalid correction expression ({err})"))
        })?;
        if correction.result_type() == ExpressionType::Boolean {
            return Err(QiapError::invalid_argument(
                "correction expression must produce an integer, float or string",
            ));
        }
        self.correction = Some(correction);
        Ok(())
    }

    pub fn algorithm(&self) -> Option<&Algorithm> {
        self.algorithm.as_ref()
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) -> Result<()> {
        if self.action_type != ActionType::CustomCorrection {
            return Err(QiapError::invalid_argument(format!(
                "can not assign an algorithm to a '{}' action",
                self.action_type
            )));
        }
        if self.algorithm.is_some() {
            return Err(QiapError::invalid_argument(
                "action already has an algorithm specification",
            ));
        }
        self.algorithm = Some(algorithm);
        Ok(())
    }

    /// Check that the body required by the action type is present.
    pub fn check_complete(&self) -> Result<()> {
        match self.action_type {
            ActionType::CorrectValue if self.correction.is_none() => Err(
                QiapError::invalid_argument("'correct value' action without correction expression"),
            ),
            ActionType::CustomCorrection if self.algorithm.is_none() => Err(
                QiapError::invalid_argument("'custom correction' action without algorithm"),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qiap_error::ErrorKind;

    #[test]
    fn test_action_type_names_round_trip() {
        for action_type in ActionType::ALL {
            assert_eq!(action_type.name().parse::<ActionType>().unwrap(), action_type);
        }
        let err = "discard everything".parse::<ActionType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_order_rules() {
        let mut discard = Action::new("2008-07-01", ActionType::DiscardValue);
        assert!(discard.set_order(3).is_err());

        let mut correct = Action::new("2008-07-01", ActionType::CorrectValue);
        assert_eq!(correct.order(), 0);
        correct.set_order(-4).unwrap();
        assert_eq!(correct.order(), -4);
        assert!(correct.set_order(5).is_err());
    }

    #[test]
    fn test_correction_only_on_correct_value() {
        let mut discard = Action::new("d", ActionType::DiscardValue);
        assert!(discard.set_correction("1").is_err());

        let mut correct = Action::new("d", ActionType::CorrectValue);
        assert!(correct.check_complete().is_err());
        correct.set_correction("273.15").unwrap();
        assert_eq!(
            correct.correction().map(|c| c.result_type()),
            Some(ExpressionType::Float)
        );
        assert!(correct.set_correction("1").is_err());
        assert!(correct.check_complete().is_ok());
    }

    #[test]
    fn test_boolean_and_malformed_corrections_rejected() {
        let mut correct = Action::new("d", ActionType::CorrectValue);
        assert!(correct.set_correction("1 < 2").is_err());
        assert!(correct.set_correction("(1").is_err());
    }

    #[test]
    fn test_algorithm_only_on_custom_correction() {
        let mut algorithm = Algorithm::new("recalibrate", Some("ATBD-7"));
        algorithm.add_parameter("gain", "1.02");
        algorithm.add_parameter("offset", "0");
        assert_eq!(algorithm.parameter("gain"), Some("1.02"));

        let mut correct = Action::new("d", ActionType::CorrectValue);
        assert!(correct.set_algorithm(algorithm.clone()).is_err());

        let mut custom = Action::new("d", ActionType::CustomCorrection);
        assert!(custom.check_complete().is_err());
        custom.set_algorithm(algorithm.clone()).unwrap();
        assert!(custom.set_algorithm(algorithm).is_err());
        assert!(custom.check_complete().is_ok());
    }

    #[test]
    fn test_extent_must_be_boolean() {
        assert!(parse_extent("int(/a) > 2").is_ok());
        assert!(parse_extent("int(/a)").is_err());
        assert!(parse_extent("int(/a) >").is_err());
    }
}
