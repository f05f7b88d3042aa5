//! Builds the rule set of an opened product from a report.

use crate::evaluator::RuleSet;
use crate::path_index::PathNode;
use crate::resolver::find_affected_product;
use crate::rule::RuleItem;
use qiap_error::{Discard, DiscardScope, QiapError, Result};
use qiap_model::Product;
use qiap_report::{ActionType, Report};
use std::sync::Arc;
use tracing::{debug, info};

/// Register every value-level action of `report` that applies to `product`.
///
/// Issues are visited in report order. For each affected value, a
/// discard-value or correct-value action is registered at the value's
/// parameter path (when it has an extent, or no explicit value list) and at
/// every listed value path. A path that does not fit the product's type tree
/// aborts the whole initialisation. An issue whose affected product carries a
/// discard-product action and no value-level action rejects the product.
pub fn init_actions(product: &Product, report: &Report) -> Result<RuleSet> {
    let root_type = product.root_type();
    let mut index = PathNode::new();
    let mut registered = 0usize;

    for issue in report.issues() {
        let Some(affected) = find_affected_product(product, issue)? else {
            continue;
        };
        let mut has_value_actions = false;

        for value in affected.affected_values() {
            let in_context = |source: QiapError| QiapError::ActionPath {
                parameter: value.parameter().to_string(),
                value_id: value.id(),
                issue_id: issue.id(),
                source: Box::new(source),
            };
            for action in value.actions() {
                let action_type = action.action_type();
                if !matches!(action_type, ActionType::DiscardValue | ActionType::CorrectValue) {
                    continue;
                }
                let leaf_only = action_type == ActionType::CorrectValue;
                let item = |extent| RuleItem {
                    issue_id: issue.id(),
                    affected_product_id: affected.id(),
                    affected_value_id: value.id(),
                    extent,
                    action: Arc::clone(action),
                };

                if value.extent().is_some() || value.values().is_empty() {
                    index
                        .add_item_for_path(
                            root_type,
                            value.parameter(),
                            item(value.extent().cloned()),
                            leaf_only,
                        )
                        .map_err(in_context)?;
                    registered += 1;
                }
                for path in value.values() {
                    index
                        .add_item_for_path(root_type, path, item(None), leaf_only)
                        .map_err(in_context)?;
                    registered += 1;
                }
                debug!(
                    issue_id = issue.id(),
                    affected_value_id = value.id(),
                    action = %action_type,
                    "registered value action"
                );
                has_value_actions = true;
            }
        }

        if !has_value_actions && affected.has_action(ActionType::DiscardProduct) {
            info!(
                product = product.filename(),
                issue_id = issue.id(),
                affected_product_id = affected.id(),
                "product discarded by quality issue"
            );
            return Err(QiapError::Discard(Discard {
                scope: DiscardScope::Product,
                issue_id: issue.id(),
                affected_product_id: affected.id(),
                affected_value_id: None,
            }));
        }
    }

    info!(
        product = product.filename(),
        items = registered,
        "initialised quality issue actions"
    );
    Ok(RuleSet::new(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qiap_error::ErrorKind;
    use qiap_model::{DataType, NativeType, Node};
    use qiap_report::{Action, AffectedProduct, AffectedValue, QualityIssue};

    fn product() -> Product {
        let ty = DataType::record(vec![
            ("temperature", DataType::real(NativeType::Double)),
            ("data", DataType::array(DataType::integer(NativeType::Int16))),
        ]);
        let root = Node::record(vec![
            Node::real(280.0),
            Node::array(vec![Node::int(1), Node::int(2), Node::int(3)]),
        ]);
        Product::new("/data/x.N1", ty, root)
            .with_class("ENVISAT")
            .with_product_type("X")
    }

    fn report(product: AffectedProduct) -> Report {
        let mut issue = QualityIssue::new(9, "2008-07-01", "ENVISAT");
        issue.set_title("t").unwrap();
        issue.set_description("d").unwrap();
        issue.add_affected_product(product);
        let mut report = Report::new("ESA");
        report.add_issue(issue).unwrap();
        report
    }

    fn discard_value(parameter: &str, values: &[&str]) -> AffectedValue {
        let mut value = AffectedValue::new(5, parameter);
        for path in values {
            value.add_value(*path).unwrap();
        }
        value
            .add_action(Action::new("2008-07-01", ActionType::DiscardValue))
            .unwrap();
        value
    }

    fn items_at(rules: &RuleSet, product: &Product, path: &str) -> usize {
        let mut cursor = product.cursor();
        cursor.goto(path).unwrap();
        rules.index().lookup(&cursor).len()
    }

    #[test]
    fn test_parameter_path_without_values() {
        let mut affected = AffectedProduct::new(1, "X");
        affected.add_affected_value(discard_value("/temperature", &[]));
        let product = product();
        let rules = init_actions(&product, &report(affected)).unwrap();
        assert_eq!(items_at(&rules, &product, "/temperature"), 1);
    }

    #[test]
    fn test_literal_values_fan_out() {
        let mut affected = AffectedProduct::new(1, "X");
        affected.add_affected_value(discard_value("/data", &["/data[0]", "/data[2]"]));
        let product = product();
        let rules = init_actions(&product, &report(affected)).unwrap();
        assert_eq!(items_at(&rules, &product, "/data[0]"), 1);
        assert_eq!(items_at(&rules, &product, "/data[1]"), 0);
        assert_eq!(items_at(&rules, &product, "/data[2]"), 1);
        assert_eq!(items_at(&rules, &product, "/data"), 0);
    }

    #[test]
    fn test_unaffected_product_gets_empty_rule_set() {
        let mut affected = AffectedProduct::new(1, "OTHER");
        affected.add_affected_value(discard_value("/temperature", &[]));
        let rules = init_actions(&product(), &report(affected)).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_bad_path_names_the_action() {
        let mut affected = AffectedProduct::new(1, "X");
        affected.add_affected_value(discard_value("/pressure", &[]));
        let err = init_actions(&product(), &report(affected)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
        assert!(err
            .to_string()
            .ends_with("for action on '/pressure' (value_id=5, issue_id=9)"));
    }

    #[test]
    fn test_correction_must_target_leaf() {
        let mut value = AffectedValue::new(5, "/data");
        let mut action = Action::new("d", ActionType::CorrectValue);
        action.set_correction("0").unwrap();
        value.add_action(action).unwrap();
        let mut affected = AffectedProduct::new(1, "X");
        affected.add_affected_value(value);
        let err = init_actions(&product(), &report(affected)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[test]
    fn test_discard_product() {
        let mut affected = AffectedProduct::new(1, "X");
        affected
            .add_action(Action::new("d", ActionType::DiscardProduct))
            .unwrap();
        let err = init_actions(&product(), &report(affected)).unwrap_err();
        let discard = err.discard().expect("discard");
        assert_eq!(discard.scope, DiscardScope::Product);
        assert_eq!(discard.issue_id, 9);
        assert_eq!(discard.affected_product_id, 1);
    }

    #[test]
    fn test_value_actions_take_over_from_discard_product() {
        let mut affected = AffectedProduct::new(1, "X");
        affected
            .add_action(Action::new("d", ActionType::DiscardProduct))
            .unwrap();
        affected.add_affected_value(discard_value("/temperature", &[]));
        assert!(init_actions(&product(), &report(affected)).is_ok());
    }
}
