//! Rule items stored in the path index.

use qiap_error::{Discard, DiscardScope};
use qiap_report::{Action, ActionType, SharedExpression};
use std::sync::Arc;

/// One value-level action registered at one product position.
///
/// The action is shared with the report; several items may point at the
/// same action when an affected value lists multiple paths.
#[derive(Debug, Clone)]
pub struct RuleItem {
    pub issue_id: i64,
    pub affected_product_id: i64,
    pub affected_value_id: i64,
    /// Condition evaluated at the item's own position; `None` always applies.
    pub extent: Option<SharedExpression>,
    pub action: Arc<Action>,
}

impl RuleItem {
    pub fn action_type(&self) -> ActionType {
        self.action.action_type()
    }

    pub fn discard(&self) -> Discard {
        Discard {
            scope: DiscardScope::Value,
            issue_id: self.issue_id,
            affected_product_id: self.affected_product_id,
            affected_value_id: Some(self.affected_value_id),
        }
    }
}
