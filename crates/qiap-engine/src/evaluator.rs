//! Read interception.
//!
//! A [`RuleSet`] is the per-product path index of rule items, installed as
//! the product's read hook. For every primitive read it
//!
//! 1. collects the items registered on the read position and its ancestors,
//! 2. evaluates each item's extent at the item's own depth,
//! 3. fails with a discard as soon as an active discard-value item is found,
//! 4. otherwise replaces the value with the correction of the active
//!    correct-value item of highest order (first registered wins ties).
//!
//! Bulk array reads are switched to element-wise reads when any rule is
//! registered beneath the array.

use crate::action_log::ActionLog;
use crate::guard::{is_suppressed, SuppressGuard};
use crate::path_index::PathNode;
use crate::rule::RuleItem;
use qiap_error::{QiapError, Result};
use qiap_model::{Cursor, ExpressionType, NativeType, ReadClass, ReadHook, Scalar};
use qiap_report::ActionType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct RuleSet {
    index: PathNode<RuleItem>,
    action_log: Option<ActionLog>,
    enabled: Arc<AtomicBool>,
}

impl RuleSet {
    pub fn new(index: PathNode<RuleItem>) -> Self {
        Self {
            index,
            action_log: None,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_action_log(mut self, action_log: Option<ActionLog>) -> Self {
        self.action_log = action_log;
        self
    }

    /// Share an enable flag owned elsewhere (the context's runtime switch).
    pub fn with_enabled_flag(mut self, enabled: Arc<AtomicBool>) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn index(&self) -> &PathNode<RuleItem> {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn intercepting(&self) -> bool {
        self.enabled.load(Ordering::Relaxed) && !is_suppressed()
    }

    /// The correct-value item to apply at the cursor, after checking every
    /// discard on the way.
    fn select_correction(&self, cursor: &Cursor<'_>) -> Result<Option<&RuleItem>> {
        let leaf_depth = cursor.depth();
        let mut selected: Option<&RuleItem> = None;
        for found in self.index.lookup(cursor) {
            let item = found.item;
            match item.action_type() {
                ActionType::DiscardValue => {
                    if extent_holds(item, cursor, found.depth)? {
                        return Err(self.discard(cursor, item));
                    }
                }
                ActionType::CorrectValue if found.depth == leaf_depth => {
                    if extent_holds(item, cursor, found.depth)?
                        && selected.map_or(true, |current| {
                            item.action.order() > current.action.order()
                        })
                    {
                        selected = Some(item);
                    }
                }
                _ => {}
            }
        }
        Ok(selected)
    }

    fn discard(&self, cursor: &Cursor<'_>, item: &RuleItem) -> QiapError {
        debug!(
            product = cursor.product().filename(),
            issue_id = item.issue_id,
            affected_value_id = item.affected_value_id,
            "discarding value"
        );
        self.log(cursor, item);
        QiapError::Discard(item.discard())
    }

    fn log(&self, cursor: &Cursor<'_>, item: &RuleItem) {
        if let Some(action_log) = &self.action_log {
            action_log.record(cursor.product().filename(), item);
        }
    }
}

/// Evaluate the item's extent as seen from the item's own position.
fn extent_holds(item: &RuleItem, cursor: &Cursor<'_>, depth: usize) -> Result<bool> {
    let Some(extent) = &item.extent else {
        return Ok(true);
    };
    let mut position = cursor.clone();
    position.truncate(depth);
    let _guard = SuppressGuard::enter();
    extent
        .eval_bool(&position)
        .map_err(|source| QiapError::ExtentEvaluation {
            issue_id: item.issue_id,
            affected_product_id: item.affected_product_id,
            affected_value_id: Some(item.affected_value_id),
            source: Box::new(source),
        })
}

fn expression_type_for(class: ReadClass) -> ExpressionType {
    match class {
        ReadClass::Integer => ExpressionType::Integer,
        ReadClass::Float => ExpressionType::Float,
        ReadClass::String => ExpressionType::String,
    }
}

/// Evaluate the correction and narrow it to `native`.
fn corrected_value(item: &RuleItem, cursor: &Cursor<'_>, native: NativeType) -> Result<Scalar> {
    let correction = item.action.correction().ok_or_else(|| {
        QiapError::invalid_argument("'correct value' action without correction expression")
    })?;
    let class = native.read_class();
    if correction.result_type() != expression_type_for(class) {
        return Err(QiapError::CorrectionTypeMismatch {
            expression: correction.result_type().name(),
            data: class.name(),
        });
    }

    let _guard = SuppressGuard::enter();
    let value = match class {
        ReadClass::Integer => Scalar::from_i64(correction.eval_integer(cursor)?, native),
        ReadClass::Float => Scalar::from_f64(correction.eval_float(cursor)?, native),
        ReadClass::String => Scalar::from_text(correction.eval_string(cursor)?, native),
    };
    value.ok_or_else(|| QiapError::data(format!("cannot store a correction as {native}")))
}

impl ReadHook for RuleSet {
    fn before_read(&self, cursor: &Cursor<'_>, native: NativeType) -> Result<Option<Scalar>> {
        if !self.intercepting() {
            return Ok(None);
        }
        let Some(item) = self.select_correction(cursor)? else {
            return Ok(None);
        };
        let value = corrected_value(item, cursor, native)?;
        debug!(
            product = cursor.product().filename(),
            issue_id = item.issue_id,
            affected_value_id = item.affected_value_id,
            order = item.action.order(),
            "corrected value"
        );
        self.log(cursor, item);
        Ok(Some(value))
    }

    fn before_array_read(&self, cursor: &Cursor<'_>) -> Result<bool> {
        if !self.intercepting() {
            return Ok(false);
        }
        for found in self.index.lookup(cursor) {
            if found.item.action_type() == ActionType::DiscardValue
                && extent_holds(found.item, cursor, found.depth)?
            {
                return Err(self.discard(cursor, found.item));
            }
        }
        Ok(self.index.has_items_under(cursor))
    }
}
