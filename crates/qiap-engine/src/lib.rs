//! Quality issue engine.
//!
//! Turns a Quality Issue Report into per-product read interception:
//!
//! - [`path_index`]: the per-product tree of rule items keyed by position
//! - [`resolver`]: which affected-product entry of an issue applies to a product
//! - [`initializer`]: builds a product's rule set from the report
//! - [`evaluator`]: the rule set as a read hook (discard and correct)
//! - [`guard`]: per-thread suppression of interception during nested evaluation
//! - [`action_log`]: append-only record of performed actions
//! - [`config`] and [`context`]: configuration and the shared report handle

pub mod action_log;
pub mod config;
pub mod context;
pub mod evaluator;
pub mod guard;
pub mod initializer;
pub mod path_index;
pub mod resolver;
pub mod rule;

pub use action_log::ActionLog;
pub use config::{QiapConfig, ACTION_LOG_ENV, REPORT_ENV};
pub use context::{QiapContext, WeakQiapContext};
pub use evaluator::RuleSet;
pub use guard::{is_suppressed, SuppressGuard};
pub use initializer::init_actions;
pub use path_index::{Match, PathNode};
pub use resolver::find_affected_product;
pub use rule::RuleItem;
