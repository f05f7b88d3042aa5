//! Hierarchical product data model consumed by the QIAP engine.
//!
//! - [`types`]: the type tree (record / array / integer / real / text / special)
//! - [`value`]: in-memory data nodes
//! - [`product`]: opened products, primitive values and the read hook
//! - [`cursor`]: position stack with intercepted primitive reads
//! - [`expr`]: the expression API and a reference expression engine

pub mod cursor;
pub mod expr;
pub mod product;
pub mod types;
pub mod value;

pub use cursor::Cursor;
pub use expr::{parse_expression, Expression, ExpressionType};
pub use product::{NativeValue, Product, ReadHook, Scalar};
pub use types::{DataType, Field, NativeType, ReadClass, TypeClass, TypeKind};
pub use value::{Node, Value};
