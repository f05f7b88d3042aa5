//! Opened products and the read hook they carry.

use crate::cursor::Cursor;
use crate::types::{DataType, NativeType, TypeClass};
use crate::value::{Node, Value};
use qiap_error::{QiapError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A primitive value as delivered by a read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Scalar {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Char(u8),
    String(String),
}

impl Scalar {
    pub fn native_type(&self) -> NativeType {
        match self {
            Self::Int8(_) => NativeType::Int8,
            Self::UInt8(_) => NativeType::UInt8,
            Self::Int16(_) => NativeType::Int16,
            Self::UInt16(_) => NativeType::UInt16,
            Self::Int32(_) => NativeType::Int32,
            Self::UInt32(_) => NativeType::UInt32,
            Self::Int64(_) => NativeType::Int64,
            Self::UInt64(_) => NativeType::UInt64,
            Self::Float(_) => NativeType::Float,
            Self::Double(_) => NativeType::Double,
            Self::Char(_) => NativeType::Char,
            Self::String(_) => NativeType::String,
        }
    }

    /// Narrow a 64-bit integer to `native` with C cast semantics.
    ///
    /// `UInt64` reinterprets the bit pattern of `value`.
    pub fn from_i64(value: i64, native: NativeType) -> Option<Self> {
        Some(match native {
            NativeType::Int8 => Self::Int8(value as i8),
            NativeType::UInt8 => Self::UInt8(value as u8),
            NativeType::Int16 => Self::Int16(value as i16),
            NativeType::UInt16 => Self::UInt16(value as u16),
            NativeType::Int32 => Self::Int32(value as i32),
            NativeType::UInt32 => Self::UInt32(value as u32),
            NativeType::Int64 => Self::Int64(value),
            NativeType::UInt64 => Self::UInt64(u64::from_ne_bytes(value.to_ne_bytes())),
            _ => return None,
        })
    }

    pub fn from_f64(value: f64, native: NativeType) -> Option<Self> {
        match native {
            NativeType::Float => Some(Self::Float(value as f32)),
            NativeType::Double => Some(Self::Double(value)),
            _ => None,
        }
    }

    /// `Char` takes the first byte (NUL for an empty string).
    pub fn from_text(value: String, native: NativeType) -> Option<Self> {
        match native {
            NativeType::Char => Some(Self::Char(value.bytes().next().unwrap_or(0))),
            NativeType::String => Some(Self::String(value)),
            _ => None,
        }
    }

    /// Raw conversion of a stored value.
    pub(crate) fn from_value(value: &Value, native: NativeType) -> Option<Self> {
        match value {
            Value::Int(v) => match native {
                NativeType::Float | NativeType::Double => Self::from_f64(*v as f64, native),
                _ => Self::from_i64(*v, native),
            },
            Value::UInt(v) => match native {
                NativeType::Float | NativeType::Double => Self::from_f64(*v as f64, native),
                NativeType::UInt64 => Some(Self::UInt64(*v)),
                _ => Self::from_i64(*v as i64, native),
            },
            Value::Real(v) => Self::from_f64(*v, native),
            Value::Text(v) => Self::from_text(v.clone(), native),
            Value::Record(_) | Value::Array(_) => None,
        }
    }
}

/// Conversion from a [`Scalar`] into the Rust type a typed read returns.
pub trait NativeValue: Sized {
    const NATIVE: NativeType;

    fn from_scalar(scalar: Scalar) -> Option<Self>;
}

macro_rules! native_value {
    ($($ty:ty => $native:ident),* $(,)?) => {
        $(
            impl NativeValue for $ty {
                const NATIVE: NativeType = NativeType::$native;

                fn from_scalar(scalar: Scalar) -> Option<Self> {
                    match scalar {
                        Scalar::$native(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

native_value! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
}

/// Interception point consulted by every primitive read of a product.
pub trait ReadHook: Send + Sync {
    /// Called before a primitive read; `Some` replaces the stored value.
    fn before_read(&self, cursor: &Cursor<'_>, native: NativeType) -> Result<Option<Scalar>>;

    /// Called before a bulk array read; `true` forces element-wise reads.
    fn before_array_read(&self, cursor: &Cursor<'_>) -> Result<bool>;
}

pub struct Product {
    filename: String,
    class: Option<String>,
    product_type: Option<String>,
    root_type: Arc<DataType>,
    root: Node,
    hook: Option<Box<dyn ReadHook>>,
}

impl fmt::Debug for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Product")
            .field("filename", &self.filename)
            .field("class", &self.class)
            .field("product_type", &self.product_type)
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

impl Product {
    pub fn new(filename: impl Into<String>, root_type: Arc<DataType>, root: Node) -> Self {
        Self {
            filename: filename.into(),
            class: None,
            product_type: None,
            root_type,
            root,
            hook: None,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_product_type(mut self, product_type: impl Into<String>) -> Self {
        self.product_type = Some(product_type.into());
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Portion of the filename after the last '/'.
    pub fn base_filename(&self) -> &str {
        match self.filename.rfind('/') {
            Some(pos) => &self.filename[pos + 1..],
            None => &self.filename,
        }
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn product_type(&self) -> Option<&str> {
        self.product_type.as_deref()
    }

    pub fn root_type(&self) -> &DataType {
        &self.root_type
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    pub fn hook(&self) -> Option<&dyn ReadHook> {
        self.hook.as_deref()
    }

    pub fn set_read_hook(&mut self, hook: Box<dyn ReadHook>) {
        self.hook = Some(hook);
    }

    pub fn clear_read_hook(&mut self) -> Option<Box<dyn ReadHook>> {
        self.hook.take()
    }

    /// Check that the data tree has the shape of the type tree.
    pub fn validate(&self) -> Result<()> {
        validate_node(&self.root_type, &self.root, "")
    }
}

fn validate_node(ty: &DataType, node: &Node, path: &str) -> Result<()> {
    let shown = if path.is_empty() { "/" } else { path };
    let ty = ty.resolved();
    match (ty.class(), &node.value) {
        (TypeClass::Record, Value::Record(children)) => {
            let fields = ty.fields();
            if fields.len() != children.len() {
                return Err(QiapError::data(format!(
                    "record at '{shown}' has {} fields, type declares {}",
                    children.len(),
                    fields.len()
                )));
            }
            for (field, child) in fields.iter().zip(children) {
                validate_node(&field.ty, child, &format!("{path}/{}", field.name))?;
            }
        }
        (TypeClass::Array, Value::Array(children)) => {
            if let Some(base) = ty.array_base() {
                for (i, child) in children.iter().enumerate() {
                    validate_node(base, child, &format!("{path}[{i}]"))?;
                }
            }
        }
        (class, value) => {
            let readable = ty
                .native_type()
                .and_then(|native| Scalar::from_value(value, native))
                .is_some();
            if !readable {
                return Err(QiapError::data(format!(
                    "value at '{shown}' does not match type class {class}"
                )));
            }
        }
    }
    if let Some(attributes) = &node.attributes {
        validate_node(ty.attributes(), attributes, &format!("{path}@"))?;
    }
    Ok(())
}
