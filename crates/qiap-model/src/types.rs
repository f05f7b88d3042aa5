//! Type tree of a product.
//!
//! A [`DataType`] is one of six classes: record, array, integer, real, text
//! or special. Special types wrap a base type and are navigated as that base
//! type. Every type has an attribute record; types without declared
//! attributes report an empty one.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Class of a [`DataType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeClass {
    Record,
    Array,
    Integer,
    Real,
    Text,
    Special,
}

impl TypeClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Array => "array",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Special => "special",
        }
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Native representation a leaf is read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NativeType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    Char,
    String,
}

/// Primitive kind a correction must match when it replaces a read value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReadClass {
    Integer,
    Float,
    String,
}

impl ReadClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
        }
    }
}

impl NativeType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Char => "char",
            Self::String => "string",
        }
    }

    pub fn read_class(self) -> ReadClass {
        match self {
            Self::Int8
            | Self::UInt8
            | Self::Int16
            | Self::UInt16
            | Self::Int32
            | Self::UInt32
            | Self::Int64
            | Self::UInt64 => ReadClass::Integer,
            Self::Float | Self::Double => ReadClass::Float,
            Self::Char | Self::String => ReadClass::String,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Arc<DataType>,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Record(Vec<Field>),
    Array(Arc<DataType>),
    Integer(NativeType),
    Real(NativeType),
    Text(NativeType),
    Special(Arc<DataType>),
}

#[derive(Debug, Clone)]
pub struct DataType {
    pub kind: TypeKind,
    attributes: Option<Arc<DataType>>,
}

static EMPTY_RECORD: DataType = DataType {
    kind: TypeKind::Record(Vec::new()),
    attributes: None,
};

impl DataType {
    pub fn record(fields: Vec<(&str, Arc<DataType>)>) -> Arc<Self> {
        let fields = fields
            .into_iter()
            .map(|(name, ty)| Field {
                name: name.to_string(),
                ty,
            })
            .collect();
        Arc::new(Self {
            kind: TypeKind::Record(fields),
            attributes: None,
        })
    }

    pub fn array(base: Arc<DataType>) -> Arc<Self> {
        Arc::new(Self {
            kind: TypeKind::Array(base),
            attributes: None,
        })
    }

    pub fn integer(native: NativeType) -> Arc<Self> {
        Arc::new(Self {
            kind: TypeKind::Integer(native),
            attributes: None,
        })
    }

    pub fn real(native: NativeType) -> Arc<Self> {
        Arc::new(Self {
            kind: TypeKind::Real(native),
            attributes: None,
        })
    }

    pub fn text() -> Arc<Self> {
        Arc::new(Self {
            kind: TypeKind::Text(NativeType::String),
            attributes: None,
        })
    }

    pub fn special(base: Arc<DataType>) -> Arc<Self> {
        Arc::new(Self {
            kind: TypeKind::Special(base),
            attributes: None,
        })
    }

    /// Copy of `self` with the given attribute record.
    pub fn with_attributes(&self, attributes: Arc<DataType>) -> Arc<Self> {
        Arc::new(Self {
            kind: self.kind.clone(),
            attributes: Some(attributes),
        })
    }

    pub fn class(&self) -> TypeClass {
        match self.kind {
            TypeKind::Record(_) => TypeClass::Record,
            TypeKind::Array(_) => TypeClass::Array,
            TypeKind::Integer(_) => TypeClass::Integer,
            TypeKind::Real(_) => TypeClass::Real,
            TypeKind::Text(_) => TypeClass::Text,
            TypeKind::Special(_) => TypeClass::Special,
        }
    }

    /// Follows special types down to the type used for navigation.
    pub fn resolved(&self) -> &DataType {
        let mut ty = self;
        while let TypeKind::Special(base) = &ty.kind {
            ty = base;
        }
        ty
    }

    /// Native read type of a leaf, `None` for records and arrays.
    pub fn native_type(&self) -> Option<NativeType> {
        match &self.resolved().kind {
            TypeKind::Integer(native) | TypeKind::Real(native) | TypeKind::Text(native) => {
                Some(*native)
            }
            TypeKind::Record(_) | TypeKind::Array(_) | TypeKind::Special(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(
            self.resolved().class(),
            TypeClass::Record | TypeClass::Array
        )
    }

    pub fn attributes(&self) -> &DataType {
        self.attributes.as_deref().unwrap_or(&EMPTY_RECORD)
    }

    pub fn fields(&self) -> &[Field] {
        match &self.resolved().kind {
            TypeKind::Record(fields) => fields,
            _ => &[],
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|field| field.name == name)
    }

    pub fn field_type(&self, index: usize) -> Option<&DataType> {
        self.fields().get(index).map(|field| field.ty.as_ref())
    }

    pub fn array_base(&self) -> Option<&DataType> {
        match &self.resolved().kind {
            TypeKind::Array(base) => Some(base),
            _ => None,
        }
    }
}
