//! Cursor over a product's data tree.
//!
//! The cursor is a stack of frames, one per depth level:
//!
//! - frame 0 is the product root and has index -1,
//! - entering a record field or an array element pushes that field/element
//!   index, and
//! - entering the attribute record pushes -1.
//!
//! Every primitive read first goes through the product's [`ReadHook`]
//! (if one is attached). Bulk array reads ask the hook whether the array has
//! to be read element by element instead.
//!
//! [`ReadHook`]: crate::product::ReadHook

use crate::product::{NativeValue, Product, Scalar};
use crate::types::{DataType, NativeType, TypeClass};
use crate::value::Node;
use qiap_error::{QiapError, Result};
use std::fmt;

#[derive(Clone, Copy)]
struct Frame<'p> {
    index: i64,
    ty: &'p DataType,
    node: &'p Node,
}

#[derive(Clone)]
pub struct Cursor<'p> {
    product: &'p Product,
    frames: Vec<Frame<'p>>,
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("product", &self.product.filename())
            .field("indices", &self.frames.iter().map(|fr| fr.index).collect::<Vec<_>>())
            .finish()
    }
}

impl<'p> Cursor<'p> {
    pub fn new(product: &'p Product) -> Self {
        Self {
            product,
            frames: vec![Frame {
                index: -1,
                ty: product.root_type(),
                node: product.root(),
            }],
        }
    }

    pub fn product(&self) -> &'p Product {
        self.product
    }

    /// Depth of the current position; the root is depth 0.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Index stored in the frame at `depth`.
    pub fn index_at(&self, depth: usize) -> Option<i64> {
        self.frames.get(depth).map(|frame| frame.index)
    }

    /// Index of the current position within its parent (-1 for root and attributes).
    pub fn index(&self) -> i64 {
        self.top().index
    }

    pub fn data_type(&self) -> &'p DataType {
        self.top().ty
    }

    pub fn node(&self) -> &'p Node {
        self.top().node
    }

    fn top(&self) -> &Frame<'p> {
        &self.frames[self.frames.len() - 1]
    }

    /// Drop every frame below `depth`; a cursor never loses its root frame.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth + 1);
    }

    pub fn goto_root(&mut self) {
        self.frames.truncate(1);
    }

    pub fn goto_parent(&mut self) -> Result<()> {
        if self.frames.len() == 1 {
            return Err(QiapError::data("cursor is already at the root"));
        }
        self.frames.pop();
        Ok(())
    }

    pub fn goto_record_field_by_index(&mut self, index: usize) -> Result<()> {
        let top = *self.top();
        let ty = top.ty.resolved();
        if ty.class() != TypeClass::Record {
            return Err(QiapError::data(format!(
                "cannot enter field {index} of a {} value",
                ty.class()
            )));
        }
        let field = ty.fields().get(index).ok_or_else(|| {
            QiapError::data(format!("field index {index} out of range"))
        })?;
        let node = top
            .node
            .children()
            .get(index)
            .ok_or_else(|| QiapError::data(format!("record data has no field {index}")))?;
        self.frames.push(Frame {
            index: index as i64,
            ty: field.ty.as_ref(),
            node,
        });
        Ok(())
    }

    pub fn goto_record_field_by_name(&mut self, name: &str) -> Result<()> {
        let index = self
            .data_type()
            .field_index(name)
            .ok_or_else(|| QiapError::data(format!("record has no field '{name}'")))?;
        self.goto_record_field_by_index(index)
    }

    pub fn goto_array_element_by_index(&mut self, index: i64) -> Result<()> {
        let top = *self.top();
        let base = top.ty.array_base().ok_or_else(|| {
            QiapError::data(format!(
                "cannot enter element {index} of a {} value",
                top.ty.resolved().class()
            ))
        })?;
        let elements = top.node.children();
        let node = usize::try_from(index)
            .ok()
            .and_then(|i| elements.get(i))
            .ok_or_else(|| {
                QiapError::data(format!(
                    "array index {index} out of range (0..{})",
                    elements.len()
                ))
            })?;
        self.frames.push(Frame {
            index,
            ty: base,
            node,
        });
        Ok(())
    }

    pub fn goto_first_array_element(&mut self) -> Result<()> {
        self.goto_array_element_by_index(0)
    }

    pub fn goto_next_array_element(&mut self) -> Result<()> {
        let index = self.index();
        self.goto_parent()?;
        self.goto_array_element_by_index(index + 1)
    }

    pub fn goto_attributes(&mut self) {
        let top = *self.top();
        self.frames.push(Frame {
            index: -1,
            ty: top.ty.attributes(),
            node: top.node.attributes(),
        });
    }

    /// Number of fields of a record or elements of an array.
    pub fn num_elements(&self) -> Result<usize> {
        match self.data_type().resolved().class() {
            TypeClass::Record | TypeClass::Array => Ok(self.node().children().len()),
            class => Err(QiapError::data(format!("a {class} value has no elements"))),
        }
    }

    /// Move along a path such as `/a/b[2]@units`, `../x` or `.`.
    ///
    /// A leading '/' starts from the root; anything else is relative to the
    /// current position. On error the position is left unchanged.
    pub fn goto(&mut self, path: &str) -> Result<()> {
        let mut target = self.clone();
        target.walk(path)?;
        *self = target;
        Ok(())
    }

    fn walk(&mut self, path: &str) -> Result<()> {
        let bytes = path.as_bytes();
        let mut pos = 0;
        if bytes.first() == Some(&b'/') {
            self.goto_root();
        }
        while pos < bytes.len() {
            match bytes[pos] {
                b'/' => pos += 1,
                b'[' => {
                    let end = path[pos..]
                        .find(']')
                        .map(|offset| pos + offset)
                        .ok_or_else(|| QiapError::invalid_path(path, "missing ']'"))?;
                    let index: i64 = path[pos + 1..end].trim().parse().map_err(|_| {
                        QiapError::invalid_path(
                            path,
                            format!("invalid array index '{}'", &path[pos + 1..end]),
                        )
                    })?;
                    self.goto_array_element_by_index(index)?;
                    pos = end + 1;
                }
                b'@' => {
                    self.goto_attributes();
                    pos += 1;
                    let end = name_end(bytes, pos);
                    if end > pos {
                        self.goto_record_field_by_name(&path[pos..end])?;
                    }
                    pos = end;
                }
                b'.' => {
                    if bytes.get(pos + 1) == Some(&b'.') {
                        self.goto_parent()?;
                        pos += 2;
                    } else {
                        pos += 1;
                    }
                }
                _ => {
                    let end = name_end(bytes, pos);
                    self.goto_record_field_by_name(&path[pos..end])?;
                    pos = end;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read the current leaf as `native`, consulting the product's hook first.
    pub fn read_native(&self, native: NativeType) -> Result<Scalar> {
        if let Some(hook) = self.product.hook() {
            if let Some(value) = hook.before_read(self, native)? {
                return Ok(value);
            }
        }
        self.read_raw(native)
    }

    /// Read the stored value without consulting the hook.
    pub fn read_raw(&self, native: NativeType) -> Result<Scalar> {
        Scalar::from_value(&self.node().value, native).ok_or_else(|| {
            QiapError::data(format!(
                "cannot read {} data as {native}",
                self.data_type().resolved().class()
            ))
        })
    }

    pub fn read<T: NativeValue>(&self) -> Result<T> {
        let scalar = self.read_native(T::NATIVE)?;
        let found = scalar.native_type();
        T::from_scalar(scalar).ok_or_else(|| {
            QiapError::data(format!("read of {} produced a {found} value", T::NATIVE))
        })
    }

    pub fn read_int8(&self) -> Result<i8> {
        self.read()
    }

    pub fn read_uint8(&self) -> Result<u8> {
        self.read()
    }

    pub fn read_int16(&self) -> Result<i16> {
        self.read()
    }

    pub fn read_uint16(&self) -> Result<u16> {
        self.read()
    }

    pub fn read_int32(&self) -> Result<i32> {
        self.read()
    }

    pub fn read_uint32(&self) -> Result<u32> {
        self.read()
    }

    pub fn read_int64(&self) -> Result<i64> {
        self.read()
    }

    pub fn read_uint64(&self) -> Result<u64> {
        self.read()
    }

    pub fn read_float(&self) -> Result<f32> {
        self.read()
    }

    pub fn read_double(&self) -> Result<f64> {
        self.read()
    }

    pub fn read_string(&self) -> Result<String> {
        self.read()
    }

    pub fn read_char(&self) -> Result<u8> {
        match self.read_native(NativeType::Char)? {
            Scalar::Char(c) => Ok(c),
            other => Err(QiapError::data(format!(
                "read of char produced a {} value",
                other.native_type()
            ))),
        }
    }

    /// Read every element of the current array as `native`.
    pub fn read_array_native(&self, native: NativeType) -> Result<Vec<Scalar>> {
        if self.data_type().resolved().class() != TypeClass::Array {
            return Err(QiapError::data(format!(
                "cannot read {} data as an array",
                self.data_type().resolved().class()
            )));
        }
        let count = self.num_elements()?;
        let element_wise = match self.product.hook() {
            Some(hook) => hook.before_array_read(self)?,
            None => false,
        };
        if element_wise {
            let mut values = Vec::with_capacity(count);
            if count > 0 {
                let mut element = self.clone();
                element.goto_first_array_element()?;
                for i in 0..count {
                    values.push(element.read_native(native)?);
                    if i + 1 < count {
                        element.goto_next_array_element()?;
                    }
                }
            }
            return Ok(values);
        }
        self.node()
            .children()
            .iter()
            .map(|child| {
                Scalar::from_value(&child.value, native).ok_or_else(|| {
                    QiapError::data(format!("cannot read array element as {native}"))
                })
            })
            .collect()
    }

    pub fn read_array<T: NativeValue>(&self) -> Result<Vec<T>> {
        self.read_array_native(T::NATIVE)?
            .into_iter()
            .map(|scalar| {
                let found = scalar.native_type();
                T::from_scalar(scalar).ok_or_else(|| {
                    QiapError::data(format!("read of {} produced a {found} value", T::NATIVE))
                })
            })
            .collect()
    }

    pub fn read_char_array(&self) -> Result<Vec<u8>> {
        self.read_array_native(NativeType::Char)?
            .into_iter()
            .map(|scalar| match scalar {
                Scalar::Char(c) => Ok(c),
                other => Err(QiapError::data(format!(
                    "read of char produced a {} value",
                    other.native_type()
                ))),
            })
            .collect()
    }
}

fn name_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && !matches!(bytes[end], b'/' | b'[' | b'@') {
        end += 1;
    }
    end
}
