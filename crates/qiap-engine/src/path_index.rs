//! Path index: a trie over product positions.
//!
//! Each node mirrors one position in the product's type tree and holds
//!
//! - the items registered exactly at that position,
//! - an optional wildcard child covering every element of an array and its
//!   attribute record, and
//! - indexed children kept sorted by their signed key (record field index,
//!   array element index, or -1 for the attribute record).
//!
//! Lookups walk the trie in lock-step with a cursor's frame stack, so a read
//! sees every item registered on its own position or on any ancestor.

use qiap_error::{QiapError, Result};
use qiap_model::{Cursor, DataType, TypeClass};

/// Key of the attribute record child.
const ATTRIBUTES_KEY: i64 = -1;

/// An item found by [`PathNode::lookup`], with the cursor depth it is
/// registered at.
#[derive(Debug)]
pub struct Match<'a, T> {
    pub depth: usize,
    pub item: &'a T,
}

#[derive(Debug)]
pub struct PathNode<T> {
    items: Vec<T>,
    wildcard: Option<Box<PathNode<T>>>,
    keys: Vec<i64>,
    children: Vec<PathNode<T>>,
}

impl<T> Default for PathNode<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            wildcard: None,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl<T> PathNode<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn add_item(&mut self, item: T) {
        self.items.push(item);
    }

    /// No items anywhere in this subtree.
    pub fn is_empty(&self) -> bool {
        !self.has_items_in_subtree()
    }

    pub fn wildcard_child(&self) -> Option<&PathNode<T>> {
        self.wildcard.as_deref()
    }

    pub fn get_or_create_wildcard_child(&mut self) -> &mut PathNode<T> {
        self.wildcard.get_or_insert_with(Box::default)
    }

    pub fn indexed_child(&self, key: i64) -> Option<&PathNode<T>> {
        self.keys
            .binary_search(&key)
            .ok()
            .map(|slot| &self.children[slot])
    }

    /// Child for `key`, inserted at its sorted slot when absent.
    pub fn get_or_create_indexed_child(&mut self, key: i64) -> &mut PathNode<T> {
        let slot = match self.keys.binary_search(&key) {
            Ok(slot) => slot,
            Err(slot) => {
                self.keys.insert(slot, key);
                self.children.insert(slot, PathNode::new());
                slot
            }
        };
        &mut self.children[slot]
    }

    /// Keys of the indexed children in ascending order.
    pub fn keys(&self) -> &[i64] {
        &self.keys
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `item` at `path`, checked against `root_type`.
    ///
    /// Path segments are `/name` (record field), `[n]` (array element),
    /// `[]` (every array element) and `@` (attribute record, optionally
    /// followed directly by a field name). A leading `/` that is not followed
    /// by a field name denotes the root. With `leaf_only` the path must end
    /// on a value that is neither a record nor an array.
    pub fn add_item_for_path(
        &mut self,
        root_type: &DataType,
        path: &str,
        item: T,
        leaf_only: bool,
    ) -> Result<()> {
        let bytes = path.as_bytes();
        let mut pos = 0;
        if bytes.first() == Some(&b'/') && matches!(bytes.get(1), None | Some(b'/' | b'[' | b'@'))
        {
            pos = 1;
        }

        let mut node = self;
        let mut ty = root_type;
        while pos < bytes.len() {
            match bytes[pos] {
                b'@' => {
                    node = node.get_or_create_indexed_child(ATTRIBUTES_KEY);
                    ty = ty.attributes();
                    pos += 1;
                    // "@name" is shorthand for "@/name"
                    if pos < bytes.len() && !matches!(bytes[pos], b'/' | b'[' | b'@') {
                        let end = name_end(bytes, pos);
                        let (index, field_type) = field(ty, path, &path[pos..end])?;
                        node = node.get_or_create_indexed_child(index);
                        ty = field_type;
                        pos = end;
                    }
                }
                b'[' => {
                    let base = ty.array_base().ok_or_else(|| {
                        QiapError::invalid_path(
                            path,
                            format!(
                                "not an array '{}' (type is {})",
                                &path[..pos],
                                ty.resolved().class()
                            ),
                        )
                    })?;
                    let end = path[pos..]
                        .find(']')
                        .map(|offset| pos + offset)
                        .ok_or_else(|| QiapError::invalid_path(path, "missing ']'"))?;
                    let index = &path[pos + 1..end];
                    if index.is_empty() {
                        node = node.get_or_create_wildcard_child();
                    } else {
                        let index: i64 = index.parse().map_err(|_| {
                            QiapError::invalid_path(path, format!("invalid array index '{index}'"))
                        })?;
                        if index < 0 {
                            return Err(QiapError::invalid_path(
                                path,
                                format!("invalid array index '{index}'"),
                            ));
                        }
                        node = node.get_or_create_indexed_child(index);
                    }
                    ty = base;
                    pos = end + 1;
                }
                b'/' => {
                    if ty.resolved().class() != TypeClass::Record {
                        return Err(QiapError::invalid_path(
                            path,
                            format!(
                                "not a record '{}' (type is {})",
                                &path[..pos],
                                ty.resolved().class()
                            ),
                        ));
                    }
                    let start = pos + 1;
                    let end = name_end(bytes, start);
                    let (index, field_type) = field(ty, path, &path[start..end])?;
                    node = node.get_or_create_indexed_child(index);
                    ty = field_type;
                    pos = end;
                }
                _ => return Err(QiapError::invalid_path(path, "missing '/'?")),
            }
        }

        if leaf_only && !ty.is_leaf() {
            return Err(QiapError::invalid_path(
                path,
                format!("trying to add item to path '{path}', which is not a leaf item"),
            ));
        }
        node.add_item(item);
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Every item registered on the cursor's position or one of its
    /// ancestors, shallowest first.
    pub fn lookup<'a>(&'a self, cursor: &Cursor<'_>) -> Vec<Match<'a, T>> {
        let mut found = Vec::new();
        self.collect(cursor, 0, &mut found);
        found
    }

    fn collect<'a>(&'a self, cursor: &Cursor<'_>, depth: usize, found: &mut Vec<Match<'a, T>>) {
        found.extend(self.items.iter().map(|item| Match { depth, item }));
        if depth >= cursor.depth() {
            return;
        }
        let Some(index) = cursor.index_at(depth + 1) else {
            return;
        };
        if let Some(wildcard) = &self.wildcard {
            wildcard.collect(cursor, depth + 1, found);
        }
        if let Some(child) = self.indexed_child(index) {
            child.collect(cursor, depth + 1, found);
        }
    }

    /// Whether anything is registered strictly below the cursor's position
    /// through an array element (wildcard or indexed).
    pub fn has_items_under(&self, cursor: &Cursor<'_>) -> bool {
        self.any_under(cursor, 0)
    }

    fn any_under(&self, cursor: &Cursor<'_>, depth: usize) -> bool {
        if depth >= cursor.depth() {
            return self.has_items_below();
        }
        let Some(index) = cursor.index_at(depth + 1) else {
            return false;
        };
        let through_wildcard = self
            .wildcard
            .as_ref()
            .is_some_and(|wildcard| wildcard.any_under(cursor, depth + 1));
        through_wildcard
            || self
                .indexed_child(index)
                .is_some_and(|child| child.any_under(cursor, depth + 1))
    }

    /// Items in the wildcard subtree or in any element subtree.
    pub fn has_items_below(&self) -> bool {
        self.wildcard
            .as_ref()
            .is_some_and(|wildcard| wildcard.has_items_in_subtree())
            || self
                .keys
                .iter()
                .zip(&self.children)
                .any(|(&key, child)| key >= 0 && child.has_items_in_subtree())
    }

    fn has_items_in_subtree(&self) -> bool {
        !self.items.is_empty()
            || self
                .wildcard
                .as_ref()
                .is_some_and(|wildcard| wildcard.has_items_in_subtree())
            || self.children.iter().any(PathNode::has_items_in_subtree)
    }
}

fn name_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && !matches!(bytes[end], b'/' | b'[' | b'@') {
        end += 1;
    }
    end
}

fn field<'t>(ty: &'t DataType, path: &str, name: &str) -> Result<(i64, &'t DataType)> {
    let index = ty.field_index(name).ok_or_else(|| {
        QiapError::invalid_path(path, format!("record has no field '{name}'"))
    })?;
    let field_type = ty
        .field_type(index)
        .ok_or_else(|| QiapError::invalid_path(path, format!("record has no field '{name}'")))?;
    Ok((index as i64, field_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qiap_error::ErrorKind;
    use qiap_model::{NativeType, Node, Product};
    use std::sync::Arc;

    fn schema() -> Arc<DataType> {
        let units = DataType::record(vec![("units", DataType::text())]);
        DataType::record(vec![
            ("temperature", DataType::real(NativeType::Double).with_attributes(units.clone())),
            (
                "data",
                DataType::array(DataType::integer(NativeType::Int16)).with_attributes(units.clone()),
            ),
            (
                "grid",
                DataType::special(DataType::array(DataType::record(vec![(
                    "flag",
                    DataType::integer(NativeType::UInt8),
                )]))),
            ),
        ])
    }

    fn product() -> Product {
        let root = Node::record(vec![
            Node::real(280.0).with_attributes(vec![Node::text("K")]),
            Node::array((0..6).map(Node::int).collect()).with_attributes(vec![Node::text("mm")]),
            Node::array((0..3).map(|i| Node::record(vec![Node::uint(i)])).collect()),
        ]);
        Product::new("test.N1", schema(), root)
    }

    fn items_at(index: &PathNode<&'static str>, product: &Product, path: &str) -> Vec<&'static str> {
        let mut cursor = product.cursor();
        cursor.goto(path).unwrap();
        index.lookup(&cursor).into_iter().map(|m| *m.item).collect()
    }

    #[test]
    fn test_indexed_children_stay_sorted() {
        let mut node: PathNode<()> = PathNode::new();
        for key in [5, -1, 3, 9, 0, 3] {
            node.get_or_create_indexed_child(key);
        }
        assert_eq!(node.keys(), &[-1, 0, 3, 5, 9]);
        assert!(node.indexed_child(4).is_none());
        assert!(node.indexed_child(9).is_some());
    }

    #[test]
    fn test_field_and_attribute_paths() {
        let ty = schema();
        let mut index = PathNode::new();
        index.add_item_for_path(&ty, "/temperature", "t", true).unwrap();
        index.add_item_for_path(&ty, "/temperature@units", "u", true).unwrap();
        index.add_item_for_path(&ty, "/temperature@/units", "u2", true).unwrap();

        let product = product();
        assert_eq!(items_at(&index, &product, "/temperature"), ["t"]);
        assert_eq!(items_at(&index, &product, "/temperature@units"), ["t", "u", "u2"]);
        assert!(items_at(&index, &product, "/data[0]").is_empty());
    }

    #[test]
    fn test_wildcard_and_index() {
        let ty = schema();
        let mut index = PathNode::new();
        index.add_item_for_path(&ty, "/data[]", "all", true).unwrap();
        index.add_item_for_path(&ty, "/data[3]", "three", true).unwrap();

        let product = product();
        assert_eq!(items_at(&index, &product, "/data[3]"), ["all", "three"]);
        assert_eq!(items_at(&index, &product, "/data[5]"), ["all"]);
        assert!(items_at(&index, &product, "/data").is_empty());
    }

    #[test]
    fn test_wildcard_covers_attributes() {
        let ty = schema();
        let mut index = PathNode::new();
        index.add_item_for_path(&ty, "/data[]", "all", true).unwrap();
        let product = product();
        assert_eq!(items_at(&index, &product, "/data@units"), ["all"]);

        index.add_item_for_path(&ty, "/data@units", "units", true).unwrap();
        assert_eq!(items_at(&index, &product, "/data@units"), ["all", "units"]);
        assert_eq!(items_at(&index, &product, "/data[0]"), ["all"]);

        let mut cursor = product.cursor();
        cursor.goto("/data@").unwrap();
        assert!(index.has_items_under(&cursor));
    }

    #[test]
    fn test_special_types_navigate_as_base() {
        let ty = schema();
        let mut index = PathNode::new();
        index.add_item_for_path(&ty, "/grid[1]/flag", "f", true).unwrap();
        let product = product();
        assert_eq!(items_at(&index, &product, "/grid[1]/flag"), ["f"]);
        assert!(items_at(&index, &product, "/grid[0]/flag").is_empty());
    }

    #[test]
    fn test_ancestor_items_are_visible() {
        let ty = schema();
        let mut index = PathNode::new();
        index.add_item_for_path(&ty, "/", "root", false).unwrap();
        index.add_item_for_path(&ty, "/data", "array", false).unwrap();
        let product = product();
        let found = {
            let mut cursor = product.cursor();
            cursor.goto("/data[2]").unwrap();
            index
                .lookup(&cursor)
                .into_iter()
                .map(|m| (m.depth, *m.item))
                .collect::<Vec<_>>()
        };
        assert_eq!(found, [(0, "root"), (1, "array")]);
    }

    #[test]
    fn test_invalid_paths() {
        let ty = schema();
        let mut index = PathNode::new();
        let cases = [
            "/temperature[0]",
            "/data/x",
            "/missing",
            "/data[x]",
            "/data[-2]",
            "/data[1",
            "temperature",
        ];
        for path in cases {
            let err = index.add_item_for_path(&ty, path, "x", false).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath, "{path}");
        }
        assert!(index.is_empty());
    }

    #[test]
    fn test_leaf_only_rejects_composites() {
        let ty = schema();
        let mut index = PathNode::new();
        let err = index.add_item_for_path(&ty, "/data", "x", true).unwrap_err();
        assert!(err.to_string().contains("which is not a leaf item"));
        index.add_item_for_path(&ty, "/data", "x", false).unwrap();
        assert!(!index.is_empty());
    }

    #[test]
    fn test_items_under_array() {
        let ty = schema();
        let product = product();
        let mut cursor = product.cursor();
        cursor.goto("/data").unwrap();

        let mut index = PathNode::new();
        assert!(!index.has_items_under(&cursor));
        index.add_item_for_path(&ty, "/data", "array", false).unwrap();
        assert!(!index.has_items_under(&cursor));
        index.add_item_for_path(&ty, "/data[4]", "four", true).unwrap();
        assert!(index.has_items_under(&cursor));

        let mut index = PathNode::new();
        index.add_item_for_path(&ty, "/grid[]/flag", "flag", true).unwrap();
        let mut grid = product.cursor();
        grid.goto("/grid").unwrap();
        assert!(index.has_items_under(&grid));
        assert!(!index.has_items_under(&cursor));
    }
}
