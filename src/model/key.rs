//! Key descriptors
//!
//! A key is an ordered field tuple. The order is the lexicographic comparison
//! order of the encoded key on disk: reordering key fields changes the storage
//! layout.

use serde::{Deserialize, Serialize};

use super::ResolvedField;

/// A declared key field: dotted path plus optional comparison transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFieldRef {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl KeyFieldRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            transform: None,
        }
    }

    pub fn with_transform(path: impl Into<String>, transform: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            transform: Some(transform.into()),
        }
    }
}

/// One tail expansion step of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVariant {
    pub name: String,
    pub fields: Vec<ResolvedField>,
}

/// A leading subsequence of a key usable to bound a range scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPrefix {
    /// `_`-joined short field names
    pub name: String,
    pub fields: Vec<ResolvedField>,
    /// Last field of the prefix; never a record
    pub terminal: ResolvedField,
    /// An earlier key on the same record has a prefix with this name
    pub duplicate: bool,
}

/// A primary or secondary key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDescriptor {
    /// Wire index identifier; primary keys usually have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_id: Option<u32>,
    pub index_name: String,
    pub fields: Vec<KeyFieldRef>,
    pub primary: bool,
    /// Declared fields after path resolution
    #[serde(default)]
    pub resolved: Vec<ResolvedField>,
    #[serde(default)]
    pub variants: Vec<KeyVariant>,
    #[serde(default)]
    pub key_prefixes: Vec<KeyPrefix>,
}

impl KeyDescriptor {
    pub fn primary(index_name: impl Into<String>, fields: Vec<KeyFieldRef>) -> Self {
        Self::new(None, index_name, fields, true)
    }

    pub fn secondary(index_id: Option<u32>, index_name: impl Into<String>, fields: Vec<KeyFieldRef>) -> Self {
        Self::new(index_id, index_name, fields, false)
    }

    fn new(index_id: Option<u32>, index_name: impl Into<String>, fields: Vec<KeyFieldRef>, primary: bool) -> Self {
        Self {
            index_id,
            index_name: index_name.into(),
            fields,
            primary,
            resolved: Vec::new(),
            variants: Vec::new(),
            key_prefixes: Vec::new(),
        }
    }

    /// The fully expanded variant (every trailing record replaced by its fields)
    pub fn maximal_variant(&self) -> Option<&KeyVariant> {
        self.variants.last()
    }
}

/// Canonical name of a field list: `_`-joined short names
pub fn canonical_name(fields: &[ResolvedField]) -> String {
    fields
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join("_")
}
