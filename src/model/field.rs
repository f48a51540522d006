//! Field descriptors

use serde::{Deserialize, Serialize};

use super::RecordHandle;
use crate::types::TypeExpr;

/// A declared record field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Stable wire tag, independent of declaration order
    pub field_id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    /// Type string as declared
    pub type_text: String,
    /// Default value expression, passed through to the emitter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Serialized size depends on the value
    pub has_variable_size: bool,
}

impl FieldDescriptor {
    pub fn new(field_id: u32, type_text: &str, name: &str, default: Option<String>) -> Self {
        Self {
            field_id,
            name: name.to_string(),
            ty: TypeExpr::parse(type_text),
            type_text: type_text.trim().to_string(),
            default,
            has_variable_size: false,
        }
    }
}

/// A field reached through a dotted path, as used in keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedField {
    /// Dotted path from the owning record (`k.mux.sat_pos`)
    pub path: String,
    /// Last path segment
    pub name: String,
    pub field_id: u32,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    /// Comparison-time transform (e.g. case folding)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl ResolvedField {
    /// Child field of this (record-typed) field, renamed with the full path.
    /// The child compares with the parent's transform.
    pub fn child(&self, field: &FieldDescriptor) -> ResolvedField {
        ResolvedField {
            path: format!("{}.{}", self.path, field.name),
            name: field.name.clone(),
            field_id: field.field_id,
            ty: field.ty.clone(),
            transform: self.transform.clone(),
        }
    }

    /// Top-level field of the owning record
    pub fn top_level(field: &FieldDescriptor) -> ResolvedField {
        ResolvedField {
            path: field.name.clone(),
            name: field.name.clone(),
            field_id: field.field_id,
            ty: field.ty.clone(),
            transform: None,
        }
    }
}

/// A flattened leaf field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subfield {
    /// Dotted path from the owning record
    pub path: String,
    pub name: String,
    pub field_id: u32,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    /// Local key whose variant covers this leaf, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Name of that key variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_variant: Option<String>,
}

/// A record-typed field traversed during flattening
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstructRef {
    pub namespace: String,
    pub name: String,
    pub record: RecordHandle,
}
