//! Record descriptors and the record builder operations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{FieldDescriptor, KeyDescriptor, Subfield, SubstructRef};
use crate::error::{Result, SchemaError};

/// One serializable record type (a "table" if it has a primary key)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDescriptor {
    pub name: String,
    /// Database namespace
    pub namespace: String,
    /// Source grouping used for emission
    pub file: String,
    /// Declared type id, without the database tag
    pub type_id: u32,
    pub version: u32,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
    /// Primary key first, then secondary keys in declaration order
    pub keys: Vec<KeyDescriptor>,
    /// UI-only filterable columns
    #[serde(default)]
    pub filter_fields: Vec<String>,
    /// Copied in from a foreign schema module
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub has_variable_size: bool,
    /// Dotted path of every traversed record-typed field
    #[serde(default)]
    pub substructs: BTreeMap<String, SubstructRef>,
    /// Flattened leaf fields
    #[serde(default)]
    pub subfields: Vec<Subfield>,
}

impl RecordDescriptor {
    pub fn new(name: &str, namespace: &str, file: &str, type_id: u32, version: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            file: file.to_string(),
            type_id,
            version,
            fields: Vec::new(),
            keys: Vec::new(),
            filter_fields: Vec::new(),
            is_external: false,
            has_variable_size: false,
            substructs: BTreeMap::new(),
            subfields: Vec::new(),
        }
    }

    /// Add a field. Fields are identified by their wire id, so the id and the
    /// name must both be unique within the record.
    pub fn add_field(&mut self, field: FieldDescriptor) -> Result<()> {
        if let Some(existing) = self.fields.iter().find(|f| f.field_id == field.field_id) {
            return Err(SchemaError::MalformedField {
                record: self.name.clone(),
                reason: format!(
                    "field id {} used by both '{}' and '{}'",
                    field.field_id, existing.name, field.name
                ),
            });
        }
        if self.fields.iter().any(|f| f.name == field.name) {
            return Err(SchemaError::MalformedField {
                record: self.name.clone(),
                reason: format!("field name '{}' declared twice", field.name),
            });
        }
        self.fields.push(field);
        Ok(())
    }

    /// Add a key. A primary key is always placed first.
    pub fn add_key(&mut self, key: KeyDescriptor) -> Result<()> {
        if key.fields.is_empty() {
            return Err(SchemaError::InvalidFormat(format!(
                "key '{}' of record {} has no fields",
                key.index_name, self.name
            )));
        }
        if self.keys.iter().any(|k| k.index_name == key.index_name) {
            return Err(SchemaError::DuplicateName {
                kind: "key",
                name: format!("{}.{}", self.name, key.index_name),
                namespace: self.namespace.clone(),
            });
        }
        if key.primary {
            if self.primary_key().is_some() {
                return Err(SchemaError::InvalidFormat(format!(
                    "record {} declares more than one primary key",
                    self.name
                )));
            }
            self.keys.insert(0, key);
        } else {
            self.keys.push(key);
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_key(&self) -> Option<&KeyDescriptor> {
        self.keys.first().filter(|k| k.primary)
    }

    pub fn secondary_keys(&self) -> impl Iterator<Item = &KeyDescriptor> {
        self.keys.iter().filter(|k| !k.primary)
    }

    /// Records with a primary key are stored as tables
    pub fn is_table(&self) -> bool {
        self.primary_key().is_some()
    }

    /// Fields in on-wire order (by field id)
    pub fn wire_layout(&self) -> Vec<&FieldDescriptor> {
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.field_id);
        fields
    }

    /// Wire type id with the database tag folded into the high byte
    pub fn wire_type_id(&self, tag: u8) -> u64 {
        ((tag as u64) << 24) | self.type_id as u64
    }

    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }
}
