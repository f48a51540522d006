//! Schema Model
//!
//! Descriptors for records, enums, fields and keys. Descriptors are built by
//! the registry from declarations, completed by the preparation passes and
//! frozen behind an `Arc` once their module is prepared.
//!
//! Records and enums never point at each other directly. A resolved type
//! reference is a [`TypeTarget`]: an integer handle into the module arena of
//! the [`SchemaContext`](crate::SchemaContext) plus the namespace and name it
//! was resolved from, so mutual references need no reference cycles.

pub mod enums;
pub mod field;
pub mod key;
pub mod record;

pub use enums::{EnumDescriptor, EnumEntry, EnumValue};
pub use field::{FieldDescriptor, ResolvedField, Subfield, SubstructRef};
pub use key::{canonical_name, KeyDescriptor, KeyFieldRef, KeyPrefix, KeyVariant};
pub use record::RecordDescriptor;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a prepared module in the context arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub usize);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of a record: module plus position in that module's record list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordHandle {
    pub module: ModuleId,
    pub index: usize,
}

/// Address of an enum: module plus position in that module's enum list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnumHandle {
    pub module: ModuleId,
    pub index: usize,
}

/// What a resolved type name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Record,
    Enum,
}

/// A resolved type reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeTarget {
    pub kind: TargetKind,
    pub module: ModuleId,
    pub index: usize,
    /// Database namespace that defines the type
    pub namespace: String,
    pub name: String,
}

impl TypeTarget {
    pub fn record(handle: RecordHandle, namespace: &str, name: &str) -> Self {
        Self {
            kind: TargetKind::Record,
            module: handle.module,
            index: handle.index,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn enumeration(handle: EnumHandle, namespace: &str, name: &str) -> Self {
        Self {
            kind: TargetKind::Enum,
            module: handle.module,
            index: handle.index,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_record(&self) -> bool {
        self.kind == TargetKind::Record
    }

    pub fn record_handle(&self) -> Option<RecordHandle> {
        self.is_record().then_some(RecordHandle {
            module: self.module,
            index: self.index,
        })
    }

    pub fn enum_handle(&self) -> Option<EnumHandle> {
        (self.kind == TargetKind::Enum).then_some(EnumHandle {
            module: self.module,
            index: self.index,
        })
    }

    /// `namespace::name`
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }
}
