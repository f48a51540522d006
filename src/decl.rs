//! Schema Module Declarations
//!
//! The unresolved, declarative form of one database schema module, as read
//! from a `<database>.toml` or `<database>.json` file. Nothing here refers to
//! other records by handle; that happens when the module is prepared.
//!
//! ## Example module (chdb.toml):
//! ```toml
//! includes = ["<neumodb/chdb/extra.h>"]
//!
//! [database]
//! name = "chdb"
//! tag = 0x01
//!
//! [[records]]
//! name = "mux_t"
//! file = "mux"
//! type_id = 0x21
//! version = 1
//! fields = [
//!   [1, "int16_t", "sat_pos", "sat_pos_none"],
//!   { id = 2, type = "uint32_t", name = "frequency" },
//! ]
//! primary_key = ["key", ["sat_pos", "frequency"]]
//! keys = [[1, "by_freq", ["frequency"]]]
//! ```
//!
//! Record fields are kept as raw values and decoded one at a time with
//! [`FieldDecl::from_value`], so a single malformed field can be reported on
//! its own instead of failing the whole document.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Result, SchemaError};
use crate::model::{EnumValue, KeyFieldRef};

/// One schema module: everything one database declares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaModule {
    pub database: DatabaseDecl,
    /// Raw foreign header dependencies passed through to the emitter
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub records: Vec<RecordDecl>,
}

/// Database registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseDecl {
    /// Namespace of every type in the module
    pub name: String,
    /// One-byte tag folded into every wire type id
    pub tag: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    #[serde(default = "default_enum_storage")]
    pub storage: String,
    pub type_id: u32,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub file: Option<String>,
    pub values: Vec<EnumValueDecl>,
}

/// An enum value: bare name, `(name, value)`, `(name, value, display)` or a table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValueDecl {
    Name(String),
    Pair(String, ValueLiteral),
    Triple(String, ValueLiteral, String),
    Table {
        name: String,
        #[serde(default)]
        value: Option<ValueLiteral>,
        #[serde(default)]
        display: Option<String>,
    },
}

impl EnumValueDecl {
    pub fn parts(&self) -> (&str, Option<EnumValue>, Option<&str>) {
        match self {
            EnumValueDecl::Name(name) => (name.as_str(), None, None),
            EnumValueDecl::Pair(name, v) => (name.as_str(), Some(v.to_value()), None),
            EnumValueDecl::Triple(name, v, display) => {
                (name.as_str(), Some(v.to_value()), Some(display.as_str()))
            }
            EnumValueDecl::Table { name, value, display } => (
                name.as_str(),
                value.as_ref().map(ValueLiteral::to_value),
                display.as_deref(),
            ),
        }
    }
}

/// Literal enum value as written: integer or text (numeric or symbolic)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueLiteral {
    Int(i64),
    Text(String),
}

impl ValueLiteral {
    pub fn to_value(&self) -> EnumValue {
        match self {
            ValueLiteral::Int(n) => EnumValue::Number(*n),
            ValueLiteral::Text(s) => EnumValue::parse(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDecl {
    pub name: String,
    #[serde(default)]
    pub file: Option<String>,
    pub type_id: u32,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Raw field declarations, decoded individually
    #[serde(default)]
    pub fields: Vec<Value>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKeyDecl>,
    #[serde(default)]
    pub keys: Vec<KeyDecl>,
    #[serde(default)]
    pub filter_fields: Vec<String>,
}

/// `(label, field_path_tuple)` or a table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeyDecl {
    Tuple(String, Vec<KeyFieldDecl>),
    Table { name: String, fields: Vec<KeyFieldDecl> },
}

impl PrimaryKeyDecl {
    pub fn parts(&self) -> (&str, Vec<KeyFieldRef>) {
        match self {
            PrimaryKeyDecl::Tuple(name, fields) | PrimaryKeyDecl::Table { name, fields } => {
                (name.as_str(), fields.iter().map(KeyFieldDecl::to_ref).collect())
            }
        }
    }
}

/// `(index_id, index_name, field_path_tuple)` or a table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyDecl {
    Tuple(Option<u32>, String, Vec<KeyFieldDecl>),
    Table {
        #[serde(default)]
        id: Option<u32>,
        name: String,
        fields: Vec<KeyFieldDecl>,
    },
}

impl KeyDecl {
    pub fn parts(&self) -> (Option<u32>, &str, Vec<KeyFieldRef>) {
        match self {
            KeyDecl::Tuple(id, name, fields) | KeyDecl::Table { id, name, fields } => {
                (*id, name.as_str(), fields.iter().map(KeyFieldDecl::to_ref).collect())
            }
        }
    }
}

/// A key field: dotted path, optionally with a comparison transform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyFieldDecl {
    Path(String),
    Transformed {
        path: String,
        #[serde(default)]
        transform: Option<String>,
    },
}

impl KeyFieldDecl {
    pub fn to_ref(&self) -> KeyFieldRef {
        match self {
            KeyFieldDecl::Path(path) => KeyFieldRef::new(path.as_str()),
            KeyFieldDecl::Transformed { path, transform } => KeyFieldRef {
                path: path.clone(),
                transform: transform.clone(),
            },
        }
    }
}

/// A decoded field declaration `(field_id, type_string, name, default?)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub id: u32,
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
}

impl FieldDecl {
    /// Decode one raw field declaration, tuple or table form
    pub fn from_value(value: &Value) -> std::result::Result<FieldDecl, String> {
        let decl = match value {
            Value::Array(items) => {
                if !(3..=4).contains(&items.len()) {
                    return Err(format!(
                        "expected (field_id, type, name[, default]), got {} elements",
                        items.len()
                    ));
                }
                let id = items[0]
                    .as_u64()
                    .ok_or_else(|| format!("field id {} is not a non-negative integer", items[0]))?;
                let id = u32::try_from(id).map_err(|_| format!("field id {} out of range", id))?;
                let ty = items[1]
                    .as_str()
                    .ok_or_else(|| format!("field type {} is not a string", items[1]))?;
                let name = items[2]
                    .as_str()
                    .ok_or_else(|| format!("field name {} is not a string", items[2]))?;
                let default = match items.get(3) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                };
                FieldDecl {
                    id,
                    ty: ty.to_string(),
                    name: name.to_string(),
                    default,
                }
            }
            Value::Object(_) => {
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?
            }
            other => return Err(format!("unexpected field declaration {}", other)),
        };

        if decl.ty.trim().is_empty() {
            return Err(format!("field '{}' has an empty type", decl.name));
        }
        if !is_identifier(&decl.name) {
            return Err(format!("field name '{}' is not an identifier", decl.name));
        }
        Ok(decl)
    }
}

/// C-style identifier check for field, record and key names
pub fn is_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
        .is_match(name)
}

fn default_enum_storage() -> String {
    "uint8_t".to_string()
}

fn default_version() -> u32 {
    1
}

impl SchemaModule {
    /// Parse a module from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Parse a module from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a module, choosing the format from the file extension
    pub fn from_path_text(path: &Path, text: &str) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(text),
            Some("json") => Self::from_json(text),
            _ => Err(SchemaError::InvalidFormat(format!(
                "unsupported schema module file {}",
                path.display()
            ))),
        }
    }

    /// Namespaces named by field types in this module, in first-use order
    pub fn referenced_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = Vec::new();
        for record in &self.records {
            for raw in &record.fields {
                let Ok(field) = FieldDecl::from_value(raw) else {
                    continue;
                };
                crate::types::TypeExpr::parse(&field.ty).for_each_scalar(&mut |s| {
                    if let Some(ns) = &s.namespace {
                        if *ns != self.database.name && !namespaces.contains(ns) {
                            namespaces.push(ns.clone());
                        }
                    }
                });
            }
        }
        namespaces
    }
}
