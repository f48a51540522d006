//! Enum descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SchemaError};

/// Numeric or symbolic enum value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValue {
    Number(i64),
    /// Symbolic literal plus an offset from it (`FE_BASE + 2`)
    Symbol { base: String, offset: i64 },
}

impl EnumValue {
    /// Parse a declared value: decimal or `0x` hex numbers, anything else is symbolic
    pub fn parse(text: &str) -> EnumValue {
        let t = text.trim();
        let (sign, digits) = match t.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", t),
        };
        let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(&format!("{}{}", sign, hex), 16).ok(),
            None => t.parse::<i64>().ok(),
        };
        match parsed {
            Some(n) => EnumValue::Number(n),
            None => EnumValue::Symbol {
                base: t.to_string(),
                offset: 0,
            },
        }
    }

    /// The value an undeclared successor entry takes, `None` past `i64::MAX`
    pub fn successor(&self) -> Option<EnumValue> {
        match self {
            EnumValue::Number(n) => n.checked_add(1).map(EnumValue::Number),
            EnumValue::Symbol { base, offset } => offset.checked_add(1).map(|offset| EnumValue::Symbol {
                base: base.clone(),
                offset,
            }),
        }
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumValue::Number(n) => write!(f, "{}", n),
            EnumValue::Symbol { base, offset: 0 } => write!(f, "{}", base),
            EnumValue::Symbol { base, offset } => write!(f, "{} + {}", base, offset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    pub name: String,
    pub value: EnumValue,
    pub display_name: String,
    #[serde(skip)]
    explicit_display: bool,
}

/// An enumeration with a fixed storage width
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub namespace: String,
    pub file: String,
    /// Storage type, e.g. `uint8_t`
    pub storage: String,
    pub type_id: u32,
    pub version: u32,
    pub entries: Vec<EnumEntry>,
}

impl EnumDescriptor {
    pub fn new(name: &str, namespace: &str, file: &str, storage: &str, type_id: u32, version: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            file: file.to_string(),
            storage: storage.to_string(),
            type_id,
            version,
            entries: Vec::new(),
        }
    }

    /// Append an entry. Without an explicit value the entry continues the
    /// sequence of the previous one (starting at 0).
    pub fn add_entry(&mut self, name: &str, value: Option<EnumValue>, display_name: Option<&str>) -> Result<()> {
        let value = match (value, self.entries.last()) {
            (Some(value), _) => value,
            (None, None) => EnumValue::Number(0),
            (None, Some(prev)) => prev.value.successor().ok_or_else(|| {
                SchemaError::InvalidFormat(format!(
                    "enum {}: value of entry '{}' overflows after {} = {}",
                    self.qualified_name(),
                    name,
                    prev.name,
                    prev.value
                ))
            })?,
        };
        self.entries.push(EnumEntry {
            name: name.to_string(),
            value,
            display_name: display_name.unwrap_or(name).to_string(),
            explicit_display: display_name.is_some(),
        });
        self.derive_display_names();
        Ok(())
    }

    /// Short display names: entry names with the longest common prefix removed
    fn derive_display_names(&mut self) {
        let prefix_len = if self.entries.len() < 2 {
            0
        } else {
            let names: Vec<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
            common_prefix_len(&names)
        };
        for entry in self.entries.iter_mut().filter(|e| !e.explicit_display) {
            let short = &entry.name[prefix_len..];
            entry.display_name = if short.is_empty() {
                entry.name.clone()
            } else {
                short.to_string()
            };
        }
    }

    pub fn entry(&self, name: &str) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }
}

fn common_prefix_len(names: &[&str]) -> usize {
    let Some(first) = names.first() else {
        return 0;
    };
    let mut len = first.len();
    for name in &names[1..] {
        len = first
            .bytes()
            .zip(name.bytes())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    while !first.is_char_boundary(len) {
        len -= 1;
    }
    len
}
