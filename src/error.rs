//! Error types for the schema compiler

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema compiler errors
///
/// Every variant is fatal for the module being prepared: there is no
/// partially prepared model.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Unresolved field path '{path}' in record {record}{}", suggestion_suffix(.suggestion))]
    UnresolvedFieldPath {
        record: String,
        path: String,
        suggestion: Option<String>,
    },

    #[error("Duplicate wire type id {id:#010x}: {first} and {second}")]
    DuplicateTypeId { id: u32, first: String, second: String },

    #[error("Invalid wire type id {id:#x} for {record}: {reason}")]
    InvalidTypeId { record: String, id: u64, reason: String },

    #[error("Duplicate index id {id}: {first} and {second}")]
    DuplicateIndexId { id: u32, first: String, second: String },

    #[error("Duplicate {kind} name '{name}' in database {namespace}")]
    DuplicateName {
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[error("Malformed field declaration in record {record}: {reason}")]
    MalformedField { record: String, reason: String },

    #[error("Schema module not found: {0}")]
    ModuleNotFound(String),

    #[error("Schema module {module} declares database '{declared}'")]
    ModuleMismatch { module: String, declared: String },

    #[error("Circular schema module dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("Record {0} contains itself by value")]
    RecursiveRecord(String),

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_path_message_names_record_and_path() {
        let err = SchemaError::UnresolvedFieldPath {
            record: "mux_t".into(),
            path: "k.frequncy".into(),
            suggestion: Some("frequency".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("mux_t"));
        assert!(msg.contains("k.frequncy"));
        assert!(msg.contains("did you mean 'frequency'"));
    }

    #[test]
    fn test_circular_dependency_message() {
        let err = SchemaError::CircularDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Circular schema module dependency: a -> b -> a");
    }
}
