//! Key-Value Store Schema Compiler
//!
//! Turns declarative schema modules (records, enums and composite sort keys of
//! an embedded ordered key-value store) into a fully resolved, frozen model
//! from which serialization and index code is generated.
//!
//! ## Features
//!
//! - **Type Parsing**: generic field types (`ss::vector<T, N>`, `ss::string<N>`,
//!   `std::optional<T>`, `std::variant<...>`) become a structured [`TypeExpr`]
//! - **Cross-Schema Resolution**: namespaced types load their database's module
//!   on demand, exactly once per [`SchemaContext`]
//! - **Key Expansion**: every key yields its expansion variants and all
//!   leading range-scan prefixes, cutting through nested records
//! - **Field Flattening**: dotted leaf catalog per record, annotated with the
//!   key usable for an indexed scan
//! - **Consistency Checks**: wire type ids and index ids are unique across the
//!   reachable schema set
//!
//! ## Architecture
//!
//! ```text
//! schemas/
//! ├── chdb.toml          SchemaModule (phase 1: declarations)
//! └── devdb.toml               │
//!                              ▼
//!                   SchemaRegistry::from_module
//!                              │
//!                              ▼
//!             SchemaContext::prepare (phase 2)
//!   resolve types → order records → resolve key paths
//!   → expand keys → flatten → check consistency
//!                              │
//!                              ▼
//!                   Arc<SchemaRegistry> (frozen)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use kvschema::{EmbeddedSource, SchemaContext};
//!
//! let mut ctx = SchemaContext::new(EmbeddedSource::bundled());
//! let devdb = ctx.load("devdb")?;
//! for record in devdb.records() {
//!     for key in &record.keys {
//!         for prefix in &key.key_prefixes {
//!             println!("{}::{} {}", record.name, key.index_name, prefix.name);
//!         }
//!     }
//! }
//! # Ok::<(), kvschema::SchemaError>(())
//! ```

pub mod checksum;
pub mod config;
pub mod context;
pub mod decl;
pub mod diagnostics;
pub mod error;
pub mod loader;
pub mod model;
pub mod registry;
pub mod types;

pub mod check;
mod flatten;
mod keys;
mod resolve;

pub use checksum::Checksum;
pub use config::{CompilerConfig, OutputFormat};
pub use context::{PrepareOptions, SchemaContext};
pub use decl::SchemaModule;
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use error::{Result, SchemaError};
pub use loader::{DirectorySource, EmbeddedSource, LoadConfig, MemorySource, ModuleSource, BUNDLED_SCHEMAS};
pub use model::{
    EnumDescriptor, EnumHandle, FieldDescriptor, KeyDescriptor, KeyPrefix, KeyVariant, ModuleId,
    RecordDescriptor, RecordHandle, Subfield, TypeTarget,
};
pub use registry::SchemaRegistry;
pub use types::{ScalarType, TypeExpr};
