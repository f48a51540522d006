//! Schema Registry
//!
//! One registry per database namespace. Holds the records and enums a schema
//! module declares, in declaration order, grouped by source file for emission.
//! A registry is built from a [`SchemaModule`], prepared by the
//! [`SchemaContext`](crate::SchemaContext) and then frozen behind an `Arc`.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::decl::{is_identifier, FieldDecl, SchemaModule};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchemaError};
use crate::model::{
    EnumDescriptor, EnumHandle, FieldDescriptor, KeyDescriptor, ModuleId, RecordDescriptor,
    RecordHandle,
};

/// Records and enums declared in one source file, in declaration order
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    pub name: String,
    pub records: Vec<usize>,
    pub enums: Vec<usize>,
}

/// All types of one database namespace
#[derive(Debug, Clone, Serialize)]
pub struct SchemaRegistry {
    #[serde(skip)]
    pub(crate) module_id: ModuleId,
    namespace: String,
    tag: u8,
    includes: Vec<String>,
    pub(crate) records: Vec<RecordDescriptor>,
    enums: Vec<EnumDescriptor>,
    files: Vec<SourceFile>,
    /// Foreign records used by this module, flagged `is_external`
    pub(crate) externals: Vec<RecordDescriptor>,
    /// Databases this module's field types refer to
    pub(crate) dependencies: Vec<String>,
    #[serde(skip)]
    record_index: HashMap<String, usize>,
    #[serde(skip)]
    enum_index: HashMap<String, usize>,
    /// Findings from reading the declarations
    #[serde(skip)]
    declaration_diagnostics: Diagnostics,
    #[serde(skip)]
    pub(crate) diagnostics: Diagnostics,
    #[serde(skip)]
    pub(crate) prepared: bool,
}

impl SchemaRegistry {
    pub fn new(namespace: &str, tag: u8) -> Self {
        Self {
            module_id: ModuleId(0),
            namespace: namespace.to_string(),
            tag,
            includes: Vec::new(),
            records: Vec::new(),
            enums: Vec::new(),
            files: Vec::new(),
            externals: Vec::new(),
            dependencies: Vec::new(),
            record_index: HashMap::new(),
            enum_index: HashMap::new(),
            declaration_diagnostics: Diagnostics::new(),
            diagnostics: Diagnostics::new(),
            prepared: false,
        }
    }

    /// Build an unprepared registry from a module's declarations.
    ///
    /// With `strict_fields`, a malformed field declaration fails the module.
    /// Otherwise the field is skipped with a warning and a diagnostic.
    pub fn from_module(module: &SchemaModule, strict_fields: bool) -> Result<Self> {
        let db = &module.database;
        let mut registry = SchemaRegistry::new(&db.name, db.tag);
        for include in &module.includes {
            registry.add_include(include.as_str());
        }

        for decl in &module.enums {
            let file = decl.file.as_deref().unwrap_or(&db.name);
            let mut e = EnumDescriptor::new(&decl.name, &db.name, file, &decl.storage, decl.type_id, decl.version);
            for value in &decl.values {
                let (name, value, display) = value.parts();
                e.add_entry(name, value, display)?;
            }
            registry.add_enum(e)?;
        }

        for decl in &module.records {
            let file = decl.file.as_deref().unwrap_or(&db.name);
            let mut record = RecordDescriptor::new(&decl.name, &db.name, file, decl.type_id, decl.version);

            for raw in &decl.fields {
                let added = FieldDecl::from_value(raw)
                    .map_err(|reason| SchemaError::MalformedField {
                        record: record.qualified_name(),
                        reason,
                    })
                    .and_then(|f| record.add_field(FieldDescriptor::new(f.id, &f.ty, &f.name, f.default)));

                match added {
                    Ok(()) => {}
                    Err(SchemaError::MalformedField { record: subject, reason }) if !strict_fields => {
                        warn!(record = %subject, %reason, "skipping malformed field declaration");
                        registry.declaration_diagnostics.skipped_field(&subject, &reason);
                    }
                    Err(e) => return Err(e),
                }
            }

            if let Some(pk) = &decl.primary_key {
                let (name, fields) = pk.parts();
                record.add_key(KeyDescriptor::primary(name, fields))?;
            }
            for key in &decl.keys {
                let (id, name, fields) = key.parts();
                record.add_key(KeyDescriptor::secondary(id, name, fields))?;
            }
            record.filter_fields = decl.filter_fields.clone();

            registry.add_record(record)?;
        }

        debug!(
            namespace = %registry.namespace,
            records = registry.records.len(),
            enums = registry.enums.len(),
            "registry built"
        );
        Ok(registry)
    }

    /// Register a record; names are unique across records and enums
    pub fn add_record(&mut self, record: RecordDescriptor) -> Result<usize> {
        self.check_new_name("record", &record.name)?;
        let index = self.records.len();
        self.record_index.insert(record.name.clone(), index);
        self.source_file(&record.file).records.push(index);
        self.records.push(record);
        Ok(index)
    }

    /// Register an enum; names are unique across records and enums
    pub fn add_enum(&mut self, e: EnumDescriptor) -> Result<usize> {
        self.check_new_name("enum", &e.name)?;
        let index = self.enums.len();
        self.enum_index.insert(e.name.clone(), index);
        self.source_file(&e.file).enums.push(index);
        self.enums.push(e);
        Ok(index)
    }

    /// Raw foreign header dependency, passed through verbatim
    pub fn add_include(&mut self, include: impl Into<String>) {
        self.includes.push(include.into());
    }

    fn check_new_name(&self, kind: &'static str, name: &str) -> Result<()> {
        if !is_identifier(name) {
            return Err(SchemaError::InvalidFormat(format!(
                "{} name '{}' in database {} is not an identifier",
                kind, name, self.namespace
            )));
        }
        if self.record_index.contains_key(name) || self.enum_index.contains_key(name) {
            return Err(SchemaError::DuplicateName {
                kind,
                name: name.to_string(),
                namespace: self.namespace.clone(),
            });
        }
        Ok(())
    }

    fn source_file(&mut self, name: &str) -> &mut SourceFile {
        let pos = match self.files.iter().position(|f| f.name == name) {
            Some(pos) => pos,
            None => {
                self.files.push(SourceFile {
                    name: name.to_string(),
                    records: Vec::new(),
                    enums: Vec::new(),
                });
                self.files.len() - 1
            }
        };
        &mut self.files[pos]
    }

    // ========== Accessors ==========

    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn records(&self) -> &[RecordDescriptor] {
        &self.records
    }

    pub fn enums(&self) -> &[EnumDescriptor] {
        &self.enums
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn externals(&self) -> &[RecordDescriptor] {
        &self.externals
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Declaration findings plus findings of the last preparation
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn declaration_diagnostics(&self) -> &Diagnostics {
        &self.declaration_diagnostics
    }

    pub fn record(&self, name: &str) -> Option<&RecordDescriptor> {
        self.record_index.get(name).map(|&i| &self.records[i])
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enum_index.get(name).map(|&i| &self.enums[i])
    }

    pub fn record_handle(&self, name: &str) -> Option<RecordHandle> {
        self.record_index.get(name).map(|&index| RecordHandle {
            module: self.module_id,
            index,
        })
    }

    pub fn enum_handle(&self, name: &str) -> Option<EnumHandle> {
        self.enum_index.get(name).map(|&index| EnumHandle {
            module: self.module_id,
            index,
        })
    }

    /// Records of each source file, files in first-declaration order
    pub fn grouped_records(&self) -> Vec<(&str, Vec<&RecordDescriptor>)> {
        self.files
            .iter()
            .map(|f| (f.name.as_str(), f.records.iter().map(|&i| &self.records[i]).collect()))
            .collect()
    }

    /// SHA256 over the canonical JSON of the model
    pub fn fingerprint(&self) -> Result<Checksum> {
        Ok(Checksum::from_json(&serde_json::to_value(self)?))
    }
}
