//! Schema Context
//!
//! Owns every prepared schema module of one build invocation and runs the
//! two-phase build:
//!
//! 1. **Declarations**: a module is decoded from its [`ModuleSource`] and its
//!    records and enums are registered ([`SchemaRegistry::from_module`]).
//! 2. **Preparation**: the databases its field types name are loaded first,
//!    then the passes run in order: type resolution, record ordering and
//!    sizes, key path resolution, key expansion, flattening, consistency
//!    check. The prepared registry is frozen behind an `Arc`.
//!
//! Prepared modules live in an arena addressed by [`ModuleId`]; records and
//! enums are referenced by handle into it. Loading is memoized by module name,
//! so a module is read and prepared exactly once per context and every lookup
//! returns the same shared registry.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::CompilerConfig;
use crate::decl::SchemaModule;
use crate::error::{Result, SchemaError};
use crate::loader::ModuleSource;
use crate::model::{EnumDescriptor, EnumHandle, ModuleId, RecordDescriptor, RecordHandle, TypeTarget};
use crate::registry::SchemaRegistry;
use crate::types::TypeExpr;
use crate::{check, flatten, keys, resolve};

/// Options for preparing modules
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Fail on malformed field declarations instead of skipping them
    pub strict_fields: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self { strict_fields: true }
    }
}

impl From<&CompilerConfig> for PrepareOptions {
    fn from(config: &CompilerConfig) -> Self {
        Self {
            strict_fields: config.compiler.strict_fields,
        }
    }
}

/// Read-only view used by the passes: the registry being prepared plus
/// every module already frozen in the arena
pub(crate) struct Lookup<'a> {
    pub local: &'a SchemaRegistry,
    pub modules: &'a [Arc<SchemaRegistry>],
}

impl<'a> Lookup<'a> {
    pub fn registry(&self, id: ModuleId) -> &'a SchemaRegistry {
        if id == self.local.module_id() {
            self.local
        } else {
            &self.modules[id.0]
        }
    }

    pub fn record(&self, handle: RecordHandle) -> &'a RecordDescriptor {
        &self.registry(handle.module).records()[handle.index]
    }

    /// The record a type names by value, if any
    pub fn record_of(&self, ty: &TypeExpr) -> Option<&'a RecordDescriptor> {
        ty.target().and_then(TypeTarget::record_handle).map(|h| self.record(h))
    }
}

/// Build context: module source, arena of prepared modules and their graph
pub struct SchemaContext {
    source: Box<dyn ModuleSource>,
    options: PrepareOptions,
    modules: Vec<Arc<SchemaRegistry>>,
    by_name: HashMap<String, ModuleId>,
    /// Modules currently being loaded, outermost first
    loading: Vec<String>,
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl SchemaContext {
    pub fn new(source: impl ModuleSource + 'static) -> Self {
        Self::with_options(source, PrepareOptions::default())
    }

    pub fn with_options(source: impl ModuleSource + 'static, options: PrepareOptions) -> Self {
        Self::from_source(Box::new(source), options)
    }

    pub fn from_source(source: Box<dyn ModuleSource>, options: PrepareOptions) -> Self {
        Self {
            source,
            options,
            modules: Vec::new(),
            by_name: HashMap::new(),
            loading: Vec::new(),
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    // ========== Loading ==========

    /// Load and prepare a module, or return the cached one
    pub fn load(&mut self, name: &str) -> Result<Arc<SchemaRegistry>> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(Arc::clone(&self.modules[id.0]));
        }

        if let Some(pos) = self.loading.iter().position(|m| m == name) {
            let mut cycle = self.loading[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(SchemaError::CircularDependency(cycle));
        }

        self.loading.push(name.to_string());
        let result = self.load_uncached(name);
        self.loading.pop();
        result
    }

    /// Load every module the source provides
    pub fn load_all(&mut self) -> Result<Vec<Arc<SchemaRegistry>>> {
        self.source
            .modules()
            .iter()
            .map(|name| self.load(name))
            .collect()
    }

    fn load_uncached(&mut self, name: &str) -> Result<Arc<SchemaRegistry>> {
        info!(module = name, "loading schema module");
        let module = self.source.load(name)?;
        if module.database.name != name {
            return Err(SchemaError::ModuleMismatch {
                module: name.to_string(),
                declared: module.database.name.clone(),
            });
        }

        let mut registry = SchemaRegistry::from_module(&module, self.options.strict_fields)?;
        registry.dependencies = self.load_dependencies(&module)?;
        self.prepare(&mut registry)?;

        // Only modules that prepared take part in the dependency graph
        let from = self.node(name);
        for dep in registry.dependencies() {
            let to = self.node(dep);
            self.graph.update_edge(from, to, ());
        }

        let id = registry.module_id();
        debug_assert_eq!(id.0, self.modules.len());
        let registry = Arc::new(registry);
        self.modules.push(Arc::clone(&registry));
        self.by_name.insert(name.to_string(), id);
        info!(
            module = name,
            id = %id,
            records = registry.records().len(),
            "schema module prepared"
        );
        Ok(registry)
    }

    /// Load every known database the module's field types refer to and return
    /// their names in first-use order
    pub fn load_dependencies(&mut self, module: &SchemaModule) -> Result<Vec<String>> {
        let deps: Vec<String> = module
            .referenced_namespaces()
            .into_iter()
            .filter(|ns| self.source.contains(ns))
            .collect();

        for dep in &deps {
            debug!(module = %module.database.name, dependency = %dep, "loading dependency");
            self.load(dep)?;
        }
        Ok(deps)
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    // ========== Preparation ==========

    /// Run every preparation pass over a registry whose dependencies are loaded.
    ///
    /// Each pass overwrites its outputs, so preparing the same registry again
    /// produces an identical model.
    pub fn prepare(&self, registry: &mut SchemaRegistry) -> Result<()> {
        registry.module_id = self
            .by_name
            .get(registry.namespace())
            .copied()
            .unwrap_or(ModuleId(self.modules.len()));
        registry.diagnostics = registry.declaration_diagnostics().clone();

        debug!(module = registry.namespace(), "resolving types");
        resolve::resolve_types(self, registry)?;
        let order = resolve::order_records(self, registry)?;
        debug!(module = registry.namespace(), "resolving key paths");
        resolve::resolve_key_paths(self, registry)?;
        debug!(module = registry.namespace(), "expanding keys");
        keys::expand_keys(self, registry);
        debug!(module = registry.namespace(), "flattening records");
        flatten::flatten_records(self, registry, &order);
        check::check_consistency(self, registry)?;

        registry.prepared = true;
        Ok(())
    }

    pub(crate) fn lookup<'a>(&'a self, local: &'a SchemaRegistry) -> Lookup<'a> {
        Lookup {
            local,
            modules: &self.modules,
        }
    }

    // ========== Queries ==========

    /// A prepared module, if it has been loaded
    pub fn module(&self, name: &str) -> Option<&Arc<SchemaRegistry>> {
        self.by_name.get(name).map(|id| &self.modules[id.0])
    }

    pub fn registry(&self, id: ModuleId) -> Option<&Arc<SchemaRegistry>> {
        self.modules.get(id.0)
    }

    /// Prepared modules in load order (dependencies first)
    pub fn modules(&self) -> &[Arc<SchemaRegistry>] {
        &self.modules
    }

    pub fn source(&self) -> &dyn ModuleSource {
        self.source.as_ref()
    }

    pub fn record(&self, handle: RecordHandle) -> Option<&RecordDescriptor> {
        self.registry(handle.module)?.records().get(handle.index)
    }

    pub fn enumeration(&self, handle: EnumHandle) -> Option<&EnumDescriptor> {
        self.registry(handle.module)?.enums().get(handle.index)
    }

    /// Resolve a namespaced type name (`chdb::mux_t`), loading its module on
    /// demand. Names without an owning database resolve to `None`.
    pub fn resolve_type(&mut self, qualified: &str) -> Result<Option<TypeTarget>> {
        let TypeExpr::Scalar(scalar) = TypeExpr::parse(qualified) else {
            return Ok(None);
        };
        let Some(namespace) = scalar.namespace else {
            return Ok(None);
        };
        if !self.source.contains(&namespace) {
            return Ok(None);
        }

        let registry = self.load(&namespace)?;
        Ok(resolve::target_in(&registry, &scalar.name))
    }

    /// Module dependency graph in Graphviz DOT format
    pub fn dependency_dot(&self) -> String {
        let mut out = String::from("digraph schemas {\n    rankdir=LR;\n");
        let mut names: Vec<&String> = self.graph.node_weights().collect();
        names.sort();
        for name in &names {
            let _ = writeln!(out, "    \"{}\";", name);
        }
        let mut edges: Vec<(&String, &String)> = self
            .graph
            .raw_edges()
            .iter()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()]))
            .collect();
        edges.sort();
        for (from, to) in edges {
            let _ = writeln!(out, "    \"{}\" -> \"{}\";", from, to);
        }
        out.push_str("}\n");
        out
    }
}
