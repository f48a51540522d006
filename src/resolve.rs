//! Cross-Schema Resolution
//!
//! Fixes up every field type of a registry: a name is looked up in the local
//! registry first, then in the prepared module of its namespace. Names with no
//! owning registry stay opaque built-in scalars. Also resolves dotted key and
//! filter paths and derives record order and variable-size flags.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::context::{Lookup, SchemaContext};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchemaError};
use crate::model::{RecordDescriptor, RecordHandle, ResolvedField, TypeTarget};
use crate::registry::SchemaRegistry;
use crate::types::{ScalarType, TypeExpr};

/// Record or enum named `name` in a registry
pub(crate) fn target_in(registry: &SchemaRegistry, name: &str) -> Option<TypeTarget> {
    if let Some(handle) = registry.record_handle(name) {
        return Some(TypeTarget::record(handle, registry.namespace(), name));
    }
    registry
        .enum_handle(name)
        .map(|handle| TypeTarget::enumeration(handle, registry.namespace(), name))
}

// =============================================================================
// Type Resolution
// =============================================================================

fn resolve_scalar(
    ctx: &SchemaContext,
    local: &SchemaRegistry,
    subject: &str,
    scalar: &ScalarType,
    diagnostics: &mut Diagnostics,
) -> Option<TypeTarget> {
    let Some(namespace) = scalar.namespace.as_deref() else {
        // Unqualified names not declared locally are built-ins
        return target_in(local, &scalar.name);
    };

    let owner = if namespace == local.namespace() {
        Some(local)
    } else {
        ctx.module(namespace).map(|m| m.as_ref())
    };

    match owner {
        Some(registry) => {
            let target = target_in(registry, &scalar.name);
            if target.is_none() {
                warn!(record = subject, namespace, name = %scalar.name, "type missing from its database");
                diagnostics.missing_foreign_type(subject, namespace, &scalar.name);
            }
            target
        }
        None => {
            diagnostics.opaque_type(subject, &format!("{}::{}", namespace, scalar.name));
            None
        }
    }
}

/// Re-parse every field type from its declared text and resolve the names in it
pub(crate) fn resolve_types(ctx: &SchemaContext, registry: &mut SchemaRegistry) -> Result<()> {
    let mut diagnostics = Diagnostics::new();
    let mut resolved: Vec<Vec<TypeExpr>> = Vec::with_capacity(registry.records().len());
    let mut externals: Vec<RecordDescriptor> = Vec::new();
    let mut seen: HashSet<RecordHandle> = HashSet::new();

    {
        let local: &SchemaRegistry = registry;
        let lookup = ctx.lookup(local);
        for record in local.records() {
            let subject = record.qualified_name();
            let mut types = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let mut ty = TypeExpr::parse(&field.type_text);
                ty.for_each_scalar_mut(&mut |s| {
                    s.target = resolve_scalar(ctx, local, &subject, s, &mut diagnostics);
                });
                ty.for_each_scalar(&mut |s| {
                    let Some(handle) = s.target.as_ref().and_then(TypeTarget::record_handle) else {
                        return;
                    };
                    if handle.module != local.module_id() && seen.insert(handle) {
                        let mut copy = lookup.record(handle).clone();
                        copy.is_external = true;
                        externals.push(copy);
                    }
                });
                types.push(ty);
            }
            resolved.push(types);
        }
    }

    for (record, types) in registry.records.iter_mut().zip(resolved) {
        for (field, ty) in record.fields.iter_mut().zip(types) {
            field.ty = ty;
        }
    }
    registry.externals = externals;
    registry.diagnostics.append(&mut diagnostics);
    Ok(())
}

// =============================================================================
// Record Order and Sizes
// =============================================================================

/// Local records a type contains by value (sequences are stored out of line)
fn contained_records(ty: &TypeExpr, out: &mut Vec<RecordHandle>) {
    match ty {
        TypeExpr::Scalar(s) => out.extend(s.target.as_ref().and_then(TypeTarget::record_handle)),
        TypeExpr::Optional { element } => contained_records(element, out),
        TypeExpr::Variant { alternatives } => {
            for alt in alternatives {
                contained_records(alt, out);
            }
        }
        TypeExpr::Vector { .. } | TypeExpr::FixedString { .. } | TypeExpr::ByteBuffer { .. } => {}
    }
}

fn variable_size(ty: &TypeExpr, record_size: &dyn Fn(RecordHandle) -> bool) -> bool {
    match ty {
        TypeExpr::FixedString { .. }
        | TypeExpr::ByteBuffer { .. }
        | TypeExpr::Vector { .. }
        | TypeExpr::Variant { .. } => true,
        TypeExpr::Optional { element } => variable_size(element, record_size),
        TypeExpr::Scalar(s) => s
            .target
            .as_ref()
            .and_then(TypeTarget::record_handle)
            .map(record_size)
            .unwrap_or(false),
    }
}

/// Order local records so that every record comes after the records it
/// contains by value, and compute `has_variable_size` in that order.
///
/// Returns the record indices in that order.
pub(crate) fn order_records(ctx: &SchemaContext, registry: &mut SchemaRegistry) -> Result<Vec<usize>> {
    let module = registry.module_id();
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<_> = (0..registry.records().len()).map(|i| graph.add_node(i)).collect();

    for (i, record) in registry.records().iter().enumerate() {
        let mut contained = Vec::new();
        for field in &record.fields {
            contained_records(&field.ty, &mut contained);
        }
        for handle in contained.into_iter().filter(|h| h.module == module) {
            graph.update_edge(nodes[handle.index], nodes[i], ());
        }
    }

    let order: Vec<usize> = match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(|n| graph[n]).collect(),
        Err(cycle) => {
            let record = &registry.records()[graph[cycle.node_id()]];
            return Err(SchemaError::RecursiveRecord(record.qualified_name()));
        }
    };

    for &index in &order {
        let sizes: Vec<bool> = {
            let local: &SchemaRegistry = registry;
            let record_size = |h: RecordHandle| {
                if h.module == module {
                    local.records()[h.index].has_variable_size
                } else {
                    ctx.record(h).map(|r| r.has_variable_size).unwrap_or(false)
                }
            };
            local.records()[index]
                .fields
                .iter()
                .map(|f| variable_size(&f.ty, &record_size))
                .collect()
        };

        let record = &mut registry.records[index];
        for (field, variable) in record.fields.iter_mut().zip(&sizes) {
            field.has_variable_size = *variable;
        }
        record.has_variable_size = sizes.iter().any(|&v| v);
    }

    Ok(order)
}

// =============================================================================
// Field Paths
// =============================================================================

fn suggest(candidates: &[&str], missing: &str) -> Option<String> {
    let matcher = SkimMatcherV2::default();
    candidates
        .iter()
        .filter_map(|c| matcher.fuzzy_match(c, missing).map(|score| (score, *c)))
        .max_by_key(|(score, _)| *score)
        .map(|(_, c)| c.to_string())
}

/// Resolve a dotted field path (`k.mux.sat_pos`) against a record
pub(crate) fn resolve_path(lookup: &Lookup<'_>, record: &RecordDescriptor, path: &str) -> Result<ResolvedField> {
    let unresolved = |candidates: &[&str], segment: &str| SchemaError::UnresolvedFieldPath {
        record: record.qualified_name(),
        path: path.to_string(),
        suggestion: suggest(candidates, segment),
    };

    let mut segments = path.split('.');
    let first = segments.next().unwrap_or_default();
    let field = record
        .field(first)
        .ok_or_else(|| unresolved(&field_names(record), first))?;
    let mut current = ResolvedField::top_level(field);

    for segment in segments {
        let Some(inner) = lookup.record_of(&current.ty) else {
            return Err(unresolved(&[], segment));
        };
        let field = inner
            .field(segment)
            .ok_or_else(|| unresolved(&field_names(inner), segment))?;
        current = current.child(field);
    }

    Ok(current)
}

fn field_names(record: &RecordDescriptor) -> Vec<&str> {
    record.fields.iter().map(|f| f.name.as_str()).collect()
}

/// Resolve every key field path and validate filter fields
pub(crate) fn resolve_key_paths(ctx: &SchemaContext, registry: &mut SchemaRegistry) -> Result<()> {
    let mut resolved: Vec<Vec<Vec<ResolvedField>>> = Vec::with_capacity(registry.records().len());
    {
        let lookup = ctx.lookup(registry);
        for record in registry.records() {
            let mut keys = Vec::with_capacity(record.keys.len());
            for key in &record.keys {
                let fields = key
                    .fields
                    .iter()
                    .map(|kf| {
                        let mut field = resolve_path(&lookup, record, &kf.path)?;
                        field.transform = kf.transform.clone();
                        Ok(field)
                    })
                    .collect::<Result<Vec<_>>>()?;
                keys.push(fields);
            }
            for filter in &record.filter_fields {
                resolve_path(&lookup, record, filter)?;
            }
            debug!(record = %record.qualified_name(), keys = keys.len(), "key paths resolved");
            resolved.push(keys);
        }
    }

    for (record, keys) in registry.records.iter_mut().zip(resolved) {
        for (key, fields) in record.keys.iter_mut().zip(keys) {
            key.resolved = fields;
        }
    }
    Ok(())
}
