//! Field Flattening
//!
//! Inlines every record-valued field into dotted leaf paths (`k.mux.sat_pos`)
//! and remembers, per traversed path, which record it refers to. Sequences,
//! optionals, tagged unions and byte buffers end flattening and are not
//! listed as leaves.
//!
//! Runs after key expansion: a leaf is annotated with the most specific local
//! key variant whose single field is the leaf or one of its ancestors.

use std::collections::BTreeMap;
use tracing::debug;

use crate::context::{Lookup, SchemaContext};
use crate::model::{FieldDescriptor, KeyDescriptor, KeyVariant, RecordDescriptor, Subfield, SubstructRef};
use crate::registry::SchemaRegistry;
use crate::types::TypeExpr;

/// Flattening result of one record
#[derive(Debug, Clone, Default)]
struct Flattened {
    substructs: BTreeMap<String, SubstructRef>,
    subfields: Vec<Subfield>,
}

fn is_leaf(ty: &TypeExpr) -> bool {
    matches!(ty, TypeExpr::Scalar(_) | TypeExpr::FixedString { .. })
}

fn leaf(field: &FieldDescriptor) -> Subfield {
    Subfield {
        path: field.name.clone(),
        name: field.name.clone(),
        field_id: field.field_id,
        ty: field.ty.clone(),
        key: None,
        key_variant: None,
    }
}

/// Flatten one record given the results of the local records it contains
fn flatten_record(lookup: &Lookup<'_>, record: &RecordDescriptor, done: &[Option<Flattened>]) -> Flattened {
    let local = lookup.local.module_id();
    let mut out = Flattened::default();

    for field in &record.fields {
        let Some((target, handle)) = field
            .ty
            .target()
            .and_then(|t| t.record_handle().map(|h| (t, h)))
        else {
            if is_leaf(&field.ty) {
                out.subfields.push(leaf(field));
            }
            continue;
        };

        // Local records are flattened before the records containing them;
        // prepared foreign records carry their own result
        let inner = if handle.module == local {
            done[handle.index].clone().unwrap_or_default()
        } else {
            let foreign = lookup.record(handle);
            Flattened {
                substructs: foreign.substructs.clone(),
                subfields: foreign.subfields.clone(),
            }
        };

        out.substructs.insert(
            field.name.clone(),
            SubstructRef {
                namespace: target.namespace.clone(),
                name: target.name.clone(),
                record: handle,
            },
        );
        for (path, sub) in inner.substructs {
            out.substructs.insert(format!("{}.{}", field.name, path), sub);
        }
        out.subfields.extend(inner.subfields.into_iter().map(|sub| Subfield {
            path: format!("{}.{}", field.name, sub.path),
            key: None,
            key_variant: None,
            ..sub
        }));
    }

    out
}

fn covers(ancestor: &str, path: &str) -> bool {
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Most specific local key variant for the leaf at `path`: a variant made of
/// exactly one field that is the leaf itself or one of its ancestors. The
/// deepest such field wins, ties go to the first declared key.
pub(crate) fn variant_for_leaf<'a>(
    keys: &'a [KeyDescriptor],
    path: &str,
) -> Option<(&'a KeyDescriptor, &'a KeyVariant)> {
    let mut best: Option<(usize, &KeyDescriptor, &KeyVariant)> = None;
    for key in keys {
        for variant in &key.variants {
            let [field] = variant.fields.as_slice() else {
                continue;
            };
            if !covers(&field.path, path) {
                continue;
            }
            let depth = field.path.split('.').count();
            if best.map_or(true, |(d, _, _)| depth > d) {
                best = Some((depth, key, variant));
            }
        }
    }
    best.map(|(_, key, variant)| (key, variant))
}

/// Flatten every local record (in containment order) and annotate its leaves
pub(crate) fn flatten_records(ctx: &SchemaContext, registry: &mut SchemaRegistry, order: &[usize]) {
    let mut done: Vec<Option<Flattened>> = vec![None; registry.records().len()];
    {
        let lookup = ctx.lookup(registry);
        for &index in order {
            if done[index].is_some() {
                continue;
            }
            let flattened = flatten_record(&lookup, &registry.records()[index], &done);
            done[index] = Some(flattened);
        }
    }

    for (record, flattened) in registry.records.iter_mut().zip(done) {
        let Flattened { substructs, mut subfields } = flattened.unwrap_or_default();
        for sub in &mut subfields {
            let matched = variant_for_leaf(&record.keys, &sub.path);
            sub.key = matched.map(|(key, _)| key.index_name.clone());
            sub.key_variant = matched.map(|(_, variant)| variant.name.clone());
        }
        debug!(
            record = %record.qualified_name(),
            subfields = subfields.len(),
            substructs = substructs.len(),
            "record flattened"
        );
        record.substructs = substructs;
        record.subfields = subfields;
    }
}
