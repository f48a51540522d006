//! Key Expansion
//!
//! Expands each declared key into the range-scan prefixes usable against the
//! encoded key. Field order is the lexicographic comparison order on disk, so
//! expansion never reorders fields; it only replaces a record-valued field by
//! that record's own fields, renamed with their dotted paths.
//!
//! For a key `(k)` where `k` is a record `{ mux: { sat_pos, frequency }, t }`:
//!
//! ```text
//! variants:  k
//!            mux_t                       (k -> k.mux, k.t)
//!            sat_pos_frequency_t         (k.mux -> k.mux.sat_pos, k.mux.frequency)
//! prefixes:  sat_pos_frequency_t
//!            sat_pos_frequency
//!            sat_pos
//! ```

use std::collections::HashMap;
use tracing::debug;

use crate::context::{Lookup, SchemaContext};
use crate::diagnostics::Diagnostics;
use crate::model::{canonical_name, KeyDescriptor, KeyPrefix, KeyVariant, RecordDescriptor, ResolvedField};
use crate::registry::SchemaRegistry;

/// Replace the last record-valued field by that record's fields. Returns
/// false when every field is already non-record.
fn expand_step(lookup: &Lookup<'_>, fields: &mut Vec<ResolvedField>) -> bool {
    let Some((pos, record)) = fields
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, f)| lookup.record_of(&f.ty).map(|r| (i, r)))
    else {
        return false;
    };
    let parent = fields[pos].clone();
    fields.splice(pos..=pos, record.fields.iter().map(|f| parent.child(f)));
    true
}

/// Every expansion step of a key, from the declared field list to the
/// maximal one in which no field is record-valued
pub(crate) fn expand_variants(lookup: &Lookup<'_>, declared: &[ResolvedField]) -> Vec<KeyVariant> {
    let mut current = declared.to_vec();
    let mut variants = vec![KeyVariant {
        name: canonical_name(&current),
        fields: current.clone(),
    }];
    while expand_step(lookup, &mut current) {
        variants.push(KeyVariant {
            name: canonical_name(&current),
            fields: current.clone(),
        });
    }
    variants
}

/// Every leading subsequence of a fully expanded key, longest first
pub(crate) fn leading_prefixes(expanded: &[ResolvedField]) -> Vec<KeyPrefix> {
    (1..=expanded.len())
        .rev()
        .map(|len| {
            let fields = expanded[..len].to_vec();
            KeyPrefix {
                name: canonical_name(&fields),
                terminal: fields[len - 1].clone(),
                fields,
                duplicate: false,
            }
        })
        .collect()
}

/// Variants and range-scan prefixes of one key. Prefixes are cut from the
/// maximal variant, so each ends in a non-record field and prefixes cut
/// through nested records as well.
pub(crate) fn expand_key(lookup: &Lookup<'_>, key: &KeyDescriptor) -> (Vec<KeyVariant>, Vec<KeyPrefix>) {
    let variants = expand_variants(lookup, &key.resolved);
    let prefixes = variants
        .last()
        .map(|maximal| leading_prefixes(&maximal.fields))
        .unwrap_or_default();
    (variants, prefixes)
}

/// Flag prefixes whose name an earlier prefix of the same record already
/// produced. The first occurrence, in key declaration order, stays unflagged.
pub(crate) fn mark_duplicates(record: &mut RecordDescriptor, diagnostics: &mut Diagnostics) {
    let subject = record.qualified_name();
    let mut first_seen: HashMap<String, String> = HashMap::new();
    for key in &mut record.keys {
        for prefix in &mut key.key_prefixes {
            match first_seen.get(&prefix.name) {
                Some(first_key) => {
                    prefix.duplicate = true;
                    diagnostics.duplicate_prefix(&subject, &prefix.name, &key.index_name, first_key);
                }
                None => {
                    prefix.duplicate = false;
                    first_seen.insert(prefix.name.clone(), key.index_name.clone());
                }
            }
        }
    }
}

/// Expand every key of every local record
pub(crate) fn expand_keys(ctx: &SchemaContext, registry: &mut SchemaRegistry) {
    let expanded: Vec<Vec<(Vec<KeyVariant>, Vec<KeyPrefix>)>> = {
        let lookup = ctx.lookup(registry);
        registry
            .records()
            .iter()
            .map(|record| record.keys.iter().map(|key| expand_key(&lookup, key)).collect())
            .collect()
    };

    let mut diagnostics = Diagnostics::new();
    for (record, keys) in registry.records.iter_mut().zip(expanded) {
        for (key, (variants, prefixes)) in record.keys.iter_mut().zip(keys) {
            key.variants = variants;
            key.key_prefixes = prefixes;
        }
        mark_duplicates(record, &mut diagnostics);
        debug!(
            record = %record.qualified_name(),
            prefixes = record.keys.iter().map(|k| k.key_prefixes.len()).sum::<usize>(),
            "keys expanded"
        );
    }
    registry.diagnostics.append(&mut diagnostics);
}
