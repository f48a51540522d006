//! Consistency Check
//!
//! Last preparation pass of a module. Walks every record and key of the
//! module and of every module reachable through its dependencies, and fails
//! on the first duplicate or out-of-range wire identifier.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::context::SchemaContext;
use crate::error::{Result, SchemaError};
use crate::registry::SchemaRegistry;

/// Largest declared type id; the high byte holds the database tag
pub const MAX_DECLARED_TYPE_ID: u32 = 0x00FF_FFFF;

/// Wire type ids at or above this value are reserved
pub const RESERVED_TYPE_ID: u64 = 0x8000_0000;

/// The module followed by every module reachable from it, breadth first
fn reachable<'a>(ctx: &'a SchemaContext, registry: &'a SchemaRegistry) -> Vec<&'a SchemaRegistry> {
    let mut out = vec![registry];
    let mut seen: HashSet<&str> = HashSet::from([registry.namespace()]);
    let mut queue: VecDeque<&'a SchemaRegistry> = VecDeque::from([registry]);

    while let Some(current) = queue.pop_front() {
        for dep in current.dependencies() {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            if let Some(module) = ctx.module(dep) {
                out.push(module.as_ref());
                queue.push_back(module.as_ref());
            }
        }
    }
    out
}

/// Validate wire type ids and index ids over the reachable schema set
pub fn check_consistency(ctx: &SchemaContext, registry: &SchemaRegistry) -> Result<()> {
    let modules = reachable(ctx, registry);
    let mut type_ids: HashMap<u32, String> = HashMap::new();
    let mut index_ids: HashMap<u32, String> = HashMap::new();

    for module in &modules {
        for record in module.records() {
            let name = record.qualified_name();
            if record.type_id > MAX_DECLARED_TYPE_ID {
                return Err(SchemaError::InvalidTypeId {
                    record: name,
                    id: record.type_id as u64,
                    reason: "declared type id does not fit in 24 bits".to_string(),
                });
            }
            let wire = record.wire_type_id(module.tag());
            if wire >= RESERVED_TYPE_ID {
                return Err(SchemaError::InvalidTypeId {
                    record: name,
                    id: wire,
                    reason: "wire type id reaches the reserved high bit".to_string(),
                });
            }
            if let Some(first) = type_ids.insert(wire as u32, name.clone()) {
                return Err(SchemaError::DuplicateTypeId {
                    id: wire as u32,
                    first,
                    second: name,
                });
            }

            for key in &record.keys {
                let Some(id) = key.index_id else {
                    continue;
                };
                let key_name = format!("{}.{}", name, key.index_name);
                if let Some(first) = index_ids.insert(id, key_name.clone()) {
                    return Err(SchemaError::DuplicateIndexId {
                        id,
                        first,
                        second: key_name,
                    });
                }
            }
        }
    }

    debug!(
        module = registry.namespace(),
        modules = modules.len(),
        records = type_ids.len(),
        "wire identifiers consistent"
    );
    Ok(())
}
