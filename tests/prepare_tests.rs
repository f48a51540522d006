//! Preparation tests over in-memory schema modules

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use kvschema::{
    DiagnosticCode, MemorySource, ModuleSource, PrepareOptions, SchemaContext, SchemaError, SchemaModule,
    TypeExpr,
};

const CHDB: &str = r#"
[database]
name = "chdb"
tag = 0x01

[[enums]]
name = "fe_polarisation_t"
type_id = 0x10
values = ["H", "V", "L", "R"]

[[records]]
name = "mux_key_t"
type_id = 0x01
fields = [[1, "int16_t", "sat_pos"], [2, "uint16_t", "network_id"], [3, "uint16_t", "ts_id"]]

[[records]]
name = "mux_t"
type_id = 0x02
fields = [
  [1, "int16_t", "sat_pos"],
  [2, "uint32_t", "frequency"],
  [3, "chdb::fe_polarisation_t", "pol"],
  [4, "ss::string<32>", "name"],
]
primary_key = ["key", ["sat_pos", "frequency", "pol"]]
keys = [[1, "by_sat", ["sat_pos"]], [2, "by_name", [{ path = "name", transform = "casefold" }]]]

[[records]]
name = "service_key_t"
type_id = 0x03
fields = [[1, "chdb::mux_key_t", "mux"], [2, "uint16_t", "service_id"]]

[[records]]
name = "service_t"
type_id = 0x04
fields = [
  [1, "chdb::service_key_t", "k"],
  [2, "ss::vector<uint16_t, 4>", "pids"],
  [3, "std::optional<int32_t>", "lcn"],
]
primary_key = ["key", ["k"]]
"#;

const DEVDB: &str = r#"
[database]
name = "devdb"
tag = 0x02

[[records]]
name = "lnb_t"
type_id = 0x01
fields = [[1, "int8_t", "dish_id"], [2, "chdb::mux_key_t", "tuned_mux"], [3, "chdb::fe_polarisation_t", "pol"]]
primary_key = ["key", ["dish_id"]]
keys = [[10, "by_mux", ["tuned_mux"]]]
"#;

fn context() -> SchemaContext {
    SchemaContext::new(MemorySource::new().with_toml("chdb", CHDB).with_toml("devdb", DEVDB))
}

fn single(name: &str, text: &str) -> SchemaContext {
    SchemaContext::new(MemorySource::new().with_toml(name, text))
}

fn prefix_names(ctx: &mut SchemaContext, module: &str, record: &str, key: &str) -> Vec<String> {
    let registry = ctx.load(module).unwrap();
    let record = registry.record(record).unwrap();
    let key = record.keys.iter().find(|k| k.index_name == key).unwrap();
    key.key_prefixes.iter().map(|p| p.name.clone()).collect()
}

/// Source that counts how often each module is decoded
struct CountingSource {
    inner: MemorySource,
    loads: Rc<RefCell<HashMap<String, usize>>>,
}

impl ModuleSource for CountingSource {
    fn modules(&self) -> Vec<String> {
        self.inner.modules()
    }

    fn load(&self, name: &str) -> kvschema::Result<SchemaModule> {
        *self.loads.borrow_mut().entry(name.to_string()).or_default() += 1;
        self.inner.load(name)
    }
}

// =============================================================================
// Key expansion
// =============================================================================

#[test]
fn test_mux_key_yields_three_prefixes() {
    let mut ctx = context();
    assert_eq!(
        prefix_names(&mut ctx, "chdb", "mux_t", "key"),
        vec!["sat_pos_frequency_pol", "sat_pos_frequency", "sat_pos"]
    );

    let chdb = ctx.load("chdb").unwrap();
    let key = chdb.record("mux_t").unwrap().primary_key().unwrap();
    assert_eq!(key.variants.len(), 1);
    assert_eq!(key.key_prefixes[0].terminal.name, "pol");
}

#[test]
fn test_scalar_key_of_n_fields_yields_n_prefixes() {
    for n in 1..=6 {
        let fields: Vec<String> = (1..=n).map(|i| format!("[{}, \"int32_t\", \"f{}\"]", i, i)).collect();
        let names: Vec<String> = (1..=n).map(|i| format!("\"f{}\"", i)).collect();
        let text = format!(
            "[database]\nname = \"testdb\"\ntag = 3\n\n[[records]]\nname = \"r_t\"\ntype_id = 1\nfields = [{}]\nprimary_key = [\"key\", [{}]]\n",
            fields.join(", "),
            names.join(", ")
        );

        let mut ctx = single("testdb", &text);
        let registry = ctx.load("testdb").unwrap();
        let prefixes = &registry.record("r_t").unwrap().keys[0].key_prefixes;
        assert_eq!(prefixes.len(), n);
        for (i, prefix) in prefixes.iter().enumerate() {
            assert_eq!(prefix.fields.len(), n - i);
        }
        for pair in prefixes.windows(2) {
            assert_eq!(pair[0].fields[..pair[1].fields.len()], pair[1].fields[..]);
        }
    }
}

#[test]
fn test_nested_single_field_key_expands_every_leaf() {
    let mut ctx = context();
    let chdb = ctx.load("chdb").unwrap();
    let key = chdb.record("service_t").unwrap().primary_key().unwrap();
    assert_eq!(key.resolved.len(), 1);

    let maximal: Vec<&str> = key
        .maximal_variant()
        .unwrap()
        .fields
        .iter()
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(
        maximal,
        vec!["k.mux.sat_pos", "k.mux.network_id", "k.mux.ts_id", "k.service_id"]
    );

    let names: Vec<&str> = key.key_prefixes.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "sat_pos_network_id_ts_id_service_id",
            "sat_pos_network_id_ts_id",
            "sat_pos_network_id",
            "sat_pos",
        ]
    );
    assert!(key.key_prefixes.iter().all(|p| !p.terminal.ty.is_record()));
}

#[test]
fn test_shared_prefix_flagged_duplicate() {
    let mut ctx = context();
    let chdb = ctx.load("chdb").unwrap();
    let mux = chdb.record("mux_t").unwrap();

    assert!(mux.keys[0].key_prefixes.iter().all(|p| !p.duplicate));
    let by_sat = mux.keys.iter().find(|k| k.index_name == "by_sat").unwrap();
    assert!(by_sat.key_prefixes[0].duplicate);
    assert_eq!(chdb.diagnostics().with_code(DiagnosticCode::DuplicatePrefix).count(), 1);
}

#[test]
fn test_key_transform_is_kept() {
    let mut ctx = context();
    let chdb = ctx.load("chdb").unwrap();
    let by_name = chdb.record("mux_t").unwrap().keys.iter().find(|k| k.index_name == "by_name").unwrap();
    assert_eq!(by_name.resolved[0].transform.as_deref(), Some("casefold"));
}

#[test]
fn test_transform_on_record_key_field_reaches_every_leaf() {
    let text = r#"
[database]
name = "chdb"
tag = 1

[[records]]
name = "name_key_t"
type_id = 1
fields = [[1, "ss::string<32>", "provider"], [2, "ss::string<32>", "name"]]

[[records]]
name = "service_t"
type_id = 2
fields = [[1, "chdb::name_key_t", "k"], [2, "uint16_t", "service_id"]]
primary_key = ["key", ["service_id"]]
keys = [[1, "by_name", [{ path = "k", transform = "casefold" }, "service_id"]]]
"#;
    let mut ctx = single("chdb", text);
    let chdb = ctx.load("chdb").unwrap();
    let service = chdb.record("service_t").unwrap();
    let key = service.keys.iter().find(|k| k.index_name == "by_name").unwrap();

    let maximal: Vec<(&str, Option<&str>)> = key
        .maximal_variant()
        .unwrap()
        .fields
        .iter()
        .map(|f| (f.path.as_str(), f.transform.as_deref()))
        .collect();
    assert_eq!(
        maximal,
        vec![("k.provider", Some("casefold")), ("k.name", Some("casefold")), ("service_id", None)]
    );
    assert!(key
        .key_prefixes
        .iter()
        .all(|p| p.fields.iter().all(|f| f.transform.is_some() == f.path.starts_with("k."))));
}

// =============================================================================
// Flattening
// =============================================================================

#[test]
fn test_subfields_and_substructs() {
    let mut ctx = context();
    let chdb = ctx.load("chdb").unwrap();
    let service = chdb.record("service_t").unwrap();

    let paths: Vec<&str> = service.subfields.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["k.mux.sat_pos", "k.mux.network_id", "k.mux.ts_id", "k.service_id"]
    );
    assert_eq!(service.substructs["k"].name, "service_key_t");
    assert_eq!(service.substructs["k.mux"].name, "mux_key_t");
    // every leaf under `k` is covered by the primary key's first variant
    for sub in &service.subfields {
        assert_eq!(sub.key.as_deref(), Some("key"), "{}", sub.path);
        assert_eq!(sub.key_variant.as_deref(), Some("k"), "{}", sub.path);
    }

    let mux = chdb.record("mux_t").unwrap();
    let sat_pos = mux.subfields.iter().find(|s| s.path == "sat_pos").unwrap();
    assert_eq!(sat_pos.key.as_deref(), Some("by_sat"));
    assert_eq!(sat_pos.key_variant.as_deref(), Some("sat_pos"));
    let name = mux.subfields.iter().find(|s| s.path == "name").unwrap();
    assert_eq!(name.key.as_deref(), Some("by_name"));
    let frequency = mux.subfields.iter().find(|s| s.path == "frequency").unwrap();
    assert_eq!(frequency.key, None);
    assert_eq!(frequency.key_variant, None);
}

#[test]
fn test_foreign_subfields_reused_without_local_keys() {
    let mut ctx = context();
    let devdb = ctx.load("devdb").unwrap();
    let lnb = devdb.record("lnb_t").unwrap();

    let paths: Vec<&str> = lnb.subfields.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["dish_id", "tuned_mux.sat_pos", "tuned_mux.network_id", "tuned_mux.ts_id", "pol"]
    );
    let tuned = lnb.subfields.iter().find(|s| s.path == "tuned_mux.sat_pos").unwrap();
    assert_eq!(tuned.key.as_deref(), Some("by_mux"));
    assert_eq!(tuned.key_variant.as_deref(), Some("tuned_mux"));
    let dish = lnb.subfields.iter().find(|s| s.path == "dish_id").unwrap();
    assert_eq!(dish.key_variant.as_deref(), Some("dish_id"));
    assert_eq!(lnb.substructs["tuned_mux"].namespace, "chdb");
}

#[test]
fn test_variable_size_propagates_through_records() {
    let mut ctx = context();
    let chdb = ctx.load("chdb").unwrap();
    assert!(!chdb.record("mux_key_t").unwrap().has_variable_size);
    assert!(chdb.record("mux_t").unwrap().has_variable_size);

    let service = chdb.record("service_t").unwrap();
    assert!(service.has_variable_size);
    let flags: Vec<bool> = service.fields.iter().map(|f| f.has_variable_size).collect();
    assert_eq!(flags, vec![false, true, false]);
}

// =============================================================================
// Cross-schema resolution
// =============================================================================

#[test]
fn test_foreign_module_loaded_once_and_shared() {
    let loads = Rc::new(RefCell::new(HashMap::new()));
    let source = CountingSource {
        inner: MemorySource::new().with_toml("chdb", CHDB).with_toml("devdb", DEVDB),
        loads: Rc::clone(&loads),
    };
    let mut ctx = SchemaContext::new(source);

    let devdb = ctx.load("devdb").unwrap();
    let first = ctx.resolve_type("chdb::mux_key_t").unwrap().unwrap();
    let second = ctx.resolve_type("chdb::mux_key_t").unwrap().unwrap();
    assert_eq!(first, second);

    let a = ctx.record(first.record_handle().unwrap()).unwrap() as *const _;
    let b = ctx.record(second.record_handle().unwrap()).unwrap() as *const _;
    assert!(std::ptr::eq(a, b));

    let chdb = ctx.load("chdb").unwrap();
    assert!(Arc::ptr_eq(&chdb, &ctx.load("chdb").unwrap()));
    assert!(std::ptr::eq(chdb.record("mux_key_t").unwrap(), a));

    // The field type of devdb points at the same record
    let lnb = devdb.record("lnb_t").unwrap();
    assert_eq!(lnb.fields[1].ty.target(), Some(&first));

    assert_eq!(loads.borrow()["chdb"], 1);
    assert_eq!(loads.borrow()["devdb"], 1);
    assert_eq!(devdb.dependencies().to_vec(), vec!["chdb".to_string()]);
}

#[test]
fn test_externals_are_flagged_copies() {
    let mut ctx = context();
    let devdb = ctx.load("devdb").unwrap();
    let names: Vec<&str> = devdb.externals().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["mux_key_t"]);
    assert!(devdb.externals()[0].is_external);
    assert!(!ctx.module("chdb").unwrap().record("mux_key_t").unwrap().is_external);
}

#[test]
fn test_unknown_names_are_opaque() {
    let text = r#"
[database]
name = "epgdb"
tag = 4

[[records]]
name = "epg_t"
type_id = 1
fields = [[1, "time_t", "start"], [2, "ss::blob_t", "raw"], [3, "epgdb::missing_t", "gone"]]
"#;
    let mut ctx = single("epgdb", text);
    let epgdb = ctx.load("epgdb").unwrap();
    let epg = epgdb.record("epg_t").unwrap();

    assert!(epg.fields.iter().all(|f| f.ty.target().is_none()));
    assert_eq!(epg.fields[0].ty, TypeExpr::scalar("time_t", None));
    assert_eq!(epgdb.diagnostics().with_code(DiagnosticCode::OpaqueType).count(), 1);
    assert_eq!(epgdb.diagnostics().with_code(DiagnosticCode::MissingForeignType).count(), 1);
    assert_eq!(epg.subfields.len(), 3);
}

#[test]
fn test_unresolved_field_path_is_fatal() {
    let text = r#"
[database]
name = "chdb"
tag = 1

[[records]]
name = "mux_t"
type_id = 1
fields = [[1, "int16_t", "sat_pos"], [2, "uint32_t", "frequency"]]
primary_key = ["key", ["sat_pos", "frequncy"]]
"#;
    let err = single("chdb", text).load("chdb").unwrap_err();
    match err {
        SchemaError::UnresolvedFieldPath { record, path, suggestion } => {
            assert_eq!(record, "chdb::mux_t");
            assert_eq!(path, "frequncy");
            assert_eq!(suggestion.as_deref(), Some("frequency"));
        }
        other => panic!("expected unresolved path, got {:?}", other),
    }
}

#[test]
fn test_path_through_scalar_is_fatal() {
    let text = r#"
[database]
name = "chdb"
tag = 1

[[records]]
name = "mux_t"
type_id = 1
fields = [[1, "int16_t", "sat_pos"]]
filter_fields = ["sat_pos.degrees"]
"#;
    let err = single("chdb", text).load("chdb").unwrap_err();
    assert!(matches!(err, SchemaError::UnresolvedFieldPath { suggestion: None, .. }));
}

#[test]
fn test_circular_modules_rejected() {
    let a = "[database]\nname = \"adb\"\ntag = 1\n\n[[records]]\nname = \"a_t\"\ntype_id = 1\nfields = [[1, \"bdb::b_t\", \"b\"]]\n";
    let b = "[database]\nname = \"bdb\"\ntag = 2\n\n[[records]]\nname = \"b_t\"\ntype_id = 1\nfields = [[1, \"adb::a_t\", \"a\"]]\n";
    let mut ctx = SchemaContext::new(MemorySource::new().with_toml("adb", a).with_toml("bdb", b));

    match ctx.load("adb").unwrap_err() {
        SchemaError::CircularDependency(cycle) => assert_eq!(cycle, vec!["adb", "bdb", "adb"]),
        other => panic!("expected cycle, got {:?}", other),
    }
}

#[test]
fn test_dependencies_limited_to_known_databases() {
    let text = "[database]\nname = \"xdb\"\ntag = 5\n\n[[records]]\nname = \"x_t\"\ntype_id = 1\nfields = [[1, \"chdb::mux_key_t\", \"mux\"], [2, \"std::optional<nodb::thing_t>\", \"thing\"], [3, \"xdb::x_t\", \"self_ref\"]]\n";
    let module = SchemaModule::from_toml(text).unwrap();
    assert_eq!(module.referenced_namespaces(), vec!["chdb", "nodb"]);

    let mut ctx = context();
    assert_eq!(ctx.load_dependencies(&module).unwrap(), vec!["chdb".to_string()]);
    assert!(ctx.module("chdb").is_some());
}

#[test]
fn test_failed_load_leaves_graph_untouched() {
    let bad_chdb = "[database]\nname = \"chdb\"\ntag = 1\n\n[[records]]\nname = \"mux_key_t\"\ntype_id = 1\nfields = [[1, \"int16_t\", \"sat_pos\"]]\nprimary_key = [\"key\", [\"frequency\"]]\n";
    let mut ctx = SchemaContext::new(MemorySource::new().with_toml("chdb", bad_chdb).with_toml("devdb", DEVDB));

    assert!(ctx.load("devdb").is_err());
    assert!(ctx.modules().is_empty());
    assert_eq!(ctx.dependency_dot(), "digraph schemas {\n    rankdir=LR;\n}\n");
}

#[test]
fn test_recursive_record_rejected() {
    let text = r#"
[database]
name = "chdb"
tag = 1

[[records]]
name = "node_t"
type_id = 1
fields = [[1, "int32_t", "id"], [2, "std::optional<chdb::node_t>", "parent"]]

[[records]]
name = "tree_t"
type_id = 2
fields = [[1, "ss::vector<chdb::tree_t>", "children"]]
"#;
    let err = single("chdb", text).load("chdb").unwrap_err();
    assert!(matches!(err, SchemaError::RecursiveRecord(ref name) if name == "chdb::node_t"));
}

#[test]
fn test_module_name_must_match_database() {
    let mut ctx = single("chdb", DEVDB);
    assert!(matches!(ctx.load("chdb"), Err(SchemaError::ModuleMismatch { .. })));
}

#[test]
fn test_dependency_graph_dot() {
    let mut ctx = context();
    ctx.load_all().unwrap();
    let dot = ctx.dependency_dot();
    assert!(dot.starts_with("digraph schemas {"));
    assert!(dot.contains("\"devdb\" -> \"chdb\";"));
}

// =============================================================================
// Consistency checks
// =============================================================================

fn two_records(type_ids: (u32, u32), keys: &str) -> String {
    format!(
        r#"
[database]
name = "chdb"
tag = 1

[[records]]
name = "a_t"
type_id = {}
fields = [[1, "int16_t", "x"]]
{}

[[records]]
name = "b_t"
type_id = {}
fields = [[1, "int16_t", "y"]]
"#,
        type_ids.0, keys, type_ids.1
    )
}

#[test]
fn test_duplicate_type_id_raises() {
    let err = single("chdb", &two_records((7, 7), "")).load("chdb").unwrap_err();
    match err {
        SchemaError::DuplicateTypeId { id, first, second } => {
            assert_eq!(id, 0x0100_0007);
            assert_eq!(first, "chdb::a_t");
            assert_eq!(second, "chdb::b_t");
        }
        other => panic!("expected duplicate type id, got {:?}", other),
    }
}

#[test]
fn test_keys_without_index_id_not_flagged() {
    let keys = r#"keys = [{ name = "by_x", fields = ["x"] }, { name = "by_x_again", fields = ["x"] }]"#;
    let mut ctx = single("chdb", &two_records((1, 2), keys));
    assert!(ctx.load("chdb").is_ok());
}

#[test]
fn test_duplicate_index_id_raises() {
    let keys = r#"keys = [[4, "by_x", ["x"]], [4, "by_x_again", ["x"]]]"#;
    let err = single("chdb", &two_records((1, 2), keys)).load("chdb").unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateIndexId { id: 4, .. }));
}

#[test]
fn test_type_id_range() {
    let err = single("chdb", &two_records((0x0100_0000, 2), "")).load("chdb").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidTypeId { .. }));

    let reserved = two_records((1, 2), "").replace("tag = 1", "tag = 0x80");
    let err = single("chdb", &reserved).load("chdb").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidTypeId { id: 0x8000_0001, .. }));
}

#[test]
fn test_duplicate_type_id_across_modules() {
    let other = r#"
[database]
name = "devdb"
tag = 1

[[records]]
name = "lnb_t"
type_id = 0x01
fields = [[1, "chdb::mux_key_t", "mux"]]
"#;
    let mut ctx = SchemaContext::new(MemorySource::new().with_toml("chdb", CHDB).with_toml("devdb", other));
    let err = ctx.load("devdb").unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateTypeId { id: 0x0100_0001, .. }));
    // The dependency itself was prepared and cached
    assert!(ctx.module("chdb").is_some());
}

// =============================================================================
// Preparation
// =============================================================================

#[test]
fn test_prepare_twice_is_identical() {
    let mut ctx = context();
    let devdb = ctx.load("devdb").unwrap();

    let mut again = (*devdb).clone();
    ctx.prepare(&mut again).unwrap();
    ctx.prepare(&mut again).unwrap();

    assert_eq!(again.fingerprint().unwrap(), devdb.fingerprint().unwrap());
    for (a, b) in again.records().iter().zip(devdb.records()) {
        assert_eq!(
            serde_json::to_string(&a.subfields).unwrap(),
            serde_json::to_string(&b.subfields).unwrap()
        );
        for (ka, kb) in a.keys.iter().zip(&b.keys) {
            assert_eq!(
                serde_json::to_string(&ka.key_prefixes).unwrap(),
                serde_json::to_string(&kb.key_prefixes).unwrap()
            );
        }
    }
    assert_eq!(again.diagnostics(), devdb.diagnostics());
    assert_eq!(again.externals().len(), devdb.externals().len());
}

#[test]
fn test_malformed_field_strict_and_lenient() {
    let text = r#"
[database]
name = "chdb"
tag = 1

[[records]]
name = "mux_t"
type_id = 1
fields = [[1, "int16_t", "sat_pos"], ["two", "uint32_t", "frequency"]]
"#;
    let err = single("chdb", text).load("chdb").unwrap_err();
    assert!(matches!(err, SchemaError::MalformedField { .. }));

    let source = MemorySource::new().with_toml("chdb", text);
    let mut ctx = SchemaContext::with_options(source, PrepareOptions { strict_fields: false });
    let chdb = ctx.load("chdb").unwrap();
    assert_eq!(chdb.record("mux_t").unwrap().fields.len(), 1);
    assert_eq!(chdb.diagnostics().with_code(DiagnosticCode::SkippedField).count(), 1);
    assert!(chdb.is_prepared());
}
