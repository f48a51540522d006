//! Conformance tests over the bundled schema corpus
//!
//! Every bundled module must prepare in strict mode: a field declaration that
//! would only load by being skipped fails here.

use std::fs;

use kvschema::{
    DiagnosticCode, DirectorySource, EmbeddedSource, ModuleSource, SchemaContext, TypeExpr,
    BUNDLED_SCHEMAS,
};

fn bundled() -> SchemaContext {
    SchemaContext::new(EmbeddedSource::bundled())
}

#[test]
fn test_corpus_prepares_strictly() {
    let mut ctx = bundled();
    let modules = ctx.load_all().unwrap();
    assert_eq!(modules.len(), 2);

    for registry in &modules {
        assert!(registry.is_prepared());
        assert_eq!(
            registry.diagnostics().with_code(DiagnosticCode::SkippedField).count(),
            0,
            "{}",
            registry.diagnostics()
        );
    }
}

#[test]
fn test_corpus_invariants() {
    let mut ctx = bundled();
    for registry in ctx.load_all().unwrap() {
        for record in registry.records() {
            for key in &record.keys {
                assert!(!key.key_prefixes.is_empty(), "{}.{}", record.name, key.index_name);
                let maximal = key.maximal_variant().unwrap();
                assert!(maximal.fields.iter().all(|f| !f.ty.is_record()));
                assert_eq!(key.key_prefixes.len(), maximal.fields.len());
                for prefix in &key.key_prefixes {
                    assert!(!prefix.terminal.ty.is_record());
                    assert_eq!(prefix.fields.last(), Some(&prefix.terminal));
                }
            }
            for sub in &record.subfields {
                assert!(
                    matches!(sub.ty, TypeExpr::Scalar(_) | TypeExpr::FixedString { .. }),
                    "{}: {}",
                    record.name,
                    sub.path
                );
                assert!(!sub.ty.is_record());
            }
        }
    }
}

#[test]
fn test_corpus_module_order_and_dependencies() {
    let mut ctx = bundled();
    let devdb = ctx.load("devdb").unwrap();
    assert_eq!(devdb.dependencies().to_vec(), vec!["chdb".to_string()]);

    let names: Vec<&str> = ctx.modules().iter().map(|m| m.namespace()).collect();
    assert_eq!(names, vec!["chdb", "devdb"]);
    assert!(ctx.dependency_dot().contains("\"devdb\" -> \"chdb\";"));
}

#[test]
fn test_service_key_reaches_every_leaf() {
    let mut ctx = bundled();
    let chdb = ctx.load("chdb").unwrap();
    let service = chdb.record("service_t").unwrap();
    let key = service.primary_key().unwrap();

    let maximal: Vec<&str> = key.maximal_variant().unwrap().fields.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        maximal,
        vec!["k.mux.sat_pos", "k.mux.network_id", "k.mux.ts_id", "k.mux.extra_id", "k.service_id"]
    );
    assert_eq!(key.variants.len(), 3);

    let by_sat_pos = service.keys.iter().find(|k| k.index_name == "by_sat_pos").unwrap();
    assert_eq!(by_sat_pos.key_prefixes[0].name, "sat_pos_service_id");
    assert!(by_sat_pos.key_prefixes[1].duplicate);

    let sat_pos = service.subfields.iter().find(|s| s.path == "k.mux.sat_pos").unwrap();
    assert_eq!(sat_pos.key.as_deref(), Some("key"));
    assert_eq!(sat_pos.key_variant.as_deref(), Some("k"));
    let ch_order = service.subfields.iter().find(|s| s.path == "ch_order").unwrap();
    assert_eq!(ch_order.key.as_deref(), Some("by_ch_order"));
    let provider = service.subfields.iter().find(|s| s.path == "provider").unwrap();
    assert_eq!(provider.key, None);
    assert!(service.subfields.iter().all(|s| s.path != "audio_pref"));
}

#[test]
fn test_corpus_enum_display_names() {
    let mut ctx = bundled();
    let chdb = ctx.load("chdb").unwrap();

    let delsys = chdb.enumeration("fe_delsys_t").unwrap();
    assert_eq!(delsys.entry("SYS_DVBS2").unwrap().display_name, "DVBS2");
    assert_eq!(delsys.entry("SYS_AUTO").unwrap().display_name, "auto");
    assert_eq!(delsys.entry("SYS_DVBT2").unwrap().value.to_string(), "5");
    assert_eq!(delsys.entry("SYS_AUTO").unwrap().value.to_string(), "64");

    let pol = chdb.enumeration("fe_polarisation_t").unwrap();
    assert_eq!(pol.entry("NONE").unwrap().value.to_string(), "255");
    assert_eq!(pol.entry("H").unwrap().display_name, "H");

    let devdb = ctx.load("devdb").unwrap();
    let lnb_type = devdb.enumeration("lnb_type_t").unwrap();
    assert_eq!(lnb_type.entry("LNB_TYPE_KU").unwrap().display_name, "KU");
    assert_eq!(lnb_type.entry("LNB_TYPE_UNKNOWN").unwrap().value.to_string(), "-1");
}

#[test]
fn test_directory_copy_matches_embedded() {
    let dir = tempfile::tempdir().unwrap();
    for file in BUNDLED_SCHEMAS.files() {
        fs::write(dir.path().join(file.path()), file.contents()).unwrap();
    }

    let source = DirectorySource::new(dir.path()).unwrap();
    assert_eq!(source.modules(), EmbeddedSource::bundled().modules());

    let mut from_disk = SchemaContext::new(source);
    let mut embedded = bundled();
    for name in ["chdb", "devdb"] {
        let a = from_disk.load(name).unwrap();
        let b = embedded.load(name).unwrap();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }
}

#[test]
fn test_records_grouped_by_file() {
    let mut ctx = bundled();
    let chdb = ctx.load("chdb").unwrap();
    let groups: Vec<(&str, Vec<&str>)> = chdb
        .grouped_records()
        .into_iter()
        .map(|(file, records)| (file, records.iter().map(|r| r.name.as_str()).collect()))
        .collect();
    assert_eq!(
        groups,
        vec![
            ("mux", vec!["mux_key_t", "mux_t"]),
            ("service", vec!["service_key_t", "service_t"]),
            ("sat", vec!["sat_t"]),
        ]
    );
}
