//! End-to-end traversal over multi-module registries.

use std::rc::Rc;

use indexmap::IndexMap;
use stitch_parse::log;
use wgsl_stitch::{
    assign_unique_names, collect_refs, DeclIdx, FoundRef, GeneratorExport, GeneratorModule,
    Registry, RegistryParams,
};

fn registry(sources: &[(&str, &str)]) -> Registry {
    let wgsl: IndexMap<String, String> = sources
        .iter()
        .map(|(path, src)| (path.to_string(), src.to_string()))
        .collect();
    Registry::new(RegistryParams {
        wgsl,
        ..Default::default()
    })
}

fn ref_names(registry: &Registry, refs: &[FoundRef]) -> Vec<(String, String)> {
    let parsed = registry.parsed();
    refs.iter()
        .map(|r| {
            let module = parsed.module(r.module()).name().to_string();
            let name = match r {
                FoundRef::Text(t) => parsed
                    .text_module(t.module)
                    .unwrap()
                    .decl_name(t.decl)
                    .to_string(),
                FoundRef::Gen(g) => g.name.clone(),
            };
            (module, name)
        })
        .collect()
}

#[test]
fn cross_module_import_resolves_in_order() {
    let registry = registry(&[
        (
            "main.wgsl",
            "import bar::foo; module main; fn main() { foo(); }",
        ),
        ("bar.wgsl", "module bar; export fn foo() { }"),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let refs = collect_refs(root, registry.parsed());

    assert_eq!(
        ref_names(&registry, &refs),
        [
            ("main".to_string(), "main".to_string()),
            ("bar".to_string(), "foo".to_string()),
        ]
    );
    let FoundRef::Text(foo) = &refs[1] else {
        panic!("expected a text ref");
    };
    assert!(matches!(foo.decl, DeclIdx::Fn(_)));
}

#[test]
fn import_args_bind_export_params() {
    let registry = registry(&[
        (
            "main.wgsl",
            "import foo(u32) from ./file1; fn bar() { foo(8u); }",
        ),
        (
            "file1.wgsl",
            "import zap from ./file2; export(A) fn foo(a: A) { support(a); zap(); } fn support() {}",
        ),
        ("file2.wgsl", "export fn zap() {}"),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let refs = collect_refs(root, registry.parsed());

    assert_eq!(
        ref_names(&registry, &refs),
        [
            ("main".to_string(), "bar".to_string()),
            ("file1".to_string(), "foo".to_string()),
            ("file1".to_string(), "support".to_string()),
            ("file2".to_string(), "zap".to_string()),
        ]
    );
    let info = refs[1].exp_info().expect("import carries exp info");
    assert_eq!(
        info.exp_imp_args,
        [("A".to_string(), "u32".to_string())]
    );
    // support is reached locally, without an import chain
    assert!(refs[2].exp_info().is_none());
}

#[test]
fn mutually_recursive_structs_terminate() {
    let registry = registry(&[(
        "main.wgsl",
        "struct A { a: A, b: B } struct B { f: f32 }",
    )]);
    let root = registry.find_text_module("main").unwrap();
    let ((), lines) = log::capture(|| {
        let refs = collect_refs(root, registry.parsed());
        let names: Vec<_> = ref_names(&registry, &refs)
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(names, ["A", "B"]);
    });
    assert!(lines.is_empty(), "unexpected diagnostics: {lines:?}");
}

#[test]
fn call_back_pointers_are_set() {
    let registry = registry(&[
        ("main.wgsl", "import bar::foo; fn main() { foo(); }"),
        ("bar.wgsl", "module bar; export fn foo() { }"),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let parsed = registry.parsed();
    collect_refs(root, parsed);

    let main = parsed.text_module(root).unwrap();
    let call = &main.fns[0].calls[0];
    let resolved = call.resolved.get().expect("back-pointer filled");
    assert_eq!(parsed.module(resolved.module()).name(), "bar");
}

#[test]
fn generator_refs_terminate_traversal() {
    let mut wgsl = IndexMap::new();
    wgsl.insert(
        "main.wgsl".to_string(),
        "import gen::rand; fn main() { rand(); }".to_string(),
    );
    let generator = GeneratorModule {
        name: "gen".to_string(),
        exports: vec![GeneratorExport {
            name: "rand".to_string(),
            params: vec![],
            generate: Rc::new(|_| "fn rand() -> u32 { return 4u; }".to_string()),
        }],
    };
    let registry = Registry::new(RegistryParams {
        wgsl,
        generators: vec![generator],
        ..Default::default()
    });
    let root = registry.find_text_module("main").unwrap();
    let refs = collect_refs(root, registry.parsed());

    assert_eq!(refs.len(), 2);
    let FoundRef::Gen(gen) = &refs[1] else {
        panic!("expected a generator ref");
    };
    assert_eq!(gen.name, "rand");
}

#[test]
fn colliding_names_get_numbered() {
    let registry = registry(&[
        (
            "main.wgsl",
            "import lib::helper; module main; fn main() { helper(); } fn helper() { }",
        ),
        ("lib.wgsl", "module lib; export fn helper() { }"),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let parsed = registry.parsed();
    let mut refs = collect_refs(root, parsed);
    assign_unique_names(&mut refs, parsed, root);

    // root declarations keep their names
    assert!(refs[0].rename().is_none());
    let imported = refs
        .iter()
        .find(|r| parsed.module(r.module()).name() == "lib")
        .unwrap();
    assert_eq!(imported.rename(), Some("helper0"));
}

#[test]
fn as_rename_becomes_proposed_name() {
    let registry = registry(&[
        (
            "main.wgsl",
            "import lib::helper as util; fn main() { util(); }",
        ),
        ("lib.wgsl", "module lib; export fn helper() { }"),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let parsed = registry.parsed();
    let mut refs = collect_refs(root, parsed);
    assert_eq!(refs[1].proposed_name(), "util");
    assign_unique_names(&mut refs, parsed, root);
    // the final name differs from the declared `helper`, so it is a rename
    assert_eq!(refs[1].rename(), Some("util"));
}

#[test]
fn unresolved_reference_logs_and_continues() {
    let registry = registry(&[("main.wgsl", "fn main() { missing(); other(); } fn other() {}")]);
    let root = registry.find_text_module("main").unwrap();
    let (refs, lines) = log::capture(|| collect_refs(root, registry.parsed()));

    assert!(lines
        .iter()
        .any(|l| l.contains("reference not found: missing")));
    // traversal still reached `other`
    assert!(ref_names(&registry, &refs)
        .iter()
        .any(|(_, name)| name == "other"));
}

#[test]
fn missing_export_logs_at_resolve_time() {
    let registry = registry(&[
        ("main.wgsl", "import bar::nope; fn main() { }"),
        ("bar.wgsl", "module bar; export fn foo() { }"),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let ((), lines) = log::capture(|| {
        collect_refs(root, registry.parsed());
    });
    assert!(lines
        .iter()
        .any(|l| l.contains("export not found for import `bar/nope` in module `main`")));
}

#[test]
fn param_count_mismatch_logs_at_both_sites() {
    let registry = registry(&[
        (
            "main.wgsl",
            "import foo(u32, f32) from ./lib; fn main() { foo(); }",
        ),
        ("lib.wgsl", "export(A) fn foo(a: A) { }"),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let (refs, lines) = log::capture(|| collect_refs(root, registry.parsed()));

    let mismatches = lines
        .iter()
        .filter(|l| l.contains("parameter count mismatch"))
        .count();
    assert_eq!(mismatches, 2);
    // traversal proceeds with the shorter pairing
    let info = refs[1].exp_info().unwrap();
    assert_eq!(info.exp_imp_args, [("A".to_string(), "u32".to_string())]);
}

#[test]
fn conditions_strip_declarations_before_linking() {
    let mut wgsl = IndexMap::new();
    wgsl.insert(
        "main.wgsl".to_string(),
        "#if debug\nfn debug_draw() { }\n#endif\nfn main() { }".to_string(),
    );
    let registry = Registry::new(RegistryParams {
        wgsl,
        conditions: [("debug".to_string(), false)].into_iter().collect(),
        ..Default::default()
    });
    let root = registry.find_text_module("main").unwrap();
    let parsed = registry.parsed();
    let main = parsed.text_module(root).unwrap();
    assert_eq!(main.fns.len(), 1);
    assert_eq!(main.fns[0].name, "main");
}

#[test]
fn multi_leaf_import_resolves_each() {
    let registry = registry(&[
        (
            "main.wgsl",
            "import lib::{light, shadow}; fn main() { light(); shadow(); }",
        ),
        (
            "lib.wgsl",
            "module lib; export fn light() { } export fn shadow() { }",
        ),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let refs = collect_refs(root, registry.parsed());
    let names: Vec<_> = ref_names(&registry, &refs)
        .into_iter()
        .map(|(_, n)| n)
        .collect();
    assert_eq!(names, ["main", "light", "shadow"]);
}

#[test]
fn extends_pulls_in_exported_struct() {
    let registry = registry(&[
        (
            "main.wgsl",
            "#extends Mixin from ./lib\nstruct S { x: f32 }",
        ),
        ("lib.wgsl", "export struct Mixin { y: f32 }"),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let refs = collect_refs(root, registry.parsed());
    let names: Vec<_> = ref_names(&registry, &refs)
        .into_iter()
        .map(|(_, n)| n)
        .collect();
    assert_eq!(names, ["S", "Mixin"]);
}

#[test]
fn nested_module_paths_resolve() {
    let registry = registry(&[
        (
            "main.wgsl",
            "import shaders::util::clampish; fn main() { clampish(); }",
        ),
        (
            "shaders/util.wgsl",
            "module shaders::util; export fn clampish() { }",
        ),
    ]);
    let root = registry.find_text_module("main").unwrap();
    let refs = collect_refs(root, registry.parsed());
    assert_eq!(
        ref_names(&registry, &refs),
        [
            ("main".to_string(), "main".to_string()),
            ("shaders/util".to_string(), "clampish".to_string()),
        ]
    );
}
