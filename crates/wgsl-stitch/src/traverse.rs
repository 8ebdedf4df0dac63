//! Reference traversal: walks the transitive reference graph from a root
//! module, binding each call and type reference to the declaration it names
//! and delivering a [`FoundRef`] stream to the visitor.
//!
//! Processing is breadth-first grouped by exporting module, so all refs into
//! one module resolve in a single sweep and diagnostics come out in a
//! deterministic order. Deduplication is the visitor's job: it returns
//! whether to recurse into a delivered ref, keyed by [`ref_full_name`].

use std::cell::OnceCell;
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};

use indexmap::IndexMap;
use stitch_parse::Span;

use crate::error::{Diagnostic, Error};
use crate::import::{ImportError, ModuleExport, ResolvedImport};
use crate::registry::ParsedRegistry;
use crate::syntax::{DeclIdx, ExtendsElem, Module, TextModule};

/// A resolved pointer from a use site to the declaration it names, possibly
/// in another module. `rename` is filled by the later uniqueness pass.
#[derive(Clone, Debug)]
pub enum FoundRef {
    Text(TextRef),
    Gen(GenRef),
}

#[derive(Clone, Debug)]
pub struct TextRef {
    pub module: usize,
    pub decl: DeclIdx,
    pub proposed_name: String,
    pub rename: Option<String>,
    pub exp_info: Option<ExpInfo>,
}

#[derive(Clone, Debug)]
pub struct GenRef {
    pub module: usize,
    pub export: usize,
    pub name: String,
    pub proposed_name: String,
    pub rename: Option<String>,
    pub exp_info: ExpInfo,
}

/// The import chain that led to a reference, and the binding of export
/// parameters to import arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpInfo {
    pub imp_segments: Vec<String>,
    pub exp_segments: Vec<String>,
    /// export parameter name → import argument text
    pub exp_imp_args: Vec<(String, String)>,
}

impl FoundRef {
    pub fn module(&self) -> usize {
        match self {
            FoundRef::Text(r) => r.module,
            FoundRef::Gen(r) => r.module,
        }
    }

    pub fn proposed_name(&self) -> &str {
        match self {
            FoundRef::Text(r) => &r.proposed_name,
            FoundRef::Gen(r) => &r.proposed_name,
        }
    }

    pub fn rename(&self) -> Option<&str> {
        match self {
            FoundRef::Text(r) => r.rename.as_deref(),
            FoundRef::Gen(r) => r.rename.as_deref(),
        }
    }

    pub fn set_rename(&mut self, name: String) {
        match self {
            FoundRef::Text(r) => r.rename = Some(name),
            FoundRef::Gen(r) => r.rename = Some(name),
        }
    }

    pub fn exp_info(&self) -> Option<&ExpInfo> {
        match self {
            FoundRef::Text(r) => r.exp_info.as_ref(),
            FoundRef::Gen(r) => Some(&r.exp_info),
        }
    }
}

/// The stable traversal identity of a ref: exporting module path, element
/// name, and a hash of the import arguments when present, so the same
/// declaration instantiated with different arguments stays distinct.
pub fn ref_full_name(reg: &ParsedRegistry, found: &FoundRef) -> String {
    let (module, name) = match found {
        FoundRef::Text(r) => (
            r.module,
            reg.text_module(r.module)
                .map(|m| m.decl_name(r.decl).to_string())
                .unwrap_or_default(),
        ),
        FoundRef::Gen(r) => (r.module, r.name.clone()),
    };
    let mut full = format!("{}::{}", reg.module(module).name(), name);
    if let Some(info) = found.exp_info() {
        if !info.exp_imp_args.is_empty() {
            let mut hasher = DefaultHasher::new();
            for (param, arg) in &info.exp_imp_args {
                param.hash(&mut hasher);
                arg.hash(&mut hasher);
            }
            full.push_str(&format!("#{:x}", hasher.finish()));
        }
    }
    full
}

/// Walk the reference graph from `root`, invoking `visit` on every delivered
/// ref. `visit` returns whether to recurse into the ref's children; refs to
/// generator modules never recurse.
pub fn traverse_refs(
    root: usize,
    reg: &ParsedRegistry,
    mut visit: impl FnMut(&FoundRef) -> bool,
) {
    let mut wave: IndexMap<usize, Vec<FoundRef>> = IndexMap::new();
    if let Some(module) = reg.text_module(root) {
        let seeds = module.decl_order.iter().map(|&decl| {
            FoundRef::Text(TextRef {
                module: root,
                decl,
                proposed_name: module.decl_name(decl).to_string(),
                rename: None,
                exp_info: None,
            })
        });
        wave.entry(root).or_default().extend(seeds);
    }

    while !wave.is_empty() {
        let mut next: IndexMap<usize, Vec<FoundRef>> = IndexMap::new();
        for (module_idx, refs) in wave {
            // one resolve-map build per module sweep, and import problems
            // surface even when nothing in the module gets referenced
            if reg.text_module(module_idx).is_some() {
                let _ = reg.import_resolve_map(module_idx);
            }
            for found in refs {
                if !visit(&found) {
                    continue;
                }
                // generator refs terminate traversal at that node
                if let FoundRef::Text(text_ref) = &found {
                    collect_children(reg, text_ref, &mut next);
                }
            }
        }
        wave = next;
    }
}

/// The standard traversal: visit each distinct [`ref_full_name`] once,
/// collecting the refs in delivery order.
pub fn collect_refs(root: usize, reg: &ParsedRegistry) -> Vec<FoundRef> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    traverse_refs(root, reg, |found| {
        if seen.insert(ref_full_name(reg, found)) {
            out.push(found.clone());
            true
        } else {
            false
        }
    });
    out
}

fn collect_children(
    reg: &ParsedRegistry,
    parent: &TextRef,
    next: &mut IndexMap<usize, Vec<FoundRef>>,
) {
    let Some(module) = reg.text_module(parent.module) else {
        return;
    };
    match parent.decl {
        DeclIdx::Fn(i) => {
            let f = &module.fns[i];
            for call in &f.calls {
                if call.name == f.name {
                    continue;
                }
                resolve_child(reg, parent, module, &call.name, &call.span, Some(&call.resolved), next);
            }
            for ty in &f.type_refs {
                resolve_child(reg, parent, module, &ty.name, &ty.span, Some(&ty.resolved), next);
            }
        }
        DeclIdx::Struct(i) => {
            let s = &module.structs[i];
            for member in &s.members {
                for ty in &member.type_refs {
                    resolve_child(reg, parent, module, &ty.name, &ty.span, Some(&ty.resolved), next);
                }
            }
            for extends in &s.extends {
                resolve_extends(reg, parent, module, extends, next);
            }
        }
        DeclIdx::Var(i) => {
            for ty in &module.vars[i].type_refs {
                resolve_child(reg, parent, module, &ty.name, &ty.span, Some(&ty.resolved), next);
            }
        }
        DeclIdx::Alias(i) => {
            for ty in &module.aliases[i].type_refs {
                resolve_child(reg, parent, module, &ty.name, &ty.span, Some(&ty.resolved), next);
            }
        }
    }
}

/// Name lookup for a reference in a module: import-chain parameters, then
/// exact imports, then the module's own declarations, then a diagnostic.
fn resolve_child(
    reg: &ParsedRegistry,
    parent: &TextRef,
    module: &TextModule,
    name: &str,
    span: &Span,
    cell: Option<&OnceCell<FoundRef>>,
    next: &mut IndexMap<usize, Vec<FoundRef>>,
) {
    // an export parameter of the current import chain is an argument
    // reference, not a declaration
    if let Some(info) = &parent.exp_info {
        if info.exp_imp_args.iter().any(|(param, _)| param == name) {
            return;
        }
    }

    let resolve_map = reg.import_resolve_map(parent.module);
    if let Some(resolved) = resolve_map.get(name) {
        if let Some(found) = import_ref(reg, resolved, name, span, module) {
            if let Some(cell) = cell {
                let _ = cell.set(found.clone());
            }
            next.entry(found.module()).or_default().push(found);
        }
        return;
    }

    if let Some(decl) = module.find_decl(name) {
        let found = FoundRef::Text(TextRef {
            module: parent.module,
            decl,
            proposed_name: name.to_string(),
            rename: None,
            exp_info: local_exp_info(parent),
        });
        if let Some(cell) = cell {
            let _ = cell.set(found.clone());
        }
        next.entry(parent.module).or_default().push(found);
        return;
    }

    emit_at(module, Error::RefNotFound(name.to_string()), span);
}

/// `#extends` targets resolve like imports: through the directive's own
/// `from` path when given, else through the module's resolve map.
fn resolve_extends(
    reg: &ParsedRegistry,
    parent: &TextRef,
    module: &TextModule,
    extends: &ExtendsElem,
    next: &mut IndexMap<usize, Vec<FoundRef>>,
) {
    if extends.path.is_empty() {
        resolve_child(reg, parent, module, extends.leaf.imp_name(), &extends.span, None, next);
        return;
    }
    let mut exp_segments = extends.path.clone();
    exp_segments.push(extends.leaf.name.clone());
    let exp = crate::import::canonicalize(&exp_segments, &module.base_dir());
    let Some((leaf, mod_path)) = exp.split_last() else {
        return;
    };
    let target = reg.module_by_path(mod_path).and_then(|idx| match reg.module(idx) {
        Module::Text(m) => m.find_export(leaf).map(|export| ModuleExport::Text {
            module: idx,
            export,
        }),
        Module::Generator(g) => g
            .exports
            .iter()
            .position(|e| e.name == *leaf)
            .map(|export| ModuleExport::Gen {
                module: idx,
                export,
            }),
    });
    let Some(target) = target else {
        let joined = exp.join("/");
        emit_at(
            module,
            Error::Import(ImportError::ExportNotFound(joined, module.name.clone())),
            &extends.span,
        );
        return;
    };
    let resolved = ResolvedImport {
        target,
        imp_segments: vec![extends.leaf.imp_name().to_string()],
        exp_segments: exp,
        args: extends.leaf.args.clone(),
    };
    if let Some(found) = import_ref(reg, &resolved, extends.leaf.imp_name(), &extends.span, module) {
        next.entry(found.module()).or_default().push(found);
    }
}

/// Build the [`FoundRef`] for an import resolution, pairing export
/// parameters with import arguments.
fn import_ref(
    reg: &ParsedRegistry,
    resolved: &ResolvedImport,
    imp_name: &str,
    span: &Span,
    importer: &TextModule,
) -> Option<FoundRef> {
    match resolved.target {
        ModuleExport::Text { module, export } => {
            let exporter = reg.text_module(module)?;
            let exp = &exporter.exports[export];
            let exp_imp_args = pair_args(
                &exp.params,
                resolved.args.as_deref(),
                imp_name,
                span,
                importer,
                Some((exporter, exp.decl)),
            );
            Some(FoundRef::Text(TextRef {
                module,
                decl: exp.decl,
                proposed_name: imp_name.to_string(),
                rename: None,
                exp_info: Some(ExpInfo {
                    imp_segments: resolved.imp_segments.clone(),
                    exp_segments: resolved.exp_segments.clone(),
                    exp_imp_args,
                }),
            }))
        }
        ModuleExport::Gen { module, export } => {
            let Module::Generator(generator) = reg.module(module) else {
                return None;
            };
            let exp = &generator.exports[export];
            let exp_imp_args = pair_args(
                &exp.params,
                resolved.args.as_deref(),
                imp_name,
                span,
                importer,
                None,
            );
            Some(FoundRef::Gen(GenRef {
                module,
                export,
                name: exp.name.clone(),
                proposed_name: imp_name.to_string(),
                rename: None,
                exp_info: ExpInfo {
                    imp_segments: resolved.imp_segments.clone(),
                    exp_segments: resolved.exp_segments.clone(),
                    exp_imp_args,
                },
            }))
        }
    }
}

/// Zip export parameters with import arguments. On a count mismatch, log at
/// both the import and the export site and keep the shorter pairing.
fn pair_args(
    params: &[String],
    args: Option<&[String]>,
    imp_name: &str,
    imp_span: &Span,
    importer: &TextModule,
    export_site: Option<(&TextModule, DeclIdx)>,
) -> Vec<(String, String)> {
    let args = args.unwrap_or(&[]);
    if params.len() != args.len() {
        let err = ImportError::ParamCountMismatch(imp_name.to_string(), args.len(), params.len());
        emit_at(importer, Error::Import(err.clone()), imp_span);
        if let Some((exporter, decl)) = export_site {
            let span = exporter.decl_name_span(decl).clone();
            emit_at(exporter, Error::Import(err), &span);
        }
    }
    params
        .iter()
        .zip(args.iter())
        .map(|(p, a)| (p.clone(), a.clone()))
        .collect()
}

#[cfg(not(feature = "importing"))]
fn local_exp_info(_parent: &TextRef) -> Option<ExpInfo> {
    None
}

/// With the `importing` feature, import arguments thread through local
/// references transitively, so a support function sees the chain's
/// parameter bindings.
#[cfg(feature = "importing")]
fn local_exp_info(parent: &TextRef) -> Option<ExpInfo> {
    parent.exp_info.clone()
}

fn emit_at(module: &TextModule, error: Error, span: &Span) {
    let (source, span) = module
        .src_map
        .map_span(span)
        .unwrap_or_else(|| (module.prepped.clone(), span.clone()));
    Diagnostic::new(error).with_source(source).with_span(span).emit();
}
