//! Import resolution: flattening a module's import trees into a
//! [`ResolveMap`] from import path to exporting declaration, built once per
//! module and memoized by the registry.

use indexmap::IndexMap;
use itertools::Itertools;
use thiserror::Error;

use crate::error::Diagnostic;
use crate::registry::ParsedRegistry;
use crate::syntax::Module;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("export not found for import `{0}` in module `{1}`")]
    ExportNotFound(String, String),
    #[error("import `{0}` does not name a module in module `{1}`")]
    ModuleNotFound(String, String),
    #[error("import/export parameter count mismatch for `{0}`: {1} argument(s) for {2} parameter(s)")]
    ParamCountMismatch(String, usize, usize),
}

/// The declaration an import path resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleExport {
    Text { module: usize, export: usize },
    Gen { module: usize, export: usize },
}

#[derive(Clone, Debug)]
pub struct ResolvedImport {
    pub target: ModuleExport,
    pub imp_segments: Vec<String>,
    /// Canonicalized exporter-side path.
    pub exp_segments: Vec<String>,
    pub args: Option<Vec<String>>,
}

/// Per-module table from import path to export, plus the
/// `(imp_segments, exp_segments)` listing used in diagnostics.
#[derive(Debug, Default)]
pub struct ResolveMap {
    /// Keyed by both the bare leaf name (`as`-rename applied) and the full
    /// slash-joined import path.
    pub exports: IndexMap<String, ResolvedImport>,
    pub pairs: Vec<(Vec<String>, Vec<String>)>,
}

impl ResolveMap {
    pub fn get(&self, imp_path: &str) -> Option<&ResolvedImport> {
        self.exports.get(imp_path)
    }
}

/// Resolve `.` and `..` segments against the importing module's directory;
/// absolute paths pass through unchanged.
pub fn canonicalize(segments: &[String], base_dir: &[String]) -> Vec<String> {
    let relative = matches!(segments.first().map(String::as_str), Some(".") | Some(".."));
    let mut out: Vec<String> = if relative { base_dir.to_vec() } else { Vec::new() };
    for seg in segments {
        match seg.as_str() {
            "." => {}
            ".." => {
                out.pop();
            }
            _ => out.push(seg.clone()),
        }
    }
    out
}

pub(crate) fn build_resolve_map(reg: &ParsedRegistry, module_idx: usize) -> ResolveMap {
    let Module::Text(module) = reg.module(module_idx) else {
        return ResolveMap::default();
    };
    let base = module.base_dir();
    let mut map = ResolveMap::default();

    for tree in &module.imports {
        for flat in tree.flatten() {
            let exp = canonicalize(&flat.exp_segments, &base);
            let Some((leaf, mod_path)) = exp.split_last() else {
                continue;
            };
            let imp_name = flat
                .imp_segments
                .last()
                .cloned()
                .unwrap_or_else(|| leaf.clone());

            let Some(exporter_idx) = reg.module_by_path(mod_path) else {
                let err = ImportError::ModuleNotFound(
                    flat.exp_segments.iter().join("/"),
                    module.name.clone(),
                );
                emit_import_diag(module, err, &tree.span);
                continue;
            };
            let target = match reg.module(exporter_idx) {
                Module::Text(exporter) => exporter
                    .find_export(leaf)
                    .map(|export| ModuleExport::Text {
                        module: exporter_idx,
                        export,
                    }),
                Module::Generator(exporter) => exporter
                    .exports
                    .iter()
                    .position(|e| e.name == *leaf)
                    .map(|export| ModuleExport::Gen {
                        module: exporter_idx,
                        export,
                    }),
            };
            let Some(target) = target else {
                let err = ImportError::ExportNotFound(
                    flat.exp_segments.iter().join("/"),
                    module.name.clone(),
                );
                emit_import_diag(module, err, &tree.span);
                continue;
            };

            let resolved = ResolvedImport {
                target,
                imp_segments: flat.imp_segments.clone(),
                exp_segments: exp.clone(),
                args: flat.args.clone(),
            };
            map.exports
                .entry(flat.imp_segments.iter().join("/"))
                .or_insert_with(|| resolved.clone());
            map.exports.entry(imp_name).or_insert(resolved);
            map.pairs.push((flat.imp_segments, flat.exp_segments));
        }
    }
    map
}

fn emit_import_diag(module: &crate::syntax::TextModule, err: ImportError, span: &stitch_parse::Span) {
    let (source, span) = module
        .src_map
        .map_span(span)
        .unwrap_or_else(|| (module.prepped.clone(), span.clone()));
    Diagnostic::new(err).with_source(source).with_span(span).emit();
}
