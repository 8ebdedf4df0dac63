//! The module registry: owns the parsed modules keyed by canonical path and
//! by source file path, and memoizes the per-module import resolve maps.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use itertools::Itertools;
use stitch_parse::SrcText;

use crate::condcomp::{self, Features};
use crate::grammar;
use crate::import::{build_resolve_map, ResolveMap};
use crate::syntax::{GeneratorModule, Module, TextModule};

/// A named string template a module can select with `#template`.
/// Application happens in the emitter; the registry only keeps the
/// association.
#[derive(Clone)]
pub struct Template {
    pub name: String,
    pub apply: Rc<dyn Fn(&str, &IndexMap<String, String>) -> String>,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct RegistryParams {
    /// Source path → WGSL text.
    pub wgsl: IndexMap<String, String>,
    pub generators: Vec<GeneratorModule>,
    pub templates: Vec<Template>,
    /// Feature flags for `#if` preprocessing.
    pub conditions: Features,
    /// Parse budget per module; `None` means unbounded.
    pub max_parse_count: Option<usize>,
}

pub struct Registry {
    params: RegistryParams,
    parsed: OnceCell<ParsedRegistry>,
}

impl Registry {
    pub fn new(params: RegistryParams) -> Self {
        Self {
            params,
            parsed: OnceCell::new(),
        }
    }

    /// The parsed view of every registered module; built on first use.
    pub fn parsed(&self) -> &ParsedRegistry {
        self.parsed
            .get_or_init(|| ParsedRegistry::build(&self.params))
    }

    pub fn find_text_module(&self, path_or_name: &str) -> Option<usize> {
        self.parsed().find_text_module(path_or_name)
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.params.templates.iter().find(|t| t.name == name)
    }
}

pub struct ParsedRegistry {
    modules: Vec<Module>,
    by_path: HashMap<String, usize>,
    by_file: HashMap<String, usize>,
    resolve_maps: RefCell<HashMap<usize, Rc<ResolveMap>>>,
}

impl ParsedRegistry {
    fn build(params: &RegistryParams) -> Self {
        let mut modules = Vec::new();
        for (path, source) in &params.wgsl {
            let src = SrcText::new(path.clone(), source.clone());
            let prepped = condcomp::run(&src, &params.conditions);
            let state = grammar::parse_elements(
                &prepped.text,
                Some(&prepped.src_map),
                params.max_parse_count,
            );
            modules.push(Module::Text(TextModule::from_elems(
                file_stem(path),
                Some(path.clone()),
                src,
                prepped.text,
                prepped.src_map,
                state.elems,
            )));
        }
        for generator in &params.generators {
            modules.push(Module::Generator(generator.clone()));
        }

        let mut by_path = HashMap::new();
        let mut by_file = HashMap::new();
        for (i, module) in modules.iter().enumerate() {
            match module {
                Module::Text(m) => {
                    by_path.entry(m.name.clone()).or_insert(i);
                    if let Some(file) = &m.file_name {
                        by_file.insert(file.clone(), i);
                        by_path.entry(file_stem(file)).or_insert(i);
                    }
                }
                Module::Generator(g) => {
                    by_path.entry(g.name.clone()).or_insert(i);
                }
            }
        }
        Self {
            modules,
            by_path,
            by_file,
            resolve_maps: RefCell::new(HashMap::new()),
        }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, idx: usize) -> &Module {
        &self.modules[idx]
    }

    pub fn text_module(&self, idx: usize) -> Option<&TextModule> {
        self.modules.get(idx).and_then(Module::as_text)
    }

    /// Find a text module by canonical path, file path, or file stem.
    pub fn find_text_module(&self, path_or_name: &str) -> Option<usize> {
        self.by_path
            .get(path_or_name)
            .or_else(|| self.by_file.get(path_or_name))
            .copied()
            .filter(|&idx| self.modules[idx].as_text().is_some())
    }

    /// Look up any module (text or generator) by canonical path segments.
    pub fn module_by_path(&self, segments: &[String]) -> Option<usize> {
        let joined = segments.iter().join("/");
        self.by_path.get(&joined).copied()
    }

    /// The import resolve map for a module, built once and memoized.
    pub fn import_resolve_map(&self, idx: usize) -> Rc<ResolveMap> {
        if let Some(map) = self.resolve_maps.borrow().get(&idx) {
            return map.clone();
        }
        let map = Rc::new(build_resolve_map(self, idx));
        self.resolve_maps.borrow_mut().insert(idx, map.clone());
        map
    }
}

/// `shaders/util.wgsl` → `shaders/util`.
fn file_stem(path: &str) -> String {
    let cut = match (path.rfind('.'), path.rfind('/')) {
        (Some(dot), Some(slash)) if dot > slash => dot,
        (Some(dot), None) => dot,
        _ => path.len(),
    };
    path[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_strips_only_extension() {
        assert_eq!(file_stem("shaders/util.wgsl"), "shaders/util");
        assert_eq!(file_stem("main.wgsl"), "main");
        assert_eq!(file_stem("no_ext"), "no_ext");
        assert_eq!(file_stem("v1.2/file.wgsl"), "v1.2/file");
    }

    #[test]
    fn registry_indexes_module_decl_and_file() {
        let mut wgsl = IndexMap::new();
        wgsl.insert(
            "bar.wgsl".to_string(),
            "module lighting; fn glow() {}".to_string(),
        );
        let registry = Registry::new(RegistryParams {
            wgsl,
            ..Default::default()
        });
        let parsed = registry.parsed();
        let by_decl = parsed.find_text_module("lighting").unwrap();
        let by_file = parsed.find_text_module("bar.wgsl").unwrap();
        let by_stem = parsed.find_text_module("bar").unwrap();
        assert_eq!(by_decl, by_file);
        assert_eq!(by_decl, by_stem);
        assert_eq!(parsed.module(by_decl).name(), "lighting");
    }
}
