//! A WGSL module linker: parses a root module plus its auxiliary modules,
//! follows import directives across the module graph, binds every call and
//! type reference to the declaration it names, and decides the renames a
//! final emission pass needs to produce one collision-free WGSL text.
//!
//! The pipeline:
//!
//! 1. [`condcomp`] evaluates `#if`/`#else`/`#endif` over the registry's
//!    feature conditions, preserving positions and producing a source map.
//! 2. [`grammar`] parses each module into a flat element list (functions,
//!    structs, vars, aliases, imports, directives) on the
//!    [`stitch_parse`] combinator engine.
//! 3. [`Registry`] owns the parsed modules, keyed by canonical path and by
//!    file path, and memoizes each module's import [`ResolveMap`].
//! 4. [`traverse_refs`] walks the transitive reference graph from the root,
//!    delivering [`FoundRef`]s breadth-first grouped by module.
//! 5. [`assign_unique_names`] resolves name collisions; the downstream
//!    emitter consumes the ref stream.
//!
//! # Example
//!
//! ```rust
//! use indexmap::IndexMap;
//! use wgsl_stitch::{collect_refs, Registry, RegistryParams};
//!
//! let mut wgsl = IndexMap::new();
//! wgsl.insert(
//!     "main.wgsl".to_string(),
//!     "import bar::foo; module main; fn main() { foo(); }".to_string(),
//! );
//! wgsl.insert("bar.wgsl".to_string(), "module bar; export fn foo() { }".to_string());
//! let registry = Registry::new(RegistryParams { wgsl, ..Default::default() });
//! let root = registry.find_text_module("main").unwrap();
//! let refs = collect_refs(root, registry.parsed());
//! assert_eq!(refs.len(), 2);
//! ```
//!
//! Diagnostics never abort a link: errors are reported through the
//! [`stitch_parse::log`] sink and the operation continues with what
//! resolved.

mod builtin;
pub mod condcomp;
pub mod error;
pub mod grammar;
pub mod import;
pub mod mangle;
pub mod registry;
pub mod syntax;
pub mod traverse;

pub use condcomp::{CondCompError, Features, Prepped};
pub use error::{Diagnostic, Error};
pub use grammar::WgslState;
pub use import::{canonicalize, ImportError, ModuleExport, ResolveMap, ResolvedImport};
pub use mangle::assign_unique_names;
pub use registry::{ParsedRegistry, Registry, RegistryParams, Template};
pub use syntax::{
    AliasElem, CallElem, DeclIdx, Elem, ExportElem, ExtendsElem, FlatImport, FnElem,
    GeneratorExport, GeneratorModule, ImportTree, MemberElem, Module, ModuleElem, Segment,
    SimpleSegment, StructElem, TextExport, TextModule, TypeRefElem, VarElem,
};
pub use traverse::{
    collect_refs, ref_full_name, traverse_refs, ExpInfo, FoundRef, GenRef, TextRef,
};
