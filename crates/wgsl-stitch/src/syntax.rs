//! The element model produced by parsing a module: a flat, source-ordered
//! list of tagged records rather than a full syntax tree. Only the pieces
//! linking needs survive: declarations, the references between them, and the
//! import/module/export directives.

use std::cell::OnceCell;
use std::rc::Rc;

use derive_more::derive::From;
use indexmap::IndexMap;
use itertools::Itertools;
use stitch_parse::log;
use stitch_parse::srcline::caret_excerpt;
use stitch_parse::{Span, SrcMap, SrcText};

use crate::traverse::FoundRef;

/// One syntactic construct discovered during parsing, in source order.
#[derive(Clone, Debug, From)]
pub enum Elem {
    Fn(FnElem),
    Struct(StructElem),
    Member(MemberElem),
    Var(VarElem),
    Alias(AliasElem),
    Call(CallElem),
    TypeRef(TypeRefElem),
    TreeImport(ImportTree),
    Extends(ExtendsElem),
    Module(ModuleElem),
    Export(ExportElem),
    Template(TemplateElem),
    GlobalDirective(DirectiveElem),
}

#[derive(Clone, Debug)]
pub struct FnElem {
    pub name: String,
    pub name_span: Span,
    pub span: Span,
    pub calls: Vec<CallElem>,
    pub type_refs: Vec<TypeRefElem>,
}

#[derive(Clone, Debug)]
pub struct StructElem {
    pub name: String,
    pub name_span: Span,
    pub span: Span,
    pub members: Vec<MemberElem>,
    /// `#extends` directives attached to this struct.
    pub extends: Vec<ExtendsElem>,
}

#[derive(Clone, Debug)]
pub struct MemberElem {
    pub name: String,
    pub span: Span,
    pub type_refs: Vec<TypeRefElem>,
}

/// Module-scope `var`, `const`, `override` or `let`.
#[derive(Clone, Debug)]
pub struct VarElem {
    pub name: String,
    pub name_span: Span,
    pub span: Span,
    pub type_refs: Vec<TypeRefElem>,
}

#[derive(Clone, Debug)]
pub struct AliasElem {
    pub name: String,
    pub name_span: Span,
    pub target: String,
    pub span: Span,
    pub type_refs: Vec<TypeRefElem>,
}

/// A function call site. `resolved` is the back-pointer filled during
/// traversal; it stays unset when resolution failed (a diagnostic was
/// emitted instead).
#[derive(Clone, Debug)]
pub struct CallElem {
    pub name: String,
    pub span: Span,
    pub resolved: OnceCell<FoundRef>,
}

impl CallElem {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
            resolved: OnceCell::new(),
        }
    }
}

/// A use of a (possibly imported) type name.
#[derive(Clone, Debug)]
pub struct TypeRefElem {
    pub name: String,
    pub span: Span,
    pub resolved: OnceCell<FoundRef>,
}

impl TypeRefElem {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
            resolved: OnceCell::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExtendsElem {
    pub leaf: SimpleSegment,
    /// `from` path segments, possibly relative.
    pub path: Vec<String>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ModuleElem {
    pub path: Vec<String>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ExportElem {
    pub params: Vec<String>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TemplateElem {
    pub name: String,
    pub span: Span,
}

/// `diagnostic`, `enable`, `requires` or a module-scope `const_assert`.
#[derive(Clone, Debug)]
pub struct DirectiveElem {
    pub keyword: String,
    pub span: Span,
}

/// A parsed import directive: `import a::b::{c, d::e}` becomes a path of
/// segments whose last element may be a list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportTree {
    pub segments: Vec<Segment>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Simple(SimpleSegment),
    List(Vec<ImportTree>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleSegment {
    pub name: String,
    pub args: Option<Vec<String>>,
    pub as_name: Option<String>,
}

impl SimpleSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
            as_name: None,
        }
    }

    /// The name the importing module refers to this segment by.
    pub fn imp_name(&self) -> &str {
        self.as_name.as_deref().unwrap_or(&self.name)
    }
}

/// One leaf of a flattened import tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatImport {
    /// The path the importing module uses, `as`-rename applied at the leaf.
    pub imp_segments: Vec<String>,
    /// The exporter-side canonical path.
    pub exp_segments: Vec<String>,
    pub args: Option<Vec<String>>,
}

impl ImportTree {
    /// Expand the tree into its `(imp_segments, exp_segments)` leaf paths.
    pub fn flatten(&self) -> Vec<FlatImport> {
        let mut out = Vec::new();
        self.flatten_into(&[], &[], &mut out);
        out
    }

    fn flatten_into(&self, imp_prefix: &[String], exp_prefix: &[String], out: &mut Vec<FlatImport>) {
        let mut imp: Vec<String> = imp_prefix.to_vec();
        let mut exp: Vec<String> = exp_prefix.to_vec();
        let last = self.segments.len().saturating_sub(1);
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Simple(s) if i == last => {
                    let mut imp = imp.clone();
                    let mut exp = exp.clone();
                    imp.push(s.imp_name().to_string());
                    exp.push(s.name.clone());
                    out.push(FlatImport {
                        imp_segments: imp,
                        exp_segments: exp,
                        args: s.args.clone(),
                    });
                }
                Segment::Simple(s) => {
                    imp.push(s.name.clone());
                    exp.push(s.name.clone());
                }
                Segment::List(trees) => {
                    for tree in trees {
                        tree.flatten_into(&imp, &exp, out);
                    }
                }
            }
        }
    }
}

/// Index of a top-level declaration within its module's categorized lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclIdx {
    Fn(usize),
    Struct(usize),
    Var(usize),
    Alias(usize),
}

/// An exported declaration, with the type parameters declared on
/// `#export (A, B)` (empty for plain `export`).
#[derive(Clone, Debug)]
pub struct TextExport {
    pub name: String,
    pub params: Vec<String>,
    pub decl: DeclIdx,
}

/// A registered generator export: a callable body instead of text.
#[derive(Clone)]
pub struct GeneratorExport {
    pub name: String,
    pub params: Vec<String>,
    pub generate: Rc<dyn Fn(&IndexMap<String, String>) -> String>,
}

impl std::fmt::Debug for GeneratorExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorExport")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct GeneratorModule {
    pub name: String,
    pub exports: Vec<GeneratorExport>,
}

#[derive(Debug)]
pub enum Module {
    Text(TextModule),
    Generator(GeneratorModule),
}

impl Module {
    pub fn name(&self) -> &str {
        match self {
            Module::Text(m) => &m.name,
            Module::Generator(m) => &m.name,
        }
    }

    pub fn as_text(&self) -> Option<&TextModule> {
        match self {
            Module::Text(m) => Some(m),
            Module::Generator(_) => None,
        }
    }
}

/// A parsed text module. `prepped` is the preprocessed source actually
/// parsed; `src_map` projects positions in it back to `src`.
#[derive(Debug)]
pub struct TextModule {
    /// Canonical path, segments joined by `/`.
    pub name: String,
    pub file_name: Option<String>,
    pub src: Rc<SrcText>,
    pub prepped: Rc<SrcText>,
    pub src_map: SrcMap,
    pub exports: Vec<TextExport>,
    pub fns: Vec<FnElem>,
    pub structs: Vec<StructElem>,
    pub vars: Vec<VarElem>,
    pub aliases: Vec<AliasElem>,
    pub imports: Vec<ImportTree>,
    /// Top-level declarations in source order.
    pub decl_order: Vec<DeclIdx>,
    /// Name selected by a `#template` directive, applied by the emitter.
    pub template: Option<String>,
}

impl TextModule {
    /// Assemble a module from the parser's flat element list, attaching
    /// pending `export`/`#extends` directives to the declaration that
    /// follows them.
    pub fn from_elems(
        default_name: String,
        file_name: Option<String>,
        src: Rc<SrcText>,
        prepped: Rc<SrcText>,
        src_map: SrcMap,
        elems: Vec<Elem>,
    ) -> Self {
        let mut module = TextModule {
            name: default_name,
            file_name,
            src,
            prepped,
            src_map,
            exports: Vec::new(),
            fns: Vec::new(),
            structs: Vec::new(),
            vars: Vec::new(),
            aliases: Vec::new(),
            imports: Vec::new(),
            decl_order: Vec::new(),
            template: None,
        };
        let mut named = false;
        let mut pending_export: Option<ExportElem> = None;
        let mut pending_extends: Vec<ExtendsElem> = Vec::new();

        for elem in elems {
            match elem {
                Elem::Fn(f) => {
                    let decl = DeclIdx::Fn(module.fns.len());
                    if let Some(export) = pending_export.take() {
                        module.exports.push(TextExport {
                            name: f.name.clone(),
                            params: export.params,
                            decl,
                        });
                    }
                    module.drop_pending_extends(&mut pending_extends);
                    module.decl_order.push(decl);
                    module.fns.push(f);
                }
                Elem::Struct(mut s) => {
                    let decl = DeclIdx::Struct(module.structs.len());
                    if let Some(export) = pending_export.take() {
                        module.exports.push(TextExport {
                            name: s.name.clone(),
                            params: export.params,
                            decl,
                        });
                    }
                    s.extends = std::mem::take(&mut pending_extends);
                    module.decl_order.push(decl);
                    module.structs.push(s);
                }
                Elem::Var(v) => {
                    module.drop_pending_extends(&mut pending_extends);
                    module.decl_order.push(DeclIdx::Var(module.vars.len()));
                    module.vars.push(v);
                }
                Elem::Alias(a) => {
                    module.drop_pending_extends(&mut pending_extends);
                    module.decl_order.push(DeclIdx::Alias(module.aliases.len()));
                    module.aliases.push(a);
                }
                Elem::TreeImport(tree) => module.imports.push(tree),
                Elem::Extends(e) => pending_extends.push(e),
                Elem::Module(m) => {
                    if !named {
                        module.name = m.path.iter().join("/");
                        named = true;
                    }
                }
                Elem::Export(e) => pending_export = Some(e),
                Elem::Template(t) => module.template = Some(t.name),
                Elem::GlobalDirective(_) | Elem::Member(_) | Elem::Call(_) | Elem::TypeRef(_) => {}
            }
        }
        if let Some(export) = pending_export {
            log::log(&caret_excerpt(
                "export directive not followed by a declaration",
                &module.prepped.text,
                export.span.start,
            ));
        }
        module.drop_pending_extends(&mut pending_extends);
        module
    }

    fn drop_pending_extends(&self, pending: &mut Vec<ExtendsElem>) {
        for extends in pending.drain(..) {
            log::log(&caret_excerpt(
                "#extends not followed by a struct",
                &self.prepped.text,
                extends.span.start,
            ));
        }
    }

    pub fn path_segments(&self) -> Vec<String> {
        self.name.split('/').map(str::to_string).collect()
    }

    /// The directory segments relative imports resolve against.
    pub fn base_dir(&self) -> Vec<String> {
        let mut segments = self.path_segments();
        segments.pop();
        segments
    }

    pub fn decl_name(&self, idx: DeclIdx) -> &str {
        match idx {
            DeclIdx::Fn(i) => &self.fns[i].name,
            DeclIdx::Struct(i) => &self.structs[i].name,
            DeclIdx::Var(i) => &self.vars[i].name,
            DeclIdx::Alias(i) => &self.aliases[i].name,
        }
    }

    pub fn decl_name_span(&self, idx: DeclIdx) -> &Span {
        match idx {
            DeclIdx::Fn(i) => &self.fns[i].name_span,
            DeclIdx::Struct(i) => &self.structs[i].name_span,
            DeclIdx::Var(i) => &self.vars[i].name_span,
            DeclIdx::Alias(i) => &self.aliases[i].name_span,
        }
    }

    /// Local declaration lookup used by reference resolution: functions,
    /// structs and aliases are name targets; vars are only roots.
    pub fn find_decl(&self, name: &str) -> Option<DeclIdx> {
        if let Some(i) = self.fns.iter().position(|f| f.name == name) {
            return Some(DeclIdx::Fn(i));
        }
        if let Some(i) = self.structs.iter().position(|s| s.name == name) {
            return Some(DeclIdx::Struct(i));
        }
        if let Some(i) = self.aliases.iter().position(|a| a.name == name) {
            return Some(DeclIdx::Alias(i));
        }
        None
    }

    pub fn find_export(&self, name: &str) -> Option<usize> {
        self.exports.iter().position(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(segments: Vec<Segment>) -> ImportTree {
        ImportTree {
            segments,
            span: Span::default(),
        }
    }

    #[test]
    fn flatten_single_leaf() {
        let t = tree(vec![
            Segment::Simple(SimpleSegment::new("a")),
            Segment::Simple(SimpleSegment::new("b")),
            Segment::Simple(SimpleSegment::new("c")),
        ]);
        let flat = t.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].imp_segments, ["a", "b", "c"]);
        assert_eq!(flat[0].exp_segments, ["a", "b", "c"]);
    }

    #[test]
    fn flatten_list_and_rename() {
        // import a::{c, d::e as f}
        let t = tree(vec![
            Segment::Simple(SimpleSegment::new("a")),
            Segment::List(vec![
                tree(vec![Segment::Simple(SimpleSegment::new("c"))]),
                tree(vec![
                    Segment::Simple(SimpleSegment::new("d")),
                    Segment::Simple(SimpleSegment {
                        name: "e".to_string(),
                        args: None,
                        as_name: Some("f".to_string()),
                    }),
                ]),
            ]),
        ]);
        let flat = t.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].imp_segments, ["a", "c"]);
        assert_eq!(flat[1].imp_segments, ["a", "d", "f"]);
        assert_eq!(flat[1].exp_segments, ["a", "d", "e"]);
    }
}
