//! The WGSL grammar, built on the combinator engine. Parsing appends
//! [`Elem`]s to the parse state in source order; function bodies are skimmed
//! for calls and type references rather than fully parsed.

use std::rc::Rc;
use std::sync::LazyLock;

use stitch_parse::combinator::{
    any_not, any_through, disable_pre_parse, kind, lazy, opt, or, pre_parse, repeat, req, req_msg,
    seq, text, tokens, with_sep,
};
use stitch_parse::{
    match_one_of, BoxedParser, MapArgs, ParseCtx, ParseState, Parser, Span, SrcMap, SrcText, Step,
    Tags, Token, TokenMatcher,
};

use crate::builtin::{is_builtin_fn, is_builtin_type, is_keyword};
use crate::syntax::{
    AliasElem, CallElem, DirectiveElem, Elem, ExportElem, ExtendsElem, FnElem, ImportTree,
    MemberElem, ModuleElem, Segment, SimpleSegment, StructElem, TemplateElem, TypeRefElem, VarElem,
};

/// Parse state for one module: the completed elements plus the pending
/// calls, type references and struct members of the declaration currently
/// being parsed.
#[derive(Debug, Default)]
pub struct WgslState {
    pub elems: Vec<Elem>,
    calls: Vec<CallElem>,
    type_refs: Vec<TypeRefElem>,
    members: Vec<MemberElem>,
}

impl ParseState for WgslState {
    type Tag = Token;
}

impl WgslState {
    fn push_call(&mut self, name: &str, span: Span) {
        if !is_builtin_fn(name) && !is_builtin_type(name) {
            self.calls.push(CallElem::new(name, span));
        }
    }

    fn push_type_ref(&mut self, name: &str, span: Span) {
        if !is_builtin_type(name) && !is_keyword(name) {
            self.type_refs.push(TypeRefElem::new(name, span));
        }
    }

    fn take_calls(&mut self) -> Vec<CallElem> {
        std::mem::take(&mut self.calls)
    }

    fn take_type_refs(&mut self) -> Vec<TypeRefElem> {
        std::mem::take(&mut self.type_refs)
    }

    fn take_members(&mut self) -> Vec<MemberElem> {
        std::mem::take(&mut self.members)
    }
}

/// Parse one (preprocessed) module source into its element list.
pub fn parse_elements(
    prepped: &Rc<SrcText>,
    src_map: Option<&SrcMap>,
    max_parse_count: Option<usize>,
) -> WgslState {
    let mut state = WgslState::default();
    {
        let mut cx = ParseCtx::new(&prepped.text, main_tokens(), &["ws"], &mut state);
        if let Some(map) = src_map {
            cx = cx.with_src_map(map);
        }
        if let Some(max) = max_parse_count {
            cx = cx.with_max_parse_count(max);
        }
        root().parse(&mut cx);
    }
    state
}

// ---------------------------------------------------------------------------
// token sets

pub(crate) fn main_tokens() -> TokenMatcher {
    static MAIN: LazyLock<TokenMatcher> = LazyLock::new(|| {
        TokenMatcher::new(&[
            ("directive", r"#[a-zA-Z_]\w*"),
            ("word", r"[a-zA-Z_]\w*"),
            (
                "digits",
                r"0[xX][0-9a-fA-F]+[iu]?|\d+\.\d*(?:[eE][+-]?\d+)?[fh]?|\.\d+(?:[eE][+-]?\d+)?[fh]?|\d+(?:[eE][+-]?\d+)?[iufh]?",
            ),
            (
                "symbol",
                &match_one_of(
                    "// /* */ -> => && || ++ -- <= >= == != += -= *= /= %= &= |= ^= :: \
                     { } ( ) [ ] < > : ; , . = + - * / % & | ^ ! ~ @ ?",
                ),
            ),
            ("ws", r"\s+"),
        ])
        .expect("main token patterns")
    });
    MAIN.clone()
}

/// Line-oriented tokens for directives: newlines are significant.
pub(crate) fn directive_tokens() -> TokenMatcher {
    static DIRECTIVE: LazyLock<TokenMatcher> = LazyLock::new(|| {
        TokenMatcher::new(&[
            ("word", r"[a-zA-Z_]\w*"),
            ("digits", r"\d+\w*"),
            ("symbol", &match_one_of(":: // /* */ .. { } ( ) , ; . / * -> =")),
            ("eol", r"\r?\n|\r"),
            ("ws", r"[ \t]+"),
        ])
        .expect("directive token patterns")
    });
    DIRECTIVE.clone()
}

fn line_rest_tokens() -> TokenMatcher {
    static REST: LazyLock<TokenMatcher> =
        LazyLock::new(|| TokenMatcher::new(&[("rest", r"[^\n]+\n?|\n")]).expect("rest pattern"));
    REST.clone()
}

fn comment_body_tokens() -> TokenMatcher {
    static BODY: LazyLock<TokenMatcher> = LazyLock::new(|| {
        TokenMatcher::new(&[
            ("close", r"\*/"),
            ("open", r"/\*"),
            ("chunk", r"[^*/]+"),
            ("punct", r"[*/]"),
        ])
        .expect("comment body patterns")
    });
    BODY.clone()
}

// ---------------------------------------------------------------------------
// comments (attempted before every token via pre_parse)

fn comment() -> impl Parser<WgslState, Out = ()> {
    or((line_comment(), block_comment()))
}

fn line_comment() -> impl Parser<WgslState, Out = ()> {
    Parser::<WgslState>::map(
        seq((text("//"), tokens(line_rest_tokens(), opt(kind("rest"))))),
        |_| (),
    )
}

fn block_comment() -> impl Parser<WgslState, Out = ()> {
    seq((text("/*"), tokens(comment_body_tokens(), comment_body()))).map(|_| ())
}

fn comment_body() -> BoxedParser<WgslState, ()> {
    disable_pre_parse(seq((
        repeat(or((
            Parser::<WgslState>::map(seq((kind("open"), lazy(comment_body))), |_| ()),
            Parser::<WgslState>::map(any_not(kind("close")), |_| ()),
        ))),
        req_msg(kind("close"), "closing `*/`"),
    )))
    .map(|_| ())
    .boxed()
}

// ---------------------------------------------------------------------------
// top level

fn root() -> impl Parser<WgslState, Out = ()> {
    pre_parse(comment(), repeat(top_level())).map(|_| ())
}

fn top_level() -> impl Parser<WgslState, Out = ()> {
    or((
        import_stmt(),
        module_stmt(),
        export_directive(),
        extends_directive(),
        template_directive(),
        global_directive(),
        fn_decl(),
        struct_decl(),
        global_alias(),
        global_var(),
        // recovery: skip a token no production recognizes
        Parser::<WgslState>::map(stitch_parse::combinator::any(), |_| ()),
    ))
}

fn name_from_tags(tags: &Tags<Token>, fallback: &Span) -> (String, Span) {
    match tags.get("name").first() {
        Some(tok) => (tok.text.clone(), tok.span.clone()),
        None => (String::new(), Span::at(fallback.start)),
    }
}

// ---------------------------------------------------------------------------
// directives

fn import_stmt() -> impl Parser<WgslState, Out = ()> {
    seq((
        or((text("import"), text("#import"))),
        tokens(
            directive_tokens(),
            req(import_clause().named("import clause")),
        ),
    ))
    .map(|_| ())
}

fn import_clause() -> impl Parser<WgslState, Out = ()> {
    or((from_style(), tree_style())).map_with(|args: MapArgs<ImportTree, WgslState>| {
        args.state.elems.push(Elem::TreeImport(args.value));
    })
}

/// `name(args)? (as alias)? from path`: the hash-style and source-relative
/// import form.
fn from_style() -> impl Parser<WgslState, Out = ImportTree> {
    seq((
        kind("word"),
        opt(import_args()),
        opt(as_clause()),
        text("from"),
        import_path(),
        opt(or((text(";"), kind("eol")))),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (name, import_args, as_name, _, path, _) = args.value;
        let mut segments: Vec<Segment> = path
            .into_iter()
            .map(|s| Segment::Simple(SimpleSegment::new(s)))
            .collect();
        segments.push(Segment::Simple(SimpleSegment {
            name: name.text,
            args: import_args,
            as_name,
        }));
        ImportTree {
            segments,
            span: args.span,
        }
    })
}

/// `a::b::{c, d as e};`: the tree import form.
fn tree_style() -> impl Parser<WgslState, Out = ImportTree> {
    seq((import_tree(), req(text(";")))).map(|(tree, _)| tree)
}

fn import_tree() -> BoxedParser<WgslState, ImportTree> {
    seq((
        tree_segment(),
        repeat(seq((or((text("::"), text("/"))), tree_segment())).map(|(_, seg)| seg)),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (first, rest) = args.value;
        let mut segments = vec![first];
        segments.extend(rest);
        ImportTree {
            segments,
            span: args.span,
        }
    })
    .boxed()
}

fn tree_segment() -> BoxedParser<WgslState, Segment> {
    or((
        seq((
            text("{"),
            with_sep(text(","), lazy(import_tree)),
            req(text("}")),
        ))
        .map(|(_, trees, _)| Segment::List(trees)),
        Parser::<WgslState>::map(text(".."), |_| Segment::Simple(SimpleSegment::new(".."))),
        Parser::<WgslState>::map(text("."), |_| Segment::Simple(SimpleSegment::new("."))),
        seq((kind("word"), opt(import_args()), opt(as_clause()))).map(|(name, args, as_name)| {
            Segment::Simple(SimpleSegment {
                name: name.text,
                args,
                as_name,
            })
        }),
    ))
    .boxed()
}

fn import_args() -> impl Parser<WgslState, Out = Vec<String>> {
    Parser::<WgslState>::map(
        seq((
            text("("),
            with_sep(text(","), or((kind("word"), kind("digits")))),
            req(text(")")),
        )),
        |(_, args, _): (Token, Vec<Token>, Option<Token>)| {
            args.into_iter().map(|t| t.text).collect()
        },
    )
}

fn as_clause() -> impl Parser<WgslState, Out = String> {
    Parser::<WgslState>::map(
        seq((text("as"), req(kind("word")))),
        |(_, w): (Token, Option<Token>)| w.map(|t| t.text).unwrap_or_default(),
    )
}

fn import_path() -> impl Parser<WgslState, Out = Vec<String>> {
    Parser::<WgslState>::map(
        with_sep(text("/"), or((text(".."), text("."), kind("word")))),
        |segments: Vec<Token>| segments.into_iter().map(|t| t.text).collect(),
    )
}

fn module_stmt() -> impl Parser<WgslState, Out = ()> {
    seq((
        text("module"),
        tokens(
            directive_tokens(),
            seq((
                Parser::<WgslState>::tag(kind("word"), "seg"),
                repeat(
                    seq((
                        or((text("::"), text("."), text("/"))),
                        req(Parser::<WgslState>::tag(kind("word"), "seg")),
                    ))
                    .map(|_| ()),
                ),
                opt(or((text(";"), kind("eol")))),
            )),
        ),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let path = args.tags.get("seg").iter().map(|t| t.text.clone()).collect();
        let span = args.span.clone();
        args.state.elems.push(Elem::Module(ModuleElem { path, span }));
    })
}

fn export_directive() -> impl Parser<WgslState, Out = ()> {
    seq((
        or((text("#export"), text("export"))),
        opt(tokens(directive_tokens(), ParamList)),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (_, params) = args.value;
        args.state.elems.push(Elem::Export(ExportElem {
            params: params.unwrap_or_default(),
            span: args.span,
        }));
    })
}

/// `( name, … )` for export parameters. A missing close paren is reported
/// with the caret on the opening paren, since that is where the unclosed
/// group starts.
struct ParamList;

impl<A: ParseState> Parser<A> for ParamList {
    type Out = Vec<String>;
    fn parse_inner(&self, cx: &mut ParseCtx<A>) -> Option<Step<Vec<String>, A::Tag>> {
        let open = text("(").parse(cx)?;
        let params = with_sep(text(","), or((kind("word"), kind("digits")))).parse(cx)?;
        let names: Vec<String> = params.value.into_iter().map(|t| t.text).collect();
        let mut span = open.span.clone();
        match text(")").parse(cx) {
            Some(close) => span = span.extend(&close.span),
            None => {
                if cx.is_fatal() {
                    return None;
                }
                cx.report("expected text ')'", open.span.start);
            }
        }
        Some(Step::new(names, span))
    }
    fn label(&self) -> Option<&str> {
        Some("parameter list")
    }
}

fn extends_directive() -> impl Parser<WgslState, Out = ()> {
    seq((
        or((text("#extends"), text("#importMerge"))),
        tokens(
            directive_tokens(),
            seq((
                req(kind("word")),
                opt(import_args()),
                opt(as_clause()),
                opt(seq((text("from"), import_path())).map(|(_, p)| p)),
                opt(or((text(";"), kind("eol")))),
            )),
        ),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (name, import_args, as_name, path, _) = args.value.1;
        let Some(name) = name else { return };
        args.state.elems.push(Elem::Extends(ExtendsElem {
            leaf: SimpleSegment {
                name: name.text,
                args: import_args,
                as_name,
            },
            path: path.unwrap_or_default(),
            span: args.span,
        }));
    })
}

fn template_directive() -> impl Parser<WgslState, Out = ()> {
    seq((text("#template"), tokens(directive_tokens(), req(kind("word")))))
        .map_with(|args: MapArgs<_, WgslState>| {
            if let (_, Some(tok)) = args.value {
                args.state.elems.push(Elem::Template(TemplateElem {
                    name: tok.text,
                    span: args.span,
                }));
            }
        })
}

fn global_directive() -> impl Parser<WgslState, Out = ()> {
    seq((
        or((
            text("diagnostic"),
            text("enable"),
            text("requires"),
            text("const_assert"),
        )),
        req(any_through(text(";"))),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (keyword, _) = args.value;
        args.state.elems.push(Elem::GlobalDirective(DirectiveElem {
            keyword: keyword.text,
            span: args.span,
        }));
    })
}

// ---------------------------------------------------------------------------
// declarations

fn attribute() -> impl Parser<WgslState, Out = ()> {
    seq((text("@"), kind("word"), opt(paren_args()))).map(|_| ())
}

fn attributes() -> impl Parser<WgslState, Out = Vec<()>> {
    repeat(attribute())
}

fn paren_args() -> BoxedParser<WgslState, ()> {
    seq((
        text("("),
        repeat(or((
            lazy(paren_args),
            Parser::<WgslState>::map(any_not(or((text("("), text(")")))), |_| ()),
        ))),
        req(text(")")),
    ))
    .map(|_| ())
    .boxed()
}

fn fn_decl() -> impl Parser<WgslState, Out = ()> {
    seq((
        attributes(),
        text("fn"),
        req(Parser::<WgslState>::tag(kind("word"), "name")),
        req(text("(")),
        with_sep(text(","), fn_param()),
        req(text(")")),
        opt(seq((text("->"), attributes(), type_specifier())).map(|_| ())),
        req(lazy(block)),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (name, name_span) = name_from_tags(args.tags, &args.span);
        let f = FnElem {
            name,
            name_span,
            span: args.span.clone(),
            calls: args.state.take_calls(),
            type_refs: args.state.take_type_refs(),
        };
        args.state.elems.push(Elem::Fn(f));
    })
    .named("fn declaration")
}

fn fn_param() -> impl Parser<WgslState, Out = ()> {
    seq((attributes(), kind("word"), req(text(":")), type_specifier())).map(|_| ())
}

fn struct_decl() -> impl Parser<WgslState, Out = ()> {
    seq((
        text("struct"),
        req(Parser::<WgslState>::tag(kind("word"), "name")),
        req(text("{")),
        with_sep(text(","), struct_member()),
        req(text("}")),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (name, name_span) = name_from_tags(args.tags, &args.span);
        let members = args.state.take_members();
        // member type refs were drained per member; drop strays
        args.state.take_type_refs();
        args.state.elems.push(Elem::Struct(StructElem {
            name,
            name_span,
            span: args.span.clone(),
            members,
            extends: Vec::new(),
        }));
    })
    .named("struct declaration")
}

fn struct_member() -> impl Parser<WgslState, Out = ()> {
    seq((attributes(), kind("word"), req(text(":")), type_specifier())).map_with(|args: MapArgs<_, WgslState>| {
        let name = &args.value.1;
        let member = MemberElem {
            name: name.text.clone(),
            span: args.span.clone(),
            type_refs: args.state.take_type_refs(),
        };
        args.state.members.push(member);
    })
}

fn global_alias() -> impl Parser<WgslState, Out = ()> {
    seq((
        text("alias"),
        req(Parser::<WgslState>::tag(kind("word"), "name")),
        req(text("=")),
        req(seq((type_spec_word().tag("target"), opt(TemplateArgs))).map(|_| ())),
        req(text(";")),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (name, name_span) = name_from_tags(args.tags, &args.span);
        let target = args
            .tags
            .get("target")
            .first()
            .map(|t| t.text.clone())
            .unwrap_or_default();
        args.state.elems.push(Elem::Alias(AliasElem {
            name,
            name_span,
            target,
            span: args.span.clone(),
            type_refs: args.state.take_type_refs(),
        }));
    })
}

fn global_var() -> impl Parser<WgslState, Out = ()> {
    seq((
        attributes(),
        or((text("var"), text("const"), text("override"), text("let"))),
        opt(TemplateArgs),
        req(Parser::<WgslState>::tag(kind("word"), "name")),
        opt(seq((text(":"), type_specifier())).map(|_| ())),
        req(any_through(text(";"))),
    ))
    .map_with(|args: MapArgs<_, WgslState>| {
        let (name, name_span) = name_from_tags(args.tags, &args.span);
        // initializer tokens are skimmed, so only type refs are collected
        args.state.take_calls();
        args.state.elems.push(Elem::Var(VarElem {
            name,
            name_span,
            span: args.span.clone(),
            type_refs: args.state.take_type_refs(),
        }));
    })
    .named("var declaration")
}

// ---------------------------------------------------------------------------
// types

fn type_spec_word() -> impl Parser<WgslState, Out = Token> {
    kind("word").map_with(|args: MapArgs<Token, WgslState>| {
        args.state.push_type_ref(&args.value.text, args.value.span.clone());
        args.value
    })
}

fn type_specifier() -> impl Parser<WgslState, Out = ()> {
    seq((type_spec_word(), opt(TemplateArgs))).map(|_| ())
}

/// Balanced `< … >` template arguments. Only the first identifier at each
/// template level is a candidate user-type reference; the remaining
/// identifiers may be addressing-mode or access-mode keywords, element
/// counts, or nested expressions.
struct TemplateArgs;

impl Parser<WgslState> for TemplateArgs {
    type Out = ();
    fn parse_inner(
        &self,
        cx: &mut ParseCtx<WgslState>,
    ) -> Option<Step<(), Token>> {
        let open = cx.next_token()?;
        if open.text != "<" {
            return None;
        }
        let start = open.span.start;
        let mut end = open.span.end;
        let mut first_seen = vec![false];
        while !first_seen.is_empty() {
            let tok = cx.next_token()?;
            end = tok.span.end;
            match tok.text.as_str() {
                "<" => first_seen.push(false),
                ">" => {
                    first_seen.pop();
                }
                _ => {
                    if tok.kind == "word" && !first_seen.last().copied().unwrap_or(true) {
                        *first_seen.last_mut().expect("nonempty level stack") = true;
                        cx.app.push_type_ref(&tok.text, tok.span.clone());
                    }
                }
            }
        }
        Some(Step::new((), Span::new(start..end)))
    }
    fn label(&self) -> Option<&str> {
        Some("template arguments")
    }
}

// ---------------------------------------------------------------------------
// statements

fn block() -> BoxedParser<WgslState, ()> {
    seq((
        text("{"),
        repeat(or((
            lazy(block),
            callish_keyword(),
            fn_call(),
            var_decl_stmt(),
            any_not(text("}")).map(|_| ()),
        ))),
        req(text("}")),
    ))
    .map(|_| ())
    .boxed()
}

/// Keywords that may be followed by `(` without being calls.
fn callish_keyword() -> impl Parser<WgslState, Out = ()> {
    or((
        text("if"),
        text("for"),
        text("while"),
        text("return"),
        text("const_assert"),
        text("switch"),
    ))
    .map(|_| ())
}

/// An identifier immediately followed by `(`.
fn fn_call() -> impl Parser<WgslState, Out = ()> {
    seq((kind("word"), text("("))).map_with(|args: MapArgs<_, WgslState>| {
        let (name, _) = &args.value;
        args.state.push_call(&name.text, name.span.clone());
    })
}

fn var_decl_stmt() -> impl Parser<WgslState, Out = ()> {
    seq((
        or((text("let"), text("var"), text("const"))),
        opt(TemplateArgs),
        req(kind("word")),
        opt(seq((text(":"), type_specifier())).map(|_| ())),
    ))
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_parse::log;

    fn parse(src: &str) -> WgslState {
        let text = SrcText::new("test.wgsl", src);
        parse_elements(&text, None, None)
    }

    fn fns(state: &WgslState) -> Vec<&FnElem> {
        state
            .elems
            .iter()
            .filter_map(|e| match e {
                Elem::Fn(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fn_collects_calls_and_type_refs() {
        let state = parse("fn main(p: Params) -> Out { helper(); other(1u); }");
        let fns = fns(&state);
        assert_eq!(fns.len(), 1);
        let call_names: Vec<_> = fns[0].calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(call_names, ["helper", "other"]);
        let ty_names: Vec<_> = fns[0].type_refs.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(ty_names, ["Params", "Out"]);
    }

    #[test]
    fn builtins_are_not_collected() {
        let state = parse("fn f(v: vec4<f32>) { let x = max(1, 2); mine(); }");
        let fns = fns(&state);
        let call_names: Vec<_> = fns[0].calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(call_names, ["mine"]);
        assert!(fns[0].type_refs.is_empty());
    }

    #[test]
    fn own_call_name_is_kept_for_traversal() {
        // the traversal filters self-recursion, not the grammar
        let state = parse("fn rec() { rec(); }");
        let fns = fns(&state);
        assert_eq!(fns[0].calls.len(), 1);
    }

    #[test]
    fn struct_members_carry_type_refs() {
        let state = parse("struct S { a: MyT, b: f32 }");
        let s = match &state.elems[0] {
            Elem::Struct(s) => s,
            other => panic!("expected struct, got {other:?}"),
        };
        assert_eq!(s.name, "S");
        assert_eq!(s.members.len(), 2);
        assert_eq!(s.members[0].type_refs[0].name, "MyT");
        assert!(s.members[1].type_refs.is_empty());
    }

    #[test]
    fn alias_records_target() {
        let state = parse("alias Points = PointList;");
        let a = match &state.elems[0] {
            Elem::Alias(a) => a,
            other => panic!("expected alias, got {other:?}"),
        };
        assert_eq!(a.name, "Points");
        assert_eq!(a.target, "PointList");
        assert_eq!(a.type_refs[0].name, "PointList");
    }

    #[test]
    fn global_var_template_type_ref() {
        let state = parse("@group(0) @binding(0) var<storage> buf: array<Particle, 32>;");
        let v = match &state.elems[0] {
            Elem::Var(v) => v,
            other => panic!("expected var, got {other:?}"),
        };
        assert_eq!(v.name, "buf");
        let names: Vec<_> = v.type_refs.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Particle"]);
    }

    #[test]
    fn only_first_template_ident_per_level() {
        // `storage` occupies the first slot, so MyS is not a candidate
        let state = parse("fn f(p: ptr<storage, MyS>) {}");
        assert!(fns(&state)[0].type_refs.is_empty());
    }

    #[test]
    fn gleam_import_parses_to_tree() {
        let state = parse("import a::b::{c, d as e};");
        let tree = match &state.elems[0] {
            Elem::TreeImport(t) => t,
            other => panic!("expected import, got {other:?}"),
        };
        let flat = tree.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].imp_segments, ["a", "b", "c"]);
        assert_eq!(flat[1].imp_segments, ["a", "b", "e"]);
        assert_eq!(flat[1].exp_segments, ["a", "b", "d"]);
    }

    #[test]
    fn from_style_import_with_args() {
        let state = parse("import foo(u32) from ./file1;");
        let tree = match &state.elems[0] {
            Elem::TreeImport(t) => t,
            other => panic!("expected import, got {other:?}"),
        };
        let flat = tree.flatten();
        assert_eq!(flat[0].exp_segments, [".", "file1", "foo"]);
        assert_eq!(flat[0].args.as_deref(), Some(&["u32".to_string()][..]));
    }

    #[test]
    fn module_and_export_elems() {
        let state = parse("module bar; export fn foo() { }");
        assert!(matches!(&state.elems[0], Elem::Module(m) if m.path == ["bar"]));
        assert!(matches!(&state.elems[1], Elem::Export(e) if e.params.is_empty()));
        assert!(matches!(&state.elems[2], Elem::Fn(f) if f.name == "foo"));
    }

    #[test]
    fn export_with_params() {
        let state = parse("export(A) fn foo(a: A) { }");
        assert!(matches!(&state.elems[0], Elem::Export(e) if e.params == ["A"]));
    }

    #[test]
    fn comments_hide_content() {
        let state = parse("// import nope::thing;\nfn f() { /* helper(); */ real(); }");
        assert_eq!(state.elems.len(), 1);
        let fns = fns(&state);
        let names: Vec<_> = fns[0].calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["real"]);
    }

    #[test]
    fn nested_block_comments() {
        let state = parse("/* outer /* inner */ still comment */ fn g() {}");
        assert_eq!(fns(&state).len(), 1);
    }

    #[test]
    fn unclosed_export_paren_diagnoses_at_open() {
        let src = "#export (A\n   )\n";
        let (state, lines) = log::capture(|| parse(src));
        assert!(fns(&state).is_empty());
        let msg = lines.iter().find(|l| l.contains("expected text ')'"));
        let msg = msg.expect("diagnostic emitted");
        // caret sits under the opening paren
        let caret_line = msg.lines().last().unwrap();
        assert_eq!(caret_line, "        ^");
    }

    #[test]
    fn extends_directive_parses() {
        let state = parse("#extends Mixin(f32) as Base from ./lib\nstruct S { x: f32 }");
        assert!(
            matches!(&state.elems[0], Elem::Extends(e) if e.leaf.name == "Mixin"
                && e.path == [".", "lib"]
                && e.leaf.as_name.as_deref() == Some("Base"))
        );
    }

    #[test]
    fn global_directives_skip_to_semi() {
        let state = parse("enable f16;\ndiagnostic(off, derivative_uniformity);\nfn f() {}");
        let directives: Vec<_> = state
            .elems
            .iter()
            .filter_map(|e| match e {
                Elem::GlobalDirective(d) => Some(d.keyword.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(directives, ["enable", "diagnostic"]);
        assert_eq!(fns(&state).len(), 1);
    }
}
