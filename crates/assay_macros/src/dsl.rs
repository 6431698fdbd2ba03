//! DSL AST types and `syn::parse::Parse` implementations.

use proc_macro2::TokenStream;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{braced, bracketed, parenthesized, Expr, Ident, LitInt, LitStr, Result, Token, Type};

// ============================================================================
// AST types
// ============================================================================

/// `target; items...`: the tester expression followed by DSL items.
#[derive(Debug)]
pub struct Suite {
    pub target: Expr,
    pub items: Vec<DslItem>,
}

#[derive(Debug)]
pub enum DslItem {
    Describe(DescribeBlock),
    Test(TestBlock),
    Hook(HookBlock),
    DescribeTable(DescribeTableBlock),
}

/// Options shared by suites and tests.
#[derive(Debug, Default)]
pub struct Modifiers {
    pub only: bool,
    pub skip: bool,
    pub skip_reason: Option<LitStr>,
    pub timeout_ms: Option<u64>,
}

/// `describe "name" [decorators] { ... }`, plus `f`/`x` prefixed forms.
#[derive(Debug)]
pub struct DescribeBlock {
    pub name: LitStr,
    pub modifiers: Modifiers,
    pub items: Vec<DslItem>,
}

/// `it "name" [decorators] { ... }` / `test "name" ...`, plus `f`/`x` forms.
#[derive(Debug)]
pub struct TestBlock {
    pub name: LitStr,
    pub modifiers: Modifiers,
    pub body: TokenStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Before,
    BeforeEach,
    AfterEach,
    After,
}

#[derive(Debug)]
pub struct HookBlock {
    pub kind: HookKind,
    pub body: TokenStream,
}

/// `describe_table "name" (a: Type, b: Type) [ "label" (v1, v2), ... ] { body }`
#[derive(Debug)]
pub struct DescribeTableBlock {
    pub name: LitStr,
    pub params: Vec<TableParam>,
    pub entries: Vec<TableEntry>,
    pub body: TokenStream,
}

#[derive(Debug)]
pub struct TableParam {
    pub name: Ident,
    pub ty: Type,
}

#[derive(Debug)]
pub struct TableEntry {
    pub label: Option<LitStr>,
    pub values: Vec<Expr>,
}

// ============================================================================
// Parsing
// ============================================================================

impl Parse for Suite {
    fn parse(input: ParseStream) -> Result<Self> {
        let target: Expr = input.parse()?;
        input.parse::<Token![;]>()?;
        let items = parse_items(input)?;
        Ok(Suite { target, items })
    }
}

fn parse_items(input: ParseStream) -> Result<Vec<DslItem>> {
    let mut items = Vec::new();
    while !input.is_empty() {
        items.push(input.parse::<DslItem>()?);
    }
    Ok(items)
}

impl Parse for DslItem {
    fn parse(input: ParseStream) -> Result<Self> {
        let ident: Ident = input.parse()?;
        let name = ident.to_string();

        match name.as_str() {
            "describe" | "context" => Ok(DslItem::Describe(parse_describe_block(input, false, false)?)),
            "fdescribe" | "fcontext" => Ok(DslItem::Describe(parse_describe_block(input, true, false)?)),
            "xdescribe" | "xcontext" => Ok(DslItem::Describe(parse_describe_block(input, false, true)?)),

            "it" | "test" => Ok(DslItem::Test(parse_test_block(input, false, false)?)),
            "fit" | "ftest" => Ok(DslItem::Test(parse_test_block(input, true, false)?)),
            "xit" | "xtest" => Ok(DslItem::Test(parse_test_block(input, false, true)?)),

            "before" | "before_all" => Ok(DslItem::Hook(parse_hook_block(input, HookKind::Before)?)),
            "before_each" => Ok(DslItem::Hook(parse_hook_block(input, HookKind::BeforeEach)?)),
            "after_each" => Ok(DslItem::Hook(parse_hook_block(input, HookKind::AfterEach)?)),
            "after" | "after_all" => Ok(DslItem::Hook(parse_hook_block(input, HookKind::After)?)),

            "describe_table" => Ok(DslItem::DescribeTable(parse_describe_table(input)?)),

            _ => Err(syn::Error::new(
                ident.span(),
                format!(
                    "unknown DSL keyword `{name}`. Expected one of: \
                     describe, context, it, test, before, before_each, after_each, \
                     after, describe_table (with optional f/x prefix for only/skip)"
                ),
            )),
        }
    }
}

// ============================================================================
// Block parsers
// ============================================================================

/// Parse: `"name" [decorators] { items... }`
fn parse_describe_block(input: ParseStream, only: bool, skip: bool) -> Result<DescribeBlock> {
    let name: LitStr = input.parse()?;
    let modifiers = parse_decorators(input, only, skip)?;
    let content;
    braced!(content in input);
    let items = parse_items(&content)?;
    Ok(DescribeBlock {
        name,
        modifiers,
        items,
    })
}

/// Parse: `"name" [timeout(N)] [skip_reason("..")] { body }`
fn parse_test_block(input: ParseStream, only: bool, skip: bool) -> Result<TestBlock> {
    let name: LitStr = input.parse()?;
    let modifiers = parse_decorators(input, only, skip)?;
    let body_content;
    braced!(body_content in input);
    let body: TokenStream = body_content.parse()?;
    Ok(TestBlock {
        name,
        modifiers,
        body,
    })
}

fn parse_decorators(input: ParseStream, only: bool, skip: bool) -> Result<Modifiers> {
    let mut modifiers = Modifiers {
        only,
        skip,
        ..Modifiers::default()
    };

    while !input.peek(syn::token::Brace) {
        let decorator: Ident = input.parse()?;
        match decorator.to_string().as_str() {
            "timeout" => {
                let content;
                parenthesized!(content in input);
                let n: LitInt = content.parse()?;
                modifiers.timeout_ms = Some(n.base10_parse::<u64>()?);
            }
            "skip_reason" => {
                let content;
                parenthesized!(content in input);
                modifiers.skip = true;
                modifiers.skip_reason = Some(content.parse::<LitStr>()?);
            }
            other => {
                return Err(syn::Error::new(
                    decorator.span(),
                    format!("unknown decorator `{other}`. Expected `timeout` or `skip_reason`"),
                ));
            }
        }
    }

    Ok(modifiers)
}

/// Parse: `{ body }`
fn parse_hook_block(input: ParseStream, kind: HookKind) -> Result<HookBlock> {
    let content;
    braced!(content in input);
    let body: TokenStream = content.parse()?;
    Ok(HookBlock { kind, body })
}

/// Parse: `"name" (param: Type, ...) [ "label" (val, ...), ... ] { body }`
fn parse_describe_table(input: ParseStream) -> Result<DescribeTableBlock> {
    let name: LitStr = input.parse()?;

    let params_content;
    parenthesized!(params_content in input);
    let mut params = Vec::new();
    while !params_content.is_empty() {
        let param_name: Ident = params_content.parse()?;
        params_content.parse::<Token![:]>()?;
        let param_type: Type = params_content.parse()?;
        params.push(TableParam {
            name: param_name,
            ty: param_type,
        });
        if !params_content.is_empty() {
            params_content.parse::<Token![,]>()?;
        }
    }

    let entries_content;
    bracketed!(entries_content in input);
    let mut entries = Vec::new();
    while !entries_content.is_empty() {
        let label = if entries_content.peek(LitStr) {
            Some(entries_content.parse::<LitStr>()?)
        } else {
            None
        };
        let values_content;
        parenthesized!(values_content in entries_content);
        let values = Punctuated::<Expr, Token![,]>::parse_terminated(&values_content)?
            .into_iter()
            .collect::<Vec<_>>();
        if values.len() != params.len() {
            return Err(syn::Error::new(
                name.span(),
                format!(
                    "table row has {} values but {} parameters are declared",
                    values.len(),
                    params.len()
                ),
            ));
        }
        entries.push(TableEntry { label, values });
        if !entries_content.is_empty() {
            entries_content.parse::<Token![,]>()?;
        }
    }

    let body_content;
    braced!(body_content in input);
    let body: TokenStream = body_content.parse()?;

    Ok(DescribeTableBlock {
        name,
        params,
        entries,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_nested_items_and_decorators() {
        let suite: Suite = syn::parse_str(
            r#"
            tester;
            describe "math" timeout(50) {
                before_each { setup(); }
                it "adds" { check()?; }
                xit "later" skip_reason("not yet") {}
                fdescribe "focused" {}
            }
            "#,
        )
        .unwrap();

        assert_eq!(suite.items.len(), 1);
        let DslItem::Describe(math) = &suite.items[0] else {
            panic!("expected describe");
        };
        assert_eq!(math.modifiers.timeout_ms, Some(50));
        assert_eq!(math.items.len(), 4);
        assert!(matches!(&math.items[0], DslItem::Hook(h) if h.kind == HookKind::BeforeEach));
        let DslItem::Test(later) = &math.items[2] else {
            panic!("expected test");
        };
        assert!(later.modifiers.skip);
        assert_eq!(later.modifiers.skip_reason.as_ref().unwrap().value(), "not yet");
        assert!(matches!(&math.items[3], DslItem::Describe(d) if d.modifiers.only));
    }

    #[test]
    fn test_table_rows_must_match_params() {
        let err = syn::parse_str::<Suite>(
            r#"t; describe_table "sum" (a: i32, b: i32) [ "one" (1) ] {}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("1 values but 2 parameters"));
    }

    #[test]
    fn test_unknown_keyword_is_rejected() {
        let err = syn::parse_str::<Suite>(r#"t; ordered "x" {}"#).unwrap_err();
        assert!(err.to_string().contains("unknown DSL keyword `ordered`"));
    }
}
