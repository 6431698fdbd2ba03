//! Code generation: DSL AST into registration calls on an `assay::Tester`.

use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;

use crate::dsl::*;

pub fn generate(suite: Suite) -> TokenStream {
    let target = &suite.target;
    let tester = tester_ident();
    let items = generate_items(&suite.items);

    quote! {
        {
            let #tester: &::assay::Tester = &#target;
            #items
        }
    }
}

fn tester_ident() -> Ident {
    Ident::new("__assay_tester", Span::mixed_site())
}

fn generate_items(items: &[DslItem]) -> TokenStream {
    let mut output = TokenStream::new();
    for item in items {
        output.extend(match item {
            DslItem::Describe(block) => generate_describe(block),
            DslItem::Test(block) => generate_test(block),
            DslItem::Hook(block) => generate_hook(block),
            DslItem::DescribeTable(block) => generate_describe_table(block),
        });
    }
    output
}

fn options(modifiers: &Modifiers) -> TokenStream {
    let only = modifiers.only;
    let skip = modifiers.skip;
    let skip_reason = match &modifiers.skip_reason {
        Some(reason) => quote! { ::core::option::Option::Some(::std::string::String::from(#reason)) },
        None => quote! { ::core::option::Option::None },
    };
    let timeout = match modifiers.timeout_ms {
        Some(ms) => quote! { ::core::option::Option::Some(::std::time::Duration::from_millis(#ms)) },
        None => quote! { ::core::option::Option::None },
    };

    quote! {
        ::assay::TestOptions {
            only: #only,
            skip: #skip,
            skip_reason: #skip_reason,
            timeout: #timeout,
        }
    }
}

/// An async closure body. The block may end in `()` or in an `Outcome`; a
/// trailing failed assertion fails the test just like an early `?`.
fn async_body(body: &TokenStream) -> TokenStream {
    let outcome = Ident::new("__assay_outcome", Span::mixed_site());
    quote! {
        async move {
            let #outcome = { #body };
            ::assay::IntoOutcome::into_outcome(#outcome)
        }
    }
}

fn generate_describe(block: &DescribeBlock) -> TokenStream {
    let tester = tester_ident();
    let name = &block.name;
    let options = options(&block.modifiers);
    let items = generate_items(&block.items);

    quote! {
        #tester.describe_with(#name, #options, |#tester| {
            #items
        });
    }
}

fn generate_test(block: &TestBlock) -> TokenStream {
    let tester = tester_ident();
    let name = &block.name;
    let options = options(&block.modifiers);
    let body = async_body(&block.body);

    quote! {
        #tester.test_with(#name, #options, || #body);
    }
}

fn generate_hook(block: &HookBlock) -> TokenStream {
    let tester = tester_ident();
    let method = match block.kind {
        HookKind::Before => quote! { before },
        HookKind::BeforeEach => quote! { before_each },
        HookKind::AfterEach => quote! { after_each },
        HookKind::After => quote! { after },
    };
    let body = async_body(&block.body);

    quote! {
        #tester.#method(|| #body);
    }
}

fn generate_describe_table(block: &DescribeTableBlock) -> TokenStream {
    let tester = tester_ident();
    let name = &block.name;
    let names: Vec<&Ident> = block.params.iter().map(|p| &p.name).collect();
    let types: Vec<_> = block.params.iter().map(|p| &p.ty).collect();
    let body = async_body(&block.body);

    let cases = block.entries.iter().map(|entry| {
        let values = &entry.values;
        match &entry.label {
            Some(label) => quote! { .case(#label, (#(#values,)*)) },
            None => quote! { .case_unnamed((#(#values,)*)) },
        }
    });

    quote! {
        #tester
            .describe_table::<(#(#types,)*)>(#name)
            #(#cases)*
            .run(|(#(#names,)*): (#(#types,)*)| #body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(src: &str) -> String {
        let suite: Suite = syn::parse_str(src).unwrap();
        generate(suite).to_string()
    }

    #[test]
    fn test_describe_expands_to_describe_with() {
        let out = expand(r#"tester; describe "math" { it "adds" { check()?; } }"#);
        assert!(out.contains("describe_with"));
        assert!(out.contains("test_with"));
        assert!(out.contains("\"adds\""));
        assert!(out.contains("into_outcome"));
    }

    #[test]
    fn test_decorators_become_options() {
        let out = expand(r#"tester; xit "later" skip_reason("flaky") timeout(25) {}"#);
        assert!(out.contains("skip : true"));
        assert!(out.contains("\"flaky\""));
        assert!(out.contains("from_millis (25u64)"));
    }

    #[test]
    fn test_hooks_map_to_methods() {
        let out = expand("tester; before {} before_each {} after_each {} after {}");
        for method in [". before (", ". before_each (", ". after_each (", ". after ("] {
            assert!(out.contains(method), "missing {method} in {out}");
        }
    }

    #[test]
    fn test_table_expands_cases() {
        let out = expand(r#"tester; describe_table "sum" (a: i32, b: i32) [ "small" (1, 2), (3, 4) ] {}"#);
        assert!(out.contains(". case (\"small\" , (1 , 2 ,))"));
        assert!(out.contains(". case_unnamed ((3 , 4 ,))"));
    }
}
