//! Code generation for `#[derive(Schema)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{DeriveInput, parse_quote};

use crate::crate_path;
use crate::parse::{Body, SchemaField, parse_input};

/// Expand the derive into a `Schema` implementation.
pub(crate) fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let parsed = parse_input(input)?;
    let krate = crate_path::resolve(parsed.attrs.crate_path.as_ref());
    let ident = &parsed.ident;
    let type_name = ident.unraw().to_string();

    let body = match &parsed.body {
        Body::Struct(fields) => {
            let fields = fields.iter().map(|field| field_tokens(&krate, field));
            quote! {
                #krate::schema::Shape::object(#type_name, ::std::vec![#(#fields),*])
            }
        }
        Body::Enum { unit_only: true } => {
            quote! { #krate::schema::Shape::Leaf(#krate::schema::ValueKind::String) }
        }
        Body::Enum { unit_only: false } => {
            quote! { #krate::schema::Shape::Leaf(#krate::schema::ValueKind::Any) }
        }
    };

    let mut generics = parsed.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(parse_quote!(#krate::schema::Schema));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics #krate::schema::Schema for #ident #ty_generics #where_clause {
            fn shape() -> #krate::schema::Shape {
                #body
            }
        }
    })
}

fn field_tokens(krate: &TokenStream, field: &SchemaField) -> TokenStream {
    let rust_name = &field.rust_name;
    let key = &field.key;
    let ty = &field.ty;
    let mut tokens = quote! {
        #krate::schema::FieldShape::new(
            #rust_name,
            #key,
            <#ty as #krate::schema::Schema>::shape,
        )
    };
    if let Some(path) = &field.attrs.path {
        tokens.extend(quote! { .with_path(#path) });
    }
    if let Some(env) = &field.attrs.env {
        tokens.extend(quote! { .with_env(#env) });
    }
    if field.attrs.sensitive {
        tokens.extend(quote! { .sensitive(true) });
    }
    if field.flatten {
        tokens.extend(quote! { .flatten(true) });
    }
    tokens
}

#[cfg(test)]
mod tests {
    //! Expansion output checks.

    use anyhow::{Result, anyhow, ensure};
    use rstest::rstest;
    use syn::{DeriveInput, ItemImpl, parse_quote};

    use super::expand;

    fn expand_impl(input: &DeriveInput) -> Result<ItemImpl> {
        let tokens = expand(input).map_err(|err| anyhow!("expansion failed: {err}"))?;
        syn::parse2(tokens).map_err(|err| anyhow!("expansion is not an impl: {err}"))
    }

    fn compact(item: &ItemImpl) -> String {
        quote::quote!(#item).to_string().replace(' ', "")
    }

    #[test]
    fn struct_fields_become_field_shapes() -> Result<()> {
        let input: DeriveInput = parse_quote! {
            #[serde(rename_all = "camelCase")]
            struct Service {
                listen_port: u16,
                #[jubako(sensitive, env = "SERVICE_TOKEN")]
                api_token: String,
                #[jubako(path = "/legacy/host")]
                #[serde(rename = "hostName")]
                host: String,
                #[serde(skip)]
                cache: Vec<u8>,
            }
        };
        let item = expand_impl(&input)?;
        let out = compact(&item);
        ensure!(out.contains("jubako::schema::Shape::object(\"Service\""), "{out}");
        ensure!(out.contains("FieldShape::new(\"listen_port\",\"listenPort\""), "{out}");
        ensure!(out.contains(".with_env(\"SERVICE_TOKEN\").sensitive(true)"), "{out}");
        ensure!(out.contains("\"hostName\""), "{out}");
        ensure!(out.contains(".with_path(\"/legacy/host\")"), "{out}");
        ensure!(!out.contains("cache"), "skipped field leaked: {out}");
        Ok(())
    }

    #[test]
    fn flattened_fields_are_marked() -> Result<()> {
        let input: DeriveInput = parse_quote! {
            struct Outer {
                #[serde(flatten)]
                common: Common,
            }
        };
        let out = compact(&expand_impl(&input)?);
        ensure!(out.contains(".flatten(true)"), "{out}");
        Ok(())
    }

    #[test]
    fn generic_parameters_gain_schema_bounds() -> Result<()> {
        let input: DeriveInput = parse_quote! {
            struct Wrapper<T> {
                inner: T,
            }
        };
        let item = expand_impl(&input)?;
        let params = &item.generics;
        let generics = quote::quote!(#params).to_string().replace(' ', "");
        ensure!(generics.contains("T:jubako::schema::Schema"), "{generics}");
        Ok(())
    }

    #[rstest]
    #[case::unit_only(parse_quote! { enum Level { Debug, Info } }, "ValueKind::String")]
    #[case::data(parse_quote! { enum Target { Stdout, File(String) } }, "ValueKind::Any")]
    fn enums_are_leaves(#[case] input: DeriveInput, #[case] kind: &str) -> Result<()> {
        let out = compact(&expand_impl(&input)?);
        ensure!(out.contains(kind), "{out}");
        Ok(())
    }

    #[test]
    fn crate_override_rewrites_paths() -> Result<()> {
        let input: DeriveInput = parse_quote! {
            #[jubako(crate = "deps::jubako")]
            struct Settings {
                port: u16,
            }
        };
        let out = compact(&expand_impl(&input)?);
        ensure!(out.contains("impldeps::jubako::schema::Schema"), "{out}");
        Ok(())
    }

    #[rstest]
    #[case::tuple(parse_quote! { struct Port(u16); }, "named fields")]
    #[case::union(parse_quote! { union Raw { a: u32 } }, "unions")]
    #[case::path_and_flatten(
        parse_quote! { struct Bad { #[jubako(path = "/x")] #[serde(flatten)] inner: Inner } },
        "cannot be combined"
    )]
    #[case::unknown_key(
        parse_quote! { struct Bad { #[jubako(sensitve)] key: String } },
        "unknown jubako field attribute"
    )]
    fn invalid_input_is_rejected(#[case] input: DeriveInput, #[case] needle: &str) -> Result<()> {
        let Err(err) = expand(&input) else {
            return Err(anyhow!("expansion should fail"));
        };
        ensure!(err.to_string().contains(needle), "unexpected error: {err}");
        Ok(())
    }
}
