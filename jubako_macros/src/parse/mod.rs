//! Input parsing for `#[derive(Schema)]`.
//!
//! Gathers the type's fields together with their serde keys and
//! `#[jubako(...)]` directives in one pass so expansion can fail fast with
//! spanned errors.

use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{Attribute, Data, DeriveInput, Fields, Lit, LitStr, Token, parenthesized};

mod serde_attrs;

pub(crate) use serde_attrs::{SerdeRenameAll, serde_field_attrs, serde_rename_all};

/// Container-level `#[jubako(...)]` attributes.
#[derive(Default)]
pub(crate) struct StructAttrs {
    /// Overrides the crate path used by generated code.
    ///
    /// `#[jubako(crate = "my_alias")]` makes the expansion reference
    /// `my_alias::schema` instead of `jubako::schema`.
    pub crate_path: Option<syn::Path>,
}

/// Field-level `#[jubako(...)]` attributes.
///
/// - `sensitive` marks the field as secret.
/// - `path` moves the field to another place in layer data.
/// - `env` binds an environment variable to the field.
/// - `skip` leaves the field out of the schema.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct FieldAttrs {
    pub sensitive: bool,
    pub path: Option<String>,
    pub env: Option<String>,
    pub skip: bool,
}

/// One field that takes part in the schema.
pub(crate) struct SchemaField {
    pub rust_name: String,
    pub key: String,
    pub ty: syn::Type,
    pub attrs: FieldAttrs,
    pub flatten: bool,
}

/// Shape of the deriving type.
pub(crate) enum Body {
    Struct(Vec<SchemaField>),
    /// Enums are stored as single values; unit-only enums are strings.
    Enum { unit_only: bool },
}

/// Everything expansion needs from the input.
pub(crate) struct SchemaInput {
    pub ident: syn::Ident,
    pub generics: syn::Generics,
    pub attrs: StructAttrs,
    pub body: Body,
}

/// Parse the deriving type and all of its attributes.
pub(crate) fn parse_input(input: &DeriveInput) -> syn::Result<SchemaInput> {
    let attrs = parse_struct_attrs(&input.attrs)?;
    let body = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => {
                let rename_all = serde_rename_all(&input.attrs)?;
                let mut fields = Vec::with_capacity(named.named.len());
                for field in &named.named {
                    if let Some(parsed) = parse_field(field, rename_all)? {
                        fields.push(parsed);
                    }
                }
                Body::Struct(fields)
            }
            Fields::Unit => Body::Struct(Vec::new()),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    data.struct_token,
                    "Schema requires named fields; use impl_leaf_schema! for newtypes",
                ));
            }
        },
        Data::Enum(data) => Body::Enum {
            unit_only: data
                .variants
                .iter()
                .all(|variant| matches!(variant.fields, Fields::Unit)),
        },
        Data::Union(data) => {
            return Err(syn::Error::new_spanned(
                data.union_token,
                "Schema cannot be derived for unions",
            ));
        }
    };
    Ok(SchemaInput {
        ident: input.ident.clone(),
        generics: input.generics.clone(),
        attrs,
        body,
    })
}

fn parse_field(
    field: &syn::Field,
    rename_all: Option<SerdeRenameAll>,
) -> syn::Result<Option<SchemaField>> {
    let Some(ident) = field.ident.as_ref() else {
        return Err(syn::Error::new_spanned(field, "unnamed fields are not supported"));
    };
    let attrs = parse_field_attrs(&field.attrs)?;
    let serde = serde_field_attrs(&field.attrs)?;
    if attrs.skip || serde.skip {
        return Ok(None);
    }
    if serde.flatten && attrs.path.is_some() {
        return Err(syn::Error::new_spanned(
            field,
            "`#[jubako(path)]` cannot be combined with `#[serde(flatten)]`",
        ));
    }
    let rust_name = ident.unraw().to_string();
    let key = serde.rename.unwrap_or_else(|| {
        rename_all.map_or_else(|| rust_name.clone(), |rule| rule.apply(&rust_name))
    });
    Ok(Some(SchemaField {
        rust_name,
        key,
        ty: field.ty.clone(),
        attrs,
        flatten: serde.flatten,
    }))
}

/// Iterate every `#[jubako(...)]` attribute and apply `f` to each entry.
fn parse_jubako<F>(attrs: &[Attribute], mut f: F) -> syn::Result<()>
where
    F: FnMut(&ParseNestedMeta) -> syn::Result<()>,
{
    for attr in attrs.iter().filter(|a| a.path().is_ident("jubako")) {
        attr.parse_nested_meta(|meta| f(&meta))?;
    }
    Ok(())
}

/// Extract `#[jubako(...)]` metadata applied to the container.
pub(crate) fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<StructAttrs> {
    let mut out = StructAttrs::default();
    parse_jubako(attrs, |meta| {
        if meta.path.is_ident("crate") {
            let s = lit_str(meta, "crate")?;
            let path: syn::Path =
                syn::parse_str(&s.value()).map_err(|e| syn::Error::new(s.span(), e))?;
            out.crate_path = Some(path);
            Ok(())
        } else {
            Err(meta.error("unknown jubako container attribute; expected `crate`"))
        }
    })?;
    Ok(out)
}

/// Extract `#[jubako(...)]` metadata applied to a field.
///
/// Unknown keys are rejected so typos in `sensitive` never silently leak a
/// secret.
pub(crate) fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    parse_jubako(attrs, |meta| {
        let key = meta.path.get_ident().map(ToString::to_string);
        match key.as_deref() {
            Some("sensitive") => {
                out.sensitive = flag(meta)?;
                Ok(())
            }
            Some("skip") => {
                out.skip = flag(meta)?;
                Ok(())
            }
            Some("path") => {
                out.path = Some(non_empty(meta, "path")?);
                Ok(())
            }
            Some("env") => {
                out.env = Some(non_empty(meta, "env")?);
                Ok(())
            }
            _ => Err(meta.error(
                "unknown jubako field attribute; expected `sensitive`, `path`, `env` or `skip`",
            )),
        }
    })?;
    Ok(out)
}

/// Accept both `key` and `key = bool`.
fn flag(meta: &ParseNestedMeta) -> syn::Result<bool> {
    if !meta.input.peek(Token![=]) {
        return Ok(true);
    }
    match meta.value()?.parse::<Lit>()? {
        Lit::Bool(b) => Ok(b.value),
        other => Err(syn::Error::new(other.span(), "expected a boolean")),
    }
}

fn non_empty(meta: &ParseNestedMeta, key: &str) -> syn::Result<String> {
    let s = lit_str(meta, key)?;
    let value = s.value();
    if value.trim().is_empty() {
        return Err(syn::Error::new(s.span(), format!("{key} must not be empty")));
    }
    Ok(value)
}

fn lit_str(meta: &ParseNestedMeta, key: &str) -> syn::Result<LitStr> {
    match meta.value()?.parse::<Lit>()? {
        Lit::Str(s) => Ok(s),
        other => Err(syn::Error::new(other.span(), format!("{key} must be a string"))),
    }
}

/// Consume an unrecognised key-value or list without recording it.
fn discard_unknown(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<proc_macro2::TokenStream>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        parenthesized!(content in meta.input);
        content.parse::<proc_macro2::TokenStream>()?;
    }
    Ok(())
}
