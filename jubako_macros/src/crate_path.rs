//! Crate path resolution for dependency aliasing.
//!
//! Converts the optional `#[jubako(crate = "...")]` attribute into the
//! tokens that prefix every generated `jubako::` path.

use proc_macro2::TokenStream;
use quote::quote;

/// Resolve the crate path, defaulting to `jubako`.
///
/// ```rust,ignore
/// assert_eq!(resolve(None).to_string(), "jubako");
/// let path: syn::Path = syn::parse_str("config_core").unwrap();
/// assert_eq!(resolve(Some(&path)).to_string(), "config_core");
/// ```
pub(crate) fn resolve(crate_path: Option<&syn::Path>) -> TokenStream {
    crate_path.map_or_else(|| quote! { jubako }, |path| quote! { #path })
}
