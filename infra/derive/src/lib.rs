#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the Tourline crates.
//!
//! * [`tourline_error`] turns an enum into a contextual `thiserror` error type.
//! * [`tourline_slice`] turns a struct into a cheap-clone feature slice handle that can be
//!   registered with the kernel `AppState`.
//!
//! See each macro’s docstring for examples; they are `ignore`d to avoid compiling in this crate,
//! but should be copied into consuming crates’ tests as needed.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemStruct, parse_macro_input};

/// A high-level attribute macro for defining domain-specific error enums.
///
/// # Features
///
/// * **Automatic Derives**: Injects `#[derive(Debug, thiserror::Error)]` unless already present.
///   Other derives on the enum (e.g. `Clone`) are kept untouched.
/// * **Context Support**: Generates a companion `...Ext` trait that adds `.context()`
///   to any `Result` that can be converted into this error type.
/// * **Variant Kind**: Generates `kind(&self) -> &'static str` returning the variant name,
///   meant for structured log fields.
/// * **Standard Conversions**: Implements `From<T>` for variants containing a `#[source]` field,
///   enabling the use of the `?` operator for upstream errors.
/// * **Internal Fallback**: Provides `From<&'static str>` and `From<String>` implementations
///   if an `Internal` variant is present.
///
/// # Requirements
///
/// 1. The macro must be applied to an **enum**.
/// 2. Variants that support context must include a `context: Option<Cow<'static, str>>` field.
/// 3. Variants wrapping external errors must include a `source: T` field or a field marked
///    with `#[source]`/`#[from]` (compatible with `thiserror`).
/// 4. Tuple or unit variants are rejected to keep error wiring explicit and reliable.
///
/// # Example
///
/// ```rust,ignore
/// use std::borrow::Cow;
///
/// #[tourline_derive::tourline_error]
/// #[derive(Clone)]
/// pub enum TourError {
///     #[error("Tour not found{}: {message}", format_context(.context))]
///     NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
///
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn lookup(id: &str) -> Result<(), TourError> {
///     Err(TourError::NotFound { message: id.to_owned().into(), context: None })
/// }
///
/// let err = lookup("welcome-tour").context("Resolving tour").unwrap_err();
/// assert_eq!(err.kind(), "NotFound");
/// ```
#[proc_macro_attribute]
pub fn tourline_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(input).into()
}

/// Attribute macro to define a Vertical Slice handle.
///
/// This macro transforms a struct into a full Slice pattern:
/// 1. Generates a thread-safe `Arc` wrapper.
/// 2. Implements `Deref` for transparent access to the inner state.
/// 3. Implements `FeatureSlice` for registration in the kernel `AppState`.
///
/// # Example
/// ```rust,ignore
/// #[tourline_derive::tourline_slice]
/// pub struct Tours {
///     pub orchestrator: PerformanceOrchestrator,
/// }
///
/// fn init(orchestrator: PerformanceOrchestrator) -> Tours {
///     Tours::new(ToursInner { orchestrator })
/// }
/// ```
#[proc_macro_attribute]
pub fn tourline_slice(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(item as ItemStruct);
    macros::slice::expand_slice(input).into()
}
