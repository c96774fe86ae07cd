//! Proc-macros shared across the tilesense workspace.
//!
//! Currently this crate provides a single attribute macro, [`macro@context`],
//! which wraps the body of a `Result`-returning function and attaches a
//! formatted context message to any error that escapes it.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, quote};
use syn::parse_macro_input;

/// Attaches a formatted error context to a `Result`-returning function.
///
/// The attribute arguments are `format!` arguments and may reference the
/// function's parameters:
///
/// ```
/// use anyhow::{Result, bail};
/// use tilesense_derive::context;
///
/// #[context("opening image '{uri}'")]
/// fn open(uri: &str) -> Result<()> {
///     bail!("no such object")
/// }
///
/// let err = open("s3://bucket/image.tif").unwrap_err();
/// assert_eq!(err.to_string(), "opening image 's3://bucket/image.tif'");
/// ```
///
/// Works on both sync and async functions:
///
/// ```
/// use anyhow::{Result, bail};
/// use tilesense_derive::context;
///
/// #[context("fetching tile {index}")]
/// async fn fetch(index: u32) -> Result<Vec<u8>> {
///     bail!("queue unavailable")
/// }
/// # let _ = fetch;
/// ```
///
/// The function body is evaluated in a `move` capture, so parameters
/// referenced by the format arguments must be references or `Copy`.
#[proc_macro_attribute]
pub fn context(args: TokenStream, input: TokenStream) -> TokenStream {
	let format_args = TokenStream2::from(args);
	let mut function = parse_macro_input!(input as syn::ItemFn);

	// The wrapper maps the error side, so the function must return a Result
	// (or another type whose Err carries an anyhow error).
	let return_type = match &function.sig.output {
		syn::ReturnType::Type(_, return_type) => return_type.clone(),
		syn::ReturnType::Default => {
			return syn::Error::new_spanned(&function.sig, "#[context] requires a function returning Result")
				.to_compile_error()
				.into();
		}
	};
	let body = function.block.clone();

	// Run the original body to completion, then attach the context message to
	// whatever error came out of it. The `move` capture keeps borrowck out of
	// the picture for parameters that are consumed by the body.
	let outcome = if function.sig.asyncness.is_some() {
		quote! { let __outcome: #return_type = async move #body.await; }
	} else {
		quote! { let __outcome: #return_type = (move || #body)(); }
	};
	function.block = Box::new(syn::parse_quote!({
		#outcome
		__outcome.map_err(|__error| __error.context(format!(#format_args)).into())
	}));

	function.into_token_stream().into()
}
