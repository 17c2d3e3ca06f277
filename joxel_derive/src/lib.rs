//! Procedural macros for the joxel workspace.
//!
//! Currently provides a single attribute, [`macro@context`], which wraps the
//! body of a `Result`-returning function so that any error bubbling out of it
//! is annotated with a formatted `anyhow` context message.

use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use quote::{ToTokens, quote};
use syn::Token;
use syn::parse::{Parse, ParseStream, Result as ParseResult};
use syn::parse_macro_input;

/// Arguments of the `#[context(...)]` attribute: format arguments for the
/// message, optionally preceded by `move` to take ownership of captures.
struct ContextArgs {
	capture_move: Option<Token![move]>,
	message: TokenStream2,
}

impl Parse for ContextArgs {
	fn parse(input: ParseStream<'_>) -> ParseResult<Self> {
		let capture_move: Option<Token![move]> = input.parse()?;
		if capture_move.is_some() {
			input.parse::<Token![,]>()?;
		}
		Ok(Self {
			capture_move,
			message: input.parse()?,
		})
	}
}

/// Attaches an `anyhow` context message to every error returned by the
/// annotated function.
///
/// ```ignore
/// #[context("parsing codestream of {} bytes", bytes.len())]
/// fn parse(bytes: &[u8]) -> Result<Codestream> { ... }
/// ```
///
/// Works on both sync and async functions. Pass `move` as the first argument
/// to move captured values into the generated closure.
#[proc_macro_attribute]
pub fn context(args: TokenStream, input: TokenStream) -> TokenStream {
	let ContextArgs { capture_move, message } = parse_macro_input!(args);
	let mut function = parse_macro_input!(input as syn::ItemFn);

	let syn::ReturnType::Type(_, ok_type) = &function.sig.output else {
		return syn::Error::new_spanned(&function.sig, "expected a function returning Result")
			.to_compile_error()
			.into();
	};
	let body = &function.block;
	let failure = Ident::new("failure", Span::mixed_site());

	// Re-run the original body inside a block that owns its control flow, so
	// `?` and early returns stay local, then annotate whatever error falls
	// out of it.
	let wrapped = if function.sig.asyncness.is_some() {
		quote! {
			let outcome: #ok_type = async #capture_move { #body }.await;
			outcome.map_err(|#failure| #failure.context(format!(#message)).into())
		}
	} else {
		quote! {
			let outcome: #ok_type = (#capture_move || #body)();
			outcome.map_err(|#failure| #failure.context(format!(#message)).into())
		}
	};

	function.block.stmts = vec![syn::Stmt::Expr(syn::Expr::Verbatim(wrapped), None)];
	function.into_token_stream().into()
}
