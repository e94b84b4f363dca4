use proc_macro::TokenStream;

mod function;
mod util;

/// Turns a plain, typed Rust function into a `sink` native command: a
/// function shaped like `fn(&mut Context, &[Value]) -> Result<Value>`,
/// matching `sink_native_f` from `sink.h`. Argument extraction and type
/// checking (the `sink_arg_*` family) is generated from the parameter
/// types; the last parameter may be `Vec<T>` to soak up the rest-args, and
/// any parameter may be `Option<T>` to make it optional.
#[proc_macro_attribute]
pub fn native(args: TokenStream, input: TokenStream) -> TokenStream {
  function::macro_impl(args, input)
}
