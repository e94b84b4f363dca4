use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{FnArg, GenericArgument, ItemFn, PatType, PathArguments, Type};

pub fn macro_impl(args: TokenStream, input: TokenStream) -> TokenStream {
  if !args.is_empty() {
    return syn::Error::new(Span::call_site(), "`native` does not accept any arguments")
      .into_compile_error()
      .into();
  }

  let crate_name = match proc_macro_crate::crate_name("sink") {
    Ok(found) => match found {
      proc_macro_crate::FoundCrate::Itself => format_ident!("crate"),
      proc_macro_crate::FoundCrate::Name(name) => format_ident!("{name}"),
    },
    Err(e) => {
      return syn::Error::new(Span::call_site(), format!("{e}"))
        .into_compile_error()
        .into()
    }
  };

  let input_fn = syn::parse_macro_input!(input as ItemFn);
  match expand(&crate_name, input_fn) {
    Ok(ts) => ts.into(),
    Err(e) => e.into_compile_error().into(),
  }
}

enum Arity {
  Required(Type),
  Optional(Type),
  Rest(Type),
}

fn inner_of(ty: &Type, wrapper: &str) -> Option<Type> {
  let Type::Path(p) = ty else { return None };
  let seg = p.path.segments.last()?;
  if seg.ident != wrapper {
    return None;
  }
  let PathArguments::AngleBracketed(args) = &seg.arguments else {
    return None;
  };
  match args.args.first()? {
    GenericArgument::Type(t) => Some(t.clone()),
    _ => None,
  }
}

fn classify(ty: &Type) -> Arity {
  if let Some(inner) = inner_of(ty, "Vec") {
    Arity::Rest(inner)
  } else if let Some(inner) = inner_of(ty, "Option") {
    Arity::Optional(inner)
  } else {
    Arity::Required(ty.clone())
  }
}

fn expand(crate_name: &Ident, mut input_fn: ItemFn) -> syn::Result<TokenStream2> {
  let vis = input_fn.vis.clone();
  let name = input_fn.sig.ident.clone();
  let impl_name = format_ident!("__{name}_impl");

  let mut params = Vec::new();
  for arg in input_fn.sig.inputs.iter() {
    match arg {
      FnArg::Receiver(r) => {
        return Err(syn::Error::new_spanned(r, "`self` is not supported in native commands"))
      }
      FnArg::Typed(PatType { ty, .. }) => params.push(classify(ty)),
    }
  }

  let min_required = params
    .iter()
    .take_while(|p| matches!(p, Arity::Required(_)))
    .count();
  let has_rest = matches!(params.last(), Some(Arity::Rest(_)));

  let mut extract = Vec::new();
  let mut call_args = Vec::new();
  let mut idx = 0usize;
  for (i, p) in params.iter().enumerate() {
    let binding = format_ident!("__a{i}");
    match p {
      Arity::Required(ty) => {
        extract.push(quote! {
          let #binding: #ty = #crate_name::host::FromArg::from_arg(ctx, args, #idx)?;
        });
        idx += 1;
      }
      Arity::Optional(ty) => {
        extract.push(quote! {
          let #binding: Option<#ty> = if #idx < args.len() {
            Some(#crate_name::host::FromArg::from_arg(ctx, args, #idx)?)
          } else {
            None
          };
        });
        idx += 1;
      }
      Arity::Rest(ty) => {
        extract.push(quote! {
          let mut #binding: Vec<#ty> = Vec::new();
          for __i in #idx..args.len() {
            #binding.push(#crate_name::host::FromArg::from_arg(ctx, args, __i)?);
          }
        });
      }
    }
    call_args.push(binding);
  }

  input_fn.sig.ident = impl_name.clone();
  let max_args = if has_rest {
    quote!(usize::MAX)
  } else {
    let n = params.len();
    quote!(#n)
  };

  Ok(quote! {
    #input_fn

    #[allow(non_snake_case, clippy::ptr_arg)]
    #vis fn #name(
      ctx: &mut #crate_name::Context,
      args: &[#crate_name::Value],
    ) -> #crate_name::Result<#crate_name::Value> {
      if args.len() < #min_required || args.len() > #max_args {
        return Err(#crate_name::host::arity_error(stringify!(#name), #min_required, args.len()));
      }
      #(#extract)*
      #crate_name::host::IntoValue::into_value(ctx, #impl_name(#(#call_args),*))
    }
  })
}
