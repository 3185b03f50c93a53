extern crate quote;
extern crate syn;

extern crate proc_macro;

use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, LitStr};

/// Derives a field-less companion enum naming each variant of an enum.
///
/// For `enum SceneEvent { NodeAdded { .. }, Linked(..) }` this generates
/// `SceneEventTag { NodeAdded, Linked }` plus:
///
/// - `SceneEvent::tag(&self) -> SceneEventTag`
/// - `SceneEventTag::ALL`, every tag in declaration order
/// - `SceneEventTag::as_str`, the kebab-case variant name (`"node-added"`)
/// - `Display` and `FromStr` for the tag, both using the kebab-case name
///
/// The tag name can be overridden with `#[enum_tag(name = "Kind")]`.
#[proc_macro_derive(EnumTag, attributes(enum_tag))]
pub fn enum_tag_macro_derive(input: TokenStream) -> TokenStream {
    let ast: DeriveInput = match syn::parse(input) {
        Ok(ast) => ast,
        Err(e) => return e.to_compile_error().into(),
    };
    impl_enum_tag_macro(&ast)
}

fn parse_enum_tag_name(attrs: &[Attribute], default_ident: Ident) -> syn::Result<Ident> {
    let mut found: Option<Ident> = None;

    for attr in attrs.iter().filter(|a| a.path().is_ident("enum_tag")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                let name_str = value.value();
                let ident = syn::parse_str::<Ident>(&name_str).map_err(|_| {
                    syn::Error::new(
                        value.span(),
                        "enum_tag name must be a valid Rust identifier",
                    )
                })?;
                found = Some(ident);
                Ok(())
            } else {
                Err(meta.error("unsupported enum_tag attribute; expected `name = \"...\"`"))
            }
        })?;
    }

    Ok(found.unwrap_or(default_ident))
}

fn impl_enum_tag_macro(ast: &DeriveInput) -> TokenStream {
    let name = &ast.ident;
    let vis = &ast.vis;

    let default_tag_name = format_ident!("{}Tag", name);
    let tag_name = match parse_enum_tag_name(&ast.attrs, default_tag_name) {
        Ok(v) => v,
        Err(e) => return e.to_compile_error().into(),
    };

    let data_enum = match &ast.data {
        Data::Enum(e) => e,
        Data::Struct(_) | Data::Union(_) => {
            return syn::Error::new(Span::call_site(), "EnumTag can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    if data_enum.variants.is_empty() {
        return syn::Error::new(Span::call_site(), "EnumTag needs at least one variant")
            .to_compile_error()
            .into();
    }

    let mut tag_variants: Vec<TokenStream2> = Vec::new();
    let mut match_arms: Vec<TokenStream2> = Vec::new();
    let mut str_arms: Vec<TokenStream2> = Vec::new();
    let mut parse_arms: Vec<TokenStream2> = Vec::new();
    let mut all_tags: Vec<TokenStream2> = Vec::new();
    for v in &data_enum.variants {
        let v_ident = &v.ident;
        let kebab = LitStr::new(&v_ident.to_string().to_case(Case::Kebab), v_ident.span());
        tag_variants.push(quote!(#v_ident));
        all_tags.push(quote!(#tag_name::#v_ident));

        let pat = match &v.fields {
            Fields::Unit => quote!(Self::#v_ident),
            Fields::Unnamed(_) => quote!(Self::#v_ident(..)),
            Fields::Named(_) => quote!(Self::#v_ident { .. }),
        };
        match_arms.push(quote!(#pat => #tag_name::#v_ident));
        str_arms.push(quote!(#tag_name::#v_ident => #kebab));
        parse_arms.push(quote!(#kebab => ::core::result::Result::Ok(#tag_name::#v_ident)));
    }

    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let generated = quote! {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #vis enum #tag_name {
            #( #tag_variants, )*
        }

        impl #tag_name {
            #vis const ALL: &'static [#tag_name] = &[ #( #all_tags, )* ];

            #vis fn as_str(&self) -> &'static str {
                match self {
                    #( #str_arms, )*
                }
            }
        }

        impl ::core::fmt::Display for #tag_name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for #tag_name {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                match s {
                    #( #parse_arms, )*
                    other => ::core::result::Result::Err(::std::format!(
                        "unknown {} '{}'",
                        ::core::stringify!(#tag_name),
                        other
                    )),
                }
            }
        }

        impl #impl_generics #name #ty_generics #where_clause {
            #vis fn tag(&self) -> #tag_name {
                match self {
                    #( #match_arms, )*
                }
            }
        }
    };

    generated.into()
}
