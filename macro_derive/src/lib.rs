extern crate proc_macro;
use proc_macro::TokenStream;
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Attribute, ItemStruct, LitStr, Path, Result, parse_macro_input};

struct GameEventAttr {
    name: Option<LitStr>,
    crate_path: Option<Path>,
}

fn parse_game_event_attr(attrs: &[Attribute]) -> Result<GameEventAttr> {
    let mut parsed = GameEventAttr {
        name: None,
        crate_path: None,
    };

    for attr in attrs {
        if !attr.path().is_ident("game_event") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                parsed.name = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("crate_path") {
                parsed.crate_path = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `name = \"...\"` or `crate_path = <path>`"))
            }
        })?;
    }

    Ok(parsed)
}

/// the wire key of a field, `#[game_event(key = "...")]` or the field name
fn parse_key_attr(attrs: &[Attribute]) -> Result<Option<LitStr>> {
    let mut key = None;

    for attr in attrs {
        if !attr.path().is_ident("game_event") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                key = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `key = \"...\"`"))
            }
        })?;
    }

    Ok(key)
}

fn default_crate_path() -> Path {
    match crate_name("cssff").expect("`cssff` is not a dependency") {
        FoundCrate::Itself => syn::parse_quote!(crate),
        FoundCrate::Name(name) => {
            let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
            syn::parse_quote!(::#ident)
        }
    }
}

#[proc_macro_derive(GameEvent, attributes(game_event))]
pub fn game_event_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as ItemStruct);

    let attr = match parse_game_event_attr(&ast.attrs) {
        Ok(attr) => attr,
        Err(err) => return err.to_compile_error().into(),
    };

    let Some(event_name) = attr.name else {
        return syn::Error::new_spanned(&ast.ident, "missing #[game_event(name = \"...\")]")
            .to_compile_error()
            .into();
    };

    let crate_path = attr.crate_path.unwrap_or_else(default_crate_path);
    let ident = &ast.ident;

    let mut branches = Vec::new();
    for f in ast.fields.iter() {
        let Some(field_name) = &f.ident else {
            return syn::Error::new_spanned(f, "GameEvent fields must be named")
                .to_compile_error()
                .into();
        };

        let key = match parse_key_attr(&f.attrs) {
            Ok(Some(key)) => key,
            Ok(None) => LitStr::new(&field_name.to_string(), field_name.span()),
            Err(err) => return err.to_compile_error().into(),
        };

        branches.push(quote! {
            #key => {
                v.#field_name = #crate_path::game_event::derive::FromGameEventValue::from_game_event_value(value)
                    .ok_or_else(|| std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("wrong type for key \"{}\" in game event \"{}\"", #key, #event_name),
                    ))?;
            }
        });
    }

    quote! {
        impl #crate_path::game_event::derive::GameEvent for #ident {
            const NAME: &'static str = #event_name;

            fn from_values(
                descriptor: &#crate_path::game_event::derive::GameEventDescriptor,
                values: &[#crate_path::game_event::derive::GameEventValue],
            ) -> Result<Self, std::io::Error> {
                let mut v = Self::default();

                for (key, value) in descriptor.keys.iter().zip(values) {
                    match key.name.as_str() {
                        #( #branches )*
                        _ => {}
                    }
                }

                Ok(v)
            }
        }
    }
    .into()
}
