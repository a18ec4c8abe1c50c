//! Code generation for the `Model` derive

use proc_macro2::TokenStream;
use quote::quote;
use syn::Ident;

use crate::parsing::{FieldInfo, FieldStorage, TableInfo};

/// Generate the `store_object::Model` implementation
pub fn generate_model_impl(name: &Ident, table: &TableInfo, fields: &[FieldInfo]) -> TokenStream {
    let table_name = &table.name;

    let specs = fields
        .iter()
        .map(|f| {
            let column = &f.column;
            let ty = &f.ty;
            let tags = &f.tags;
            match f.storage {
                // described so a live column of that name is left alone
                FieldStorage::Skipped => quote! {
                    store_object::FieldSpec::new(
                        #column,
                        store_object::FieldKind::Text,
                        true,
                        &["-"],
                    )
                },
                FieldStorage::Slice => quote! {
                    store_object::FieldSpec::new(
                        #column,
                        store_object::FieldKind::Slice,
                        false,
                        &[#(#tags),*],
                    )
                },
                _ => quote! {
                    store_object::FieldSpec::new(
                        #column,
                        <#ty as store_object::SqlKind>::KIND,
                        <#ty as store_object::SqlKind>::NULLABLE,
                        &[#(#tags),*],
                    )
                },
            }
        });

    let values = fields
        .iter()
        .filter(|f| f.storage == FieldStorage::Column)
        .map(|f| {
            let column = &f.column;
            let ident = &f.ident;
            quote! {
                (#column, store_object::ToDbValue::to_db_value(&self.#ident))
            }
        });

    let assignments = fields.iter().map(|f| {
        let ident = &f.ident;
        let column = &f.column;
        let ty = &f.ty;
        match f.storage {
            FieldStorage::Column => quote! {
                #ident: match row.get(#column) {
                    Some(value) => <#ty as store_object::FromDbValue>::from_db_value(value)
                        .map_err(|e| store_object::DbError::decode(#column, e))?,
                    None => ::core::default::Default::default(),
                }
            },
            _ => quote! {
                #ident: ::core::default::Default::default()
            },
        }
    });

    quote! {
        impl store_object::Model for #name {
            fn table_name() -> &'static str {
                #table_name
            }

            fn fields() -> ::std::vec::Vec<store_object::FieldSpec> {
                vec![#(#specs),*]
            }

            fn to_values(&self) -> ::std::vec::Vec<(&'static str, store_object::DbValue)> {
                vec![#(#values),*]
            }

            fn from_row(row: &store_object::RowMap) -> ::std::result::Result<Self, store_object::DbError> {
                Ok(Self {
                    #(#assignments),*
                })
            }
        }
    }
}
