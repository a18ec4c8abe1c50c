//! Procedural macros for declaring database models
//!
//! This crate provides the `Model` derive, which turns a struct with
//! `#[field(...)]` annotations into a schema descriptor plus row conversions,
//! and the `#[model]` attribute that adds the usual derives alongside it.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod codegen;
mod model_macro;
mod parsing;

use codegen::generate_model_impl;
use model_macro::model_attribute;
use parsing::{parse_fields, parse_table_attributes};

/// Derive macro for the `Model` trait
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Default, Model)]
/// #[table(name = "users")]
/// pub struct User {
///     #[field(pk, autoinc)]
///     pub id: i64,
///     #[field(unique, size = 120)]
///     pub email: String,
///     #[field(default = "false")]
///     pub is_admin: bool,
///     #[field(now, update)]
///     pub updated_at: chrono::DateTime<chrono::Utc>,
///     #[field(skip)]
///     pub session: Option<String>,
/// }
/// ```
///
/// Without `#[table(name = ...)]` the table is named after the struct in snake_case.
/// Fields of type `Vec<T>` (other than `Vec<u8>`) are described but never stored.
#[proc_macro_derive(Model, attributes(table, field))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let table = match parse_table_attributes(&input.ident, &input.attrs) {
        Ok(table) => table,
        Err(e) => return e.to_compile_error().into(),
    };

    let fields = match parse_fields(&input.data) {
        Ok(fields) => fields,
        Err(e) => return e.to_compile_error().into(),
    };

    TokenStream::from(generate_model_impl(&input.ident, &table, &fields))
}

/// Convenience attribute macro that adds the derives a model usually needs
///
/// ```rust,ignore
/// #[model]
/// #[table(name = "posts")]
/// pub struct Post {
///     #[field(pk, autoinc)]
///     pub id: i64,
///     pub title: String,
/// }
/// ```
#[proc_macro_attribute]
pub fn model(attr: TokenStream, item: TokenStream) -> TokenStream {
    model_attribute(attr, item)
}
