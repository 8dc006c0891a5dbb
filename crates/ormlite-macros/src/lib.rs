//! Procedural macros for OrmLite Rust.
//!
//! - `#[derive(Model)]` implements `ormlite_core::Model` from the struct's
//!   fields and `#[ormlite(...)]` attributes.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Model, Debug, Default)]
//! #[ormlite(alias = "orders", unique_constraint("Number"))]
//! struct Order {
//!     #[ormlite(auto_increment)]
//!     id: i64,
//!     #[ormlite(references = Customer, on_delete = "cascade")]
//!     customer_id: i64,
//!     #[ormlite(length = 20)]
//!     number: String,
//!     #[ormlite(reference)]
//!     customer: Option<Customer>,
//! }
//! ```
//!
//! Field names are the PascalCase form of the Rust identifier
//! (`customer_id` is `CustomerId`) unless overridden with `name = "..."`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod model_derive;

/// Derive `ormlite_core::Model`.
///
/// Struct attributes: `name`, `alias`, `schema`, `index("A", "B")`,
/// `unique_index(..)`, `unique_constraint(..)`, `pre_create_table`,
/// `post_create_table`, `pre_drop_table`, `post_drop_table`.
///
/// Field attributes: `name`, `alias`, `primary_key`, `auto_increment`,
/// `auto_id`, `index`, `unique`, `nullable`, `default`, `references`,
/// `on_delete`, `on_update`, `fk_name`, `custom_select`, `compute`,
/// `column_type`, `length`, `scale`, `ignore`, `ignore_on_insert`,
/// `ignore_on_update`, `as_int`, `reference`.
#[proc_macro_derive(Model, attributes(ormlite))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match model_derive::parse_model(&input) {
        Ok(def) => model_derive::generate_model_impl(&def).into(),
        Err(e) => e.to_compile_error().into(),
    }
}
