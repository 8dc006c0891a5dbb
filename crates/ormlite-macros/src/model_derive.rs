//! Implementation of the Model derive macro.
//!
//! Struct and field `#[ormlite(...)]` attributes are parsed into a
//! [`ModelDef`], which is then rendered as an `ormlite_core::Model`
//! implementation whose `describe` chains one builder call per field.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::punctuated::Punctuated;
use syn::{
    Data, DeriveInput, Error, Field, Fields, GenericArgument, Ident, LitBool, LitInt, LitStr,
    PathArguments, Result, Token, Type,
};

/// Parsed model definition from a struct with `#[derive(Model)]`.
#[derive(Debug)]
pub struct ModelDef {
    pub ident: Ident,
    pub generics: syn::Generics,
    /// Logical name override; the struct name otherwise.
    pub name: Option<String>,
    pub alias: Option<String>,
    pub schema: Option<String>,
    pub indexes: Vec<IndexDef>,
    pub unique_constraints: Vec<Vec<String>>,
    pub pre_create_table: Option<String>,
    pub post_create_table: Option<String>,
    pub pre_drop_table: Option<String>,
    pub post_drop_table: Option<String>,
    pub fields: Vec<FieldDef>,
}

/// A composite index declared on the struct.
#[derive(Debug)]
pub struct IndexDef {
    pub fields: Vec<String>,
    pub unique: bool,
}

/// How a struct field participates in the model.
#[derive(Debug)]
pub enum FieldKind {
    Column,
    Ignored,
    /// `Vec<C>` navigation property.
    ReferenceMany(Type),
    /// `Option<C>` navigation property.
    ReferenceOne(Type),
}

/// Parsed attributes of a single field.
#[derive(Debug)]
pub struct FieldDef {
    pub ident: Ident,
    pub ty: Type,
    /// Logical field name, `customer_id` becomes `CustomerId`.
    pub name: String,
    pub kind: FieldKind,
    pub alias: Option<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub auto_id: bool,
    pub index: bool,
    pub unique: bool,
    pub nullable: Option<bool>,
    pub default: Option<String>,
    pub references: Option<syn::Path>,
    pub on_delete: Option<Ident>,
    pub on_update: Option<Ident>,
    pub fk_name: Option<String>,
    pub custom_select: Option<String>,
    pub compute: Option<String>,
    pub column_type: Option<String>,
    pub length: Option<u32>,
    pub scale: Option<u32>,
    pub ignore_on_insert: bool,
    pub ignore_on_update: bool,
    pub as_int: bool,
}

/// Parse a `DeriveInput` into a `ModelDef`.
pub fn parse_model(input: &DeriveInput) -> Result<ModelDef> {
    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs, not unions",
            ));
        }
    };

    let mut def = ModelDef {
        ident: input.ident.clone(),
        generics: input.generics.clone(),
        name: None,
        alias: None,
        schema: None,
        indexes: Vec::new(),
        unique_constraints: Vec::new(),
        pre_create_table: None,
        post_create_table: None,
        pre_drop_table: None,
        post_drop_table: None,
        fields,
    };

    for attr in &input.attrs {
        if !attr.path().is_ident("ormlite") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("name") {
                def.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("alias") {
                def.alias = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("schema") {
                def.schema = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("index") || path.is_ident("unique_index") {
                let unique = path.is_ident("unique_index");
                let fields = parse_name_list(&meta)?;
                def.indexes.push(IndexDef { fields, unique });
            } else if path.is_ident("unique_constraint") {
                def.unique_constraints.push(parse_name_list(&meta)?);
            } else if path.is_ident("pre_create_table") {
                def.pre_create_table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("post_create_table") {
                def.post_create_table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("pre_drop_table") {
                def.pre_drop_table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("post_drop_table") {
                def.post_drop_table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                let attr_name = path.to_token_stream().to_string();
                return Err(Error::new_spanned(
                    path,
                    format!(
                        "unknown ormlite struct attribute `{attr_name}`. \
                         Valid attributes are: name, alias, schema, index, unique_index, \
                         unique_constraint, pre_create_table, post_create_table, \
                         pre_drop_table, post_drop_table"
                    ),
                ));
            }
            Ok(())
        })?;
    }

    Ok(def)
}

/// `("A", "B")` after an attribute name.
fn parse_name_list(meta: &syn::meta::ParseNestedMeta<'_>) -> Result<Vec<String>> {
    let content;
    syn::parenthesized!(content in meta.input);
    let names = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
    if names.is_empty() {
        return Err(meta.error("expected at least one field name"));
    }
    Ok(names.iter().map(LitStr::value).collect())
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new_spanned(
            fields,
            "Model requires a struct with named fields",
        )),
        Fields::Unit => Err(Error::new_spanned(
            fields,
            "Model requires at least one field",
        )),
    }
}

fn parse_field(field: &Field) -> Result<FieldDef> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut def = FieldDef {
        name: pascal_case(&ident.to_string()),
        ident,
        ty: field.ty.clone(),
        kind: FieldKind::Column,
        alias: None,
        primary_key: false,
        auto_increment: false,
        auto_id: false,
        index: false,
        unique: false,
        nullable: None,
        default: None,
        references: None,
        on_delete: None,
        on_update: None,
        fk_name: None,
        custom_select: None,
        compute: None,
        column_type: None,
        length: None,
        scale: None,
        ignore_on_insert: false,
        ignore_on_update: false,
        as_int: false,
    };
    let mut is_reference = false;
    let mut ignored = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("ormlite") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("name") {
                def.name = meta.value()?.parse::<LitStr>()?.value();
            } else if path.is_ident("alias") {
                def.alias = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("primary_key") {
                def.primary_key = true;
            } else if path.is_ident("auto_increment") {
                def.auto_increment = true;
            } else if path.is_ident("auto_id") {
                def.auto_id = true;
            } else if path.is_ident("index") {
                def.index = true;
            } else if path.is_ident("unique") {
                def.unique = true;
            } else if path.is_ident("nullable") {
                def.nullable = Some(if meta.input.peek(Token![=]) {
                    meta.value()?.parse::<LitBool>()?.value
                } else {
                    true
                });
            } else if path.is_ident("default") {
                def.default = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("references") {
                def.references = Some(meta.value()?.parse::<syn::Path>()?);
            } else if path.is_ident("on_delete") {
                def.on_delete = Some(parse_action(&meta.value()?.parse::<LitStr>()?)?);
            } else if path.is_ident("on_update") {
                def.on_update = Some(parse_action(&meta.value()?.parse::<LitStr>()?)?);
            } else if path.is_ident("fk_name") {
                def.fk_name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("custom_select") {
                def.custom_select = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("compute") {
                def.compute = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("column_type") {
                def.column_type = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("length") {
                def.length = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if path.is_ident("scale") {
                def.scale = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if path.is_ident("ignore") {
                ignored = true;
            } else if path.is_ident("ignore_on_insert") {
                def.ignore_on_insert = true;
            } else if path.is_ident("ignore_on_update") {
                def.ignore_on_update = true;
            } else if path.is_ident("as_int") {
                def.as_int = true;
            } else if path.is_ident("reference") {
                is_reference = true;
            } else {
                let attr_name = path.to_token_stream().to_string();
                return Err(Error::new_spanned(
                    path,
                    format!(
                        "unknown ormlite field attribute `{attr_name}`. \
                         Valid attributes are: name, alias, primary_key, auto_increment, \
                         auto_id, index, unique, nullable, default, references, on_delete, \
                         on_update, fk_name, custom_select, compute, column_type, length, \
                         scale, ignore, ignore_on_insert, ignore_on_update, as_int, reference"
                    ),
                ));
            }
            Ok(())
        })?;
    }

    if (def.on_delete.is_some() || def.on_update.is_some() || def.fk_name.is_some())
        && def.references.is_none()
    {
        return Err(Error::new_spanned(
            &field.ty,
            "on_delete, on_update and fk_name need `references = Model`",
        ));
    }

    if is_reference {
        if ignored {
            return Err(Error::new_spanned(
                &field.ty,
                "a field cannot be both `reference` and `ignore`",
            ));
        }
        def.kind = if let Some(inner) = generic_inner(&field.ty, "Vec") {
            FieldKind::ReferenceMany(inner.clone())
        } else if let Some(inner) = generic_inner(&field.ty, "Option") {
            FieldKind::ReferenceOne(inner.clone())
        } else {
            return Err(Error::new_spanned(
                &field.ty,
                "reference fields must be `Vec<Model>` or `Option<Model>`",
            ));
        };
    } else if ignored {
        def.kind = FieldKind::Ignored;
    }

    Ok(def)
}

/// Map a referential action string to its `ReferentialAction` variant.
fn parse_action(lit: &LitStr) -> Result<Ident> {
    let variant = match lit.value().to_uppercase().replace(['_', ' '], "").as_str() {
        "NOACTION" => "NoAction",
        "RESTRICT" => "Restrict",
        "CASCADE" => "Cascade",
        "SETNULL" => "SetNull",
        "SETDEFAULT" => "SetDefault",
        _ => {
            return Err(Error::new_spanned(
                lit,
                "expected one of: no action, restrict, cascade, set null, set default",
            ));
        }
    };
    Ok(Ident::new(variant, lit.span()))
}

/// `customer_id` -> `CustomerId`; raw identifiers lose their `r#`.
pub fn pascal_case(ident: &str) -> String {
    let ident = ident.strip_prefix("r#").unwrap_or(ident);
    let mut out = String::with_capacity(ident.len());
    for part in ident.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// The type argument of `Wrapper<T>`.
fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// Generate the `Model` trait implementation.
pub fn generate_model_impl(def: &ModelDef) -> TokenStream {
    let ident = &def.ident;
    let (impl_generics, ty_generics, where_clause) = def.generics.split_for_impl();

    let mut table_calls = Vec::new();
    if let Some(name) = &def.name {
        table_calls.push(quote! { .name(#name) });
    }
    if let Some(alias) = &def.alias {
        table_calls.push(quote! { .alias(#alias) });
    }
    if let Some(schema) = &def.schema {
        table_calls.push(quote! { .schema(#schema) });
    }

    let field_calls: Vec<TokenStream> = def.fields.iter().map(generate_field_call).collect();

    let mut trailing_calls = Vec::new();
    for index in &def.indexes {
        let names = &index.fields;
        let unique = index.unique;
        trailing_calls.push(quote! { .composite_index(&[#(#names),*], #unique) });
    }
    for names in &def.unique_constraints {
        trailing_calls.push(quote! { .unique_constraint(&[#(#names),*]) });
    }
    for (method, sql) in [
        ("pre_create_table", &def.pre_create_table),
        ("post_create_table", &def.post_create_table),
        ("pre_drop_table", &def.pre_drop_table),
        ("post_drop_table", &def.post_drop_table),
    ] {
        if let Some(sql) = sql {
            let method = Ident::new(method, proc_macro2::Span::call_site());
            trailing_calls.push(quote! { .#method(#sql) });
        }
    }

    quote! {
        impl #impl_generics ::ormlite_core::Model for #ident #ty_generics #where_clause {
            fn describe(
                builder: ::ormlite_core::ModelBuilder<Self>,
            ) -> ::ormlite_core::ModelBuilder<Self> {
                builder
                    #(#table_calls)*
                    #(#field_calls)*
                    #(#trailing_calls)*
            }
        }
    }
}

fn generate_field_call(field: &FieldDef) -> TokenStream {
    let ident = &field.ident;
    let ty = &field.ty;
    let name = &field.name;
    match &field.kind {
        FieldKind::Ignored => quote! { .ignore(#name) },
        FieldKind::ReferenceMany(child) => quote! {
            .reference_many::<#child, _>(
                #name,
                |m: &mut Self, v: ::std::vec::Vec<#child>| m.#ident = v,
            )
        },
        FieldKind::ReferenceOne(child) => quote! {
            .reference_one::<#child, _>(
                #name,
                |m: &mut Self, v: ::std::option::Option<#child>| m.#ident = v,
            )
        },
        FieldKind::Column => {
            let spec = field_spec_calls(field);
            quote! {
                .field_with(
                    #name,
                    |m: &Self| &m.#ident,
                    |m: &mut Self, v: #ty| m.#ident = v,
                    |f: ::ormlite_core::FieldSpec| f #(#spec)*,
                )
            }
        }
    }
}

/// `FieldSpec` builder calls, with foreign-key modifiers after `references`.
fn field_spec_calls(field: &FieldDef) -> Vec<TokenStream> {
    let mut calls = Vec::new();
    if let Some(alias) = &field.alias {
        calls.push(quote! { .alias(#alias) });
    }
    if field.primary_key {
        calls.push(quote! { .primary_key() });
    }
    if field.auto_increment {
        calls.push(quote! { .auto_increment() });
    }
    if field.auto_id {
        calls.push(quote! { .auto_id() });
    }
    if field.unique {
        calls.push(quote! { .unique() });
    } else if field.index {
        calls.push(quote! { .index() });
    }
    if let Some(nullable) = field.nullable {
        calls.push(quote! { .nullable(#nullable) });
    }
    if let Some(default) = &field.default {
        calls.push(quote! { .default_value(#default) });
    }
    if let Some(target) = &field.references {
        calls.push(quote! { .references::<#target>() });
        if let Some(action) = &field.on_delete {
            calls.push(quote! { .on_delete(::ormlite_core::ReferentialAction::#action) });
        }
        if let Some(action) = &field.on_update {
            calls.push(quote! { .on_update(::ormlite_core::ReferentialAction::#action) });
        }
        if let Some(fk_name) = &field.fk_name {
            calls.push(quote! { .fk_name(#fk_name) });
        }
    }
    if let Some(sql) = &field.custom_select {
        calls.push(quote! { .custom_select(#sql) });
    }
    if let Some(sql) = &field.compute {
        calls.push(quote! { .compute(#sql) });
    }
    if let Some(sql) = &field.column_type {
        calls.push(quote! { .custom_field_definition(#sql) });
    }
    if let Some(length) = field.length {
        calls.push(quote! { .length(#length) });
    }
    if let Some(scale) = field.scale {
        calls.push(quote! { .scale(#scale) });
    }
    if field.ignore_on_insert {
        calls.push(quote! { .ignore_on_insert() });
    }
    if field.ignore_on_update {
        calls.push(quote! { .ignore_on_update() });
    }
    if field.as_int {
        calls.push(quote! { .treat_as_int() });
    }
    calls
}
