//! Parsing utilities for table and field attributes
//!
//! This module handles the parsing of `#[table]` and `#[field]` attributes
//! and validation of table and column names.

use syn::{
    Attribute, Data, Error, Fields, GenericArgument, Ident, LitInt, LitStr, PathArguments, Result,
    Type,
};

/// Validate table name and return syn::Error for better proc macro error handling
pub fn validate_table_name_syn(name: &str, span: proc_macro2::Span) -> Result<()> {
    validate_identifier(name)
        .map_err(|e| Error::new(span, format!("Invalid table name '{}': {}", name, e)))
}

/// Validate column name and return syn::Error for better proc macro error handling
pub fn validate_field_name_syn(name: &str, span: proc_macro2::Span) -> Result<()> {
    validate_identifier(name)
        .map_err(|e| Error::new(span, format!("Invalid field name '{}': {}", name, e)))
}

/// Mirrors `store_object::validation` so bad names fail at compile time
fn validate_identifier(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".to_string());
    }

    if name.len() > 63 {
        return Err(format!("{} characters (max 63)", name.len()));
    }

    let first_char = name
        .chars()
        .next()
        .ok_or_else(|| "Name cannot be empty".to_string())?;
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err("must start with a letter or underscore".to_string());
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("only alphanumeric characters and underscores are allowed".to_string());
    }

    if is_reserved_keyword(name) {
        return Err("reserved SQL keyword".to_string());
    }

    Ok(())
}

/// Statement keywords that break unquoted where-clause sugar
fn is_reserved_keyword(name: &str) -> bool {
    const RESERVED_KEYWORDS: &[&str] = &[
        "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "ON", "AS", "AND", "OR",
        "NOT", "NULL", "TRUE", "FALSE", "CASE", "WHEN", "THEN", "ELSE", "END", "IN", "LIKE",
        "BETWEEN", "ORDER", "BY", "GROUP", "HAVING", "LIMIT", "OFFSET", "UNION", "DISTINCT",
        "CREATE", "DROP", "ALTER", "TABLE", "PRIMARY", "FOREIGN", "REFERENCES", "CONSTRAINT",
    ];

    RESERVED_KEYWORDS.contains(&name.to_ascii_uppercase().as_str())
}

/// Convert a struct or field name to snake_case
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let boundary = i > 0 && {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}

#[derive(Debug)]
pub struct TableInfo {
    pub name: String,
}

/// How a field's values are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStorage {
    /// A single column whose kind comes from `SqlKind`
    Column,
    /// `Vec<T>` of non-byte values: described, never materialized
    Slice,
    /// `#[field(skip)]`
    Skipped,
}

#[derive(Debug)]
pub struct FieldInfo {
    pub ident: Ident,
    pub column: String,
    pub ty: Type,
    pub storage: FieldStorage,
    pub tags: Vec<String>,
}

pub fn parse_table_attributes(struct_name: &Ident, attrs: &[Attribute]) -> Result<TableInfo> {
    let mut name = None;

    for attr in attrs {
        if !attr.path().is_ident("table") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                name = Some((value.value(), value.span()));
                Ok(())
            } else {
                Err(meta.error("unsupported table attribute, expected `name = \"...\"`"))
            }
        })?;
    }

    let (name, span) =
        name.unwrap_or_else(|| (to_snake_case(&struct_name.to_string()), struct_name.span()));
    validate_table_name_syn(&name, span)?;

    Ok(TableInfo { name })
}

pub fn parse_fields(data: &Data) -> Result<Vec<FieldInfo>> {
    let Data::Struct(data_struct) = data else {
        return Err(Error::new(
            proc_macro2::Span::call_site(),
            "Model can only be derived for structs with named fields",
        ));
    };
    let Fields::Named(fields_named) = &data_struct.fields else {
        return Err(Error::new(
            proc_macro2::Span::call_site(),
            "Model can only be derived for structs with named fields",
        ));
    };

    let mut fields = Vec::new();
    for field in &fields_named.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| Error::new_spanned(field, "Field must have a name"))?;

        let raw = ident.to_string();
        let column = to_snake_case(raw.trim_start_matches("r#"));

        let mut tags = Vec::new();
        for attr in &field.attrs {
            if attr.path().is_ident("field") {
                parse_field_tags(attr, &mut tags)?;
            }
        }

        let storage = if tags.iter().any(|t| t == "-") {
            FieldStorage::Skipped
        } else if is_slice(&field.ty) {
            FieldStorage::Slice
        } else {
            validate_field_name_syn(&column, ident.span())?;
            FieldStorage::Column
        };

        fields.push(FieldInfo {
            ident,
            column,
            ty: field.ty.clone(),
            storage,
            tags,
        });
    }

    let pk_count = fields
        .iter()
        .filter(|f| f.tags.iter().any(|t| t == "pk" || t == "autoinc"))
        .count();
    if pk_count > 1 {
        return Err(Error::new(
            proc_macro2::Span::call_site(),
            "only one field may be tagged `pk` or `autoinc`",
        ));
    }

    Ok(fields)
}

/// Translate `#[field(...)]` entries into tag atoms
fn parse_field_tags(attr: &Attribute, tags: &mut Vec<String>) -> Result<()> {
    attr.parse_nested_meta(|meta| {
        let Some(key) = meta.path.get_ident().map(|i| i.to_string()) else {
            return Err(meta.error("expected a tag name"));
        };

        match key.as_str() {
            "pk" | "autoinc" | "notnull" | "unique" | "iunique" | "index" | "text" | "json"
            | "now" | "update" => tags.push(key),
            "desc_index" => tags.push("-index".to_string()),
            "skip" => tags.push("-".to_string()),
            "default" => {
                if meta.input.peek(syn::Token![=]) {
                    let value: LitStr = meta.value()?.parse()?;
                    tags.push(format!("default:{}", value.value()));
                } else {
                    tags.push("default".to_string());
                }
            }
            "size" => {
                let value: LitInt = meta.value()?.parse()?;
                let size: u32 = value.base10_parse()?;
                tags.push(format!("size:{}", size));
            }
            "fk" | "check" | "generated" | "mindex" | "uindex" => {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().trim().is_empty() {
                    return Err(meta.error(format!("`{}` needs a value", key)));
                }
                tags.push(format!("{}:{}", key, value.value()));
            }
            "tags" => {
                let value: LitStr = meta.value()?.parse()?;
                tags.extend(
                    value
                        .value()
                        .split(';')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty()),
                );
            }
            _ => return Err(meta.error(format!("unknown field tag `{}`", key))),
        }
        Ok(())
    })
}

/// `Vec<T>` with `T` other than `u8`
fn is_slice(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(last) = path.path.segments.last() else {
        return false;
    };
    if last.ident != "Vec" {
        return false;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return false;
    };
    !matches!(
        args.args.first(),
        Some(GenericArgument::Type(Type::Path(inner))) if inner.path.is_ident("u8")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_valid_and_invalid_names() {
        let span = proc_macro2::Span::call_site();
        assert!(validate_table_name_syn("user_profiles", span).is_ok());
        assert!(validate_table_name_syn("_private", span).is_ok());
        assert!(validate_table_name_syn("SELECT", span).is_err());
        assert!(validate_table_name_syn("123table", span).is_err());
        assert!(validate_table_name_syn("users; DROP TABLE users; --", span).is_err());
        assert!(validate_field_name_syn("", span).is_err());
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("UserProfile"), "user_profile");
        assert_eq!(to_snake_case("isAdmin"), "is_admin");
        assert_eq!(to_snake_case("HTTPLog"), "http_log");
    }

    #[test]
    fn test_default_table_name() {
        let input: syn::DeriveInput = parse_quote! {
            struct BlogPost { id: i64 }
        };
        let table = parse_table_attributes(&input.ident, &input.attrs).unwrap();
        assert_eq!(table.name, "blog_post");
    }

    #[test]
    fn test_field_tags() {
        let input: syn::DeriveInput = parse_quote! {
            struct User {
                #[field(pk, autoinc)]
                id: i64,
                #[field(unique, size = 64, default = "x")]
                email: String,
                #[field(fk = "orgs.id:cascade", desc_index)]
                org_id: i64,
                #[field(skip)]
                cache: String,
                posts: Vec<String>,
                avatar: Vec<u8>,
            }
        };
        let fields = parse_fields(&input.data).unwrap();

        assert_eq!(fields[0].tags, vec!["pk", "autoinc"]);
        assert_eq!(fields[1].tags, vec!["unique", "size:64", "default:x"]);
        assert_eq!(fields[2].tags, vec!["fk:orgs.id:cascade", "-index"]);
        assert_eq!(fields[3].storage, FieldStorage::Skipped);
        assert_eq!(fields[4].storage, FieldStorage::Slice);
        assert_eq!(fields[5].storage, FieldStorage::Column);
    }

    #[test]
    fn test_two_primary_keys_rejected() {
        let input: syn::DeriveInput = parse_quote! {
            struct Bad {
                #[field(pk)]
                a: i64,
                #[field(pk)]
                b: i64,
            }
        };
        assert!(parse_fields(&input.data).is_err());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let input: syn::DeriveInput = parse_quote! {
            struct Bad {
                #[field(primary)]
                a: i64,
            }
        };
        assert!(parse_fields(&input.data).is_err());
    }
}
