//! Naming strategies mapping logical names to table and column names.

use std::fmt;

/// Maps logical model and field names to database names.
pub trait NamingStrategy: Send + Sync + fmt::Debug {
    fn table_name(&self, name: &str) -> String;

    fn column_name(&self, name: &str) -> String;
}

/// Names are used as declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNaming;

impl NamingStrategy for IdentityNaming {
    fn table_name(&self, name: &str) -> String {
        name.to_string()
    }

    fn column_name(&self, name: &str) -> String {
        name.to_string()
    }
}

/// `OrderLine` and `orderLine` both become `order_line`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerSnakeCase;

impl LowerSnakeCase {
    fn convert(name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 4);
        let mut prev_lower_or_digit = false;
        for c in name.chars() {
            if c.is_ascii_uppercase() {
                if prev_lower_or_digit {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
                prev_lower_or_digit = false;
            } else {
                out.push(c);
                prev_lower_or_digit = c.is_ascii_lowercase() || c.is_ascii_digit();
            }
        }
        out
    }
}

impl NamingStrategy for LowerSnakeCase {
    fn table_name(&self, name: &str) -> String {
        Self::convert(name)
    }

    fn column_name(&self, name: &str) -> String {
        Self::convert(name)
    }
}
