//! Row-to-instance population.
//!
//! Columns are bound to fields once per result set. A field is bound by its
//! exact (dialect-normalized) column name first; a field left unbound is
//! then guessed from the column names in a fixed order:
//!
//! 1. column name with underscores stripped equals the field name with
//!    underscores stripped,
//! 2. column name with every non-alphanumeric character stripped equals the
//!    field name stripped the same way,
//! 3. column name ends with the field name (plain, underscore-stripped or
//!    alphanumeric-only),
//!
//! and for an aliased field the whole sequence is repeated against the
//! field's declared name. Unmatched fields stay unpopulated.

use crate::config::NullPolicy;
use ormlite_core::{ColumnInfo, Converter, Model, ModelDefinition, Row};
use ormlite_query::DialectProvider;
use regex::Regex;
use std::any::Any;
use std::sync::{Arc, LazyLock};

/// One field bound to one result column.
#[derive(Debug, Clone)]
pub struct ColumnBinding {
    /// Index into [`ModelDefinition::fields`].
    pub field_index: usize,
    /// Index of the column in each row.
    pub column: usize,
    pub converter: Arc<dyn Converter>,
}

/// Populates instances of one model from rows sharing one column layout.
pub struct Materializer<'a> {
    def: &'a ModelDefinition,
    dialect: &'a dyn DialectProvider,
    bindings: Vec<ColumnBinding>,
    null_policy: NullPolicy,
}

impl<'a> Materializer<'a> {
    /// Bind `columns` to the fields of `def`.
    pub fn bind(
        def: &'a ModelDefinition,
        dialect: &'a dyn DialectProvider,
        columns: &ColumnInfo,
        null_policy: NullPolicy,
    ) -> Self {
        let names: Vec<&str> = columns.names().collect();
        let mut slots: Vec<Option<usize>> = vec![None; def.fields.len()];
        let mut claimed = vec![false; names.len()];

        for (i, field) in def.fields.iter().enumerate() {
            let column_name = dialect.column_name(field);
            if let Some(col) = names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(&column_name))
            {
                slots[i] = Some(col);
                claimed[col] = true;
            }
        }

        for (i, field) in def.fields.iter().enumerate() {
            if slots[i].is_some() {
                continue;
            }
            let mut guessed = guess_column(&dialect.column_name(field), &names, &claimed);
            if guessed.is_none() && field.alias.is_some() {
                guessed = guess_column(&field.name, &names, &claimed);
            }
            match guessed {
                Some(col) => {
                    tracing::trace!(
                        field = %field.name,
                        column = names[col],
                        "Column matched by name guessing"
                    );
                    slots[i] = Some(col);
                    claimed[col] = true;
                }
                None => tracing::trace!(field = %field.name, "No column for field"),
            }
        }

        let converters = dialect.converters();
        let bindings: Vec<ColumnBinding> = slots
            .into_iter()
            .enumerate()
            .filter_map(|(field_index, slot)| {
                slot.map(|column| ColumnBinding {
                    field_index,
                    column,
                    converter: converters.resolve_best(&def.fields[field_index]),
                })
            })
            .collect();
        tracing::debug!(
            model = %def.name,
            columns = names.len(),
            bound = bindings.len(),
            "Bound result columns"
        );
        Self {
            def,
            dialect,
            bindings,
            null_policy,
        }
    }

    pub fn bindings(&self) -> &[ColumnBinding] {
        &self.bindings
    }

    /// Whether the field is populated from some column.
    pub fn is_bound(&self, field_name: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| self.def.fields[b.field_index].name == field_name)
    }

    /// Copy one row into an existing instance.
    ///
    /// Conversion failures are logged and leave the field untouched.
    pub fn populate(&self, target: &mut dyn Any, row: &Row) {
        let converters = self.dialect.converters();
        for binding in &self.bindings {
            let field = &self.def.fields[binding.field_index];
            let Some(value) = row.get(binding.column) else {
                continue;
            };
            if value.is_null() {
                if self.null_policy == NullPolicy::UseDefault {
                    field.set_value(target, None);
                }
                continue;
            }
            match converters.from_db_value_with(binding.converter.as_ref(), field, value.clone()) {
                Ok(native) => {
                    if !field.set_value(target, native) {
                        tracing::warn!(
                            model = %self.def.name,
                            field = %field.name,
                            "Converted value does not fit the field"
                        );
                    }
                }
                Err(e) => tracing::warn!(
                    model = %self.def.name,
                    field = %field.name,
                    error = %e,
                    "Skipping field of row"
                ),
            }
        }
    }

    /// One type-erased instance per row.
    pub fn materialize_boxed(&self, rows: &[Row]) -> Vec<Box<dyn Any + Send>> {
        rows.iter()
            .map(|row| {
                let mut instance = self.def.new_instance();
                self.populate(instance.as_mut(), row);
                instance
            })
            .collect()
    }

    pub fn materialize<M: Model>(&self, rows: &[Row]) -> Vec<M> {
        rows.iter()
            .map(|row| {
                let mut instance = M::default();
                self.populate(&mut instance, row);
                instance
            })
            .collect()
    }
}

/// Bind and populate in one step; an empty row set needs no binding.
pub(crate) fn rows_to_models<M: Model>(
    def: &ModelDefinition,
    dialect: &dyn DialectProvider,
    rows: &[Row],
    null_policy: NullPolicy,
) -> Vec<M> {
    match rows.first() {
        Some(first) => Materializer::bind(def, dialect, first.columns(), null_policy).materialize(rows),
        None => Vec::new(),
    }
}

pub(crate) fn rows_to_boxed(
    def: &ModelDefinition,
    dialect: &dyn DialectProvider,
    rows: &[Row],
    null_policy: NullPolicy,
) -> Vec<Box<dyn Any + Send>> {
    match rows.first() {
        Some(first) => {
            Materializer::bind(def, dialect, first.columns(), null_policy).materialize_boxed(rows)
        }
        None => Vec::new(),
    }
}

fn strip_underscores(name: &str) -> String {
    name.replace('_', "")
}

fn alphanumeric(name: &str) -> String {
    static NON_ALPHANUMERIC: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]").expect("Invalid Regex"));
    NON_ALPHANUMERIC.replace_all(name, "").into_owned()
}

fn ends_with_ignore_case(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_lowercase().ends_with(&needle.to_lowercase())
}

/// Index of the column most plausibly holding `field_name`, skipping
/// claimed columns.
pub fn guess_column(field_name: &str, columns: &[&str], claimed: &[bool]) -> Option<usize> {
    let open = || {
        columns
            .iter()
            .enumerate()
            .filter(|(i, name)| !claimed.get(*i).copied().unwrap_or(false) && !name.is_empty())
    };

    let underscoreless = strip_underscores(field_name);
    if let Some((i, _)) =
        open().find(|(_, name)| strip_underscores(name).eq_ignore_ascii_case(&underscoreless))
    {
        return Some(i);
    }

    let sanitized = alphanumeric(field_name);
    if let Some((i, _)) = open().find(|(_, name)| alphanumeric(name).eq_ignore_ascii_case(&sanitized)) {
        return Some(i);
    }

    open()
        .find(|(_, name)| {
            ends_with_ignore_case(name, field_name)
                || ends_with_ignore_case(&strip_underscores(name), &underscoreless)
                || ends_with_ignore_case(&alphanumeric(name), &sanitized)
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlite_core::{ModelBuilder, Value};
    use ormlite_query::SqliteDialect;

    #[derive(Debug, Default)]
    struct Account {
        id: i64,
        first_name: String,
        balance: Option<f64>,
        code: String,
    }

    impl Model for Account {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |a: &Self| &a.id, |a: &mut Self, v| a.id = v)
                .field(
                    "FirstName",
                    |a: &Self| &a.first_name,
                    |a: &mut Self, v| a.first_name = v,
                )
                .field("Balance", |a: &Self| &a.balance, |a: &mut Self, v| a.balance = v)
                .field_with(
                    "Code",
                    |a: &Self| &a.code,
                    |a: &mut Self, v| a.code = v,
                    |f| f.alias("acct_code"),
                )
        }
    }

    fn one(row: Row, policy: NullPolicy, start: Account) -> Account {
        let def = Account::definition().expect("definition");
        let dialect = SqliteDialect::new();
        let materializer = Materializer::bind(&def, &dialect, row.columns(), policy);
        let mut account = start;
        materializer.populate(&mut account, &row);
        account
    }

    #[test]
    fn test_exact_column_names() {
        let row = Row::from_pairs(vec![
            ("Id", Value::BigInt(7)),
            ("FirstName", Value::Text("Ada".into())),
            ("Balance", Value::Double(2.5)),
            ("acct_code", Value::Text("X1".into())),
        ]);
        let account = one(row, NullPolicy::UseDefault, Account::default());
        assert_eq!(account.id, 7);
        assert_eq!(account.first_name, "Ada");
        assert_eq!(account.balance, Some(2.5));
        assert_eq!(account.code, "X1");
    }

    #[test]
    fn test_underscore_variant() {
        let row = Row::from_pairs(vec![("first_name", Value::Text("Grace".into()))]);
        let account = one(row, NullPolicy::UseDefault, Account::default());
        assert_eq!(account.first_name, "Grace");
    }

    #[test]
    fn test_sanitized_variant() {
        let row = Row::from_pairs(vec![("First-Name", Value::Text("Lin".into()))]);
        let account = one(row, NullPolicy::UseDefault, Account::default());
        assert_eq!(account.first_name, "Lin");
    }

    #[test]
    fn test_prefixed_variant() {
        let row = Row::from_pairs(vec![("customer_first_name", Value::Text("Joan".into()))]);
        let account = one(row, NullPolicy::UseDefault, Account::default());
        assert_eq!(account.first_name, "Joan");
    }

    #[test]
    fn test_alias_falls_back_to_declared_name() {
        let row = Row::from_pairs(vec![("code", Value::Text("C9".into()))]);
        let account = one(row, NullPolicy::UseDefault, Account::default());
        assert_eq!(account.code, "C9");
    }

    #[test]
    fn test_unrelated_column_is_ignored() {
        let row = Row::from_pairs(vec![("Zebra", Value::Text("stripes".into()))]);
        let account = one(row, NullPolicy::UseDefault, Account::default());
        assert!(account.first_name.is_empty());
        assert_eq!(account.id, 0);
    }

    #[test]
    fn test_null_policy() {
        let start = || Account {
            first_name: "kept".into(),
            balance: Some(1.0),
            ..Account::default()
        };
        let row = Row::from_pairs(vec![
            ("FirstName", Value::Null),
            ("Balance", Value::Null),
        ]);
        let reset = one(row.clone(), NullPolicy::UseDefault, start());
        assert!(reset.first_name.is_empty());
        assert_eq!(reset.balance, None);

        let kept = one(row, NullPolicy::LeaveUnchanged, start());
        assert_eq!(kept.first_name, "kept");
        assert_eq!(kept.balance, Some(1.0));
    }

    #[test]
    fn test_conversion_failure_keeps_prior_value_and_row() {
        let row = Row::from_pairs(vec![
            ("Id", Value::Text("not a number".into())),
            ("FirstName", Value::Text("Still".into())),
        ]);
        let account = one(
            row,
            NullPolicy::UseDefault,
            Account {
                id: 3,
                ..Account::default()
            },
        );
        assert_eq!(account.id, 3);
        assert_eq!(account.first_name, "Still");
    }

    #[test]
    fn test_guess_order_prefers_underscore_match_over_suffix() {
        let columns = ["order_first_name", "first_name"];
        assert_eq!(guess_column("FirstName", &columns, &[false, false]), Some(1));
        assert_eq!(guess_column("FirstName", &columns, &[false, true]), Some(0));
        assert_eq!(guess_column("FirstName", &["Zebra"], &[false]), None);
    }
}
