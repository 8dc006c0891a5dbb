//! Expression-to-SQL translation.

use crate::dialect::DialectProvider;
use crate::expr::{BinaryOp, Expr, Member, NativeConstant};
use ormlite_core::{
    Error, FieldDefinition, ModelDefinition, ModelingErrorKind, Param, Result, Value,
};

/// Renders [`Expr`] trees for one dialect.
///
/// Every constant becomes a positional parameter (`@0`, `@1`, ...). A
/// translator can continue numbering from parameters bound earlier, so
/// several fragments of one statement share a single parameter list.
#[derive(Debug)]
pub struct ExprTranslator<'d> {
    dialect: &'d dyn DialectProvider,
    qualify: bool,
    upper_in_like: bool,
    params: Vec<Param>,
}

impl<'d> ExprTranslator<'d> {
    pub fn new(dialect: &'d dyn DialectProvider) -> Self {
        Self {
            dialect,
            qualify: false,
            upper_in_like: true,
            params: Vec::new(),
        }
    }

    /// Prefix every column with its table.
    #[must_use]
    pub fn qualified(mut self, qualify: bool) -> Self {
        self.qualify = qualify;
        self
    }

    /// Case-fold both sides of LIKE predicates with `upper()`.
    #[must_use]
    pub fn upper_in_like(mut self, upper: bool) -> Self {
        self.upper_in_like = upper;
        self
    }

    /// Continue after parameters that are already bound.
    #[must_use]
    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Param> {
        self.params
    }

    /// Render a predicate or value expression, without a leading `WHERE`.
    pub fn translate(&mut self, expr: &Expr) -> Result<String> {
        self.visit(expr, None)
    }

    fn visit(&mut self, expr: &Expr, hint: Option<&FieldDefinition>) -> Result<String> {
        match expr {
            Expr::Member(member) => self.member_column(member).map(|(sql, _)| sql),
            Expr::Convert(inner) => self.visit(inner, hint),
            Expr::New(_) => Err(invalid("a projection cannot be used as a value")),
            Expr::Constant(value) => Ok(self.bind(value.clone())),
            Expr::Native(native) => {
                let value = self.convert_native(native, hint)?;
                Ok(self.bind(value))
            }
            Expr::Binary { op, left, right } => self.visit_binary(*op, left, right),
            Expr::Not(inner) => Ok(format!("NOT ({})", self.visit(inner, None)?)),
            Expr::IsNull(inner) => Ok(format!("{} IS NULL", self.visit(inner, None)?)),
            Expr::IsNotNull(inner) => Ok(format!("{} IS NOT NULL", self.visit(inner, None)?)),
            Expr::In { expr, values } => {
                let field = self.hint_for(expr)?;
                let column = self.visit(expr, None)?;
                if values.is_empty() {
                    return Ok(format!("{} IN (NULL)", column));
                }
                let mut items = Vec::with_capacity(values.len());
                for value in values {
                    items.push(self.visit(value, field.as_ref())?);
                }
                Ok(format!("{} IN ({})", column, items.join(",")))
            }
            Expr::Like { expr, kind, text } => {
                let column = self.visit(expr, None)?;
                let pattern = kind.pattern(text);
                if self.upper_in_like {
                    let param = self.bind(Value::Text(pattern.to_uppercase()));
                    Ok(format!("upper({}) like {}", column, param))
                } else {
                    let param = self.bind(Value::Text(pattern));
                    Ok(format!("{} like {}", column, param))
                }
            }
            Expr::Aggregate { func, expr } => {
                Ok(format!("{}({})", func.as_sql(), self.visit(expr, None)?))
            }
        }
    }

    fn visit_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<String> {
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) && is_null_operand(right) {
            let keyword = if op == BinaryOp::Eq { "IS NULL" } else { "IS NOT NULL" };
            return Ok(format!("{} {}", self.visit(left, None)?, keyword));
        }
        let left_hint = if op.is_comparison() { self.hint_for(right)? } else { None };
        let right_hint = if op.is_comparison() { self.hint_for(left)? } else { None };
        let left_sql = self.visit(left, left_hint.as_ref())?;
        let right_sql = self.visit(right, right_hint.as_ref())?;
        Ok(format!("({} {} {})", left_sql, op.as_sql(), right_sql))
    }

    /// The field a comparison operand reads, used to convert the constant
    /// on the other side with that field's converter.
    fn hint_for(&self, expr: &Expr) -> Result<Option<FieldDefinition>> {
        match expr.as_member() {
            Some(member) => {
                let def = member.model.definition()?;
                Ok(Some(def.require_field(&member.field)?.clone()))
            }
            None => Ok(None),
        }
    }

    fn convert_native(&self, native: &NativeConstant, hint: Option<&FieldDefinition>) -> Result<Value> {
        let Some(value) = native.value() else {
            return Ok(Value::Null);
        };
        match hint {
            Some(field) if field.field_type.id == native.info.id => {
                self.dialect.converters().to_db_value(field, Some(value))
            }
            _ => self.dialect.converters().to_db_value_of(&native.info, value),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        let name = self.params.len().to_string();
        let placeholder = format!("{}{}", self.dialect.param_prefix(), name);
        self.params.push(Param::new(name, value));
        placeholder
    }

    /// Table reference for one occurrence of a model's table.
    pub fn table_reference(&self, def: &ModelDefinition, occurrence: usize) -> String {
        if occurrence == 0 {
            self.dialect.table_name(def)
        } else {
            self.dialect
                .quote_identifier(&table_alias(self.dialect, def, occurrence))
        }
    }

    /// Column SQL of a member and its field definition.
    pub fn member_column(&self, member: &Member) -> Result<(String, FieldDefinition)> {
        let def = member.model.definition()?;
        let field = def.require_field(&member.field)?.clone();
        let column = if field.is_row_version {
            self.dialect.row_version_column(&field)
        } else {
            self.dialect.quoted_column(&field)
        };
        let sql = if self.qualify {
            format!("{}.{}", self.table_reference(&def, member.occurrence), column)
        } else {
            column
        };
        Ok((sql, field))
    }

    /// Select-list entries for a column expression.
    ///
    /// Exactly three shapes are accepted: a member access, a conversion
    /// around a member access, and a projection whose arguments are each one
    /// of those. Anything else is an error.
    pub fn select_columns(&self, expr: &Expr) -> Result<Vec<String>> {
        match expr {
            Expr::Member(_) | Expr::Convert(_) => Ok(vec![self.select_member(expr, None)?]),
            Expr::New(args) => args
                .iter()
                .map(|(name, arg)| self.select_member(arg, Some(name.as_str())))
                .collect(),
            other => Err(invalid(format!(
                "column selections must be a member, a converted member or a projection, not {}",
                shape_name(other)
            ))),
        }
    }

    fn select_member(&self, expr: &Expr, alias: Option<&str>) -> Result<String> {
        let member = match expr {
            Expr::Member(member) => member,
            Expr::Convert(inner) => match inner.as_ref() {
                Expr::Member(member) => member,
                other => {
                    return Err(invalid(format!(
                        "a conversion must wrap a member, not {}",
                        shape_name(other)
                    )));
                }
            },
            other => {
                return Err(invalid(format!(
                    "projection arguments must be members, not {}",
                    shape_name(other)
                )));
            }
        };
        let def = member.model.definition()?;
        let field = def.require_field(&member.field)?;
        let table = self.table_reference(&def, member.occurrence);
        Ok(self.qualified_select_expression(&table, field, alias))
    }

    /// `table.column [AS "alias"]`, aliased to the field name when the
    /// column is named differently.
    pub fn qualified_select_expression(
        &self,
        table: &str,
        field: &FieldDefinition,
        alias: Option<&str>,
    ) -> String {
        let alias = alias.unwrap_or(&field.name);
        if let Some(custom) = &field.custom_select {
            return format!("{} AS {}", custom, self.dialect.quote_identifier(alias));
        }
        let column = if field.is_row_version {
            self.dialect.row_version_column(field)
        } else {
            self.dialect.quoted_column(field)
        };
        let expression = format!("{}.{}", table, column);
        if column == self.dialect.quote_identifier(alias) {
            expression
        } else {
            format!("{} AS {}", expression, self.dialect.quote_identifier(alias))
        }
    }

    /// Qualified select list of every persisted field.
    pub fn all_columns(&self, def: &ModelDefinition, occurrence: usize) -> Vec<String> {
        let table = self.table_reference(def, occurrence);
        def.fields
            .iter()
            .map(|f| self.qualified_select_expression(&table, f, None))
            .collect()
    }
}

/// Unquoted alias of a repeated table, `{table}_{occurrence}`.
pub fn table_alias<D: DialectProvider + ?Sized>(
    dialect: &D,
    def: &ModelDefinition,
    occurrence: usize,
) -> String {
    format!("{}_{}", dialect.unquoted_table_name(def), occurrence)
}

fn is_null_operand(expr: &Expr) -> bool {
    match expr {
        Expr::Constant(value) => value.is_null(),
        Expr::Native(native) => native.value().is_none(),
        _ => false,
    }
}

fn shape_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::Member(_) => "a member",
        Expr::Convert(_) => "a conversion",
        Expr::New(_) => "a projection",
        Expr::Constant(_) | Expr::Native(_) => "a constant",
        Expr::Binary { .. } => "a binary expression",
        Expr::Not(_) => "a negation",
        Expr::IsNull(_) | Expr::IsNotNull(_) => "a null test",
        Expr::In { .. } => "an IN list",
        Expr::Like { .. } => "a LIKE match",
        Expr::Aggregate { .. } => "an aggregate",
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::modeling(ModelingErrorKind::InvalidExpression, message)
}
