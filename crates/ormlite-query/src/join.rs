//! Multi-table SELECT builder.
//!
//! A [`JoinPlan`] starts from a base model and accumulates joins, column
//! selections, predicates and ordering. Shape and association mistakes are
//! reported by the call that makes them; everything that needs a dialect is
//! rendered by [`JoinPlan::build`].
//!
//! ```ignore
//! let plan = JoinPlan::new::<Order>()
//!     .join::<Order, Customer>("CustomerId", "Id")?
//!     .select_all::<Order>()?
//!     .select(Expr::col::<Customer>("Name"))?
//!     .filter(Expr::col::<Customer>("Country").eq("NZ"));
//! let statement = plan.build(&dialect)?;
//! ```

use crate::dialect::DialectProvider;
use crate::expr::{AggregateFn, Expr};
use crate::visitor::ExprTranslator;
use ormlite_core::{Error, Model, ModelRef, ModelingErrorKind, Result, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conjunction {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct JoinClause {
    kind: JoinKind,
    /// The table this clause brings into the query.
    joined: Expr,
    /// Column of the table already in the query.
    anchor: Expr,
}

#[derive(Debug, Clone)]
enum Selection {
    Columns(Expr),
    AllOf(ModelRef, usize),
    Aggregate(AggregateFn, Expr),
}

/// A SELECT over a base model and its joined tables.
#[derive(Debug, Clone)]
pub struct JoinPlan {
    base: ModelRef,
    /// Every table in the query, in order of appearance.
    tables: Vec<ModelRef>,
    joins: Vec<JoinClause>,
    selections: Vec<Selection>,
    aggregate_used: bool,
    predicates: Vec<(Conjunction, Expr)>,
    order_by: Vec<(Expr, bool)>,
    distinct: bool,
    limit: Option<u64>,
    offset: Option<u64>,
    upper_in_like: bool,
}

impl JoinPlan {
    pub fn new<B: Model>() -> Self {
        let base = ModelRef::of::<B>();
        Self {
            base,
            tables: vec![base],
            joins: Vec::new(),
            selections: Vec::new(),
            aggregate_used: false,
            predicates: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
            limit: None,
            offset: None,
            upper_in_like: true,
        }
    }

    fn is_associated(&self, model: &ModelRef) -> bool {
        self.tables.contains(model)
    }

    fn occurrences(&self, model: &ModelRef) -> usize {
        self.tables.iter().filter(|t| *t == model).count()
    }

    /// `INNER JOIN` on `S.source_field = D.dest_field`.
    pub fn join<S: Model, D: Model>(self, source_field: &str, dest_field: &str) -> Result<Self> {
        self.join_as::<S, D>(JoinKind::Inner, source_field, dest_field)
    }

    pub fn left_join<S: Model, D: Model>(self, source_field: &str, dest_field: &str) -> Result<Self> {
        self.join_as::<S, D>(JoinKind::Left, source_field, dest_field)
    }

    pub fn right_join<S: Model, D: Model>(self, source_field: &str, dest_field: &str) -> Result<Self> {
        self.join_as::<S, D>(JoinKind::Right, source_field, dest_field)
    }

    pub fn full_join<S: Model, D: Model>(self, source_field: &str, dest_field: &str) -> Result<Self> {
        self.join_as::<S, D>(JoinKind::Full, source_field, dest_field)
    }

    /// `CROSS JOIN` of `D` against the already associated `S`.
    pub fn cross_join<S: Model, D: Model>(self) -> Result<Self> {
        let source_pk = S::definition()?.primary_key().name.clone();
        let dest_pk = D::definition()?.primary_key().name.clone();
        self.join_as::<S, D>(JoinKind::Cross, &source_pk, &dest_pk)
    }

    /// Join with an explicit kind.
    ///
    /// One side must already be part of the query. The other side is the
    /// table the clause brings in; when that table is already present (a
    /// self-join) it gets the alias `{table}_{n}`.
    pub fn join_as<S: Model, D: Model>(
        mut self,
        kind: JoinKind,
        source_field: &str,
        dest_field: &str,
    ) -> Result<Self> {
        let source = ModelRef::of::<S>();
        let dest = ModelRef::of::<D>();
        S::definition()?.require_field(source_field)?;
        D::definition()?.require_field(dest_field)?;

        let (joined_model, joined_field, anchor_model, anchor_field) =
            if self.is_associated(&source) {
                (dest, dest_field, source, source_field)
            } else if self.is_associated(&dest) {
                (source, source_field, dest, dest_field)
            } else {
                return Err(Error::modeling(
                    ModelingErrorKind::NotAssociated,
                    format!(
                        "either the source or destination table should be associated: {} / {}",
                        source.type_name, dest.type_name
                    ),
                ));
            };

        let joined_occurrence = self.occurrences(&joined_model);
        let anchor_occurrence = if anchor_model == joined_model {
            joined_occurrence.saturating_sub(1)
        } else {
            0
        };
        self.tables.push(joined_model);
        self.joins.push(JoinClause {
            kind,
            joined: member(joined_model, joined_field, joined_occurrence),
            anchor: member(anchor_model, anchor_field, anchor_occurrence),
        });
        Ok(self)
    }

    /// Add column selections: a member, a converted member, or a projection.
    pub fn select(mut self, columns: Expr) -> Result<Self> {
        self.check_selection(&columns)?;
        self.selections.push(Selection::Columns(columns));
        Ok(self)
    }

    /// Like [`JoinPlan::select`], and render `SELECT DISTINCT`.
    pub fn select_distinct(mut self, columns: Expr) -> Result<Self> {
        self.distinct = true;
        self.select(columns)
    }

    /// Every column of `T`, which must already be part of the query.
    pub fn select_all<T: Model>(self) -> Result<Self> {
        self.select_all_of::<T>(0)
    }

    /// Every column of one occurrence of `T` in a self-join.
    pub fn select_all_of<T: Model>(mut self, occurrence: usize) -> Result<Self> {
        let model = ModelRef::of::<T>();
        if occurrence >= self.occurrences(&model) {
            return Err(Error::modeling(
                ModelingErrorKind::NotAssociated,
                format!("{} is not part of this query", model.type_name),
            ));
        }
        self.selections.push(Selection::AllOf(model, occurrence));
        Ok(self)
    }

    fn aggregate(mut self, func: AggregateFn, column: Expr) -> Result<Self> {
        if column.as_member().is_none() {
            return Err(Error::modeling(
                ModelingErrorKind::InvalidExpression,
                "aggregates apply to a single member",
            ));
        }
        self.aggregate_used = true;
        self.selections.push(Selection::Aggregate(func, column));
        Ok(self)
    }

    pub fn select_max(self, column: Expr) -> Result<Self> {
        self.aggregate(AggregateFn::Max, column)
    }

    pub fn select_min(self, column: Expr) -> Result<Self> {
        self.aggregate(AggregateFn::Min, column)
    }

    pub fn select_count(self, column: Expr) -> Result<Self> {
        self.aggregate(AggregateFn::Count, column)
    }

    pub fn select_sum(self, column: Expr) -> Result<Self> {
        self.aggregate(AggregateFn::Sum, column)
    }

    pub fn select_avg(self, column: Expr) -> Result<Self> {
        self.aggregate(AggregateFn::Avg, column)
    }

    fn check_selection(&self, columns: &Expr) -> Result<()> {
        let members: Vec<&Expr> = match columns {
            Expr::New(args) => args.iter().map(|(_, e)| e).collect(),
            other => vec![other],
        };
        for expr in members {
            let Some(member) = select_member(expr) else {
                return Err(Error::modeling(
                    ModelingErrorKind::InvalidExpression,
                    "column selections must be a member, a converted member or a projection of members",
                ));
            };
            if member_occurrence(expr) >= self.occurrences(&member) {
                return Err(Error::modeling(
                    ModelingErrorKind::NotAssociated,
                    format!("{} is not part of this query", member.type_name),
                ));
            }
        }
        Ok(())
    }

    /// First predicate, or an AND-ed one.
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicates.push((Conjunction::And, predicate));
        self
    }

    #[must_use]
    pub fn and(self, predicate: Expr) -> Self {
        self.filter(predicate)
    }

    #[must_use]
    pub fn or(mut self, predicate: Expr) -> Self {
        self.predicates.push((Conjunction::Or, predicate));
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: Expr) -> Self {
        self.order_by.push((column, true));
        self
    }

    #[must_use]
    pub fn order_by_descending(mut self, column: Expr) -> Self {
        self.order_by.push((column, false));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Case-fold LIKE predicates (the default).
    #[must_use]
    pub fn upper_in_like(mut self, upper: bool) -> Self {
        self.upper_in_like = upper;
        self
    }

    #[must_use]
    pub fn base(&self) -> ModelRef {
        self.base
    }

    /// Render the SELECT.
    ///
    /// Order: `SELECT [DISTINCT] columns`, `FROM base`, joins, `WHERE`,
    /// `ORDER BY`, paging.
    pub fn build(&self, dialect: &dyn DialectProvider) -> Result<Statement> {
        let mut columns = Vec::new();
        {
            let translator = ExprTranslator::new(dialect).qualified(true);
            for selection in &self.selections {
                match selection {
                    Selection::Columns(expr) => columns.extend(translator.select_columns(expr)?),
                    Selection::AllOf(model, occurrence) => {
                        columns.extend(translator.all_columns(&model.definition()?, *occurrence));
                    }
                    Selection::Aggregate(..) => {}
                }
            }
        }
        let mut translator = ExprTranslator::new(dialect)
            .qualified(true)
            .upper_in_like(self.upper_in_like);
        for selection in &self.selections {
            if let Selection::Aggregate(func, expr) = selection {
                columns.push(translator.translate(&Expr::aggregate(*func, expr.clone()))?);
            }
        }
        if self.aggregate_used && columns.len() > 1 {
            return Err(Error::modeling(
                ModelingErrorKind::AggregateWithColumns,
                "an aggregate cannot be selected together with other columns",
            ));
        }
        if columns.is_empty() {
            columns = translator.all_columns(&self.base.definition()?, 0);
        }

        let base = self.base.definition()?;
        let mut sql = format!(
            "SELECT {}{} \nFROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            columns.join(", "),
            dialect.table_name(&base)
        );

        for join in &self.joins {
            let Some(joined) = join.joined.as_member() else {
                continue;
            };
            let joined_def = joined.model.definition()?;
            let mut table = dialect.table_name(&joined_def);
            if joined.occurrence > 0 {
                table.push_str(" AS ");
                table.push_str(&translator.table_reference(&joined_def, joined.occurrence));
            }
            if join.kind == JoinKind::Cross {
                sql.push_str(&format!(" \n{} {}", join.kind.as_sql(), table));
            } else {
                let joined_column = translator.translate(&join.joined)?;
                let anchor_column = translator.translate(&join.anchor)?;
                sql.push_str(&format!(
                    " \n{} {} ON {} = {}",
                    join.kind.as_sql(),
                    table,
                    anchor_column,
                    joined_column
                ));
            }
        }

        let mut where_sql = String::new();
        for (conjunction, predicate) in &self.predicates {
            let fragment = translator.translate(predicate)?;
            if !where_sql.is_empty() {
                where_sql.push_str(match conjunction {
                    Conjunction::And => " AND ",
                    Conjunction::Or => " OR ",
                });
            }
            where_sql.push_str(&fragment);
        }
        if !where_sql.is_empty() {
            sql.push_str(" \nWHERE ");
            sql.push_str(&where_sql);
        }

        if !self.order_by.is_empty() {
            let mut terms = Vec::with_capacity(self.order_by.len());
            for (expr, ascending) in &self.order_by {
                terms.push(format!(
                    "{} {}",
                    translator.translate(expr)?,
                    if *ascending { "ASC" } else { "DESC" }
                ));
            }
            sql.push_str(" \nORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        sql.push_str(&dialect.paging_clause(self.limit, self.offset, !self.order_by.is_empty()));

        tracing::debug!(
            dialect = dialect.name(),
            joins = self.joins.len(),
            params = translator.params().len(),
            sql = %sql,
            "Built join query"
        );
        Ok(Statement::with_params(sql, translator.into_params()))
    }
}

fn member(model: ModelRef, field: &str, occurrence: usize) -> Expr {
    Expr::Member(crate::expr::Member {
        model,
        field: field.to_string(),
        occurrence,
    })
}

fn select_member(expr: &Expr) -> Option<ModelRef> {
    match expr {
        Expr::Member(member) => Some(member.model),
        Expr::Convert(inner) => match inner.as_ref() {
            Expr::Member(member) => Some(member.model),
            _ => None,
        },
        _ => None,
    }
}

fn member_occurrence(expr: &Expr) -> usize {
    expr.as_member().map_or(0, |m| m.occurrence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{SqlServerDialect, SqliteDialect};
    use ormlite_core::{ModelBuilder, Value};

    #[derive(Debug, Default)]
    struct Order {
        id: i32,
        customer_id: i32,
        total: f64,
    }

    impl Model for Order {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |o: &Self| &o.id, |o: &mut Self, v| o.id = v)
                .field("CustomerId", |o: &Self| &o.customer_id, |o: &mut Self, v| {
                    o.customer_id = v;
                })
                .field("Total", |o: &Self| &o.total, |o: &mut Self, v| o.total = v)
        }
    }

    #[derive(Debug, Default)]
    struct Customer {
        id: i32,
        name: String,
    }

    impl Model for Customer {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |c: &Self| &c.id, |c: &mut Self, v| c.id = v)
                .field("Name", |c: &Self| &c.name, |c: &mut Self, v| c.name = v)
        }
    }

    #[derive(Debug, Default)]
    struct Region {
        id: i32,
    }

    impl Model for Region {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |r: &Self| &r.id, |r: &mut Self, v| r.id = v)
        }
    }

    #[derive(Debug, Default)]
    struct Employee {
        id: i32,
        manager_id: Option<i32>,
        name: String,
    }

    impl Model for Employee {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |e: &Self| &e.id, |e: &mut Self, v| e.id = v)
                .field("ManagerId", |e: &Self| &e.manager_id, |e: &mut Self, v| {
                    e.manager_id = v;
                })
                .field("Name", |e: &Self| &e.name, |e: &mut Self, v| e.name = v)
        }
    }

    #[test]
    fn test_join_with_two_column_groups() {
        let dialect = SqliteDialect::new();
        let statement = JoinPlan::new::<Order>()
            .join::<Order, Customer>("CustomerId", "Id")
            .and_then(JoinPlan::select_all::<Order>)
            .and_then(|p| p.select(Expr::col::<Customer>("Id")))
            .expect("plan")
            .build(&dialect)
            .expect("build");
        assert_eq!(
            statement.sql,
            "SELECT \"Order\".\"Id\", \"Order\".\"CustomerId\", \"Order\".\"Total\", \"Customer\".\"Id\" \nFROM \"Order\" \nINNER JOIN \"Customer\" ON \"Order\".\"CustomerId\" = \"Customer\".\"Id\""
        );
        assert_eq!(statement.sql.matches("JOIN").count(), 1);
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_unassociated_join_is_rejected() {
        let err = JoinPlan::new::<Order>()
            .join::<Customer, Region>("Id", "Id")
            .expect_err("neither side is in the query");
        assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::NotAssociated));
    }

    #[test]
    fn test_reverse_association_joins_source() {
        let dialect = SqliteDialect::new();
        let statement = JoinPlan::new::<Customer>()
            .left_join::<Order, Customer>("CustomerId", "Id")
            .expect("plan")
            .build(&dialect)
            .expect("build");
        assert!(statement.sql.contains(
            "LEFT JOIN \"Order\" ON \"Customer\".\"Id\" = \"Order\".\"CustomerId\""
        ));
    }

    #[test]
    fn test_self_join_aliases_each_occurrence() {
        let dialect = SqliteDialect::new();
        let statement = JoinPlan::new::<Employee>()
            .join::<Employee, Employee>("ManagerId", "Id")
            .and_then(|p| p.join::<Employee, Employee>("ManagerId", "Id"))
            .and_then(|p| p.select(Expr::col::<Employee>("Name")))
            .and_then(|p| p.select(Expr::project([("Boss", Expr::aliased_col::<Employee>(1, "Name"))])))
            .expect("plan")
            .build(&dialect)
            .expect("build");
        assert!(statement.sql.contains(
            "INNER JOIN \"Employee\" AS \"Employee_1\" ON \"Employee\".\"ManagerId\" = \"Employee_1\".\"Id\""
        ));
        assert!(statement.sql.contains(
            "INNER JOIN \"Employee\" AS \"Employee_2\" ON \"Employee_1\".\"ManagerId\" = \"Employee_2\".\"Id\""
        ));
        assert!(statement.sql.starts_with(
            "SELECT \"Employee\".\"Name\", \"Employee_1\".\"Name\" AS \"Boss\""
        ));
    }

    #[test]
    fn test_aggregate_with_columns_is_rejected() {
        let dialect = SqliteDialect::new();
        let plan = JoinPlan::new::<Order>()
            .select_max(Expr::col::<Order>("Total"))
            .and_then(|p| p.select(Expr::col::<Order>("Id")))
            .expect("plan");
        let err = plan.build(&dialect).expect_err("aggregate plus column");
        assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::AggregateWithColumns));

        let statement = JoinPlan::new::<Order>()
            .select_count(Expr::col::<Order>("Id"))
            .expect("plan")
            .build(&dialect)
            .expect("build");
        assert_eq!(statement.sql, "SELECT COUNT(\"Order\".\"Id\") \nFROM \"Order\"");
    }

    #[test]
    fn test_invalid_selection_shape() {
        let err = JoinPlan::new::<Order>()
            .select(Expr::col::<Order>("Total").gt(1))
            .expect_err("predicate is not a column");
        assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::InvalidExpression));

        let err = JoinPlan::new::<Order>()
            .select(Expr::col::<Customer>("Name"))
            .expect_err("customer is not joined");
        assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::NotAssociated));
    }

    #[test]
    fn test_where_order_and_paging() {
        let dialect = SqlServerDialect::new();
        let statement = JoinPlan::new::<Order>()
            .join::<Order, Customer>("CustomerId", "Id")
            .and_then(|p| p.select_distinct(Expr::col::<Customer>("Name")))
            .expect("plan")
            .filter(Expr::col::<Order>("Total").gt(10.5))
            .or(Expr::col::<Customer>("Name").starts_with("A"))
            .order_by_descending(Expr::col::<Customer>("Name"))
            .limit(5)
            .build(&dialect)
            .expect("build");
        assert_eq!(
            statement.sql,
            "SELECT DISTINCT [Customer].[Name] \nFROM [Order] \nINNER JOIN [Customer] ON [Order].[CustomerId] = [Customer].[Id] \nWHERE ([Order].[Total] > @0) OR upper([Customer].[Name]) like @1 \nORDER BY [Customer].[Name] DESC OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(statement.params[0].value, Value::Double(10.5));
        assert_eq!(statement.params[1].value, Value::Text("A%".into()));
    }
}
