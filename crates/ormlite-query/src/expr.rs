//! Typed query expressions.
//!
//! An [`Expr`] is a small tree built against model types:
//!
//! ```ignore
//! Expr::col::<Order>("Total").gt(100).and(Expr::col::<Order>("Status").eq(Status::Open))
//! ```
//!
//! Expressions carry no SQL; the [`ExprTranslator`](crate::ExprTranslator)
//! renders them for a dialect, binding every constant as a positional
//! parameter.

use ormlite_core::{FieldType, Model, ModelRef, TypeInfo, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Position of the search text in a LIKE pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeKind {
    Contains,
    StartsWith,
    EndsWith,
}

impl LikeKind {
    /// Wrap `text` in the matching `%` wildcards.
    #[must_use]
    pub fn pattern(self, text: &str) -> String {
        match self {
            LikeKind::Contains => format!("%{}%", text),
            LikeKind::StartsWith => format!("{}%", text),
            LikeKind::EndsWith => format!("%{}", text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// A field of a model, in a specific occurrence of its table.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub model: ModelRef,
    pub field: String,
    /// Which appearance of the table in a join; 0 is the first.
    pub occurrence: usize,
}

/// A native value bound through the dialect's converters.
#[derive(Clone)]
pub struct NativeConstant {
    pub info: TypeInfo,
    value: Arc<dyn NativeValue>,
}

impl NativeConstant {
    /// The native value; `None` for an absent optional.
    #[must_use]
    pub fn value(&self) -> Option<&dyn Any> {
        self.value.native()
    }
}

impl fmt::Debug for NativeConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeConstant").field(&self.info.name).finish()
    }
}

trait NativeValue: Send + Sync {
    fn native(&self) -> Option<&dyn Any>;
}

impl<T: FieldType> NativeValue for T {
    fn native(&self) -> Option<&dyn Any> {
        self.as_native()
    }
}

/// A typed query expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Member(Member),
    /// Type conversion around another expression; transparent in SQL.
    Convert(Box<Expr>),
    /// Projection into named arguments, each becoming one aliased column.
    New(Vec<(String, Expr)>),
    /// A wire value bound as-is.
    Constant(Value),
    Native(NativeConstant),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
    },
    Like {
        expr: Box<Expr>,
        kind: LikeKind,
        text: String,
    },
    Aggregate {
        func: AggregateFn,
        expr: Box<Expr>,
    },
}

impl Expr {
    /// A field of model `M`.
    pub fn col<M: Model>(field: impl Into<String>) -> Self {
        Self::aliased_col::<M>(0, field)
    }

    /// A field of the `occurrence`-th appearance of `M` in a self-join.
    pub fn aliased_col<M: Model>(occurrence: usize, field: impl Into<String>) -> Self {
        Expr::Member(Member {
            model: ModelRef::of::<M>(),
            field: field.into(),
            occurrence,
        })
    }

    /// A native value, converted by the dialect when rendered.
    pub fn native<T: FieldType>(value: T) -> Self {
        Expr::Native(NativeConstant {
            info: T::type_info(),
            value: Arc::new(value),
        })
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    /// Projection of named arguments.
    pub fn project<N: Into<String>>(args: impl IntoIterator<Item = (N, Expr)>) -> Self {
        Expr::New(args.into_iter().map(|(n, e)| (n.into(), e)).collect())
    }

    #[must_use]
    pub fn convert(self) -> Self {
        Expr::Convert(Box::new(self))
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Eq, other.into_expr())
    }

    pub fn ne(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Ne, other.into_expr())
    }

    pub fn lt(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Lt, other.into_expr())
    }

    pub fn le(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Le, other.into_expr())
    }

    pub fn gt(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Gt, other.into_expr())
    }

    pub fn ge(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Ge, other.into_expr())
    }

    #[must_use]
    pub fn and(self, other: Expr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    #[must_use]
    pub fn or(self, other: Expr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    #[must_use]
    pub fn is_not_null(self) -> Self {
        Expr::IsNotNull(Box::new(self))
    }

    pub fn in_list<I>(self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoExpr,
    {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(IntoExpr::into_expr).collect(),
        }
    }

    fn like(self, kind: LikeKind, text: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            kind,
            text: text.into(),
        }
    }

    pub fn contains(self, text: impl Into<String>) -> Self {
        self.like(LikeKind::Contains, text)
    }

    pub fn starts_with(self, text: impl Into<String>) -> Self {
        self.like(LikeKind::StartsWith, text)
    }

    pub fn ends_with(self, text: impl Into<String>) -> Self {
        self.like(LikeKind::EndsWith, text)
    }

    #[must_use]
    pub fn aggregate(func: AggregateFn, expr: Expr) -> Self {
        Expr::Aggregate {
            func,
            expr: Box::new(expr),
        }
    }

    /// The member this expression reads, looking through conversions.
    #[must_use]
    pub fn as_member(&self) -> Option<&Member> {
        match self {
            Expr::Member(member) => Some(member),
            Expr::Convert(inner) => inner.as_member(),
            _ => None,
        }
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

macro_rules! arithmetic {
    ($($trait:ident $method:ident => $op:ident),* $(,)?) => {
        $(
            impl<R: IntoExpr> std::ops::$trait<R> for Expr {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    self.binary(BinaryOp::$op, rhs.into_expr())
                }
            }
        )*
    };
}

arithmetic! {
    Add add => Add,
    Sub sub => Sub,
    Mul mul => Mul,
    Div div => Div,
    Rem rem => Mod,
}

/// Anything usable as an expression operand.
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr {
        Expr::Constant(self)
    }
}

impl IntoExpr for &str {
    fn into_expr(self) -> Expr {
        Expr::native(self.to_string())
    }
}

impl<T: FieldType> IntoExpr for Option<T> {
    fn into_expr(self) -> Expr {
        Expr::native(self)
    }
}

macro_rules! native_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoExpr for $ty {
                fn into_expr(self) -> Expr {
                    Expr::native(self)
                }
            }
        )*
    };
}

native_operand!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, char, String, Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_patterns() {
        assert_eq!(LikeKind::Contains.pattern("ab"), "%ab%");
        assert_eq!(LikeKind::StartsWith.pattern("ab"), "ab%");
        assert_eq!(LikeKind::EndsWith.pattern("ab"), "%ab");
    }

    #[test]
    fn test_operators_build_trees() {
        let expr = Expr::value(1) + 2;
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Add, .. }));
        let negated = !Expr::value(true);
        assert!(matches!(negated, Expr::Not(_)));
    }

    #[test]
    fn test_native_constant_keeps_option_absence() {
        let Expr::Native(native) = None::<i32>.into_expr() else {
            panic!("expected a native constant");
        };
        assert!(native.value().is_none());
        assert!(native.info.is::<i32>());

        let Expr::Native(native) = "Ann".into_expr() else {
            panic!("expected a native constant");
        };
        assert_eq!(
            native.value().and_then(|v| v.downcast_ref::<String>()),
            Some(&"Ann".to_string())
        );
    }

    #[test]
    fn test_as_member_looks_through_convert() {
        let value = Expr::value(1).convert();
        assert!(value.as_member().is_none());
    }
}
