use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use gridbase_schema::{FormulaType, TableId};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::functions::FunctionDef;
use crate::number::Number;

/// Expressions start untyped straight out of the parser and become
/// [`TypedExpression`]s once the typing pass has run.
pub type Untyped = ();
pub type TypedExpression = Expression<FormulaType>;
pub type Args<T> = Vec<Expression<T>>;

/// A relation traversal that a lookup introduces. The storage layer turns each
/// one into a join, deduplicated by path.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct PendingJoin {
    pub join_path: SmolStr,
    pub join_table: TableId,
}

pub type PendingJoins = SmallVec<[PendingJoin; 1]>;

impl PendingJoin {
    pub fn new(join_path: impl Into<SmolStr>, join_table: TableId) -> Self {
        Self {
            join_path: join_path.into(),
            join_table,
        }
    }

    pub fn unique_annotation_name(&self) -> SmolStr {
        format!("not_trashed_{}", self.join_path)
            .replace("__", "_")
            .into()
    }
}

impl Display for PendingJoin {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "pending_join({}, {})", self.join_path, self.join_table)
    }
}

#[derive(Debug, Clone)]
pub struct Expression<T> {
    pub kind: ExprKind<T>,
    pub ty: T,
    /// True once an aggregate function collapsed a many expression below.
    pub aggregate: bool,
    /// True when this expression produces multiple values per row.
    pub many: bool,
    /// Set by `filter(...)`, consumed by the directly enclosing aggregate.
    pub pending_aggregate_filter: bool,
    pub pending_joins: PendingJoins,
}

#[derive(Debug, Clone)]
pub enum ExprKind<T> {
    StringLiteral(String),
    IntegerLiteral(i64),
    DecimalLiteral { value: Number, scale: u8 },
    BooleanLiteral(bool),
    FieldReference(SmolStr),
    LookupReference { through: SmolStr, target: SmolStr },
    FunctionCall { def: Arc<dyn FunctionDef>, args: Args<T> },
}

impl<T: PartialEq> PartialEq for Expression<T> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.ty == other.ty
            && self.aggregate == other.aggregate
            && self.many == other.many
            && self.pending_aggregate_filter == other.pending_aggregate_filter
            && self.pending_joins == other.pending_joins
    }
}

impl<T: PartialEq> PartialEq for ExprKind<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ExprKind::StringLiteral(a), ExprKind::StringLiteral(b)) => a == b,
            (ExprKind::IntegerLiteral(a), ExprKind::IntegerLiteral(b)) => a == b,
            (
                ExprKind::DecimalLiteral { value: a, scale: sa },
                ExprKind::DecimalLiteral { value: b, scale: sb },
            ) => a == b && sa == sb,
            (ExprKind::BooleanLiteral(a), ExprKind::BooleanLiteral(b)) => a == b,
            (ExprKind::FieldReference(a), ExprKind::FieldReference(b)) => a == b,
            (
                ExprKind::LookupReference { through: ta, target: fa },
                ExprKind::LookupReference { through: tb, target: fb },
            ) => ta == tb && fa == fb,
            (
                ExprKind::FunctionCall { def: da, args: aa },
                ExprKind::FunctionCall { def: db, args: ab },
            ) => da.name() == db.name() && aa == ab,
            _ => false,
        }
    }
}

impl<T> Expression<T> {
    pub fn new(kind: ExprKind<T>, ty: T) -> Self {
        Self {
            kind,
            ty,
            aggregate: false,
            many: false,
            pending_aggregate_filter: false,
            pending_joins: PendingJoins::new(),
        }
    }
}

impl Expression<Untyped> {
    pub fn string(s: impl Into<String>) -> Self {
        Self::new(ExprKind::StringLiteral(s.into()), ())
    }

    pub fn integer(i: i64) -> Self {
        Self::new(ExprKind::IntegerLiteral(i), ())
    }

    pub fn decimal(value: Number, scale: u8) -> Self {
        Self::new(ExprKind::DecimalLiteral { value, scale }, ())
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(ExprKind::BooleanLiteral(b), ())
    }

    pub fn field_reference(name: impl Into<SmolStr>) -> Self {
        Self::new(ExprKind::FieldReference(name.into()), ())
    }

    pub fn lookup_reference(through: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self::new(
            ExprKind::LookupReference {
                through: through.into(),
                target: target.into(),
            },
            (),
        )
    }

    pub fn call(def: Arc<dyn FunctionDef>, args: Args<Untyped>) -> Self {
        let (aggregate, many, pending_joins) = merged_flags(&def, &args);

        Self {
            kind: ExprKind::FunctionCall { def, args },
            ty: (),
            aggregate,
            many,
            pending_aggregate_filter: false,
            pending_joins,
        }
    }
}

impl TypedExpression {
    /// Leaf expression carrying a valid type.
    pub fn valid_leaf(kind: ExprKind<FormulaType>, ty: FormulaType) -> Self {
        Self::new(kind, ty)
    }

    pub fn invalid(kind: ExprKind<FormulaType>, error: impl Into<String>) -> Self {
        Self::new(kind, FormulaType::invalid(error))
    }

    /// Replaces the type with an invalid one, keeping everything else.
    pub fn with_invalid(mut self, error: impl Into<String>) -> Self {
        self.ty = FormulaType::invalid(error);
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.ty.is_invalid()
    }

    /// Typed function call whose flags are derived from the definition and the
    /// already typed arguments.
    pub fn call_with_type(
        def: Arc<dyn FunctionDef>,
        args: Args<FormulaType>,
        ty: FormulaType,
    ) -> Self {
        let (aggregate, many, pending_joins) = merged_flags(&def, &args);

        Self {
            kind: ExprKind::FunctionCall { def, args },
            ty,
            aggregate,
            many,
            pending_aggregate_filter: false,
            pending_joins,
        }
    }
}

fn merged_flags<T>(
    def: &Arc<dyn FunctionDef>,
    args: &Args<T>,
) -> (bool, bool, PendingJoins) {
    let mut pending_joins = PendingJoins::new();
    let mut many = false;
    let mut aggregate = false;

    for arg in args {
        pending_joins.extend(arg.pending_joins.iter().cloned());
        many |= arg.many;
        aggregate |= arg.aggregate;
    }

    (
        aggregate || def.aggregate(),
        many || def.many(),
        pending_joins,
    )
}

fn write_quoted(f: &mut Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "'")?;
    for c in s.chars() {
        match c {
            '\'' => write!(f, "\\'")?,
            '\\' => write!(f, "\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "'")
}

impl<T> Display for Expression<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.kind {
            ExprKind::StringLiteral(s) => write_quoted(f, s),
            ExprKind::IntegerLiteral(i) => write!(f, "{}", i),
            ExprKind::DecimalLiteral { value, scale } => {
                write!(f, "{:.*}", *scale as usize, value.value())
            }
            ExprKind::BooleanLiteral(b) => write!(f, "{}", b),
            ExprKind::FieldReference(name) => {
                write!(f, "field(")?;
                write_quoted(f, name)?;
                write!(f, ")")
            }
            ExprKind::LookupReference { through, target } => {
                write!(f, "lookup(")?;
                write_quoted(f, through)?;
                write!(f, ", ")?;
                write_quoted(f, target)?;
                write!(f, ")")
            }
            ExprKind::FunctionCall { def, args } => {
                write!(f, "{}(", def.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
