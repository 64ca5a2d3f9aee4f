use std::fmt::{self, Display, Formatter};

use gridbase_schema::{FieldLookupCache, TableId};
use smol_str::SmolStr;

use crate::ast::node::{ExprKind, PendingJoin, TypedExpression};
use crate::number::Number;

/// A storage-level expression the engine lowers typed formulas into. Rendered
/// with `Display` as SQL-ish text, consumed by the storage layer.
#[derive(PartialEq, Debug, Clone)]
pub enum TargetExpression {
    Literal(TargetValue),
    Column {
        alias: Option<SmolStr>,
        column: SmolStr,
    },
    Call {
        op: SmolStr,
        args: Vec<TargetExpression>,
    },
    Aggregate {
        op: SmolStr,
        arg: Box<TargetExpression>,
        filter: Option<Box<TargetExpression>>,
    },
    Subquery {
        expr: Box<TargetExpression>,
        joins: Vec<Join>,
    },
}

#[derive(PartialEq, Debug, Clone)]
pub enum TargetValue {
    Text(String),
    Int(i64),
    Decimal(Number, u8),
    Bool(bool),
}

/// One relation traversal, deduplicated by `path`.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Join {
    pub path: SmolStr,
    pub alias: SmolStr,
    pub table: TableId,
}

/// The lowered expression plus the ordered joins it needs outside of any
/// subquery boundary.
#[derive(Debug)]
pub struct TargetQuery {
    pub expression: TargetExpression,
    pub joins: Vec<Join>,
}

pub struct CodegenContext<'a> {
    cache: &'a FieldLookupCache<'a>,
    table_stack: Vec<TableId>,
    alias_stack: Vec<SmolStr>,
    path_stack: Vec<SmolStr>,
    joins: Vec<Join>,
}

impl<'a> CodegenContext<'a> {
    pub fn new(cache: &'a FieldLookupCache<'a>, table: TableId) -> Self {
        Self {
            cache,
            table_stack: vec![table],
            alias_stack: Vec::new(),
            path_stack: Vec::new(),
            joins: Vec::new(),
        }
    }

    pub fn current_table(&self) -> TableId {
        *self.table_stack.last().unwrap()
    }

    pub fn current_alias(&self) -> Option<SmolStr> {
        self.alias_stack.last().cloned()
    }

    /// Registers the join if its full path has not been seen yet and returns
    /// that path plus the alias to reference the joined table with. Paths
    /// accumulate across nested relations, so the same link field reached
    /// through two different outer relations registers two joins.
    pub fn register_join(&mut self, pending: &PendingJoin) -> (SmolStr, SmolStr) {
        let path: SmolStr = match self.path_stack.last() {
            Some(outer) => format!("{}__{}", outer, pending.join_path).into(),
            None => pending.join_path.clone(),
        };
        let alias = PendingJoin::new(path.clone(), pending.join_table).unique_annotation_name();

        if !self.joins.iter().any(|join| join.path == path) {
            self.joins.push(Join {
                path: path.clone(),
                alias: alias.clone(),
                table: pending.join_table,
            });
        }

        (path, alias)
    }

    pub fn push_relation(&mut self, path: SmolStr, alias: SmolStr, table: TableId) {
        self.path_stack.push(path);
        self.alias_stack.push(alias);
        self.table_stack.push(table);
    }

    pub fn pop_relation(&mut self) {
        self.path_stack.pop();
        self.alias_stack.pop();
        self.table_stack.pop();
    }

    pub(crate) fn joins_mut(&mut self) -> &mut Vec<Join> {
        &mut self.joins
    }
}

/// Lowers a valid typed expression to a [`TargetQuery`].
///
/// Panics when handed an invalid-typed expression, callers must check the
/// type first.
pub fn to_target_query(
    expr: &TypedExpression,
    cache: &FieldLookupCache,
    table: TableId,
) -> TargetQuery {
    assert!(
        expr.is_valid(),
        "codegen invoked on an invalid-typed expression"
    );

    let mut ctx = CodegenContext::new(cache, table);
    let expression = generate(expr, &mut ctx);

    TargetQuery {
        expression,
        joins: ctx.joins,
    }
}

pub fn generate(expr: &TypedExpression, ctx: &mut CodegenContext) -> TargetExpression {
    match &expr.kind {
        ExprKind::StringLiteral(s) => TargetExpression::Literal(TargetValue::Text(s.clone())),
        ExprKind::IntegerLiteral(i) => TargetExpression::Literal(TargetValue::Int(*i)),
        ExprKind::DecimalLiteral { value, scale } => {
            TargetExpression::Literal(TargetValue::Decimal(*value, *scale))
        }
        ExprKind::BooleanLiteral(b) => TargetExpression::Literal(TargetValue::Bool(*b)),
        ExprKind::FieldReference(name) => {
            let field = self_or_joined_field(ctx, name);
            TargetExpression::Column {
                alias: ctx.current_alias(),
                column: field,
            }
        }
        // Typing replaces lookup references with internal join_lookup calls.
        ExprKind::LookupReference { .. } => unreachable!(),
        ExprKind::FunctionCall { def, .. } => def.to_target(expr, ctx),
    }
}

fn self_or_joined_field(ctx: &CodegenContext, name: &str) -> SmolStr {
    match ctx.cache.lookup_by_name(ctx.current_table(), name) {
        Some(field) => field.db_column().into(),
        // Typed trees only reference resolved fields.
        None => unreachable!(),
    }
}

fn is_operator(op: &str) -> bool {
    !op.chars().any(|c| c.is_ascii_alphanumeric())
}

impl Display for TargetExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TargetExpression::Literal(value) => write!(f, "{}", value),
            TargetExpression::Column { alias: Some(alias), column } => {
                write!(f, "{}.{}", alias, column)
            }
            TargetExpression::Column { alias: None, column } => write!(f, "{}", column),
            TargetExpression::Call { op, args } if args.len() == 2 && is_operator(op) => {
                write!(f, "({} {} {})", args[0], op, args[1])
            }
            TargetExpression::Call { op, args } => {
                write!(f, "{}(", op)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            TargetExpression::Aggregate { op, arg, filter: None } => {
                write!(f, "{}({})", op, arg)
            }
            TargetExpression::Aggregate { op, arg, filter: Some(filter) } => {
                write!(f, "{}({}) FILTER (WHERE {})", op, arg, filter)
            }
            TargetExpression::Subquery { expr, joins } => {
                write!(f, "(SELECT {}", expr)?;
                for join in joins {
                    write!(f, " {}", join)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for TargetValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TargetValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            TargetValue::Int(i) => write!(f, "{}", i),
            TargetValue::Decimal(n, scale) => write!(f, "{:.*}", *scale as usize, n.value()),
            TargetValue::Bool(true) => write!(f, "TRUE"),
            TargetValue::Bool(false) => write!(f, "FALSE"),
        }
    }
}

impl Display for Join {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "JOIN table_{} AS {} ON {}",
            self.table.0, self.alias, self.path
        )
    }
}
