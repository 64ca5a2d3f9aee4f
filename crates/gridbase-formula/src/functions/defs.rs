use gridbase_schema::{FormulaType, NUMBER_MAX_DECIMAL_PLACES};
use smallvec::smallvec;

use crate::ast::node::{ExprKind, TypedExpression};
use crate::codegen::{CodegenContext, TargetExpression, generate};

use super::{ArgCount, ArgSpec, FunctionDef, TypeClass};

type ArgTypesFn = fn(usize, &[&FormulaType]) -> ArgSpec;
type ReturnFn = fn(&[TypedExpression]) -> FormulaType;

/// How a builtin lowers to a [`TargetExpression`].
#[derive(Debug, Clone)]
pub(crate) enum TargetKind {
    /// Plain call or infix operator in the storage expression.
    Call(&'static str),
    /// Aggregate call, extracting a `filter(...)` argument into a FILTER
    /// clause.
    Aggregate(&'static str),
    /// Subquery boundary isolating the joins generated below it.
    Subquery,
    /// Relation traversal, evaluates its target against the joined table.
    JoinLookup,
    /// Lowers to its first argument, the rest is consumed elsewhere.
    PassThrough,
}

#[derive(Debug)]
pub(crate) struct Builtin {
    pub name: &'static str,
    pub num_args: ArgCount,
    pub arg_types: ArgTypesFn,
    pub return_type: ReturnFn,
    pub aggregate: bool,
    pub internal: bool,
    pub operator: Option<&'static str>,
    pub many: bool,
    pub marks_pending_filter: bool,
    pub target: TargetKind,
}

impl Builtin {
    fn function(
        name: &'static str,
        num_args: ArgCount,
        arg_types: ArgTypesFn,
        return_type: ReturnFn,
        target: TargetKind,
    ) -> Self {
        Self {
            name,
            num_args,
            arg_types,
            return_type,
            aggregate: false,
            internal: false,
            operator: None,
            many: false,
            marks_pending_filter: false,
            target,
        }
    }

    fn binary_operator(
        name: &'static str,
        symbol: &'static str,
        arg_types: ArgTypesFn,
        return_type: ReturnFn,
        target: TargetKind,
    ) -> Self {
        Self {
            operator: Some(symbol),
            ..Self::function(name, ArgCount::Exact(2), arg_types, return_type, target)
        }
    }

    fn aggregate(
        name: &'static str,
        arg_types: ArgTypesFn,
        return_type: ReturnFn,
        op: &'static str,
    ) -> Self {
        Self {
            aggregate: true,
            ..Self::function(
                name,
                ArgCount::Exact(1),
                arg_types,
                return_type,
                TargetKind::Aggregate(op),
            )
        }
    }
}

impl FunctionDef for Builtin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn num_args(&self) -> ArgCount {
        self.num_args
    }

    fn arg_types(&self, index: usize, arg_types: &[&FormulaType]) -> ArgSpec {
        (self.arg_types)(index, arg_types)
    }

    fn aggregate(&self) -> bool {
        self.aggregate
    }

    fn internal(&self) -> bool {
        self.internal
    }

    fn operator(&self) -> Option<&'static str> {
        self.operator
    }

    fn many(&self) -> bool {
        self.many
    }

    fn marks_pending_filter(&self) -> bool {
        self.marks_pending_filter
    }

    fn return_type(&self, args: &[TypedExpression]) -> FormulaType {
        (self.return_type)(args)
    }

    fn to_target(&self, call: &TypedExpression, ctx: &mut CodegenContext) -> TargetExpression {
        let args = call_args(call);

        match &self.target {
            TargetKind::Call(op) => TargetExpression::Call {
                op: (*op).into(),
                args: args.iter().map(|arg| generate(arg, ctx)).collect(),
            },
            TargetKind::Aggregate(op) => {
                let (arg, filter) = match &args[0].kind {
                    ExprKind::FunctionCall { def, args: inner } if def.marks_pending_filter() => (
                        generate(&inner[0], ctx),
                        Some(Box::new(generate(&inner[1], ctx))),
                    ),
                    _ => (generate(&args[0], ctx), None),
                };

                TargetExpression::Aggregate {
                    op: (*op).into(),
                    arg: Box::new(arg),
                    filter,
                }
            }
            TargetKind::Subquery => {
                let outer = std::mem::take(ctx.joins_mut());
                let expr = generate(&args[0], ctx);
                let joins = std::mem::replace(ctx.joins_mut(), outer);

                TargetExpression::Subquery {
                    expr: Box::new(expr),
                    joins,
                }
            }
            TargetKind::JoinLookup => {
                let join = call
                    .pending_joins
                    .first()
                    .expect("join_lookup call always carries its own pending join");
                let (path, alias) = ctx.register_join(join);

                ctx.push_relation(path, alias, join.join_table);
                let target = generate(&args[1], ctx);
                ctx.pop_relation();

                target
            }
            TargetKind::PassThrough => generate(&args[0], ctx),
        }
    }
}

fn call_args(call: &TypedExpression) -> &[TypedExpression] {
    match &call.kind {
        ExprKind::FunctionCall { args, .. } => args,
        _ => unreachable!(),
    }
}

fn any_arg(_: usize, _: &[&FormulaType]) -> ArgSpec {
    smallvec![TypeClass::Any]
}

fn text_arg(_: usize, _: &[&FormulaType]) -> ArgSpec {
    smallvec![TypeClass::Text]
}

fn number_arg(_: usize, _: &[&FormulaType]) -> ArgSpec {
    smallvec![TypeClass::Number]
}

fn boolean_arg(_: usize, _: &[&FormulaType]) -> ArgSpec {
    smallvec![TypeClass::Boolean]
}

fn no_args(_: usize, _: &[&FormulaType]) -> ArgSpec {
    ArgSpec::new()
}

/// `add` accepts numbers or text, and the second argument must be of the same
/// class as the first.
fn add_args(index: usize, arg_types: &[&FormulaType]) -> ArgSpec {
    if index == 0 {
        return smallvec![TypeClass::Number, TypeClass::Text];
    }

    match arg_types.first().and_then(|ty| TypeClass::of(ty)) {
        Some(class) => smallvec![class],
        None => smallvec![TypeClass::Number, TypeClass::Text],
    }
}

fn same_class_args(index: usize, arg_types: &[&FormulaType]) -> ArgSpec {
    if index == 0 {
        return smallvec![TypeClass::Any];
    }

    match arg_types.first().and_then(|ty| TypeClass::of(ty)) {
        Some(class) => smallvec![class],
        None => smallvec![TypeClass::Any],
    }
}

fn ordered_args(index: usize, arg_types: &[&FormulaType]) -> ArgSpec {
    if index == 0 {
        return smallvec![TypeClass::Number, TypeClass::Date];
    }

    match arg_types.first().and_then(|ty| TypeClass::of(ty)) {
        Some(class) => smallvec![class],
        None => smallvec![TypeClass::Number, TypeClass::Date],
    }
}

fn if_args(index: usize, _: &[&FormulaType]) -> ArgSpec {
    if index == 0 {
        smallvec![TypeClass::Boolean]
    } else {
        smallvec![TypeClass::Any]
    }
}

fn filter_args(index: usize, _: &[&FormulaType]) -> ArgSpec {
    if index == 0 {
        smallvec![TypeClass::Any]
    } else {
        smallvec![TypeClass::Boolean]
    }
}

fn join_lookup_args(index: usize, _: &[&FormulaType]) -> ArgSpec {
    if index == 0 {
        smallvec![TypeClass::Text]
    } else {
        smallvec![TypeClass::Any]
    }
}

fn decimal_places(ty: &FormulaType) -> u8 {
    match ty {
        FormulaType::Number { decimal_places } => *decimal_places,
        _ => 0,
    }
}

fn text_return(_: &[TypedExpression]) -> FormulaType {
    FormulaType::Text
}

fn boolean_return(_: &[TypedExpression]) -> FormulaType {
    FormulaType::Boolean
}

fn integer_return(_: &[TypedExpression]) -> FormulaType {
    FormulaType::Number { decimal_places: 0 }
}

fn max_decimal_places_return(args: &[TypedExpression]) -> FormulaType {
    FormulaType::Number {
        decimal_places: args
            .iter()
            .map(|arg| decimal_places(&arg.ty))
            .max()
            .unwrap_or(0),
    }
}

fn add_return(args: &[TypedExpression]) -> FormulaType {
    if matches!(args[0].ty, FormulaType::Text) {
        FormulaType::Text
    } else {
        max_decimal_places_return(args)
    }
}

fn max_precision_return(_: &[TypedExpression]) -> FormulaType {
    FormulaType::Number {
        decimal_places: NUMBER_MAX_DECIMAL_PLACES,
    }
}

fn first_arg_return(args: &[TypedExpression]) -> FormulaType {
    args[0].ty.clone()
}

fn second_arg_return(args: &[TypedExpression]) -> FormulaType {
    args[1].ty.clone()
}

/// Both branches of the same class keep that class (numbers widen to the
/// larger scale), otherwise the result degrades to text.
fn if_return(args: &[TypedExpression]) -> FormulaType {
    let then_ty = &args[1].ty;
    let else_ty = &args[2].ty;

    if TypeClass::of(then_ty) != TypeClass::of(else_ty) {
        return FormulaType::Text;
    }

    match (then_ty, else_ty) {
        (FormulaType::Number { decimal_places: a }, FormulaType::Number { decimal_places: b }) => {
            FormulaType::Number {
                decimal_places: (*a).max(*b),
            }
        }
        _ => then_ty.clone(),
    }
}

fn now_return(_: &[TypedExpression]) -> FormulaType {
    FormulaType::Date { include_time: true }
}

fn today_return(_: &[TypedExpression]) -> FormulaType {
    FormulaType::Date {
        include_time: false,
    }
}

pub(crate) fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::binary_operator("add", "+", add_args, add_return, TargetKind::Call("+")),
        Builtin::binary_operator(
            "minus",
            "-",
            number_arg,
            max_decimal_places_return,
            TargetKind::Call("-"),
        ),
        Builtin::binary_operator(
            "multiply",
            "*",
            number_arg,
            max_decimal_places_return,
            TargetKind::Call("*"),
        ),
        Builtin::binary_operator(
            "divide",
            "/",
            number_arg,
            max_precision_return,
            TargetKind::Call("/"),
        ),
        Builtin::binary_operator(
            "equal",
            "=",
            same_class_args,
            boolean_return,
            TargetKind::Call("="),
        ),
        Builtin::binary_operator(
            "not_equal",
            "!=",
            same_class_args,
            boolean_return,
            TargetKind::Call("!="),
        ),
        Builtin::binary_operator(
            "greater_than",
            ">",
            ordered_args,
            boolean_return,
            TargetKind::Call(">"),
        ),
        Builtin::binary_operator(
            "greater_than_or_equal",
            ">=",
            ordered_args,
            boolean_return,
            TargetKind::Call(">="),
        ),
        Builtin::binary_operator(
            "less_than",
            "<",
            ordered_args,
            boolean_return,
            TargetKind::Call("<"),
        ),
        Builtin::binary_operator(
            "less_than_or_equal",
            "<=",
            ordered_args,
            boolean_return,
            TargetKind::Call("<="),
        ),
        Builtin::function(
            "and",
            ArgCount::Exact(2),
            boolean_arg,
            boolean_return,
            TargetKind::Call("AND"),
        ),
        Builtin::function(
            "or",
            ArgCount::Exact(2),
            boolean_arg,
            boolean_return,
            TargetKind::Call("OR"),
        ),
        Builtin::function(
            "not",
            ArgCount::Exact(1),
            boolean_arg,
            boolean_return,
            TargetKind::Call("NOT"),
        ),
        Builtin::function(
            "if",
            ArgCount::Exact(3),
            if_args,
            if_return,
            TargetKind::Call("IF"),
        ),
        Builtin::function(
            "concat",
            ArgCount::AtLeast(2),
            any_arg,
            text_return,
            TargetKind::Call("CONCAT"),
        ),
        Builtin::function(
            "upper",
            ArgCount::Exact(1),
            text_arg,
            text_return,
            TargetKind::Call("UPPER"),
        ),
        Builtin::function(
            "lower",
            ArgCount::Exact(1),
            text_arg,
            text_return,
            TargetKind::Call("LOWER"),
        ),
        Builtin::function(
            "length",
            ArgCount::Exact(1),
            text_arg,
            integer_return,
            TargetKind::Call("LENGTH"),
        ),
        Builtin::function(
            "contains",
            ArgCount::Exact(2),
            text_arg,
            boolean_return,
            TargetKind::Call("CONTAINS"),
        ),
        Builtin::function(
            "totext",
            ArgCount::Exact(1),
            any_arg,
            text_return,
            TargetKind::Call("TO_TEXT"),
        ),
        Builtin::function(
            "abs",
            ArgCount::Exact(1),
            number_arg,
            first_arg_return,
            TargetKind::Call("ABS"),
        ),
        Builtin::function(
            "isblank",
            ArgCount::Exact(1),
            any_arg,
            boolean_return,
            TargetKind::Call("IS_BLANK"),
        ),
        Builtin::function(
            "now",
            ArgCount::Exact(0),
            no_args,
            now_return,
            TargetKind::Call("NOW"),
        ),
        Builtin::function(
            "today",
            ArgCount::Exact(0),
            no_args,
            today_return,
            TargetKind::Call("TODAY"),
        ),
        Builtin::aggregate("sum", number_arg, first_arg_return, "SUM"),
        Builtin::aggregate("min", number_arg, first_arg_return, "MIN"),
        Builtin::aggregate("max", number_arg, first_arg_return, "MAX"),
        Builtin::aggregate("avg", number_arg, max_precision_return, "AVG"),
        Builtin::aggregate("count", any_arg, integer_return, "COUNT"),
        Builtin {
            marks_pending_filter: true,
            ..Builtin::function(
                "filter",
                ArgCount::Exact(2),
                filter_args,
                first_arg_return,
                TargetKind::PassThrough,
            )
        },
        Builtin {
            internal: true,
            ..Builtin::function(
                "subquery",
                ArgCount::Exact(1),
                any_arg,
                first_arg_return,
                TargetKind::Subquery,
            )
        },
        Builtin {
            internal: true,
            many: true,
            ..Builtin::function(
                "join_lookup",
                ArgCount::Exact(2),
                join_lookup_args,
                second_arg_return,
                TargetKind::JoinLookup,
            )
        },
    ]
}
