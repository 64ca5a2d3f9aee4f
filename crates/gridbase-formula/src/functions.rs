pub mod defs;
pub mod registry;

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use gridbase_schema::FormulaType;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::ast::node::{Args, TypedExpression};
use crate::codegen::{CodegenContext, TargetExpression};

pub use registry::FunctionRegistry;

/// A function callable from a formula. Implementations describe their arity
/// and argument types, compute the result type from typed arguments and lower
/// a typed call to a storage-level expression.
pub trait FunctionDef: Debug + Send + Sync {
    /// Unique case insensitive name users call this function with.
    fn name(&self) -> &'static str;

    fn num_args(&self) -> ArgCount;

    /// Acceptable type classes for the argument at `index`. May depend on the
    /// types of the other arguments (e.g. `add` requires both sides to be of
    /// the same class). An empty spec means no type is usable at this position.
    fn arg_types(&self, index: usize, arg_types: &[&FormulaType]) -> ArgSpec;

    /// Collapses a many expression down to a single value.
    fn aggregate(&self) -> bool {
        false
    }

    /// Only callable by the typing system itself, never by users.
    fn internal(&self) -> bool {
        false
    }

    /// The operator symbol when this function backs a binary operator.
    fn operator(&self) -> Option<&'static str> {
        None
    }

    /// Produces multiple values per row.
    fn many(&self) -> bool {
        false
    }

    /// Marks its result as a filtered input for the enclosing aggregate.
    fn marks_pending_filter(&self) -> bool {
        false
    }

    /// Result type, given arguments that already passed the arg type check.
    fn return_type(&self, args: &[TypedExpression]) -> FormulaType;

    fn to_target(&self, call: &TypedExpression, ctx: &mut CodegenContext) -> TargetExpression;

    /// How the function is referred to in error messages.
    fn description(&self) -> String {
        match self.operator() {
            Some(symbol) => format!("operator {}", symbol),
            None => format!("function {}", self.name()),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ArgCount {
    Exact(usize),
    AtLeast(usize),
    Range { min: usize, max: usize },
}

impl ArgCount {
    pub fn test(&self, num_args: usize) -> bool {
        match self {
            ArgCount::Exact(n) => num_args == *n,
            ArgCount::AtLeast(n) => num_args >= *n,
            ArgCount::Range { min, max } => (*min..=*max).contains(&num_args),
        }
    }
}

impl Display for ArgCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ArgCount::Exact(n) => write!(f, "exactly {} arguments", n),
            ArgCount::AtLeast(n) => write!(f, "at least {} arguments", n),
            ArgCount::Range { min, max } => {
                write!(f, "between {} and {} arguments", min, max)
            }
        }
    }
}

/// Coarse classification of [`FormulaType`]s used by argument checks.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TypeClass {
    Text,
    Number,
    Boolean,
    Date,
    SingleSelect,
    Array,
    Any,
}

pub type ArgSpec = SmallVec<[TypeClass; 3]>;

impl TypeClass {
    pub fn of(ty: &FormulaType) -> Option<TypeClass> {
        match ty {
            FormulaType::Invalid { .. } => None,
            FormulaType::Text => Some(TypeClass::Text),
            FormulaType::Number { .. } => Some(TypeClass::Number),
            FormulaType::Boolean => Some(TypeClass::Boolean),
            FormulaType::Date { .. } => Some(TypeClass::Date),
            FormulaType::SingleSelect => Some(TypeClass::SingleSelect),
            FormulaType::Array { .. } => Some(TypeClass::Array),
        }
    }

    pub fn matches(&self, ty: &FormulaType) -> bool {
        match self {
            TypeClass::Any => !ty.is_invalid(),
            class => TypeClass::of(ty) == Some(*class),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeClass::Text => "text",
            TypeClass::Number => "number",
            TypeClass::Boolean => "boolean",
            TypeClass::Date => "date",
            TypeClass::SingleSelect => "single_select",
            TypeClass::Array => "array",
            TypeClass::Any => "any",
        }
    }
}

/// Types a function call whose arguments are already typed. Invalid argument
/// types infect the call, otherwise each argument is checked against the
/// definition's acceptable classes and the result type is computed. Aggregate
/// calls wrap themselves in the internal `subquery` function.
pub fn type_call(
    def: Arc<dyn FunctionDef>,
    typed_args: Args<FormulaType>,
    registry: &FunctionRegistry,
) -> TypedExpression {
    let all_types: Vec<&FormulaType> = typed_args.iter().map(|arg| &arg.ty).collect();
    let mut invalid_messages: Vec<String> = Vec::new();

    for (i, arg) in typed_args.iter().enumerate() {
        if let Some(error) = arg.ty.error() {
            invalid_messages.push(error.to_string());
            continue;
        }

        let spec = def.arg_types(i, &all_types);
        if let Err(message) = check_arg_type(def.as_ref(), i, &arg.ty, &spec) {
            invalid_messages.push(message);
        }
    }

    if !invalid_messages.is_empty() {
        let message = invalid_messages.iter().join(", ");
        return TypedExpression::call_with_type(def, typed_args, FormulaType::invalid(message));
    }

    let ty = def.return_type(&typed_args);
    let mut call = TypedExpression::call_with_type(Arc::clone(&def), typed_args, ty);
    call.pending_aggregate_filter = def.marks_pending_filter();

    if def.aggregate() && def.name() != registry.subquery().name() {
        let subquery = registry.subquery();
        let ty = subquery.return_type(std::slice::from_ref(&call));
        TypedExpression::call_with_type(subquery, vec![call], ty)
    } else {
        call
    }
}

fn check_arg_type(
    def: &dyn FunctionDef,
    index: usize,
    ty: &FormulaType,
    spec: &ArgSpec,
) -> Result<(), String> {
    let mut valid_type_names = Vec::with_capacity(spec.len());

    for class in spec {
        if class.matches(ty) {
            return Ok(());
        }
        valid_type_names.push(class.name());
    }

    let postfix = match valid_type_names.len() {
        0 => "there are no possible types usable here".to_string(),
        1 => format!(
            "the only usable type for this argument is {}",
            valid_type_names[0]
        ),
        _ => format!(
            "the only usable types for this argument are {}",
            valid_type_names.join(",")
        ),
    };

    Err(format!(
        "argument number {} given to {} was of type {} but {}",
        index + 1,
        def.description(),
        ty.name(),
        postfix
    ))
}
