use gridbase_schema::{Field, FieldDependency, FieldKind, FieldLookupCache, FormulaType, SchemaStore, TableId};
use rustc_hash::FxHashSet;

use crate::{
    ast::{Mapper, Parser, TypedExpression},
    codegen::{self, TargetQuery},
    dependencies::{self, CyclePolicy},
    error::{Error, InnerError},
    functions::FunctionRegistry,
    lexer::Lexer,
    typing::{self, TypingContext},
};

/// Hard limits applied before and during formula checking.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Maximum formula length in characters.
    pub max_formula_length: usize,
    /// Maximum string literal length in characters.
    pub max_string_literal_length: usize,
    /// Maximum number of hops followed when walking stored dependency edges
    /// or resolving chains of link row primary fields.
    pub max_reference_depth: usize,
    /// Maximum nesting depth of the parsed expression tree.
    pub max_expression_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_formula_length: 10_000,
            max_string_literal_length: 1_000,
            max_reference_depth: 20,
            max_expression_depth: 50,
        }
    }
}

/// The result of successfully checking a formula. The expression may still
/// carry an `Invalid` type, that is a property of the formula rather than an
/// error of the checker.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedFormula {
    pub expression: TypedExpression,
    /// The expression's type with multi-row results wrapped in an array.
    pub formula_type: FormulaType,
    pub dependencies: Vec<FieldDependency>,
}

/// Front door of the formula engine: checking, lowering and unparsing.
pub struct FormulaEngine {
    registry: FunctionRegistry,
    limits: Limits,
    cycle_policy: CyclePolicy,
}

impl FormulaEngine {
    pub fn new(registry: FunctionRegistry, limits: Limits, cycle_policy: CyclePolicy) -> Self {
        Self {
            registry,
            limits,
            cycle_policy,
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Parses, maps and types a formula for `field`, checking its dependency
    /// edges against the stored graph.
    pub fn check_formula(
        &self,
        store: &dyn SchemaStore,
        field: &Field,
        formula: &str,
    ) -> Result<CheckedFormula, Error> {
        if formula.chars().count() > self.limits.max_formula_length {
            return Err(Error::from_error(
                formula,
                InnerError::Parse(crate::ast::ParseError::FormulaTooLarge),
            ));
        }

        let tokens =
            Lexer::tokenize(formula).map_err(|e| Error::from_error(formula, e.into()))?;
        let node = Parser::new(&tokens, self.limits.max_expression_depth)
            .parse()
            .map_err(|e| Error::from_error(formula, e.into()))?;

        let mapper = Mapper::new(
            &self.registry,
            false,
            self.limits.max_expression_depth,
            self.limits.max_string_literal_length,
        );
        let untyped = mapper
            .to_expression(&node)
            .map_err(|e| Error::from_error(formula, e.into()))?;

        let cache = FieldLookupCache::new(store);
        let ctx = TypingContext {
            registry: &self.registry,
            cache: &cache,
            field,
            max_link_depth: self.limits.max_reference_depth,
        };
        let mut expression = typing::type_expression(&untyped, &ctx)
            .map_err(|e| Error::from_error(formula, e.into()))?;

        let dependencies: Vec<FieldDependency> =
            dependencies::field_dependencies(&untyped, field.table, &cache)
                .into_iter()
                .collect();
        // Direct self-references fail typing above, the walk covers cycles
        // through other fields' stored edges.
        dependencies::check_for_cycles(
            store,
            field,
            &dependencies,
            self.limits.max_reference_depth,
            self.cycle_policy,
        )
        .map_err(|e| Error::from_error(formula, e.into()))?;

        // A filter left unconsumed at the top level has no aggregate to
        // attach to.
        if expression.pending_aggregate_filter {
            expression = expression.with_invalid(
                "the filter function must be wrapped directly by an aggregate \
                 function like sum,avg,count etc.",
            );
        }

        let formula_type = if expression.is_valid() && expression.many && !expression.aggregate {
            FormulaType::Array {
                inner: Box::new(expression.ty.clone()),
            }
        } else {
            expression.ty.clone()
        };

        Ok(CheckedFormula {
            expression,
            formula_type,
            dependencies,
        })
    }

    /// Lowers a checked formula of a field in `table` to a storage-level
    /// query.
    ///
    /// Panics when the checked expression carries an invalid type.
    pub fn generate(
        &self,
        store: &dyn SchemaStore,
        table: TableId,
        checked: &CheckedFormula,
    ) -> TargetQuery {
        let cache = FieldLookupCache::new(store);
        codegen::to_target_query(&checked.expression, &cache, table)
    }

    /// Renders a checked expression back to formula text that parses to the
    /// same expression.
    pub fn unparse(&self, expression: &TypedExpression) -> String {
        expression.to_string()
    }

    /// Re-checks every formula field that reads the named field, directly or
    /// through their own dependants, storing the new type and edges. Fields
    /// whose formula no longer checks are stored with an invalid type instead
    /// of aborting the cascade.
    pub fn retype_dependants(
        &self,
        store: &mut dyn SchemaStore,
        table: TableId,
        field_name: &str,
    ) {
        let mut queue: std::collections::VecDeque<_> =
            store.dependants_of(table, field_name).into();
        let mut visited: FxHashSet<_> = queue.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            let Some(field) = store.field(id).cloned() else {
                continue;
            };
            let FieldKind::Formula { source, .. } = &field.kind else {
                continue;
            };

            let (computed, edges) = match self.check_formula(&*store, &field, source) {
                Ok(checked) => (checked.formula_type, checked.dependencies),
                Err(err) => (FormulaType::invalid(err.cause.to_string()), Vec::new()),
            };
            tracing::debug!(
                field = %field.name,
                formula_type = computed.name(),
                "retyped dependant formula field"
            );
            store.update_formula_field(id, computed, edges);

            for next in store.dependants_of(field.table, &field.name) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new(
            FunctionRegistry::standard(),
            Limits::default(),
            CyclePolicy::AssumeCyclic,
        )
    }
}
