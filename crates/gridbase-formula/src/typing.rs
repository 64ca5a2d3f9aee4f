use std::sync::Arc;

use gridbase_schema::{Field, FieldLookupCache, FormulaType, NUMBER_MAX_DECIMAL_PLACES, TableId};
use smol_str::SmolStr;
use thiserror::Error;

use crate::ast::node::{ExprKind, Expression, PendingJoin, TypedExpression, Untyped};
use crate::functions::{FunctionRegistry, type_call};

#[derive(Error, Debug, PartialEq)]
pub enum TypingError {
    #[error("a field cannot reference itself")]
    SelfReference,
}

pub struct TypingContext<'a> {
    pub registry: &'a FunctionRegistry,
    pub cache: &'a FieldLookupCache<'a>,
    /// The field whose formula is being typed.
    pub field: &'a Field,
    /// Maximum link row hops followed when resolving related primary fields.
    /// Link row primaries can point at each other, so the resolution must be
    /// bounded.
    pub max_link_depth: usize,
}

/// Types an expression bottom-up. Unresolvable references produce an
/// infectious `Invalid` type rather than an error, only a reference to the
/// field being typed itself aborts.
pub fn type_expression(
    expr: &Expression<Untyped>,
    ctx: &TypingContext,
) -> Result<TypedExpression, TypingError> {
    match &expr.kind {
        ExprKind::StringLiteral(s) => Ok(TypedExpression::valid_leaf(
            ExprKind::StringLiteral(s.clone()),
            FormulaType::Text,
        )),
        ExprKind::IntegerLiteral(i) => Ok(TypedExpression::valid_leaf(
            ExprKind::IntegerLiteral(*i),
            FormulaType::Number { decimal_places: 0 },
        )),
        ExprKind::DecimalLiteral { value, scale } => Ok(TypedExpression::valid_leaf(
            ExprKind::DecimalLiteral {
                value: *value,
                scale: *scale,
            },
            FormulaType::Number {
                decimal_places: (*scale).min(NUMBER_MAX_DECIMAL_PLACES),
            },
        )),
        ExprKind::BooleanLiteral(b) => Ok(TypedExpression::valid_leaf(
            ExprKind::BooleanLiteral(*b),
            FormulaType::Boolean,
        )),
        ExprKind::FieldReference(name) => type_field_reference(name, ctx),
        ExprKind::LookupReference { through, target } => {
            type_lookup_reference(through, target, ctx)
        }
        ExprKind::FunctionCall { def, args } => {
            let typed_args: Vec<TypedExpression> = args
                .iter()
                .map(|arg| type_expression(arg, ctx))
                .collect::<Result<_, _>>()?;

            let pending_filters = typed_args
                .iter()
                .filter(|arg| arg.pending_aggregate_filter)
                .count();

            if pending_filters > 1 {
                return Ok(TypedExpression::call_with_type(
                    Arc::clone(def),
                    typed_args,
                    FormulaType::invalid("cannot provide multiple filtered inputs to a function"),
                ));
            }

            if pending_filters == 1 && !def.aggregate() {
                return Ok(TypedExpression::call_with_type(
                    Arc::clone(def),
                    typed_args,
                    FormulaType::invalid(
                        "the filter function must be wrapped directly by an aggregate \
                         function like sum,avg,count etc.",
                    ),
                ));
            }

            Ok(type_call(Arc::clone(def), typed_args, ctx.registry))
        }
    }
}

fn type_field_reference(name: &SmolStr, ctx: &TypingContext) -> Result<TypedExpression, TypingError> {
    if *name == ctx.field.name {
        return Err(TypingError::SelfReference);
    }

    match ctx.cache.lookup_by_name(ctx.field.table, name) {
        None => Ok(TypedExpression::invalid(
            ExprKind::FieldReference(name.clone()),
            format!("references the deleted or unknown field {}", name),
        )),
        Some(field) => Ok(field_expression(field, ctx, 0)),
    }
}

fn type_lookup_reference(
    through: &SmolStr,
    target: &SmolStr,
    ctx: &TypingContext,
) -> Result<TypedExpression, TypingError> {
    if *through == ctx.field.name {
        return Err(TypingError::SelfReference);
    }

    let kind = ExprKind::LookupReference {
        through: through.clone(),
        target: target.clone(),
    };

    let through_field = match ctx.cache.lookup_by_name(ctx.field.table, through) {
        None => {
            return Ok(TypedExpression::invalid(
                kind,
                format!("cannot lookup through unknown field {}", through),
            ));
        }
        Some(field) => field,
    };

    let target_table = match through_field.link_row_table() {
        None => {
            return Ok(TypedExpression::invalid(
                kind,
                format!("cannot lookup through non link row field {}", through),
            ));
        }
        Some(table) => table,
    };

    match ctx.cache.lookup_by_name(target_table, target) {
        None => Ok(TypedExpression::invalid(
            kind,
            format!(
                "references the deleted or unknown field {} in table {}",
                target,
                table_name(ctx, target_table)
            ),
        )),
        Some(target_field) => {
            let target_expr = field_expression(target_field, ctx, 0);
            Ok(joined_lookup(through_field, target_table, target_expr, ctx))
        }
    }
}

/// The typed expression a resolved field contributes where it is referenced.
/// Plain columns become typed field references, a formula field carries its
/// stored computed type and a link row field becomes a lookup of the related
/// table's primary field.
fn field_expression(field: &Field, ctx: &TypingContext, depth: usize) -> TypedExpression {
    if let Some(ty) = field.kind.value_type() {
        return TypedExpression::valid_leaf(ExprKind::FieldReference(field.name.clone()), ty);
    }

    if depth >= ctx.max_link_depth {
        return TypedExpression::invalid(
            ExprKind::FieldReference(field.name.clone()),
            format!(
                "the chain of link row fields via field {} exceeds the maximum depth of {}",
                field.name, ctx.max_link_depth
            ),
        );
    }

    // Only link row fields have no intrinsic value type.
    let target_table = match field.link_row_table() {
        Some(table) => table,
        None => {
            return TypedExpression::invalid(
                ExprKind::FieldReference(field.name.clone()),
                format!("references the deleted or unknown field {}", field.name),
            );
        }
    };

    match ctx.cache.primary_field(target_table) {
        None => TypedExpression::invalid(
            ExprKind::FieldReference(field.name.clone()),
            format!(
                "references the deleted or unknown field unknown in table {}",
                table_name(ctx, target_table)
            ),
        ),
        Some(primary) => {
            let target_expr = field_expression(primary, ctx, depth + 1);
            joined_lookup(field, target_table, target_expr, ctx)
        }
    }
}

/// Wraps the target expression in an internal `join_lookup` call through the
/// link row field. The call's own join sits first, the target's joins stay
/// behind it carrying their local paths and are qualified against the outer
/// relation during codegen.
fn joined_lookup(
    through_field: &Field,
    target_table: TableId,
    target_expr: TypedExpression,
    ctx: &TypingContext,
) -> TypedExpression {
    let join_path: SmolStr = through_field.db_column().into();
    let literal = TypedExpression::valid_leaf(
        ExprKind::StringLiteral(join_path.to_string()),
        FormulaType::Text,
    );
    let ty = target_expr.ty.clone();

    let mut call =
        TypedExpression::call_with_type(ctx.registry.join_lookup(), vec![literal, target_expr], ty);
    call.pending_joins
        .insert(0, PendingJoin::new(join_path, target_table));

    call
}

fn table_name(ctx: &TypingContext, table: TableId) -> SmolStr {
    ctx.cache
        .store()
        .table(table)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| SmolStr::new("unknown"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Mapper, Parser};
    use crate::lexer::Lexer;
    use gridbase_schema::{FieldId, FieldKind, InMemorySchema, SchemaStore};
    use rstest::rstest;

    fn sales_schema() -> (InMemorySchema, FieldId) {
        let mut schema = InMemorySchema::new();
        let items = schema.add_table("items");
        schema.add_primary_field(items, "Name", FieldKind::Text);
        schema.add_field(items, "Price", FieldKind::Number { decimal_places: 2 });
        schema.add_field(items, "Quantity", FieldKind::Number { decimal_places: 0 });
        schema.add_field(items, "Active", FieldKind::Boolean);

        let orders = schema.add_table("orders");
        schema.add_primary_field(orders, "Ref", FieldKind::Text);
        schema.add_field(orders, "Total", FieldKind::Number { decimal_places: 2 });
        schema.add_field(items, "Orders", FieldKind::LinkRow { table: orders });

        let formula = schema.add_field(
            items,
            "Computed",
            FieldKind::Formula {
                source: String::new(),
                computed: FormulaType::Text,
            },
        );
        (schema, formula)
    }

    fn type_formula(
        schema: &InMemorySchema,
        field: FieldId,
        formula: &str,
    ) -> Result<TypedExpression, TypingError> {
        let tokens = Lexer::tokenize(formula).unwrap();
        let tree = Parser::new(&tokens, 50).parse().unwrap();
        let registry = FunctionRegistry::standard();
        let expr = Mapper::new(&registry, false, 50, 255)
            .to_expression(&tree)
            .unwrap();
        let cache = FieldLookupCache::new(schema);
        let ctx = TypingContext {
            registry: &registry,
            cache: &cache,
            field: schema.field(field).unwrap(),
            max_link_depth: 20,
        };
        type_expression(&expr, &ctx)
    }

    #[rstest]
    #[case("field('Price') * field('Quantity')", FormulaType::Number { decimal_places: 2 })]
    #[case("1 + 2", FormulaType::Number { decimal_places: 0 })]
    #[case("1.50 / 2", FormulaType::Number { decimal_places: NUMBER_MAX_DECIMAL_PLACES })]
    #[case("upper(field('Name'))", FormulaType::Text)]
    #[case("field('Active')", FormulaType::Boolean)]
    #[case("1.123456789", FormulaType::Number { decimal_places: NUMBER_MAX_DECIMAL_PLACES })]
    fn test_valid_types(#[case] formula: &str, #[case] expected: FormulaType) {
        let (schema, field) = sales_schema();

        let typed = type_formula(&schema, field, formula).unwrap();

        assert_eq!(typed.ty, expected);
    }

    #[rstest]
    #[case(
        "'a' + 1",
        "argument number 2 given to operator + was of type number but the only \
         usable type for this argument is text"
    )]
    #[case(
        "field('Missing')",
        "references the deleted or unknown field Missing"
    )]
    #[case(
        "lookup('Price', 'Total')",
        "cannot lookup through non link row field Price"
    )]
    #[case(
        "lookup('Gone', 'Total')",
        "cannot lookup through unknown field Gone"
    )]
    #[case(
        "lookup('Orders', 'Missing')",
        "references the deleted or unknown field Missing in table orders"
    )]
    #[case(
        "upper(filter(field('Name'), field('Active')))",
        "the filter function must be wrapped directly by an aggregate function like \
         sum,avg,count etc."
    )]
    fn test_invalid_types(#[case] formula: &str, #[case] expected: &str) {
        let (schema, field) = sales_schema();

        let typed = type_formula(&schema, field, formula).unwrap();

        assert_eq!(typed.ty.error(), Some(expected));
    }

    #[test]
    fn test_invalid_messages_aggregate_across_arguments() {
        let (schema, field) = sales_schema();

        let typed = type_formula(&schema, field, "concat(field('A'), field('B'))").unwrap();

        assert_eq!(
            typed.ty.error(),
            Some(
                "references the deleted or unknown field A, \
                 references the deleted or unknown field B"
            )
        );
    }

    #[test]
    fn test_self_reference_is_an_error() {
        let (schema, field) = sales_schema();

        assert_eq!(
            type_formula(&schema, field, "field('Computed')"),
            Err(TypingError::SelfReference)
        );
        assert_eq!(
            type_formula(&schema, field, "lookup('Computed', 'x')"),
            Err(TypingError::SelfReference)
        );
    }

    #[test]
    fn test_circular_link_row_primaries_become_invalid() {
        let mut schema = InMemorySchema::new();
        let suppliers = schema.add_table("suppliers");
        let warehouses = schema.add_table("warehouses");
        schema.add_primary_field(suppliers, "Warehouse", FieldKind::LinkRow { table: warehouses });
        schema.add_primary_field(warehouses, "Supplier", FieldKind::LinkRow { table: suppliers });
        let formula = schema.add_field(
            suppliers,
            "Computed",
            FieldKind::Formula {
                source: String::new(),
                computed: FormulaType::Text,
            },
        );

        let typed = type_formula(&schema, formula, "field('Warehouse')").unwrap();

        assert_eq!(
            typed.ty.error(),
            Some(
                "the chain of link row fields via field Warehouse exceeds the \
                 maximum depth of 20"
            )
        );
    }

    #[test]
    fn test_lookup_becomes_internal_join_and_is_many() {
        let (schema, field) = sales_schema();

        let typed = type_formula(&schema, field, "lookup('Orders', 'Total')").unwrap();

        assert!(typed.many);
        assert!(!typed.aggregate);
        assert_eq!(typed.ty, FormulaType::Number { decimal_places: 2 });
        assert_eq!(typed.pending_joins.len(), 1);
        match &typed.kind {
            ExprKind::FunctionCall { def, .. } => assert_eq!(def.name(), "join_lookup"),
            kind => panic!("expected join_lookup call, got {:?}", kind),
        }
    }

    #[test]
    fn test_aggregated_lookup_wraps_in_subquery() {
        let (schema, field) = sales_schema();

        let typed = type_formula(&schema, field, "sum(lookup('Orders', 'Total'))").unwrap();

        assert!(typed.aggregate);
        assert_eq!(typed.ty, FormulaType::Number { decimal_places: 2 });
        match &typed.kind {
            ExprKind::FunctionCall { def, .. } => assert_eq!(def.name(), "subquery"),
            kind => panic!("expected subquery wrap, got {:?}", kind),
        }
    }

    #[test]
    fn test_link_row_reference_resolves_to_related_primary() {
        let (schema, field) = sales_schema();

        let typed = type_formula(&schema, field, "field('Orders')").unwrap();

        assert!(typed.many);
        // Primary field of orders is text.
        assert_eq!(typed.ty, FormulaType::Text);
    }

    #[test]
    fn test_multiple_filtered_inputs_invalid() {
        let (schema, field) = sales_schema();
        let formula = "sum(filter(field('Price'), field('Active')) \
                       + filter(field('Quantity'), field('Active')))";

        let typed = type_formula(&schema, field, formula).unwrap();

        assert_eq!(
            typed.ty.error(),
            Some("cannot provide multiple filtered inputs to a function")
        );
    }
}
