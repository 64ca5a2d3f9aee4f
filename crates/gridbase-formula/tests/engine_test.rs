use gridbase_formula::{CyclePolicy, FormulaEngine, FunctionRegistry, Limits};
use gridbase_schema::{
    FieldDependency, FieldId, FieldKind, FormulaType, InMemorySchema, SchemaStore, TableId,
};
use rstest::{fixture, rstest};

#[fixture]
fn engine() -> FormulaEngine {
    FormulaEngine::default()
}

// Tables: items (id 1) with Name/Price/Quantity/Active/Orders/Computed,
// orders (id 2) with Ref/Total.
fn sales_schema() -> (InMemorySchema, TableId, FieldId) {
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
            source: "1".to_string(),
            computed: FormulaType::Number { decimal_places: 0 },
        },
    );
    (schema, items, formula)
}

#[rstest]
#[case(
    "field('Price') * field('Quantity')",
    FormulaType::Number { decimal_places: 2 }
)]
#[case("field('Price') > 10", FormulaType::Boolean)]
#[case("concat(field('Name'), '!')", FormulaType::Text)]
#[case(
    "sum(lookup('Orders', 'Total'))",
    FormulaType::Number { decimal_places: 2 }
)]
#[case(
    "lookup('Orders', 'Total')",
    FormulaType::Array {
        inner: Box::new(FormulaType::Number { decimal_places: 2 })
    }
)]
#[case(
    "field('Orders')",
    FormulaType::Array { inner: Box::new(FormulaType::Text) }
)]
fn test_check_formula_types(
    engine: FormulaEngine,
    #[case] formula: &str,
    #[case] expected: FormulaType,
) {
    let (schema, _, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    let checked = engine.check_formula(&schema, &field, formula).unwrap();

    assert_eq!(checked.formula_type, expected);
}

#[rstest]
#[case(
    "'a' + 1",
    "argument number 2 given to operator + was of type number but the only \
     usable type for this argument is text"
)]
#[case("field('Gone') + 1", "references the deleted or unknown field Gone")]
#[case(
    "sum(lookup('Price', 'Total'))",
    "cannot lookup through non link row field Price"
)]
#[case(
    "filter(field('Price'), field('Active'))",
    "the filter function must be wrapped directly by an aggregate function \
     like sum,avg,count etc."
)]
fn test_check_formula_invalid_types(
    engine: FormulaEngine,
    #[case] formula: &str,
    #[case] expected: &str,
) {
    let (schema, _, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    let checked = engine.check_formula(&schema, &field, formula).unwrap();

    assert_eq!(checked.formula_type.error(), Some(expected));
}

#[rstest]
fn test_check_formula_bounds_link_row_chains(engine: FormulaEngine) {
    let mut schema = InMemorySchema::new();
    let suppliers = schema.add_table("suppliers");
    let warehouses = schema.add_table("warehouses");
    // Two link row primaries pointing at each other never resolve to a value.
    schema.add_primary_field(suppliers, "Warehouse", FieldKind::LinkRow { table: warehouses });
    schema.add_primary_field(warehouses, "Supplier", FieldKind::LinkRow { table: suppliers });
    let formula = schema.add_field(
        suppliers,
        "Computed",
        FieldKind::Formula {
            source: "1".to_string(),
            computed: FormulaType::Number { decimal_places: 0 },
        },
    );
    let field = schema.field(formula).unwrap().clone();

    let checked = engine
        .check_formula(&schema, &field, "field('Warehouse')")
        .unwrap();

    assert_eq!(
        checked.formula_type.error(),
        Some(
            "the chain of link row fields via field Warehouse exceeds the \
             maximum depth of 20"
        )
    );
}

#[rstest]
fn test_check_formula_dependencies(engine: FormulaEngine) {
    let (schema, _, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    let checked = engine
        .check_formula(
            &schema,
            &field,
            "field('Price') * field('Quantity') + sum(lookup('Orders', 'Total'))",
        )
        .unwrap();

    let mut dependencies = checked.dependencies;
    dependencies.sort();
    assert_eq!(
        dependencies,
        vec![
            FieldDependency::direct("Price"),
            FieldDependency::direct("Quantity"),
            FieldDependency::through("Orders", "Total"),
        ]
    );
}

#[rstest]
fn test_check_formula_self_reference(engine: FormulaEngine) {
    let (schema, _, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    let err = engine
        .check_formula(&schema, &field, "field('Computed') + 1")
        .unwrap_err();

    assert_eq!(err.to_string(), "a field cannot reference itself");
}

#[rstest]
fn test_check_formula_circular_reference(engine: FormulaEngine) {
    let (mut schema, items, _) = sales_schema();
    let a = schema.add_field(
        items,
        "A",
        FieldKind::Formula {
            source: "field('B') + 1".to_string(),
            computed: FormulaType::Number { decimal_places: 0 },
        },
    );
    let b = schema.add_field(
        items,
        "B",
        FieldKind::Formula {
            source: "field('A') + 1".to_string(),
            computed: FormulaType::Number { decimal_places: 0 },
        },
    );

    let field_a = schema.field(a).unwrap().clone();
    let checked = engine
        .check_formula(&schema, &field_a, "field('B') + 1")
        .unwrap();
    schema.update_formula_field(a, checked.formula_type, checked.dependencies);

    let field_b = schema.field(b).unwrap().clone();
    let err = engine
        .check_formula(&schema, &field_b, "field('A') + 1")
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "the formula would create a circular reference via field B"
    );
}

#[rstest]
fn test_check_formula_too_long(engine: FormulaEngine) {
    let (schema, _, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();
    let formula = format!("1 + {}", "1 + ".repeat(3_000));

    let err = engine.check_formula(&schema, &field, &formula).unwrap_err();

    assert_eq!(err.to_string(), "The formula is too large to be parsed");
}

#[rstest]
fn test_check_formula_too_deep(engine: FormulaEngine) {
    let (schema, _, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();
    let formula = format!("{}1{}", "(".repeat(60), ")".repeat(60));

    let err = engine.check_formula(&schema, &field, &formula).unwrap_err();

    assert_eq!(err.to_string(), "The formula is too large to be parsed");
}

#[rstest]
fn test_unparse_round_trips(engine: FormulaEngine) {
    let (schema, _, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    let checked = engine
        .check_formula(&schema, &field, "field('Price') * 2 + 0.50")
        .unwrap();
    let unparsed = engine.unparse(&checked.expression);

    assert_eq!(unparsed, "add(multiply(field('Price'), 2), 0.50)");

    let rechecked = engine.check_formula(&schema, &field, &unparsed).unwrap();
    assert_eq!(rechecked.expression, checked.expression);
}

#[rstest]
fn test_generate_aggregated_lookup(engine: FormulaEngine) {
    let (schema, items, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    let checked = engine
        .check_formula(&schema, &field, "sum(lookup('Orders', 'Total'))")
        .unwrap();
    let query = engine.generate(&schema, items, &checked);

    assert_eq!(
        query.expression.to_string(),
        "(SELECT SUM(not_trashed_field_7.field_6) JOIN table_2 AS not_trashed_field_7 ON field_7)"
    );
    assert!(query.joins.is_empty());
}

#[rstest]
fn test_generate_filtered_aggregate(engine: FormulaEngine) {
    let (schema, items, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    let checked = engine
        .check_formula(
            &schema,
            &field,
            "sum(filter(field('Price'), field('Active')))",
        )
        .unwrap();
    let query = engine.generate(&schema, items, &checked);

    assert_eq!(
        query.expression.to_string(),
        "(SELECT SUM(field_2) FILTER (WHERE field_4))"
    );
}

#[rstest]
fn test_generate_deduplicates_joins(engine: FormulaEngine) {
    let (schema, items, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    let checked = engine
        .check_formula(
            &schema,
            &field,
            "sum(lookup('Orders', 'Total') + lookup('Orders', 'Total'))",
        )
        .unwrap();
    let query = engine.generate(&schema, items, &checked);

    assert_eq!(
        query.expression.to_string(),
        "(SELECT SUM((not_trashed_field_7.field_6 + not_trashed_field_7.field_6)) \
         JOIN table_2 AS not_trashed_field_7 ON field_7)"
    );
}

#[rstest]
fn test_generate_chained_link_row_joins(engine: FormulaEngine) {
    let mut schema = InMemorySchema::new();
    let items = schema.add_table("items");
    let orders = schema.add_table("orders");
    let customers = schema.add_table("customers");
    schema.add_primary_field(items, "Name", FieldKind::Text);
    schema.add_primary_field(customers, "Company", FieldKind::Text);
    schema.add_primary_field(orders, "Customer", FieldKind::LinkRow { table: customers });
    schema.add_field(items, "Orders", FieldKind::LinkRow { table: orders });
    let formula = schema.add_field(
        items,
        "Computed",
        FieldKind::Formula {
            source: "1".to_string(),
            computed: FormulaType::Number { decimal_places: 0 },
        },
    );
    let field = schema.field(formula).unwrap().clone();

    // Orders resolves to the orders primary, itself a link row, so the
    // lowered column sits two relations deep.
    let checked = engine
        .check_formula(&schema, &field, "field('Orders')")
        .unwrap();
    assert_eq!(
        checked.formula_type,
        FormulaType::Array { inner: Box::new(FormulaType::Text) }
    );

    let query = engine.generate(&schema, items, &checked);

    assert_eq!(
        query.expression.to_string(),
        "not_trashed_field_4_field_3.field_2"
    );
    let joins: Vec<String> = query.joins.iter().map(|join| join.to_string()).collect();
    assert_eq!(
        joins,
        vec![
            "JOIN table_2 AS not_trashed_field_4 ON field_4".to_string(),
            "JOIN table_3 AS not_trashed_field_4_field_3 ON field_4__field_3".to_string(),
        ]
    );
}

#[rstest]
fn test_retype_dependants_cascade(engine: FormulaEngine) {
    let mut schema = InMemorySchema::new();
    let items = schema.add_table("items");
    schema.add_primary_field(items, "Name", FieldKind::Text);
    let price = schema.add_field(items, "Price", FieldKind::Number { decimal_places: 2 });
    let doubled = schema.add_field(
        items,
        "Doubled",
        FieldKind::Formula {
            source: "field('Price') * 2".to_string(),
            computed: FormulaType::Number { decimal_places: 2 },
        },
    );
    let tripled = schema.add_field(
        items,
        "Tripled",
        FieldKind::Formula {
            source: "field('Doubled') + field('Price')".to_string(),
            computed: FormulaType::Number { decimal_places: 2 },
        },
    );
    for id in [doubled, tripled] {
        let field = schema.field(id).unwrap().clone();
        let FieldKind::Formula { source, .. } = &field.kind else {
            unreachable!()
        };
        let checked = engine.check_formula(&schema, &field, source).unwrap();
        schema.update_formula_field(id, checked.formula_type, checked.dependencies);
    }

    // Widening Price to 4 decimal places must retype both formula fields.
    {
        let mut field = schema.field(price).unwrap().clone();
        field.kind = FieldKind::Number { decimal_places: 4 };
        schema.replace_field(price, field);
    }
    engine.retype_dependants(&mut schema, items, "Price");

    let FieldKind::Formula { computed, .. } = &schema.field(doubled).unwrap().kind else {
        unreachable!()
    };
    assert_eq!(computed, &FormulaType::Number { decimal_places: 4 });
    let FieldKind::Formula { computed, .. } = &schema.field(tripled).unwrap().kind else {
        unreachable!()
    };
    assert_eq!(computed, &FormulaType::Number { decimal_places: 4 });
}

#[rstest]
fn test_retype_dependants_marks_broken_formulas_invalid(engine: FormulaEngine) {
    let mut schema = InMemorySchema::new();
    let items = schema.add_table("items");
    schema.add_primary_field(items, "Name", FieldKind::Text);
    let price = schema.add_field(items, "Price", FieldKind::Number { decimal_places: 2 });
    let doubled = schema.add_field(
        items,
        "Doubled",
        FieldKind::Formula {
            source: "field('Price') * 2".to_string(),
            computed: FormulaType::Number { decimal_places: 2 },
        },
    );
    let field = schema.field(doubled).unwrap().clone();
    let checked = engine
        .check_formula(&schema, &field, "field('Price') * 2")
        .unwrap();
    schema.update_formula_field(doubled, checked.formula_type, checked.dependencies);

    // Renaming Price breaks Doubled, whose stored type turns invalid.
    {
        let mut field = schema.field(price).unwrap().clone();
        field.name = "Cost".into();
        schema.replace_field(price, field);
    }
    engine.retype_dependants(&mut schema, items, "Price");

    let FieldKind::Formula { computed, .. } = &schema.field(doubled).unwrap().kind else {
        unreachable!()
    };
    assert_eq!(
        computed.error(),
        Some("references the deleted or unknown field Price")
    );
}

#[rstest]
fn test_custom_limits() {
    let engine = FormulaEngine::new(
        FunctionRegistry::standard(),
        Limits {
            max_formula_length: 10,
            ..Limits::default()
        },
        CyclePolicy::AssumeCyclic,
    );
    let (schema, _, field) = sales_schema();
    let field = schema.field(field).unwrap().clone();

    assert!(engine
        .check_formula(&schema, &field, "field('Price') + 1")
        .is_err());
    assert!(engine.check_formula(&schema, &field, "1 + 2").is_ok());
}
