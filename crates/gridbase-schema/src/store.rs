use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{Field, FieldId, FieldKind, FormulaType, Table, TableId};

/// A single dependency edge: the owning (dependant) field reads `field`,
/// either in its own table (`via: None`) or on the far side of the link row
/// field named `via`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldDependency {
    pub field: SmolStr,
    pub via: Option<SmolStr>,
}

impl FieldDependency {
    pub fn direct(field: &str) -> Self {
        Self {
            field: SmolStr::new(field),
            via: None,
        }
    }

    pub fn through(via: &str, field: &str) -> Self {
        Self {
            field: SmolStr::new(field),
            via: Some(SmolStr::new(via)),
        }
    }
}

/// The boundary between the formula engine and wherever schemas actually
/// live. Reads resolve tables and fields; the two write operations replace a
/// field's dependency edges (and, for formula fields, the stored type) in a
/// single step so a reader never sees edges that disagree with the type.
pub trait SchemaStore {
    fn table(&self, id: TableId) -> Option<&Table>;
    fn field(&self, id: FieldId) -> Option<&Field>;
    fn fields_of(&self, table: TableId) -> Vec<&Field>;
    fn field_by_name(&self, table: TableId, name: &str) -> Option<&Field>;

    fn primary_field(&self, table: TableId) -> Option<&Field> {
        self.fields_of(table).into_iter().find(|f| f.primary)
    }

    fn dependencies_of(&self, field: FieldId) -> &[FieldDependency];

    /// All fields whose stored dependency edges read the named field in the
    /// given table, directly or through a link row field.
    fn dependants_of(&self, table: TableId, field_name: &str) -> Vec<FieldId>;

    fn replace_dependencies(&mut self, field: FieldId, edges: Vec<FieldDependency>);

    /// Store a formula field's newly computed type together with its new
    /// dependency edges.
    fn update_formula_field(
        &mut self,
        field: FieldId,
        computed: FormulaType,
        edges: Vec<FieldDependency>,
    );
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySchema {
    tables: FxHashMap<TableId, Table>,
    fields: FxHashMap<FieldId, Field>,
    dependencies: FxHashMap<FieldId, Vec<FieldDependency>>,
    next_table: u64,
    next_field: u64,
}

const NO_EDGES: &[FieldDependency] = &[];

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, name: &str) -> TableId {
        self.next_table += 1;
        let id = TableId(self.next_table);
        self.tables.insert(id, Table::new(id, name));
        id
    }

    pub fn add_field(&mut self, table: TableId, name: &str, kind: FieldKind) -> FieldId {
        self.insert_field(table, name, false, kind)
    }

    pub fn add_primary_field(&mut self, table: TableId, name: &str, kind: FieldKind) -> FieldId {
        self.insert_field(table, name, true, kind)
    }

    fn insert_field(
        &mut self,
        table: TableId,
        name: &str,
        primary: bool,
        kind: FieldKind,
    ) -> FieldId {
        self.next_field += 1;
        let id = FieldId(self.next_field);
        self.fields.insert(
            id,
            Field {
                id,
                table,
                name: SmolStr::new(name),
                primary,
                kind,
            },
        );
        id
    }

    /// Replace a stored field wholesale, e.g. after a rename or kind change.
    pub fn replace_field(&mut self, id: FieldId, field: Field) {
        self.fields.insert(id, field);
    }
}

impl SchemaStore for InMemorySchema {
    fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(&id)
    }

    fn fields_of(&self, table: TableId) -> Vec<&Field> {
        let mut fields = self
            .fields
            .values()
            .filter(|f| f.table == table)
            .collect::<Vec<_>>();
        fields.sort_by_key(|f| f.id);
        fields
    }

    fn field_by_name(&self, table: TableId, name: &str) -> Option<&Field> {
        self.fields
            .values()
            .find(|f| f.table == table && f.name == name)
    }

    fn dependencies_of(&self, field: FieldId) -> &[FieldDependency] {
        self.dependencies
            .get(&field)
            .map(|edges| edges.as_slice())
            .unwrap_or(NO_EDGES)
    }

    fn dependants_of(&self, table: TableId, field_name: &str) -> Vec<FieldId> {
        let mut out = Vec::new();
        for (id, edges) in &self.dependencies {
            let Some(dependant) = self.fields.get(id) else {
                continue;
            };
            let hit = edges.iter().any(|edge| match &edge.via {
                None => dependant.table == table && edge.field == field_name,
                Some(via) => {
                    (dependant.table == table && via == field_name)
                        || self
                            .field_by_name(dependant.table, via)
                            .and_then(Field::link_row_table)
                            .is_some_and(|t| t == table && edge.field == field_name)
                }
            });
            if hit {
                out.push(*id);
            }
        }
        out.sort();
        out
    }

    fn replace_dependencies(&mut self, field: FieldId, edges: Vec<FieldDependency>) {
        self.dependencies.insert(field, edges);
    }

    fn update_formula_field(
        &mut self,
        field: FieldId,
        computed: FormulaType,
        edges: Vec<FieldDependency>,
    ) {
        if let Some(existing) = self.fields.get_mut(&field) {
            if let FieldKind::Formula {
                computed: stored, ..
            } = &mut existing.kind
            {
                *stored = computed;
            }
        }
        self.replace_dependencies(field, edges);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with_link() -> (InMemorySchema, TableId, TableId) {
        let mut schema = InMemorySchema::new();
        let products = schema.add_table("Products");
        let orders = schema.add_table("Orders");
        schema.add_primary_field(products, "Name", FieldKind::Text);
        schema.add_field(products, "Price", FieldKind::Number { decimal_places: 2 });
        schema.add_primary_field(orders, "Ref", FieldKind::Text);
        schema.add_field(orders, "Product", FieldKind::LinkRow { table: products });
        (schema, products, orders)
    }

    #[test]
    fn test_field_lookup() {
        let (schema, products, _) = schema_with_link();
        let price = schema.field_by_name(products, "Price").unwrap();
        assert_eq!(price.kind, FieldKind::Number { decimal_places: 2 });
        assert!(schema.field_by_name(products, "Missing").is_none());
        assert_eq!(schema.primary_field(products).unwrap().name, "Name");
    }

    #[test]
    fn test_replace_dependencies_is_a_swap() {
        let (mut schema, products, _) = schema_with_link();
        let total = schema.add_field(
            products,
            "Total",
            FieldKind::Formula {
                source: "field('Price')".to_string(),
                computed: FormulaType::Number { decimal_places: 2 },
            },
        );
        schema.replace_dependencies(total, vec![FieldDependency::direct("Price")]);
        assert_eq!(
            schema.dependencies_of(total),
            &[FieldDependency::direct("Price")]
        );

        schema.replace_dependencies(total, vec![FieldDependency::direct("Name")]);
        assert_eq!(
            schema.dependencies_of(total),
            &[FieldDependency::direct("Name")]
        );
    }

    #[test]
    fn test_dependants_direct_and_via_link() {
        let (mut schema, products, orders) = schema_with_link();
        let total = schema.add_field(
            products,
            "Total",
            FieldKind::Formula {
                source: "field('Price')".to_string(),
                computed: FormulaType::Number { decimal_places: 2 },
            },
        );
        schema.replace_dependencies(total, vec![FieldDependency::direct("Price")]);

        let summary = schema.add_field(
            orders,
            "Summary",
            FieldKind::Formula {
                source: "lookup('Product', 'Price')".to_string(),
                computed: FormulaType::Number { decimal_places: 2 },
            },
        );
        schema.replace_dependencies(summary, vec![FieldDependency::through("Product", "Price")]);

        let price = schema.field_by_name(products, "Price").unwrap().id;
        let _ = price;
        assert_eq!(schema.dependants_of(products, "Price"), vec![total, summary]);
        assert_eq!(schema.dependants_of(orders, "Product"), vec![summary]);
        assert!(schema.dependants_of(products, "Name").is_empty());
    }

    #[test]
    fn test_update_formula_field_updates_type_and_edges_together() {
        let (mut schema, products, _) = schema_with_link();
        let total = schema.add_field(
            products,
            "Total",
            FieldKind::Formula {
                source: "field('Price')".to_string(),
                computed: FormulaType::Number { decimal_places: 2 },
            },
        );
        schema.update_formula_field(
            total,
            FormulaType::invalid("references the deleted or unknown field Price"),
            vec![],
        );
        let field = schema.field(total).unwrap();
        match &field.kind {
            FieldKind::Formula { computed, .. } => assert!(computed.is_invalid()),
            other => panic!("expected a formula field, got {other:?}"),
        }
        assert!(schema.dependencies_of(total).is_empty());
    }
}
