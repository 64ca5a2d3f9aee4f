use gridbase_schema::{Field, FieldDependency, FieldId, FieldLookupCache, SchemaStore, TableId};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use thiserror::Error;

use crate::ast::node::{ExprKind, Expression};

/// What the bounded cycle walk assumes when the reference chain is deeper
/// than the configured limit.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CyclePolicy {
    /// Reject the formula, the chain might loop back.
    AssumeCyclic,
    /// Accept the formula, deep chains are trusted to terminate.
    AssumeAcyclic,
}

#[derive(Error, Debug, PartialEq)]
pub enum DependencyError {
    #[error("the formula would create a circular reference via field {0}")]
    CircularReference(SmolStr),
    #[error("the reference chain exceeds the maximum depth of {0} and was assumed to be circular")]
    DepthExceeded(usize),
}

/// Collects the field dependency edges of an expression. A reference to a
/// link row field depends on the related table's primary field through the
/// link, a lookup depends on its target through its relation.
pub fn field_dependencies<T>(
    expr: &Expression<T>,
    table: TableId,
    cache: &FieldLookupCache,
) -> FxHashSet<FieldDependency> {
    let mut deps = FxHashSet::default();
    collect(expr, table, cache, &mut deps);
    deps
}

fn collect<T>(
    expr: &Expression<T>,
    table: TableId,
    cache: &FieldLookupCache,
    deps: &mut FxHashSet<FieldDependency>,
) {
    match &expr.kind {
        ExprKind::FieldReference(name) => {
            let linked_primary = cache
                .lookup_by_name(table, name)
                .and_then(|field| field.link_row_table())
                .map(|target| {
                    cache
                        .primary_field(target)
                        .map(|primary| primary.name.clone())
                        .unwrap_or_else(|| SmolStr::new("unknown"))
                });

            match linked_primary {
                Some(primary) => {
                    deps.insert(FieldDependency::through(name, &primary));
                }
                None => {
                    deps.insert(FieldDependency::direct(name));
                }
            }
        }
        ExprKind::LookupReference { through, target } => {
            deps.insert(FieldDependency::through(through, target));
        }
        ExprKind::FunctionCall { args, .. } => {
            for arg in args {
                collect(arg, table, cache, deps);
            }
        }
        _ => {}
    }
}

/// Checks that attaching `new_edges` to `field` keeps the same-table value
/// graph acyclic, walking stored dependency edges up to `max_depth` hops.
pub fn check_for_cycles(
    store: &dyn SchemaStore,
    field: &Field,
    new_edges: &[FieldDependency],
    max_depth: usize,
    policy: CyclePolicy,
) -> Result<(), DependencyError> {
    let mut seen: FxHashSet<FieldId> = FxHashSet::default();

    for edge in new_edges.iter().filter(|edge| edge.via.is_none()) {
        walk(store, field, &edge.field, 1, max_depth, policy, &mut seen)?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk(
    store: &dyn SchemaStore,
    origin: &Field,
    name: &SmolStr,
    depth: usize,
    max_depth: usize,
    policy: CyclePolicy,
    seen: &mut FxHashSet<FieldId>,
) -> Result<(), DependencyError> {
    if *name == origin.name {
        return Err(DependencyError::CircularReference(name.clone()));
    }

    if depth > max_depth {
        return match policy {
            CyclePolicy::AssumeCyclic => Err(DependencyError::DepthExceeded(max_depth)),
            CyclePolicy::AssumeAcyclic => Ok(()),
        };
    }

    let field = match store.field_by_name(origin.table, name) {
        Some(field) => field,
        // Unresolved references become Invalid types, never cycles.
        None => return Ok(()),
    };

    if !seen.insert(field.id) {
        return Ok(());
    }

    for edge in store.dependencies_of(field.id) {
        if edge.via.is_none() {
            walk(store, origin, &edge.field, depth + 1, max_depth, policy, seen)?;
        }
    }

    Ok(())
}
