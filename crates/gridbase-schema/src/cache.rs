use std::cell::RefCell;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{Field, FieldId, SchemaStore, TableId};

/// Memoizes `(table, field name)` lookups against a [`SchemaStore`] for the
/// duration of one typing or codegen operation. The cache is owned by the
/// operation that created it and discarded afterwards; it must never be
/// shared across operations, or it would serve stale fields.
pub struct FieldLookupCache<'a> {
    store: &'a dyn SchemaStore,
    by_name: RefCell<FxHashMap<(TableId, SmolStr), Option<FieldId>>>,
}

impl<'a> FieldLookupCache<'a> {
    pub fn new(store: &'a dyn SchemaStore) -> Self {
        Self {
            store,
            by_name: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn store(&self) -> &'a dyn SchemaStore {
        self.store
    }

    pub fn lookup_by_name(&self, table: TableId, name: &str) -> Option<&'a Field> {
        let key = (table, SmolStr::new(name));
        let cached = self.by_name.borrow().get(&key).copied();
        match cached {
            Some(hit) => hit.and_then(|id| self.store.field(id)),
            None => {
                let found = self.store.field_by_name(table, name);
                self.by_name
                    .borrow_mut()
                    .insert(key, found.map(|f| f.id));
                found
            }
        }
    }

    pub fn primary_field(&self, table: TableId) -> Option<&'a Field> {
        self.store.primary_field(table)
    }
}
