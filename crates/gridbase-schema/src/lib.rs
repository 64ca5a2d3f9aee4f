//! `gridbase-schema` holds the parts of the schema a formula needs to see:
//! tables, fields and their kinds, the [`SchemaStore`] boundary used to
//! resolve references, the per-operation [`FieldLookupCache`], and the
//! persisted [`FormulaType`] / [`FieldDependency`] data.

mod cache;
mod field;
mod store;
mod table;
mod types;

pub use cache::FieldLookupCache;
pub use field::{Field, FieldId, FieldKind, NUMBER_MAX_DECIMAL_PLACES};
pub use store::{FieldDependency, InMemorySchema, SchemaStore};
pub use table::{Table, TableId};
pub use types::FormulaType;
