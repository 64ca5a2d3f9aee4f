use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{FormulaType, TableId};

/// The database can store numbers with at most this many digits after the
/// point, so no formula type may exceed it either.
pub const NUMBER_MAX_DECIMAL_PLACES: u8 = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct FieldId(pub u64);

impl Display for FieldId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FieldId {
    fn from(value: u64) -> Self {
        FieldId(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    LongText,
    Number { decimal_places: u8 },
    Boolean,
    Date { include_time: bool },
    SingleSelect,
    LinkRow { table: TableId },
    Formula { source: String, computed: FormulaType },
}

impl FieldKind {
    pub fn is_link_row(&self) -> bool {
        matches!(self, FieldKind::LinkRow { .. })
    }

    /// The formula type a plain column of this kind contributes to an
    /// expression. Link row fields have no value type of their own (they
    /// surface the related table's primary field instead), so they return
    /// `None` and are resolved by the typing pass.
    pub fn value_type(&self) -> Option<FormulaType> {
        match self {
            FieldKind::Text | FieldKind::LongText => Some(FormulaType::Text),
            FieldKind::Number { decimal_places } => Some(FormulaType::Number {
                decimal_places: *decimal_places,
            }),
            FieldKind::Boolean => Some(FormulaType::Boolean),
            FieldKind::Date { include_time } => Some(FormulaType::Date {
                include_time: *include_time,
            }),
            FieldKind::SingleSelect => Some(FormulaType::SingleSelect),
            FieldKind::Formula { computed, .. } => Some(computed.clone()),
            FieldKind::LinkRow { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: FieldId,
    pub table: TableId,
    pub name: SmolStr,
    pub primary: bool,
    pub kind: FieldKind,
}

impl Field {
    /// The physical column name backing this field.
    pub fn db_column(&self) -> String {
        format!("field_{}", self.id)
    }

    pub fn link_row_table(&self) -> Option<TableId> {
        match self.kind {
            FieldKind::LinkRow { table } => Some(table),
            _ => None,
        }
    }
}
