use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TableId(pub u64);

impl Display for TableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TableId {
    fn from(value: u64) -> Self {
        TableId(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: TableId,
    pub name: SmolStr,
}

impl Table {
    pub fn new(id: TableId, name: &str) -> Self {
        Self {
            id,
            name: SmolStr::new(name),
        }
    }
}
