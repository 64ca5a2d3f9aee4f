use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// The type a formula expression evaluates to. `Invalid` is a first-class
/// member rather than an error: a formula with a type problem still has a
/// storable type and a message the user can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormulaType {
    Invalid { error: String },
    Text,
    Number { decimal_places: u8 },
    Boolean,
    Date { include_time: bool },
    SingleSelect,
    Array { inner: Box<FormulaType> },
}

impl FormulaType {
    pub fn invalid(error: impl Into<String>) -> Self {
        FormulaType::Invalid {
            error: error.into(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, FormulaType::Invalid { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FormulaType::Invalid { error } => Some(error),
            _ => None,
        }
    }

    /// The user-facing name of this type, as shown in type error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FormulaType::Invalid { .. } => "invalid",
            FormulaType::Text => "text",
            FormulaType::Number { .. } => "number",
            FormulaType::Boolean => "boolean",
            FormulaType::Date { .. } => "date",
            FormulaType::SingleSelect => "single_select",
            FormulaType::Array { .. } => "array",
        }
    }
}

impl Display for FormulaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.name())
    }
}
