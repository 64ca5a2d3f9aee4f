//! `gridbase-formula` parses, types and lowers the formula language used by
//! gridbase computed columns.
//!
//! ## Examples
//!
//! ```rs
//! use gridbase_formula::FormulaEngine;
//! use gridbase_schema::{FieldKind, FormulaType, InMemorySchema, SchemaStore};
//!
//! let mut schema = InMemorySchema::new();
//! let table = schema.add_table("items");
//! schema.add_field(table, "Price", FieldKind::Number { decimal_places: 2 });
//! let field = schema.add_field(
//!     table,
//!     "Total",
//!     FieldKind::Formula {
//!         source: "field('Price') * 2".into(),
//!         computed: FormulaType::Number { decimal_places: 2 },
//!     },
//! );
//!
//! let engine = FormulaEngine::default();
//! let field = schema.field(field).unwrap().clone();
//! let checked = engine.check_formula(&schema, &field, "field('Price') * 2").unwrap();
//!
//! assert_eq!(checked.formula_type, FormulaType::Number { decimal_places: 2 });
//! ```

mod ast;
mod codegen;
mod dependencies;
mod engine;
mod error;
mod functions;
mod lexer;
mod number;
mod range;
mod typing;

use error::InnerError;
use lexer::Lexer;

pub use ast::MapError;
pub use ast::ParseError;
pub use ast::mapper::Mapper;
pub use ast::node::{
    Args, ExprKind, Expression, PendingJoin, PendingJoins, TypedExpression, Untyped,
};
pub use ast::parser::Parser as AstParser;
pub use ast::syntax::{BinaryOperator, SyntaxKind, SyntaxNode};
pub use codegen::{Join, TargetExpression, TargetQuery, TargetValue};
pub use dependencies::{CyclePolicy, DependencyError, check_for_cycles, field_dependencies};
pub use engine::{CheckedFormula, FormulaEngine, Limits};
pub use error::Error;
pub use functions::{ArgCount, ArgSpec, FunctionDef, FunctionRegistry, TypeClass};
pub use lexer::error::LexerError;
pub use lexer::token::{Token, TokenKind};
pub use number::Number;
pub use range::{Position, Range};
pub use typing::TypingError;

#[allow(clippy::result_large_err)]
pub fn tokenize(formula: &str) -> Result<Vec<Token>, Error> {
    Lexer::tokenize(formula).map_err(|e| Error::from_error(formula, InnerError::Lexer(e)))
}

#[allow(clippy::result_large_err)]
pub fn parse(formula: &str, max_depth: usize) -> Result<SyntaxNode, Error> {
    let tokens = tokenize(formula)?;
    AstParser::new(&tokens, max_depth)
        .parse()
        .map_err(|e| Error::from_error(formula, InnerError::Parse(e)))
}
