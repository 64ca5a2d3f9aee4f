pub mod error;
pub mod mapper;
pub mod node;
pub mod parser;
pub mod syntax;

pub use error::ParseError;
pub use mapper::{MapError, Mapper};
pub use node::{
    Args, ExprKind, Expression, PendingJoin, PendingJoins, TypedExpression, Untyped,
};
pub use parser::Parser;
pub use syntax::{BinaryOperator, SyntaxKind, SyntaxNode};
