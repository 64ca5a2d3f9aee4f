use smol_str::SmolStr;

use crate::number::Number;
use crate::range::Range;

/// Parse tree produced by [`Parser`](super::parser::Parser). Still refers to
/// fields and functions by name, nothing has been resolved yet.
#[derive(PartialEq, Debug, Clone)]
pub struct SyntaxNode {
    pub range: Range,
    pub kind: SyntaxKind,
}

#[derive(PartialEq, Debug, Clone)]
pub enum SyntaxKind {
    StringLiteral(String),
    IntegerLiteral(i64),
    DecimalLiteral { value: Number, scale: u8 },
    BooleanLiteral(bool),
    FieldReference(SmolStr),
    FieldByIdReference(i64),
    LookupReference { through: SmolStr, target: SmolStr },
    FunctionCall { name: SmolStr, args: Vec<SyntaxNode> },
    BinaryOp { op: BinaryOperator, left: Box<SyntaxNode>, right: Box<SyntaxNode> },
    Parenthesized(Box<SyntaxNode>),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOperator {
    Add,
    Minus,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl BinaryOperator {
    /// Name of the builtin function the operator desugars to.
    pub fn function_name(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "add",
            BinaryOperator::Minus => "minus",
            BinaryOperator::Multiply => "multiply",
            BinaryOperator::Divide => "divide",
            BinaryOperator::Equal => "equal",
            BinaryOperator::NotEqual => "not_equal",
            BinaryOperator::GreaterThan => "greater_than",
            BinaryOperator::GreaterThanOrEqual => "greater_than_or_equal",
            BinaryOperator::LessThan => "less_than",
            BinaryOperator::LessThanOrEqual => "less_than_or_equal",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
        }
    }
}
