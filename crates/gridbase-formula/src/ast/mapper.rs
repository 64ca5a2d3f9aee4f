use smol_str::SmolStr;
use thiserror::Error;

use crate::functions::{ArgCount, FunctionRegistry};
use crate::range::Range;

use super::node::{Args, Expression, Untyped};
use super::syntax::{SyntaxKind, SyntaxNode};

#[derive(Error, Debug, PartialEq)]
pub enum MapError {
    #[error("{name} is not a valid function")]
    UnknownFunction { name: SmolStr, range: Range },
    #[error("{actual} arguments were given to the {function}, it must instead be given {expected}")]
    InvalidArgumentCount {
        function: String,
        expected: ArgCount,
        actual: usize,
        range: Range,
    },
    #[error("field_by_id references are no longer supported, use field('name') instead")]
    FieldByIdReferencesAreDeprecated(Range),
    #[error("The formula is too large to be parsed")]
    FormulaTooLarge,
    #[error("A string literal was larger than the maximum allowed size of {max} characters")]
    StringLiteralTooLarge { max: usize, range: Range },
}

/// Maps the parse tree into an untyped [`Expression`], resolving function
/// names against the registry and desugaring binary operators into their
/// function call form.
pub struct Mapper<'a> {
    registry: &'a FunctionRegistry,
    allow_internal: bool,
    max_depth: usize,
    max_string_literal: usize,
}

impl<'a> Mapper<'a> {
    pub fn new(
        registry: &'a FunctionRegistry,
        allow_internal: bool,
        max_depth: usize,
        max_string_literal: usize,
    ) -> Self {
        Self {
            registry,
            allow_internal,
            max_depth,
            max_string_literal,
        }
    }

    pub fn to_expression(&self, node: &SyntaxNode) -> Result<Expression<Untyped>, MapError> {
        self.map(node, 0)
    }

    fn map(&self, node: &SyntaxNode, depth: usize) -> Result<Expression<Untyped>, MapError> {
        if depth > self.max_depth {
            return Err(MapError::FormulaTooLarge);
        }

        match &node.kind {
            SyntaxKind::StringLiteral(s) => {
                if s.chars().count() > self.max_string_literal {
                    Err(MapError::StringLiteralTooLarge {
                        max: self.max_string_literal,
                        range: node.range.clone(),
                    })
                } else {
                    Ok(Expression::string(s.clone()))
                }
            }
            SyntaxKind::IntegerLiteral(i) => Ok(Expression::integer(*i)),
            SyntaxKind::DecimalLiteral { value, scale } => Ok(Expression::decimal(*value, *scale)),
            SyntaxKind::BooleanLiteral(b) => Ok(Expression::boolean(*b)),
            SyntaxKind::FieldReference(name) => Ok(Expression::field_reference(name.clone())),
            SyntaxKind::FieldByIdReference(_) => Err(MapError::FieldByIdReferencesAreDeprecated(
                node.range.clone(),
            )),
            SyntaxKind::LookupReference { through, target } => {
                Ok(Expression::lookup_reference(through.clone(), target.clone()))
            }
            SyntaxKind::FunctionCall { name, args } => {
                let arg_refs: Vec<&SyntaxNode> = args.iter().collect();
                self.map_call(&name.to_ascii_lowercase(), &arg_refs, &node.range, depth)
            }
            SyntaxKind::BinaryOp { op, left, right } => {
                self.map_call(
                    op.function_name(),
                    &[left.as_ref(), right.as_ref()],
                    &node.range,
                    depth,
                )
            }
            SyntaxKind::Parenthesized(inner) => self.map(inner, depth + 1),
        }
    }

    fn map_call(
        &self,
        name: &str,
        args: &[&SyntaxNode],
        range: &Range,
        depth: usize,
    ) -> Result<Expression<Untyped>, MapError> {
        let def = self
            .registry
            .get(name)
            .filter(|def| self.allow_internal || !def.internal())
            .ok_or_else(|| MapError::UnknownFunction {
                name: SmolStr::new(name),
                range: range.clone(),
            })?;

        if !def.num_args().test(args.len()) {
            return Err(MapError::InvalidArgumentCount {
                function: def.description(),
                expected: def.num_args(),
                actual: args.len(),
                range: range.clone(),
            });
        }

        let mapped: Args<Untyped> = args
            .iter()
            .map(|arg| self.map(arg, depth + 1))
            .collect::<Result<_, _>>()?;

        Ok(Expression::call(def, mapped))
    }
}
