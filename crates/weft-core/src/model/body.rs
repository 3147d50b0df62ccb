//! Abstract body fragments.
//!
//! The weaver never produces concrete tokens. Bodies are small statement and
//! expression trees carrying markers (`Proceed`, `Parameter`, `ChainCall`,
//! `Forward`) that the print boundary resolves at emission time.

use std::convert::Infallible;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::declaration::{Accessor, DeclarationKey};

/// Arena index of a chain element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainElementId(pub u32);

impl fmt::Display for ChainElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    This,
    /// Template parameter, bound during expansion
    Parameter(String),
    Member {
        object: Box<Expression>,
        name: String,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Binary {
        op: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Invoke the previous implementation; `None` forwards the accessor's
    /// own parameters
    Proceed { arguments: Option<Vec<Expression>> },
    /// A resolved proceed: invoke a specific chain element
    ChainCall {
        element: ChainElementId,
        accessor: Accessor,
        arguments: Vec<Expression>,
    },
    /// Redirected behavior: invoke an accessor of another declaration
    Forward {
        target: DeclarationKey,
        accessor: Accessor,
        arguments: Vec<Expression>,
    },
}

impl Expression {
    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expression::Parameter(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Expression::Literal(Literal::Integer(value))
    }

    pub fn proceed() -> Self {
        Expression::Proceed { arguments: None }
    }

    /// Call a free function or method by name
    pub fn call(name: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Expression::Call {
            callee: Box::new(Expression::Identifier(name.into())),
            arguments,
        }
    }

    pub fn binary(op: impl Into<String>, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Rewrite this tree bottom-up, children first
    pub fn try_rewrite<E, F>(self, f: &mut F) -> Result<Expression, E>
    where
        F: FnMut(Expression) -> Result<Expression, E>,
    {
        let rebuilt = match self {
            Expression::Member { object, name } => Expression::Member {
                object: Box::new(object.try_rewrite(f)?),
                name,
            },
            Expression::Call { callee, arguments } => Expression::Call {
                callee: Box::new(callee.try_rewrite(f)?),
                arguments: rewrite_all(arguments, f)?,
            },
            Expression::Binary { op, left, right } => Expression::Binary {
                op,
                left: Box::new(left.try_rewrite(f)?),
                right: Box::new(right.try_rewrite(f)?),
            },
            Expression::Proceed { arguments } => Expression::Proceed {
                arguments: arguments.map(|args| rewrite_all(args, f)).transpose()?,
            },
            Expression::ChainCall {
                element,
                accessor,
                arguments,
            } => Expression::ChainCall {
                element,
                accessor,
                arguments: rewrite_all(arguments, f)?,
            },
            Expression::Forward {
                target,
                accessor,
                arguments,
            } => Expression::Forward {
                target,
                accessor,
                arguments: rewrite_all(arguments, f)?,
            },
            leaf => leaf,
        };
        f(rebuilt)
    }

    /// Whether any node of this tree satisfies `predicate`
    pub fn any(&self, predicate: &dyn Fn(&Expression) -> bool) -> bool {
        if predicate(self) {
            return true;
        }
        match self {
            Expression::Member { object, .. } => object.any(predicate),
            Expression::Call { callee, arguments } => {
                callee.any(predicate) || arguments.iter().any(|a| a.any(predicate))
            }
            Expression::Binary { left, right, .. } => left.any(predicate) || right.any(predicate),
            Expression::Proceed {
                arguments: Some(arguments),
            }
            | Expression::ChainCall { arguments, .. }
            | Expression::Forward { arguments, .. } => arguments.iter().any(|a| a.any(predicate)),
            _ => false,
        }
    }
}

fn rewrite_all<E, F>(expressions: Vec<Expression>, f: &mut F) -> Result<Vec<Expression>, E>
where
    F: FnMut(Expression) -> Result<Expression, E>,
{
    expressions.into_iter().map(|e| e.try_rewrite(f)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    Expression(Expression),
    Return(Option<Expression>),
    Assign {
        target: Expression,
        value: Expression,
    },
    Declare {
        name: String,
        value: Expression,
    },
    If {
        condition: Expression,
        then_branch: Vec<Statement>,
        #[serde(default)]
        else_branch: Option<Vec<Statement>>,
    },
    Comment(String),
}

impl Statement {
    pub fn expr(expression: Expression) -> Self {
        Statement::Expression(expression)
    }

    pub fn ret(expression: Expression) -> Self {
        Statement::Return(Some(expression))
    }

    pub fn try_rewrite<E, F>(self, f: &mut F) -> Result<Statement, E>
    where
        F: FnMut(Expression) -> Result<Expression, E>,
    {
        Ok(match self {
            Statement::Expression(e) => Statement::Expression(e.try_rewrite(f)?),
            Statement::Return(e) => Statement::Return(e.map(|e| e.try_rewrite(f)).transpose()?),
            Statement::Assign { target, value } => Statement::Assign {
                target: target.try_rewrite(f)?,
                value: value.try_rewrite(f)?,
            },
            Statement::Declare { name, value } => Statement::Declare {
                name,
                value: value.try_rewrite(f)?,
            },
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => Statement::If {
                condition: condition.try_rewrite(f)?,
                then_branch: rewrite_statements(then_branch, f)?,
                else_branch: else_branch
                    .map(|stmts| rewrite_statements(stmts, f))
                    .transpose()?,
            },
            Statement::Comment(text) => Statement::Comment(text),
        })
    }

    pub fn any(&self, predicate: &dyn Fn(&Expression) -> bool) -> bool {
        match self {
            Statement::Expression(e) => e.any(predicate),
            Statement::Return(e) => e.as_ref().is_some_and(|e| e.any(predicate)),
            Statement::Assign { target, value } => target.any(predicate) || value.any(predicate),
            Statement::Declare { value, .. } => value.any(predicate),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.any(predicate)
                    || then_branch.iter().any(|s| s.any(predicate))
                    || else_branch
                        .as_ref()
                        .is_some_and(|b| b.iter().any(|s| s.any(predicate)))
            }
            Statement::Comment(_) => false,
        }
    }
}

fn rewrite_statements<E, F>(statements: Vec<Statement>, f: &mut F) -> Result<Vec<Statement>, E>
where
    F: FnMut(Expression) -> Result<Expression, E>,
{
    statements.into_iter().map(|s| s.try_rewrite(f)).collect()
}

/// A sequence of statements forming (part of) a body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyFragment {
    pub statements: Vec<Statement>,
}

impl BodyFragment {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn try_rewrite<E, F>(self, f: &mut F) -> Result<BodyFragment, E>
    where
        F: FnMut(Expression) -> Result<Expression, E>,
    {
        Ok(BodyFragment {
            statements: rewrite_statements(self.statements, f)?,
        })
    }

    pub fn rewrite<F>(self, mut f: F) -> BodyFragment
    where
        F: FnMut(Expression) -> Expression,
    {
        let result: Result<BodyFragment, Infallible> = self.try_rewrite(&mut |e| Ok(f(e)));
        match result {
            Ok(body) => body,
            Err(never) => match never {},
        }
    }

    pub fn any(&self, predicate: &dyn Fn(&Expression) -> bool) -> bool {
        self.statements.iter().any(|s| s.any(predicate))
    }

    pub fn contains_proceed(&self) -> bool {
        self.any(&|e| matches!(e, Expression::Proceed { .. }))
    }

    /// Insert statements before the existing ones
    pub fn prepend(&mut self, statements: Vec<Statement>) {
        self.statements.splice(0..0, statements);
    }
}

impl From<Vec<Statement>> for BodyFragment {
    fn from(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}
