//! AST for substitution templates.

use datamask_core::Scalar;

/// A parsed template: literal text interleaved with `{{ expr }}` interpolations.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub source: String,
    pub segments: Vec<Segment>,
}

impl Template {
    /// The single expression when the template is exactly one interpolation.
    pub fn sole_expression(&self) -> Option<&Expr> {
        match self.segments.as_slice() {
            [Segment::Expr(expr)] => Some(expr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    Name(String),
    /// `base.name`
    Attr(Box<Expr>, String),
    /// `base[key]`
    Index(Box<Expr>, Box<Expr>),
    /// `callee(args...)`
    Call(Box<Expr>, Vec<Expr>),
    /// `base | filter(args...)`; the base becomes the filter's first argument.
    Filter(Box<Expr>, String, Vec<Expr>),
    /// `a ~ b ~ c`
    Concat(Vec<Expr>),
}
