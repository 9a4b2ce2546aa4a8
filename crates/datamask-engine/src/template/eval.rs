use std::collections::BTreeMap;

use datamask_core::Scalar;

use super::ast::{Expr, Segment, Template};
use super::error::TemplateError;
use super::helpers;
use crate::errors::EngineError;

/// Access to the generator namespace (`gen.<type>`) while rendering.
pub trait GeneratorScope {
    /// Consistent substitute of `value` under generator type `generator`.
    fn generate(&mut self, generator: &str, value: &Scalar) -> Result<Scalar, EngineError>;
}

/// The fixed set of data bindings a template can see.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub value: &'a Scalar,
    pub row: &'a BTreeMap<String, Scalar>,
    pub env: &'a BTreeMap<String, Scalar>,
}

enum Evaluated {
    Scalar(Scalar),
    Row,
    Env,
    Gen,
    Generator(String),
    Helper(String),
}

impl Evaluated {
    fn describe(&self) -> String {
        match self {
            Evaluated::Scalar(value) => format!("value {:?}", value.render()),
            Evaluated::Row => "namespace 'row'".to_string(),
            Evaluated::Env => "namespace 'env'".to_string(),
            Evaluated::Gen => "namespace 'gen'".to_string(),
            Evaluated::Generator(name) => format!("generator 'gen.{name}'"),
            Evaluated::Helper(name) => format!("helper '{name}'"),
        }
    }
}

/// Render `template`. A template made of one interpolation keeps that
/// expression's scalar type; otherwise the output is text. An output of
/// `None` is normalized to null.
pub fn render(
    template: &Template,
    bindings: Bindings<'_>,
    scope: &mut dyn GeneratorScope,
) -> Result<Scalar, EngineError> {
    let mut evaluator = Evaluator {
        template,
        bindings,
        scope,
    };

    if let Some(expr) = template.sole_expression() {
        let value = evaluator.scalar(expr)?;
        return Ok(normalize(value));
    }

    let mut out = String::new();
    for segment in &template.segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expr(expr) => out.push_str(&evaluator.scalar(expr)?.render()),
        }
    }
    Ok(normalize(Scalar::Text(out)))
}

fn normalize(value: Scalar) -> Scalar {
    match value {
        Scalar::Text(text) if text == "None" => Scalar::Null,
        other => other,
    }
}

struct Evaluator<'t, 'b, 's> {
    template: &'t Template,
    bindings: Bindings<'b>,
    scope: &'s mut dyn GeneratorScope,
}

impl Evaluator<'_, '_, '_> {
    fn fail(&self, message: impl Into<String>) -> EngineError {
        EngineError::Template(TemplateError::Render {
            template: self.template.source.clone(),
            message: message.into(),
        })
    }

    fn scalar(&mut self, expr: &Expr) -> Result<Scalar, EngineError> {
        let evaluated = self.eval(expr)?;
        self.into_scalar(evaluated)
    }

    fn into_scalar(&mut self, evaluated: Evaluated) -> Result<Scalar, EngineError> {
        match evaluated {
            Evaluated::Scalar(value) => Ok(value),
            Evaluated::Generator(name) => {
                let value = self.bindings.value;
                self.scope.generate(&name, value)
            }
            other => Err(self.fail(format!("{} cannot be rendered", other.describe()))),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Evaluated, EngineError> {
        match expr {
            Expr::Literal(value) => Ok(Evaluated::Scalar(value.clone())),
            Expr::Name(name) => self.name(name),
            Expr::Attr(base, name) => {
                let base = self.eval(base)?;
                self.member(base, name)
            }
            Expr::Index(base, key) => {
                let base = self.eval(base)?;
                let key = self.scalar(key)?;
                self.index(base, &key)
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let args = self.args(args)?;
                self.call(callee, args)
            }
            Expr::Filter(base, name, args) => {
                if !helpers::is_helper(name) {
                    return Err(self.fail(format!("unknown filter '{name}'")));
                }
                let mut values = Vec::with_capacity(args.len() + 1);
                values.push(self.scalar(base)?);
                values.extend(self.args(args)?);
                self.call(Evaluated::Helper(name.clone()), values)
            }
            Expr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&self.scalar(part)?.render());
                }
                Ok(Evaluated::Scalar(Scalar::Text(out)))
            }
        }
    }

    fn args(&mut self, args: &[Expr]) -> Result<Vec<Scalar>, EngineError> {
        args.iter().map(|arg| self.scalar(arg)).collect()
    }

    fn name(&self, name: &str) -> Result<Evaluated, EngineError> {
        match name {
            "value" => Ok(Evaluated::Scalar(self.bindings.value.clone())),
            "row" => Ok(Evaluated::Row),
            "env" => Ok(Evaluated::Env),
            "gen" => Ok(Evaluated::Gen),
            other if helpers::is_helper(other) => Ok(Evaluated::Helper(other.to_string())),
            other => Err(self.fail(format!("undefined name '{other}'"))),
        }
    }

    fn member(&self, base: Evaluated, name: &str) -> Result<Evaluated, EngineError> {
        match base {
            Evaluated::Row => Ok(Evaluated::Scalar(lookup(self.bindings.row, name))),
            Evaluated::Env => Ok(Evaluated::Scalar(lookup(self.bindings.env, name))),
            Evaluated::Gen => Ok(Evaluated::Generator(name.to_string())),
            other => Err(self.fail(format!(
                "{} has no attribute '{name}'",
                other.describe()
            ))),
        }
    }

    fn index(&self, base: Evaluated, key: &Scalar) -> Result<Evaluated, EngineError> {
        match base {
            Evaluated::Row => Ok(Evaluated::Scalar(lookup(self.bindings.row, &key.to_string()))),
            Evaluated::Env => Ok(Evaluated::Scalar(lookup(self.bindings.env, &key.to_string()))),
            Evaluated::Gen => match key {
                Scalar::Text(name) => Ok(Evaluated::Generator(name.clone())),
                other => Err(self.fail(format!(
                    "generator names must be strings, got {}",
                    other.render()
                ))),
            },
            Evaluated::Scalar(Scalar::Text(text)) => {
                let Some(position) = key.as_i64() else {
                    return Err(self.fail("string index must be an integer"));
                };
                let count = text.chars().count() as i64;
                let position = if position < 0 { count + position } else { position };
                text.chars()
                    .nth(usize::try_from(position).unwrap_or(usize::MAX))
                    .map(|ch| Evaluated::Scalar(Scalar::Text(ch.to_string())))
                    .ok_or_else(|| self.fail(format!("string index {position} out of range")))
            }
            other => Err(self.fail(format!("{} is not indexable", other.describe()))),
        }
    }

    fn call(&mut self, callee: Evaluated, args: Vec<Scalar>) -> Result<Evaluated, EngineError> {
        match callee {
            Evaluated::Generator(name) => {
                let value = match args.as_slice() {
                    [] => self.bindings.value.clone(),
                    [value] => value.clone(),
                    _ => {
                        return Err(self.fail(format!(
                            "gen.{name} takes at most one argument, got {}",
                            args.len()
                        )));
                    }
                };
                self.scope.generate(&name, &value).map(Evaluated::Scalar)
            }
            Evaluated::Helper(name) => helpers::apply(&name, &args)
                .map(Evaluated::Scalar)
                .map_err(|message| self.fail(message)),
            other => Err(self.fail(format!("{} is not callable", other.describe()))),
        }
    }
}

fn lookup(map: &BTreeMap<String, Scalar>, key: &str) -> Scalar {
    map.get(key).cloned().unwrap_or(Scalar::Null)
}
