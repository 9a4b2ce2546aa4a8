//! Template parser using winnow.
//!
//! Grammar, loosest binding first:
//! - `concat  := filtered ('~' filtered)*`
//! - `filtered := postfix ('|' ident call_args?)*`
//! - `postfix := primary ('.' ident | '[' expr ']' | call_args)*`
//! - `primary := string | number | none | ident | '(' expr ')'`
//!
//! `{# ... #}` comments and `{% ... %}` statements are rejected.

use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, delimited, fail, opt, peek, preceded, repeat, separated};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use datamask_core::Scalar;

use super::ast::{Expr, Segment, Template};
use super::error::TemplateError;

/// Parse a template string into an AST.
pub fn parse_template(source: &str) -> Result<Template, TemplateError> {
    let mut remaining = source;
    match segments(&mut remaining) {
        Ok(segments) if remaining.is_empty() => Ok(Template {
            source: source.to_string(),
            segments,
        }),
        Ok(_) => {
            let message = format!(
                "unexpected character: '{}'",
                remaining.chars().next().unwrap_or('?')
            );
            Err(syntax_error(source, remaining, message))
        }
        Err(err) => Err(syntax_error(source, remaining, describe(&err))),
    }
}

fn syntax_error(source: &str, remaining: &str, message: String) -> TemplateError {
    let (line, column) = calculate_position(source, remaining);
    TemplateError::Syntax {
        template: source.to_string(),
        line,
        column,
        message,
    }
}

fn describe(err: &ErrMode<ContextError>) -> String {
    match err {
        ErrMode::Backtrack(inner) | ErrMode::Cut(inner) => {
            let message = inner.to_string();
            if message.is_empty() {
                "invalid syntax".to_string()
            } else {
                message.replace('\n', "; ")
            }
        }
        ErrMode::Incomplete(_) => "incomplete input".to_string(),
    }
}

/// 1-based line and character column of `remaining` within `original`.
fn calculate_position(original: &str, remaining: &str) -> (usize, usize) {
    let consumed = &original[..original.len() - remaining.len()];
    let line = consumed.chars().filter(|&c| c == '\n').count() + 1;
    let line_start = consumed.rfind('\n').map(|pos| pos + 1).unwrap_or(0);
    let column = consumed[line_start..].chars().count() + 1;
    (line, column)
}

fn segments(input: &mut &str) -> ModalResult<Vec<Segment>> {
    let segments: Vec<Segment> = repeat(0.., segment).parse_next(input)?;
    Ok(merge_literals(segments))
}

fn merge_literals(segments: Vec<Segment>) -> Vec<Segment> {
    let mut result = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                if let Some(Segment::Literal(prev)) = result.last_mut() {
                    prev.push_str(&text);
                } else {
                    result.push(Segment::Literal(text));
                }
            }
            other => result.push(other),
        }
    }
    result
}

fn segment(input: &mut &str) -> ModalResult<Segment> {
    alt((
        interpolation,
        unsupported_tag,
        take_while(1.., |c: char| c != '{').map(|text: &str| Segment::Literal(text.to_string())),
        "{".map(|text: &str| Segment::Literal(text.to_string())),
    ))
    .parse_next(input)
}

fn interpolation(input: &mut &str) -> ModalResult<Segment> {
    "{{".parse_next(input)?;
    ws(input)?;
    let expr = cut_err(expression)
        .context(StrContext::Label("expression"))
        .parse_next(input)?;
    ws(input)?;
    cut_err("}}")
        .context(StrContext::Expected(StrContextValue::StringLiteral("}}")))
        .parse_next(input)?;
    Ok(Segment::Expr(expr))
}

fn unsupported_tag(input: &mut &str) -> ModalResult<Segment> {
    peek(alt(("{#", "{%"))).parse_next(input)?;
    cut_err(fail::<_, Segment, _>)
        .context(StrContext::Label("tag (only {{ ... }} interpolations are supported)"))
        .parse_next(input)
}

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

fn expression(input: &mut &str) -> ModalResult<Expr> {
    let mut parts: Vec<Expr> = separated(1.., filtered, (ws, '~', ws)).parse_next(input)?;
    if parts.len() == 1 {
        Ok(parts.remove(0))
    } else {
        Ok(Expr::Concat(parts))
    }
}

fn filtered(input: &mut &str) -> ModalResult<Expr> {
    let base = postfix(input)?;
    let filters: Vec<(&str, Option<Vec<Expr>>)> = repeat(
        0..,
        preceded(
            (ws, '|', ws),
            cut_err((identifier, opt(call_args))).context(StrContext::Label("filter")),
        ),
    )
    .parse_next(input)?;
    Ok(filters.into_iter().fold(base, |expr, (name, args)| {
        Expr::Filter(Box::new(expr), name.to_string(), args.unwrap_or_default())
    }))
}

enum Postfix {
    Attr(String),
    Index(Expr),
    Call(Vec<Expr>),
}

fn postfix(input: &mut &str) -> ModalResult<Expr> {
    let base = primary(input)?;
    let ops: Vec<Postfix> = repeat(0.., postfix_op).parse_next(input)?;
    Ok(ops.into_iter().fold(base, |expr, op| match op {
        Postfix::Attr(name) => Expr::Attr(Box::new(expr), name),
        Postfix::Index(key) => Expr::Index(Box::new(expr), Box::new(key)),
        Postfix::Call(args) => Expr::Call(Box::new(expr), args),
    }))
}

fn postfix_op(input: &mut &str) -> ModalResult<Postfix> {
    alt((
        preceded('.', cut_err(identifier).context(StrContext::Label("attribute")))
            .map(|name: &str| Postfix::Attr(name.to_string())),
        delimited(
            ('[', ws),
            cut_err(expression).context(StrContext::Label("index")),
            cut_err((ws, ']')).context(StrContext::Expected(StrContextValue::CharLiteral(']'))),
        )
        .map(Postfix::Index),
        call_args.map(Postfix::Call),
    ))
    .parse_next(input)
}

fn call_args(input: &mut &str) -> ModalResult<Vec<Expr>> {
    delimited(
        ('(', ws),
        separated(0.., expression, (ws, ',', ws)),
        cut_err((ws, ')')).context(StrContext::Expected(StrContextValue::CharLiteral(')'))),
    )
    .parse_next(input)
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    alt((
        string_literal.map(|text| Expr::Literal(Scalar::Text(text))),
        number_literal.map(Expr::Literal),
        delimited(
            ('(', ws),
            cut_err(expression),
            cut_err((ws, ')')).context(StrContext::Expected(StrContextValue::CharLiteral(')'))),
        ),
        identifier.map(|name: &str| match name {
            "none" | "None" => Expr::Literal(Scalar::Null),
            _ => Expr::Name(name.to_string()),
        }),
    ))
    .parse_next(input)
}

fn string_literal(input: &mut &str) -> ModalResult<String> {
    let quote = one_of(['\'', '"']).parse_next(input)?;
    let mut text = String::new();
    loop {
        let c = cut_err(any)
            .context(StrContext::Label("unterminated string"))
            .parse_next(input)?;
        match c {
            c if c == quote => return Ok(text),
            '\\' => {
                let escaped = cut_err(any)
                    .context(StrContext::Label("unterminated string"))
                    .parse_next(input)?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            other => text.push(other),
        }
    }
}

fn number_literal(input: &mut &str) -> ModalResult<Scalar> {
    alt((
        (opt('-'), digit1, '.', digit1)
            .take()
            .try_map(|text: &str| text.parse::<f64>().map(Scalar::Float)),
        (opt('-'), digit1)
            .take()
            .try_map(|text: &str| text.parse::<i64>().map(Scalar::Integer)),
    ))
    .parse_next(input)
}

fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (one_of(is_ident_start), take_while(0.., is_ident_cont))
        .take()
        .parse_next(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_of(source: &str) -> Expr {
        let template = parse_template(source).unwrap();
        template.sole_expression().cloned().expect("single expression")
    }

    #[test]
    fn literal_only() {
        let template = parse_template("plain text { with a brace").unwrap();
        assert_eq!(
            template.segments,
            vec![Segment::Literal("plain text { with a brace".to_string())]
        );
    }

    #[test]
    fn mixed_segments() {
        let template = parse_template("{{ row['first'] }}@example.com").unwrap();
        assert_eq!(template.segments.len(), 2);
        assert_eq!(
            template.segments[1],
            Segment::Literal("@example.com".to_string())
        );
        assert!(template.sole_expression().is_none());
    }

    #[test]
    fn index_and_attr() {
        assert_eq!(
            expr_of("{{ row['first'] }}"),
            Expr::Index(
                Box::new(Expr::Name("row".to_string())),
                Box::new(Expr::Literal(Scalar::text("first")))
            )
        );
        assert_eq!(
            expr_of("{{env.HOME}}"),
            Expr::Attr(Box::new(Expr::Name("env".to_string())), "HOME".to_string())
        );
    }

    #[test]
    fn calls_filters_and_concat() {
        let expr = expr_of("{{ gen.last_name(value) | upper ~ '-' ~ int('7') }}");
        let Expr::Concat(parts) = expr else {
            panic!("expected concat");
        };
        assert_eq!(parts.len(), 3);
        assert!(
            matches!(&parts[0], Expr::Filter(_, name, args) if name == "upper" && args.is_empty())
        );
        assert!(matches!(&parts[2], Expr::Call(_, args) if args.len() == 1));
    }

    #[test]
    fn literals() {
        assert_eq!(expr_of("{{ 42 }}"), Expr::Literal(Scalar::Integer(42)));
        assert_eq!(expr_of("{{ -1.5 }}"), Expr::Literal(Scalar::Float(-1.5)));
        assert_eq!(expr_of("{{ none }}"), Expr::Literal(Scalar::Null));
        assert_eq!(
            expr_of(r#"{{ "a\"b" }}"#),
            Expr::Literal(Scalar::text("a\"b"))
        );
    }

    #[test]
    fn filter_with_arguments() {
        let expr = expr_of("{{ row.x | default('n/a') }}");
        assert!(
            matches!(expr, Expr::Filter(_, name, args) if name == "default" && args.len() == 1)
        );
    }

    #[test]
    fn unclosed_interpolation_is_error() {
        let err = parse_template("hello {{ value ").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { line: 1, .. }));
    }

    #[test]
    fn comments_and_statements_are_rejected() {
        assert!(parse_template("{# note #}").is_err());
        assert!(parse_template("{% if x %}y{% endif %}").is_err());
    }

    #[test]
    fn error_column_points_at_problem() {
        let err = parse_template("ab {{ 'x }}").unwrap_err();
        let TemplateError::Syntax { column, .. } = err else {
            panic!("expected syntax error");
        };
        assert!(column > 3, "column {column}");
    }

    #[test]
    fn empty_interpolation_is_error() {
        assert!(parse_template("{{ }}").is_err());
    }
}
