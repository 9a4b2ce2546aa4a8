//! JSONPath subset: `$`, `.key`, `['key']`, `[n]`, `[*]`, `.*`, `..key`, `..*`.

use std::fmt;

use serde_json::Value;
use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, delimited, opt, preceded, repeat};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::error::SourceError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Child(String),
    Index(usize),
    Wildcard,
    Descendant(String),
    DescendantWildcard,
}

/// Concrete step from a document root to one matched node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    source: String,
    selectors: Vec<Selector>,
}

impl JsonPath {
    pub fn parse(source: &str) -> Result<Self, SourceError> {
        let mut remaining = source.trim();
        let parsed = path.parse_next(&mut remaining);
        match parsed {
            Ok(selectors) if remaining.is_empty() => Ok(Self {
                source: source.trim().to_string(),
                selectors,
            }),
            Ok(_) => Err(SourceError::InvalidLocation(format!(
                "jsonpath {source:?}: unexpected input {remaining:?}"
            ))),
            Err(err) => Err(SourceError::InvalidLocation(format!(
                "jsonpath {source:?}: {}",
                err.to_string().replace('\n', "; ")
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Step paths of every node matched in `document`, in document order.
    pub fn resolve(&self, document: &Value) -> Vec<Vec<Step>> {
        let mut current: Vec<(Vec<Step>, &Value)> = vec![(Vec::new(), document)];
        for selector in &self.selectors {
            let mut next = Vec::new();
            for (steps, node) in current {
                match selector {
                    Selector::Child(key) => {
                        if let Some(child) = node.get(key.as_str()) {
                            next.push((extend(&steps, Step::Key(key.clone())), child));
                        }
                    }
                    Selector::Index(index) => {
                        if let Some(child) = node.as_array().and_then(|items| items.get(*index)) {
                            next.push((extend(&steps, Step::Index(*index)), child));
                        }
                    }
                    Selector::Wildcard => children(&steps, node, &mut next),
                    Selector::Descendant(key) => {
                        let mut nodes = vec![(steps.clone(), node)];
                        descendants(&steps, node, &mut nodes);
                        for (steps, node) in nodes {
                            if let Some(child) = node.as_object().and_then(|map| map.get(key)) {
                                next.push((extend(&steps, Step::Key(key.clone())), child));
                            }
                        }
                    }
                    Selector::DescendantWildcard => descendants(&steps, node, &mut next),
                }
            }
            current = next;
        }
        current.into_iter().map(|(steps, _)| steps).collect()
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

pub fn get_mut<'a>(document: &'a mut Value, steps: &[Step]) -> Option<&'a mut Value> {
    steps.iter().try_fold(document, |node, step| match step {
        Step::Key(key) => node.get_mut(key.as_str()),
        Step::Index(index) => node.get_mut(*index),
    })
}

pub fn get<'a>(document: &'a Value, steps: &[Step]) -> Option<&'a Value> {
    steps.iter().try_fold(document, |node, step| match step {
        Step::Key(key) => node.get(key.as_str()),
        Step::Index(index) => node.get(*index),
    })
}

fn extend(steps: &[Step], step: Step) -> Vec<Step> {
    let mut steps = steps.to_vec();
    steps.push(step);
    steps
}

fn children<'a>(steps: &[Step], node: &'a Value, out: &mut Vec<(Vec<Step>, &'a Value)>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                out.push((extend(steps, Step::Key(key.clone())), child));
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                out.push((extend(steps, Step::Index(index)), child));
            }
        }
        _ => {}
    }
}

/// Pre-order walk below `node`, excluding `node` itself.
fn descendants<'a>(steps: &[Step], node: &'a Value, out: &mut Vec<(Vec<Step>, &'a Value)>) {
    let mut direct = Vec::new();
    children(steps, node, &mut direct);
    for (child_steps, child) in direct {
        out.push((child_steps.clone(), child));
        descendants(&child_steps, child, out);
    }
}

fn path(input: &mut &str) -> ModalResult<Vec<Selector>> {
    let rooted = opt('$').parse_next(input)?.is_some();
    let mut selectors = Vec::new();
    if !rooted {
        if let Some(first) = opt(member_name).parse_next(input)? {
            selectors.push(Selector::Child(first));
        }
    }
    let rest: Vec<Selector> = repeat(0.., selector).parse_next(input)?;
    selectors.extend(rest);
    Ok(selectors)
}

fn selector(input: &mut &str) -> ModalResult<Selector> {
    alt((
        preceded(
            "..",
            cut_err(alt((
                '*'.value(Selector::DescendantWildcard),
                member_name.map(Selector::Descendant),
            )))
            .context(StrContext::Label("descendant name")),
        ),
        preceded(
            '.',
            cut_err(alt(('*'.value(Selector::Wildcard), member_name.map(Selector::Child))))
                .context(StrContext::Label("member name")),
        ),
        delimited(
            '[',
            cut_err(delimited(ws, bracket, ws)).context(StrContext::Label("bracket selector")),
            cut_err(']').context(StrContext::Expected(StrContextValue::CharLiteral(']'))),
        ),
    ))
    .parse_next(input)
}

fn bracket(input: &mut &str) -> ModalResult<Selector> {
    alt((
        '*'.value(Selector::Wildcard),
        quoted.map(|key: &str| Selector::Child(key.to_string())),
        digit1.try_map(|digits: &str| digits.parse::<usize>().map(Selector::Index)),
    ))
    .parse_next(input)
}

fn quoted<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    alt((
        delimited('\'', take_while(0.., |c: char| c != '\''), '\''),
        delimited('"', take_while(0.., |c: char| c != '"'), '"'),
    ))
    .parse_next(input)
}

fn member_name(input: &mut &str) -> ModalResult<String> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '-')
        .map(str::to_string)
        .parse_next(input)
}

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matches(path: &str, document: &Value) -> Vec<Value> {
        let path = JsonPath::parse(path).unwrap();
        path.resolve(document)
            .iter()
            .filter_map(|steps| get(document, steps).cloned())
            .collect()
    }

    #[test]
    fn child_index_and_wildcard() {
        let doc = json!({"people": [{"name": "Ann"}, {"name": "Bob"}], "count": 2});
        assert_eq!(matches("$.count", &doc), vec![json!(2)]);
        assert_eq!(matches("$.people[1].name", &doc), vec![json!("Bob")]);
        assert_eq!(
            matches("$.people[*].name", &doc),
            vec![json!("Ann"), json!("Bob")]
        );
        assert_eq!(matches("$['people'][0]['name']", &doc), vec![json!("Ann")]);
        assert_eq!(matches("people[0].name", &doc), vec![json!("Ann")]);
        assert!(matches("$.people[5].name", &doc).is_empty());
    }

    #[test]
    fn descendant_search_is_in_document_order() {
        let doc = json!({
            "name": "root",
            "team": {"lead": {"name": "Cy"}, "members": [{"name": "Di"}]}
        });
        assert_eq!(
            matches("$..name", &doc),
            vec![json!("root"), json!("Cy"), json!("Di")]
        );
        assert_eq!(matches("$.team.*", &doc).len(), 2);
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["$.", "$[", "$['x'", "$[abc]", "$..", "$ x"] {
            assert!(JsonPath::parse(bad).is_err(), "{bad} should fail");
        }
    }
}
