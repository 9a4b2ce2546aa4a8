//! XPath subset: `/a/b`, `//b`, `*`, relative `./a` or `a`, trailing `/@attr`.
//!
//! Relative paths start at the root element. A prefixed name test `p:a`
//! matches by namespace URI when `p` is bound in the [`Namespaces`] given to
//! [`XPath::select`], and by its literal qualified name otherwise.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use winnow::combinator::{alt, cut_err, empty, opt, preceded};
use winnow::error::StrContext;
use winnow::prelude::*;
use winnow::token::take_while;

use super::dom::XmlElement;
use crate::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathStep {
    axis: Axis,
    /// `None` matches any element name.
    name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    source: String,
    absolute: bool,
    steps: Vec<PathStep>,
    attribute: Option<String>,
}

/// Position of an element: child indexes from the root element.
pub type ElementPath = Vec<usize>;

/// Prefix to namespace URI bindings for name tests.
pub type Namespaces = BTreeMap<String, String>;

impl XPath {
    pub fn parse(source: &str) -> Result<Self, SourceError> {
        let mut remaining = source.trim();
        match xpath.parse_next(&mut remaining) {
            Ok((absolute, steps, attribute)) if remaining.is_empty() => {
                if absolute && steps.is_empty() {
                    return Err(SourceError::InvalidLocation(format!(
                        "xpath {source:?}: attribute needs an element step"
                    )));
                }
                Ok(Self {
                    source: source.trim().to_string(),
                    absolute,
                    steps,
                    attribute,
                })
            }
            Ok(_) => Err(SourceError::InvalidLocation(format!(
                "xpath {source:?}: unsupported input {remaining:?}"
            ))),
            Err(err) => Err(SourceError::InvalidLocation(format!(
                "xpath {source:?}: {}",
                err.to_string().replace('\n', "; ")
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Attribute targeted by a trailing `/@name`.
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Matched elements in document order, without duplicates.
    pub fn select(&self, root: &XmlElement, namespaces: &Namespaces) -> Vec<ElementPath> {
        // `None` stands for the document node above the root element.
        let mut current: Vec<Option<ElementPath>> = if self.absolute {
            vec![None]
        } else {
            vec![Some(Vec::new())]
        };

        for step in &self.steps {
            let mut seen = HashSet::new();
            let mut next = Vec::new();
            for cursor in &current {
                let mut candidates = Vec::new();
                match step.axis {
                    Axis::Child => children(root, cursor.as_deref(), &mut candidates),
                    Axis::Descendant => descendants(root, cursor.as_deref(), &mut candidates),
                }
                for path in candidates {
                    let matches = root
                        .element_at(&path)
                        .is_some_and(|element| name_matches(&step.name, element, namespaces));
                    if matches && seen.insert(path.clone()) {
                        next.push(Some(path));
                    }
                }
            }
            current = next;
        }
        current.into_iter().flatten().collect()
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn name_matches(test: &Option<String>, element: &XmlElement, namespaces: &Namespaces) -> bool {
    let Some(test) = test.as_deref() else {
        return true;
    };
    if let Some((prefix, local)) = test.split_once(':') {
        if let Some(uri) = namespaces.get(prefix) {
            return element.namespace.as_deref() == Some(uri.as_str())
                && element.local_name() == local;
        }
    }
    test == element.name
}

fn children(root: &XmlElement, cursor: Option<&[usize]>, out: &mut Vec<ElementPath>) {
    let Some(path) = cursor else {
        out.push(Vec::new());
        return;
    };
    if let Some(element) = root.element_at(path) {
        for (index, _) in element.elements() {
            let mut child = path.to_vec();
            child.push(index);
            out.push(child);
        }
    }
}

/// Pre-order walk below the cursor, excluding the cursor itself.
fn descendants(root: &XmlElement, cursor: Option<&[usize]>, out: &mut Vec<ElementPath>) {
    let mut direct = Vec::new();
    children(root, cursor, &mut direct);
    for child in direct {
        out.push(child.clone());
        descendants(root, Some(&child), out);
    }
}

type Parsed = (bool, Vec<PathStep>, Option<String>);

fn xpath(input: &mut &str) -> ModalResult<Parsed> {
    let (absolute, first_axis) = alt((
        ".//".value((false, Axis::Descendant)),
        "./".value((false, Axis::Child)),
        "//".value((true, Axis::Descendant)),
        "/".value((true, Axis::Child)),
        empty.value((false, Axis::Child)),
    ))
    .parse_next(input)?;

    if let Some(attribute) = opt(attribute).parse_next(input)? {
        return Ok((absolute, Vec::new(), Some(attribute)));
    }
    let name = cut_err(name_test)
        .context(StrContext::Label("element name"))
        .parse_next(input)?;
    let mut steps = vec![PathStep {
        axis: first_axis,
        name,
    }];

    while let Some(axis) = opt(alt((
        "//".value(Axis::Descendant),
        "/".value(Axis::Child),
    )))
    .parse_next(input)?
    {
        if let Some(attribute) = opt(attribute).parse_next(input)? {
            return Ok((absolute, steps, Some(attribute)));
        }
        let name = cut_err(name_test)
            .context(StrContext::Label("element name"))
            .parse_next(input)?;
        steps.push(PathStep { axis, name });
    }
    Ok((absolute, steps, None))
}

fn attribute(input: &mut &str) -> ModalResult<String> {
    preceded('@', cut_err(name).context(StrContext::Label("attribute name"))).parse_next(input)
}

fn name_test(input: &mut &str) -> ModalResult<Option<String>> {
    alt(('*'.value(None), name.map(Some))).parse_next(input)
}

fn name(input: &mut &str) -> ModalResult<String> {
    take_while(1.., |c: char| {
        c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
    })
    .map(str::to_string)
    .parse_next(input)
}
