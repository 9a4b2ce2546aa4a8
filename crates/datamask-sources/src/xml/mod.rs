//! XML documents addressed by XPath.

mod dom;
mod path;

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use datamask_core::Scalar;
use datamask_engine::{RenderContext, SubstitutionEngine};

pub use dom::{XmlDocument, XmlElement, XmlNode, parse_document, write_document};
pub use path::{ElementPath, Namespaces, XPath};

use crate::adapter::{FileOptions, SourceAdapter, SourceKind, SourceReport};
use crate::error::SourceError;
use crate::field::{FieldLocation, FieldSpec};

#[derive(Debug, Clone)]
pub struct XmlSource {
    pub path: PathBuf,
    pub files: FileOptions,
    pub namespaces: Namespaces,
}

impl XmlSource {
    pub fn new(path: impl Into<PathBuf>, files: FileOptions) -> Self {
        Self {
            path: path.into(),
            files,
            namespaces: Namespaces::new(),
        }
    }

    /// Bind prefixes usable in xpath name tests.
    pub fn with_namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = namespaces;
        self
    }

    fn run(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError> {
        let raw = self.files.read(&self.path)?;
        let mut document = parse_document(raw.as_bytes())?;

        let mut carry = RenderContext::new();
        let mut values = 0u64;
        for field in fields {
            let FieldLocation::XPath(xpath) = &field.location else {
                return Err(SourceError::InvalidLocation(format!(
                    "xml source {} cannot address {}",
                    self.path.display(),
                    field.location
                )));
            };
            values += anonymize_element_values(
                engine,
                &mut document.root,
                xpath,
                &self.namespaces,
                field,
                &mut carry,
            )?;
        }

        let target = self.files.write(&self.path, &write_document(&document)?)?;
        debug!(source = %self.path.display(), values, "xml document written");
        Ok(SourceReport {
            source: self.path.display().to_string(),
            kind: SourceKind::Xml,
            values_anonymized: values,
            output: Some(target.display().to_string()),
        })
    }
}

#[async_trait]
impl SourceAdapter for XmlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Xml
    }

    async fn anonymize(
        &self,
        engine: &SubstitutionEngine,
        fields: &[FieldSpec],
    ) -> Result<SourceReport, SourceError> {
        self.run(engine, fields)
    }
}

/// Substitute the text (or attribute) of every element `xpath` selects.
/// Elements without text and missing attributes are skipped.
pub fn anonymize_element_values(
    engine: &SubstitutionEngine,
    root: &mut XmlElement,
    xpath: &XPath,
    namespaces: &Namespaces,
    field: &FieldSpec,
    carry: &mut RenderContext,
) -> Result<u64, SourceError> {
    let mut count = 0;
    for element_path in xpath.select(root, namespaces) {
        let Some(element) = root.element_at(&element_path) else {
            continue;
        };
        let (original, scope) = match xpath.attribute() {
            Some(attribute) => (element.attribute(attribute), Some(element)),
            None => {
                let parent = element_path
                    .split_last()
                    .and_then(|(_, parent)| root.element_at(parent));
                (element.text(), parent)
            }
        };
        let Some(original) = original.map(str::to_string) else {
            continue;
        };

        let mut context = carry.clone();
        if let Some(scope) = scope {
            bind_element(&mut context, scope);
        }
        let substitute = field.apply(engine, &Scalar::Text(original), &context)?;

        if let Some(element) = root.element_at_mut(&element_path) {
            match xpath.attribute() {
                Some(attribute) => element.set_attribute(attribute, substitute.to_string()),
                None => element.set_text(substitute.to_string()),
            }
        }
        carry.insert(xpath.as_str(), substitute);
        count += 1;
    }
    Ok(count)
}

/// Attributes and child element texts become template row keys.
fn bind_element(context: &mut RenderContext, element: &XmlElement) {
    for (key, value) in &element.attributes {
        context.insert(key.clone(), Scalar::text(value.clone()));
    }
    for (_, child) in element.elements() {
        if let Some(text) = child.text() {
            context.insert(child.name.clone(), Scalar::text(text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamask_core::RuleSpec;
    use datamask_engine::EngineOptions;

    fn engine() -> SubstitutionEngine {
        SubstitutionEngine::new(EngineOptions {
            seed: Some(33),
            ..EngineOptions::default()
        })
    }

    fn field(engine: &SubstitutionEngine, xpath: &str, rule: RuleSpec) -> (XPath, FieldSpec) {
        let compiled = XPath::parse(xpath).unwrap();
        let rule = engine.resolve_rule(&rule).unwrap();
        (
            compiled.clone(),
            FieldSpec::new(FieldLocation::XPath(compiled), rule),
        )
    }

    fn apply(
        engine: &SubstitutionEngine,
        document: &mut XmlDocument,
        (xpath, spec): &(XPath, FieldSpec),
        carry: &mut RenderContext,
    ) -> u64 {
        let namespaces = Namespaces::new();
        anonymize_element_values(engine, &mut document.root, xpath, &namespaces, spec, carry)
            .unwrap()
    }

    #[test]
    fn attribute_template_sees_element_children() {
        let engine = engine();
        let mut document = parse_document(
            br#"<people>
                <person id="1"><first>Ann</first></person>
                <person id="2"><first>Bob</first></person>
            </people>"#,
        )
        .unwrap();
        let first = field(&engine, "/people/person/first", RuleSpec::generator("first_name"));
        let id = field(
            &engine,
            "/people/person/@id",
            RuleSpec::template("{{ row.first | upper }}"),
        );
        let mut carry = RenderContext::new();
        let mut total = 0;
        total += apply(&engine, &mut document, &first, &mut carry);
        total += apply(&engine, &mut document, &id, &mut carry);
        assert_eq!(total, 4);

        for (_, person) in document.root.elements() {
            let first = person.elements().next().unwrap().1.text().unwrap();
            assert_ne!(first, "Ann");
            assert_eq!(person.attribute("id"), Some(first.to_uppercase().as_str()));
        }
    }

    #[test]
    fn elements_without_text_are_skipped() {
        let engine = engine();
        let mut document = parse_document(b"<r><n/><n>Zed</n><n a=\"x\"/></r>").unwrap();
        let mut carry = RenderContext::new();
        let text = field(&engine, "/r/n", RuleSpec::generator("last_name"));
        assert_eq!(apply(&engine, &mut document, &text, &mut carry), 1);
        assert!(document.root.element_at(&[0]).unwrap().children.is_empty());

        let attribute = field(&engine, "/r/n/@a", RuleSpec::generator("word"));
        assert_eq!(apply(&engine, &mut document, &attribute, &mut carry), 1);
    }

    #[test]
    fn comments_survive_and_do_not_count_as_text() {
        let engine = engine();
        let mut document = parse_document(
            b"<r><n><!-- keep -->Zed</n><n><!-- only a comment --></n></r>",
        )
        .unwrap();
        let mut carry = RenderContext::new();
        let text = field(&engine, "/r/n", RuleSpec::generator("last_name"));
        assert_eq!(apply(&engine, &mut document, &text, &mut carry), 1);

        let first = document.root.element_at(&[0]).unwrap();
        assert_eq!(first.children[0], XmlNode::Comment(" keep ".to_string()));
        assert_ne!(first.text(), Some("Zed"));
        let second = document.root.element_at(&[1]).unwrap();
        assert_eq!(second.children, vec![XmlNode::Comment(" only a comment ".to_string())]);
    }
}
