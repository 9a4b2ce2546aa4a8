//! Data-source adapters: they read a source, feed each configured scalar
//! through the [`datamask_engine::SubstitutionEngine`] and write the result.

pub mod adapter;
pub mod csv;
pub mod error;
pub mod field;
pub mod json;
pub mod sql;
pub mod xml;

pub use adapter::{
    DEFAULT_OUTPUT_SUFFIX, FileOptions, SourceAdapter, SourceKind, SourceReport, encoding_for_label,
};
pub use csv::{CsvOptions, CsvSource};
pub use error::SourceError;
pub use field::{ColumnRef, FieldLocation, FieldSpec};
pub use json::{JsonPath, JsonSource};
pub use sql::SqlSource;
pub use xml::{Namespaces, XPath, XmlSource};
