//! Locale-aware text generation on top of the `fake` crate.

mod adapter;
mod locales;

pub use adapter::{FakeRsAdapter, FakerKind};
pub use locales::LocaleKey;
