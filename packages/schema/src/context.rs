//! Context data for dynamic option sources.
//!
//! Schemas never embed live data. A field declaring `options_source: "@categories"`
//! is populated at form-resolution time from whatever the provider returns for
//! `categories`. Providers are queried on every resolution.

use crate::field::SelectOption;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Supplies option lists for `options_source` references
pub trait ContextProvider: Send + Sync {
    /// Options for a source key (without the `@`), `None` when unknown
    fn options(&self, source: &str) -> Option<Vec<SelectOption>>;
}

/// In-memory key → option-list map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextData {
    entries: BTreeMap<String, Vec<SelectOption>>,
}

impl ContextData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, options: Vec<SelectOption>) {
        self.entries.insert(source.into(), options);
    }

    pub fn with(mut self, source: impl Into<String>, options: Vec<SelectOption>) -> Self {
        self.insert(source, options);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl ContextProvider for ContextData {
    fn options(&self, source: &str) -> Option<Vec<SelectOption>> {
        self.entries.get(source).cloned()
    }
}

/// Provider that knows nothing; every dynamic source resolves empty
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl ContextProvider for NoContext {
    fn options(&self, _source: &str) -> Option<Vec<SelectOption>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_data_from_json() {
        let ctx = ContextData::from_json(
            r#"{ "categories": [ { "value": 1, "label": "News" }, "Events" ] }"#,
        )
        .unwrap();

        let categories = ctx.options("categories").unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].value, "1");
        assert_eq!(categories[1].label, "Events");
        assert!(ctx.options("tags").is_none());
    }

    #[test]
    fn test_no_context_is_empty() {
        assert!(NoContext.options("categories").is_none());
    }
}
