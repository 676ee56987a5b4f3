//! Route entries.
//!
//! An entry pairs a template (plus optional constraint) with the handler it
//! dispatches to. Entries are immutable once built and shared as
//! `Arc<RouteEntry>`; two entries are "the same" only if they are the same
//! allocation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::handler::RequestHandler;
use crate::routing::constraint::RouteConstraint;
use crate::routing::template::{RouteTemplate, TemplateError};

/// Data token key holding the compiled handler method id.
pub const HANDLER_ID_TOKEN: &str = "handler_id";

/// Opaque key/value metadata attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataTokens(BTreeMap<String, Value>);

impl DataTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The compiled handler id, if this entry came from the handler compiler.
    pub fn handler_id(&self) -> Option<&str> {
        self.get(HANDLER_ID_TOKEN).and_then(Value::as_str)
    }

    /// Copy every token of `other` over this set.
    pub fn merge(&mut self, other: &DataTokens) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One routable (template, constraint, target) triple.
pub struct RouteEntry {
    template: RouteTemplate,
    constraint: Option<Arc<dyn RouteConstraint>>,
    name: Option<String>,
    data_tokens: DataTokens,
    target: Arc<dyn RequestHandler>,
}

impl RouteEntry {
    pub fn builder(template: &str, target: Arc<dyn RequestHandler>) -> Result<RouteEntryBuilder, TemplateError> {
        Ok(RouteEntryBuilder {
            template: RouteTemplate::parse(template)?,
            constraint: None,
            name: None,
            data_tokens: DataTokens::new(),
            target,
        })
    }

    pub fn template(&self) -> &RouteTemplate {
        &self.template
    }

    pub fn constraint(&self) -> Option<&Arc<dyn RouteConstraint>> {
        self.constraint.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn data_tokens(&self) -> &DataTokens {
        &self.data_tokens
    }

    pub fn target(&self) -> &Arc<dyn RequestHandler> {
        &self.target
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("template", &self.template.as_str())
            .field("constraint", &self.constraint)
            .field("name", &self.name)
            .field("data_tokens", &self.data_tokens)
            .finish_non_exhaustive()
    }
}

pub struct RouteEntryBuilder {
    template: RouteTemplate,
    constraint: Option<Arc<dyn RouteConstraint>>,
    name: Option<String>,
    data_tokens: DataTokens,
    target: Arc<dyn RequestHandler>,
}

impl RouteEntryBuilder {
    pub fn constraint(mut self, constraint: Option<Arc<dyn RouteConstraint>>) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn data_tokens(mut self, tokens: DataTokens) -> Self {
        self.data_tokens = tokens;
        self
    }

    pub fn build(self) -> Arc<RouteEntry> {
        Arc::new(RouteEntry {
            template: self.template,
            constraint: self.constraint,
            name: self.name,
            data_tokens: self.data_tokens,
            target: self.target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_tokens_handler_id() {
        let tokens = DataTokens::new().with(HANDLER_ID_TOKEN, "abc").with("mount", "sys");
        assert_eq!(tokens.handler_id(), Some("abc"));
        assert_eq!(tokens.get("mount"), Some(&Value::from("sys")));

        let mut merged = DataTokens::new().with("mount", "kv");
        merged.merge(&tokens);
        assert_eq!(merged.get("mount"), Some(&Value::from("sys")));
        assert!(DataTokens::new().handler_id().is_none());
    }
}
