//! Route templates.
//!
//! # Responsibilities
//! - Parse slash-separated templates (`literal`, `{name}`, `{*catchall}`)
//! - Match request paths and bind path variables
//! - Reify a template back into a concrete path (path generation)
//!
//! # Design Decisions
//! - Literal segments are compared verbatim (case-sensitive)
//! - Empty segments are ignored, so `a//b/` and `/a/b` are the same template
//! - A catch-all may bind zero segments and must be the last segment

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

/// Values bound from a matched path, keyed by variable name.
pub type RouteValues = BTreeMap<String, String>;

/// Errors produced while parsing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{template}`: empty variable name")]
    EmptyVariable { template: String },

    #[error("template `{template}`: invalid variable name `{name}`")]
    InvalidVariable { template: String, name: String },

    #[error("template `{template}`: unbalanced braces in segment `{segment}`")]
    UnbalancedBraces { template: String, segment: String },

    #[error("template `{template}`: catch-all `{name}` must be the last segment")]
    CatchAllNotLast { template: String, name: String },

    #[error("template `{template}`: variable `{name}` declared twice")]
    DuplicateVariable { template: String, name: String },
}

/// One segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Variable(String),
    CatchAll(String),
}

/// A parsed, normalized route template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    text: String,
    segments: Vec<Segment>,
}

impl RouteTemplate {
    /// Parse a template string.
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let text = normalize_path(raw);
        let mut segments = Vec::new();
        let mut seen = BTreeSet::new();

        let parts: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else {
            text.split('/').collect()
        };

        for (i, part) in parts.iter().enumerate() {
            let opens = part.matches('{').count();
            let closes = part.matches('}').count();

            if opens == 0 && closes == 0 {
                segments.push(Segment::Literal((*part).to_string()));
                continue;
            }

            if opens != 1 || closes != 1 || !part.starts_with('{') || !part.ends_with('}') {
                return Err(TemplateError::UnbalancedBraces {
                    template: text.clone(),
                    segment: (*part).to_string(),
                });
            }

            let inner = &part[1..part.len() - 1];
            let (catch_all, name) = match inner.strip_prefix('*') {
                Some(name) => (true, name),
                None => (false, inner),
            };

            if name.is_empty() {
                return Err(TemplateError::EmptyVariable { template: text.clone() });
            }
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(TemplateError::InvalidVariable {
                    template: text.clone(),
                    name: name.to_string(),
                });
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(TemplateError::DuplicateVariable {
                    template: text.clone(),
                    name: name.to_string(),
                });
            }

            if catch_all {
                if i + 1 != parts.len() {
                    return Err(TemplateError::CatchAllNotLast {
                        template: text.clone(),
                        name: name.to_string(),
                    });
                }
                segments.push(Segment::CatchAll(name.to_string()));
            } else {
                segments.push(Segment::Variable(name.to_string()));
            }
        }

        Ok(Self { text, segments })
    }

    /// The normalized template text (no leading or trailing slash).
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a request path, returning the bound variables on success.
    pub fn matches(&self, path: &str) -> Option<RouteValues> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut values = RouteValues::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    if parts.next()? != literal {
                        return None;
                    }
                }
                Segment::Variable(name) => {
                    values.insert(name.clone(), parts.next()?.to_string());
                }
                Segment::CatchAll(name) => {
                    let rest: Vec<&str> = parts.by_ref().collect();
                    values.insert(name.clone(), rest.join("/"));
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(values)
    }

    /// Build a concrete path from `values`.
    ///
    /// Returns `None` when a required variable is missing. Values the template
    /// does not consume are appended as a query string in key order.
    pub fn reify(&self, values: &RouteValues) -> Option<String> {
        let mut path = String::new();
        let mut used = BTreeSet::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    path.push('/');
                    path.push_str(literal);
                }
                Segment::Variable(name) => {
                    let value = values.get(name).filter(|v| !v.is_empty())?;
                    used.insert(name.as_str());
                    path.push('/');
                    path.push_str(value);
                }
                Segment::CatchAll(name) => {
                    used.insert(name.as_str());
                    if let Some(value) = values.get(name) {
                        let value = value.trim_matches('/');
                        if !value.is_empty() {
                            path.push('/');
                            path.push_str(value);
                        }
                    }
                }
            }
        }

        if path.is_empty() {
            path.push('/');
        }

        let mut extras = url::form_urlencoded::Serializer::new(String::new());
        let mut has_extras = false;
        for (key, value) in values.iter().filter(|(k, _)| !used.contains(k.as_str())) {
            extras.append_pair(key, value);
            has_extras = true;
        }
        if has_extras {
            path.push('?');
            path.push_str(&extras.finish());
        }

        Some(path)
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Trim leading/trailing slashes and collapse duplicate slashes.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Concatenate a prefix template and a sub-template with one `/` between them.
pub fn join_templates(prefix: &str, sub: &str) -> String {
    let prefix = normalize_path(prefix);
    let sub = normalize_path(sub);
    match (prefix.is_empty(), sub.is_empty()) {
        (true, _) => sub,
        (_, true) => prefix,
        _ => format!("{}/{}", prefix, sub),
    }
}
