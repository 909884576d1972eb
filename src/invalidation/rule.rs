// Package invalidation defines change rules and identifier templates.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::config::RuleSpec;
use crate::model::{Category, DELIMITER};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template {0:?} has an unbalanced brace")]
    Unbalanced(String),
    #[error("template {0:?} has an empty placeholder")]
    EmptyPlaceholder(String),
    #[error("context has no usable value for {0:?}")]
    MissingKey(String),
    #[error("rendered identifier {0:?} contains the key delimiter")]
    Delimiter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Identifier pattern such as `{home}_{away}`, parsed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl IdentifierTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(TemplateError::Unbalanced(source.to_string())),
                            c => field.push(c),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::Unbalanced(source.to_string()));
                    }
                    let field = field.trim();
                    if field.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder(source.to_string()));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field.to_string()));
                }
                '}' => return Err(TemplateError::Unbalanced(source.to_string())),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Context keys the template reads.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(f) => Some(f.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Formats against a json object. Strings render bare, numbers and
    /// booleans in their json form. Null or absent keys are missing.
    pub fn render(&self, context: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => match context.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(v @ (Value::Number(_) | Value::Bool(_))) => out.push_str(&v.to_string()),
                    _ => return Err(TemplateError::MissingKey(name.clone())),
                },
            }
        }
        if out.contains(DELIMITER) {
            return Err(TemplateError::Delimiter(out));
        }
        Ok(out)
    }
}

impl fmt::Display for IdentifierTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// What one change type evicts and whether it is pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRule {
    categories: BTreeSet<Category>,
    identifier: Option<IdentifierTemplate>,
    broadcast: bool,
}

impl InvalidationRule {
    pub fn new<I>(categories: I) -> Self
    where
        I: IntoIterator<Item = Category>,
    {
        Self {
            categories: categories.into_iter().collect(),
            identifier: None,
            broadcast: false,
        }
    }

    pub fn with_identifier(mut self, template: &str) -> Result<Self, TemplateError> {
        self.identifier = Some(IdentifierTemplate::parse(template)?);
        Ok(self)
    }

    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn categories(&self) -> &BTreeSet<Category> {
        &self.categories
    }

    pub fn identifier(&self) -> Option<&IdentifierTemplate> {
        self.identifier.as_ref()
    }

    pub fn broadcast(&self) -> bool {
        self.broadcast
    }
}

impl TryFrom<&RuleSpec> for InvalidationRule {
    type Error = TemplateError;

    fn try_from(spec: &RuleSpec) -> Result<Self, Self::Error> {
        let rule = Self::new(spec.categories.iter().copied()).with_broadcast(spec.broadcast);
        match spec.identifier.as_deref() {
            Some(template) => rule.with_identifier(template),
            None => Ok(rule),
        }
    }
}

/// Serializable view of a rule, for admin inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleView {
    pub change_type: String,
    pub categories: Vec<Category>,
    pub identifier: Option<String>,
    pub broadcast: bool,
}

impl RuleView {
    pub fn new(change_type: &str, rule: &InvalidationRule) -> Self {
        Self {
            change_type: change_type.to_string(),
            categories: rule.categories.iter().copied().collect(),
            identifier: rule.identifier.as_ref().map(|t| t.as_str().to_string()),
            broadcast: rule.broadcast,
        }
    }
}
