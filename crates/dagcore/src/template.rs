//! Placeholder substitution against the results of earlier nodes.
//!
//! Templates use Jinja syntax and see a single variable, `results`, holding
//! every result recorded so far: `{{ results.fetch.body.items[0].name }}`.
//! References to nodes or fields that do not exist yet render as an empty
//! string.

use crate::{NodeError, ResultStore};
use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;

/// Renders node parameters. Built once and shared by every handler.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Render `template` against `results`.
    pub fn render(&self, template: &str, results: &ResultStore) -> Result<String, NodeError> {
        if !has_placeholders(template) {
            return Ok(template.to_string());
        }

        let ctx = minijinja::context! { results => minijinja::Value::from_serialize(results) };
        self.env
            .render_str(template, ctx)
            .map_err(|e| NodeError::Template {
                template: template.to_string(),
                message: e.to_string(),
            })
    }

    /// Render every string inside a JSON value, keeping its shape.
    pub fn render_value(&self, value: &Value, results: &ResultStore) -> Result<Value, NodeError> {
        match value {
            Value::String(s) => Ok(Value::String(self.render(s, results)?)),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render_value(item, results))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut rendered = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    rendered.insert(key.clone(), self.render_value(item, results)?);
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn has_placeholders(template: &str) -> bool {
    template.contains("{{") || template.contains("{%") || template.contains("{#")
}
