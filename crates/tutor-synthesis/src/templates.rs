//! Prompt template registry.
//!
//! Each template pairs a teaching intent with a strict JSON output contract.
//! The contract is generated from the payload struct the parser expects, so
//! prompt and parser can never drift apart silently.

use std::collections::BTreeMap;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Built-in template producing a full explanation unit.
pub const TEMPLATE_EXPLANATION_V1: &str = "explanation.v1";

/// Built-in template producing a condensed summary unit.
pub const TEMPLATE_SUMMARY_V1: &str = "summary.v1";

/// The JSON payload every template instructs the generator to emit.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedPayload {
    /// Short title for the unit.
    pub title: String,
    /// Markdown body grounded in the provided sources.
    pub content_markdown: String,
    /// Key takeaways, one short line each.
    pub key_points: Vec<String>,
    /// Concrete actions the learner should take next.
    pub next_steps: Vec<String>,
    /// The most common mistake for this concept, if one stands out.
    pub common_pitfall: Option<String>,
    /// Ids of the provided sources actually used.
    pub source_ids: Vec<String>,
}

/// Registry failures.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown template id: {0}")]
    UnknownTemplate(String),
}

/// One registered prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub id: String,
    /// What the generator is being asked to teach.
    pub intent: String,
}

/// Registry of prompt templates, keyed by id.
#[derive(Debug)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, PromptTemplate>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TemplateRegistry {
    /// A registry holding the built-in explanation and summary templates.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            templates: BTreeMap::new(),
        };
        registry.register(PromptTemplate {
            id: TEMPLATE_EXPLANATION_V1.to_string(),
            intent: "Write a thorough, beginner-friendly explanation of the concept the \
                     learner is struggling with, grounded only in the provided sources."
                .to_string(),
        });
        registry.register(PromptTemplate {
            id: TEMPLATE_SUMMARY_V1.to_string(),
            intent: "Write a condensed summary of the concept suitable for quick review, \
                     grounded only in the provided sources."
                .to_string(),
        });
        registry
    }

    /// Add or replace a template.
    pub fn register(&mut self, template: PromptTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    /// Whether a template id is known.
    pub fn contains(&self, template_id: &str) -> bool {
        self.templates.contains_key(template_id)
    }

    /// Render the full prompt for a template over serialized sources.
    pub fn render_prompt(
        &self,
        template_id: &str,
        sources_json: &str,
    ) -> Result<String, TemplateError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| TemplateError::UnknownTemplate(template_id.to_string()))?;

        let schema = schema_for!(GeneratedPayload);
        let schema_json =
            serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string());

        Ok(format!(
            "{intent}\n\n\
             SOURCES (JSON):\n{sources_json}\n\n\
             Respond with a single JSON object and nothing else. Do not wrap it in \
             markdown fences or add commentary. The object must conform to this schema:\n\
             {schema_json}\n\n\
             If a field cannot be grounded in the sources, use the literal string \
             \"Not found in provided sources.\" rather than inventing content.",
            intent = template.intent,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = TemplateRegistry::with_builtins();
        assert!(registry.contains(TEMPLATE_EXPLANATION_V1));
        assert!(registry.contains(TEMPLATE_SUMMARY_V1));
    }

    #[test]
    fn test_render_prompt_embeds_sources_and_schema() {
        let registry = TemplateRegistry::with_builtins();
        let prompt = registry
            .render_prompt(TEMPLATE_EXPLANATION_V1, r#"{"passages":[]}"#)
            .unwrap();
        assert!(prompt.contains(r#"{"passages":[]}"#));
        assert!(prompt.contains("content_markdown"));
        assert!(prompt.contains("key_points"));
        assert!(prompt.contains("Not found in provided sources."));
    }

    #[test]
    fn test_unknown_template_is_error() {
        let registry = TemplateRegistry::with_builtins();
        let err = registry.render_prompt("nope.v9", "{}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownTemplate(id) if id == "nope.v9"));
    }

    #[test]
    fn test_custom_template_registration() {
        let mut registry = TemplateRegistry::with_builtins();
        registry.register(PromptTemplate {
            id: "drill.v1".to_string(),
            intent: "Write a short practice drill.".to_string(),
        });
        assert!(registry.contains("drill.v1"));
        let prompt = registry.render_prompt("drill.v1", "{}").unwrap();
        assert!(prompt.contains("practice drill"));
    }
}
