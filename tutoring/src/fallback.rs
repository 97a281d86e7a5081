//! Generator-free fallback content synthesis.
//!
//! When parsing fails or the generator is unreachable, the pipeline still
//! owes the learner a usable unit. This builder assembles one from whatever
//! deterministic inputs exist, with every absent input rendered as the
//! grounding placeholder. Same inputs, same bytes out.

use serde::{Deserialize, Serialize};

use crate::extraction::{ExtractedUnit, NOT_FOUND_PLACEHOLDER};

/// Fixed remediation steps offered when no generated guidance exists.
pub const REMEDIATION_STEPS: [&str; 3] = [
    "Re-read the problem statement and restate it in your own words.",
    "Revisit the most recent hint and apply it to your current attempt.",
    "Break the problem into smaller steps and verify each one before moving on.",
];

/// Deterministic inputs available without calling a generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackContext {
    /// Title of the problem the learner is stuck on.
    pub problem_title: Option<String>,
    /// Classified error subtype from the triggering interaction.
    pub error_subtype: Option<String>,
    /// Name of the concept being exercised.
    pub concept_name: Option<String>,
    /// Short description from the grounding anchor, if one was retrieved.
    pub anchor_summary: Option<String>,
    /// Code or worked-example snippet from the grounding anchor.
    pub anchor_snippet: Option<String>,
    /// Hints the learner has already seen, in order.
    pub hint_history: Vec<String>,
    /// Source ids that ground this context.
    pub source_ids: Vec<String>,
}

/// Assemble a complete unit from deterministic inputs only.
///
/// The output matches the shape the parser produces so downstream composition
/// and reconciliation never need to know whether the generator was involved.
pub fn synthesize_fallback(ctx: &FallbackContext) -> ExtractedUnit {
    let or_placeholder =
        |field: &Option<String>| -> String { present(field).unwrap_or_else(placeholder) };

    let title = format!("Help with {}", or_placeholder(&ctx.problem_title));

    let mut body = String::new();
    body.push_str(&format!("**Error type:** {}\n\n", or_placeholder(&ctx.error_subtype)));
    body.push_str(&format!("**Concept:** {}\n\n", or_placeholder(&ctx.concept_name)));
    body.push_str(&format!(
        "**Related material:** {}\n\n",
        or_placeholder(&ctx.anchor_summary)
    ));
    match present(&ctx.anchor_snippet) {
        Some(snippet) => body.push_str(&format!("**Example:**\n\n```\n{snippet}\n```\n\n")),
        None => body.push_str(&format!("**Example:** {}\n\n", placeholder())),
    }

    body.push_str("**Hints seen so far:**\n\n");
    if ctx.hint_history.is_empty() {
        body.push_str(&format!("{}\n\n", placeholder()));
    } else {
        for hint in &ctx.hint_history {
            body.push_str(&format!("- {hint}\n"));
        }
        body.push('\n');
    }

    body.push_str("**What to try next:**\n\n");
    for (i, step) in REMEDIATION_STEPS.iter().enumerate() {
        body.push_str(&format!("{}. {step}\n", i + 1));
    }

    let mut key_points = Vec::new();
    if let Some(concept) = present(&ctx.concept_name) {
        key_points.push(format!("This problem exercises: {concept}"));
    }
    if let Some(subtype) = present(&ctx.error_subtype) {
        key_points.push(format!("Your recent attempts hit: {subtype}"));
    }
    if let Some(summary) = present(&ctx.anchor_summary) {
        key_points.push(summary);
    }
    if key_points.is_empty() {
        key_points.push(placeholder());
    }

    tracing::debug!(
        has_anchor = ctx.anchor_summary.is_some(),
        hints = ctx.hint_history.len(),
        "fallback unit synthesized"
    );

    ExtractedUnit {
        title,
        content_markdown: body,
        key_points,
        next_steps: REMEDIATION_STEPS.iter().map(|s| s.to_string()).collect(),
        common_pitfall: present(&ctx.error_subtype)
            .map(|s| format!("Watch for repeated {s} mistakes.")),
        source_ids: ctx.source_ids.clone(),
    }
}

fn present(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn placeholder() -> String {
    NOT_FOUND_PLACEHOLDER.to_string()
}
