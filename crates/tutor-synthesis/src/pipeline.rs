//! Cache-idempotent content synthesis pipeline.
//!
//! One call, one external generator attempt, one cache record. The pipeline
//! never raises on the learner path: generator failures, parse failures, and
//! replay mode all degrade to deterministic fallback synthesis and are
//! surfaced as telemetry. Callers serialize calls per cache key; nothing
//! here provides distributed locking.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tutoring::extraction::{extract_unit, ExtractedUnit, ExtractionOutcome, ExtractionTelemetry};
use tutoring::fallback::{synthesize_fallback, FallbackContext};
use tutoring::hashing::create_input_hash;
use tutoring::textbook::{FallbackReason, PdfCitation, Provenance, UnitDraft, UnitType};
use tutoring::NOT_FOUND_PLACEHOLDER;

use crate::generator::{GeneratorParams, GeneratorRequest, TextGenerator};
use crate::retrieval::RetrievalBundle;
use crate::sanitize::ContentSanitizer;
use crate::store::{CacheRecord, ContentStore};
use crate::templates::TemplateRegistry;

/// Everything one synthesis call needs.
#[derive(Debug, Clone)]
pub struct GenerateUnitOptions {
    pub learner_id: String,
    pub template_id: String,
    pub model: String,
    pub params: GeneratorParams,
    pub bundle: RetrievalBundle,
    /// Replay mode: skip the generator entirely and synthesize fallback.
    pub disable_generation: bool,
}

/// The composed, sanitized unit a synthesis call produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedUnit {
    pub title: String,
    pub content_markdown: String,
    pub content_html: String,
    pub key_points: Vec<String>,
    pub next_steps: Vec<String>,
    pub common_pitfall: Option<String>,
    pub source_ids: Vec<String>,
    pub provenance: Provenance,
}

impl ComposedUnit {
    /// Project this unit into a draft for textbook reconciliation.
    pub fn to_draft(&self, concept_ids: Vec<String>, unit_type: UnitType) -> UnitDraft {
        UnitDraft {
            concept_ids,
            unit_type,
            title: self.title.clone(),
            content: self.content_markdown.clone(),
            summary: self.key_points.first().cloned(),
            common_mistakes: self.common_pitfall.iter().cloned().collect(),
            minimal_example: None,
            source_ref_ids: self.source_ids.clone(),
            source_interaction_ids: self.provenance.triggering_interaction_ids.clone(),
            created_from_interaction_ids: self.provenance.triggering_interaction_ids.clone(),
            provenance: self.provenance.clone(),
        }
    }
}

/// Timing and size metrics for one call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub duration_ms: u64,
    pub prompt_chars: usize,
    pub response_chars: usize,
    pub retrieved_sources: usize,
    pub pdf_passages: usize,
    pub citations: usize,
}

/// Full result of one synthesis call. Always a usable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateUnitResult {
    pub unit: ComposedUnit,
    pub input_hash: String,
    pub cache_key: String,
    pub from_cache: bool,
    pub used_fallback: bool,
    pub fallback_reason: FallbackReason,
    pub parse_telemetry: Option<ExtractionTelemetry>,
    pub metrics: PipelineMetrics,
}

/// The synthesis pipeline over its four seams.
pub struct SynthesisPipeline {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn ContentStore>,
    sanitizer: Arc<dyn ContentSanitizer>,
    templates: TemplateRegistry,
}

impl SynthesisPipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn ContentStore>,
        sanitizer: Arc<dyn ContentSanitizer>,
        templates: TemplateRegistry,
    ) -> Self {
        Self {
            generator,
            store,
            sanitizer,
            templates,
        }
    }

    /// Synthesize (or fetch) the unit for one triggering situation.
    pub async fn generate_unit(&self, options: GenerateUnitOptions) -> GenerateUnitResult {
        let started = Instant::now();
        let params = options.params.clamped();

        let hash_input = json!({
            "template_id": options.template_id,
            "model": options.model,
            "params": params,
            "bundle": options.bundle.stable_projection(),
        });
        let input_hash = create_input_hash(&hash_input);
        let cache_key = format!(
            "{}::{}::{}",
            options.learner_id, options.template_id, input_hash
        );

        // Cache hit short-circuits the generator; only provenance grows.
        if let Some(hit) = self.try_cache_hit(&cache_key, &options, started).await {
            return hit;
        }

        let mut metrics = PipelineMetrics {
            retrieved_sources: options.bundle.retrieved_source_ids.len(),
            pdf_passages: options.bundle.pdf_passages.len(),
            ..Default::default()
        };

        let (extracted, telemetry, fallback_reason) =
            self.produce_content(&options, &params, &mut metrics).await;
        let used_fallback = fallback_reason != FallbackReason::None;

        let source_ids = resolve_source_ids(&extracted.source_ids, &options.bundle);
        let citations = select_citations(&options.bundle);
        metrics.citations = citations.len();

        let provenance = Provenance {
            model: if used_fallback {
                None
            } else {
                Some(options.model.clone())
            },
            params: serde_json::to_value(&params).ok(),
            template_id: Some(options.template_id.clone()),
            input_hash: Some(input_hash.clone()),
            retrieved_source_ids: options.bundle.retrieved_source_ids.clone(),
            retrieved_pdf_citations: citations,
            triggering_interaction_ids: dedup_in_order(&options.bundle.triggering_interaction_ids),
            parse_mode: telemetry
                .as_ref()
                .and_then(|t| t.mode.map(|m| m.to_string())),
            parse_attempts: telemetry.as_ref().map(|t| t.attempts).unwrap_or(0),
            fallback_reason,
        };

        let unit = self.compose(extracted, source_ids, provenance);

        let record = CacheRecord {
            cache_key: cache_key.clone(),
            unit: unit.clone(),
            created_at: now(),
        };
        if let Err(err) = self.store.save_cache_record(&record).await {
            tracing::warn!(key = %cache_key, error = %err, "cache record save failed");
        }

        metrics.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            learner = %options.learner_id,
            template = %options.template_id,
            hash = %input_hash,
            fallback = %fallback_reason,
            duration_ms = metrics.duration_ms,
            "unit synthesized"
        );

        GenerateUnitResult {
            unit,
            input_hash,
            cache_key,
            from_cache: false,
            used_fallback,
            fallback_reason,
            parse_telemetry: telemetry,
            metrics,
        }
    }

    async fn try_cache_hit(
        &self,
        cache_key: &str,
        options: &GenerateUnitOptions,
        started: Instant,
    ) -> Option<GenerateUnitResult> {
        let mut record = match self.store.get_cache_record(cache_key).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key = cache_key, error = %err, "cache lookup failed, treating as miss");
                return None;
            }
        };

        let before = record.unit.provenance.triggering_interaction_ids.len();
        for id in &options.bundle.triggering_interaction_ids {
            if !record.unit.provenance.triggering_interaction_ids.contains(id) {
                record
                    .unit
                    .provenance
                    .triggering_interaction_ids
                    .push(id.clone());
            }
        }
        if record.unit.provenance.triggering_interaction_ids.len() > before {
            if let Err(err) = self.store.save_cache_record(&record).await {
                tracing::warn!(key = cache_key, error = %err, "provenance merge save failed");
            }
        }

        let fallback_reason = record.unit.provenance.fallback_reason;
        tracing::info!(
            learner = %options.learner_id,
            key = cache_key,
            "cache hit, generator skipped"
        );
        Some(GenerateUnitResult {
            unit: record.unit,
            input_hash: cache_key.rsplit("::").next().unwrap_or_default().to_string(),
            cache_key: cache_key.to_string(),
            from_cache: true,
            used_fallback: fallback_reason != FallbackReason::None,
            fallback_reason,
            parse_telemetry: None,
            metrics: PipelineMetrics {
                duration_ms: started.elapsed().as_millis() as u64,
                retrieved_sources: options.bundle.retrieved_source_ids.len(),
                pdf_passages: options.bundle.pdf_passages.len(),
                ..Default::default()
            },
        })
    }

    /// Run prompt/generate/parse, degrading to fallback on any failure.
    async fn produce_content(
        &self,
        options: &GenerateUnitOptions,
        params: &GeneratorParams,
        metrics: &mut PipelineMetrics,
    ) -> (ExtractedUnit, Option<ExtractionTelemetry>, FallbackReason) {
        let prompt = match self.templates.render_prompt(
            &options.template_id,
            &options.bundle.stable_projection().to_string(),
        ) {
            Ok(prompt) => prompt,
            Err(err) => {
                tracing::warn!(template = %options.template_id, error = %err, "prompt render failed");
                return (
                    self.fallback_unit(&options.bundle),
                    None,
                    FallbackReason::LlmError,
                );
            }
        };
        metrics.prompt_chars = prompt.len();

        if options.disable_generation {
            tracing::debug!(learner = %options.learner_id, "generation disabled, replay fallback");
            return (
                self.fallback_unit(&options.bundle),
                None,
                FallbackReason::ReplayMode,
            );
        }

        let request = GeneratorRequest {
            model: options.model.clone(),
            params: params.clone(),
        };
        let reply = match self.generator.generate(&prompt, &request).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(model = %options.model, error = %err, "generator failed");
                return (
                    self.fallback_unit(&options.bundle),
                    None,
                    FallbackReason::LlmError,
                );
            }
        };
        metrics.response_chars = reply.text.len();

        match extract_unit(&reply.text) {
            ExtractionOutcome::Ok { unit, telemetry } => {
                (unit, Some(telemetry), FallbackReason::None)
            }
            ExtractionOutcome::Failed { reason, telemetry } => {
                tracing::warn!(%reason, "generator output unparseable, using fallback");
                (
                    self.fallback_unit(&options.bundle),
                    Some(telemetry),
                    FallbackReason::ParseFailure,
                )
            }
        }
    }

    fn fallback_unit(&self, bundle: &RetrievalBundle) -> ExtractedUnit {
        let anchor = bundle.grounding_anchor.clone().unwrap_or_default();
        synthesize_fallback(&FallbackContext {
            problem_title: anchor.problem_title,
            error_subtype: anchor.error_subtype,
            concept_name: bundle.concept_candidates.first().cloned(),
            anchor_summary: anchor.summary,
            anchor_snippet: anchor.snippet,
            hint_history: bundle.hint_history.clone(),
            source_ids: bundle.retrieved_source_ids.clone(),
        })
    }

    /// Assemble the final body and route it through the sanitizer.
    fn compose(
        &self,
        extracted: ExtractedUnit,
        source_ids: Vec<String>,
        provenance: Provenance,
    ) -> ComposedUnit {
        let mut markdown = extracted.content_markdown.clone();

        markdown.push_str("\n\n## Key points\n\n");
        for point in &extracted.key_points {
            markdown.push_str(&format!("- {point}\n"));
        }

        markdown.push_str("\n## Next steps\n\n");
        for (i, step) in extracted.next_steps.iter().enumerate() {
            markdown.push_str(&format!("{}. {step}\n", i + 1));
        }

        markdown.push_str("\n## Common pitfall\n\n");
        match &extracted.common_pitfall {
            Some(pitfall) => markdown.push_str(pitfall),
            None => markdown.push_str(NOT_FOUND_PLACEHOLDER),
        }
        markdown.push('\n');

        let content_html = self.sanitizer.render_safe(&markdown);

        ComposedUnit {
            title: extracted.title,
            content_markdown: markdown,
            content_html,
            key_points: extracted.key_points,
            next_steps: extracted.next_steps,
            common_pitfall: extracted.common_pitfall,
            source_ids,
            provenance,
        }
    }
}

/// Provenance ordering group for a source id.
///
/// Engagement-log anchors sort first, then passage citations, then
/// everything else; ties break on exact string order.
fn source_group(id: &str, bundle: &RetrievalBundle) -> u8 {
    if id.starts_with("int_") || id.starts_with("interaction:") {
        0
    } else if bundle
        .pdf_passages
        .iter()
        .any(|p| p.chunk_id == id || p.doc_id == id)
    {
        1
    } else {
        2
    }
}

/// Keep only generator-claimed ids that retrieval actually supplied.
///
/// Unknown ids are never trusted; if filtering empties the set the full
/// retrieved set is used instead.
fn resolve_source_ids(claimed: &[String], bundle: &RetrievalBundle) -> Vec<String> {
    let known: std::collections::HashSet<&str> = bundle
        .retrieved_source_ids
        .iter()
        .map(String::as_str)
        .collect();

    let mut kept: Vec<String> = Vec::new();
    for id in claimed {
        if known.contains(id.as_str()) {
            if !kept.contains(id) {
                kept.push(id.clone());
            }
        } else {
            tracing::warn!(source_id = %id, "dropping source id not present in retrieval");
        }
    }
    if kept.is_empty() {
        kept = dedup_in_order(&bundle.retrieved_source_ids);
    }

    kept.sort_by(|a, b| {
        source_group(a, bundle)
            .cmp(&source_group(b, bundle))
            .then_with(|| a.cmp(b))
    });
    kept
}

/// At most one citation per unique passage chunk, keeping the best score.
fn select_citations(bundle: &RetrievalBundle) -> Vec<PdfCitation> {
    let mut citations: Vec<PdfCitation> = Vec::new();
    for passage in &bundle.pdf_passages {
        match citations.iter_mut().find(|c| c.chunk_id == passage.chunk_id) {
            Some(existing) => {
                if passage.score > existing.score {
                    existing.doc_id = passage.doc_id.clone();
                    existing.page = passage.page;
                    existing.score = passage.score;
                }
            }
            None => citations.push(PdfCitation {
                doc_id: passage.doc_id.clone(),
                chunk_id: passage.chunk_id.clone(),
                page: passage.page,
                score: passage.score,
            }),
        }
    }
    citations
}

fn dedup_in_order(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

fn now() -> DateTime<Utc> {
    Utc::now()
}
