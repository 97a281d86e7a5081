//! Adaptive Tutor Content Synthesis
//!
//! Async pipeline that turns a retrieval bundle into a durable instructional
//! unit: deterministic cache key, one generator attempt, robust parsing,
//! fallback synthesis, citation selection, and sanitized composition. All
//! decision logic and pure machinery lives in the `tutoring` crate; this
//! crate owns the seams (generator, store, sanitizer, templates) and the
//! orchestration between them.

pub mod generator;
pub mod pipeline;
pub mod retrieval;
pub mod sanitize;
pub mod store;
pub mod templates;

// Re-export pipeline types
pub use pipeline::{
    ComposedUnit, GenerateUnitOptions, GenerateUnitResult, PipelineMetrics, SynthesisPipeline,
};

// Re-export seam types
pub use generator::{
    GeneratorError, GeneratorParams, GeneratorReply, GeneratorRequest, HttpTextGenerator,
    MockTextGenerator, TextGenerator, DEFAULT_TIMEOUT_MS,
};
pub use retrieval::{GroundingAnchor, PdfPassage, RetrievalBundle};
pub use sanitize::{ContentSanitizer, PassthroughSanitizer};
pub use store::{CacheRecord, ContentStore, InMemoryContentStore, StoreError};
pub use templates::{
    GeneratedPayload, PromptTemplate, TemplateError, TemplateRegistry, TEMPLATE_EXPLANATION_V1,
    TEMPLATE_SUMMARY_V1,
};
