//! Robust JSON extraction from free-text generator output.
//!
//! Generators are asked for strict JSON but routinely wrap it in prose,
//! markdown fences, smart quotes, or trailing commas. Extraction tries a
//! fixed ladder of candidate strategies, applies a bounded repair pass, and
//! accepts a candidate only once the required fields are present (after
//! recovery). The result is a tagged outcome — never a panic, never a thrown
//! error — with telemetry for every attempt.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Literal substituted for any required field that cannot be grounded.
pub const NOT_FOUND_PLACEHOLDER: &str = "Not found in provided sources.";

/// Generic remediation step used when next_steps cannot be recovered.
pub const GENERIC_NEXT_STEP: &str =
    "Review the explanation above and retry the problem step by step.";

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+(.+)$").expect("BULLET_RE regex should compile")
});

static TRAILING_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",\s*([}\]])").expect("TRAILING_COMMA_RE regex should compile")
});

static BARE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("BARE_KEY_RE regex should compile")
});

static SINGLE_QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'([^'\\]*)'").expect("SINGLE_QUOTED_RE regex should compile")
});

/// Field-name synonyms, checked in order.
const TITLE_KEYS: &[&str] = &["title", "heading", "name"];
const CONTENT_KEYS: &[&str] = &["content_markdown", "content", "body", "markdown", "text"];
const KEY_POINT_KEYS: &[&str] = &["key_points", "keypoints", "key_takeaways", "bullets", "points"];
const NEXT_STEP_KEYS: &[&str] = &[
    "next_steps",
    "nextsteps",
    "actions",
    "steps",
    "recommendations",
];
const PITFALL_KEYS: &[&str] = &["common_pitfall", "pitfall", "common_mistake", "warning"];
const SOURCE_KEYS: &[&str] = &["source_ids", "sources", "source_id", "citations"];

/// Keys a generator may nest its payload under.
const WRAPPER_KEYS: &[&str] = &["output", "result", "data"];

/// Maximum length of a recovered bullet line.
const MAX_RECOVERED_LINE: usize = 180;

/// Structured unit recovered from generator output (or built by fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedUnit {
    pub title: String,
    pub content_markdown: String,
    pub key_points: Vec<String>,
    pub next_steps: Vec<String>,
    pub common_pitfall: Option<String>,
    pub source_ids: Vec<String>,
}

/// Which candidate strategy produced the accepted parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseMode {
    /// The whole trimmed text parsed as-is.
    StrictJson,
    /// A fenced code block parsed.
    CodeFenceJson,
    /// A balanced brace span parsed.
    BraceExtract,
    /// A candidate parsed only after the repair pass.
    JsonRepair,
}

impl std::fmt::Display for ParseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrictJson => write!(f, "strict-json"),
            Self::CodeFenceJson => write!(f, "code-fence-json"),
            Self::BraceExtract => write!(f, "brace-extract"),
            Self::JsonRepair => write!(f, "json-repair"),
        }
    }
}

/// Why extraction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionFailure {
    /// The raw text was empty or whitespace.
    EmptyResponse,
    /// No JSON structure (fence or brace span) was found in the text.
    InvalidJson,
    /// JSON parsed but the payload was not an object.
    NonObjectPayload,
    /// An object parsed but required fields were empty after recovery.
    MissingRequiredFields,
    /// JSON candidates existed but none parsed, even after repair.
    JsonParseFailed,
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty_response"),
            Self::InvalidJson => write!(f, "invalid_json"),
            Self::NonObjectPayload => write!(f, "non_object_payload"),
            Self::MissingRequiredFields => write!(f, "missing_required_fields"),
            Self::JsonParseFailed => write!(f, "json_parse_failed"),
        }
    }
}

/// Per-call parse telemetry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionTelemetry {
    /// Strategy that produced the accepted parse, if any.
    pub mode: Option<ParseMode>,
    /// Total parse attempts across all candidates (repairs count).
    pub attempts: u32,
    /// Distinct candidates considered.
    pub candidates: usize,
    /// Length of the raw generator text.
    pub raw_len: usize,
    /// Whether the accepted candidate needed the repair pass.
    pub repaired: bool,
    /// Whether key_points were recovered from content bullets/placeholder.
    pub recovered_key_points: bool,
    /// Whether next_steps were recovered from content bullets/placeholder.
    pub recovered_next_steps: bool,
    /// Detail for the last failure seen.
    pub failure_detail: Option<String>,
}

/// Tagged extraction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    /// A unit was recovered.
    Ok {
        unit: ExtractedUnit,
        telemetry: ExtractionTelemetry,
    },
    /// No candidate was acceptable.
    Failed {
        reason: ExtractionFailure,
        telemetry: ExtractionTelemetry,
    },
}

impl ExtractionOutcome {
    /// Whether a unit was recovered.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// The telemetry, regardless of outcome.
    pub fn telemetry(&self) -> &ExtractionTelemetry {
        match self {
            Self::Ok { telemetry, .. } | Self::Failed { telemetry, .. } => telemetry,
        }
    }
}

/// Extract a structured unit from raw generator text.
///
/// Candidate strategies run in fixed order — whole text, fenced blocks,
/// balanced brace spans — deduplicated by trimmed text. Each candidate gets
/// one strict parse and, on failure, one repaired parse. The first candidate
/// whose payload passes field validation (after bullet recovery and
/// placeholder substitution) wins.
pub fn extract_unit(raw: &str) -> ExtractionOutcome {
    let mut telemetry = ExtractionTelemetry {
        raw_len: raw.len(),
        ..Default::default()
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        telemetry.failure_detail = Some("generator returned empty text".to_string());
        return ExtractionOutcome::Failed {
            reason: ExtractionFailure::EmptyResponse,
            telemetry,
        };
    }

    let candidates = collect_candidates(trimmed);
    telemetry.candidates = candidates.len();

    let mut saw_non_object = false;
    let mut saw_missing_fields = false;
    let mut any_parsed = false;

    for (text, base_mode) in &candidates {
        let (value, mode, repaired) = match parse_candidate(text, *base_mode, &mut telemetry) {
            Some(parsed) => parsed,
            None => continue,
        };
        any_parsed = true;

        match accept_payload(&value) {
            Ok((unit, recovered_kp, recovered_ns)) => {
                telemetry.mode = Some(mode);
                telemetry.repaired = repaired;
                telemetry.recovered_key_points = recovered_kp;
                telemetry.recovered_next_steps = recovered_ns;
                tracing::debug!(mode = %mode, attempts = telemetry.attempts, "generator output parsed");
                return ExtractionOutcome::Ok { unit, telemetry };
            }
            Err(AcceptFailure::NonObject) => {
                saw_non_object = true;
                telemetry.failure_detail = Some("payload was not a JSON object".to_string());
            }
            Err(AcceptFailure::MissingFields(detail)) => {
                saw_missing_fields = true;
                telemetry.failure_detail = Some(detail);
            }
        }
    }

    let reason = if !any_parsed {
        if candidates.len() > 1 {
            ExtractionFailure::JsonParseFailed
        } else {
            ExtractionFailure::InvalidJson
        }
    } else if saw_missing_fields {
        ExtractionFailure::MissingRequiredFields
    } else if saw_non_object {
        ExtractionFailure::NonObjectPayload
    } else {
        ExtractionFailure::JsonParseFailed
    };

    tracing::debug!(
        %reason,
        attempts = telemetry.attempts,
        candidates = telemetry.candidates,
        "generator output rejected"
    );
    ExtractionOutcome::Failed { reason, telemetry }
}

/// Apply the bounded repair pass: smart quotes → straight, bare keys quoted,
/// single-quoted strings converted, trailing commas stripped.
fn repair_json(text: &str) -> String {
    let straightened = text
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let keyed = BARE_KEY_RE.replace_all(&straightened, "$1\"$2\":");
    let quoted = SINGLE_QUOTED_RE.replace_all(&keyed, |caps: &regex::Captures<'_>| {
        format!("\"{}\"", caps[1].replace('"', "\\\""))
    });
    TRAILING_COMMA_RE.replace_all(&quoted, "$1").into_owned()
}

// ---------------------------------------------------------------------------
// Candidate collection
// ---------------------------------------------------------------------------

fn collect_candidates(trimmed: &str) -> Vec<(String, ParseMode)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates: Vec<(String, ParseMode)> = Vec::new();
    let mut push = |text: &str, mode: ParseMode| {
        let t = text.trim();
        if !t.is_empty() && seen.insert(t.to_string()) {
            candidates.push((t.to_string(), mode));
        }
    };

    push(trimmed, ParseMode::StrictJson);
    for block in fenced_blocks(trimmed) {
        push(&block, ParseMode::CodeFenceJson);
    }
    for span in brace_spans(trimmed) {
        push(&span, ParseMode::BraceExtract);
    }
    candidates
}

/// Contents of every ``` fenced block, in order. An optional language tag on
/// the opening fence line is skipped.
fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the language tag line.
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(body[..close].to_string());
                rest = &body[close + 3..];
            }
            None => break,
        }
    }
    blocks
}

/// Every balanced top-level `{...}` span, found by depth scanning that
/// ignores braces inside quoted strings and escape sequences.
fn brace_spans(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(text[start..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

fn parse_candidate(
    text: &str,
    base_mode: ParseMode,
    telemetry: &mut ExtractionTelemetry,
) -> Option<(Value, ParseMode, bool)> {
    telemetry.attempts += 1;
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some((value, base_mode, false));
    }
    telemetry.attempts += 1;
    let repaired = repair_json(text);
    serde_json::from_str::<Value>(&repaired)
        .ok()
        .map(|value| (value, ParseMode::JsonRepair, true))
}

// ---------------------------------------------------------------------------
// Payload acceptance
// ---------------------------------------------------------------------------

enum AcceptFailure {
    NonObject,
    MissingFields(String),
}

fn accept_payload(value: &Value) -> Result<(ExtractedUnit, bool, bool), AcceptFailure> {
    let unwrapped = unwrap_payload(value);
    let obj = unwrapped.as_object().ok_or(AcceptFailure::NonObject)?;

    let title = string_field(obj, TITLE_KEYS);
    let content = string_field(obj, CONTENT_KEYS);

    let (title, content) = match (title, content) {
        (Some(t), Some(c)) => (t, c),
        (t, c) => {
            let mut missing = Vec::new();
            if t.is_none() {
                missing.push("title");
            }
            if c.is_none() {
                missing.push("content_markdown");
            }
            return Err(AcceptFailure::MissingFields(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
    };

    let mut key_points = list_field(obj, KEY_POINT_KEYS);
    let mut next_steps = list_field(obj, NEXT_STEP_KEYS);

    let mut recovered_kp = false;
    let mut recovered_ns = false;

    if key_points.is_empty() {
        key_points = recover_bullets(&content);
        recovered_kp = true;
        if key_points.is_empty() {
            key_points = vec![NOT_FOUND_PLACEHOLDER.to_string()];
        }
    }
    if next_steps.is_empty() {
        next_steps = recover_bullets(&content);
        recovered_ns = true;
        if next_steps.is_empty() {
            next_steps = vec![GENERIC_NEXT_STEP.to_string()];
        }
    }

    let unit = ExtractedUnit {
        title,
        content_markdown: content,
        key_points,
        next_steps,
        common_pitfall: string_field(obj, PITFALL_KEYS),
        source_ids: list_field(obj, SOURCE_KEYS),
    };
    Ok((unit, recovered_kp, recovered_ns))
}

/// Unwrap one `{output|result|data}` nesting level, or a singleton array
/// holding one object.
fn unwrap_payload(value: &Value) -> &Value {
    if let Value::Array(items) = value {
        if items.len() == 1 && items[0].is_object() {
            return &items[0];
        }
    }
    if let Value::Object(map) = value {
        for key in WRAPPER_KEYS {
            if let Some(inner) = map.get(*key) {
                if inner.is_object() {
                    return inner;
                }
            }
        }
    }
    value
}

fn string_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = obj.get(*key) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Read a list field through the synonym table. A bare string counts as a
/// single-element list; non-string entries are skipped.
fn list_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Vec<String> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::Array(items)) => {
                let out: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if !out.is_empty() {
                    return out;
                }
            }
            Some(Value::String(s)) if !s.trim().is_empty() => {
                return vec![s.trim().to_string()];
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Recover up to 3 bullet or numbered lines (≤180 chars) from markdown.
fn recover_bullets(markdown: &str) -> Vec<String> {
    BULLET_RE
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|line| !line.is_empty() && line.len() <= MAX_RECOVERED_LINE)
        .take(3)
        .collect()
}
