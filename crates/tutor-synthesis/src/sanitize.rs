//! Renderer/sanitizer seam.
//!
//! Markdown rendering and HTML sanitization are external concerns; the
//! pipeline only guarantees that composed content passes through this seam
//! before persistence. The passthrough implementation keeps tests and
//! single-process deployments honest without pulling in a renderer.

/// Markdown-to-safe-HTML seam.
pub trait ContentSanitizer: Send + Sync {
    /// Render markdown to HTML.
    fn render(&self, markdown: &str) -> String;
    /// Strip anything unsafe from rendered HTML.
    fn sanitize(&self, html: &str) -> String;

    /// Render and sanitize in one step.
    fn render_safe(&self, markdown: &str) -> String {
        self.sanitize(&self.render(markdown))
    }
}

/// Identity implementation; content flows through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSanitizer;

impl ContentSanitizer for PassthroughSanitizer {
    fn render(&self, markdown: &str) -> String {
        markdown.to_string()
    }

    fn sanitize(&self, html: &str) -> String {
        html.to_string()
    }
}
