//! Lint feedback for freshly applied edits.

use applique_protocol::Diagnostic;
use applique_protocol::LineRange;
use async_trait::async_trait;

use crate::error::Result;

/// Host-provided diagnostics lookup. The engine consults it once per apply,
/// after the review resolved, restricted to the ranges the patch touched so
/// pre-existing findings elsewhere in the file do not count against the edit.
#[async_trait]
pub trait DiagnosticsGate: Send + Sync {
    async fn check(&self, relative_path: &str, ranges: &[LineRange]) -> Result<Vec<Diagnostic>>;
}

/// Filters `all` down to the findings that sit inside one of `ranges`.
///
/// Useful for gate implementations that can only query whole-file
/// diagnostics from their language tooling.
pub fn diagnostics_in_ranges(all: &[Diagnostic], ranges: &[LineRange]) -> Vec<Diagnostic> {
    all.iter()
        .filter(|diagnostic| ranges.iter().any(|range| range.contains_line(diagnostic.line)))
        .cloned()
        .collect()
}
