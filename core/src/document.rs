//! Host-provided access to live editor documents.

use std::sync::Arc;

use applique_protocol::LineRange;
use async_trait::async_trait;

use crate::error::Result;

/// A single open document. Content is read through the handle at apply time
/// so the engine always sees what the user currently sees, unsaved edits
/// included.
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    fn relative_path(&self) -> &str;

    /// Range spanning the whole document, 1-based inclusive.
    async fn full_range(&self) -> LineRange;

    async fn text_in_range(&self, range: LineRange) -> Result<String>;

    async fn text(&self) -> Result<String> {
        let range = self.full_range().await;
        self.text_in_range(range).await
    }
}

/// Resolves workspace-relative paths to open documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fails with [`crate::ApplyErr::DocumentUnavailable`] when the path is
    /// not open in the host.
    async fn open(&self, relative_path: &str) -> Result<Arc<dyn DocumentHandle>>;
}
