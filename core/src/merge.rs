//! The boundary to the secondary "merge" generation.
//!
//! The engine never talks to a model directly. Hosts implement
//! [`MergeRequester`] over whatever client they already have; streaming
//! clients can lean on [`StreamCollectingMerge`] instead of collecting
//! chunks themselves.

use std::fmt::Display;
use std::pin::pin;

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ApplyErr;
use crate::error::Result;

/// Instructions sent with every merge request unless the host overrides them
/// in [`crate::config::EngineConfig`].
pub const MERGE_INSTRUCTIONS: &str = include_str!("../templates/merge_instructions.md");

/// Everything a merge generation needs: the file as it stands, the partial
/// edit, and the instruction preamble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestArgs {
    pub original: String,
    pub snippet: String,
    pub instructions: String,
}

/// Produces the full updated file content for a proposed partial edit.
#[async_trait]
pub trait MergeRequester: Send + Sync {
    async fn merge(&self, original: &str, snippet: &str, instructions: &str) -> Result<String>;
}

/// [`MergeRequester`] over a chunked completion stream. `start` kicks off one
/// generation; the adapter concatenates its chunks and surfaces the first
/// stream error as a failed merge.
pub struct StreamCollectingMerge<F> {
    start: F,
}

impl<F> StreamCollectingMerge<F> {
    pub fn new(start: F) -> Self {
        Self { start }
    }
}

#[async_trait]
impl<F, S, E> MergeRequester for StreamCollectingMerge<F>
where
    F: Fn(MergeRequestArgs) -> S + Send + Sync,
    S: Stream<Item = std::result::Result<String, E>> + Send,
    E: Display + Send,
{
    async fn merge(&self, original: &str, snippet: &str, instructions: &str) -> Result<String> {
        let stream = (self.start)(MergeRequestArgs {
            original: original.to_string(),
            snippet: snippet.to_string(),
            instructions: instructions.to_string(),
        });
        let mut stream = pin!(stream);
        let mut merged = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| ApplyErr::MergeRequest {
                reason: err.to_string(),
            })?;
            merged.push_str(&chunk);
        }
        Ok(merged)
    }
}
