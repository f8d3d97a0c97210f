//! The proposal record and its lifecycle.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::diagnostic::Diagnostic;
use crate::ids::MessageId;
use crate::ids::ProposalId;
use crate::ids::TurnId;

/// Where a proposal sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// The merge generation is still producing full file content.
    Generating,
    /// Merged content exists and is staged (or about to be staged) for
    /// review.
    Pending,
    /// The user resolved the review and kept at least one hunk.
    Success,
    /// The user backed out, or the apply was cancelled in flight.
    Cancelled,
    /// Something went wrong before the review could finish.
    Failed,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Cancelled | Self::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// The forward path is `Generating -> Pending -> Success`. `Failed` is
    /// reachable from any non-terminal state; `Cancelled` only while the
    /// proposal is still in flight. Terminal states never change again.
    pub fn can_transition(self, next: ProposalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Generating, Self::Pending)
                | (Self::Pending, Self::Success)
                | (Self::Generating | Self::Pending, Self::Cancelled)
                | (Self::Generating | Self::Pending, Self::Failed)
        )
    }
}

/// What staging a proposal produced: the unified diff the user resolved and
/// the lint findings reported inside its changed ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub diff: String,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// One LLM-proposed edit to one file, tracked from snippet to reviewed patch.
///
/// Proposals are created once and then only mutated by the engine; superseded
/// proposals stay in the turn history so later registrations can count
/// retries and the multi-file view can span versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEditProposal {
    pub id: ProposalId,
    pub turn_id: TurnId,
    pub message_id: MessageId,
    /// Workspace-relative path of the file being edited.
    pub relative_path: String,
    /// The partial edit as proposed, elision markers included.
    pub snippet: String,
    /// Full updated file content once the merge generation finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,
    pub status: ProposalStatus,
    /// Position in a chain of consecutive diagnostics-bearing edits to the
    /// same file, starting at 1.
    pub iteration_count: u32,
    /// 1-based, monotonically increasing per `(turn, relative_path)`.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_result: Option<ApplyResult>,
}

impl CodeEditProposal {
    /// Lint findings recorded by the last apply, empty when none ran.
    pub fn apply_diagnostics(&self) -> &[Diagnostic] {
        self.apply_result
            .as_ref()
            .map(|result| result.diagnostics.as_slice())
            .unwrap_or_default()
    }

    /// True when the last apply left lint findings behind.
    pub fn has_unresolved_diagnostics(&self) -> bool {
        !self.apply_diagnostics().is_empty()
    }
}
