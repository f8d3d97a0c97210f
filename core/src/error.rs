use applique_protocol::ProposalId;
use applique_protocol::TurnId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApplyErr>;

#[derive(Debug, Error)]
pub enum ApplyErr {
    #[error("merge request failed: {reason}")]
    MergeRequest { reason: String },

    #[error("no open document for {path}")]
    DocumentUnavailable { path: String },

    #[error("gave up applying edits to {path} after {iterations} iterations")]
    IterationBudgetExceeded { path: String, iterations: u32 },

    #[error("diff review session for {path} failed: {reason}")]
    DiffSession { path: String, reason: String },

    #[error("failed to collect diagnostics for {path}: {reason}")]
    Diagnostics { path: String, reason: String },

    #[error("unknown proposal {id}")]
    ProposalNotFound { id: ProposalId },

    #[error("turn {turn} has no assistant message to record proposals on")]
    TurnUnavailable { turn: TurnId },

    #[error("malformed unified diff: {0}")]
    MalformedDiff(String),
}
