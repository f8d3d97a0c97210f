use serde::Deserialize;
use serde::Serialize;

use crate::ids::ProposalId;

/// One row of the per-turn multi-file diff: the oldest and newest surviving
/// proposal for a single file, so hosts can render a before/after spanning
/// every intermediate edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedFileView {
    pub relative_path: String,
    /// Proposal whose pre-image is the "before" side.
    pub old_proposal_id: ProposalId,
    /// Proposal whose post-image is the "after" side.
    pub new_proposal_id: ProposalId,
    pub old_version: u32,
    pub new_version: u32,
}
