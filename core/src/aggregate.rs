//! Collapses a turn's proposals into one before/after view per file.

use applique_protocol::CodeEditProposal;
use applique_protocol::ProposalStatus;
use applique_protocol::VersionedFileView;
use indexmap::IndexMap;

/// One [`VersionedFileView`] per distinct file, ordered by the file's first
/// appearance in `proposals`.
///
/// Failed proposals never produced content and are dropped; cancelled ones
/// are kept so the view still names what the model attempted. For each file
/// the lowest surviving version supplies the "before" side and the highest
/// the "after" side.
pub fn versioned_file_views(proposals: &[CodeEditProposal]) -> Vec<VersionedFileView> {
    let mut by_path: IndexMap<&str, VersionedFileView> = IndexMap::new();
    for proposal in proposals {
        if proposal.status == ProposalStatus::Failed {
            continue;
        }
        match by_path.get_mut(proposal.relative_path.as_str()) {
            Some(view) => {
                if proposal.version < view.old_version {
                    view.old_version = proposal.version;
                    view.old_proposal_id = proposal.id.clone();
                }
                if proposal.version > view.new_version {
                    view.new_version = proposal.version;
                    view.new_proposal_id = proposal.id.clone();
                }
            }
            None => {
                by_path.insert(
                    proposal.relative_path.as_str(),
                    VersionedFileView {
                        relative_path: proposal.relative_path.clone(),
                        old_proposal_id: proposal.id.clone(),
                        new_proposal_id: proposal.id.clone(),
                        old_version: proposal.version,
                        new_version: proposal.version,
                    },
                );
            }
        }
    }
    by_path.into_values().collect()
}
