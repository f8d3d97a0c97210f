//! Pure bookkeeping over a turn's proposal history.

use applique_protocol::CodeEditProposal;

/// Version for the next proposal targeting `relative_path` within the turn
/// whose history is given (1-based, counting every prior proposal for the
/// same file regardless of outcome).
pub fn next_version(history: &[CodeEditProposal], relative_path: &str) -> u32 {
    let prior = history
        .iter()
        .filter(|proposal| proposal.relative_path == relative_path)
        .count();
    u32::try_from(prior).unwrap_or(u32::MAX).saturating_add(1)
}

/// Iteration count for the next proposal targeting `relative_path`.
///
/// Walks prior proposals for the file newest-first and counts the unbroken
/// run whose applies left diagnostics behind. A prior edit that applied
/// cleanly (or never produced an apply result) ends the run, so the next
/// proposal starts a fresh chain at 1.
pub fn iteration_count(history: &[CodeEditProposal], relative_path: &str) -> u32 {
    let mut count: u32 = 1;
    for prior in history
        .iter()
        .rev()
        .filter(|proposal| proposal.relative_path == relative_path)
    {
        if prior.has_unresolved_diagnostics() {
            count = count.saturating_add(1);
        } else {
            break;
        }
    }
    count
}
