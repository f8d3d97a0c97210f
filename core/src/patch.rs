//! Unified-diff helpers built on `diffy`.
//!
//! Changed ranges come from walking hunk bodies, not from hunk headers: a
//! header span includes up to three context lines on each side, which is more
//! than the edit touched. `Patch::from_str` treats headerless text as an empty
//! patch; only a corrupt hunk body is a parse error.

use applique_protocol::LineRange;

use crate::error::ApplyErr;
use crate::error::Result;

/// Renders the unified diff from `original` to `updated`.
pub fn unified_diff(original: &str, updated: &str) -> String {
    diffy::create_patch(original, updated).to_string()
}

/// Post-image line ranges of the lines `diff` inserts or rewrites, in hunk
/// order. Context lines are excluded; insertions separated only by deletions
/// coalesce into one range.
pub fn changed_line_ranges(diff: &str) -> Result<Vec<LineRange>> {
    let patch =
        diffy::Patch::from_str(diff).map_err(|err| ApplyErr::MalformedDiff(err.to_string()))?;
    let mut ranges = Vec::new();
    for hunk in patch.hunks() {
        push_inserted_ranges(hunk, &mut ranges);
    }
    Ok(ranges)
}

/// Post-image range of the first change in `diff`'s first hunk, if the diff
/// has one.
pub fn first_hunk_range(diff: &str) -> Option<LineRange> {
    let patch = diffy::Patch::from_str(diff).ok()?;
    let hunk = patch.hunks().first()?;
    let mut ranges = Vec::new();
    push_inserted_ranges(hunk, &mut ranges);
    if let Some(range) = ranges.first() {
        return Some(*range);
    }
    // A deletion-only hunk inserts nothing; point at the post-image line that
    // moved up into the removed spot.
    let mut new_ln = clamp_line(hunk.new_range().start());
    for line in hunk.lines() {
        if matches!(line, diffy::Line::Delete(_)) {
            break;
        }
        new_ln += 1;
    }
    Some(LineRange::single(new_ln))
}

/// Applies `diff` to `original`, reproducing the post-image it was created
/// from.
pub fn apply_to(original: &str, diff: &str) -> Result<String> {
    let patch =
        diffy::Patch::from_str(diff).map_err(|err| ApplyErr::MalformedDiff(err.to_string()))?;
    diffy::apply(original, &patch).map_err(|err| ApplyErr::MalformedDiff(err.to_string()))
}

fn push_inserted_ranges(hunk: &diffy::Hunk<'_, str>, out: &mut Vec<LineRange>) {
    let mut new_ln = clamp_line(hunk.new_range().start());
    let mut open: Option<LineRange> = None;
    for line in hunk.lines() {
        match line {
            diffy::Line::Insert(_) => {
                open = Some(match open {
                    Some(range) => LineRange::new(range.start, new_ln),
                    None => LineRange::single(new_ln),
                });
                new_ln += 1;
            }
            // No post-image line; insertions on either side stay contiguous.
            diffy::Line::Delete(_) => {}
            diffy::Line::Context(_) => {
                if let Some(range) = open.take() {
                    out.push(range);
                }
                new_ln += 1;
            }
        }
    }
    if let Some(range) = open {
        out.push(range);
    }
}

fn clamp_line(header_start: usize) -> u32 {
    // An empty post-image range (whole-file deletion) is written `+0,0`;
    // clamp to 1 so the result is always a valid line number.
    u32::try_from(header_start).unwrap_or(u32::MAX).max(1)
}
