use serde::Deserialize;
use serde::Serialize;

/// Inclusive, 1-based span of lines inside a document.
///
/// Editors and diagnostics both speak in 1-based line numbers, so ranges
/// keep that convention instead of converting at every boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Range covering exactly one line.
    pub fn single(line: u32) -> Self {
        Self {
            start: line,
            end: line,
        }
    }

    pub fn contains_line(self, line: u32) -> bool {
        (self.start..=self.end).contains(&line)
    }

    pub fn overlaps(self, other: LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Number of lines covered. Inclusive bounds mean a well-formed range is
    /// never empty.
    pub fn line_count(self) -> u32 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }
}
