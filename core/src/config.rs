use serde::Deserialize;
use serde::Serialize;

/// How many consecutive diagnostics-bearing edits to one file the engine
/// tolerates before refusing to apply another.
pub const DEFAULT_MAX_APPLY_ITERATIONS: u32 = 3;

const DEFAULT_UPDATE_CHANNEL_CAPACITY: usize = 128;

/// Engine tuning knobs. Hosts usually deserialize this from their own config
/// file; every field has a default so an empty table works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on `iteration_count` before an apply is rejected.
    pub max_apply_iterations: u32,

    /// Bound on the proposal update channel. Updates beyond this are dropped
    /// for slow subscribers rather than blocking the engine.
    pub update_channel_capacity: usize,

    /// Overrides the built-in instructions sent with every merge request.
    pub merge_instructions: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_apply_iterations: DEFAULT_MAX_APPLY_ITERATIONS,
            update_channel_capacity: DEFAULT_UPDATE_CHANNEL_CAPACITY,
            merge_instructions: None,
        }
    }
}

impl EngineConfig {
    pub fn merge_instruction_text(&self) -> &str {
        self.merge_instructions
            .as_deref()
            .unwrap_or(crate::merge::MERGE_INSTRUCTIONS)
    }
}
