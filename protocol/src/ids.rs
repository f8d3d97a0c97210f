//! Identifiers used to scope proposals to their conversation context.
//!
//! Turn, message and tool-call ids are minted by the host's transcript layer;
//! the engine only threads them through. Proposal ids normally reuse the
//! tool-call id so hosts can correlate proposals with the tool invocation
//! that announced them.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// One conversation turn: a user request plus the assistant activity it
    /// triggered.
    TurnId
);

string_id!(
    /// One assistant message within a turn.
    MessageId
);

string_id!(
    /// The tool invocation that announced a code edit.
    ToolCallId
);

string_id!(
    /// Identity of one registered proposal.
    ProposalId
);

impl ProposalId {
    /// Reuse the announcing tool call's id, the normal case.
    pub fn from_tool_call(tool_call: &ToolCallId) -> Self {
        Self(tool_call.0.clone())
    }

    /// Fallback for proposals registered without a tool call. Unique within
    /// the turn because versions are unique per path.
    pub fn synthesized(turn: &TurnId, relative_path: &str, version: u32) -> Self {
        Self(format!("{turn}/{relative_path}#v{version}"))
    }
}
