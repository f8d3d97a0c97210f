//! Conversation-side storage for proposals.
//!
//! Proposals hang off the assistant message that produced them. The engine
//! only appends and rewrites whole per-message maps; ordering inside a map is
//! insertion order and doubles as chronological order within the message.

use std::sync::PoisonError;
use std::sync::RwLock;

use applique_protocol::CodeEditProposal;
use applique_protocol::MessageId;
use applique_protocol::ProposalId;
use applique_protocol::TurnId;
use indexmap::IndexMap;

pub type ProposalMap = IndexMap<ProposalId, CodeEditProposal>;

/// Where proposals live between engine calls. Hosts that keep conversation
/// state of their own implement this over it; everyone else can use
/// [`MemoryHistoryStore`].
pub trait HistoryStore: Send + Sync {
    /// Assistant message ids for `turn`, oldest first. Empty when the turn is
    /// unknown or has produced no assistant message yet.
    fn messages(&self, turn: &TurnId) -> Vec<MessageId>;

    fn proposals(&self, message: &MessageId) -> ProposalMap;

    fn set_proposals(&self, message: &MessageId, proposals: ProposalMap);
}

#[derive(Default)]
struct MemoryHistoryInner {
    turns: IndexMap<TurnId, Vec<MessageId>>,
    proposals: IndexMap<MessageId, ProposalMap>,
}

/// In-memory [`HistoryStore`] for hosts without conversation persistence and
/// for tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    inner: RwLock<MemoryHistoryInner>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `message` is the latest assistant message of `turn`.
    pub fn push_message(&self, turn: &TurnId, message: &MessageId) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.turns.entry(turn.clone()).or_default().push(message.clone());
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn messages(&self, turn: &TurnId) -> Vec<MessageId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.turns.get(turn).cloned().unwrap_or_default()
    }

    fn proposals(&self, message: &MessageId) -> ProposalMap {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.proposals.get(message).cloned().unwrap_or_default()
    }

    fn set_proposals(&self, message: &MessageId, proposals: ProposalMap) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.proposals.insert(message.clone(), proposals);
    }
}
