//! Orchestrates a proposal from registration to resolved patch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use applique_protocol::ApplyResult;
use applique_protocol::CodeEditProposal;
use applique_protocol::LineRange;
use applique_protocol::MessageId;
use applique_protocol::ProposalId;
use applique_protocol::ProposalStatus;
use applique_protocol::ToolCallId;
use applique_protocol::TurnId;
use applique_protocol::VersionedFileView;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use uuid::Uuid;

use crate::aggregate;
use crate::config::EngineConfig;
use crate::diagnostics::DiagnosticsGate;
use crate::document::DocumentStore;
use crate::error::ApplyErr;
use crate::error::Result;
use crate::history::HistoryStore;
use crate::merge::MergeRequester;
use crate::patch;
use crate::proposals;
use crate::review::ActiveSessionSlot;
use crate::review::DiffReviewSession;
use crate::review::DiffSurface;
use crate::review::SessionOptions;
use crate::review::SessionResolution;

/// The apply engine. One instance serves a whole host; per-proposal state
/// lives in the [`HistoryStore`], so the engine itself is cheap to share
/// behind an [`Arc`].
pub struct ApplyEngine {
    merge: Arc<dyn MergeRequester>,
    documents: Arc<dyn DocumentStore>,
    surface: Arc<dyn DiffSurface>,
    diagnostics: Arc<dyn DiagnosticsGate>,
    history: Arc<dyn HistoryStore>,
    config: EngineConfig,
    /// Serializes registration so concurrent proposals for one file get
    /// distinct versions.
    registration: tokio::sync::Mutex<()>,
    /// Serializes read-modify-write of per-message proposal maps.
    persistence: Mutex<()>,
    active_session: ActiveSessionSlot,
    inflight: Mutex<HashMap<ProposalId, CancellationToken>>,
    tx_update: async_channel::Sender<CodeEditProposal>,
    /// Kept so the update channel stays open while nobody subscribes.
    rx_update: async_channel::Receiver<CodeEditProposal>,
}

impl ApplyEngine {
    pub fn new(
        merge: Arc<dyn MergeRequester>,
        documents: Arc<dyn DocumentStore>,
        surface: Arc<dyn DiffSurface>,
        diagnostics: Arc<dyn DiagnosticsGate>,
        history: Arc<dyn HistoryStore>,
        config: EngineConfig,
    ) -> Self {
        let (tx_update, rx_update) = async_channel::bounded(config.update_channel_capacity);
        Self {
            merge,
            documents,
            surface,
            diagnostics,
            history,
            config,
            registration: tokio::sync::Mutex::new(()),
            persistence: Mutex::new(()),
            active_session: ActiveSessionSlot::default(),
            inflight: Mutex::new(HashMap::new()),
            tx_update,
            rx_update,
        }
    }

    /// Snapshot stream of proposal changes. Every status change (and the
    /// initial registration) emits one full proposal snapshot.
    pub fn updates(&self) -> async_channel::Receiver<CodeEditProposal> {
        self.rx_update.clone()
    }

    /// Records a new proposal on the turn's latest assistant message.
    ///
    /// The proposal starts out `generating`; versions count per
    /// `(turn, relative_path)` and the iteration count extends the current
    /// diagnostics chain for the file, if one is open.
    pub async fn register_proposal(
        &self,
        turn: &TurnId,
        relative_path: &str,
        snippet: &str,
        tool_call: Option<&ToolCallId>,
    ) -> Result<CodeEditProposal> {
        let _guard = self.registration.lock().await;

        let message = self.latest_message(turn)?;
        let turn_history = self.turn_history(turn);
        let version = proposals::next_version(&turn_history, relative_path);
        let iteration_count = proposals::iteration_count(&turn_history, relative_path);
        let id = match tool_call {
            Some(tool_call) => ProposalId::from_tool_call(tool_call),
            None => ProposalId::synthesized(turn, relative_path, version),
        };

        let proposal = CodeEditProposal {
            id,
            turn_id: turn.clone(),
            message_id: message,
            relative_path: relative_path.to_string(),
            snippet: snippet.to_string(),
            merged_content: None,
            status: ProposalStatus::Generating,
            iteration_count,
            version,
            created_at: Utc::now(),
            apply_result: None,
        };
        self.persist(&proposal);
        debug!(
            id = %proposal.id,
            path = %proposal.relative_path,
            version = proposal.version,
            iteration = proposal.iteration_count,
            "registered proposal"
        );
        self.emit(&proposal);
        Ok(proposal)
    }

    /// Runs a registered proposal through merge, review, and diagnostics.
    ///
    /// Fails without touching the merge requester when the proposal's
    /// iteration count is already past the configured budget. Returns the
    /// proposal's final snapshot; callers learn whether the user kept the
    /// edit from its status and `apply_result`.
    pub async fn apply(&self, proposal: &CodeEditProposal) -> Result<CodeEditProposal> {
        let attempt = Uuid::new_v4();
        let mut current = self.load(proposal)?;
        debug!(
            %attempt,
            id = %current.id,
            path = %current.relative_path,
            iteration = current.iteration_count,
            "starting apply"
        );

        if current.iteration_count > self.config.max_apply_iterations {
            self.transition(&mut current, ProposalStatus::Failed);
            return Err(ApplyErr::IterationBudgetExceeded {
                path: current.relative_path,
                iterations: current.iteration_count,
            });
        }

        let cancel = CancellationToken::new();
        self.track_inflight(&current.id, cancel.clone());
        let outcome = self.run_apply(&mut current, &cancel).await;
        self.untrack_inflight(&current.id);

        if let Err(err) = outcome {
            warn!(%attempt, id = %current.id, "apply failed: {err}");
            if !current.status.is_terminal() {
                self.transition(&mut current, ProposalStatus::Failed);
            }
            return Err(err);
        }
        Ok(current)
    }

    async fn run_apply(
        &self,
        current: &mut CodeEditProposal,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let document = self.documents.open(&current.relative_path).await?;
        let original = document.text().await?;

        let snippet = current.snippet.clone();
        let merged = tokio::select! {
            () = cancel.cancelled() => {
                self.transition(current, ProposalStatus::Cancelled);
                return Ok(());
            }
            merged = self.merge.merge(
                &original,
                &snippet,
                self.config.merge_instruction_text(),
            ) => merged?,
        };
        current.merged_content = Some(merged);
        self.persist(current);

        self.render_inner(current, None, cancel).await?;
        Ok(())
    }

    /// Stages an already merged proposal for review without re-running the
    /// merge generation. `range` scopes the widget; `None` covers the whole
    /// document.
    pub async fn render_apply_result(
        &self,
        proposal: &CodeEditProposal,
        range: Option<LineRange>,
    ) -> Result<Option<ApplyResult>> {
        let mut current = self.load(proposal)?;
        let cancel = self.inflight_token(&current.id).unwrap_or_default();
        let outcome = self.render_inner(&mut current, range, &cancel).await;
        if outcome.is_err() && !current.status.is_terminal() {
            self.transition(&mut current, ProposalStatus::Failed);
        }
        outcome
    }

    async fn render_inner(
        &self,
        current: &mut CodeEditProposal,
        range: Option<LineRange>,
        cancel: &CancellationToken,
    ) -> Result<Option<ApplyResult>> {
        let Some(merged) = current.merged_content.clone() else {
            return Err(ApplyErr::DiffSession {
                path: current.relative_path.clone(),
                reason: "no merged content staged for review".to_string(),
            });
        };
        let document = self.documents.open(&current.relative_path).await?;
        let range = match range {
            Some(range) => range,
            None => document.full_range().await,
        };

        self.transition(current, ProposalStatus::Pending);
        if current.status != ProposalStatus::Pending {
            // Cancelled (or failed) out from under us while merging.
            return Ok(None);
        }

        let before_region = document.text_in_range(range).await?;
        let before = document.text().await?;
        if merged == before_region {
            debug!(id = %current.id, "merged content matches the document; nothing to stage");
            self.transition(current, ProposalStatus::Success);
            return Ok(None);
        }

        let handle = self
            .surface
            .create_session(document.clone(), range, SessionOptions::default())
            .await?;
        let session = DiffReviewSession::new(current.id.clone(), handle);
        self.active_session.replace(session.clone()).await;
        let resolution = session.stage_and_await(merged, cancel).await;
        self.active_session.release(&session).await;

        match resolution? {
            SessionResolution::Resolved { accepted, total } if accepted > 0 => {
                let after = document.text().await?;
                let diff = patch::unified_diff(&before, &after);
                let changed = patch::changed_line_ranges(&diff)?;
                let diagnostics = self
                    .diagnostics
                    .check(&current.relative_path, &changed)
                    .await?;
                debug!(
                    id = %current.id,
                    accepted,
                    total,
                    diagnostics = diagnostics.len(),
                    "review resolved"
                );
                let result = ApplyResult { diff, diagnostics };
                current.apply_result = Some(result.clone());
                self.transition(current, ProposalStatus::Success);
                Ok(Some(result))
            }
            SessionResolution::Resolved { .. } | SessionResolution::Discarded => {
                self.transition(current, ProposalStatus::Cancelled);
                Ok(None)
            }
        }
    }

    /// Cancels one proposal: stops an in-flight apply, closes its review
    /// session, and marks it `cancelled`. Already terminal proposals are
    /// returned unchanged.
    pub async fn cancel_apply(&self, proposal: &CodeEditProposal) -> Result<CodeEditProposal> {
        let mut current = self.load(proposal)?;
        if current.status.is_terminal() {
            return Ok(current);
        }
        if let Some(token) = self.inflight_token(&current.id) {
            token.cancel();
        }
        self.active_session.dispose_for(&current.id).await;
        self.transition(&mut current, ProposalStatus::Cancelled);
        Ok(current)
    }

    /// Cancels every non-terminal proposal of `turn`. Other turns are not
    /// touched.
    pub async fn cancel_all(&self, turn: &TurnId) -> Result<Vec<CodeEditProposal>> {
        self.cancel_matching(turn, |_| true).await
    }

    /// Cancels the turn's non-terminal proposals for one file.
    pub async fn cancel_for_path(
        &self,
        turn: &TurnId,
        relative_path: &str,
    ) -> Result<Vec<CodeEditProposal>> {
        self.cancel_matching(turn, |proposal| proposal.relative_path == relative_path)
            .await
    }

    async fn cancel_matching(
        &self,
        turn: &TurnId,
        matches: impl Fn(&CodeEditProposal) -> bool,
    ) -> Result<Vec<CodeEditProposal>> {
        let mut cancelled = Vec::new();
        for proposal in self.turn_history(turn) {
            if proposal.status.is_terminal() || !matches(&proposal) {
                continue;
            }
            cancelled.push(self.cancel_apply(&proposal).await?);
        }
        Ok(cancelled)
    }

    /// Where the host should move the cursor after an apply: the first hunk
    /// of the recorded patch.
    pub fn reveal_position(proposal: &CodeEditProposal) -> Option<LineRange> {
        let result = proposal.apply_result.as_ref()?;
        patch::first_hunk_range(&result.diff)
    }

    /// Deduplicated before/after view of everything the turn changed.
    pub fn multi_file_view(&self, turn: &TurnId) -> Vec<VersionedFileView> {
        aggregate::versioned_file_views(&self.turn_history(turn))
    }

    /// Proposal whose review session is currently on screen, if any.
    pub async fn active_review(&self) -> Option<ProposalId> {
        self.active_session.active_proposal().await
    }

    pub fn proposal(&self, turn: &TurnId, id: &ProposalId) -> Result<CodeEditProposal> {
        self.turn_history(turn)
            .into_iter()
            .find(|proposal| proposal.id == *id)
            .ok_or_else(|| ApplyErr::ProposalNotFound { id: id.clone() })
    }

    /// Every proposal of the turn, oldest message first, registration order
    /// within a message.
    pub fn turn_proposals(&self, turn: &TurnId) -> Vec<CodeEditProposal> {
        self.turn_history(turn)
    }

    pub fn latest_for_path(&self, turn: &TurnId, relative_path: &str) -> Option<CodeEditProposal> {
        self.turn_history(turn)
            .into_iter()
            .rev()
            .find(|proposal| proposal.relative_path == relative_path)
    }

    fn latest_message(&self, turn: &TurnId) -> Result<MessageId> {
        self.history
            .messages(turn)
            .last()
            .cloned()
            .ok_or_else(|| ApplyErr::TurnUnavailable { turn: turn.clone() })
    }

    fn turn_history(&self, turn: &TurnId) -> Vec<CodeEditProposal> {
        self.history
            .messages(turn)
            .iter()
            .flat_map(|message| self.history.proposals(message).into_values())
            .collect()
    }

    fn load(&self, proposal: &CodeEditProposal) -> Result<CodeEditProposal> {
        self.history
            .proposals(&proposal.message_id)
            .get(&proposal.id)
            .cloned()
            .ok_or_else(|| ApplyErr::ProposalNotFound {
                id: proposal.id.clone(),
            })
    }

    /// Moves `proposal` to `next` if the lifecycle allows it, persisting and
    /// emitting the new snapshot. Syncs the status from the store first so a
    /// concurrent cancel wins; an illegal move is logged and skipped, never
    /// applied.
    fn transition(&self, proposal: &mut CodeEditProposal, next: ProposalStatus) {
        if let Ok(stored) = self.load(proposal) {
            proposal.status = stored.status;
        }
        if proposal.status == next {
            return;
        }
        if !proposal.status.can_transition(next) {
            warn!(
                id = %proposal.id,
                from = ?proposal.status,
                to = ?next,
                "refusing illegal status transition"
            );
            return;
        }
        proposal.status = next;
        self.persist(proposal);
        self.emit(proposal);
    }

    fn persist(&self, proposal: &CodeEditProposal) {
        let _guard = self.persistence.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.history.proposals(&proposal.message_id);
        map.insert(proposal.id.clone(), proposal.clone());
        self.history.set_proposals(&proposal.message_id, map);
    }

    fn emit(&self, proposal: &CodeEditProposal) {
        if self.tx_update.try_send(proposal.clone()).is_err() {
            trace!(id = %proposal.id, "dropping proposal update for slow subscriber");
        }
    }

    fn track_inflight(&self, id: &ProposalId, token: CancellationToken) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), token);
    }

    fn untrack_inflight(&self, id: &ProposalId) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    fn inflight_token(&self, id: &ProposalId) -> Option<CancellationToken> {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}
