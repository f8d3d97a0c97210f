//! Interactive diff review over a host-provided surface.
//!
//! The engine stages merged content into a host diff widget and then waits
//! for the user to work through the hunks. The host reports progress over an
//! event channel; the session resolves once every hunk is accepted or
//! rejected, or discards when the user backs out, the widget closes, or the
//! apply is cancelled.

use std::pin::pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use applique_protocol::LineRange;
use applique_protocol::ProposalId;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::document::DocumentHandle;
use crate::error::Result;

/// How the surface should present and tear down a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Close the widget as soon as the review resolves.
    pub dispose_on_close: bool,
    /// Show the diff immediately instead of waiting for the user to focus
    /// the file.
    pub render_immediately: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            dispose_on_close: true,
            render_immediately: true,
        }
    }
}

/// Hunk tally reported by the surface while the user reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkProgress {
    pub total: u32,
    /// Hunks the user has decided either way.
    pub resolved: u32,
    pub accepted: u32,
}

impl HunkProgress {
    pub fn is_complete(self) -> bool {
        self.total > 0 && self.resolved >= self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Progress(HunkProgress),
    /// The user closed the widget without resolving the remaining hunks.
    Discarded,
}

/// One live diff widget in the host.
#[async_trait]
pub trait DiffSessionHandle: Send + Sync {
    /// Presents `content` as the proposed side of the diff.
    async fn stage(&self, content: String) -> Result<()>;

    fn events(&self) -> async_channel::Receiver<SessionEvent>;

    /// Tears the widget down. Idempotent; disposing an already closed
    /// session is a no-op. A disposed session emits no further progress and
    /// must wake any waiter, either by emitting [`SessionEvent::Discarded`]
    /// or by closing its event channel.
    async fn dispose(&self);
}

/// Creates diff widgets. Implemented by the host UI layer.
#[async_trait]
pub trait DiffSurface: Send + Sync {
    async fn create_session(
        &self,
        document: Arc<dyn DocumentHandle>,
        range: LineRange,
        options: SessionOptions,
    ) -> Result<Box<dyn DiffSessionHandle>>;
}

/// Outcome of a staged review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResolution {
    Resolved { total: u32, accepted: u32 },
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Opened,
    Resolving,
    Resolved,
    Discarded,
}

struct SessionInner {
    proposal_id: ProposalId,
    handle: Box<dyn DiffSessionHandle>,
    state: Mutex<ReviewState>,
    disposed: AtomicBool,
}

/// Engine-side wrapper around one [`DiffSessionHandle`]. Cheap to clone; all
/// clones share the widget and its state.
#[derive(Clone)]
pub struct DiffReviewSession {
    inner: Arc<SessionInner>,
}

impl DiffReviewSession {
    pub(crate) fn new(proposal_id: ProposalId, handle: Box<dyn DiffSessionHandle>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                proposal_id,
                handle,
                state: Mutex::new(ReviewState::Opened),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn proposal_id(&self) -> &ProposalId {
        &self.inner.proposal_id
    }

    pub fn state(&self) -> ReviewState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ReviewState) {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn same_session(&self, other: &DiffReviewSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stages `content` and waits until the user resolves every hunk, the
    /// widget goes away, or `cancel` fires.
    pub(crate) async fn stage_and_await(
        &self,
        content: String,
        cancel: &CancellationToken,
    ) -> Result<SessionResolution> {
        let events = self.inner.handle.events();
        self.set_state(ReviewState::Resolving);
        if let Err(err) = self.inner.handle.stage(content).await {
            self.dispose().await;
            return Err(err);
        }

        let mut cancelled = pin!(cancel.cancelled());
        loop {
            tokio::select! {
                () = &mut cancelled => {
                    debug!(proposal = %self.inner.proposal_id, "review cancelled");
                    self.dispose().await;
                    return Ok(SessionResolution::Discarded);
                }
                event = events.recv() => match event {
                    Ok(SessionEvent::Progress(progress)) if progress.is_complete() => {
                        self.set_state(ReviewState::Resolved);
                        return Ok(SessionResolution::Resolved {
                            total: progress.total,
                            accepted: progress.accepted,
                        });
                    }
                    Ok(SessionEvent::Progress(_)) => {}
                    Ok(SessionEvent::Discarded) | Err(_) => {
                        self.dispose().await;
                        return Ok(SessionResolution::Discarded);
                    }
                },
            }
        }
    }

    /// Tears down the widget once. A session that already resolved keeps its
    /// resolved state; anything else becomes discarded.
    pub(crate) async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state != ReviewState::Resolved {
                *state = ReviewState::Discarded;
            }
        }
        self.inner.handle.dispose().await;
    }
}

/// At most one review session is live at a time. Installing a new session
/// tears the previous one down before the caller proceeds to stage content.
#[derive(Default)]
pub(crate) struct ActiveSessionSlot {
    current: tokio::sync::Mutex<Option<DiffReviewSession>>,
}

impl ActiveSessionSlot {
    pub(crate) async fn replace(&self, session: DiffReviewSession) {
        let previous = {
            let mut current = self.current.lock().await;
            current.replace(session)
        };
        if let Some(previous) = previous {
            debug!(proposal = %previous.proposal_id(), "replacing active review session");
            previous.dispose().await;
        }
    }

    /// Clears the slot if `session` still occupies it.
    pub(crate) async fn release(&self, session: &DiffReviewSession) {
        let mut current = self.current.lock().await;
        if current
            .as_ref()
            .is_some_and(|active| active.same_session(session))
        {
            *current = None;
        }
    }

    /// Disposes the active session when it belongs to `proposal`.
    pub(crate) async fn dispose_for(&self, proposal: &ProposalId) {
        let session = {
            let mut current = self.current.lock().await;
            match current.as_ref() {
                Some(active) if active.proposal_id() == proposal => current.take(),
                _ => None,
            }
        };
        if let Some(session) = session {
            session.dispose().await;
        }
    }

    pub(crate) async fn active_proposal(&self) -> Option<ProposalId> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|session| session.proposal_id().clone())
    }
}
