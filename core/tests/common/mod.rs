//! Scriptable doubles for the host-facing traits plus a ready-made engine.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use applique_core::ApplyEngine;
use applique_core::ApplyErr;
use applique_core::Result;
use applique_core::config::EngineConfig;
use applique_core::diagnostics::DiagnosticsGate;
use applique_core::document::DocumentHandle;
use applique_core::document::DocumentStore;
use applique_core::history::MemoryHistoryStore;
use applique_core::merge::MergeRequester;
use applique_core::review::DiffSessionHandle;
use applique_core::review::DiffSurface;
use applique_core::review::HunkProgress;
use applique_core::review::SessionEvent;
use applique_core::review::SessionOptions;
use applique_protocol::Diagnostic;
use applique_protocol::LineRange;
use applique_protocol::MessageId;
use applique_protocol::TurnId;
use async_trait::async_trait;

pub enum MergeBehavior {
    Respond(String),
    Fail(String),
    /// Never resolves; pairs with [`ScriptedMerge::wait_until_started`] so a
    /// test can cancel mid-merge.
    Hang,
}

pub struct ScriptedMerge {
    script: Mutex<VecDeque<MergeBehavior>>,
    calls: AtomicUsize,
    started_tx: async_channel::Sender<()>,
    started_rx: async_channel::Receiver<()>,
}

impl Default for ScriptedMerge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedMerge {
    pub fn new() -> Self {
        let (started_tx, started_rx) = async_channel::unbounded();
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            started_tx,
            started_rx,
        }
    }

    pub fn push(&self, behavior: MergeBehavior) {
        self.script.lock().unwrap().push_back(behavior);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_until_started(&self) {
        self.started_rx
            .recv()
            .await
            .expect("merge started signal should arrive");
    }
}

#[async_trait]
impl MergeRequester for ScriptedMerge {
    async fn merge(&self, _original: &str, _snippet: &str, _instructions: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("merge requester called with an empty script");
        let _ = self.started_tx.try_send(());
        match behavior {
            MergeBehavior::Respond(content) => Ok(content),
            MergeBehavior::Fail(reason) => Err(ApplyErr::MergeRequest { reason }),
            MergeBehavior::Hang => Ok(futures::future::pending().await),
        }
    }
}

pub struct MemoryDocument {
    relative_path: String,
    text: RwLock<String>,
}

impl MemoryDocument {
    pub fn set_text(&self, text: &str) {
        *self.text.write().unwrap() = text.to_string();
    }

    pub fn current_text(&self) -> String {
        self.text.read().unwrap().clone()
    }
}

fn full_range_of(text: &str) -> LineRange {
    let count = text.split_inclusive('\n').count().max(1);
    LineRange::new(1, u32::try_from(count).unwrap_or(u32::MAX))
}

#[async_trait]
impl DocumentHandle for MemoryDocument {
    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    async fn full_range(&self) -> LineRange {
        full_range_of(&self.current_text())
    }

    async fn text_in_range(&self, range: LineRange) -> Result<String> {
        let text = self.current_text();
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let start = (range.start.max(1) as usize) - 1;
        let end = (range.end as usize).min(lines.len());
        if start >= end {
            return Ok(String::new());
        }
        Ok(lines[start..end].concat())
    }
}

#[derive(Default)]
pub struct MemoryDocuments {
    docs: RwLock<HashMap<String, Arc<MemoryDocument>>>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, relative_path: &str, text: &str) -> Arc<MemoryDocument> {
        let document = Arc::new(MemoryDocument {
            relative_path: relative_path.to_string(),
            text: RwLock::new(text.to_string()),
        });
        self.docs
            .write()
            .unwrap()
            .insert(relative_path.to_string(), document.clone());
        document
    }

    pub fn get(&self, relative_path: &str) -> Option<Arc<MemoryDocument>> {
        self.docs.read().unwrap().get(relative_path).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn open(&self, relative_path: &str) -> Result<Arc<dyn DocumentHandle>> {
        self.get(relative_path)
            .map(|document| document as Arc<dyn DocumentHandle>)
            .ok_or_else(|| ApplyErr::DocumentUnavailable {
                path: relative_path.to_string(),
            })
    }
}

pub enum SurfaceScript {
    /// The user accepts every hunk: the document takes the staged content.
    AcceptAll,
    RejectAll,
    /// The user keeps some hunks. `after_text` is the document content those
    /// decisions leave behind.
    PartialAccept {
        after_text: String,
        total: u32,
        accepted: u32,
    },
    /// The user closes the widget without resolving.
    Discard,
    /// The widget stays open until disposed or cancelled.
    Hold,
}

pub struct ScriptedSurface {
    documents: Arc<MemoryDocuments>,
    script: Mutex<VecDeque<SurfaceScript>>,
    opened: AtomicUsize,
    disposed: Arc<AtomicUsize>,
    journal: Arc<Mutex<Vec<String>>>,
    staged_tx: async_channel::Sender<String>,
    staged_rx: async_channel::Receiver<String>,
}

impl ScriptedSurface {
    pub fn new(documents: Arc<MemoryDocuments>) -> Self {
        let (staged_tx, staged_rx) = async_channel::unbounded();
        Self {
            documents,
            script: Mutex::new(VecDeque::new()),
            opened: AtomicUsize::new(0),
            disposed: Arc::new(AtomicUsize::new(0)),
            journal: Arc::new(Mutex::new(Vec::new())),
            staged_tx,
            staged_rx,
        }
    }

    pub fn push(&self, script: SurfaceScript) {
        self.script.lock().unwrap().push_back(script);
    }

    /// How many review sessions were opened.
    pub fn session_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stage and dispose operations in the order they happened.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    /// Blocks until some session stages content; returns its path.
    pub async fn wait_until_staged(&self) -> String {
        self.staged_rx
            .recv()
            .await
            .expect("staged signal should arrive")
    }
}

#[async_trait]
impl DiffSurface for ScriptedSurface {
    async fn create_session(
        &self,
        document: Arc<dyn DocumentHandle>,
        _range: LineRange,
        _options: SessionOptions,
    ) -> Result<Box<dyn DiffSessionHandle>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let relative_path = document.relative_path().to_string();
        let document = self
            .documents
            .get(&relative_path)
            .ok_or_else(|| ApplyErr::DocumentUnavailable {
                path: relative_path.clone(),
            })?;
        let script = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SurfaceScript::AcceptAll);
        let (events_tx, events_rx) = async_channel::unbounded();
        Ok(Box::new(ScriptedHandle {
            relative_path,
            script,
            document,
            events_tx,
            events_rx,
            disposed: self.disposed.clone(),
            journal: self.journal.clone(),
            staged_tx: self.staged_tx.clone(),
        }))
    }
}

struct ScriptedHandle {
    relative_path: String,
    script: SurfaceScript,
    document: Arc<MemoryDocument>,
    events_tx: async_channel::Sender<SessionEvent>,
    events_rx: async_channel::Receiver<SessionEvent>,
    disposed: Arc<AtomicUsize>,
    journal: Arc<Mutex<Vec<String>>>,
    staged_tx: async_channel::Sender<String>,
}

impl ScriptedHandle {
    fn send(&self, event: SessionEvent) {
        self.events_tx
            .try_send(event)
            .expect("events channel should stay open");
    }
}

#[async_trait]
impl DiffSessionHandle for ScriptedHandle {
    async fn stage(&self, content: String) -> Result<()> {
        let path = &self.relative_path;
        self.journal.lock().unwrap().push(format!("stage {path}"));
        match &self.script {
            SurfaceScript::AcceptAll => {
                self.document.set_text(&content);
                self.send(SessionEvent::Progress(HunkProgress {
                    total: 1,
                    resolved: 1,
                    accepted: 1,
                }));
            }
            SurfaceScript::RejectAll => {
                self.send(SessionEvent::Progress(HunkProgress {
                    total: 1,
                    resolved: 1,
                    accepted: 0,
                }));
            }
            SurfaceScript::PartialAccept {
                after_text,
                total,
                accepted,
            } => {
                self.document.set_text(after_text);
                self.send(SessionEvent::Progress(HunkProgress {
                    total: *total,
                    resolved: *total,
                    accepted: *accepted,
                }));
            }
            SurfaceScript::Discard => {
                self.send(SessionEvent::Discarded);
            }
            SurfaceScript::Hold => {}
        }
        let _ = self.staged_tx.try_send(self.relative_path.clone());
        Ok(())
    }

    fn events(&self) -> async_channel::Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    async fn dispose(&self) {
        let path = &self.relative_path;
        self.journal.lock().unwrap().push(format!("dispose {path}"));
        self.disposed.fetch_add(1, Ordering::SeqCst);
        let _ = self.events_tx.try_send(SessionEvent::Discarded);
    }
}

#[derive(Default)]
pub struct ScriptedDiagnostics {
    queue: Mutex<VecDeque<Vec<Diagnostic>>>,
    checks: AtomicUsize,
    last_ranges: Mutex<Vec<LineRange>>,
}

impl ScriptedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the findings the next check reports. Checks beyond the queue
    /// come back clean.
    pub fn push(&self, diagnostics: Vec<Diagnostic>) {
        self.queue.lock().unwrap().push_back(diagnostics);
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn last_ranges(&self) -> Vec<LineRange> {
        self.last_ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiagnosticsGate for ScriptedDiagnostics {
    async fn check(&self, _relative_path: &str, ranges: &[LineRange]) -> Result<Vec<Diagnostic>> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        *self.last_ranges.lock().unwrap() = ranges.to_vec();
        Ok(self.queue.lock().unwrap().pop_front().unwrap_or_default())
    }
}

pub struct TestEngine {
    pub engine: Arc<ApplyEngine>,
    pub merge: Arc<ScriptedMerge>,
    pub documents: Arc<MemoryDocuments>,
    pub surface: Arc<ScriptedSurface>,
    pub diagnostics: Arc<ScriptedDiagnostics>,
    pub history: Arc<MemoryHistoryStore>,
}

impl TestEngine {
    /// Seeds one assistant message so registrations have somewhere to land.
    pub fn seed_turn(&self, turn: &str, message: &str) -> TurnId {
        let turn = TurnId::new(turn);
        self.history.push_message(&turn, &MessageId::new(message));
        turn
    }
}

pub fn test_engine() -> TestEngine {
    test_engine_with(EngineConfig::default())
}

pub fn test_engine_with(config: EngineConfig) -> TestEngine {
    let merge = Arc::new(ScriptedMerge::new());
    let documents = Arc::new(MemoryDocuments::new());
    let surface = Arc::new(ScriptedSurface::new(documents.clone()));
    let diagnostics = Arc::new(ScriptedDiagnostics::new());
    let history = Arc::new(MemoryHistoryStore::new());
    let engine = Arc::new(ApplyEngine::new(
        merge.clone(),
        documents.clone(),
        surface.clone(),
        diagnostics.clone(),
        history.clone(),
        config,
    ));
    TestEngine {
        engine,
        merge,
        documents,
        surface,
        diagnostics,
        history,
    }
}
