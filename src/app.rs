//! The application session: explicit owner of all per-user state.
//!
//! [`ApplicationSession`] ties the corpus, the conversation state and the
//! completion backend together and guards the single outstanding analysis
//! with [`AnalysisRequestState`]. A [`StopHandle`] can be cloned out and
//! used from another task (a Ctrl-C handler, say) to stop that analysis.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::corpus::{CorpusStore, IngestSummary};
use crate::extract::Extractor;
use crate::gateway::{AnalysisMode, Completer, GatewayError, STOPPED_REPLY};
use crate::models::{Message, UploadedDocument};
use crate::progress::IngestProgressReporter;
use crate::session::{SessionError, SessionManager};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AskError {
    #[error("no documents loaded; add documents before asking a question")]
    NoDocuments,
    #[error("an analysis is already running")]
    AlreadyRunning,
    #[error("query is empty")]
    EmptyQuery,
}

/// Result of one [`ApplicationSession::ask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskOutcome {
    /// The assistant message that was recorded.
    pub reply: String,
    /// Set when the reply is an error text (or the stop notice).
    pub failure: Option<GatewayError>,
}

#[derive(Default)]
struct RequestSlot {
    running: bool,
    cancel: Option<CancellationToken>,
}

/// Whether an analysis is outstanding, and the token that stops it.
#[derive(Clone, Default)]
pub struct AnalysisRequestState {
    slot: Arc<Mutex<RequestSlot>>,
}

impl AnalysisRequestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Marks a request as running and hands out its token, or `None` if one
    /// is already running.
    fn begin(&self) -> Option<CancellationToken> {
        let mut slot = self.lock();
        if slot.running {
            return None;
        }
        let token = CancellationToken::new();
        slot.running = true;
        slot.cancel = Some(token.clone());
        Some(token)
    }

    fn finish(&self) {
        let mut slot = self.lock();
        slot.running = false;
        slot.cancel = None;
    }

    /// Cancels the outstanding request. Returns `false` when idle.
    pub fn stop(&self) -> bool {
        let mut slot = self.lock();
        let was_running = slot.running;
        if let Some(token) = slot.cancel.take() {
            token.cancel();
        }
        slot.running = false;
        was_running
    }

    fn lock(&self) -> MutexGuard<'_, RequestSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable "Stop Analysis" action.
#[derive(Clone)]
pub struct StopHandle {
    state: AnalysisRequestState,
}

impl StopHandle {
    pub fn stop(&self) -> bool {
        let stopped = self.state.stop();
        if stopped {
            info!("stop requested for running analysis");
        }
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

pub struct ApplicationSession {
    corpus: CorpusStore,
    sessions: SessionManager,
    analysis: AnalysisRequestState,
    mode: AnalysisMode,
    completer: Box<dyn Completer>,
}

impl ApplicationSession {
    pub fn new(config: &Config, completer: Box<dyn Completer>) -> Self {
        Self::with_parts(
            CorpusStore::new(Extractor::new(&config.spreadsheet)),
            SessionManager::new(),
            completer,
        )
    }

    pub fn with_parts(corpus: CorpusStore, sessions: SessionManager, completer: Box<dyn Completer>) -> Self {
        Self {
            corpus,
            sessions,
            analysis: AnalysisRequestState::new(),
            mode: AnalysisMode::default(),
            completer,
        }
    }

    pub fn corpus(&self) -> &CorpusStore {
        &self.corpus
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AnalysisMode) {
        self.mode = mode;
    }

    pub fn is_running(&self) -> bool {
        self.analysis.is_running()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: self.analysis.clone(),
        }
    }

    pub fn ingest(
        &mut self,
        documents: impl IntoIterator<Item = UploadedDocument>,
        reporter: &dyn IngestProgressReporter,
    ) -> IngestSummary {
        self.corpus.add_files_with_progress(documents, reporter)
    }

    pub fn clear_documents(&mut self) {
        self.corpus.clear();
    }

    pub fn start_new_session(&mut self) -> String {
        self.sessions.start_new_session().to_string()
    }

    pub fn clear_chat(&mut self) {
        self.sessions.clear_active_messages();
    }

    pub fn load_session(&mut self, id: &str) -> Result<(), SessionError> {
        self.sessions.load_session(id)
    }

    /// Answers `query` against the current corpus and records the exchange.
    ///
    /// The user message is recorded whatever the outcome. A stopped analysis
    /// is recorded without auto-saving; every other outcome is auto-saved.
    pub async fn ask(&mut self, query: &str) -> Result<AskOutcome, AskError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AskError::EmptyQuery);
        }
        if self.corpus.is_empty() {
            return Err(AskError::NoDocuments);
        }
        let cancel = self.analysis.begin().ok_or(AskError::AlreadyRunning)?;

        info!(mode = self.mode.label(), chars = self.corpus.total_chars(), "running analysis");
        let result = self
            .completer
            .complete(self.corpus.corpus(), query, self.mode, &cancel)
            .await;
        self.analysis.finish();
        // A stop that lands after the reply arrived still wins.
        let result = match result {
            Ok(_) if cancel.is_cancelled() => Err(GatewayError::Cancelled),
            other => other,
        };

        let user = Message::user(query);
        let outcome = match result {
            Ok(reply) => {
                self.sessions
                    .append_exchange(user, Message::assistant(reply.clone()));
                AskOutcome {
                    reply,
                    failure: None,
                }
            }
            Err(GatewayError::Cancelled) => {
                self.sessions
                    .append_unsaved_exchange(user, Message::assistant(STOPPED_REPLY));
                AskOutcome {
                    reply: STOPPED_REPLY.to_string(),
                    failure: Some(GatewayError::Cancelled),
                }
            }
            Err(e) => {
                warn!(error = %e, "analysis failed");
                let reply = e.to_string();
                self.sessions
                    .append_exchange(user, Message::assistant(reply.clone()));
                AskOutcome {
                    reply,
                    failure: Some(e),
                }
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::progress::SilentProgress;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replies with a fixed outcome and records what it was sent.
    struct StubCompleter {
        outcome: Result<String, GatewayError>,
        calls: Arc<AtomicUsize>,
        last_corpus: Arc<Mutex<String>>,
    }

    impl StubCompleter {
        fn new(outcome: Result<String, GatewayError>) -> Self {
            Self {
                outcome,
                calls: Arc::new(AtomicUsize::new(0)),
                last_corpus: Arc::new(Mutex::new(String::new())),
            }
        }
    }

    #[async_trait]
    impl Completer for StubCompleter {
        async fn complete(
            &self,
            corpus: &str,
            _query: &str,
            _mode: AnalysisMode,
            _cancel: &CancellationToken,
        ) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_corpus.lock().unwrap() = corpus.to_string();
            self.outcome.clone()
        }
    }

    /// Waits for cancellation, like a request that never gets an answer.
    struct HangingCompleter;

    #[async_trait]
    impl Completer for HangingCompleter {
        async fn complete(
            &self,
            _corpus: &str,
            _query: &str,
            _mode: AnalysisMode,
            cancel: &CancellationToken,
        ) -> Result<String, GatewayError> {
            cancel.cancelled().await;
            Err(GatewayError::Cancelled)
        }
    }

    /// Returns a reply, but only after the stop was pressed.
    struct LateStopCompleter;

    #[async_trait]
    impl Completer for LateStopCompleter {
        async fn complete(
            &self,
            _corpus: &str,
            _query: &str,
            _mode: AnalysisMode,
            cancel: &CancellationToken,
        ) -> Result<String, GatewayError> {
            cancel.cancel();
            Ok("too late".into())
        }
    }

    fn session_with(completer: impl Completer + 'static) -> ApplicationSession {
        let mut app = ApplicationSession::with_parts(
            CorpusStore::default(),
            SessionManager::with_active_id("chat_A"),
            Box::new(completer),
        );
        app.ingest(
            vec![UploadedDocument::new("a.txt", b"alpha".to_vec()).unwrap()],
            &SilentProgress,
        );
        app
    }

    #[tokio::test]
    async fn successful_ask_is_recorded_and_saved() {
        let stub = StubCompleter::new(Ok("answer".into()));
        let seen = stub.last_corpus.clone();
        let mut app = session_with(stub);

        let outcome = app.ask("  question  ").await.unwrap();

        assert_eq!(outcome.reply, "answer");
        assert!(outcome.failure.is_none());
        assert_eq!(
            app.sessions().messages(),
            &[Message::user("question"), Message::assistant("answer")]
        );
        assert_eq!(app.sessions().archived("chat_A").unwrap().messages.len(), 2);
        assert_eq!(*seen.lock().unwrap(), app.corpus().corpus());
        assert!(!app.is_running());
    }

    #[tokio::test]
    async fn gateway_failure_still_records_the_user_message() {
        let mut app = session_with(StubCompleter::new(Err(GatewayError::QuotaOrRateLimited(429))));

        let outcome = app.ask("q").await.unwrap();

        assert_eq!(outcome.failure, Some(GatewayError::QuotaOrRateLimited(429)));
        let messages = app.sessions().messages();
        assert_eq!(messages[0], Message::user("q"));
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(messages[1].content.contains("Status code: 429"));
        assert!(app.sessions().archived("chat_A").is_some());
        assert!(!app.is_running());
    }

    #[tokio::test]
    async fn ask_without_documents_is_refused() {
        let stub = StubCompleter::new(Ok("unused".into()));
        let calls = stub.calls.clone();
        let mut app = ApplicationSession::with_parts(
            CorpusStore::default(),
            SessionManager::new(),
            Box::new(stub),
        );

        assert_eq!(app.ask("q").await.unwrap_err(), AskError::NoDocuments);
        assert_eq!(app.ask("   ").await.unwrap_err(), AskError::EmptyQuery);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(app.sessions().messages().is_empty());
    }

    #[tokio::test]
    async fn stop_handle_cancels_and_skips_auto_save() {
        let mut app = session_with(HangingCompleter);
        let stop = app.stop_handle();
        assert!(!stop.stop());

        let stopper = tokio::spawn(async move {
            while !stop.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            stop.stop()
        });

        let outcome = app.ask("long question").await.unwrap();
        assert!(stopper.await.unwrap());

        assert_eq!(outcome.reply, STOPPED_REPLY);
        assert_eq!(outcome.failure, Some(GatewayError::Cancelled));
        assert_eq!(app.sessions().messages().len(), 2);
        assert!(app.sessions().archived("chat_A").is_none());
        assert!(!app.is_running());
    }

    #[test]
    fn second_begin_is_refused_until_finish() {
        let state = AnalysisRequestState::new();
        let token = state.begin().unwrap();
        assert!(state.begin().is_none());
        assert!(state.stop());
        assert!(token.is_cancelled());
        assert!(!state.is_running());
        assert!(state.begin().is_some());
        state.finish();
        assert!(!state.is_running());
    }

    #[tokio::test]
    async fn stop_after_reply_arrives_is_honoured() {
        let mut app = session_with(LateStopCompleter);

        let outcome = app.ask("question").await.unwrap();

        assert_eq!(outcome.reply, STOPPED_REPLY);
        assert_eq!(outcome.failure, Some(GatewayError::Cancelled));
        assert_eq!(
            app.sessions().messages(),
            &[Message::user("question"), Message::assistant(STOPPED_REPLY)]
        );
        assert!(app.sessions().archived("chat_A").is_none());
        assert!(!app.is_running());
    }

    #[tokio::test]
    async fn clearing_documents_blocks_further_questions() {
        let mut app = session_with(StubCompleter::new(Ok("a".into())));
        app.clear_documents();
        assert_eq!(app.ask("q").await.unwrap_err(), AskError::NoDocuments);
    }
}
