//! Conversation orchestrator.
//!
//! Owns the "send a user message, get a response" operations. For each
//! exchange it resolves the session, holds the session lock while history is
//! mutated, calls the executor, and writes the updated history back to the
//! store.
//!
//! Persistence writes never fail an exchange: they are logged and the
//! in-memory history stays authoritative until the next successful write.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{ColloquyError, Result};
use crate::executor::{AgentExecutor, ExecutorSummarizer};
use crate::log_component;
use crate::session::{Message, Role, SessionRegistry};
use crate::store::create_store;

use super::compaction::{CompactionReport, HistoryCompactor};
use super::context::ContextBuilder;
use super::stream::{fan_in, ResponseStream, DEFAULT_STREAM_CAPACITY};
use super::tool_result::format_tool_message;

/// Drives conversations between callers and an [`AgentExecutor`].
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use colloquy::agent::Orchestrator;
/// use colloquy::executor::OpenAiExecutor;
/// use colloquy::session::SessionRegistry;
///
/// async fn example() {
///     let executor = Arc::new(OpenAiExecutor::new("sk-xxx", "gpt-4o"));
///     let orchestrator = Orchestrator::new(SessionRegistry::new_memory(), executor);
///     let reply = orchestrator.chat("user-1", "Hello!").await.unwrap();
///     println!("{}", reply.content);
/// }
/// ```
pub struct Orchestrator {
    registry: SessionRegistry,
    executor: Arc<dyn AgentExecutor>,
    context: ContextBuilder,
    compactor: Option<Arc<HistoryCompactor>>,
    auto_compact: bool,
    stream_capacity: usize,
}

impl Orchestrator {
    /// Create an orchestrator with the default context and no compactor.
    pub fn new(registry: SessionRegistry, executor: Arc<dyn AgentExecutor>) -> Self {
        Self {
            registry,
            executor,
            context: ContextBuilder::new(),
            compactor: None,
            auto_compact: false,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    /// Build a fully wired orchestrator from config.
    ///
    /// Creates the configured store, applies the agent section to the context
    /// builder, and attaches a compactor (summarizing through `executor`) when
    /// compaction is enabled.
    pub fn from_config(config: &Config, executor: Arc<dyn AgentExecutor>) -> Result<Self> {
        let store = create_store(&config.memory)?;
        let context = ContextBuilder::new()
            .with_system_prompt(&config.agent.system_prompt)
            .with_max_history(config.agent.max_history);

        let mut orchestrator = Self::new(SessionRegistry::new(store), executor.clone())
            .with_context(context)
            .with_stream_capacity(config.agent.stream_buffer);

        if config.compaction.enabled {
            let summarizer = ExecutorSummarizer::from_config(&config.compaction, executor);
            let compactor = HistoryCompactor::new(config.compaction.clone(), Arc::new(summarizer))?;
            orchestrator = orchestrator.with_compactor(compactor, true);
        }
        Ok(orchestrator)
    }

    /// Replace the context builder.
    pub fn with_context(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    /// Attach a compactor. With `auto` set, history is compacted before every
    /// exchange; otherwise only [`compact`](Self::compact) uses it.
    pub fn with_compactor(mut self, compactor: HistoryCompactor, auto: bool) -> Self {
        self.compactor = Some(Arc::new(compactor));
        self.auto_compact = auto;
        self
    }

    /// Set the output queue capacity of streamed replies.
    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity.max(1);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<dyn AgentExecutor> {
        &self.executor
    }

    // ------------------------------------------------------------------
    // Exchanges
    // ------------------------------------------------------------------

    /// Send `text` and wait for the complete reply.
    ///
    /// The session lock is held for the whole call, so concurrent chats on one
    /// session run one after another. On success the user turn and the reply
    /// are both in history and persisted. On failure the user turn is removed
    /// again and [`ColloquyError::Execution`] is returned.
    pub async fn chat(&self, session_id: &str, text: &str) -> Result<Message> {
        let session = self.registry.get_or_create(session_id).await;
        let mut history = session.lock().await;

        self.maybe_compact(session_id, &mut history).await;
        history.push(Message::user(text));
        let input = self.context.build_messages(history.clone());
        debug!(session_id = %session_id, messages = input.len(), "Calling executor");

        let reply = match self.executor.generate(input).await {
            Ok(reply) if reply.role == Role::Assistant => reply,
            Ok(reply) => {
                history.pop();
                error!(session_id = %session_id, role = %reply.role, "Executor returned no assistant reply");
                return Err(ColloquyError::Execution(format!(
                    "no assistant response received (got {} message)",
                    reply.role
                )));
            }
            Err(e) => {
                history.pop();
                error!(session_id = %session_id, error = %e, "Executor failed");
                return Err(e.into_execution());
            }
        };

        history.push(reply.clone());
        self.persist(session_id, &history).await;
        log_component!(
            info,
            "orchestrator",
            "Chat exchange complete",
            session_id = session_id,
            messages = history.len()
        );
        Ok(reply)
    }

    /// Send `text` and stream the reply.
    ///
    /// The user turn is appended and persisted before the executor stream is
    /// started; the session lock is released before any of the reply is read.
    /// The caller records the final reply with
    /// [`append_assistant_message`](Self::append_assistant_message).
    ///
    /// If the stream cannot be started, the user turn is rolled back (and the
    /// rollback persisted) and [`ColloquyError::Execution`] is returned.
    pub async fn chat_stream(&self, session_id: &str, text: &str) -> Result<ResponseStream> {
        let session = self.registry.get_or_create(session_id).await;

        let source = {
            let mut history = session.lock().await;

            self.maybe_compact(session_id, &mut history).await;
            history.push(Message::user(text));
            self.persist(session_id, &history).await;

            let input = self.context.build_messages(history.clone());
            match self.executor.stream(input).await {
                Ok(source) => source,
                Err(e) => {
                    history.pop();
                    self.persist(session_id, &history).await;
                    error!(session_id = %session_id, error = %e, "Executor stream failed to start");
                    return Err(e.into_execution());
                }
            }
        };

        debug!(session_id = %session_id, "Executor stream started");
        Ok(fan_in(session_id, source, self.stream_capacity).await)
    }

    /// Append a finished reply (typically collected from a stream) and persist.
    ///
    /// Tool messages are normalized first.
    ///
    /// # Errors
    ///
    /// [`ColloquyError::NotFound`] if the session is not in memory.
    pub async fn append_assistant_message(&self, session_id: &str, message: Message) -> Result<()> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| ColloquyError::NotFound(format!("session '{}'", session_id)))?;

        let mut history = session.lock().await;
        history.push(format_tool_message(message));
        self.persist(session_id, &history).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session management
    // ------------------------------------------------------------------

    /// Copy of a session's history, loading it from the store if needed.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let session = self.registry.get_or_create(session_id).await;
        session.snapshot().await
    }

    /// Drop a session from memory. Returns `true` if it was loaded.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.registry.clear(session_id).await
    }

    /// Ids of sessions currently in memory.
    pub async fn list_sessions(&self) -> Vec<String> {
        self.registry.list().await
    }

    /// Ids of every session in the store.
    pub async fn stored_sessions(&self) -> Result<Vec<String>> {
        self.registry.store().keys().await
    }

    /// Compact a session's history now.
    ///
    /// The new history replaces the old one and is persisted when the pass
    /// changed anything.
    ///
    /// # Errors
    ///
    /// [`ColloquyError::Config`] if no compactor is attached, otherwise any
    /// error from the pass itself.
    pub async fn compact(&self, session_id: &str) -> Result<CompactionReport> {
        let compactor = self
            .compactor
            .as_ref()
            .ok_or_else(|| ColloquyError::Config("compaction is not configured".into()))?;

        let session = self.registry.get_or_create(session_id).await;
        let mut history = session.lock().await;
        let report = compactor.compact(history.clone()).await?;
        if report.changed {
            *history = report.messages.clone();
            self.persist(session_id, &history).await;
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Automatic compaction before an exchange. Failures only skip the pass.
    async fn maybe_compact(&self, session_id: &str, history: &mut Vec<Message>) {
        let Some(compactor) = self.compactor.as_ref().filter(|_| self.auto_compact) else {
            return;
        };
        match compactor.compact(history.clone()).await {
            Ok(report) if report.changed => {
                *history = report.messages;
                self.persist(session_id, history).await;
            }
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                error!(session_id = %session_id, error = %e, "Compaction aborted");
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Compaction skipped");
            }
        }
    }

    async fn persist(&self, session_id: &str, history: &[Message]) {
        if let Err(e) = self.registry.store().write(session_id, history).await {
            warn!(session_id = %session_id, error = %e, "Failed to persist session");
        } else {
            debug!(session_id = %session_id, messages = history.len(), "Session persisted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompactionConfig;
    use crate::executor::{EventSource, StreamEvent, SummaryRequest, Summarizer};
    use crate::store::{MemoryStore, SessionStore};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Executor replying "echo: <last user message>" and recording inputs.
    struct EchoExecutor {
        inputs: Mutex<Vec<Vec<Message>>>,
    }

    impl EchoExecutor {
        fn new() -> Self {
            Self {
                inputs: Mutex::new(Vec::new()),
            }
        }
    }

    fn last_user(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    #[async_trait]
    impl AgentExecutor for EchoExecutor {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, messages: Vec<Message>) -> Result<Message> {
            let reply = format!("echo: {}", last_user(&messages));
            self.inputs.lock().unwrap().push(messages);
            Ok(Message::assistant(&reply))
        }

        async fn stream(&self, messages: Vec<Message>) -> Result<EventSource> {
            let text = last_user(&messages);
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                for word in text.split(' ') {
                    let _ = tx.send(StreamEvent::Delta(format!("{} ", word))).await;
                }
            });
            Ok(rx)
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl AgentExecutor for FailingExecutor {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _messages: Vec<Message>) -> Result<Message> {
            Err(ColloquyError::Execution("model down".into()))
        }

        async fn stream(&self, _messages: Vec<Message>) -> Result<EventSource> {
            Err(ColloquyError::Execution("cannot connect".into()))
        }
    }

    struct ToolOnlyExecutor;

    #[async_trait]
    impl AgentExecutor for ToolOnlyExecutor {
        fn name(&self) -> &str {
            "tool-only"
        }

        async fn generate(&self, _messages: Vec<Message>) -> Result<Message> {
            Ok(Message::tool_result("c1", "{}"))
        }
    }

    struct FixedSummarizer;

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn invoke(&self, _request: SummaryRequest) -> Result<Message> {
            Ok(Message::assistant("short version"))
        }
    }

    fn orchestrator_with(executor: Arc<dyn AgentExecutor>) -> (Orchestrator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new(store.clone());
        (Orchestrator::new(registry, executor), store)
    }

    #[tokio::test]
    async fn test_chat_appends_and_persists() {
        let (orch, store) = orchestrator_with(Arc::new(EchoExecutor::new()));

        let reply = orch.chat("s", "hello").await.unwrap();
        assert_eq!(reply.content, "echo: hello");

        let history = orch.history("s").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::user("hello"));
        assert_eq!(store.read("s").await.unwrap(), history);
    }

    #[tokio::test]
    async fn test_chat_sends_system_prompt_and_full_history() {
        let exec = Arc::new(EchoExecutor::new());
        let (orch, _) = orchestrator_with(exec.clone());
        let orch = orch.with_context(ContextBuilder::new().with_system_prompt("Be nice."));

        orch.chat("s", "one").await.unwrap();
        orch.chat("s", "two").await.unwrap();

        let inputs = exec.inputs.lock().unwrap();
        let second = &inputs[1];
        assert_eq!(second.len(), 4);
        assert_eq!(second[0].content, "Be nice.");
        assert_eq!(second[3].content, "two");
        // The prompt is never stored.
        drop(inputs);
        assert!(orch
            .history("s")
            .await
            .iter()
            .all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn test_chat_failure_rolls_back_user_turn() {
        let (orch, store) = orchestrator_with(Arc::new(FailingExecutor));

        let err = orch.chat("s", "hello").await.unwrap_err();
        assert!(matches!(err, ColloquyError::Execution(_)));
        assert!(orch.history("s").await.is_empty());
        assert!(store.read("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_non_assistant_reply_is_execution_error() {
        let (orch, _) = orchestrator_with(Arc::new(ToolOnlyExecutor));
        let err = orch.chat("s", "hi").await.unwrap_err();
        assert!(err.to_string().contains("no assistant response received"));
        assert!(orch.history("s").await.is_empty());
    }

    #[tokio::test]
    async fn test_chat_stream_persists_user_turn_first() {
        let (orch, store) = orchestrator_with(Arc::new(EchoExecutor::new()));

        let stream = orch.chat_stream("s", "a b c").await.unwrap();
        // Persisted before anything was read from the stream.
        assert_eq!(store.read("s").await.unwrap(), vec![Message::user("a b c")]);

        let reply = stream.collect_reply().await;
        assert_eq!(reply.content, "a b c ");

        orch.append_assistant_message("s", reply).await.unwrap();
        let stored = store.read("s").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_chat_stream_start_failure_rolls_back() {
        let (orch, store) = orchestrator_with(Arc::new(FailingExecutor));
        let err = orch.chat_stream("s", "hello").await.unwrap_err();
        assert!(matches!(err, ColloquyError::Execution(_)));
        assert!(orch.history("s").await.is_empty());
        assert!(store.read("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_lock_released_while_streaming() {
        let (orch, _) = orchestrator_with(Arc::new(EchoExecutor::new()));
        let _stream = orch.chat_stream("s", "x").await.unwrap();
        // Not draining the stream must not block other work on the session.
        let history = tokio::time::timeout(std::time::Duration::from_secs(1), orch.history("s"))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_is_not_found() {
        let (orch, _) = orchestrator_with(Arc::new(EchoExecutor::new()));
        let err = orch
            .append_assistant_message("ghost", Message::assistant("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ColloquyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_append_formats_tool_messages() {
        let (orch, store) = orchestrator_with(Arc::new(EchoExecutor::new()));
        orch.chat("s", "hi").await.unwrap();
        orch.append_assistant_message(
            "s",
            Message::tool_result("c1", r#"{"content":[{"type":"text","text":"done"}]}"#),
        )
        .await
        .unwrap();

        let stored = store.read("s").await.unwrap();
        assert_eq!(stored[2].content, "done");
        assert_eq!(stored[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_clear_and_list_sessions() {
        let (orch, _) = orchestrator_with(Arc::new(EchoExecutor::new()));
        orch.chat("b", "x").await.unwrap();
        orch.chat("a", "y").await.unwrap();
        assert_eq!(orch.list_sessions().await, vec!["a", "b"]);
        assert_eq!(orch.stored_sessions().await.unwrap(), vec!["a", "b"]);

        assert!(orch.clear_session("a").await);
        assert_eq!(orch.list_sessions().await, vec!["b"]);
        // Reloaded from the store on next access.
        assert_eq!(orch.history("a").await.len(), 2);
    }

    #[tokio::test]
    async fn test_compact_without_compactor_is_config_error() {
        let (orch, _) = orchestrator_with(Arc::new(EchoExecutor::new()));
        assert!(matches!(
            orch.compact("s").await,
            Err(ColloquyError::Config(_))
        ));
    }

    fn tiny_compactor() -> HistoryCompactor {
        let cfg = CompactionConfig {
            max_tokens_before_summary: 5,
            max_tokens_for_recent_messages: 3,
            ..Default::default()
        };
        HistoryCompactor::new(cfg, Arc::new(FixedSummarizer)).unwrap()
    }

    #[tokio::test]
    async fn test_explicit_compact_replaces_and_persists() {
        let (orch, store) = orchestrator_with(Arc::new(EchoExecutor::new()));
        let orch = orch.with_compactor(tiny_compactor(), false);

        for i in 0..4 {
            orch.chat("s", &format!("question number {}", i)).await.unwrap();
        }
        assert_eq!(orch.history("s").await.len(), 8);

        let report = orch.compact("s").await.unwrap();
        assert!(report.changed);

        let history = orch.history("s").await;
        assert!(history.len() < 8);
        assert_eq!(history[0], Message::user("question number 0"));
        assert!(history.iter().any(|m| m.is_summary()));
        assert_eq!(store.read("s").await.unwrap(), history);
    }

    #[tokio::test]
    async fn test_auto_compact_runs_before_exchange() {
        let exec = Arc::new(EchoExecutor::new());
        let (orch, _) = orchestrator_with(exec.clone());
        let orch = orch
            .with_context(ContextBuilder::new().with_system_prompt(""))
            .with_compactor(tiny_compactor(), true);

        for i in 0..4 {
            orch.chat("s", &format!("question number {}", i)).await.unwrap();
        }
        let history = orch.history("s").await;
        assert!(history.iter().any(|m| m.is_summary()));
        // The newest user turn always reaches the executor verbatim.
        let inputs = exec.inputs.lock().unwrap();
        assert_eq!(
            inputs.last().unwrap().last().unwrap().content,
            "question number 3"
        );
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn write(&self, _id: &str, _messages: &[Message]) -> Result<()> {
            Err(ColloquyError::Persistence("read-only".into()))
        }
        async fn read(&self, _id: &str) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn keys(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_fail_chat() {
        let orch = Orchestrator::new(
            SessionRegistry::new(Arc::new(BrokenStore)),
            Arc::new(EchoExecutor::new()),
        );
        let reply = orch.chat("s", "hi").await.unwrap();
        assert_eq!(reply.content, "echo: hi");
        assert_eq!(orch.history("s").await.len(), 2);
    }
}
