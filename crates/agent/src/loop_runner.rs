//! The conversation loop.
//!
//! One user turn runs as: send history → read the full reply → extract tool
//! calls → run them one at a time → feed the aggregated results back as a
//! user message → repeat, until the model answers without tools or the
//! iteration cap is hit. Streaming and buffered modes differ only in how the
//! reply text is obtained.

use codeloop_core::error::Error;
use codeloop_core::message::{Conversation, Message, Role};
use codeloop_core::progress::{NoopProgress, ProgressSink};
use codeloop_core::provider::{Provider, ProviderRequest, Usage};
use codeloop_core::session::{Session, SessionMessage, SessionStore, TokenUsage, ToolCallRecord};
use codeloop_core::tool::{ToolCall, ToolRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extractor::{call_start, extract_tool_calls, may_open_call};
use crate::output::{NullOutput, Output};
use crate::prompt;
use crate::status::format_tool_status;
use crate::stream_filter::StreamFilter;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(300);

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered without requesting tools.
    Answered { iterations: u32 },
    /// Every iteration requested tools; the turn stopped at the cap.
    IterationLimit { iterations: u32 },
}

/// A complete model reply.
struct Reply {
    content: String,
    usage: Option<Usage>,
    /// Streamed text not yet displayed because it may open a tool call
    held: String,
}

/// Holds streamed text back from the first possible tool-call opening, so
/// only the leading prose of a reply with calls reaches the display.
#[derive(Debug, Default)]
struct CallGate {
    seen: String,
    shown: usize,
    closed: bool,
}

impl CallGate {
    /// Take in newly visible text and return what may be displayed now.
    fn admit(&mut self, visible: &str) -> String {
        self.seen.push_str(visible);
        if self.closed {
            return String::new();
        }
        // displayed text never holds a possible opening, so search only the rest
        let end = match call_start(&self.seen[self.shown..]) {
            Some(start) => {
                self.closed = true;
                self.shown + start
            }
            None => self.hold_from(),
        };
        let text = self.seen[self.shown..end].to_string();
        self.shown = end;
        text
    }

    /// First undisplayed `{` or `[` that could still open a call.
    fn hold_from(&self) -> usize {
        self.seen[self.shown..]
            .char_indices()
            .map(|(i, c)| (self.shown + i, c))
            .find(|&(i, c)| matches!(c, '{' | '[') && may_open_call(&self.seen[i..]))
            .map_or(self.seen.len(), |(i, _)| i)
    }

    fn into_held(self) -> String {
        self.seen[self.shown..].to_string()
    }
}

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    progress: Arc<dyn ProgressSink>,
    output: Arc<dyn Output>,

    working_dir: PathBuf,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    streaming: bool,
    max_iterations: u32,
    turn_timeout: Duration,

    conversation: Conversation,
    session_id: Option<String>,
    /// Usage across every turn this loop has run; never decreases
    usage: TokenUsage,
    /// Usage persisted with the current session
    session_usage: TokenUsage,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let working_dir = PathBuf::from(".");
        Self {
            provider,
            tools,
            store,
            progress: Arc::new(NoopProgress),
            output: Arc::new(NullOutput),
            conversation: Conversation::new(prompt::build_system_prompt(None, None, &working_dir)),
            working_dir,
            model: String::new(),
            temperature: 0.7,
            max_tokens: None,
            streaming: true,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            session_id: None,
            usage: TokenUsage::default(),
            session_usage: TokenUsage::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_output(mut self, output: Arc<dyn Output>) -> Self {
        self.output = output;
        self
    }

    /// Directory tools run in and relative paths resolve against.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Set the maximum number of model requests per user turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Wall-clock budget for one turn, time spent in tools included.
    ///
    /// A running tool is never interrupted; once the budget is spent the next
    /// model request fails with [`Error::TurnTimeout`].
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    // --- Sessions ---

    /// Resume the store's active session, or start a new one.
    ///
    /// Returns the resumed session, if any.
    pub async fn start(&mut self) -> Result<Option<Session>, Error> {
        match self.store.get_active_session().await {
            Ok(Some(session)) => {
                let totals = session.total_usage.unwrap_or_default();
                self.adopt(&session).await;
                self.usage = totals;
                info!(session_id = %session.id, messages = session.messages.len(), "Resumed session");
                Ok(Some(session))
            }
            Ok(None) => {
                self.new_session(None).await?;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Could not read active session, starting a new one");
                self.new_session(None).await?;
                Ok(None)
            }
        }
    }

    /// Start a fresh session with an empty history.
    pub async fn new_session(&mut self, name: Option<&str>) -> Result<Session, Error> {
        let session = self.store.create_session(name).await?;
        self.session_id = Some(session.id.clone());
        self.session_usage = TokenUsage::default();
        let system = self.system_prompt().await;
        self.conversation.reset(system);
        info!(session_id = %session.id, "Started new session");
        Ok(session)
    }

    /// Make a stored session current and rebuild the history from it.
    pub async fn load_session(&mut self, id: &str) -> Result<Session, Error> {
        let session = self.store.get_session(id).await?;
        self.store.set_active_session(id).await?;
        self.adopt(&session).await;
        Ok(session)
    }

    /// Start over: new session, empty history.
    pub async fn clear(&mut self) -> Result<Session, Error> {
        self.new_session(None).await
    }

    /// Rebuild the system prompt (project context, active plan) keeping history.
    pub async fn reload_context(&mut self) {
        let system = self.system_prompt().await;
        self.conversation.set_system_prompt(system);
    }

    async fn adopt(&mut self, session: &Session) {
        let system = self.system_prompt().await;
        self.conversation.reset(system);
        for msg in &session.messages {
            match msg.role.as_str() {
                "user" => self.conversation.push(Message::user(&msg.content)),
                "assistant" => self.conversation.push(Message::assistant(&msg.content)),
                _ => {}
            }
        }
        self.session_id = Some(session.id.clone());
        self.session_usage = session.total_usage.unwrap_or_default();
    }

    async fn system_prompt(&self) -> String {
        let context = prompt::load_project_context(&self.working_dir).await;
        let plan = self.store.get_active_plan().await.unwrap_or_else(|e| {
            debug!(error = %e, "No plan for system prompt");
            None
        });
        prompt::build_system_prompt(context.as_deref(), plan.as_ref(), &self.working_dir)
    }

    // --- Accessors ---

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn format_usage(&self) -> String {
        format_usage(&self.usage)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn history_len(&self) -> usize {
        self.conversation.len()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    // --- The turn ---

    /// Process one user message to completion.
    pub async fn process(&mut self, input: &str) -> Result<TurnOutcome, Error> {
        self.process_with_cancel(input, &CancellationToken::new()).await
    }

    /// Process one user message, stopping at the next model request once
    /// `cancel` fires.
    ///
    /// A tool that is already running always finishes. An interrupted turn is
    /// removed from history and from the session store, and
    /// [`Error::Interrupted`] is returned.
    pub async fn process_with_cancel(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, Error> {
        let turn_start = self.conversation.len();
        let mut persisted = 0;
        let result = self.run_turn(input, cancel, &mut persisted).await;
        if matches!(result, Err(Error::Interrupted)) {
            self.roll_back(turn_start, persisted).await;
        }
        result
    }

    async fn run_turn(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
        persisted: &mut usize,
    ) -> Result<TurnOutcome, Error> {
        info!(
            session_id = self.session_id.as_deref().unwrap_or("-"),
            messages = self.conversation.len(),
            streaming = self.streaming,
            "Processing user message"
        );

        *persisted += self.persist(SessionMessage::new(Role::User.as_str(), input)).await;
        self.conversation.push(Message::user(input));

        let deadline = Instant::now() + self.turn_timeout;

        for iteration in 1..=self.max_iterations {
            debug!(iteration, "Agent loop iteration");

            let reply = self.request_reply(deadline, cancel).await?;
            if let Some(usage) = &reply.usage {
                self.usage.add(usage);
                self.session_usage.add(usage);
            }

            let extraction = extract_tool_calls(&reply.content);

            if self.streaming {
                // held-back text turned out not to be a call after all
                if !extraction.has_calls() && !reply.held.is_empty() {
                    self.output.stream_chunk(&reply.held);
                }
                self.output.stream_end();
            } else if !extraction.prose.is_empty() {
                self.output.prose(&extraction.prose);
            }

            self.conversation.push(Message::assistant(&reply.content));
            *persisted += self
                .persist(SessionMessage::new(Role::Assistant.as_str(), &reply.content))
                .await;

            if !extraction.has_calls() {
                self.persist_usage().await;
                return Ok(TurnOutcome::Answered { iterations: iteration });
            }

            debug!(tool_count = extraction.calls.len(), "Executing tool calls");
            let results = self.run_tools(&extraction.calls, persisted).await;

            self.conversation.push(Message::user(&results));
            *persisted += self.persist(SessionMessage::new(Role::User.as_str(), results)).await;
            self.persist_usage().await;
        }

        warn!(iterations = self.max_iterations, "Max tool iterations reached, ending turn");
        Ok(TurnOutcome::IterationLimit {
            iterations: self.max_iterations,
        })
    }

    /// Drop everything an interrupted turn added, in memory and in the store.
    async fn roll_back(&mut self, len: usize, persisted: usize) {
        info!(
            dropped = self.conversation.len().saturating_sub(len),
            persisted, "Rolling back interrupted turn"
        );
        self.conversation.truncate(len);

        let Some(id) = &self.session_id else {
            return;
        };
        if persisted > 0 {
            if let Err(e) = self.store.remove_last_messages(id, persisted).await {
                warn!(session_id = %id, error = %e, "Failed to roll back persisted messages");
            }
        }
    }

    /// Ask the model for a reply, within what is left of the turn budget.
    async fn request_reply(&self, deadline: Instant, cancel: &CancellationToken) -> Result<Reply, Error> {
        if Instant::now() >= deadline && !cancel.is_cancelled() {
            warn!(timeout_secs = self.turn_timeout.as_secs(), "Turn budget spent before model request");
            return Err(Error::TurnTimeout {
                secs: self.turn_timeout.as_secs(),
            });
        }

        let mut request = ProviderRequest::new(&self.model, self.conversation.messages().to_vec());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.stream = self.streaming;

        self.progress.start("Thinking...");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout_at(deadline, async {
                if self.streaming {
                    self.stream_reply(request).await
                } else {
                    self.complete_reply(request).await
                }
            }) => Some(result),
        };
        self.progress.stop();

        let error = match result {
            Some(Ok(Ok(reply))) => return Ok(reply),
            Some(Ok(Err(e))) => {
                warn!(error = %e, "Model request failed");
                e
            }
            Some(Err(_)) => {
                warn!(timeout_secs = self.turn_timeout.as_secs(), "Model request timed out");
                Error::TurnTimeout {
                    secs: self.turn_timeout.as_secs(),
                }
            }
            None => {
                info!("Model request interrupted");
                Error::Interrupted
            }
        };
        if self.streaming {
            self.output.stream_end();
        }
        Err(error)
    }

    async fn complete_reply(&self, request: ProviderRequest) -> Result<Reply, Error> {
        let response = self.provider.complete(request).await?;
        Ok(Reply {
            content: response.content,
            usage: response.usage,
            held: String::new(),
        })
    }

    async fn stream_reply(&self, request: ProviderRequest) -> Result<Reply, Error> {
        let mut rx = self.provider.stream(request).await?;
        let mut filter = StreamFilter::new();
        let mut gate = CallGate::default();
        let mut usage = None;

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(text) = chunk.content.as_deref() {
                let visible = gate.admit(&filter.process(text));
                self.show_streamed(&visible);
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        let visible = gate.admit(&filter.flush());
        self.show_streamed(&visible);

        Ok(Reply {
            content: filter.full_content().to_string(),
            usage,
            held: gate.into_held(),
        })
    }

    fn show_streamed(&self, text: &str) {
        if !text.is_empty() {
            self.progress.stop();
            self.output.stream_chunk(text);
        }
    }

    /// Run calls strictly in order; each one's effects are visible to the next.
    async fn run_tools(&self, calls: &[ToolCall], persisted: &mut usize) -> String {
        let total = calls.len();
        let mut aggregated = String::new();

        for (idx, call) in calls.iter().enumerate() {
            let label = if total > 1 {
                format!("Running {} ({}/{})...", call.tool, idx + 1, total)
            } else {
                format!("Running {}...", call.tool)
            };
            self.progress.start(&label);

            let started = std::time::Instant::now();
            let outcome = self
                .tools
                .execute(&call.tool, &call.params, &self.working_dir)
                .await;
            let duration_ms = started.elapsed().as_millis() as u64;
            self.progress.stop();

            let (result, success) = match outcome {
                Ok(output) => (output, true),
                Err(e) => {
                    warn!(tool = %call.tool, error = %e, "Tool execution failed");
                    (format!("Error: {e}"), false)
                }
            };
            debug!(tool = %call.tool, duration_ms, success, "Tool finished");

            self.output
                .status(&format_tool_status(&call.tool, &call.params, &result, !success));

            if total > 1 {
                aggregated.push_str(&format!("[{}] {} result:\n{}\n\n", idx + 1, call.tool, result));
            } else {
                aggregated.push_str(&format!("Tool result:\n{result}"));
            }

            *persisted += self
                .persist(SessionMessage::tool(ToolCallRecord {
                    tool: call.tool.clone(),
                    params: call.params.clone(),
                    result,
                    duration_ms,
                    success,
                }))
                .await;
        }

        aggregated
    }

    // --- Persistence (failures are logged, never fatal) ---

    /// Returns how many messages were stored: one, or zero on failure.
    async fn persist(&self, message: SessionMessage) -> usize {
        let Some(id) = &self.session_id else {
            return 0;
        };
        match self.store.add_message(id, message).await {
            Ok(()) => 1,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to persist message");
                0
            }
        }
    }

    async fn persist_usage(&self) {
        let Some(id) = &self.session_id else {
            return;
        };
        if let Err(e) = self.store.update_usage(id, self.session_usage).await {
            warn!(session_id = %id, error = %e, "Failed to persist token usage");
        }
    }
}

/// Human-readable token counters.
pub fn format_usage(usage: &TokenUsage) -> String {
    if usage.total_tokens == 0 {
        return "No token usage recorded yet.".to_string();
    }
    format!(
        "Token Usage\n  Prompt tokens:     {}\n  Completion tokens: {}\n  Total tokens:      {}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{CaptureOutput, Shown};
    use async_trait::async_trait;
    use codeloop_core::error::ProviderError;
    use codeloop_core::provider::{ChunkReceiver, ProviderResponse, StreamChunk};
    use codeloop_core::tool::{Params, Tool};
    use codeloop_core::ToolError;
    use codeloop_storage::InMemoryStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Replays canned replies and records every request it receives.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<Vec<Message>>>,
        usage: Usage,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            })
        }

        fn requests(&self) -> Vec<Vec<Message>> {
            self.requests.lock().unwrap().clone()
        }

        fn next(&self, request: &ProviderRequest) -> String {
            self.requests.lock().unwrap().push(request.messages.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "Done.".to_string())
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let content = self.next(&request);
            Ok(ProviderResponse {
                content,
                usage: Some(self.usage),
                model: request.model,
            })
        }

        /// Streams the reply three characters at a time.
        async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            let content = self.next(&request);
            let (tx, rx) = tokio::sync::mpsc::channel(256);
            let chars: Vec<char> = content.chars().collect();
            for piece in chars.chunks(3) {
                let chunk = StreamChunk {
                    content: Some(piece.iter().collect()),
                    ..StreamChunk::default()
                };
                tx.send(Ok(chunk)).await.unwrap();
            }
            tx.send(Ok(StreamChunk {
                content: None,
                done: true,
                usage: Some(self.usage),
            }))
            .await
            .unwrap();
            Ok(rx)
        }
    }

    /// Never answers.
    struct StalledProvider;

    #[async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            std::future::pending().await
        }
    }

    /// Fails every request.
    struct DownProvider;

    #[async_trait]
    impl Provider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    /// Echoes its `text` param and logs call order.
    struct EchoTool {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text param"
        }

        async fn execute(&self, params: &Params, _working_dir: &Path) -> Result<String, ToolError> {
            let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
            self.log.lock().unwrap().push(text.clone());
            Ok(text)
        }
    }

    /// Fires the turn's cancel token, then keeps working until done.
    struct InterruptingTool {
        cancel: CancellationToken,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for InterruptingTool {
        fn name(&self) -> &str {
            "interrupt"
        }

        fn description(&self) -> &str {
            "Cancel the turn mid-run"
        }

        async fn execute(&self, _params: &Params, _working_dir: &Path) -> Result<String, ToolError> {
            self.cancel.cancel();
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.log.lock().unwrap().push("finished".into());
            Ok("done".into())
        }
    }

    /// Takes ten seconds.
    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleep for ten seconds"
        }

        async fn execute(&self, _params: &Params, _working_dir: &Path) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("slept".into())
        }
    }

    #[derive(Default)]
    struct SpyProgress {
        running: AtomicBool,
    }

    impl ProgressSink for SpyProgress {
        fn start(&self, _message: &str) {
            self.running.store(true, Ordering::SeqCst);
        }
        fn update(&self, _message: &str) {}
        fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
        }
    }

    struct Harness {
        agent: AgentLoop,
        output: Arc<CaptureOutput>,
        store: Arc<InMemoryStore>,
        log: Arc<Mutex<Vec<String>>>,
    }

    async fn harness(provider: Arc<dyn Provider>, streaming: bool) -> Harness {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool { log: log.clone() }));
        let store = Arc::new(InMemoryStore::new());
        let output = Arc::new(CaptureOutput::new());
        let mut agent = AgentLoop::new(provider, Arc::new(registry), store.clone())
            .with_output(output.clone())
            .with_model("test-model")
            .with_streaming(streaming);
        agent.start().await.unwrap();
        Harness { agent, output, store, log }
    }

    #[tokio::test]
    async fn plain_answer_ends_turn() {
        let provider = ScriptedProvider::new(&["<think>easy</think>Hello! How can I help?"]);
        let mut h = harness(provider.clone(), false).await;

        let outcome = h.agent.process("Hi").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Answered { iterations: 1 });
        assert_eq!(h.output.events(), vec![Shown::Prose("Hello! How can I help?".into())]);

        // system + user + raw assistant
        let history = h.agent.conversation().messages();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].content, "<think>easy</think>Hello! How can I help?");
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn single_call_result_is_unnumbered() {
        let provider = ScriptedProvider::new(&[
            r#"Echoing. {"tool": "echo", "params": {"text": "hi"}}"#,
            "All done.",
        ]);
        let mut h = harness(provider.clone(), false).await;

        h.agent.process("say hi").await.unwrap();

        let second = &provider.requests()[1];
        assert_eq!(second.last().unwrap(), &Message::user("Tool result:\nhi"));
        assert_eq!(h.output.events()[0], Shown::Prose("Echoing.".into()));
        assert!(matches!(&h.output.events()[1], Shown::Status(s) if s.contains("echo completed")));
    }

    #[tokio::test]
    async fn multiple_calls_run_in_order_and_aggregate() {
        let provider = ScriptedProvider::new(&[
            r#"{"tool": "echo", "params": {"text": "one"}}
{"tool": "echo", "params": {"text": "two"}}
{"tool": "echo", "params": {"text": "one"}}"#,
            "Finished.",
        ]);
        let mut h = harness(provider.clone(), false).await;

        h.agent.process("go").await.unwrap();

        assert_eq!(*h.log.lock().unwrap(), vec!["one", "two"]);
        let second = &provider.requests()[1];
        assert_eq!(
            second.last().unwrap().content,
            "[1] echo result:\none\n\n[2] echo result:\ntwo\n\n"
        );
    }

    #[tokio::test]
    async fn unknown_tool_error_is_fed_back() {
        let provider = ScriptedProvider::new(&[
            r#"{"tool": "frobnicate", "params": {}}"#,
            "Sorry, that tool does not exist.",
        ]);
        let mut h = harness(provider.clone(), false).await;

        let outcome = h.agent.process("frob it").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Answered { iterations: 2 });

        let second = &provider.requests()[1];
        assert_eq!(
            second.last().unwrap().content,
            "Tool result:\nError: unknown tool: frobnicate"
        );
        assert!(h.output.events().iter().any(|e| matches!(e, Shown::Status(s) if s.contains("✗ frobnicate failed"))));
    }

    #[tokio::test]
    async fn iteration_cap_stops_without_error() {
        let replies: Vec<String> = (0..20)
            .map(|i| format!(r#"{{"tool": "echo", "params": {{"text": "{i}"}}}}"#))
            .collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
        let provider = ScriptedProvider::new(&refs);
        let mut h = harness(provider.clone(), false).await;

        let outcome = h.agent.process("loop forever").await.unwrap();
        assert_eq!(outcome, TurnOutcome::IterationLimit { iterations: 10 });
        assert_eq!(provider.requests().len(), 10);
        assert_eq!(h.log.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn streaming_hides_think_and_matches_buffered_history() {
        let reply = r#"<think>plan it</think>Let me echo. {"tool": "echo", "params": {"text": "x"}}"#;
        let provider = ScriptedProvider::new(&[reply, "Done streaming."]);
        let mut h = harness(provider.clone(), true).await;

        h.agent.process("go").await.unwrap();

        let streamed = h.output.streamed();
        assert_eq!(streamed, "Let me echo. Done streaming.");
        assert!(!streamed.contains("plan it"));

        let history = h.agent.conversation().messages();
        assert_eq!(history[2].content, reply);
        assert_eq!(history[3].content, "Tool result:\nx");
        assert_eq!(history[4].content, "Done streaming.");
    }

    #[tokio::test]
    async fn streaming_displays_only_prose_before_calls() {
        let provider = ScriptedProvider::new(&[r#"Checking. {"tool": "nope", "params": {}}"#, "Answer."]);
        let mut h = harness(provider, true).await;

        h.agent.process("check").await.unwrap();

        let streamed = h.output.streamed();
        assert!(!streamed.contains("\"tool\""));
        assert_eq!(streamed, "Checking. Answer.");
        assert!(h.output.events().iter().any(|e| matches!(e, Shown::Status(s) if s.contains("nope failed"))));
    }

    #[tokio::test]
    async fn streaming_releases_brackets_that_are_not_calls() {
        let reply = r#"Use {"name": 1} or [1, 2] here."#;
        let mut h = harness(ScriptedProvider::new(&[reply]), true).await;
        h.agent.process("show me").await.unwrap();
        assert_eq!(h.output.streamed(), reply);
    }

    #[tokio::test]
    async fn streaming_shows_call_text_that_never_parses() {
        let reply = r#"Maybe {"tool": oops"#;
        let mut h = harness(ScriptedProvider::new(&[reply]), true).await;
        let outcome = h.agent.process("try").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Answered { iterations: 1 });
        assert_eq!(h.output.streamed(), reply);
    }

    #[tokio::test]
    async fn usage_accumulates_and_is_persisted() {
        let provider = ScriptedProvider::new(&[r#"{"tool": "echo", "params": {}}"#, "ok"]);
        let mut h = harness(provider, false).await;

        h.agent.process("go").await.unwrap();
        assert_eq!(h.agent.usage().total_tokens, 30);
        assert!(h.agent.format_usage().contains("Total tokens:      30"));

        let id = h.agent.session_id().unwrap().to_string();
        let session = h.store.get_session(&id).await.unwrap();
        assert_eq!(session.total_usage.unwrap().total_tokens, 30);
    }

    #[tokio::test]
    async fn turn_is_persisted_with_tool_records() {
        let provider = ScriptedProvider::new(&[r#"{"tool": "echo", "params": {"text": "a"}}"#, "ok"]);
        let mut h = harness(provider, false).await;
        h.agent.process("go").await.unwrap();

        let id = h.agent.session_id().unwrap().to_string();
        let session = h.store.get_session(&id).await.unwrap();
        let roles: Vec<_> = session.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "user", "assistant"]);
        let record = session.messages[2].tool_call.as_ref().unwrap();
        assert_eq!(record.tool, "echo");
        assert_eq!(record.result, "a");
        assert!(record.success);
    }

    #[tokio::test]
    async fn load_session_rebuilds_history_without_tool_entries() {
        let provider = ScriptedProvider::new(&[r#"{"tool": "echo", "params": {"text": "a"}}"#, "ok"]);
        let mut h = harness(provider, false).await;
        h.agent.process("go").await.unwrap();
        let old = h.agent.session_id().unwrap().to_string();
        let before = h.agent.history_len();

        h.agent.new_session(Some("other")).await.unwrap();
        assert_eq!(h.agent.history_len(), 1);

        h.agent.load_session(&old).await.unwrap();
        assert_eq!(h.agent.history_len(), before);
        assert_eq!(h.agent.session_id(), Some(old.as_str()));
        // usage belongs to the loop, not the session
        assert_eq!(h.agent.usage().total_tokens, 30);
    }

    #[tokio::test]
    async fn start_resumes_active_session() {
        let store = Arc::new(InMemoryStore::new());
        let session = store.create_session(Some("earlier")).await.unwrap();
        store.add_message(&session.id, SessionMessage::new("user", "hello")).await.unwrap();
        store.add_message(&session.id, SessionMessage::new("assistant", "hi")).await.unwrap();
        store
            .update_usage(&session.id, TokenUsage { prompt_tokens: 1, completion_tokens: 2, total_tokens: 3 })
            .await
            .unwrap();

        let mut agent = AgentLoop::new(ScriptedProvider::new(&[]), Arc::new(ToolRegistry::new()), store);
        let resumed = agent.start().await.unwrap().unwrap();
        assert_eq!(resumed.id, session.id);
        assert_eq!(agent.history_len(), 3);
        assert_eq!(agent.usage().total_tokens, 3);
    }

    #[tokio::test]
    async fn reload_context_picks_up_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let mut agent = AgentLoop::new(ScriptedProvider::new(&[]), Arc::new(ToolRegistry::new()), store)
            .with_working_dir(dir.path());
        agent.start().await.unwrap();
        assert!(!agent.conversation().system_prompt().contains("## PROJECT CONTEXT"));

        std::fs::write(dir.path().join(prompt::PROJECT_CONTEXT_FILE), "Prefer tabs.").unwrap();
        agent.reload_context().await;
        assert!(agent.conversation().system_prompt().contains("Prefer tabs."));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_no_partial_reply() {
        let store = Arc::new(InMemoryStore::new());
        let mut agent = AgentLoop::new(Arc::new(StalledProvider), Arc::new(ToolRegistry::new()), store)
            .with_streaming(false)
            .with_turn_timeout(Duration::from_secs(5));
        agent.start().await.unwrap();

        let err = agent.process("hello?").await.unwrap_err();
        assert!(matches!(err, Error::TurnTimeout { secs: 5 }));
        let history = agent.conversation().messages();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], Message::user("hello?"));
    }

    #[tokio::test(start_paused = true)]
    async fn tool_time_counts_against_turn_budget() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool));
        let provider = ScriptedProvider::new(&[r#"{"tool": "slow", "params": {}}"#, "too late"]);
        let mut agent = AgentLoop::new(provider.clone(), Arc::new(registry), Arc::new(InMemoryStore::new()))
            .with_streaming(false)
            .with_turn_timeout(Duration::from_secs(5));
        agent.start().await.unwrap();

        let err = agent.process("take your time").await.unwrap_err();
        assert!(matches!(err, Error::TurnTimeout { secs: 5 }));
        // the tool finished and its result is in history; no second request went out
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(agent.conversation().last(), Some(&Message::user("Tool result:\nslept")));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_lets_running_tool_finish_then_rolls_back() {
        let cancel = CancellationToken::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(InterruptingTool {
            cancel: cancel.clone(),
            log: log.clone(),
        }));
        let provider = ScriptedProvider::new(&[
            "Hello.",
            r#"Working. {"tool": "interrupt", "params": {}}"#,
            "never requested",
        ]);
        let store = Arc::new(InMemoryStore::new());
        let progress = Arc::new(SpyProgress::default());
        let mut agent = AgentLoop::new(provider.clone(), Arc::new(registry), store.clone())
            .with_progress(progress.clone())
            .with_streaming(false);
        agent.start().await.unwrap();
        agent.process("hi").await.unwrap();

        let err = agent.process_with_cancel("do it", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(*log.lock().unwrap(), vec!["finished"]);
        assert_eq!(provider.requests().len(), 2);

        // back to where the turn started, in memory and on disk
        assert_eq!(agent.history_len(), 3);
        assert_eq!(agent.conversation().last(), Some(&Message::assistant("Hello.")));
        let session = store.get_session(agent.session_id().unwrap()).await.unwrap();
        let contents: Vec<_> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "Hello."]);
        assert!(!progress.running.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_during_model_request() {
        let store = Arc::new(InMemoryStore::new());
        let progress = Arc::new(SpyProgress::default());
        let mut agent = AgentLoop::new(Arc::new(StalledProvider), Arc::new(ToolRegistry::new()), store.clone())
            .with_progress(progress.clone())
            .with_streaming(false);
        agent.start().await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = agent.process_with_cancel("hello?", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(agent.history_len(), 1);
        let session = store.get_session(agent.session_id().unwrap()).await.unwrap();
        assert!(session.messages.is_empty());
        assert!(!progress.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transport_error_aborts_turn() {
        let mut h = harness(Arc::new(DownProvider), false).await;
        let err = h.agent.process("hi").await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
        assert_eq!(h.agent.history_len(), 2);
    }

    #[test]
    fn usage_formatting() {
        assert_eq!(format_usage(&TokenUsage::default()), "No token usage recorded yet.");
        let text = format_usage(&TokenUsage { prompt_tokens: 7, completion_tokens: 3, total_tokens: 10 });
        assert!(text.contains("Prompt tokens:     7"));
        assert!(text.contains("Completion tokens: 3"));
    }
}
