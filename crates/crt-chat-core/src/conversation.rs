//! Conversation view-model
//!
//! Owns the transcript plus the loading/error flags and drives the
//! send → pending → reply/error → retry cycle. The network call itself is
//! left to the caller (see [`PendingReply`]) so a UI can run it on a
//! background task and feed the outcome back through [`Conversation::resolve`].

use std::sync::Arc;

use crate::ai::CompletionService;
use crate::error::{CompletionError, CompletionResult};
use crate::state::{Message, Role, WELCOME_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingResponse,
    Errored,
}

/// A request that has been recorded in the transcript but not yet answered
#[derive(Debug, Clone)]
pub struct PendingReply {
    pub text: String,
    /// Transcript as it stood before `text` was sent
    pub history: Vec<Message>,
}

impl PendingReply {
    pub async fn run(&self, client: &dyn CompletionService) -> CompletionResult<String> {
        client.send_message(&self.text, &self.history).await
    }
}

pub struct Conversation {
    client: Arc<dyn CompletionService>,
    messages: Vec<Message>,
    loading: bool,
    error: Option<String>,
}

impl Conversation {
    pub fn new(client: Arc<dyn CompletionService>) -> Self {
        Self {
            client,
            messages: Vec::new(),
            loading: false,
            error: None,
        }
    }

    pub fn client(&self) -> Arc<dyn CompletionService> {
        Arc::clone(&self.client)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::AwaitingResponse
        } else if self.error.is_some() {
            Phase::Errored
        } else {
            Phase::Idle
        }
    }

    /// Whether the primary input should take new text
    pub fn accepts_input(&self) -> bool {
        self.phase() == Phase::Idle
    }

    /// Appends the boot greeting as an assistant message.
    pub fn greet(&mut self, text: &str) {
        self.messages.push(Message {
            id: WELCOME_ID.to_string(),
            ..Message::assistant(text)
        });
    }

    /// Records `text` as a user message right away and returns the request
    /// to hand to the completion client.
    pub fn submit(&mut self, text: &str) -> PendingReply {
        self.error = None;
        let history = self.messages.clone();
        self.messages.push(Message::user(text));
        self.loading = true;
        tracing::debug!(history = history.len(), "message submitted");

        PendingReply {
            text: text.to_string(),
            history,
        }
    }

    /// Clears the error and re-sends the most recent user message without
    /// adding it to the transcript again. Returns `None` when nothing was
    /// ever sent.
    pub fn retry(&mut self) -> Option<PendingReply> {
        self.error = None;

        let idx = self.messages.iter().rposition(|m| m.role == Role::User)?;
        self.loading = true;
        tracing::debug!(index = idx, "retrying last user message");

        Some(PendingReply {
            text: self.messages[idx].content.clone(),
            history: self.messages[..idx].to_vec(),
        })
    }

    /// Applies the outcome of a request, whichever request it was.
    pub fn resolve(&mut self, outcome: CompletionResult<String>) {
        self.loading = false;
        match outcome {
            Ok(content) => {
                self.messages.push(Message::assistant(content));
            }
            Err(e) => {
                tracing::warn!(error = %e, "reply failed");
                self.error = Some(e.to_string());
            }
        }
    }

    /// Submit and wait for the reply on the current task.
    pub async fn send(&mut self, text: &str) {
        let pending = self.submit(text);
        let outcome = pending.run(self.client.as_ref()).await;
        self.resolve(outcome);
    }

    /// Retry and wait for the reply on the current task.
    pub async fn retry_and_wait(&mut self) {
        if let Some(pending) = self.retry() {
            let outcome = pending.run(self.client.as_ref()).await;
            self.resolve(outcome);
        }
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Most recent assistant message
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Records an error that did not come from the completion client.
    pub fn fail(&mut self, error: CompletionError) {
        self.resolve(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Plays back canned outcomes and records what it was asked.
    #[derive(Default)]
    struct ScriptedClient {
        outcomes: Mutex<VecDeque<CompletionResult<String>>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedClient {
        fn new(outcomes: Vec<CompletionResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedClient {
        async fn send_message(&self, user_text: &str, history: &[Message]) -> CompletionResult<String> {
            self.calls.lock().unwrap().push((
                user_text.to_string(),
                history.iter().map(|m| m.content.clone()).collect(),
            ));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(CompletionError::UnknownFailure("script exhausted".to_string())))
        }
    }

    fn transcript(conv: &Conversation) -> Vec<(Role, &str)> {
        conv.messages().iter().map(|m| (m.role, m.content.as_str())).collect()
    }

    fn server_error() -> CompletionError {
        CompletionError::RequestFailed { status: 500, message: "boom".to_string() }
    }

    #[test]
    fn test_submit_is_optimistic() {
        let client = ScriptedClient::new(vec![]);
        let mut conv = Conversation::new(client);
        assert_eq!(conv.phase(), Phase::Idle);

        let pending = conv.submit("hello");
        assert_eq!(conv.phase(), Phase::AwaitingResponse);
        assert!(!conv.accepts_input());
        assert_eq!(transcript(&conv), vec![(Role::User, "hello")]);
        assert_eq!(pending.text, "hello");
        assert!(pending.history.is_empty());
    }

    #[tokio::test]
    async fn test_success_appends_reply() {
        let client = ScriptedClient::new(vec![Ok("HI THERE".to_string())]);
        let mut conv = Conversation::new(client.clone());

        conv.send("hello").await;

        assert_eq!(conv.phase(), Phase::Idle);
        assert_eq!(
            transcript(&conv),
            vec![(Role::User, "hello"), (Role::Assistant, "HI THERE")]
        );
        assert_eq!(client.calls(), vec![("hello".to_string(), vec![])]);
    }

    #[tokio::test]
    async fn test_failure_keeps_user_message() {
        let client = ScriptedClient::new(vec![Err(CompletionError::NetworkUnavailable)]);
        let mut conv = Conversation::new(client);

        conv.send("anyone there?").await;

        assert_eq!(conv.phase(), Phase::Errored);
        assert!(!conv.accepts_input());
        assert_eq!(
            conv.error(),
            Some("Network error. Please check your connection and try again.")
        );
        assert_eq!(transcript(&conv), vec![(Role::User, "anyone there?")]);
    }

    #[tokio::test]
    async fn test_retry_after_server_error() {
        let client = ScriptedClient::new(vec![
            Ok("reply to A".to_string()),
            Err(server_error()),
            Ok("reply to B".to_string()),
        ]);
        let mut conv = Conversation::new(client.clone());

        conv.send("A").await;
        conv.send("B").await;

        assert_eq!(conv.phase(), Phase::Errored);
        assert!(conv.error().unwrap().contains("500"));
        assert_eq!(
            transcript(&conv),
            vec![(Role::User, "A"), (Role::Assistant, "reply to A"), (Role::User, "B")]
        );

        conv.retry_and_wait().await;

        assert_eq!(conv.phase(), Phase::Idle);
        assert_eq!(conv.error(), None);
        assert_eq!(
            transcript(&conv),
            vec![
                (Role::User, "A"),
                (Role::Assistant, "reply to A"),
                (Role::User, "B"),
                (Role::Assistant, "reply to B"),
            ]
        );

        // The retry carried the same history the original send of "B" did
        let calls = client.calls();
        assert_eq!(calls[1], calls[2]);
        assert_eq!(calls[2].0, "B");
        assert_eq!(calls[2].1, vec!["A".to_string(), "reply to A".to_string()]);
    }

    #[test]
    fn test_retry_clears_error_before_resending() {
        let client = ScriptedClient::new(vec![]);
        let mut conv = Conversation::new(client);
        conv.submit("B");
        conv.resolve(Err(server_error()));

        let pending = conv.retry().unwrap();
        assert_eq!(conv.error(), None);
        assert_eq!(conv.phase(), Phase::AwaitingResponse);
        assert_eq!(pending.text, "B");
    }

    #[test]
    fn test_retry_without_user_message_only_clears_error() {
        let client = ScriptedClient::new(vec![]);
        let mut conv = Conversation::new(client);
        conv.greet("WELCOME");
        conv.fail(CompletionError::MissingApiKey);
        assert_eq!(conv.phase(), Phase::Errored);

        assert!(conv.retry().is_none());
        assert_eq!(conv.phase(), Phase::Idle);
        assert_eq!(conv.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_from_errored_clears_error() {
        let client = ScriptedClient::new(vec![Err(server_error()), Ok("fine".to_string())]);
        let mut conv = Conversation::new(client);

        conv.send("first").await;
        assert_eq!(conv.phase(), Phase::Errored);

        let _pending = conv.submit("second");
        assert_eq!(conv.error(), None);
        assert_eq!(conv.phase(), Phase::AwaitingResponse);
    }

    #[test]
    fn test_late_result_is_applied() {
        let client = ScriptedClient::new(vec![]);
        let mut conv = Conversation::new(client);
        conv.submit("one");
        conv.submit("two");
        conv.resolve(Ok("answer".to_string()));

        assert_eq!(conv.phase(), Phase::Idle);
        assert_eq!(conv.messages().len(), 3);
        assert_eq!(conv.messages()[2].content, "answer");
    }

    #[test]
    fn test_greeting_and_lookups() {
        let client = ScriptedClient::new(vec![]);
        let mut conv = Conversation::new(client);
        conv.greet("SYSTEM INITIALIZED...");

        let welcome = conv.message(WELCOME_ID).unwrap();
        assert_eq!(welcome.role, Role::Assistant);
        assert_eq!(conv.last_reply().unwrap().id, WELCOME_ID);

        let pending = conv.submit("hi");
        assert_eq!(pending.history.len(), 1);
        conv.resolve(Ok("there".to_string()));
        assert_eq!(conv.last_reply().unwrap().content, "there");
    }
}
