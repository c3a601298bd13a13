//! Headless chat controller.
//!
//! Ties a client, a [`SessionStore`] and the current [`ChatSession`] together:
//! user input goes in, assistant replies (streamed or not) are recorded as
//! messages, and the session is autosaved when the settings ask for it.
//! Rendering is left to the caller, which receives the streamed text through
//! an update callback.

use std::sync::Arc;
use tracing::{info, warn};

use crate::client::{Client, ClientError, StreamingClient};
use crate::consumer::{consume_stream, ERROR_INDICATOR};
use crate::messages::{create_message, format_learning_report, welcome_message};
use crate::model::{
    validate_message, AppSettings, ChatMessage, ChatSession, MessageKind, Sender, StreamRequest,
    DEFAULT_MEMORY_ID,
};
use crate::storage::{SessionStore, Storage};

const INTERVIEW_PROMPT: &str = "Please provide 5 common programming interview questions with brief explanations for each answer.";

/// Messages kept in the server-side conversation memory.
pub const MEMORY_WINDOW: usize = 10;

/// Which assistant operation a message is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    /// Streamed conversational reply.
    Chat,
    /// Structured learning report.
    Report,
    /// Knowledge-base lookup.
    Knowledge,
}

/// One chat window's worth of state, without the window.
///
/// `send` takes `&mut self`, so overlapping sends on one conversation are not
/// possible. To stop a streamed reply from elsewhere, keep a handle from
/// [`Conversation::client`] and call `cancel_stream` on it.
pub struct Conversation<C: StreamingClient, S: Storage> {
    client: Arc<C>,
    store: SessionStore<S>,
    session: ChatSession,
    settings: AppSettings,
    memory_id: u32,
}

impl<C: StreamingClient, S: Storage> Conversation<C, S> {
    /// Start a fresh session, loading persisted settings.
    pub async fn new(client: Arc<C>, storage: S) -> Result<Self, ClientError> {
        let store = SessionStore::new(storage);
        let settings = store.load_settings().await?;

        let mut session = ChatSession::new();
        session.messages.push(welcome_message());

        Ok(Self {
            client,
            store,
            session,
            settings,
            memory_id: DEFAULT_MEMORY_ID,
        })
    }

    /// Use a specific server-side memory slot for streamed chat.
    pub fn with_memory_id(mut self, memory_id: u32) -> Self {
        self.memory_id = memory_id;
        self
    }

    pub fn client(&self) -> Arc<C> {
        Arc::clone(&self.client)
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    pub async fn update_settings(&mut self, settings: AppSettings) -> Result<(), ClientError> {
        self.store.save_settings(&settings).await?;
        self.settings = settings;
        Ok(())
    }

    /// Send user input and record the assistant's reply.
    ///
    /// For `Chat`, `on_update` is called with the full reply text after every
    /// streamed increment. Assistant failures don't fail the call: they are
    /// recorded in the session (the error indicator for a stream, a system
    /// error message otherwise) and that message is returned.
    pub async fn send<F>(
        &mut self,
        kind: SendKind,
        input: &str,
        on_update: F,
    ) -> Result<ChatMessage, ClientError>
    where
        F: FnMut(&str),
    {
        let message = input.trim();
        validate_message(message)?;

        self.push(create_message(Sender::User, message, MessageKind::Chat))
            .await?;

        let reply = match kind {
            SendKind::Chat => return self.stream_reply(message, on_update).await,
            SendKind::Report => match self.client.generate_learning_report(message).await {
                Ok(report) => create_message(
                    Sender::Ai,
                    &format_learning_report(&report),
                    MessageKind::Report,
                ),
                Err(e) => create_message(
                    Sender::System,
                    &format!("Error generating learning report: {}", e),
                    MessageKind::Error,
                ),
            },
            SendKind::Knowledge => match self.client.search_knowledge_base(message).await {
                Ok(result) => create_message(Sender::Ai, &result.content, MessageKind::Knowledge),
                Err(e) => create_message(
                    Sender::System,
                    &format!("Error searching knowledge base: {}", e),
                    MessageKind::Error,
                ),
            },
        };

        self.push(reply.clone()).await?;
        Ok(reply)
    }

    /// Ask for a set of common interview questions over the streamed chat.
    pub async fn interview_questions<F>(&mut self, on_update: F) -> Result<ChatMessage, ClientError>
    where
        F: FnMut(&str),
    {
        self.send(SendKind::Chat, INTERVIEW_PROMPT, on_update).await
    }

    /// Cancel a streamed reply in progress, if any.
    pub fn cancel(&self) {
        self.client.cancel_stream();
    }

    pub async fn check_connection(&self) -> bool {
        self.client.test_connection().await
    }

    /// e.g. `Memory: 3/10 messages`
    pub fn memory_status(&self) -> String {
        format!(
            "Memory: {}/{} messages",
            self.session.messages.len(),
            MEMORY_WINDOW
        )
    }

    /// Save the current session if it holds more than the greeting, then
    /// start a new one.
    pub async fn new_chat(&mut self) -> Result<(), ClientError> {
        if self.session.messages.len() > 1 {
            self.store.save_session(&mut self.session).await?;
        }
        self.session = ChatSession::new();
        self.push(welcome_message()).await
    }

    pub async fn save_chat(&mut self) -> Result<(), ClientError> {
        self.store.save_session(&mut self.session).await?;
        self.push(create_message(
            Sender::System,
            "Chat session saved successfully!",
            MessageKind::Chat,
        ))
        .await
    }

    /// Saved sessions, most recent first.
    pub async fn history(&self) -> Result<Vec<ChatSession>, ClientError> {
        Ok(self.store.load_sessions().await?)
    }

    /// Switch to a saved session, saving the current one first if it has content.
    pub async fn open_session(&mut self, session: ChatSession) -> Result<(), ClientError> {
        if self.session.messages.len() > 1 {
            self.store.save_session(&mut self.session).await?;
        }
        info!(id = %session.id, "switching session");
        self.session = session;
        Ok(())
    }

    /// Delete a saved session; deleting the current one starts a new chat.
    pub async fn delete_session(&mut self, id: &str) -> Result<(), ClientError> {
        self.store.delete_session(id).await?;
        if self.session.id == id {
            self.session = ChatSession::new();
            self.push(welcome_message()).await?;
        }
        Ok(())
    }

    /// Delete all saved sessions and start a new chat.
    pub async fn clear_history(&mut self) -> Result<usize, ClientError> {
        let removed = self.store.delete_all_sessions().await?;
        self.session = ChatSession::new();
        self.push(welcome_message()).await?;
        Ok(removed)
    }

    async fn stream_reply<F>(&mut self, message: &str, mut on_update: F) -> Result<ChatMessage, ClientError>
    where
        F: FnMut(&str),
    {
        let reply = create_message(Sender::Ai, "", MessageKind::Chat);
        let reply_id = reply.id.clone();
        self.push(reply).await?;

        let request = StreamRequest::new(message)?.with_memory_id(self.memory_id);
        let result = match self.client.stream_chat(request).await {
            Ok(stream) => {
                let session = &mut self.session;
                consume_stream(stream, |text| {
                    if let Some(m) = session.message_mut(&reply_id) {
                        m.content = text.to_string();
                    }
                    on_update(text);
                })
                .await
            }
            Err(e) => {
                on_update(ERROR_INDICATOR);
                Err(e)
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "streamed reply failed");
            if let Some(m) = self.session.message_mut(&reply_id) {
                m.content = ERROR_INDICATOR.to_string();
            }
        }

        self.autosave(Sender::Ai).await?;
        self.session
            .messages
            .iter()
            .find(|m| m.id == reply_id)
            .cloned()
            .ok_or_else(|| ClientError::InvalidRequest("reply message missing from session".to_string()))
    }

    async fn push(&mut self, message: ChatMessage) -> Result<(), ClientError> {
        let sender = message.sender;
        self.session.messages.push(message);
        self.autosave(sender).await
    }

    async fn autosave(&mut self, sender: Sender) -> Result<(), ClientError> {
        if self.settings.auto_save && sender != Sender::System {
            self.store.save_session(&mut self.session).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Operation;
    use crate::model::{KnowledgeBaseResult, LearningReport};
    use crate::session::{StreamController, TextStream};
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use parking_lot::Mutex;
    use std::io;

    /// Scripted client: streams `body` and fails the report call.
    struct FakeClient {
        body: &'static str,
        streams: StreamController,
        requests: Mutex<Vec<StreamRequest>>,
    }

    impl FakeClient {
        fn new(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                body,
                streams: StreamController::new(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Client for FakeClient {
        async fn chat(&self, message: &str) -> Result<String, ClientError> {
            Ok(message.to_string())
        }

        async fn generate_learning_report(&self, _: &str) -> Result<LearningReport, ClientError> {
            Err(ClientError::Operation {
                operation: Operation::LearningReport,
                status_text: "Bad Gateway".to_string(),
            })
        }

        async fn search_knowledge_base(&self, message: &str) -> Result<KnowledgeBaseResult, ClientError> {
            Ok(KnowledgeBaseResult {
                content: format!("About {}", message),
                sources: Vec::new(),
            })
        }

        async fn health_check(&self) -> Result<String, ClientError> {
            Ok("ok".to_string())
        }
    }

    #[async_trait]
    impl StreamingClient for FakeClient {
        async fn stream_chat(&self, request: StreamRequest) -> Result<TextStream, ClientError> {
            self.requests.lock().push(request);
            let chunks: Vec<Result<Bytes, io::Error>> = self
                .body
                .as_bytes()
                .chunks(4)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            self.streams.attach(stream::iter(chunks))
        }

        fn cancel_stream(&self) {
            self.streams.cancel();
        }
    }

    #[tokio::test]
    async fn test_streamed_reply_is_recorded_and_saved() {
        let client = FakeClient::new("data:Use \ndata:iterators\\n\ndata:[DONE]\n");
        let storage = InMemoryStorage::new();
        let mut conversation = Conversation::new(client.clone(), storage.clone())
            .await
            .unwrap()
            .with_memory_id(3);

        let mut updates = Vec::new();
        let reply = conversation
            .send(SendKind::Chat, "  how to loop? \n", |text| updates.push(text.to_string()))
            .await
            .unwrap();

        assert_eq!(reply.content, "Use iterators\n");
        assert_eq!(updates, vec!["Use ", "Use iterators\n"]);
        assert_eq!(client.requests.lock()[0].message(), "how to loop?");
        assert_eq!(client.requests.lock()[0].memory_id(), 3);

        let messages = &conversation.session().messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "how to loop?");
        assert_eq!(conversation.memory_status(), "Memory: 3/10 messages");

        let saved = conversation.history().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "how to loop?");
        assert_eq!(saved[0].messages[2].content, "Use iterators\n");
    }

    #[tokio::test]
    async fn test_multiline_input_is_sent_verbatim() {
        let client = FakeClient::new("data:ok\ndata:[DONE]\n");
        let mut conversation = Conversation::new(client.clone(), InMemoryStorage::new())
            .await
            .unwrap();

        let code = "fix this:\nfn main() {\n    let x = 1;\n}";
        conversation
            .send(SendKind::Chat, &format!("\n{}\n\n", code), |_| {})
            .await
            .unwrap();

        assert_eq!(client.requests.lock()[0].message(), code);
        assert_eq!(conversation.session().messages[1].content, code);
    }

    #[tokio::test]
    async fn test_stream_failure_sets_error_indicator() {
        let client = FakeClient::new("data:partial\n");
        let storage = InMemoryStorage::new();
        let mut conversation = Conversation::new(client.clone(), storage).await.unwrap();

        // Hold a live session so the next open is rejected.
        let (_tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, io::Error>>();
        let _blocking = client.streams.attach(rx).unwrap();

        let mut updates = Vec::new();
        let reply = conversation
            .send(SendKind::Chat, "hello", |text| updates.push(text.to_string()))
            .await
            .unwrap();
        assert_eq!(reply.content, ERROR_INDICATOR);
        assert_eq!(updates, vec![ERROR_INDICATOR]);
    }

    #[tokio::test]
    async fn test_report_failure_becomes_system_error_message() {
        let client = FakeClient::new("");
        let mut conversation = Conversation::new(client, InMemoryStorage::new()).await.unwrap();

        let reply = conversation
            .send(SendKind::Report, "I know Python", |_| {})
            .await
            .unwrap();
        assert_eq!(reply.sender, Sender::System);
        assert_eq!(reply.kind, Some(MessageKind::Error));
        assert_eq!(
            reply.content,
            "Error generating learning report: Learning Report API error: Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_knowledge_reply_and_invalid_input() {
        let client = FakeClient::new("");
        let mut conversation = Conversation::new(client, InMemoryStorage::new()).await.unwrap();

        let reply = conversation
            .send(SendKind::Knowledge, "ownership", |_| {})
            .await
            .unwrap();
        assert_eq!(reply.kind, Some(MessageKind::Knowledge));
        assert_eq!(reply.content, "About ownership");

        assert!(matches!(
            conversation.send(SendKind::Chat, " \n ", |_| {}).await,
            Err(ClientError::InvalidRequest(_))
        ));

        let oversized = "x".repeat(crate::model::MAX_MESSAGE_CHARS + 1);
        match conversation.send(SendKind::Chat, &oversized, |_| {}).await {
            Err(ClientError::InvalidRequest(reason)) => {
                assert_eq!(reason, "message is 4001 characters, limit is 4000")
            }
            other => panic!("expected invalid request, got {:?}", other.map(|m| m.content)),
        }
        // Rejected input never reaches the session.
        assert_eq!(conversation.session().messages.len(), 3);
    }

    #[tokio::test]
    async fn test_autosave_off_keeps_storage_empty() {
        let client = FakeClient::new("data:hi\n");
        let storage = InMemoryStorage::new();
        let mut conversation = Conversation::new(client, storage.clone()).await.unwrap();
        conversation
            .update_settings(AppSettings {
                auto_save: false,
                ..AppSettings::default()
            })
            .await
            .unwrap();

        conversation.send(SendKind::Chat, "hey", |_| {}).await.unwrap();
        assert!(conversation.history().await.unwrap().is_empty());

        // Settings are persisted under their own key.
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_new_chat_and_clear_history() {
        let client = FakeClient::new("data:reply\n");
        let mut conversation = Conversation::new(client, InMemoryStorage::new()).await.unwrap();
        assert!(conversation.check_connection().await);

        conversation.send(SendKind::Chat, "first", |_| {}).await.unwrap();
        let first_id = conversation.session().id.clone();

        conversation.new_chat().await.unwrap();
        assert_eq!(conversation.session().messages.len(), 1);

        let history = conversation.history().await.unwrap();
        assert!(history.iter().any(|s| s.id == first_id));

        conversation.open_session(history[0].clone()).await.unwrap();
        assert_eq!(conversation.session().id, first_id);

        conversation.delete_session(&first_id).await.unwrap();
        assert_ne!(conversation.session().id, first_id);

        conversation.clear_history().await.unwrap();
        assert!(conversation.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unsaved_current_session_starts_new_chat() {
        let client = FakeClient::new("");
        let mut conversation = Conversation::new(client, InMemoryStorage::new()).await.unwrap();
        let unsaved_id = conversation.session().id.clone();

        conversation.delete_session(&unsaved_id).await.unwrap();
        assert_ne!(conversation.session().id, unsaved_id);
        assert_eq!(conversation.session().messages.len(), 1);
    }
}
