use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::conversation::{Conversation, SharedConversation};
use super::selector::{run_turn, ReplyUpdate, TurnOutcome};
use super::{ChatMessage, ChatRequest, ChatTransport};
use crate::error::ChatError;

/// Result of sending one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Id of the assistant message that received the reply
    pub message_id: String,
    pub outcome: TurnOutcome,
}

/// A conversation bound to one transport.
///
/// The transport is injected once and shared for every turn; the
/// conversation can be handed to a renderer through [`ChatSession::conversation`].
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    conversation: SharedConversation,
    streaming: bool,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, streaming: bool) -> Self {
        Self {
            transport,
            conversation: Conversation::new().shared(),
            streaming,
        }
    }

    /// Continue an existing conversation instead of starting an empty one.
    pub fn with_conversation(mut self, conversation: SharedConversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn conversation(&self) -> SharedConversation {
        Arc::clone(&self.conversation)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    pub async fn clear(&self) {
        self.conversation.lock().await.clear();
    }

    /// Sends `prompt` and waits until the reply has been applied.
    pub async fn send(&self, prompt: impl Into<String>) -> Result<ChatReply, ChatError> {
        self.send_with(prompt, &CancellationToken::new(), |_| {})
            .await
    }

    /// Sends `prompt`, calling `on_update` for every change to the reply as it
    /// lands in the conversation.
    ///
    /// The user message and an empty assistant placeholder are added before
    /// the request goes out. On error the placeholder stays in place, empty.
    pub async fn send_with<F>(
        &self,
        prompt: impl Into<String>,
        cancel: &CancellationToken,
        on_update: F,
    ) -> Result<ChatReply, ChatError>
    where
        F: FnMut(ReplyUpdate<'_>),
    {
        let placeholder = ChatMessage::assistant().build();
        let message_id = placeholder.id.clone();

        let request = {
            let mut conversation = self.conversation.lock().await;
            conversation.push(ChatMessage::user().content(prompt).build());
            let request = ChatRequest::new(conversation.history());
            conversation.push(placeholder);
            request
        };
        log::debug!(
            "sending chat turn with {} message(s), streaming={}",
            request.messages.len(),
            self.streaming
        );

        let outcome = run_turn(
            self.transport.as_ref(),
            &self.conversation,
            &message_id,
            &request,
            self.streaming,
            cancel,
            on_update,
        )
        .await?;

        Ok(ChatReply {
            message_id,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;

    use super::*;
    use crate::chat::{ChatRole, FallbackResponse, StreamReply};

    /// Streams a fixed reply and records every request it sees.
    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn open_stream(
            &self,
            request: &ChatRequest,
        ) -> Result<StreamReply, ChatError> {
            self.requests.lock().unwrap().push(request.clone());
            let body = Bytes::from_static(b"{\"delta\":\"Noted.\"}\n");
            Ok(StreamReply::Stream(Box::pin(stream::iter(vec![
                Ok::<_, ChatError>(body),
            ]))))
        }

        async fn complete(&self, request: &ChatRequest) -> Result<FallbackResponse, ChatError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(FallbackResponse {
                response: "Blocking reply".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_send_adds_user_message_and_streams_reply() {
        let transport = Arc::new(RecordingTransport::default());
        let session = ChatSession::new(transport.clone(), true);

        let reply = session.send("Patient reports lateral hip pain").await.unwrap();

        assert_eq!(reply.outcome, TurnOutcome::Streamed);
        let conversation = session.conversation();
        let conversation = conversation.lock().await;
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].role, ChatRole::User);
        let answer = conversation.get(&reply.message_id).unwrap();
        assert_eq!(answer.role, ChatRole::Assistant);
        assert_eq!(answer.content, "Noted.");

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].stream);
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_follow_up_sends_whole_history() {
        let transport = Arc::new(RecordingTransport::default());
        let mut session = ChatSession::new(transport.clone(), true);

        session.send("First question").await.unwrap();
        session.set_streaming(false);
        let reply = session.send("Second question").await.unwrap();

        assert_eq!(reply.outcome, TurnOutcome::Blocking);
        let requests = transport.requests.lock().unwrap();
        let contents: Vec<&str> = requests[1]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["First question", "Noted.", "Second question"]);
        assert!(!requests[1].stream);
    }

    #[tokio::test]
    async fn test_clear_empties_conversation() {
        let session = ChatSession::new(Arc::new(RecordingTransport::default()), true);
        session.send("hello").await.unwrap();

        session.clear().await;

        assert!(session.conversation().lock().await.is_empty());
    }
}
