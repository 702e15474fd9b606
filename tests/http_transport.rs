//! End-to-end turns against a mock chat endpoint.

use physio_chat::backends::HttpChat;
use physio_chat::{
    ChatBuilder, ChatError, ChatMessage, ChatRequest, ChatSession, ChatTransport, FallbackReason,
    TurnOutcome,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session(server: &MockServer) -> ChatSession {
    ChatBuilder::new()
        .endpoint(format!("{}/api/chat", server.uri()))
        .api_key("test-key")
        .build()
        .unwrap()
}

async fn reply_content(session: &ChatSession, id: &str) -> String {
    let conversation = session.conversation();
    let conversation = conversation.lock().await;
    conversation.get(id).unwrap().content.clone()
}

#[tokio::test]
async fn streams_sse_reply_into_placeholder() {
    let server = MockServer::start().await;
    let body = concat!(
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server);
    let reply = session.send("Hi").await.unwrap();

    assert_eq!(reply.outcome, TurnOutcome::Streamed);
    assert_eq!(reply_content(&session, &reply.message_id).await, "Hello");
}

#[tokio::test]
async fn streams_plain_text_lines() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("Heel raises, \n3 sets of 15.", "text/plain; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let session = session(&server);
    let reply = session.send("Calf loading?").await.unwrap();

    assert_eq!(reply.outcome, TurnOutcome::Streamed);
    assert_eq!(
        reply_content(&session, &reply.message_id).await,
        "Heel raises,3 sets of 15."
    );
}

#[tokio::test]
async fn json_answer_to_stream_request_is_used_without_second_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "Full reply at once"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server);
    let reply = session.send("Hi").await.unwrap();

    assert_eq!(reply.outcome, TurnOutcome::WholeReply);
    assert_eq!(
        reply_content(&session, &reply.message_id).await,
        "Full reply at once"
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_answer_to_stream_request_falls_back_to_blocking_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "Full blocking reply"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server);
    let reply = session.send("Hi").await.unwrap();

    assert_eq!(reply.outcome, TurnOutcome::FellBack(FallbackReason::NoStream));
    assert_eq!(
        reply_content(&session, &reply.message_id).await,
        "Full blocking reply"
    );
}

#[tokio::test]
async fn blocking_mode_sends_history_and_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "physio-assistant",
            "stream": false,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Frozen shoulder stages?"}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "Freezing, frozen, thawing."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = ChatBuilder::new()
        .endpoint(format!("{}/api/chat", server.uri()))
        .model("physio-assistant")
        .system("Be brief.")
        .stream(false)
        .build()
        .unwrap();
    let reply = session.send("Frozen shoulder stages?").await.unwrap();

    assert_eq!(reply.outcome, TurnOutcome::Blocking);
    assert_eq!(
        reply_content(&session, &reply.message_id).await,
        "Freezing, frozen, thawing."
    );
}

#[tokio::test]
async fn server_error_on_stream_is_terminal_and_leaves_placeholder_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server);
    let err = session.send("Hi").await.unwrap_err();

    match err {
        ChatError::ProviderError(message) => assert!(message.contains("upstream exploded")),
        other => panic!("expected ProviderError, got {other:?}"),
    }
    let conversation = session.conversation();
    let conversation = conversation.lock().await;
    assert_eq!(conversation.len(), 2);
    assert!(conversation.last().unwrap().content.is_empty());
}

#[tokio::test]
async fn rate_limit_and_auth_statuses_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/locked"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let request = ChatRequest::new(vec![ChatMessage::user().content("Hi").build()]);

    let limited =
        HttpChat::new(&format!("{}/limited", server.uri()), None, None, None, None, None).unwrap();
    assert!(matches!(
        limited.complete(&request).await,
        Err(ChatError::TooManyRequests(body)) if body == "slow down"
    ));

    let locked =
        HttpChat::new(&format!("{}/locked", server.uri()), None, None, None, None, None).unwrap();
    assert!(matches!(
        locked.open_stream(&request.with_stream(true)).await,
        Err(ChatError::AuthError(_))
    ));
}

#[tokio::test]
async fn malformed_blocking_body_is_response_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{\"answer\": 1}", "application/json"))
        .mount(&server)
        .await;

    let chat =
        HttpChat::new(&format!("{}/api/chat", server.uri()), None, None, None, None, None).unwrap();
    let request = ChatRequest::new(vec![ChatMessage::user().content("Hi").build()]);

    match chat.complete(&request).await {
        Err(ChatError::ResponseFormatError { raw_response, .. }) => {
            assert_eq!(raw_response, "{\"answer\": 1}")
        }
        other => panic!("expected ResponseFormatError, got {other:?}"),
    }
}
