//! OpenAI Responses client authenticated with a ChatGPT subscription
//!
//! Requests go to the Codex backend with an OAuth bearer token. A rejected
//! credential triggers one refresh through the shared [`TokenManager`] and
//! exactly one retry of the same request.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{TokenManager, TokenState};
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::request::build_body;
use super::{ChatResponse, DeltaEvent, LlmClient, SseParser, StreamDecoder, WireEvent};
use crate::agent::message::Message;

/// Codex Responses endpoint
pub const RESPONSES_URL: &str = "https://chatgpt.com/backend-api/codex/responses";

const ORIGINATOR: &str = "quill";

/// Moves one request body to the provider and hands back wire events.
///
/// Implementations must map a rejected credential (HTTP 401/403) to
/// [`Error::AuthenticationFailure`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn stream(
        &self,
        body: &Value,
        credential: &TokenState,
        sink: &mut (dyn FnMut(WireEvent) -> Result<()> + Send),
    ) -> Result<()>;
}

/// reqwest-backed SSE transport
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    url: String,
    session_id: String,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_url(RESPONSES_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            session_id: Uuid::new_v4().to_string(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn stream(
        &self,
        body: &Value,
        credential: &TokenState,
        sink: &mut (dyn FnMut(WireEvent) -> Result<()> + Send),
    ) -> Result<()> {
        let mut request = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", credential.access_token))
            .header("OpenAI-Beta", "responses=experimental")
            .header(ACCEPT, "text/event-stream")
            .header("originator", ORIGINATOR)
            .header("session_id", &self.session_id)
            .json(body);

        if let Some(account_id) = &credential.account_id {
            request = request.header("chatgpt-account-id", account_id);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(status, &text);
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(Error::AuthenticationFailure(message));
            }
            return Err(Error::Llm(format!(
                "Provider API error ({}): {}",
                status.as_u16(),
                message
            )));
        }

        let mut bytes = response.bytes_stream();
        let mut parser = SseParser::new();

        while let Some(chunk) = bytes.next().await {
            for event in parser.feed(&chunk?) {
                sink(event)?;
            }
        }
        for event in parser.finish() {
            sink(event)?;
        }

        Ok(())
    }
}

/// Best human-readable message from an error body.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("detail"))
            .or_else(|| v.get("message"))
            .or_else(|| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    from_json
        .or_else(|| Some(body.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

/// ChatGPT-subscription Responses client
pub struct OpenAiOAuthClient<T: Transport = HttpTransport> {
    transport: T,
    tokens: Arc<TokenManager>,
    model: String,
}

impl OpenAiOAuthClient<HttpTransport> {
    pub fn new(tokens: Arc<TokenManager>, model: &str) -> Self {
        Self::with_transport(HttpTransport::new(), tokens, model)
    }
}

impl<T: Transport> OpenAiOAuthClient<T> {
    pub fn with_transport(transport: T, tokens: Arc<TokenManager>, model: &str) -> Self {
        Self {
            transport,
            tokens,
            model: model.to_string(),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// One request with a fresh decoder.
    async fn attempt(
        &self,
        body: &Value,
        on_event: &mut (dyn FnMut(DeltaEvent) + Send),
    ) -> Result<ChatResponse> {
        let credential = self.tokens.snapshot().await;
        let mut decoder = StreamDecoder::new();

        let mut sink = |event: WireEvent| -> Result<()> {
            if let Some(delta) = decoder.apply(&event)? {
                on_event(delta);
            }
            Ok(())
        };
        self.transport.stream(body, &credential, &mut sink).await?;

        if !decoder.is_completed() {
            debug!("Stream ended without a completion event");
        }
        Ok(decoder.finish())
    }

    /// Send, refreshing and retrying exactly once on a rejected credential.
    async fn send_with_refresh(
        &self,
        body: &Value,
        on_event: &mut (dyn FnMut(DeltaEvent) + Send),
    ) -> Result<ChatResponse> {
        if self.tokens.can_refresh().await {
            self.tokens.ensure_valid().await?;
        }

        match self.attempt(body, on_event).await {
            Err(e) if e.is_authentication_failure() => {
                if !self.tokens.can_refresh().await {
                    return Err(e);
                }
                warn!("Provider rejected the access token, refreshing: {}", e);
                self.tokens.refresh().await?;
                info!("Token refreshed, retrying request");
                self.attempt(body, on_event).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl<T: Transport> LlmClient for OpenAiOAuthClient<T> {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
        on_event: &mut (dyn FnMut(DeltaEvent) + Send),
    ) -> Result<ChatResponse> {
        let body = build_body(&self.model, system, messages, tools);
        debug!(
            "Sending {} messages and {} tools to {}",
            messages.len(),
            tools.len(),
            self.model
        );
        self.send_with_refresh(&body, on_event).await
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::agent::message::ContentBlock;
    use crate::auth::test_support::{expired_state, FakeEndpoint};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn fresh_state() -> TokenState {
        TokenState {
            access_token: "live".into(),
            refresh_token: Some("r0".into()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            account_id: Some("acct".into()),
        }
    }

    fn client(
        state: TokenState,
        endpoint: Arc<FakeEndpoint>,
        script: Vec<Scripted>,
    ) -> OpenAiOAuthClient<ScriptedTransport> {
        let tokens = Arc::new(TokenManager::new(state, endpoint));
        OpenAiOAuthClient::with_transport(ScriptedTransport::new(script), tokens, "gpt-test")
    }

    async fn ask(client: &OpenAiOAuthClient<ScriptedTransport>) -> Result<ChatResponse> {
        client
            .chat(&[Message::user("hi")], &[], "", &mut |_| {})
            .await
    }

    #[tokio::test]
    async fn test_streams_deltas_and_final_content() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let client = client(fresh_state(), endpoint.clone(), vec![text_reply("hello")]);

        let mut deltas = Vec::new();
        let response = client
            .chat(&[Message::user("hi")], &[], "", &mut |d| deltas.push(d))
            .await
            .unwrap();

        assert_eq!(deltas, vec![DeltaEvent::TextDelta { text: "hello".into() }]);
        assert_eq!(response.content, vec![ContentBlock::text("hello")]);
        assert_eq!(response.usage.total_tokens, 2);
        assert_eq!(endpoint.calls(), 0);

        let body = &client.transport.bodies.lock().unwrap()[0];
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["store"], false);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_before_request() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let client = client(expired_state(), endpoint.clone(), vec![text_reply("ok")]);

        ask(&client).await.unwrap();

        assert_eq!(endpoint.calls(), 1);
        assert_eq!(client.transport.tokens(), vec!["access-1".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_credential_refreshes_and_retries_once() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let client = client(
            fresh_state(),
            endpoint.clone(),
            vec![rejected(), text_reply("after refresh")],
        );

        let response = ask(&client).await.unwrap();

        assert_eq!(response.content, vec![ContentBlock::text("after refresh")]);
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(
            client.transport.tokens(),
            vec!["live".to_string(), "access-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_second_rejection_propagates() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let client = client(
            fresh_state(),
            endpoint.clone(),
            vec![rejected(), rejected(), text_reply("never")],
        );

        let err = ask(&client).await.unwrap_err();

        assert!(err.is_authentication_failure());
        assert_eq!(client.transport.calls(), 2);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let client = client(
            fresh_state(),
            endpoint.clone(),
            vec![
                Scripted::Fail(Error::Llm("Provider API error (500): boom".into())),
                text_reply("never"),
            ],
        );

        let err = ask(&client).await.unwrap_err();

        assert_eq!(err.to_string(), "LLM error: Provider API error (500): boom");
        assert_eq!(client.transport.calls(), 1);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_refresh_token_means_no_retry() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let state = TokenState {
            refresh_token: None,
            expires_at: None,
            ..fresh_state()
        };
        let client = client(state, endpoint.clone(), vec![rejected(), text_reply("never")]);

        let err = ask(&client).await.unwrap_err();

        assert!(err.is_authentication_failure());
        assert_eq!(client.transport.calls(), 1);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_refresh_error() {
        let mut endpoint = FakeEndpoint::new();
        endpoint.fail_with = Some("Token refresh failed (400): refresh token revoked".into());
        let client = client(fresh_state(), Arc::new(endpoint), vec![rejected()]);

        let err = ask(&client).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Token refresh failed (400): refresh token revoked"
        );
        assert_eq!(client.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_failure_event_is_an_error() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let client = client(
            fresh_state(),
            endpoint,
            vec![Scripted::Events(vec![WireEvent::new(
                "response.failed",
                json!({"response": {"error": {"message": "context too long"}}}),
            )])],
        );

        let err = ask(&client).await.unwrap_err();
        assert_eq!(err.to_string(), "Stream error: context too long");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":{"message":"bad model"}}"#),
            "bad model"
        );
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, r#"{"detail":"Unauthorized"}"#),
            "Unauthorized"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }
}
