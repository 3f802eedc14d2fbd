//! reqwest-based client for the chat API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::error_body::error_message;
use super::ChatBackend;
use crate::cache::MessageSource;
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::stream::{turn_events, TurnStream};
use crate::types::{
    MessagePage, NewSession, PageRequest, RetryRequest, Session, SessionList, TurnRequest,
    TurnResult,
};

const EVENT_STREAM: &str = "text/event-stream";

/// HTTP client for the chat backend
pub struct ChatClient {
    http_client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ChatClient {
    /// Create a new client from configuration
    ///
    /// Only the connect timeout is set on the underlying client; the request
    /// timeout is applied per call to non-streaming endpoints so that a long
    /// answer is never cut off mid-stream.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .default_headers(headers)
            .user_agent(concat!("ragchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    /// Backend root URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the backend is reachable and healthy
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);

        match self
            .http_client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                Ok(false)
            }
        }
    }

    /// List the sessions known to the backend
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let url = format!("{}/api/chat/sessions", self.base_url);
        let response = self.send(self.http_client.get(&url)).await?;
        let list: SessionList = read_json(response).await?;
        Ok(list.sessions)
    }

    /// Create an empty session
    pub async fn create_session(&self, title: Option<&str>) -> Result<Session> {
        let url = format!("{}/api/chat/sessions", self.base_url);
        let body = NewSession {
            title: title.map(str::to_string),
        };
        let response = self.send(self.http_client.post(&url).json(&body)).await?;
        let session: Session = read_json(response).await?;
        tracing::info!(session_id = %session.id, "Created session");
        Ok(session)
    }

    /// Fetch one page of a session's message history
    pub async fn fetch_messages(&self, session_id: &str, page: &PageRequest) -> Result<MessagePage> {
        let mut url = format!(
            "{}?limit={}",
            self.session_url(session_id, "messages"),
            page.limit
        );
        if let Some(cursor) = &page.cursor {
            url.push_str("&cursor=");
            url.push_str(&urlencoding::encode(cursor));
        }

        let response = self.send(self.http_client.get(&url)).await?;
        read_json(response).await
    }

    fn session_url(&self, session_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/chat/sessions/{}/{}",
            self.base_url,
            urlencoding::encode(session_id),
            suffix
        )
    }

    fn retry_url(&self, session_id: &str, message_id: &str, action: &str) -> String {
        self.session_url(
            session_id,
            &format!("messages/{}/{}", urlencoding::encode(message_id), action),
        )
    }

    /// Send a non-streaming request and check its status
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::Network(format!("HTTP request failed: {}", e)))?;
        check_status(response).await
    }

    /// POST a turn request and expose the response body as a [`TurnStream`]
    async fn open_stream<B>(
        &self,
        url: String,
        body: &B,
        cancel: CancellationToken,
    ) -> Result<TurnStream>
    where
        B: Serialize + Sync + ?Sized,
    {
        tracing::debug!(%url, "Opening turn stream");

        let request = self
            .http_client
            .post(&url)
            .header(ACCEPT, EVENT_STREAM)
            .json(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(%url, "Turn canceled before the response arrived");
                return Ok(Box::pin(futures::stream::empty()));
            }
            response = request => response
                .map_err(|e| Error::Network(format!("HTTP request failed: {}", e)))?,
        };

        let response = check_status(response).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !is_event_stream(status, content_type.as_deref()) {
            tracing::info!(
                %url,
                status = status.as_u16(),
                content_type = content_type.as_deref().unwrap_or("-"),
                "Backend answered without an event stream"
            );
            return Err(Error::StreamingUnsupported);
        }

        tracing::debug!(%url, status = status.as_u16(), "Turn stream opened");
        Ok(turn_events(response.bytes_stream(), cancel))
    }
}

#[async_trait]
impl MessageSource for ChatClient {
    async fn fetch_page(&self, session_id: &str, page: &PageRequest) -> Result<MessagePage> {
        self.fetch_messages(session_id, page).await
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn open_turn_stream(
        &self,
        session_id: &str,
        request: &TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnStream> {
        let url = self.session_url(session_id, "turn:stream");
        self.open_stream(url, request, cancel).await
    }

    async fn open_retry_stream(
        &self,
        session_id: &str,
        message_id: &str,
        request: &RetryRequest,
        cancel: CancellationToken,
    ) -> Result<TurnStream> {
        let url = self.retry_url(session_id, message_id, "retry:stream");
        self.open_stream(url, request, cancel).await
    }

    async fn send_turn(&self, session_id: &str, request: &TurnRequest) -> Result<TurnResult> {
        let url = self.session_url(session_id, "turn");
        let response = self.send(self.http_client.post(&url).json(request)).await?;
        read_json(response).await
    }

    async fn retry_turn(
        &self,
        session_id: &str,
        message_id: &str,
        request: &RetryRequest,
    ) -> Result<TurnResult> {
        let url = self.retry_url(session_id, message_id, "retry");
        let response = self.send(self.http_client.post(&url).json(request)).await?;
        read_json(response).await
    }
}

/// Turn a non-2xx response into [`Error::Http`]
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    tracing::warn!(status = status.as_u16(), %message, "Backend returned an error");
    Err(Error::Http {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response
        .text()
        .await
        .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;
    Ok(serde_json::from_str(&text)?)
}

/// Whether a 2xx response carries an event stream.
///
/// A missing content type is given the benefit of the doubt.
fn is_event_stream(status: StatusCode, content_type: Option<&str>) -> bool {
    if status == StatusCode::NO_CONTENT {
        return false;
    }
    match content_type {
        Some(value) => value
            .split(';')
            .next()
            .map(|media| media.trim().eq_ignore_ascii_case(EVENT_STREAM))
            .unwrap_or(false),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_valid_config() {
        assert!(ChatClient::new(&config("")).is_err());
        assert!(ChatClient::new(&config("localhost:8000")).is_err());
    }

    #[test]
    fn test_client_with_valid_config() {
        let client = ChatClient::new(&config("https://rag.example.com/")).unwrap();
        assert_eq!(client.base_url(), "https://rag.example.com");
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let client = ChatClient::new(&config("http://localhost:8000")).unwrap();
        assert_eq!(
            client.session_url("a/b c", "turn:stream"),
            "http://localhost:8000/api/chat/sessions/a%2Fb%20c/turn:stream"
        );
        assert_eq!(
            client.retry_url("s1", "m?1", "retry"),
            "http://localhost:8000/api/chat/sessions/s1/messages/m%3F1/retry"
        );
    }

    #[test]
    fn test_is_event_stream() {
        assert!(is_event_stream(StatusCode::OK, Some("text/event-stream")));
        assert!(is_event_stream(
            StatusCode::OK,
            Some("Text/Event-Stream; charset=utf-8")
        ));
        assert!(is_event_stream(StatusCode::OK, None));
        assert!(!is_event_stream(StatusCode::OK, Some("application/json")));
        assert!(!is_event_stream(
            StatusCode::NO_CONTENT,
            Some("text/event-stream")
        ));
    }
}
