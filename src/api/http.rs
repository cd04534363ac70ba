use super::wire::{self, IdsBody, SessionView};
use super::{SessionSource, Transport, TransportError};
use crate::config::Config;
use crate::feed::{NotificationId, NotificationPage, UserId};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use std::sync::RwLock;
use std::time::Duration;
use url::Url;

/// reqwest-backed [`Transport`] and [`SessionSource`].
///
/// Endpoints, relative to the configured base URL:
///
/// | call                 | request                                          |
/// |----------------------|--------------------------------------------------|
/// | list                 | `GET  users/{id}/notifications?page=&pageSize=`  |
/// | unread count         | `GET  users/{id}/notifications/unread-count`     |
/// | mark read            | `POST users/{id}/notifications/read`             |
/// | mark unread          | `POST users/{id}/notifications/unread`           |
/// | delete               | `POST users/{id}/notifications/delete`           |
/// | current session      | `GET  session`                                   |
/// | resend validation    | `POST session/resend-validation`                 |
/// | sign out             | `DELETE session`                                 |
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
    token: RwLock<Option<SecretString>>,
    timeout: Duration,
    max_response_bytes: usize,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base", &self.base.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(config: &Config, token: Option<SecretString>) -> Result<Self, TransportError> {
        let base = validate_base_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base,
            token: RwLock::new(token),
            timeout: config.request_timeout(),
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn notifications_url(&self, user: &UserId, tail: &[&str]) -> Result<Url, TransportError> {
        let mut segments = vec!["users", user.as_str(), "notifications"];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self
            .token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match token.as_ref() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret())),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, TransportError> {
        let response = tokio::time::timeout(self.timeout, self.authorize(request).send())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), url = %response.url(), "Request failed");
            return Err(TransportError::from_status(status.as_u16()));
        }

        read_limited_text(response, self.max_response_bytes).await
    }

    async fn post_ids(&self, url: Url, ids: &[NotificationId]) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&IdsBody { ids })
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        let text = self
            .send(
                self.client
                    .post(url)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body),
            )
            .await?;
        wire::parse_status(&text)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list_notifications(
        &self,
        user: &UserId,
        page: u32,
        page_size: u32,
    ) -> Result<NotificationPage, TransportError> {
        let mut url = self.notifications_url(user, &[])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string());
        let text = self.send(self.client.get(url)).await?;
        Ok(wire::parse_list(&text))
    }

    async fn unread_count(&self, user: &UserId) -> Result<u64, TransportError> {
        let url = self.notifications_url(user, &["unread-count"])?;
        let text = self.send(self.client.get(url)).await?;
        wire::parse_count(&text)
    }

    async fn mark_read(
        &self,
        user: &UserId,
        ids: &[NotificationId],
    ) -> Result<(), TransportError> {
        let url = self.notifications_url(user, &["read"])?;
        self.post_ids(url, ids).await
    }

    async fn mark_unread(
        &self,
        user: &UserId,
        ids: &[NotificationId],
    ) -> Result<(), TransportError> {
        let url = self.notifications_url(user, &["unread"])?;
        self.post_ids(url, ids).await
    }

    async fn delete_notifications(
        &self,
        user: &UserId,
        ids: &[NotificationId],
    ) -> Result<(), TransportError> {
        let url = self.notifications_url(user, &["delete"])?;
        self.post_ids(url, ids).await
    }
}

#[async_trait]
impl SessionSource for HttpTransport {
    async fn current_session(&self) -> Result<SessionView, TransportError> {
        if !self.has_token() {
            return Ok(SessionView::Unauthenticated);
        }
        let url = self.endpoint(&["session"])?;
        match self.send(self.client.get(url)).await {
            Ok(text) => wire::parse_session(&text),
            Err(e) if e.is_auth_failure() => Ok(SessionView::Unauthenticated),
            Err(e) => Err(e),
        }
    }

    async fn sign_out(&self) -> Result<(), TransportError> {
        let url = self.endpoint(&["session"])?;
        let result = if self.has_token() {
            self.send(self.client.delete(url)).await.map(|_| ())
        } else {
            Ok(())
        };
        // The local token goes regardless of what the server said.
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        result
    }

    async fn resend_validation(&self) -> Result<(), TransportError> {
        let url = self.endpoint(&["session", "resend-validation"])?;
        let text = self.send(self.client.post(url)).await?;
        wire::parse_status(&text)
    }
}

/// Parse the configured base URL. HTTPS is required except for localhost.
fn validate_base_url(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw).map_err(|e| TransportError::InvalidBaseUrl(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(TransportError::InvalidBaseUrl(raw.to_string()));
    }
    match url.scheme() {
        "https" => Ok(url),
        "http" => {
            let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
            if is_localhost {
                tracing::warn!(base_url = %url, "Using non-HTTPS base URL (localhost only)");
                Ok(url)
            } else {
                tracing::error!(base_url = %url, "Rejecting non-HTTPS base URL");
                Err(TransportError::InsecureBaseUrl)
            }
        }
        other => Err(TransportError::InvalidBaseUrl(format!(
            "unsupported scheme: {other}"
        ))),
    }
}

/// Collect the body, refusing it once it passes `limit`. Callers parse the
/// text with serde_json, so an oversized list never gets buffered whole.
async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, TransportError> {
    // Declared length first; chunked bodies are counted as they arrive.
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(TransportError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(TransportError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| TransportError::InvalidUtf8)
}
