use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chat_core::{ClientConfig, Document, ProfileUpdate, Session, SessionDetail, SessionId, UserProfile};
use http::header::ACCEPT;
use reqwest::cookie::Jar;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Proxy, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::middleware::BearerAuthMiddleware;
use super::upload::validate_upload;
use crate::auth::TokenManager;
use crate::error::{ApiError, ApiResult};

/// Body of `POST /chat/stream`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatStreamRequest {
    pub query: String,
    #[serde(rename = "isSearchMode")]
    pub is_search_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Typed client for the chat service. Every call goes through
/// [`BearerAuthMiddleware`].
#[derive(Clone)]
pub struct ApiClient {
    http: ClientWithMiddleware,
    /// Same pipeline without the request timeout, for the chat stream.
    stream_http: ClientWithMiddleware,
    tokens: Arc<TokenManager>,
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig, tokens: Arc<TokenManager>) -> ApiResult<Self> {
        // The service identifies anonymous users by cookie; both clients
        // share one jar so the stream sees cookies set by either.
        let cookies = Arc::new(Jar::default());
        let http = Self::build_http_client(&config, &cookies, Some(config.request_timeout()))?;
        let stream_http = Self::build_http_client(&config, &cookies, None)?;

        Ok(Self {
            http: Self::with_auth(http, &tokens, &config),
            stream_http: Self::with_auth(stream_http, &tokens, &config),
            tokens,
            config: Arc::new(config),
        })
    }

    fn build_http_client(
        config: &ClientConfig,
        cookies: &Arc<Jar>,
        timeout: Option<Duration>,
    ) -> ApiResult<Client> {
        // Proxies come from the config only; `ClientConfig::load` already
        // folds in the proxy environment variables.
        let mut builder = Client::builder()
            .no_proxy()
            .cookie_provider(Arc::clone(cookies));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if !config.http_proxy.is_empty() {
            builder = builder.proxy(Proxy::http(&config.http_proxy)?);
        }
        if !config.https_proxy.is_empty() {
            builder = builder.proxy(Proxy::https(&config.https_proxy)?);
        }
        Ok(builder.build()?)
    }

    fn with_auth(
        client: Client,
        tokens: &Arc<TokenManager>,
        config: &ClientConfig,
    ) -> ClientWithMiddleware {
        ClientBuilder::new(client)
            .with(BearerAuthMiddleware::new(
                Arc::clone(tokens),
                config.bootstrap_path.clone(),
            ))
            .build()
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.config.endpoint(path);
        log::debug!("Sending {method} request to {url}");
        self.http.request(method, url)
    }

    async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder.send().await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        decode(self.send(builder).await?).await
    }

    // Sessions

    pub async fn list_sessions(&self) -> ApiResult<Vec<Session>> {
        self.send_json(self.request(Method::GET, "/chat/sessions"))
            .await
    }

    pub async fn get_session(&self, id: SessionId) -> ApiResult<SessionDetail> {
        self.send_json(self.request(Method::GET, &format!("/chat/sessions/{id}")))
            .await
    }

    /// Create an empty session; the service names it "New Chat" when no
    /// name is given.
    pub async fn create_session(&self, name: Option<&str>) -> ApiResult<Session> {
        let body = match name {
            Some(name) => json!({ "name": name }),
            None => json!({}),
        };
        self.send_json(self.request(Method::POST, "/chat/sessions").json(&body))
            .await
    }

    pub async fn rename_session(&self, id: SessionId, name: &str) -> ApiResult<Session> {
        self.send_json(
            self.request(Method::PUT, &format!("/chat/sessions/{id}"))
                .json(&json!({ "name": name })),
        )
        .await
    }

    pub async fn delete_session(&self, id: SessionId) -> ApiResult<()> {
        self.send(self.request(Method::DELETE, &format!("/chat/sessions/{id}")))
            .await?;
        Ok(())
    }

    // Documents

    pub async fn list_documents(&self) -> ApiResult<Vec<Document>> {
        self.send_json(self.request(Method::GET, "/pdf/list")).await
    }

    /// Upload a PDF. Invalid names and sizes are rejected before any request
    /// is made.
    pub async fn upload_document(&self, file_name: &str, content: Vec<u8>) -> ApiResult<Document> {
        validate_upload(file_name, content.len() as u64)?;

        let part = Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part);
        log::info!("Uploading document {file_name}");
        self.send_json(self.request(Method::POST, "/pdf/upload").multipart(form))
            .await
    }

    pub async fn upload_document_file(&self, path: &Path) -> ApiResult<Document> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| ApiError::Validation(format!("Cannot read {}: {e}", path.display())))?
            .len();
        validate_upload(&file_name, size)?;

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Validation(format!("Cannot read {}: {e}", path.display())))?;
        self.upload_document(&file_name, content).await
    }

    pub async fn attach_document(&self, session_id: SessionId, document_id: i64) -> ApiResult<()> {
        self.send(self.request(
            Method::POST,
            &format!("/pdf/sessions/{session_id}/add_pdf/{document_id}"),
        ))
        .await?;
        Ok(())
    }

    pub async fn detach_document(&self, session_id: SessionId, document_id: i64) -> ApiResult<()> {
        self.send(self.request(
            Method::DELETE,
            &format!("/pdf/sessions/{session_id}/remove_pdf/{document_id}"),
        ))
        .await?;
        Ok(())
    }

    pub async fn session_documents(&self, session_id: SessionId) -> ApiResult<Vec<Document>> {
        self.send_json(self.request(Method::GET, &format!("/pdf/sessions/{session_id}/pdfs")))
            .await
    }

    // Profile

    pub async fn current_user(&self) -> ApiResult<UserProfile> {
        self.send_json(self.request(Method::GET, &self.config.bootstrap_path))
            .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<UserProfile> {
        self.send_json(self.request(Method::PUT, "/auth/profile").json(update))
            .await
    }

    // Chat

    /// Open the chat stream. The returned response body is a
    /// `text/event-stream`; it is not subject to the request timeout.
    pub async fn open_chat_stream(&self, request: &ChatStreamRequest) -> ApiResult<Response> {
        let url = self.config.endpoint("/chat/stream");
        log::info!(
            "Opening chat stream (session {:?}, search mode {})",
            request.session_id,
            request.is_search_mode
        );
        let response = self
            .stream_http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        check_status(response).await
    }
}

/// Map non-2xx responses to [`ApiError`].
async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    log::warn!("{url} returned {status}: {detail}");

    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(detail),
        StatusCode::NOT_FOUND => ApiError::NotFound(detail),
        _ => ApiError::Status {
            status: status.as_u16(),
            body: detail,
        },
    })
}

/// The service reports errors as `{"detail": "..."}`; anything else is kept
/// verbatim.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}
