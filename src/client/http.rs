use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use crate::client::{read, write, Backend};
use crate::dto::auth_dto::{SessionResponse, SignInPayload};
use crate::dto::message_dto::{MarkReadResponse, SendMessagePayload, UnreadCountResponse};
use crate::dto::payment_dto::{PaymentDraft, PaymentHistoryResponse, TopUpDraft};
use crate::dto::review_dto::CreateReviewPayload;
use crate::error::{ConflictKind, Error, Result};
use crate::models::conversation::{Conversation, ConversationSummary};
use crate::models::message::Message;
use crate::models::payment::{Payment, PaymentWithParties};
use crate::models::profile::Profile;
use crate::models::review::{RatingSummary, Review};
use crate::models::wallet::Wallet;
use crate::realtime::{ChangeBus, ChangeEvent, Table};
use crate::routes::realtime::LAGGED_EVENT;

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
}

/// Turns an error response back into the server's [`Error`].
fn error_from_status(status: StatusCode, body: ErrorBody) -> Error {
    let message = if body.error.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body.error
    };
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::BadRequest(message),
        StatusCode::UNAUTHORIZED => Error::Unauthorized(message),
        StatusCode::FORBIDDEN => Error::Forbidden(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => match ConflictKind::from_code(&body.code) {
            Some(kind) => Error::Conflict(kind),
            None => Error::BadRequest(message),
        },
        _ => Error::Internal(message),
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder; feed it chunks as they arrive.
///
/// Bytes are buffered until a blank line closes the block, so a UTF-8
/// sequence split across chunks is decoded whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        // CR never occurs inside a multi-byte sequence.
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&raw);
            let mut event = None;
            let mut data: Vec<&str> = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value));
                }
            }
            // Comment-only blocks are keep-alives.
            if !data.is_empty() {
                frames.push(SseFrame {
                    event,
                    data: data.join("\n"),
                });
            }
        }
        frames
    }
}

/// Puts one server frame on the local bus.
fn republish(bus: &ChangeBus, tables: &[Table], frame: SseFrame) {
    if frame.event.as_deref() == Some(LAGGED_EVENT) {
        tracing::warn!(skipped = %frame.data, "server dropped realtime events, resyncing");
        for table in tables {
            bus.emit(ChangeEvent::resync(*table));
        }
        return;
    }
    match serde_json::from_str::<ChangeEvent>(&frame.data) {
        Ok(event) => bus.emit(event),
        Err(e) => tracing::warn!(error = %e, "unreadable realtime frame"),
    }
}

/// [`Backend`] over the HTTP API.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: Url,
    client: Client,
    token: Arc<RwLock<Option<String>>>,
    bus: ChangeBus,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL: {}", e)))?;
        Ok(Self {
            base_url,
            client: Client::new(),
            token: Arc::new(RwLock::new(None)),
            bus: ChangeBus::new(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Internal(format!("Invalid request path {}: {}", path, e)))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let mut builder = self.client.request(method, self.url(path)?);
        if let Some(token) = read(&self.token).as_deref() {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        tracing::debug!(status = %status, code = %body.code, "api error");
        Err(error_from_status(status, body))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path)?.send().await?;
        Self::decode(response).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::POST, path)?.json(body).send().await?;
        Self::decode(response).await
    }

    /// Signs in and keeps the returned token for later calls.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionResponse> {
        let payload = SignInPayload {
            email: email.to_string(),
            password: password.to_string(),
        };
        let session: SessionResponse = self.post("/api/auth/sign-in", &payload).await?;
        self.set_token(Some(session.access_token.clone()));
        Ok(session)
    }

    /// Opens the server change stream and republishes its events locally.
    /// A `lagged` frame becomes a [`ChangeEvent::resync`] per subscribed
    /// table. The task ends when the server closes the stream.
    pub async fn connect_realtime(&self, tables: &[Table]) -> Result<JoinHandle<()>> {
        let resync_tables: Vec<Table> = if tables.is_empty() {
            Table::ALL.to_vec()
        } else {
            tables.to_vec()
        };
        let names: Vec<&str> = tables.iter().map(|t| t.as_str()).collect();
        let response = self
            .request(Method::GET, "/api/realtime")?
            .query(&[("tables", names.join(","))])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            return Err(error_from_status(status, body));
        }

        let bus = self.bus.clone();
        let handle = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(error = %e, "realtime stream interrupted");
                        break;
                    }
                };
                for frame in decoder.push(&chunk) {
                    republish(&bus, &resync_tables, frame);
                }
            }
            tracing::info!("realtime stream closed");
        });
        Ok(handle)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn set_token(&self, token: Option<String>) {
        *write(&self.token) = token;
    }

    async fn current_profile(&self) -> Result<Profile> {
        self.get("/api/profiles/me").await
    }

    async fn get_or_create_wallet(&self, _profile_id: Uuid) -> Result<Wallet> {
        // The server resolves the wallet from the bearer token.
        self.get("/api/wallet").await
    }

    async fn find_existing_payment(&self, job_id: Uuid, payee_id: Uuid) -> Result<Option<Payment>> {
        let response = self
            .request(Method::GET, "/api/payments/existing")?
            .query(&[("job_id", job_id), ("payee_id", payee_id)])
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn create_payment(&self, draft: &PaymentDraft) -> Result<Payment> {
        self.post("/api/payments", draft).await
    }

    async fn top_up(&self, draft: &TopUpDraft) -> Result<Payment> {
        self.post("/api/wallet/top-up", draft).await
    }

    async fn payment_history(&self) -> Result<Vec<PaymentWithParties>> {
        let response: PaymentHistoryResponse = self.get("/api/payments").await?;
        Ok(response.items)
    }

    async fn confirm_receipt(&self, payment_id: Uuid) -> Result<Payment> {
        self.post(&format!("/api/payments/{}/confirm", payment_id), &json!({}))
            .await
    }

    async fn rating_summary(&self, profile_id: Uuid) -> Result<RatingSummary> {
        self.get(&format!("/api/profiles/{}/rating", profile_id)).await
    }

    async fn submit_review(&self, payload: &CreateReviewPayload) -> Result<Review> {
        self.post("/api/reviews", payload).await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.get("/api/conversations").await
    }

    async fn start_conversation(&self, participant_id: Uuid) -> Result<Conversation> {
        self.post(
            "/api/conversations",
            &json!({ "participant_id": participant_id }),
        )
        .await
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.get(&format!("/api/conversations/{}/messages", conversation_id))
            .await
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        payload: &SendMessagePayload,
    ) -> Result<Message> {
        self.post(
            &format!("/api/conversations/{}/messages", conversation_id),
            payload,
        )
        .await
    }

    async fn mark_read(&self, conversation_id: Uuid) -> Result<u64> {
        let response: MarkReadResponse = self
            .post(
                &format!("/api/conversations/{}/read", conversation_id),
                &json!({}),
            )
            .await?;
        Ok(response.marked)
    }

    async fn unread_count(&self) -> Result<i64> {
        let response: UnreadCountResponse = self.get("/api/messages/unread-count").await?;
        Ok(response.unread_count)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }
}
