use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::message_dto::SendMessagePayload;
use crate::dto::payment_dto::{PaymentDraft, TopUpDraft};
use crate::dto::review_dto::CreateReviewPayload;
use crate::error::Result;
use crate::models::conversation::{Conversation, ConversationSummary};
use crate::models::message::Message;
use crate::models::payment::{Payment, PaymentWithParties};
use crate::models::profile::Profile;
use crate::models::review::{RatingSummary, Review};
use crate::models::wallet::Wallet;
use crate::realtime::ChangeEvent;

/// Everything the client views need from the server, as the signed-in user.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Bearer token sent with every later call; `None` signs out.
    fn set_token(&self, token: Option<String>);

    async fn current_profile(&self) -> Result<Profile>;

    async fn get_or_create_wallet(&self, profile_id: Uuid) -> Result<Wallet>;

    async fn find_existing_payment(&self, job_id: Uuid, payee_id: Uuid) -> Result<Option<Payment>>;

    async fn create_payment(&self, draft: &PaymentDraft) -> Result<Payment>;

    async fn top_up(&self, draft: &TopUpDraft) -> Result<Payment>;

    async fn payment_history(&self) -> Result<Vec<PaymentWithParties>>;

    async fn confirm_receipt(&self, payment_id: Uuid) -> Result<Payment>;

    async fn rating_summary(&self, profile_id: Uuid) -> Result<RatingSummary>;

    async fn submit_review(&self, payload: &CreateReviewPayload) -> Result<Review>;

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    async fn start_conversation(&self, participant_id: Uuid) -> Result<Conversation>;

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    async fn send_message(
        &self,
        conversation_id: Uuid,
        payload: &SendMessagePayload,
    ) -> Result<Message>;

    async fn mark_read(&self, conversation_id: Uuid) -> Result<u64>;

    async fn unread_count(&self) -> Result<i64>;

    /// A fresh receiver on the change feed.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
