use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::client::Backend;
use crate::dto::payment_dto::{PaymentDraft, TopUpDraft};
use crate::dto::review_dto::CreateReviewPayload;
use crate::error::{ConflictKind, Error, Result};
use crate::models::payment::Payment;
use crate::models::review::Review;
use crate::services::payment_service::{validate_payment, validate_top_up};
use crate::services::review_service::validate_rating;

pub const CREATE_FAILED: &str = "Failed to create payment. Please try again.";
pub const TOP_UP_FAILED: &str = "Failed to process top-up. Please try again.";

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Created(Payment),
    /// A payment for this job and payee already exists, when it could be loaded.
    AlreadyPaid(Option<Payment>),
    /// Local validation failed; nothing was sent.
    Rejected(String),
    Failed(String),
}

#[derive(Clone)]
pub struct PaymentFlow {
    backend: Arc<dyn Backend>,
}

impl PaymentFlow {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    async fn existing(&self, draft: &PaymentDraft) -> Option<Payment> {
        let (job_id, payee_id) = (draft.job_id?, draft.payee_id?);
        match self.backend.find_existing_payment(job_id, payee_id).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(error = %e, "existing payment lookup failed");
                None
            }
        }
    }

    /// Validates against `balance` (the last known wallet balance), checks
    /// for a previous payment on the same job, then creates the payment.
    pub async fn submit(&self, draft: &PaymentDraft, balance: Decimal) -> PaymentOutcome {
        if let Err(e) = validate_payment(draft, balance) {
            return PaymentOutcome::Rejected(e.user_message());
        }
        if draft.job_id.is_some() {
            if let Some(existing) = self.existing(draft).await {
                return PaymentOutcome::AlreadyPaid(Some(existing));
            }
        }

        match self.backend.create_payment(draft).await {
            Ok(payment) => {
                tracing::info!(payment_id = %payment.id, "payment created");
                PaymentOutcome::Created(payment)
            }
            Err(Error::Conflict(ConflictKind::AlreadyPaid)) => {
                PaymentOutcome::AlreadyPaid(self.existing(draft).await)
            }
            Err(e) => {
                tracing::error!(error = %e, "payment creation failed");
                PaymentOutcome::Failed(CREATE_FAILED.to_string())
            }
        }
    }

    pub async fn top_up(&self, draft: &TopUpDraft) -> PaymentOutcome {
        if let Err(e) = validate_top_up(draft) {
            return PaymentOutcome::Rejected(e.user_message());
        }
        match self.backend.top_up(draft).await {
            Ok(payment) => PaymentOutcome::Created(payment),
            Err(e) => {
                tracing::error!(error = %e, "top-up failed");
                PaymentOutcome::Failed(TOP_UP_FAILED.to_string())
            }
        }
    }

    pub async fn confirm_receipt(&self, payment_id: Uuid) -> Result<Payment> {
        self.backend.confirm_receipt(payment_id).await
    }

    /// Rating range is checked before anything is sent.
    pub async fn submit_review(&self, payload: &CreateReviewPayload) -> Result<Review> {
        validate_rating(payload.rating)?;
        self.backend.submit_review(payload).await
    }
}
