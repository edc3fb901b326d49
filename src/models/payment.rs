use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Esewa,
    Khalti,
    Bank,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Esewa => "esewa",
            PaymentMethod::Khalti => "khalti",
            PaymentMethod::Bank => "bank",
            PaymentMethod::Cash => "cash",
        }
    }

    /// Wallet and bank transfers carry a provider reference; cash does not.
    pub fn requires_reference(self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "esewa" => Ok(PaymentMethod::Esewa),
            "khalti" => Ok(PaymentMethod::Khalti),
            "bank" => Ok(PaymentMethod::Bank),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub job_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub transaction_reference: Option<String>,
    pub notes: Option<String>,
    pub payment_details: Option<JsonValue>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_top_up(&self) -> bool {
        self.payer_id == self.payee_id
    }

    pub fn involves(&self, profile_id: Uuid) -> bool {
        self.payer_id == profile_id || self.payee_id == profile_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyProfile {
    pub id: Uuid,
    pub full_name: String,
    pub profile_photo_url: Option<String>,
}

/// Flat row produced by the history query before nesting.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentHistoryRow {
    #[sqlx(flatten)]
    pub payment: Payment,
    pub payer_name: String,
    pub payer_photo_url: Option<String>,
    pub payee_name: String,
    pub payee_photo_url: Option<String>,
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentWithParties {
    #[serde(flatten)]
    pub payment: Payment,
    pub payer_profile: PartyProfile,
    pub payee_profile: PartyProfile,
    pub job_title: Option<String>,
}

impl From<PaymentHistoryRow> for PaymentWithParties {
    fn from(row: PaymentHistoryRow) -> Self {
        let payer_profile = PartyProfile {
            id: row.payment.payer_id,
            full_name: row.payer_name,
            profile_photo_url: row.payer_photo_url,
        };
        let payee_profile = PartyProfile {
            id: row.payment.payee_id,
            full_name: row.payee_name,
            profile_photo_url: row.payee_photo_url,
        };
        Self {
            payment: row.payment,
            payer_profile,
            payee_profile,
            job_title: row.job_title,
        }
    }
}

/// How a payment looks from one participant's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    TopUp,
    Received,
    Sent,
}

impl TransactionDirection {
    pub fn of(payment: &Payment, me: Uuid) -> Self {
        if payment.is_top_up() {
            TransactionDirection::TopUp
        } else if payment.payee_id == me {
            TransactionDirection::Received
        } else {
            TransactionDirection::Sent
        }
    }

    pub fn is_credit(self) -> bool {
        !matches!(self, TransactionDirection::Sent)
    }

    pub fn label(self) -> &'static str {
        match self {
            TransactionDirection::TopUp => "Wallet Top-up",
            TransactionDirection::Received => "Received",
            TransactionDirection::Sent => "Sent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionFilter {
    #[default]
    All,
    Sent,
    Received,
    Pending,
    Completed,
}

impl TransactionFilter {
    pub fn matches(self, payment: &Payment, me: Uuid) -> bool {
        match self {
            TransactionFilter::All => true,
            TransactionFilter::Sent => payment.payer_id == me,
            TransactionFilter::Received => payment.payee_id == me,
            TransactionFilter::Pending => payment.payment_status == PaymentStatus::Pending,
            TransactionFilter::Completed => payment.payment_status == PaymentStatus::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(payer: Uuid, payee: Uuid, status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            payer_id: payer,
            payee_id: payee,
            job_id: None,
            amount: Decimal::from(500),
            payment_method: PaymentMethod::Bank,
            payment_status: status,
            transaction_reference: Some("TXN123".into()),
            notes: None,
            payment_details: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn direction_labels_follow_payer_and_payee() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        let top_up = payment(me, me, PaymentStatus::Completed);
        assert_eq!(TransactionDirection::of(&top_up, me), TransactionDirection::TopUp);
        assert!(TransactionDirection::TopUp.is_credit());

        let received = payment(other, me, PaymentStatus::Completed);
        assert_eq!(TransactionDirection::of(&received, me), TransactionDirection::Received);
        assert!(TransactionDirection::Received.is_credit());

        let sent = payment(me, other, PaymentStatus::Completed);
        assert_eq!(TransactionDirection::of(&sent, me), TransactionDirection::Sent);
        assert!(!TransactionDirection::Sent.is_credit());
        assert_eq!(TransactionDirection::Sent.label(), "Sent");
    }

    #[test]
    fn filters_select_by_side_and_status() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let rows = vec![
            payment(me, other, PaymentStatus::Completed),
            payment(other, me, PaymentStatus::Pending),
            payment(me, me, PaymentStatus::Completed),
        ];

        let count = |f: TransactionFilter| rows.iter().filter(|p| f.matches(p, me)).count();
        assert_eq!(count(TransactionFilter::All), 3);
        assert_eq!(count(TransactionFilter::Sent), 2);
        assert_eq!(count(TransactionFilter::Received), 2);
        assert_eq!(count(TransactionFilter::Pending), 1);
        assert_eq!(count(TransactionFilter::Completed), 2);
    }

    #[test]
    fn only_cash_skips_the_reference() {
        assert!(PaymentMethod::Esewa.requires_reference());
        assert!(PaymentMethod::Khalti.requires_reference());
        assert!(PaymentMethod::Bank.requires_reference());
        assert!(!PaymentMethod::Cash.requires_reference());
    }
}
