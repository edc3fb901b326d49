use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::payment::{PaymentMethod, PaymentWithParties, TransactionFilter};

/// A payment as typed into the payment form. Amounts travel as decimal text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub payee_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub job_title: Option<String>,
    pub payee_name: Option<String>,
    /// Free-text job pay rate, e.g. "NPR 500/hour".
    pub pay_rate: Option<String>,
    #[serde(default, deserialize_with = "amount_text")]
    pub amount: String,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopUpDraft {
    #[serde(default, deserialize_with = "amount_text")]
    pub amount: String,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExistingPaymentQuery {
    pub job_id: Uuid,
    pub payee_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaymentHistoryQuery {
    pub filter: Option<TransactionFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentHistoryResponse {
    pub items: Vec<PaymentWithParties>,
}

fn amount_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!("invalid amount: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amount_accepts_numbers_and_text() {
        let draft: PaymentDraft = serde_json::from_value(json!({
            "payee_id": Uuid::nil(),
            "amount": 500,
            "payment_method": "bank"
        }))
        .unwrap();
        assert_eq!(draft.amount, "500");
        assert_eq!(draft.payment_method, Some(PaymentMethod::Bank));

        let draft: TopUpDraft = serde_json::from_value(json!({"amount": "200.50"})).unwrap();
        assert_eq!(draft.amount, "200.50");

        let draft: TopUpDraft = serde_json::from_value(json!({})).unwrap();
        assert!(draft.amount.is_empty());
    }
}
