use crate::dto::payment_dto::{PaymentDraft, TopUpDraft};
use crate::error::{ConflictKind, Error, Result};
use crate::models::payment::{
    Payment, PaymentHistoryRow, PaymentMethod, PaymentStatus, PaymentWithParties,
    TransactionFilter,
};
use crate::realtime::{ChangeBus, ChangeKind, Table};
use crate::services::wallet_service::{
    apply_ledger, ledger_entries, lock_wallets, publish_wallet_changes, LedgerStage,
    INSUFFICIENT_BALANCE,
};
pub use crate::utils::money::parse_pay_rate;
use crate::utils::money::{format_amount, is_whole_paisa, parse_amount};
use crate::utils::validation::non_blank;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub const REQUIRED_FIELDS: &str = "Please fill in all required fields.";
pub const INVALID_AMOUNT: &str = "Please enter a valid amount.";
pub const TOP_UP_LIMIT_EXCEEDED: &str = "Top-up amount cannot exceed रु 10,00,000.";
pub const TOP_UP_CEILING: i64 = 1_000_000;

fn reject(message: impl Into<String>) -> Error {
    Error::BadRequest(message.into())
}

fn positive_amount(text: &str) -> Result<Decimal> {
    match parse_amount(text) {
        Some(amount) if amount > Decimal::ZERO && is_whole_paisa(amount) => Ok(amount),
        _ => Err(reject(INVALID_AMOUNT)),
    }
}

fn check_reference(method: PaymentMethod, reference: Option<&str>) -> Result<()> {
    if method.requires_reference() && non_blank(reference).is_none() {
        return Err(reject(format!(
            "Transaction reference is required for {} payments",
            method
        )));
    }
    Ok(())
}

/// Checks a payment draft against the payer's balance, returning the amount.
///
/// Rules run in a fixed order and the first failure wins: required fields,
/// positive amount, exact pay-rate match, balance, then the transaction
/// reference for non-cash methods.
pub fn validate_payment(draft: &PaymentDraft, balance: Decimal) -> Result<Decimal> {
    let method = match (draft.payee_id, draft.payment_method) {
        (Some(_), Some(method)) if !draft.amount.trim().is_empty() => method,
        _ => return Err(reject(REQUIRED_FIELDS)),
    };

    let amount = positive_amount(&draft.amount)?;

    if let Some(expected) = draft.pay_rate.as_deref().and_then(parse_pay_rate) {
        if amount != expected {
            return Err(reject(format!(
                "Payment amount must be exactly रु {} as per the job pay rate.",
                format_amount(expected)
            )));
        }
    }

    if amount > balance {
        return Err(reject(INSUFFICIENT_BALANCE));
    }

    check_reference(method, draft.transaction_reference.as_deref())?;
    Ok(amount)
}

/// Same shape as [`validate_payment`], with the top-up ceiling in place of
/// the pay-rate and balance checks.
pub fn validate_top_up(draft: &TopUpDraft) -> Result<Decimal> {
    let Some(method) = draft.payment_method.filter(|_| !draft.amount.trim().is_empty()) else {
        return Err(reject(REQUIRED_FIELDS));
    };

    let amount = positive_amount(&draft.amount)?;
    if amount > Decimal::from(TOP_UP_CEILING) {
        return Err(reject(TOP_UP_LIMIT_EXCEEDED));
    }

    check_reference(method, draft.transaction_reference.as_deref())?;
    Ok(amount)
}

#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    bus: ChangeBus,
}

impl PaymentService {
    pub fn new(pool: PgPool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    pub async fn find_existing(
        &self,
        payer_id: Uuid,
        job_id: Uuid,
        payee_id: Uuid,
    ) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE job_id = $1 AND payer_id = $2 AND payee_id = $3",
        )
        .bind(job_id)
        .bind(payer_id)
        .bind(payee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    /// Creates a transfer from `payer_id`. Cash stays pending until the payee
    /// confirms; other methods complete immediately.
    pub async fn create(&self, payer_id: Uuid, mut draft: PaymentDraft) -> Result<Payment> {
        if let Some(job_id) = draft.job_id {
            let job: Option<(String, String)> =
                sqlx::query_as("SELECT title, pay_rate FROM jobs WHERE id = $1")
                    .bind(job_id)
                    .fetch_optional(&self.pool)
                    .await?;
            let (title, pay_rate) = job.ok_or_else(|| Error::NotFound("Job not found".into()))?;
            draft.pay_rate = Some(pay_rate);
            draft.job_title.get_or_insert(title);
        }

        if draft.payee_id == Some(payer_id) {
            return Err(reject("Use a wallet top-up to add funds to your own wallet."));
        }
        if let (Some(job_id), Some(payee_id)) = (draft.job_id, draft.payee_id) {
            if self.find_existing(payer_id, job_id, payee_id).await?.is_some() {
                return Err(Error::Conflict(ConflictKind::AlreadyPaid));
            }
        }

        let mut tx = self.pool.begin().await?;
        let wallets = lock_wallets(&mut *tx, &[payer_id]).await?;
        let balance = wallets.first().map(|w| w.balance).unwrap_or_default();
        let amount = validate_payment(&draft, balance)?;
        let (Some(payee_id), Some(method)) = (draft.payee_id, draft.payment_method) else {
            return Err(reject(REQUIRED_FIELDS));
        };

        let payer_name: Option<String> =
            sqlx::query_scalar("SELECT full_name FROM profiles WHERE id = $1")
                .bind(payer_id)
                .fetch_optional(&mut *tx)
                .await?;
        let payee_name: Option<String> = sqlx::query_scalar(
            "SELECT full_name FROM profiles WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(payee_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(payee_name) = payee_name else {
            return Err(Error::NotFound("Payee not found".into()));
        };

        let status = if method == PaymentMethod::Cash {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Completed
        };
        let completed_at = (status == PaymentStatus::Completed).then(Utc::now);
        let details = json!({
            "job_title": draft.job_title,
            "payee_name": draft.payee_name.clone().unwrap_or(payee_name),
            "created_by": payer_name,
        });

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                payer_id, payee_id, job_id, amount, payment_method, payment_status,
                transaction_reference, notes, payment_details, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(payer_id)
        .bind(payee_id)
        .bind(draft.job_id)
        .bind(amount)
        .bind(method)
        .bind(status)
        .bind(non_blank(draft.transaction_reference.as_deref()))
        .bind(non_blank(draft.notes.as_deref()))
        .bind(details)
        .bind(completed_at)
        .fetch_one(&mut *tx)
        .await?;

        let changes = apply_ledger(&mut *tx, &ledger_entries(&payment, LedgerStage::Created)).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            method = %method,
            status = status.as_str(),
            "payment created"
        );
        self.bus.publish(Table::Payments, ChangeKind::Insert, &payment);
        publish_wallet_changes(&self.bus, &changes);
        Ok(payment)
    }

    /// Adds funds to the caller's own wallet as a payer = payee payment.
    pub async fn top_up(&self, profile_id: Uuid, draft: TopUpDraft) -> Result<Payment> {
        let amount = validate_top_up(&draft)?;
        let Some(method) = draft.payment_method else {
            return Err(reject(REQUIRED_FIELDS));
        };
        let notes = non_blank(draft.notes.as_deref())
            .unwrap_or_else(|| format!("Wallet top-up via {}", method));

        let mut tx = self.pool.begin().await?;
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                payer_id, payee_id, amount, payment_method, payment_status,
                transaction_reference, notes, payment_details, completed_at
            ) VALUES ($1, $1, $2, $3, 'completed', $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(profile_id)
        .bind(amount)
        .bind(method)
        .bind(non_blank(draft.transaction_reference.as_deref()))
        .bind(notes)
        .bind(json!({ "type": "top_up", "method": method }))
        .fetch_one(&mut *tx)
        .await?;

        let changes = apply_ledger(&mut *tx, &ledger_entries(&payment, LedgerStage::Created)).await?;
        tx.commit().await?;

        tracing::info!(payment_id = %payment.id, amount = %amount, "wallet topped up");
        self.bus.publish(Table::Payments, ChangeKind::Insert, &payment);
        publish_wallet_changes(&self.bus, &changes);
        Ok(payment)
    }

    /// Payments where `profile_id` is payer or payee, newest first.
    pub async fn history(
        &self,
        profile_id: Uuid,
        filter: TransactionFilter,
    ) -> Result<Vec<PaymentWithParties>> {
        let rows = sqlx::query_as::<_, PaymentHistoryRow>(
            r#"
            SELECT p.*,
                   payer.full_name AS payer_name, payer.profile_photo_url AS payer_photo_url,
                   payee.full_name AS payee_name, payee.profile_photo_url AS payee_photo_url,
                   j.title AS job_title
            FROM payments p
            JOIN profiles payer ON payer.id = p.payer_id
            JOIN profiles payee ON payee.id = p.payee_id
            LEFT JOIN jobs j ON j.id = p.job_id
            WHERE p.payer_id = $1 OR p.payee_id = $1
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|row| filter.matches(&row.payment, profile_id))
            .map(PaymentWithParties::from)
            .collect())
    }

    /// The payee acknowledges a pending cash payment.
    pub async fn confirm_receipt(&self, profile_id: Uuid, payment_id: Uuid) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;
        let current = lock_payment(&mut *tx, payment_id).await?;

        if current.payee_id != profile_id || current.is_top_up() {
            return Err(Error::Forbidden(
                "Only the payee can confirm receipt of this payment".into(),
            ));
        }
        if current.payment_method != PaymentMethod::Cash {
            return Err(reject("Only cash payments need to be confirmed"));
        }
        if current.payment_status != PaymentStatus::Pending {
            return Err(reject("Payment is not pending"));
        }

        let updated = write_status(&mut *tx, payment_id, PaymentStatus::Completed).await?;
        let changes =
            apply_ledger(&mut *tx, &ledger_entries(&updated, LedgerStage::Confirmed)).await?;
        tx.commit().await?;

        tracing::info!(payment_id = %payment_id, "cash payment confirmed");
        self.bus.publish_update(Table::Payments, &current, &updated);
        publish_wallet_changes(&self.bus, &changes);
        Ok(updated)
    }

    /// Administrative status change. Only pending payments move; completing
    /// credits the payee, failing or cancelling returns the held funds.
    pub async fn set_status(&self, payment_id: Uuid, status: PaymentStatus) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;
        let current = lock_payment(&mut *tx, payment_id).await?;
        if current.payment_status == status {
            return Ok(current);
        }

        let stage = match (current.payment_status, status) {
            (PaymentStatus::Pending, PaymentStatus::Completed) => LedgerStage::Confirmed,
            (PaymentStatus::Pending, PaymentStatus::Failed | PaymentStatus::Cancelled) => {
                LedgerStage::Voided
            }
            (from, to) => {
                return Err(reject(format!(
                    "Cannot change a {} payment to {}",
                    from.as_str(),
                    to.as_str()
                )))
            }
        };

        let updated = write_status(&mut *tx, payment_id, status).await?;
        let changes = apply_ledger(&mut *tx, &ledger_entries(&updated, stage)).await?;
        tx.commit().await?;

        tracing::info!(payment_id = %payment_id, status = status.as_str(), "payment status changed");
        self.bus.publish_update(Table::Payments, &current, &updated);
        publish_wallet_changes(&self.bus, &changes);
        Ok(updated)
    }
}

async fn lock_payment(conn: &mut sqlx::PgConnection, payment_id: Uuid) -> Result<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(payment_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| Error::NotFound("Payment not found".into()))
}

async fn write_status(
    conn: &mut sqlx::PgConnection,
    payment_id: Uuid,
    status: PaymentStatus,
) -> Result<Payment> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET payment_status = $2,
            completed_at = CASE WHEN $2 = 'completed'::payment_status THEN NOW() ELSE completed_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .bind(status)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn draft() -> PaymentDraft {
        PaymentDraft {
            payee_id: Some(Uuid::new_v4()),
            job_id: Some(Uuid::new_v4()),
            pay_rate: Some("NPR 500/hour".into()),
            amount: "500".into(),
            payment_method: Some(PaymentMethod::Esewa),
            transaction_reference: Some("TXN123".into()),
            ..Default::default()
        }
    }

    fn message(result: Result<Decimal>) -> String {
        result.unwrap_err().user_message()
    }

    #[test]
    fn valid_draft_returns_amount() {
        assert_eq!(
            validate_payment(&draft(), Decimal::from(1000)).unwrap(),
            Decimal::from(500)
        );
    }

    #[test]
    fn pay_rate_mismatch_is_rejected_with_expected_amount() {
        let d = PaymentDraft {
            amount: "400".into(),
            ..draft()
        };
        assert_eq!(
            message(validate_payment(&d, Decimal::from(1000))),
            "Payment amount must be exactly रु 500 as per the job pay rate."
        );

        let d = PaymentDraft {
            pay_rate: Some("Rs 1,500 per day".into()),
            amount: "150".into(),
            ..draft()
        };
        assert_eq!(
            message(validate_payment(&d, Decimal::from(5000))),
            "Payment amount must be exactly रु 1,500 as per the job pay rate."
        );
    }

    #[test]
    fn unparseable_pay_rate_skips_the_match() {
        let d = PaymentDraft {
            pay_rate: Some("Negotiable".into()),
            amount: "350".into(),
            ..draft()
        };
        assert!(validate_payment(&d, Decimal::from(1000)).is_ok());
    }

    #[test]
    fn rules_apply_in_order() {
        // Missing method beats a bad amount.
        let d = PaymentDraft {
            payment_method: None,
            amount: "-5".into(),
            ..draft()
        };
        assert_eq!(message(validate_payment(&d, Decimal::ZERO)), REQUIRED_FIELDS);

        // Bad amount beats pay-rate mismatch.
        let d = PaymentDraft {
            amount: "abc".into(),
            ..draft()
        };
        assert_eq!(message(validate_payment(&d, Decimal::ZERO)), INVALID_AMOUNT);

        // Pay-rate beats balance.
        let d = PaymentDraft {
            amount: "200".into(),
            ..draft()
        };
        assert!(message(validate_payment(&d, Decimal::ZERO)).starts_with("Payment amount must be exactly"));

        // Balance beats reference.
        let d = PaymentDraft {
            transaction_reference: Some("  ".into()),
            ..draft()
        };
        assert_eq!(message(validate_payment(&d, Decimal::from(100))), INSUFFICIENT_BALANCE);

        let d = PaymentDraft {
            transaction_reference: None,
            ..draft()
        };
        assert_eq!(
            message(validate_payment(&d, Decimal::from(1000))),
            "Transaction reference is required for esewa payments"
        );
    }

    #[test]
    fn cash_needs_no_reference() {
        let d = PaymentDraft {
            payment_method: Some(PaymentMethod::Cash),
            transaction_reference: None,
            ..draft()
        };
        assert!(validate_payment(&d, Decimal::from(500)).is_ok());
    }

    #[test]
    fn zero_amount_is_invalid() {
        let d = PaymentDraft {
            amount: "0".into(),
            pay_rate: None,
            ..draft()
        };
        assert_eq!(message(validate_payment(&d, Decimal::from(10))), INVALID_AMOUNT);
    }

    #[test]
    fn amounts_finer_than_paisa_are_invalid() {
        let d = PaymentDraft {
            amount: "0.004".into(),
            pay_rate: None,
            ..draft()
        };
        assert_eq!(message(validate_payment(&d, Decimal::from(10))), INVALID_AMOUNT);

        let top_up = TopUpDraft {
            amount: "0.004".into(),
            payment_method: Some(PaymentMethod::Cash),
            transaction_reference: None,
            notes: None,
        };
        assert_eq!(validate_top_up(&top_up).unwrap_err().user_message(), INVALID_AMOUNT);

        let exact = TopUpDraft {
            amount: "250.50".into(),
            ..top_up
        };
        assert_eq!(
            validate_top_up(&exact).unwrap(),
            Decimal::from_str("250.5").unwrap()
        );
    }

    #[test]
    fn top_up_ceiling_and_reference() {
        let ok = TopUpDraft {
            amount: "1000000".into(),
            payment_method: Some(PaymentMethod::Khalti),
            transaction_reference: Some("K-1".into()),
            notes: None,
        };
        assert_eq!(validate_top_up(&ok).unwrap(), Decimal::from(TOP_UP_CEILING));

        let over = TopUpDraft {
            amount: "1000000.01".into(),
            ..ok.clone()
        };
        assert_eq!(
            validate_top_up(&over).unwrap_err().user_message(),
            TOP_UP_LIMIT_EXCEEDED
        );

        let missing_ref = TopUpDraft {
            amount: "100".into(),
            transaction_reference: None,
            ..ok.clone()
        };
        assert_eq!(
            validate_top_up(&missing_ref).unwrap_err().user_message(),
            "Transaction reference is required for khalti payments"
        );

        let empty = TopUpDraft::default();
        assert_eq!(validate_top_up(&empty).unwrap_err().user_message(), REQUIRED_FIELDS);
    }
}
