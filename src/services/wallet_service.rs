//! Wallet reads and the ledger that moves money between wallets.
//!
//! Every balance change happens in the same transaction as the payment row
//! that causes it, with the affected wallets locked `FOR UPDATE` in id order.

use crate::error::{Error, Result};
use crate::models::payment::{Payment, PaymentStatus};
use crate::models::wallet::Wallet;
use crate::realtime::{ChangeBus, ChangeKind, Table};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

pub const INSUFFICIENT_BALANCE: &str = "Insufficient balance";

/// When in a payment's life the ledger is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStage {
    Created,
    Confirmed,
    /// A pending payment moved to failed or cancelled.
    Voided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEntry {
    /// `balance += amount`, `total_earned += amount`
    Credit { profile_id: Uuid, amount: Decimal },
    /// `balance -= amount`, `total_spent += amount`; never below zero
    Debit { profile_id: Uuid, amount: Decimal },
    /// Returns a held debit: `balance += amount`, `total_spent -= amount`
    Refund { profile_id: Uuid, amount: Decimal },
}

impl LedgerEntry {
    pub fn profile_id(&self) -> Uuid {
        match self {
            LedgerEntry::Credit { profile_id, .. }
            | LedgerEntry::Debit { profile_id, .. }
            | LedgerEntry::Refund { profile_id, .. } => *profile_id,
        }
    }
}

/// Balance movements for `payment` at `stage`.
///
/// A pending cash transfer holds the payer's money from creation and only
/// reaches the payee once they confirm receipt.
pub fn ledger_entries(payment: &Payment, stage: LedgerStage) -> Vec<LedgerEntry> {
    let amount = payment.amount;
    let credit = LedgerEntry::Credit {
        profile_id: payment.payee_id,
        amount,
    };
    let debit = LedgerEntry::Debit {
        profile_id: payment.payer_id,
        amount,
    };

    match (stage, payment.payment_status) {
        (LedgerStage::Created, PaymentStatus::Completed) if payment.is_top_up() => vec![credit],
        (LedgerStage::Created, PaymentStatus::Completed) => vec![debit, credit],
        (LedgerStage::Created, PaymentStatus::Pending) if !payment.is_top_up() => vec![debit],
        (LedgerStage::Confirmed, PaymentStatus::Completed) => vec![credit],
        (LedgerStage::Voided, PaymentStatus::Failed | PaymentStatus::Cancelled)
            if !payment.is_top_up() =>
        {
            vec![LedgerEntry::Refund {
                profile_id: payment.payer_id,
                amount,
            }]
        }
        _ => Vec::new(),
    }
}

/// Before and after images of a wallet touched by the ledger.
#[derive(Debug, Clone)]
pub struct WalletChange {
    pub old: Wallet,
    pub new: Wallet,
}

async fn ensure_wallet(conn: &mut PgConnection, profile_id: Uuid) -> Result<()> {
    sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(profile_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Creates missing wallets, then locks all of them in id order.
pub async fn lock_wallets(conn: &mut PgConnection, profile_ids: &[Uuid]) -> Result<Vec<Wallet>> {
    let mut ids = profile_ids.to_vec();
    ids.sort();
    ids.dedup();
    for id in &ids {
        ensure_wallet(&mut *conn, *id).await?;
    }
    let wallets = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE user_id = ANY($1) ORDER BY user_id FOR UPDATE",
    )
    .bind(ids.as_slice())
    .fetch_all(&mut *conn)
    .await?;
    Ok(wallets)
}

pub async fn apply_ledger(
    conn: &mut PgConnection,
    entries: &[LedgerEntry],
) -> Result<Vec<WalletChange>> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = entries.iter().map(LedgerEntry::profile_id).collect();
    let locked = lock_wallets(&mut *conn, &ids).await?;

    let mut changes: Vec<WalletChange> = Vec::with_capacity(entries.len());
    for entry in entries {
        let updated = match *entry {
            LedgerEntry::Credit { profile_id, amount } => {
                sqlx::query_as::<_, Wallet>(
                    r#"
                    UPDATE wallets
                    SET balance = balance + $2, total_earned = total_earned + $2, updated_at = NOW()
                    WHERE user_id = $1
                    RETURNING *
                    "#,
                )
                .bind(profile_id)
                .bind(amount)
                .fetch_optional(&mut *conn)
                .await?
            }
            LedgerEntry::Debit { profile_id, amount } => {
                sqlx::query_as::<_, Wallet>(
                    r#"
                    UPDATE wallets
                    SET balance = balance - $2, total_spent = total_spent + $2, updated_at = NOW()
                    WHERE user_id = $1 AND balance >= $2
                    RETURNING *
                    "#,
                )
                .bind(profile_id)
                .bind(amount)
                .fetch_optional(&mut *conn)
                .await?
            }
            LedgerEntry::Refund { profile_id, amount } => {
                sqlx::query_as::<_, Wallet>(
                    r#"
                    UPDATE wallets
                    SET balance = balance + $2, total_spent = GREATEST(total_spent - $2, 0), updated_at = NOW()
                    WHERE user_id = $1
                    RETURNING *
                    "#,
                )
                .bind(profile_id)
                .bind(amount)
                .fetch_optional(&mut *conn)
                .await?
            }
        };

        let Some(new) = updated else {
            tracing::warn!(profile_id = %entry.profile_id(), "ledger debit refused");
            return Err(Error::BadRequest(INSUFFICIENT_BALANCE.to_string()));
        };

        // Keep the earliest image as `old` when one wallet is touched twice.
        if let Some(existing) = changes.iter_mut().find(|c| c.new.user_id == new.user_id) {
            existing.new = new;
        } else if let Some(old) = locked.iter().find(|w| w.user_id == new.user_id) {
            changes.push(WalletChange {
                old: old.clone(),
                new,
            });
        }
    }
    Ok(changes)
}

pub fn publish_wallet_changes(bus: &ChangeBus, changes: &[WalletChange]) {
    for change in changes {
        bus.publish_update(Table::Wallets, &change.old, &change.new);
    }
}

#[derive(Clone)]
pub struct WalletService {
    pool: PgPool,
    bus: ChangeBus,
}

impl WalletService {
    pub fn new(pool: PgPool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    /// `get_or_create_wallet`: idempotent, a zero wallet is created on first use.
    pub async fn get_or_create(&self, profile_id: Uuid) -> Result<Wallet> {
        let created = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(wallet) = created {
            tracing::info!(profile_id = %profile_id, "wallet created");
            self.bus.publish(Table::Wallets, ChangeKind::Insert, &wallet);
            return Ok(wallet);
        }

        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(profile_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentMethod;
    use chrono::Utc;

    fn payment(payer: Uuid, payee: Uuid, method: PaymentMethod, status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            payer_id: payer,
            payee_id: payee,
            job_id: None,
            amount: Decimal::from(500),
            payment_method: method,
            payment_status: status,
            transaction_reference: None,
            notes: None,
            payment_details: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn completed_transfer_moves_money_both_ways() {
        let (payer, payee) = (Uuid::new_v4(), Uuid::new_v4());
        let p = payment(payer, payee, PaymentMethod::Esewa, PaymentStatus::Completed);
        let amount = Decimal::from(500);
        assert_eq!(
            ledger_entries(&p, LedgerStage::Created),
            vec![
                LedgerEntry::Debit { profile_id: payer, amount },
                LedgerEntry::Credit { profile_id: payee, amount },
            ]
        );
    }

    #[test]
    fn top_up_only_credits() {
        let me = Uuid::new_v4();
        let p = payment(me, me, PaymentMethod::Khalti, PaymentStatus::Completed);
        assert_eq!(
            ledger_entries(&p, LedgerStage::Created),
            vec![LedgerEntry::Credit { profile_id: me, amount: Decimal::from(500) }]
        );
    }

    #[test]
    fn pending_cash_debits_now_and_credits_on_confirm() {
        let (payer, payee) = (Uuid::new_v4(), Uuid::new_v4());
        let mut p = payment(payer, payee, PaymentMethod::Cash, PaymentStatus::Pending);
        assert_eq!(
            ledger_entries(&p, LedgerStage::Created),
            vec![LedgerEntry::Debit { profile_id: payer, amount: Decimal::from(500) }]
        );

        p.payment_status = PaymentStatus::Completed;
        assert_eq!(
            ledger_entries(&p, LedgerStage::Confirmed),
            vec![LedgerEntry::Credit { profile_id: payee, amount: Decimal::from(500) }]
        );
    }

    #[test]
    fn failed_payments_touch_nothing() {
        let p = payment(Uuid::new_v4(), Uuid::new_v4(), PaymentMethod::Bank, PaymentStatus::Failed);
        assert!(ledger_entries(&p, LedgerStage::Created).is_empty());
    }

    #[test]
    fn voiding_a_held_cash_payment_refunds_the_payer() {
        let payer = Uuid::new_v4();
        let p = payment(payer, Uuid::new_v4(), PaymentMethod::Cash, PaymentStatus::Cancelled);
        assert_eq!(
            ledger_entries(&p, LedgerStage::Voided),
            vec![LedgerEntry::Refund { profile_id: payer, amount: Decimal::from(500) }]
        );
    }
}
