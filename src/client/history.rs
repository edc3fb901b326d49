use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::client::refetch::{drive, DirtyFlag};
use crate::client::{read, write, Backend};
use crate::error::Result;
use crate::models::payment::{
    Payment, PaymentMethod, PaymentStatus, PaymentWithParties, TransactionDirection,
    TransactionFilter,
};
use crate::realtime::{ChangeEvent, Table};

/// True when `me` is the payee of a pending cash transfer from someone else.
pub fn can_confirm(payment: &Payment, me: Uuid) -> bool {
    payment.payee_id == me
        && payment.payer_id != me
        && payment.payment_method == PaymentMethod::Cash
        && payment.payment_status == PaymentStatus::Pending
}

#[derive(Debug, Default)]
struct Inner {
    items: Vec<PaymentWithParties>,
    loaded: bool,
}

/// Payments the signed-in profile sent, received or topped up.
#[derive(Clone)]
pub struct TransactionHistory {
    backend: Arc<dyn Backend>,
    me: Uuid,
    settle: Duration,
    inner: Arc<RwLock<Inner>>,
    dirty: DirtyFlag,
}

impl TransactionHistory {
    pub fn new(backend: Arc<dyn Backend>, me: Uuid, settle: Duration) -> Self {
        Self {
            backend,
            me,
            settle,
            inner: Arc::new(RwLock::new(Inner::default())),
            dirty: DirtyFlag::new(),
        }
    }

    /// Reloads the list. On error the previous rows stay.
    pub async fn load(&self) {
        match self.backend.payment_history().await {
            Ok(items) => {
                let mut inner = write(&self.inner);
                inner.items = items;
                inner.loaded = true;
            }
            Err(e) => tracing::error!(error = %e, "failed to load transaction history"),
        }
    }

    pub fn is_loaded(&self) -> bool {
        read(&self.inner).loaded
    }

    pub fn items(&self) -> Vec<PaymentWithParties> {
        read(&self.inner).items.clone()
    }

    pub fn filter(&self, filter: TransactionFilter) -> Vec<PaymentWithParties> {
        read(&self.inner)
            .items
            .iter()
            .filter(|row| filter.matches(&row.payment, self.me))
            .cloned()
            .collect()
    }

    pub fn direction(&self, payment: &Payment) -> TransactionDirection {
        TransactionDirection::of(payment, self.me)
    }

    pub fn can_confirm(&self, payment: &Payment) -> bool {
        can_confirm(payment, self.me)
    }

    /// Confirms on the server only; the resulting change event brings the
    /// list up to date.
    pub async fn confirm_receipt(&self, payment_id: Uuid) -> Result<Payment> {
        self.backend.confirm_receipt(payment_id).await
    }

    pub fn handle_event(&self, event: &ChangeEvent) {
        if event.table != Table::Payments {
            return;
        }
        if event.is_resync() || event.mentions(self.me, &["payer_id", "payee_id"]) {
            self.dirty.mark();
        }
    }

    pub async fn run(self, rx: broadcast::Receiver<ChangeEvent>) {
        let view = self.clone();
        drive(
            rx,
            &self.dirty,
            self.settle,
            |event| self.handle_event(event),
            move || {
                let view = view.clone();
                async move { view.load().await }
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn cash(payer: Uuid, payee: Uuid, status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            payer_id: payer,
            payee_id: payee,
            job_id: None,
            amount: Decimal::from(300),
            payment_method: PaymentMethod::Cash,
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
    fn only_the_payee_confirms_pending_cash() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(can_confirm(&cash(other, me, PaymentStatus::Pending), me));
        assert!(!can_confirm(&cash(other, me, PaymentStatus::Completed), me));
        assert!(!can_confirm(&cash(me, other, PaymentStatus::Pending), me));
        assert!(!can_confirm(&cash(me, me, PaymentStatus::Pending), me));

        let mut bank = cash(other, me, PaymentStatus::Pending);
        bank.payment_method = PaymentMethod::Bank;
        assert!(!can_confirm(&bank, me));
    }
}
