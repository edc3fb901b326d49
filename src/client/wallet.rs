use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::client::refetch::{drive, DirtyFlag};
use crate::client::{read, write, Backend};
use crate::models::wallet::Wallet;
use crate::realtime::{ChangeEvent, ChangeKind, Table};
use crate::utils::money::format_npr;

pub const MASKED_BALANCE: &str = "****";

#[derive(Debug, Clone, PartialEq)]
pub enum WalletState {
    Loading,
    Ready(Wallet),
    NotFound,
}

#[derive(Debug)]
struct Inner {
    state: WalletState,
    masked: bool,
}

/// Balance card for the signed-in profile.
#[derive(Clone)]
pub struct WalletView {
    backend: Arc<dyn Backend>,
    profile_id: Uuid,
    settle: Duration,
    inner: Arc<RwLock<Inner>>,
    dirty: DirtyFlag,
}

impl WalletView {
    pub fn new(backend: Arc<dyn Backend>, profile_id: Uuid, settle: Duration) -> Self {
        Self {
            backend,
            profile_id,
            settle,
            inner: Arc::new(RwLock::new(Inner {
                state: WalletState::Loading,
                masked: false,
            })),
            dirty: DirtyFlag::new(),
        }
    }

    /// Fetches (creating if needed) the wallet. Failures leave the view in
    /// `NotFound`; there is no retry.
    pub async fn load(&self) {
        let state = match self.backend.get_or_create_wallet(self.profile_id).await {
            Ok(wallet) => WalletState::Ready(wallet),
            Err(e) => {
                tracing::error!(error = %e, profile_id = %self.profile_id, "failed to load wallet");
                WalletState::NotFound
            }
        };
        write(&self.inner).state = state;
    }

    pub fn state(&self) -> WalletState {
        read(&self.inner).state.clone()
    }

    pub fn wallet(&self) -> Option<Wallet> {
        match &read(&self.inner).state {
            WalletState::Ready(wallet) => Some(wallet.clone()),
            _ => None,
        }
    }

    /// Flips balance masking and returns whether the balance is now hidden.
    pub fn toggle_visibility(&self) -> bool {
        let mut inner = write(&self.inner);
        inner.masked = !inner.masked;
        inner.masked
    }

    pub fn display_balance(&self) -> Option<String> {
        let inner = read(&self.inner);
        match &inner.state {
            WalletState::Ready(_) if inner.masked => Some(MASKED_BALANCE.to_string()),
            WalletState::Ready(wallet) => Some(format_npr(wallet.balance)),
            _ => None,
        }
    }

    pub fn handle_event(&self, event: &ChangeEvent) {
        if event.is_resync() {
            if matches!(event.table, Table::Wallets | Table::Payments) {
                self.dirty.mark();
            }
            return;
        }
        match event.table {
            Table::Wallets if event.mentions(self.profile_id, &["user_id"]) => {
                if event.kind == ChangeKind::Update {
                    match serde_json::from_value::<Wallet>(event.new.clone()) {
                        Ok(wallet) => {
                            write(&self.inner).state = WalletState::Ready(wallet);
                            return;
                        }
                        Err(e) => tracing::warn!(error = %e, "unreadable wallet update"),
                    }
                }
                self.dirty.mark();
            }
            Table::Payments if event.mentions(self.profile_id, &["payer_id", "payee_id"]) => {
                self.dirty.mark();
            }
            _ => {}
        }
    }

    /// Consumes the change feed until it closes.
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
