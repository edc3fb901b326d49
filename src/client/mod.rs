//! Client core: the wallet, payment, history and messaging views a front end
//! drives, written against [`Backend`] so they run the same over HTTP or
//! against an in-memory fake.
//!
//! Views are event driven. Each one consumes the change feed from
//! [`Backend::subscribe`], patches what it can in place, and folds everything
//! else into a single debounced refetch (see [`refetch`]).

pub mod backend;
pub mod history;
pub mod http;
pub mod messaging;
pub mod payments;
pub mod refetch;
pub mod session;
pub mod unread;
pub mod wallet;

use std::time::Duration;

pub use backend::Backend;
pub use history::TransactionHistory;
pub use http::HttpBackend;
pub use messaging::{EntryState, MessagingStore, Thread, ThreadEntry};
pub use payments::{PaymentFlow, PaymentOutcome};
pub use session::SessionContext;
pub use unread::UnreadCounter;
pub use wallet::{WalletState, WalletView};

/// Settle windows for the debounced refetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub wallet_settle: Duration,
    pub history_settle: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            wallet_settle: Duration::from_millis(1000),
            history_settle: Duration::from_millis(500),
        }
    }
}

/// Reads through a poisoned lock; view state stays usable after a panic elsewhere.
pub(crate) fn read<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
