//! In-process table change feed.
//!
//! Services publish a [`ChangeEvent`] after each committed mutation. HTTP
//! subscribers receive them as Server-Sent Events, filtered down to the rows
//! the caller is allowed to see.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Jobs,
    Applications,
    Conversations,
    Messages,
    Payments,
    Wallets,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Profiles,
        Table::Jobs,
        Table::Applications,
        Table::Conversations,
        Table::Messages,
        Table::Payments,
        Table::Wallets,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Jobs => "jobs",
            Table::Applications => "applications",
            Table::Conversations => "conversations",
            Table::Messages => "messages",
            Table::Payments => "payments",
            Table::Wallets => "wallets",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "profiles" => Some(Table::Profiles),
            "jobs" => Some(Table::Jobs),
            "applications" => Some(Table::Applications),
            "conversations" => Some(Table::Conversations),
            "messages" => Some(Table::Messages),
            "payments" => Some(Table::Payments),
            "wallets" => Some(Table::Wallets),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Never published by services. Marks a gap in the feed: the receiver
    /// should refetch everything it holds for `table`.
    Resync,
}

impl ChangeKind {
    /// Parses a subscribable kind; `RESYNC` is not one.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub new: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<JsonValue>,
}

impl ChangeEvent {
    pub fn resync(table: Table) -> Self {
        Self {
            table,
            kind: ChangeKind::Resync,
            new: JsonValue::Null,
            old: None,
        }
    }

    pub fn is_resync(&self) -> bool {
        self.kind == ChangeKind::Resync
    }

    /// Row image the event is about: `new`, or `old` for deletes.
    pub fn row(&self) -> &JsonValue {
        match (self.kind, &self.old) {
            (ChangeKind::Delete, Some(old)) => old,
            _ => &self.new,
        }
    }

    pub fn uuid_field(&self, column: &str) -> Option<Uuid> {
        self.row()
            .get(column)
            .and_then(JsonValue::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// True when the row names `profile_id` in any of `columns`.
    pub fn mentions(&self, profile_id: Uuid, columns: &[&str]) -> bool {
        columns
            .iter()
            .any(|column| self.uuid_field(column) == Some(profile_id))
    }

    /// Row-level visibility for a subscriber, standing in for row security.
    pub fn visible_to(&self, profile_id: Uuid) -> bool {
        match self.table {
            Table::Payments => self.mentions(profile_id, &["payer_id", "payee_id"]),
            Table::Messages => self.mentions(profile_id, &["sender_id", "receiver_id"]),
            Table::Conversations => {
                self.mentions(profile_id, &["participant_1", "participant_2"])
            }
            Table::Wallets => self.mentions(profile_id, &["user_id"]),
            Table::Profiles | Table::Jobs | Table::Applications => true,
        }
    }
}

/// Subscription predicate: table, optional event kind, optional `column = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeFilter {
    pub table: Table,
    pub kind: Option<ChangeKind>,
    pub eq: Option<(String, String)>,
}

impl ChangeFilter {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            kind: None,
            eq: None,
        }
    }

    pub fn kind(mut self, kind: ChangeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.eq = Some((column.into(), value.to_string()));
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        if event.is_resync() {
            return true;
        }
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        match &self.eq {
            None => true,
            Some((column, value)) => match event.row().get(column) {
                Some(JsonValue::String(s)) => s == value,
                Some(other) => other.to_string() == *value,
                None => false,
            },
        }
    }
}

#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ChangeEvent) {
        debug!(table = event.table.as_str(), kind = ?event.kind, "change published");
        // No receivers is the normal idle state.
        let _ = self.tx.send(event);
    }

    /// Serialize `row` and publish it. Serialization failures are logged, never fatal.
    pub fn publish<T: Serialize>(&self, table: Table, kind: ChangeKind, row: &T) {
        match serde_json::to_value(row) {
            Ok(new) => self.emit(ChangeEvent {
                table,
                kind,
                new,
                old: None,
            }),
            Err(err) => warn!(table = table.as_str(), error = %err, "could not serialize change"),
        }
    }

    pub fn publish_update<T: Serialize>(&self, table: Table, old: &T, new: &T) {
        match (serde_json::to_value(old), serde_json::to_value(new)) {
            (Ok(old), Ok(new)) => self.emit(ChangeEvent {
                table,
                kind: ChangeKind::Update,
                new,
                old: Some(old),
            }),
            _ => warn!(table = table.as_str(), "could not serialize change"),
        }
    }
}
