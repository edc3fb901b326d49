use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use marketplace_backend::client::{
    Backend, ClientOptions, EntryState, MessagingStore, PaymentFlow, PaymentOutcome,
    SessionContext, TransactionHistory, UnreadCounter, WalletState, WalletView,
};
use marketplace_backend::client::payments::{CREATE_FAILED, TOP_UP_FAILED};
use marketplace_backend::dto::message_dto::SendMessagePayload;
use marketplace_backend::dto::payment_dto::{PaymentDraft, TopUpDraft};
use marketplace_backend::dto::review_dto::CreateReviewPayload;
use marketplace_backend::error::{ConflictKind, Error, Result};
use marketplace_backend::models::conversation::{Conversation, ConversationSummary};
use marketplace_backend::models::message::Message;
use marketplace_backend::models::payment::{
    PartyProfile, Payment, PaymentMethod, PaymentStatus, PaymentWithParties, TransactionDirection,
    TransactionFilter,
};
use marketplace_backend::models::profile::{Profile, ProfileSummary, UserRole, UserStatus};
use marketplace_backend::models::review::{RatingSummary, Review};
use marketplace_backend::models::wallet::Wallet;
use marketplace_backend::realtime::{ChangeBus, ChangeEvent, ChangeKind, Table};

fn wallet(owner: Uuid, balance: i64) -> Wallet {
    let now = Utc::now();
    Wallet {
        id: Uuid::new_v4(),
        user_id: owner,
        balance: Decimal::from(balance),
        total_earned: Decimal::ZERO,
        total_spent: Decimal::ZERO,
        created_at: now,
        updated_at: now,
    }
}

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

fn profile(id: Uuid) -> Profile {
    let now = Utc::now();
    Profile {
        id,
        user_id: Uuid::new_v4(),
        role: UserRole::Worker,
        full_name: "Sita Rai".into(),
        phone: None,
        company_name: None,
        bio: None,
        address: None,
        skills: None,
        profile_photo_url: None,
        resume_url: None,
        identity_document_url: None,
        certification_urls: None,
        is_verified: true,
        approval_status: "approved".into(),
        approved_at: None,
        approved_by: None,
        rejection_reason: None,
        user_status: UserStatus::Active,
        deleted_at: None,
        deleted_by: None,
        created_at: now,
        updated_at: now,
    }
}

fn with_parties(payment: Payment) -> PaymentWithParties {
    let party = |id| PartyProfile {
        id,
        full_name: "Someone".into(),
        profile_photo_url: None,
    };
    PaymentWithParties {
        payer_profile: party(payment.payer_id),
        payee_profile: party(payment.payee_id),
        job_title: None,
        payment,
    }
}

fn message(conversation_id: Uuid, sender: Uuid, receiver: Uuid, text: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id: sender,
        receiver_id: receiver,
        message_text: Some(text.into()),
        attachment_url: None,
        attachment_type: None,
        job_id: None,
        is_read: false,
        created_at: Utc::now(),
    }
}

fn summary(conversation_id: Uuid, me: Uuid, other: Uuid, name: &str, company: Option<&str>) -> ConversationSummary {
    let now = Utc::now();
    ConversationSummary {
        conversation: Conversation {
            id: conversation_id,
            participant_1: me,
            participant_2: other,
            job_id: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        },
        participant_profile: ProfileSummary {
            id: other,
            full_name: name.into(),
            profile_photo_url: None,
            company_name: company.map(str::to_string),
        },
        unread_count: 0,
        last_message: None,
    }
}

fn event<T: serde::Serialize>(table: Table, kind: ChangeKind, row: &T) -> ChangeEvent {
    ChangeEvent {
        table,
        kind,
        new: serde_json::to_value(row).unwrap(),
        old: None,
    }
}

#[derive(Default)]
struct Calls {
    wallet: usize,
    history: usize,
    create_payment: usize,
    find_existing: usize,
    mark_read: usize,
    list_conversations: usize,
}

#[derive(Default)]
struct State {
    wallet: Option<Wallet>,
    existing: Option<Payment>,
    create_result: Option<std::result::Result<Payment, ConflictKind>>,
    top_up_fails: bool,
    history: Vec<PaymentWithParties>,
    conversations: Vec<ConversationSummary>,
    messages: Vec<Message>,
    send_fails: bool,
    unread: i64,
    profile: Option<Profile>,
    accepted_token: Option<String>,
    token: Option<String>,
    calls: Calls,
}

/// In-memory server double.
struct FakeBackend {
    me: Uuid,
    state: Mutex<State>,
    bus: ChangeBus,
}

impl FakeBackend {
    fn new(me: Uuid) -> Arc<Self> {
        Arc::new(Self {
            me,
            state: Mutex::new(State::default()),
            bus: ChangeBus::new(),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn set_token(&self, token: Option<String>) {
        self.with(|s| s.token = token);
    }

    async fn current_profile(&self) -> Result<Profile> {
        self.with(|s| match &s.profile {
            None => Err(Error::NotFound("Profile not found".into())),
            Some(_) if s.token != s.accepted_token => {
                Err(Error::Unauthorized("Invalid or expired token".into()))
            }
            Some(profile) => Ok(profile.clone()),
        })
    }

    async fn get_or_create_wallet(&self, profile_id: Uuid) -> Result<Wallet> {
        self.with(|s| {
            s.calls.wallet += 1;
            s.wallet
                .clone()
                .filter(|w| w.user_id == profile_id)
                .ok_or_else(|| Error::Internal("connection reset".into()))
        })
    }

    async fn find_existing_payment(&self, _job_id: Uuid, _payee_id: Uuid) -> Result<Option<Payment>> {
        self.with(|s| {
            s.calls.find_existing += 1;
            Ok(s.existing.clone())
        })
    }

    async fn create_payment(&self, _draft: &PaymentDraft) -> Result<Payment> {
        self.with(|s| {
            s.calls.create_payment += 1;
            match s.create_result.clone() {
                Some(Ok(payment)) => Ok(payment),
                Some(Err(kind)) => Err(Error::Conflict(kind)),
                None => Err(Error::Internal("boom".into())),
            }
        })
    }

    async fn top_up(&self, draft: &TopUpDraft) -> Result<Payment> {
        let amount: Decimal = draft
            .amount
            .parse()
            .map_err(|_| Error::BadRequest("bad amount".into()))?;
        let mut created = payment(self.me, self.me, PaymentMethod::Esewa, PaymentStatus::Completed);
        created.amount = amount;
        self.with(|s| {
            if s.top_up_fails {
                return Err(Error::Internal("gateway down".into()));
            }
            if let Some(wallet) = s.wallet.as_mut() {
                wallet.balance += amount;
            }
            Ok(())
        })?;
        self.bus.publish(Table::Payments, ChangeKind::Insert, &created);
        Ok(created)
    }

    async fn payment_history(&self) -> Result<Vec<PaymentWithParties>> {
        self.with(|s| {
            s.calls.history += 1;
            Ok(s.history.clone())
        })
    }

    async fn confirm_receipt(&self, payment_id: Uuid) -> Result<Payment> {
        self.with(|s| {
            s.history
                .iter()
                .find(|row| row.payment.id == payment_id)
                .map(|row| row.payment.clone())
                .ok_or_else(|| Error::NotFound("Payment not found".into()))
        })
    }

    async fn rating_summary(&self, _profile_id: Uuid) -> Result<RatingSummary> {
        Ok(RatingSummary { average: 0.0, count: 0 })
    }

    async fn submit_review(&self, _payload: &CreateReviewPayload) -> Result<Review> {
        Err(Error::Internal("not used".into()))
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.with(|s| {
            s.calls.list_conversations += 1;
            Ok(s.conversations.clone())
        })
    }

    async fn start_conversation(&self, participant_id: Uuid) -> Result<Conversation> {
        self.with(|s| {
            s.conversations
                .iter()
                .find(|c| c.participant_profile.id == participant_id)
                .map(|c| c.conversation.clone())
                .ok_or_else(|| Error::NotFound("Profile not found".into()))
        })
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.with(|s| {
            Ok(s.messages
                .iter()
                .filter(|m| m.conversation_id == conversation_id)
                .cloned()
                .collect())
        })
    }

    async fn send_message(&self, conversation_id: Uuid, payload: &SendMessagePayload) -> Result<Message> {
        self.with(|s| {
            if s.send_fails {
                return Err(Error::Internal("offline".into()));
            }
            let receiver = s
                .conversations
                .iter()
                .find(|c| c.conversation.id == conversation_id)
                .map(|c| c.conversation.counterpart(self.me))
                .unwrap_or_default();
            let mut sent = message(conversation_id, self.me, receiver, &payload.message_text);
            sent.job_id = payload.job_id;
            s.messages.push(sent.clone());
            Ok(sent)
        })
    }

    async fn mark_read(&self, _conversation_id: Uuid) -> Result<u64> {
        self.with(|s| {
            s.calls.mark_read += 1;
            Ok(0)
        })
    }

    async fn unread_count(&self) -> Result<i64> {
        self.with(|s| Ok(s.unread))
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }
}

#[tokio::test]
async fn wallet_view_formats_masks_and_patches() {
    let me = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    backend.with(|s| s.wallet = Some(wallet(me, 1500)));

    let view = WalletView::new(backend.clone(), me, ClientOptions::default().wallet_settle);
    assert_eq!(view.state(), WalletState::Loading);
    view.load().await;
    assert_eq!(view.display_balance().as_deref(), Some("रु 1,500.00"));

    assert!(view.toggle_visibility());
    assert_eq!(view.display_balance().as_deref(), Some("****"));
    assert!(!view.toggle_visibility());

    let mut updated = wallet(me, 2750);
    updated.id = view.wallet().unwrap().id;
    view.handle_event(&event(Table::Wallets, ChangeKind::Update, &updated));
    assert_eq!(view.display_balance().as_deref(), Some("रु 2,750.00"));

    // Someone else's wallet is ignored.
    view.handle_event(&event(Table::Wallets, ChangeKind::Update, &wallet(Uuid::new_v4(), 1)));
    assert_eq!(view.wallet().unwrap().balance, Decimal::from(2750));
}

#[tokio::test]
async fn wallet_load_failure_leaves_not_found() {
    let me = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let view = WalletView::new(backend.clone(), me, Duration::from_millis(10));
    view.load().await;
    assert_eq!(view.state(), WalletState::NotFound);
    assert_eq!(view.display_balance(), None);
    assert_eq!(backend.with(|s| s.calls.wallet), 1);
}

#[tokio::test(start_paused = true)]
async fn payment_burst_triggers_one_wallet_refetch() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    backend.with(|s| s.wallet = Some(wallet(me, 100)));

    let view = WalletView::new(backend.clone(), me, Duration::from_millis(1000));
    let task = tokio::spawn(view.clone().run(backend.subscribe()));
    tokio::task::yield_now().await;

    for _ in 0..4 {
        let row = payment(me, other, PaymentMethod::Bank, PaymentStatus::Completed);
        backend.bus.publish(Table::Payments, ChangeKind::Insert, &row);
    }
    // Unrelated traffic does not count.
    let row = payment(other, Uuid::new_v4(), PaymentMethod::Bank, PaymentStatus::Completed);
    backend.bus.publish(Table::Payments, ChangeKind::Insert, &row);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(backend.with(|s| s.calls.wallet), 1);
    assert_eq!(view.display_balance().as_deref(), Some("रु 100.00"));

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn top_up_reaches_the_wallet_after_refetch() {
    let me = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    backend.with(|s| s.wallet = Some(wallet(me, 0)));

    let view = WalletView::new(backend.clone(), me, ClientOptions::default().wallet_settle);
    view.load().await;
    assert_eq!(view.display_balance().as_deref(), Some("रु 0.00"));
    let task = tokio::spawn(view.clone().run(backend.subscribe()));
    tokio::task::yield_now().await;

    let draft = TopUpDraft {
        amount: "200".into(),
        payment_method: Some(PaymentMethod::Esewa),
        transaction_reference: Some("ESW-77".into()),
        notes: None,
    };
    let outcome = PaymentFlow::new(backend.clone()).top_up(&draft).await;
    assert!(matches!(outcome, PaymentOutcome::Created(_)));
    // Nothing changes until the settle window has passed.
    assert_eq!(view.display_balance().as_deref(), Some("रु 0.00"));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(view.display_balance().as_deref(), Some("रु 200.00"));
    task.abort();
}

fn bank_draft(payee: Uuid, amount: &str) -> PaymentDraft {
    PaymentDraft {
        payee_id: Some(payee),
        job_id: Some(Uuid::new_v4()),
        pay_rate: Some("NPR 500/day".into()),
        amount: amount.into(),
        payment_method: Some(PaymentMethod::Bank),
        transaction_reference: Some("TXN-1".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn invalid_payment_is_rejected_locally() {
    let me = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let flow = PaymentFlow::new(backend.clone());

    let outcome = flow.submit(&bank_draft(Uuid::new_v4(), "450"), Decimal::from(1000)).await;
    assert_eq!(
        outcome,
        PaymentOutcome::Rejected(
            "Payment amount must be exactly रु 500 as per the job pay rate.".into()
        )
    );
    let outcome = flow.submit(&bank_draft(Uuid::new_v4(), "500"), Decimal::from(100)).await;
    assert_eq!(outcome, PaymentOutcome::Rejected("Insufficient balance".into()));

    assert_eq!(backend.with(|s| s.calls.create_payment + s.calls.find_existing), 0);
}

#[tokio::test]
async fn existing_payment_short_circuits_creation() {
    let me = Uuid::new_v4();
    let payee = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let previous = payment(me, payee, PaymentMethod::Bank, PaymentStatus::Completed);
    backend.with(|s| s.existing = Some(previous.clone()));

    let flow = PaymentFlow::new(backend.clone());
    let outcome = flow.submit(&bank_draft(payee, "500"), Decimal::from(1000)).await;
    assert_eq!(outcome, PaymentOutcome::AlreadyPaid(Some(previous)));
    assert_eq!(backend.with(|s| s.calls.create_payment), 0);
}

#[tokio::test]
async fn server_conflict_and_failure_map_to_outcomes() {
    let me = Uuid::new_v4();
    let payee = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let flow = PaymentFlow::new(backend.clone());

    backend.with(|s| s.create_result = Some(Err(ConflictKind::AlreadyPaid)));
    let outcome = flow.submit(&bank_draft(payee, "500"), Decimal::from(1000)).await;
    assert_eq!(outcome, PaymentOutcome::AlreadyPaid(None));

    backend.with(|s| s.create_result = None);
    let outcome = flow.submit(&bank_draft(payee, "500"), Decimal::from(1000)).await;
    assert_eq!(outcome, PaymentOutcome::Failed(CREATE_FAILED.into()));

    let created = payment(me, payee, PaymentMethod::Bank, PaymentStatus::Completed);
    backend.with(|s| s.create_result = Some(Ok(created.clone())));
    let outcome = flow.submit(&bank_draft(payee, "500"), Decimal::from(1000)).await;
    assert_eq!(outcome, PaymentOutcome::Created(created));
}

#[tokio::test]
async fn top_up_validates_then_reports_failures() {
    let me = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let flow = PaymentFlow::new(backend.clone());

    let too_big = TopUpDraft {
        amount: "1000001".into(),
        payment_method: Some(PaymentMethod::Khalti),
        transaction_reference: Some("K-1".into()),
        notes: None,
    };
    assert_eq!(
        flow.top_up(&too_big).await,
        PaymentOutcome::Rejected("Top-up amount cannot exceed रु 10,00,000.".into())
    );

    let draft = TopUpDraft {
        amount: "250.50".into(),
        ..too_big
    };
    assert!(matches!(flow.top_up(&draft).await, PaymentOutcome::Created(p) if p.is_top_up()));

    backend.with(|s| s.top_up_fails = true);
    assert_eq!(flow.top_up(&draft).await, PaymentOutcome::Failed(TOP_UP_FAILED.into()));
}

#[tokio::test(start_paused = true)]
async fn history_filters_and_refetches_once_per_burst() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let incoming = payment(other, me, PaymentMethod::Cash, PaymentStatus::Pending);
    backend.with(|s| {
        s.history = vec![
            with_parties(incoming.clone()),
            with_parties(payment(me, other, PaymentMethod::Bank, PaymentStatus::Completed)),
            with_parties(payment(me, me, PaymentMethod::Esewa, PaymentStatus::Completed)),
        ]
    });

    let history = TransactionHistory::new(backend.clone(), me, ClientOptions::default().history_settle);
    history.load().await;
    assert!(history.is_loaded());
    assert_eq!(history.filter(TransactionFilter::All).len(), 3);
    assert_eq!(history.filter(TransactionFilter::Sent).len(), 2);
    assert_eq!(history.filter(TransactionFilter::Received).len(), 2);
    assert_eq!(history.filter(TransactionFilter::Pending).len(), 1);
    assert!(history.can_confirm(&incoming));
    assert_eq!(history.direction(&incoming), TransactionDirection::Received);

    let task = tokio::spawn(history.clone().run(backend.subscribe()));
    tokio::task::yield_now().await;
    for _ in 0..3 {
        backend.bus.publish(Table::Payments, ChangeKind::Update, &incoming);
    }
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(backend.with(|s| s.calls.history), 2);
    task.abort();
}

#[tokio::test]
async fn optimistic_send_confirms_or_rolls_back() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let conversation_id = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    backend.with(|s| s.conversations = vec![summary(conversation_id, me, other, "Sita Rai", None)]);

    let store = MessagingStore::new(backend.clone(), me);
    store.refresh_conversations().await;
    assert_eq!(store.start_conversation(other).await.unwrap(), conversation_id);

    let sent = store.send("  Namaste  ", None).await.unwrap();
    let thread = store.open_thread().unwrap();
    assert_eq!(thread.entries.len(), 1);
    assert_eq!(thread.entries[0].state, EntryState::Confirmed);
    assert_eq!(thread.entries[0].message.id, sent.id);
    assert_eq!(sent.message_text.as_deref(), Some("Namaste"));
    assert_eq!(sent.receiver_id, other);

    backend.with(|s| s.send_fails = true);
    store.set_compose("Are you free tomorrow?");
    assert!(store.send("Are you free tomorrow?", None).await.is_err());
    let thread = store.open_thread().unwrap();
    assert_eq!(thread.entries.len(), 1);
    assert_eq!(thread.compose, "Are you free tomorrow?");

    assert!(matches!(store.send("   ", None).await, Err(Error::BadRequest(_))));
}

#[tokio::test]
async fn sent_messages_carry_the_job_context() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let conversation_id = Uuid::new_v4();
    let conversation_job = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let mut about_job = summary(conversation_id, me, other, "Sita Rai", None);
    about_job.conversation.job_id = Some(conversation_job);
    backend.with(|s| s.conversations = vec![about_job]);

    let store = MessagingStore::new(backend.clone(), me);
    store.refresh_conversations().await;
    store.open_conversation(conversation_id).await.unwrap();

    let sent = store.send("When can you start?", None).await.unwrap();
    assert_eq!(sent.job_id, Some(conversation_job));

    let other_job = Uuid::new_v4();
    let sent = store.send("About the other job", Some(other_job)).await.unwrap();
    assert_eq!(sent.job_id, Some(other_job));
    let thread = store.open_thread().unwrap();
    assert!(thread.entries.iter().all(|e| e.state == EntryState::Confirmed));
    assert_eq!(thread.entries[1].message.job_id, Some(other_job));
}

#[tokio::test]
async fn incoming_messages_update_thread_or_badge() {
    let me = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let open_id = Uuid::new_v4();
    let other_id = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    backend.with(|s| {
        s.conversations = vec![
            summary(open_id, me, alice, "Alice Gurung", Some("Gurung Builders")),
            summary(other_id, me, bob, "Bob Thapa", None),
        ]
    });

    let store = MessagingStore::new(backend.clone(), me);
    store.refresh_conversations().await;
    store.open_conversation(open_id).await.unwrap();
    let reads_after_open = backend.with(|s| s.calls.mark_read);

    let into_open = message(open_id, alice, me, "On my way");
    let insert = event(Table::Messages, ChangeKind::Insert, &into_open);
    store.handle_event(&insert).await;
    store.handle_event(&insert).await;
    let thread = store.open_thread().unwrap();
    assert_eq!(thread.entries.len(), 1);
    assert!(backend.with(|s| s.calls.mark_read) > reads_after_open);

    let elsewhere = message(other_id, bob, me, "Payment sent");
    store
        .handle_event(&event(Table::Messages, ChangeKind::Insert, &elsewhere))
        .await;
    let bob_row = store
        .conversations()
        .into_iter()
        .find(|c| c.conversation.id == other_id)
        .unwrap();
    assert_eq!(bob_row.unread_count, 1);
    assert_eq!(bob_row.last_message.as_deref(), Some("Payment sent"));

    // My own inserts are represented by the optimistic entry.
    let mine = message(open_id, me, alice, "Thanks");
    store
        .handle_event(&event(Table::Messages, ChangeKind::Insert, &mine))
        .await;
    assert_eq!(store.open_thread().unwrap().entries.len(), 1);

    assert_eq!(store.search("builders").len(), 1);
    assert_eq!(store.search("THAPA").len(), 1);
    assert_eq!(store.search("").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn resync_events_refetch_every_view() {
    let me = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let conversation_id = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    backend.with(|s| {
        s.wallet = Some(wallet(me, 100));
        s.conversations = vec![summary(conversation_id, me, alice, "Alice Gurung", None)];
    });

    let options = ClientOptions::default();
    let wallet_view = WalletView::new(backend.clone(), me, options.wallet_settle);
    let history = TransactionHistory::new(backend.clone(), me, options.history_settle);
    let counter = UnreadCounter::new(backend.clone(), me);
    let store = MessagingStore::new(backend.clone(), me);
    store.refresh_conversations().await;
    store.open_conversation(conversation_id).await.unwrap();

    let tasks = vec![
        tokio::spawn(wallet_view.clone().run(backend.subscribe())),
        tokio::spawn(history.clone().run(backend.subscribe())),
        tokio::spawn(counter.clone().run(backend.subscribe())),
        tokio::spawn(store.clone().run(backend.subscribe())),
    ];
    tokio::task::yield_now().await;

    // What the server missed while the feed was behind.
    backend.with(|s| {
        s.wallet = Some(wallet(me, 900));
        s.unread = 3;
        s.messages.push(message(conversation_id, alice, me, "Did you get it?"));
    });
    let listed_before = backend.with(|s| s.calls.list_conversations);
    for table in [Table::Wallets, Table::Payments, Table::Messages] {
        backend.bus.emit(ChangeEvent::resync(table));
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(backend.with(|s| s.calls.wallet), 1);
    assert_eq!(wallet_view.display_balance().as_deref(), Some("रु 900.00"));
    assert_eq!(backend.with(|s| s.calls.history), 1);
    assert!(history.is_loaded());
    assert_eq!(counter.count(), 3);
    assert!(backend.with(|s| s.calls.list_conversations) > listed_before);
    let thread = store.open_thread().unwrap();
    assert_eq!(thread.entries.len(), 1);
    assert_eq!(
        thread.entries[0].message.message_text.as_deref(),
        Some("Did you get it?")
    );

    for task in tasks {
        task.abort();
    }
}

#[tokio::test]
async fn unread_counter_tracks_inserts_and_reads() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    backend.with(|s| s.unread = 1);

    let counter = UnreadCounter::new(backend.clone(), me);
    counter.refetch().await;
    assert_eq!(counter.count(), 1);

    let unread = message(Uuid::new_v4(), other, me, "hello");
    counter.handle_event(&event(Table::Messages, ChangeKind::Insert, &unread));
    assert_eq!(counter.count(), 2);

    let mut read = unread.clone();
    read.is_read = true;
    let read_update = ChangeEvent {
        table: Table::Messages,
        kind: ChangeKind::Update,
        new: serde_json::to_value(&read).unwrap(),
        old: Some(serde_json::to_value(&unread).unwrap()),
    };
    for _ in 0..3 {
        counter.handle_event(&read_update);
    }
    assert_eq!(counter.count(), 0);

    // Already-read rows and messages to others leave the count alone.
    let already_read = ChangeEvent {
        old: Some(json!({"receiver_id": me, "is_read": true})),
        ..read_update.clone()
    };
    counter.handle_event(&already_read);
    counter.handle_event(&event(Table::Messages, ChangeKind::Insert, &message(Uuid::new_v4(), me, other, "hi")));
    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn session_refresh_sends_the_rotated_token() {
    let me = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    backend.with(|s| {
        s.profile = Some(profile(me));
        s.token = Some("expired".into());
        s.accepted_token = Some("rotated".into());
    });

    let mut session = SessionContext::new();
    session.refresh(&*backend, "rotated".into()).await.unwrap();
    assert_eq!(session.access_token(), Some("rotated"));
    assert_eq!(session.profile_id(), Some(me));
    assert_eq!(backend.with(|s| s.token.clone()).as_deref(), Some("rotated"));

    // A rejected token leaves the session and the backend on the old one.
    let err = session.refresh(&*backend, "forged".into()).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    assert_eq!(session.access_token(), Some("rotated"));
    assert_eq!(backend.with(|s| s.token.clone()).as_deref(), Some("rotated"));
}

mod mocked {
    use super::*;
    use mockall::mock;

    mock! {
        pub Api {}

        #[async_trait]
        impl Backend for Api {
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
            async fn send_message(&self, conversation_id: Uuid, payload: &SendMessagePayload) -> Result<Message>;
            async fn mark_read(&self, conversation_id: Uuid) -> Result<u64>;
            async fn unread_count(&self) -> Result<i64>;
            fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
        }
    }

    #[tokio::test]
    async fn out_of_range_rating_never_reaches_the_server() {
        let mut api = MockApi::new();
        api.expect_submit_review().times(0);
        let flow = PaymentFlow::new(Arc::new(api));

        let payload = CreateReviewPayload {
            reviewee_id: Uuid::new_v4(),
            job_id: None,
            rating: 6,
            review_text: None,
        };
        let err = flow.submit_review(&payload).await.unwrap_err();
        assert_eq!(err.user_message(), "Rating must be between 1 and 5 stars.");
    }

    #[tokio::test]
    async fn refresh_without_profile_keeps_session_inactive() {
        let mut api = MockApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_set_token()
            .withf(|token| token.as_deref() == Some("rotated"))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        api.expect_current_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(Error::Unauthorized("Invalid or expired token".into())));
        api.expect_set_token()
            .withf(|token| token.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mut session = SessionContext::new();
        assert!(session.refresh(&api, "rotated".into()).await.is_err());
        assert!(!session.is_active());
        assert!(session.current_profile().is_none());
        session.teardown();
    }
}
