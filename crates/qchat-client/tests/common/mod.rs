#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use qchat_client::{ChatSession, Inbox, MemoryWatermarks, Services, UnreadTracker};
use qchat_db::SqliteStore;
use qchat_quantum::{Agreement, KeyAgreement, QuantumError, SeedSource, ServiceConfig};
use qchat_types::{ConversationStore, Conversation, Members, UserId};

/// Deterministic stand-in for the BB84 service. Optionally gated so tests
/// can observe the in-flight state.
#[derive(Default)]
pub struct FakeAgreement {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl FakeAgreement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let agreement = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (Arc::new(agreement), gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyAgreement for FakeAgreement {
    async fn agree(&self, seed: &[u8], n_bits: u32) -> Result<Agreement, QuantumError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(QuantumError::AgreementFailed("simulator down".into()));
        }
        Ok(Agreement {
            sifted_key: seed.iter().map(|b| b ^ 0x5A).collect(),
            qber: 0.02,
            kept: n_bits / 2,
            discarded: n_bits / 2,
        })
    }
}

/// Counting seed source that can be switched off.
#[derive(Default)]
pub struct FakeSeeds {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeSeeds {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SeedSource for FakeSeeds {
    async fn generate_seed(&self, n_bytes: usize) -> Result<Vec<u8>, QuantumError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(QuantumError::SourceUnavailable("qrng offline".into()));
        }
        Ok((0..n_bytes).map(|i| (i + call) as u8).collect())
    }
}

pub fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().unwrap())
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub async fn conversation(store: &SqliteStore, a: &str, b: &str, seed: &[u8]) -> Conversation {
    store
        .create_conversation(Members::new(user(a), user(b)).unwrap(), seed.to_vec())
        .await
        .unwrap()
}

pub fn session(
    store: &Arc<SqliteStore>,
    conversation_id: &str,
    local: &str,
    agreement: Arc<FakeAgreement>,
) -> ChatSession {
    ChatSession::new(conversation_id, user(local), store.clone(), agreement, 256)
}

pub fn inbox(
    store: &Arc<SqliteStore>,
    local: &str,
    seeds: Arc<FakeSeeds>,
    agreement: Arc<FakeAgreement>,
) -> Inbox {
    let services = Services {
        store: store.clone(),
        directory: store.clone(),
        watermarks: Arc::new(MemoryWatermarks::new()),
        seeds,
        agreement,
    };
    Inbox::new(user(local), services, &ServiceConfig::default())
}

/// Wait until `conversation_id` shows `expected` unread, or panic.
pub async fn wait_unread(tracker: &UnreadTracker, conversation_id: &str, expected: usize) {
    let mut counts = tracker.counts();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if tracker.unread_count(conversation_id) == expected {
                return;
            }
            counts.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "unread for {conversation_id} stuck at {} (wanted {expected})",
            tracker.unread_count(conversation_id)
        )
    });
}

/// Let the store clock move past any watermark just written.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
