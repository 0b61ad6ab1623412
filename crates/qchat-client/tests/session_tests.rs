mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FakeAgreement, conversation, session, store, user};
use qchat_client::{ChatError, SessionState};
use qchat_types::ConversationStore;

#[tokio::test]
async fn open_derives_key_and_reports_peer() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed-bytes").await;
    let agreement = FakeAgreement::new();
    let session = session(&store, &conv.id, "alice", agreement.clone());

    assert_eq!(session.state(), SessionState::Uninitialized);
    let info = session.open().await.unwrap();

    assert_eq!(info.peer, user("bob"));
    assert_eq!(info.conversation_id, conv.id);
    assert_eq!(info.kept, 128);
    assert!(session.state().is_ready());

    // Already ready: no second agreement.
    session.open().await.unwrap();
    assert_eq!(agreement.calls(), 1);
}

#[tokio::test]
async fn concurrent_opens_share_one_derivation() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed").await;
    let (agreement, gate) = FakeAgreement::gated();
    let session = session(&store, &conv.id, "alice", agreement.clone());

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });
    let second = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });

    let mut state = session.watch_state();
    tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| *s == SessionState::KeyPending))
        .await
        .unwrap()
        .unwrap();

    gate.add_permits(1);
    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();

    assert_eq!(a, b);
    assert_eq!(agreement.calls(), 1);
}

#[tokio::test]
async fn missing_conversation_is_not_found() {
    let store = store();
    let agreement = FakeAgreement::new();
    let session = session(&store, "ghost", "alice", agreement.clone());

    assert_eq!(
        session.open().await.unwrap_err(),
        ChatError::NotFound("ghost".into())
    );
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert_eq!(agreement.calls(), 0);
}

#[tokio::test]
async fn outsider_cannot_open() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed").await;
    let session = session(&store, &conv.id, "mallory", FakeAgreement::new());

    assert!(matches!(
        session.open().await,
        Err(ChatError::NotAMember(..))
    ));
}

#[tokio::test]
async fn failed_agreement_leaves_session_retryable() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed").await;
    let agreement = FakeAgreement::new();
    agreement.fail.store(true, Ordering::SeqCst);
    let session = session(&store, &conv.id, "alice", agreement.clone());

    assert!(matches!(
        session.open().await,
        Err(ChatError::AgreementFailed(_))
    ));
    assert_eq!(session.state(), SessionState::Uninitialized);

    agreement.fail.store(false, Ordering::SeqCst);
    session.open().await.unwrap();
    assert_eq!(agreement.calls(), 2);
}

#[tokio::test]
async fn close_discards_in_flight_derivation() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed").await;
    let (agreement, gate) = FakeAgreement::gated();
    let session = session(&store, &conv.id, "alice", agreement);

    let opening = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });
    let mut state = session.watch_state();
    state
        .wait_for(|s| *s == SessionState::KeyPending)
        .await
        .unwrap();

    session.close();
    gate.add_permits(1);

    assert_eq!(opening.await.unwrap().unwrap_err(), ChatError::SessionClosed);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(
        session.encrypt_outgoing("hi").await.unwrap_err(),
        ChatError::SessionNotReady
    );
}

#[tokio::test]
async fn crypto_before_open_is_not_ready() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed").await;
    let session = session(&store, &conv.id, "alice", FakeAgreement::new());

    assert_eq!(
        session.encrypt_outgoing("hi").await.unwrap_err(),
        ChatError::SessionNotReady
    );
    assert_eq!(
        session.decrypt_incoming(&[0; 12], &[0; 20]).await.unwrap_err(),
        ChatError::SessionNotReady
    );
}

#[tokio::test]
async fn encrypt_waits_for_pending_key() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed").await;
    let (agreement, gate) = FakeAgreement::gated();
    let session = session(&store, &conv.id, "alice", agreement);

    let opening = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });
    session
        .watch_state()
        .wait_for(|s| *s == SessionState::KeyPending)
        .await
        .unwrap();

    let encrypting = tokio::spawn({
        let session = session.clone();
        async move { session.encrypt_outgoing("queued").await }
    });
    gate.add_permits(1);

    opening.await.unwrap().unwrap();
    let sealed = encrypting.await.unwrap().unwrap();
    assert_eq!(session.decrypt_incoming(&sealed.iv, &sealed.ciphertext).await.unwrap(), "queued");
}

#[tokio::test]
async fn both_members_derive_the_same_key() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"shared-seed").await;
    let alice = session(&store, &conv.id, "alice", FakeAgreement::new());
    let bob = session(&store, &conv.id, "bob", FakeAgreement::new());
    alice.open().await.unwrap();
    bob.open().await.unwrap();

    let sent = alice.send("  hello bob  ").await.unwrap();
    assert_eq!(sent.sender_id, user("alice"));
    assert_eq!(bob.decrypt_incoming(&sent.iv, &sent.ciphertext).await.unwrap(), "hello bob");
}

#[tokio::test]
async fn keys_are_not_shared_across_conversations() {
    let store = store();
    let ab = conversation(&store, "alice", "bob", b"seed-one").await;
    let ac = conversation(&store, "alice", "carol", b"seed-two").await;
    let to_bob = session(&store, &ab.id, "alice", FakeAgreement::new());
    let to_carol = session(&store, &ac.id, "alice", FakeAgreement::new());
    to_bob.open().await.unwrap();
    to_carol.open().await.unwrap();

    let sent = to_bob.send("for bob only").await.unwrap();
    assert_eq!(
        to_carol.decrypt_incoming(&sent.iv, &sent.ciphertext).await.unwrap_err(),
        ChatError::DecryptError
    );
}

#[tokio::test]
async fn blank_messages_are_not_sent() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed").await;
    let session = session(&store, &conv.id, "alice", FakeAgreement::new());
    session.open().await.unwrap();

    assert_eq!(session.send(" \n\t ").await.unwrap_err(), ChatError::EmptyMessage);

    let mut sub = store.subscribe_messages(&conv.id).await.unwrap();
    assert!(sub.recv().await.unwrap().is_empty());
}

#[tokio::test]
async fn reopen_after_close_derives_again() {
    let store = store();
    let conv = conversation(&store, "alice", "bob", b"seed").await;
    let agreement = FakeAgreement::new();
    let session = session(&store, &conv.id, "alice", agreement.clone());

    session.open().await.unwrap();
    session.close();
    assert!(session.info().is_none());

    session.open().await.unwrap();
    assert_eq!(agreement.calls(), 2);
}
