mod common;

use std::sync::atomic::Ordering;

use common::{FakeAgreement, FakeSeeds, inbox, session, store, tick, user, wait_unread};
use qchat_client::{ChatError, FALLBACK_PEER_LABEL};
use qchat_types::{UserId, now_millis};

#[tokio::test]
async fn handles_are_normalized_and_unique() {
    let store = store();
    let alice = inbox(&store, "uid-a", FakeSeeds::new(), FakeAgreement::new());
    let mallory = inbox(&store, "uid-m", FakeSeeds::new(), FakeAgreement::new());

    assert_eq!(alice.claim_handle(" @Alice ").await.unwrap(), "alice");
    assert_eq!(
        mallory.claim_handle("alice").await.unwrap_err(),
        ChatError::AlreadyTaken("alice".into())
    );
    assert!(matches!(
        mallory.claim_handle("a!").await,
        Err(ChatError::InvalidHandle(_))
    ));
}

#[tokio::test]
async fn start_conversation_validates_the_peer() {
    let store = store();
    let seeds = FakeSeeds::new();
    let alice = inbox(&store, "uid-a", seeds.clone(), FakeAgreement::new());
    alice.claim_handle("alice").await.unwrap();

    assert_eq!(
        alice.start_conversation("nobody").await.unwrap_err(),
        ChatError::UnknownHandle("nobody".into())
    );
    assert_eq!(
        alice.start_conversation("@alice").await.unwrap_err(),
        ChatError::SelfConversation
    );
    assert_eq!(seeds.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn seed_outage_creates_nothing() {
    let store = store();
    let seeds = FakeSeeds::new();
    seeds.fail.store(true, Ordering::SeqCst);
    let alice = inbox(&store, "uid-a", seeds, FakeAgreement::new());
    let bob = inbox(&store, "uid-b", FakeSeeds::new(), FakeAgreement::new());
    bob.claim_handle("bob").await.unwrap();

    assert!(matches!(
        alice.start_conversation("bob").await,
        Err(ChatError::SourceUnavailable(_))
    ));
    assert!(alice.refresh().await.unwrap().is_empty());
}

#[tokio::test]
async fn one_conversation_per_pair() {
    let store = store();
    let alice = inbox(&store, "uid-a", FakeSeeds::new(), FakeAgreement::new());
    let bob = inbox(&store, "uid-b", FakeSeeds::new(), FakeAgreement::new());
    alice.claim_handle("alice").await.unwrap();
    bob.claim_handle("bob").await.unwrap();

    let first = alice.start_conversation("bob").await.unwrap();
    assert_eq!(first.seed.len(), 32);
    assert_eq!(alice.unread().tracked(), [first.id.clone()]);
    assert_eq!(alice.unread().unread_count(&first.id), 0);

    let second = bob.start_conversation("alice").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.seed, second.seed);
}

#[tokio::test]
async fn unread_counts_peer_messages_until_opened() {
    let store = store();
    let agreement = FakeAgreement::new();
    let alice = inbox(&store, "uid-a", FakeSeeds::new(), agreement.clone());
    let bob = inbox(&store, "uid-b", FakeSeeds::new(), agreement.clone());
    bob.claim_handle("bob").await.unwrap();

    let conv = alice.start_conversation("bob").await.unwrap();
    let listed = bob.refresh().await.unwrap();
    assert_eq!(listed.len(), 1);

    let from_alice = session(&store, &conv.id, "uid-a", agreement.clone());
    from_alice.open().await.unwrap();
    from_alice.send("ping").await.unwrap();
    from_alice.send("ping again").await.unwrap();

    wait_unread(bob.unread(), &conv.id, 2).await;
    // Own messages never count.
    assert_eq!(alice.unread().unread_count(&conv.id), 0);

    let opened = bob.open_conversation(&conv.id).await.unwrap();
    assert_eq!(opened.info.peer, user("uid-a"));
    wait_unread(bob.unread(), &conv.id, 0).await;

    // Past the watermark written by the open.
    tick().await;
    from_alice.send("after opening").await.unwrap();
    wait_unread(bob.unread(), &conv.id, 1).await;

    opened.close();
    bob.shutdown().await;
    alice.shutdown().await;
}

#[tokio::test]
async fn opening_clears_a_burst_stamped_ahead_of_the_local_clock() {
    let store = store();
    let agreement = FakeAgreement::new();
    let alice = inbox(&store, "uid-a", FakeSeeds::new(), agreement.clone());
    let bob = inbox(&store, "uid-b", FakeSeeds::new(), agreement);
    bob.claim_handle("bob").await.unwrap();

    let conv = alice.start_conversation("bob").await.unwrap();
    bob.refresh().await.unwrap();

    // Same requested stamp for every append; the store spreads them past it.
    let ahead = now_millis() + 60_000;
    for (i, tag) in [1u8, 2, 3].into_iter().enumerate() {
        store
            .database()
            .insert_message(
                &format!("burst-{i}"),
                &conv.id,
                &UserId::new("uid-a"),
                &[tag; 12],
                &[tag; 20],
                ahead,
            )
            .unwrap()
            .unwrap();
    }
    wait_unread(bob.unread(), &conv.id, 3).await;

    let opened = bob.open_conversation(&conv.id).await.unwrap();
    assert_eq!(bob.unread().unread_count(&conv.id), 0);

    // Re-tracking replays the history against the persisted watermark.
    bob.unread().untrack(&conv.id).await;
    bob.unread().track(&conv.id).await.unwrap();
    store
        .database()
        .insert_message("late", &conv.id, &UserId::new("uid-a"), &[9; 12], &[9; 20], now_millis())
        .unwrap()
        .unwrap();
    wait_unread(bob.unread(), &conv.id, 1).await;

    opened.close();
    bob.shutdown().await;
    alice.shutdown().await;
}

#[tokio::test]
async fn refresh_releases_subscriptions_of_removed_conversations() {
    let store = store();
    let alice = inbox(&store, "uid-a", FakeSeeds::new(), FakeAgreement::new());
    let bob = inbox(&store, "uid-b", FakeSeeds::new(), FakeAgreement::new());
    bob.claim_handle("bob").await.unwrap();

    alice.start_conversation("bob").await.unwrap();
    assert_eq!(store.active_subscriptions(), 1);

    alice.unread().sync(&[]).await.unwrap();
    assert!(alice.unread().tracked().is_empty());
    assert_eq!(store.active_subscriptions(), 0);

    alice.refresh().await.unwrap();
    assert_eq!(store.active_subscriptions(), 1);
    alice.shutdown().await;
    assert_eq!(store.active_subscriptions(), 0);
}

#[tokio::test]
async fn peer_label_falls_back_without_a_handle() {
    let store = store();
    let alice = inbox(&store, "uid-a", FakeSeeds::new(), FakeAgreement::new());
    let bob = inbox(&store, "uid-b", FakeSeeds::new(), FakeAgreement::new());
    bob.claim_handle("bob").await.unwrap();

    let conv = alice.start_conversation("bob").await.unwrap();
    assert_eq!(alice.peer_label(&conv).await, "bob");
    assert_eq!(bob.peer_label(&conv).await, FALLBACK_PEER_LABEL);
}

#[tokio::test]
async fn opening_a_missing_conversation_fails() {
    let store = store();
    let alice = inbox(&store, "uid-a", FakeSeeds::new(), FakeAgreement::new());

    assert_eq!(
        alice.open_conversation("ghost").await.unwrap_err(),
        ChatError::NotFound("ghost".into())
    );
}
