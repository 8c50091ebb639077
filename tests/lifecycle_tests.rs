//! Session lifecycle integration tests: idempotent starts, buffering and
//! flush completeness, counter aggregation, and alerting.

mod common;

use std::time::Duration;

use livewatch::database::models::{AccountDbModel, LiveEventDbModel, SessionStatus, TriggerWordDbModel};
use livewatch::monitor::MonitorEvent;
use livewatch::transport::{EventKind, LiveEvent, UserContext};

use common::{MockTransport, apply_fast_settings, test_container, test_pool};

#[tokio::test]
async fn idempotent_start_creates_one_session() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    container
        .store
        .accounts
        .upsert(&AccountDbModel::monitored("somehandle"))
        .await
        .unwrap();

    container
        .sessions
        .start_monitoring("somehandle", "room-1")
        .await
        .unwrap();
    container
        .sessions
        .start_monitoring("somehandle", "room-1")
        .await
        .unwrap();

    assert_eq!(container.sessions.active_count(), 1);
    let sessions = container
        .store
        .sessions
        .list_for_account("somehandle", 10)
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1, "double start must not create a second row");

    container.sessions.stop_monitoring("somehandle").await.unwrap();
    assert_eq!(container.sessions.active_count(), 0);
}

#[tokio::test]
async fn stop_monitoring_flushes_all_buffered_events() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    container
        .store
        .accounts
        .upsert(&AccountDbModel::monitored("somehandle"))
        .await
        .unwrap();
    container
        .sessions
        .start_monitoring("somehandle", "room-1")
        .await
        .unwrap();
    let session_id = container
        .sessions
        .active_session_id("somehandle")
        .expect("active session");

    for i in 0..5 {
        transport.feed_event(LiveEvent::chat(
            format!("evt-{i}"),
            UserContext::new("u1", "viewer"),
            format!("message {i}"),
        ));
    }
    // Let the events travel supervisor -> session task buffer.
    tokio::time::sleep(Duration::from_millis(300)).await;

    container.sessions.stop_monitoring("somehandle").await.unwrap();

    let count = container
        .store
        .events
        .count_for_session(&session_id)
        .await
        .unwrap();
    assert_eq!(count, 5, "every buffered event must be durable after stop");

    let session = container
        .store
        .sessions
        .get(&session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Ended);
    assert!(session.end_time.is_some());
    assert_eq!(session.stats.total_messages, 5);

    // The end-of-session snapshot reflects every increment applied before stop.
    let snapshots = container
        .store
        .events
        .list_snapshots(&session_id)
        .await
        .unwrap();
    let last = snapshots.last().expect("final snapshot");
    assert_eq!(last.stats.total_messages, 5);

    let account = container
        .store
        .accounts
        .get("somehandle")
        .await
        .unwrap()
        .unwrap();
    assert!(account.current_live_session_id.is_none());
    assert!(account.last_session_end_time.is_some());
}

#[tokio::test]
async fn live_probe_then_gifts_then_stop_scenario() {
    let pool = test_pool().await;
    let transport = MockTransport::new("42");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    container
        .store
        .accounts
        .upsert(&AccountDbModel::monitored("x"))
        .await
        .unwrap();

    // Two chat events within the probe window make the account live.
    transport.feed_event(LiveEvent::chat("p1", UserContext::new("u", "a"), "hi"));
    transport.feed_event(LiveEvent::chat("p2", UserContext::new("u", "b"), "yo"));

    let prober = livewatch::monitor::LivenessProber::new(
        transport.clone(),
        container.settings.clone(),
    );
    let outcome = prober.probe("x", None).await;
    assert!(outcome.is_live);
    assert_eq!(outcome.room_id.as_deref(), Some("42"));
    assert!(!outcome.blocked);

    container.sessions.start_monitoring("x", "42").await.unwrap();
    let session_id = container.sessions.active_session_id("x").unwrap();

    for i in 0..3 {
        transport.feed_event(LiveEvent::gift(
            format!("gift-{i}"),
            UserContext::new("u2", "fan"),
            "rose",
            1,
        ));
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    container.sessions.stop_monitoring("x").await.unwrap();

    let session = container
        .store
        .sessions
        .get(&session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Ended);
    assert_eq!(session.stats.total_gifts, 3);

    let snapshots = container
        .store
        .events
        .list_snapshots(&session_id)
        .await
        .unwrap();
    assert_eq!(snapshots.last().unwrap().stats.total_gifts, 3);

    let account = container.store.accounts.get("x").await.unwrap().unwrap();
    assert!(account.last_session_end_time.is_some());
}

#[tokio::test]
async fn event_inserts_are_idempotent_and_fk_checked() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport);

    container
        .store
        .accounts
        .upsert(&AccountDbModel::monitored("somehandle"))
        .await
        .unwrap();
    let session = livewatch::database::models::LiveSessionDbModel::new("somehandle", None);
    container.store.sessions.create(&session).await.unwrap();

    let event = LiveEvent::chat("dup-1", UserContext::new("u", "n"), "hello");
    let row = LiveEventDbModel::from_live_event(session.id.as_str(), &event);

    let first = container.store.events.insert_events(&[row.clone()]).await.unwrap();
    let second = container.store.events.insert_events(&[row]).await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 0, "duplicate id must be a no-op");
    assert_eq!(
        container.store.events.count_for_session(&session.id).await.unwrap(),
        1
    );

    // An event pointing at a missing session is refused outright.
    let orphan = LiveEventDbModel::from_live_event("no-such-session", &event);
    assert!(container.store.events.insert_events(&[orphan]).await.is_err());
}

#[tokio::test]
async fn stream_end_finalizes_session_without_stop_call() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    container
        .store
        .accounts
        .upsert(&AccountDbModel::monitored("somehandle"))
        .await
        .unwrap();
    container
        .sessions
        .start_monitoring("somehandle", "room-1")
        .await
        .unwrap();
    let session_id = container.sessions.active_session_id("somehandle").unwrap();

    transport.feed_event(LiveEvent::chat("e1", UserContext::new("u", "n"), "bye"));
    transport.feed_event(LiveEvent::of_kind("e2", EventKind::StreamEnd));

    // The supervisor terminates cleanly and the session task finalizes on
    // its own; poll until the row flips and the registry entry is gone.
    let mut finalized = false;
    for _ in 0..50 {
        let session = container
            .store
            .sessions
            .get(&session_id)
            .await
            .unwrap()
            .unwrap();
        if session.status() == SessionStatus::Ended && !container.sessions.is_active("somehandle")
        {
            finalized = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(finalized, "stream end must finalize the session");

    let account = container
        .store
        .accounts
        .get("somehandle")
        .await
        .unwrap()
        .unwrap();
    assert!(account.current_live_session_id.is_none());
    assert_eq!(
        container
            .store
            .events
            .count_for_session(&session_id)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn chat_with_trigger_word_raises_alert() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    container
        .store
        .accounts
        .upsert(&AccountDbModel::monitored("somehandle"))
        .await
        .unwrap();
    container
        .store
        .triggers
        .insert(&TriggerWordDbModel::new("giveaway"))
        .await
        .unwrap();
    container.alerts.reload().await.unwrap();

    let mut events = container.subscribe();
    container
        .sessions
        .start_monitoring("somehandle", "room-1")
        .await
        .unwrap();

    transport.feed_event(LiveEvent::chat(
        "c1",
        UserContext::new("u1", "fan"),
        "big GIVEAWAY at 9pm",
    ));

    let word = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::AlertTriggered { word, .. }) => break word,
                Ok(_) => continue,
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .expect("alert within timeout");
    assert_eq!(word, "giveaway");

    container.sessions.stop_monitoring("somehandle").await.unwrap();
}
