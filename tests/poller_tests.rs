//! Poller decision-table integration tests.

mod common;

use std::time::Duration;

use livewatch::database::models::{AccountDbModel, LiveSessionDbModel, SessionStatus};
use livewatch::database::time::now_ms;
use livewatch::monitor::CheckOutcome;
use livewatch::transport::{LiveEvent, TransportError, UserContext};

use common::{MockTransport, apply_fast_settings, test_container, test_pool};

#[tokio::test]
async fn connected_supervisor_wins_over_probe() {
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

    // Give the supervisor a moment to establish the connection.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(container.sessions.is_supervisor_connected("somehandle"));
    let probes_before = transport.connect_count();

    let outcome = container.poller.check_account("somehandle").await;

    // False-alarm prevention: no probe, just a refresh at the online cadence.
    assert_eq!(transport.connect_count(), probes_before);
    assert!(matches!(outcome, CheckOutcome::Reschedule(_)));
    assert!(container.sessions.is_active("somehandle"));

    let account = container
        .store
        .accounts
        .get("somehandle")
        .await
        .unwrap()
        .unwrap();
    assert!(account.last_live_time.is_some());

    container.sessions.stop_monitoring("somehandle").await.unwrap();
}

#[tokio::test]
async fn offline_probe_ends_stale_session_pointer() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    // A pointer with no supervisor behind it (e.g. left by a crashed flow).
    let mut account = AccountDbModel::monitored("somehandle");
    let session = LiveSessionDbModel::new("somehandle", Some("room-1".to_string()));
    account.current_live_session_id = Some(session.id.clone());
    container.store.accounts.upsert(&account).await.unwrap();
    container.store.sessions.create(&session).await.unwrap();

    // No events in the feed: the probe connects, observes nothing within
    // the window, and reports offline.
    let outcome = container.poller.check_account("somehandle").await;
    assert!(matches!(outcome, CheckOutcome::Reschedule(_)));

    let account = container
        .store
        .accounts
        .get("somehandle")
        .await
        .unwrap()
        .unwrap();
    assert!(account.current_live_session_id.is_none());
    assert!(account.last_checked_at.is_some());

    let session = container
        .store
        .sessions
        .get(&session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Ended);
}

#[tokio::test]
async fn disabled_account_ends_the_chain() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    let mut account = AccountDbModel::new("somehandle");
    account.current_live_session_id = Some("ghost".to_string());
    container.store.accounts.upsert(&account).await.unwrap();

    let outcome = container.poller.check_account("somehandle").await;
    assert_eq!(outcome, CheckOutcome::Stop);
    // No probe happened for a disabled account.
    assert_eq!(transport.connect_count(), 0);

    let account = container
        .store
        .accounts
        .get("somehandle")
        .await
        .unwrap()
        .unwrap();
    assert!(account.current_live_session_id.is_none());
}

#[tokio::test]
async fn post_session_cooldown_skips_probe() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    let mut account = AccountDbModel::monitored("somehandle");
    account.last_session_end_time = Some(now_ms());
    container.store.accounts.upsert(&account).await.unwrap();

    let outcome = container.poller.check_account("somehandle").await;

    assert_eq!(transport.connect_count(), 0, "no probe inside the window");
    match outcome {
        CheckOutcome::Reschedule(delay) => {
            // Remainder of the default 90s window.
            assert!(delay <= Duration::from_secs(90));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn blocked_probe_records_cooldown_and_skips_next_check() {
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
    transport.fail_next_connect(TransportError::blocked(Some(4003), "device blocked"));

    let outcome = container.poller.check_account("somehandle").await;
    match outcome {
        CheckOutcome::Reschedule(delay) => {
            // Rescheduled past the 1h cooldown.
            assert!(delay >= Duration::from_secs(3600));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(container.blocks.is_in_cooldown("somehandle").await.unwrap());
    let record = container
        .store
        .blocks
        .get("somehandle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.block_count, 1);
    assert_eq!(record.cooldown_hours, 1.0);

    // The follow-up check skips the probe entirely.
    let probes_before = transport.connect_count();
    let outcome = container.poller.check_account("somehandle").await;
    assert_eq!(transport.connect_count(), probes_before);
    assert!(matches!(outcome, CheckOutcome::Reschedule(_)));
}

#[tokio::test]
async fn live_probe_starts_monitoring() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-7");
    let container = test_container(pool, transport.clone());
    apply_fast_settings(&container.store).await;

    container
        .store
        .accounts
        .upsert(&AccountDbModel::monitored("somehandle"))
        .await
        .unwrap();
    transport.feed_event(LiveEvent::chat("c1", UserContext::new("u", "n"), "hello"));

    let outcome = container.poller.check_account("somehandle").await;
    assert!(matches!(outcome, CheckOutcome::Reschedule(_)));
    assert!(container.sessions.is_active("somehandle"));

    let session_id = container.sessions.active_session_id("somehandle").unwrap();
    let session = container
        .store
        .sessions
        .get(&session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Live);
    assert_eq!(session.room_id.as_deref(), Some("room-7"));

    let account = container
        .store
        .accounts
        .get("somehandle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.current_live_session_id.as_deref(), Some(session_id.as_str()));

    container.sessions.stop_monitoring("somehandle").await.unwrap();
}
