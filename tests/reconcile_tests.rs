//! Startup reconciliation and block cooldown integration tests.

mod common;

use livewatch::database::models::{
    AccountDbModel, LiveSessionDbModel, SessionStats, SessionStatus,
};
use livewatch::database::time::now_ms;

use common::{MockTransport, test_container, test_pool};

#[tokio::test]
async fn reconcile_force_ends_stale_live_sessions() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport);

    // State a crashed process would leave behind: a LIVE session row and an
    // account still pointing at it.
    let mut account = AccountDbModel::monitored("y");
    let mut session = LiveSessionDbModel::new("y", Some("room-2".to_string()));
    session.id = "S2".to_string();
    account.current_live_session_id = Some("S2".to_string());
    container.store.accounts.upsert(&account).await.unwrap();
    container.store.sessions.create(&session).await.unwrap();
    container
        .store
        .sessions
        .apply_stats_delta(
            "S2",
            &SessionStats {
                total_gifts: 3,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let before = now_ms();
    container.sessions.reconcile().await.unwrap();

    let session = container.store.sessions.get("S2").await.unwrap().unwrap();
    assert_eq!(session.status(), SessionStatus::Ended);
    assert!(session.end_time.is_some());

    let account = container.store.accounts.get("y").await.unwrap().unwrap();
    assert!(account.current_live_session_id.is_none());
    let end_stamp = account.last_session_end_time.expect("cooldown anchor set");
    assert!(end_stamp >= before);

    // The pre-crash counters survive in a final snapshot.
    let snapshots = container.store.events.list_snapshots("S2").await.unwrap();
    assert_eq!(snapshots.last().unwrap().stats.total_gifts, 3);

    assert_eq!(container.sessions.active_count(), 0);
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport);

    let mut account = AccountDbModel::monitored("y");
    let session = LiveSessionDbModel::new("y", None);
    account.current_live_session_id = Some(session.id.clone());
    container.store.accounts.upsert(&account).await.unwrap();
    container.store.sessions.create(&session).await.unwrap();

    container.sessions.reconcile().await.unwrap();
    let after_first = container.store.sessions.get(&session.id).await.unwrap().unwrap();

    container.sessions.reconcile().await.unwrap();
    let after_second = container.store.sessions.get(&session.id).await.unwrap().unwrap();

    assert_eq!(after_first.status(), SessionStatus::Ended);
    // The second pass must not touch the already-ended row.
    assert_eq!(after_first.end_time, after_second.end_time);

    let snapshots = container
        .store
        .events
        .list_snapshots(&session.id)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1, "only the first pass snapshots the session");
}

#[tokio::test]
async fn block_cooldown_doubles_and_caps() {
    let pool = test_pool().await;
    let transport = MockTransport::new("room-1");
    let container = test_container(pool, transport);

    container
        .store
        .accounts
        .upsert(&AccountDbModel::monitored("z"))
        .await
        .unwrap();

    // base=1h, max=72h defaults: 1, 2, 4, 8, 16, 32, 64, then capped at 72.
    let expected = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 72.0, 72.0];
    for (i, want) in expected.iter().enumerate() {
        let record = container.blocks.record_block("z", "device blocked").await.unwrap();
        assert_eq!(record.block_count, (i + 1) as i64);
        assert_eq!(record.cooldown_hours, *want, "block #{}", i + 1);
    }

    assert!(container.blocks.is_in_cooldown("z").await.unwrap());
    let remaining = container
        .blocks
        .remaining_cooldown("z")
        .await
        .unwrap()
        .expect("active cooldown");
    assert!(remaining.as_secs() > 71 * 3600);

    // Dismissal acknowledges without shortening the window.
    container.blocks.dismiss_warning("z").await.unwrap();
    assert!(container.blocks.is_in_cooldown("z").await.unwrap());
    let record = container.store.blocks.get("z").await.unwrap().unwrap();
    assert!(record.dismissed);

    // Confirmed recovery clears the record entirely.
    container.blocks.clear_block("z").await.unwrap();
    assert!(!container.blocks.is_in_cooldown("z").await.unwrap());
    assert!(container.store.blocks.get("z").await.unwrap().is_none());

    // The next block after a clear starts a fresh streak.
    let record = container.blocks.record_block("z", "blocked again").await.unwrap();
    assert_eq!(record.block_count, 1);
    assert_eq!(record.cooldown_hours, 1.0);
}
