//! Delta fetcher behaviour against in-memory ports

mod support;

use std::sync::Arc;

use calmirror_core::{DeltaFetcher, FetchSettings, Reconciliation, SyncEngine, SyncCoordinator, SyncHealth};
use calmirror_domain::{CalMirrorError, ChannelState, EventStatus, ProviderError, SyncChannel};
use chrono::Duration;
use support::remote::{page, week_after};
use support::{
    active_channel, caller, cancelled, confirmed, mirror_row, t0, FixedClock, InMemoryStore, ScriptedRemote,
};

struct Harness {
    store: Arc<InMemoryStore>,
    remote: Arc<ScriptedRemote>,
    clock: Arc<FixedClock>,
    health: Arc<SyncHealth>,
    fetcher: Arc<DeltaFetcher>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let remote = Arc::new(ScriptedRemote::new(week_after(t0())));
    let clock = Arc::new(FixedClock::new(t0()));
    let health = Arc::new(SyncHealth::new());
    let fetcher = Arc::new(DeltaFetcher::new(
        store.clone(),
        store.clone(),
        remote.clone(),
        caller(3),
        clock.clone(),
        health.clone(),
        FetchSettings::default(),
    ));
    Harness { store, remote, clock, health, fetcher }
}

#[tokio::test]
async fn multi_page_sync_commits_every_page_and_stores_final_token() {
    let h = harness();
    let channel = active_channel(&h.store, "primary", Some("T0"), week_after(t0()));
    h.remote
        .push_page(Ok(page(
            vec![confirmed("a", "Standup", t0()), confirmed("b", "Review", t0())],
            Some("p2"),
            None,
        )))
        .push_page(Ok(page(vec![confirmed("c", "Retro", t0())], None, Some("T1"))));

    let report = h.fetcher.sync(&channel.channel_id).await.expect("sync succeeds");

    assert_eq!(report.pages, 2);
    assert_eq!(report.events_applied, 3);
    assert!(report.sync_token_advanced);
    assert!(!report.full_resync);

    let stored = h.store.channel(&channel.channel_id);
    assert_eq!(stored.sync_token.as_deref(), Some("T1"));
    assert!(stored.page_token.is_none());
    assert_eq!(h.store.event_count(), 3);

    let queries = h.remote.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].sync_token.as_deref(), Some("T0"));
    assert!(queries[0].page_token.is_none());
    assert_eq!(queries[1].sync_token.as_deref(), Some("T0"));
    assert_eq!(queries[1].page_token.as_deref(), Some("p2"));
}

#[tokio::test]
async fn crash_between_pages_keeps_old_token_and_resumes_from_cursor() {
    let h = harness();
    let channel = active_channel(&h.store, "primary", Some("T0"), week_after(t0()));
    h.remote
        .push_page(Ok(page(vec![confirmed("a", "Standup", t0())], Some("p2"), None)))
        .push_page(Ok(page(vec![confirmed("b", "Review", t0())], None, Some("T1"))));
    h.store.fail_commits_after(1);

    let err = h.fetcher.sync(&channel.channel_id).await.expect_err("second commit fails");
    assert!(matches!(err, CalMirrorError::Database(_)));

    let stored = h.store.channel(&channel.channel_id);
    assert_eq!(stored.sync_token.as_deref(), Some("T0"));
    assert_eq!(stored.page_token.as_deref(), Some("p2"));
    assert!(h.store.event("a").is_some());
    assert!(h.store.event("b").is_none());

    h.store.heal();
    h.remote.push_page(Ok(page(vec![confirmed("b", "Review", t0())], None, Some("T1"))));
    h.fetcher.sync(&channel.channel_id).await.expect("resumed sync succeeds");

    let resumed = h.remote.queries().pop().expect("resume query");
    assert_eq!(resumed.sync_token.as_deref(), Some("T0"));
    assert_eq!(resumed.page_token.as_deref(), Some("p2"));
    assert_eq!(h.store.channel(&channel.channel_id).sync_token.as_deref(), Some("T1"));
    assert_eq!(h.store.event_count(), 2);
}

#[tokio::test]
async fn rejected_token_runs_one_full_resync_without_duplicates() {
    let h = harness();
    let channel = active_channel(&h.store, "primary", Some("T1"), week_after(t0()));
    let earlier = t0() - Duration::hours(2);
    h.store.put_event(mirror_row("a", "primary", "Standup", earlier));
    h.store.put_event(mirror_row("b", "primary", "Review", earlier));

    let mut a_again = confirmed("a", "Standup", earlier);
    a_again.start = Some(earlier + Duration::days(1));
    a_again.end = Some(earlier + Duration::days(1) + Duration::hours(1));
    a_again.view_link = None;
    h.remote
        .push_page(Err(ProviderError::InvalidSyncToken))
        .push_page(Ok(page(vec![a_again, cancelled("b", t0())], None, Some("T2"))));

    let report = h.fetcher.sync(&channel.channel_id).await.expect("resync succeeds");

    assert!(report.full_resync);
    assert_eq!(report.events_applied, 1);
    assert_eq!(report.events_skipped, 1);
    assert_eq!(h.store.event_count(), 2);

    let b = h.store.event("b").expect("b kept as tombstone");
    assert_eq!(b.status, EventStatus::Cancelled);
    assert_eq!(b.summary.as_deref(), Some("Review"));

    let queries = h.remote.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries[1].is_full());
    assert_eq!(queries[1].time_min, Some(t0()));
    assert_eq!(h.store.channel(&channel.channel_id).sync_token.as_deref(), Some("T2"));
}

#[tokio::test]
async fn second_token_rejection_in_one_run_is_returned() {
    let h = harness();
    let channel = active_channel(&h.store, "primary", Some("T1"), week_after(t0()));
    h.remote
        .push_page(Err(ProviderError::InvalidSyncToken))
        .push_page(Err(ProviderError::InvalidSyncToken));

    let err = h.fetcher.sync(&channel.channel_id).await.expect_err("no second resync");

    assert_eq!(err.provider(), Some(&ProviderError::InvalidSyncToken));
    assert_eq!(h.remote.queries().len(), 2);
    assert!(h.store.channel(&channel.channel_id).sync_token.is_none());
}

#[tokio::test]
async fn exhausted_retries_leave_token_untouched() {
    let h = harness();
    let channel = active_channel(&h.store, "primary", Some("T0"), week_after(t0()));

    let err = h.fetcher.sync(&channel.channel_id).await.expect_err("provider unavailable");

    assert!(matches!(err.provider(), Some(ProviderError::RetriesExhausted { attempts: 3, .. })));
    assert_eq!(h.remote.queries().len(), 3);
    assert_eq!(h.store.channel(&channel.channel_id).sync_token.as_deref(), Some("T0"));
    assert!(!h.health.is_degraded());
}

#[tokio::test]
async fn auth_failure_is_not_retried_and_degrades_health() {
    let h = harness();
    let channel = active_channel(&h.store, "primary", Some("T0"), week_after(t0()));
    h.remote.push_page(Err(ProviderError::AuthFailure { message: "invalid_grant".into() }));

    let err = h.fetcher.sync(&channel.channel_id).await.expect_err("auth rejected");

    assert!(matches!(err.provider(), Some(ProviderError::AuthFailure { .. })));
    assert_eq!(h.remote.queries().len(), 1);
    assert!(h.health.is_degraded());

    h.remote.push_page(Ok(page(Vec::new(), None, Some("T1"))));
    h.fetcher.sync(&channel.channel_id).await.expect("recovered");
    assert!(!h.health.is_degraded());
}

#[tokio::test]
async fn missing_channel_yields_not_found() {
    let h = harness();
    let err = h.fetcher.sync("calendar-missing").await.expect_err("unknown channel");
    assert!(matches!(err, CalMirrorError::NotFound(_)));
}

#[tokio::test]
async fn older_remote_echo_does_not_clobber_local_write() {
    let h = harness();
    let channel = active_channel(&h.store, "primary", Some("T0"), week_after(t0()));
    let engine = SyncEngine::new(
        h.store.clone(),
        h.fetcher.clone(),
        SyncCoordinator::new(h.fetcher.clone()),
        h.clock.clone(),
    );

    let local = mirror_row("a", "primary", "Renamed locally", t0() + Duration::minutes(5));
    let outcome = engine.apply_local_write(local).await.expect("local write");
    assert!(matches!(outcome, Reconciliation::Insert(_)));

    h.remote.push_page(Ok(page(vec![confirmed("a", "Old title", t0())], None, Some("T1"))));
    let report = h.fetcher.sync(&channel.channel_id).await.expect("sync");

    assert_eq!(report.events_skipped, 1);
    assert_eq!(h.store.event("a").and_then(|e| e.summary).as_deref(), Some("Renamed locally"));
    assert_eq!(h.store.channel(&channel.channel_id).sync_token.as_deref(), Some("T1"));
}

#[tokio::test]
async fn refresh_of_deleted_event_cancels_existing_row() {
    let h = harness();
    h.store.put_event(mirror_row("a", "primary", "Standup", t0() - Duration::hours(1)));

    let outcome = h.fetcher.refresh_event("primary", "a").await.expect("refresh");
    assert!(matches!(outcome, Reconciliation::Update(_)));
    assert!(h.store.event("a").expect("row kept").is_cancelled());

    let outcome = h.fetcher.refresh_event("primary", "never-seen").await.expect("refresh");
    assert_eq!(outcome, Reconciliation::Unchanged);
    assert!(h.store.event("never-seen").is_none());
}

/// Swap `old` for `replacement` the way `swap_live` does, inheriting cursors
fn swap_in(store: &InMemoryStore, old_id: &str, replacement_id: &str) {
    let mut old = store.channel(old_id);
    let mut replacement = store.channel(replacement_id);
    old.state = ChannelState::Deactivated;
    replacement.state = ChannelState::Active;
    replacement.resource_id = Some("res-next".to_string());
    replacement.sync_token.clone_from(&old.sync_token);
    replacement.page_token.clone_from(&old.page_token);
    store.put_channel(old);
    store.put_channel(replacement);
}

fn registering_replacement(store: &InMemoryStore, target_id: &str) -> SyncChannel {
    let channel = SyncChannel::registering(target_id, week_after(t0()), t0());
    store.put_channel(channel.clone());
    channel
}

#[tokio::test]
async fn renewal_mid_run_hands_over_to_replacement_cursor() {
    let h = harness();
    let old = active_channel(&h.store, "primary", Some("T0"), week_after(t0()));
    let replacement = registering_replacement(&h.store, "primary");
    {
        let store = h.store.clone();
        let (old_id, new_id) = (old.channel_id.clone(), replacement.channel_id.clone());
        h.remote.on_list_call(1, move || swap_in(&store, &old_id, &new_id));
    }
    h.remote
        .push_page(Ok(page(vec![confirmed("a", "Standup", t0())], Some("p2"), None)))
        .push_page(Ok(page(vec![confirmed("b", "Review", t0())], None, Some("T1"))))
        .push_page(Ok(page(vec![confirmed("b", "Review", t0())], None, Some("T1"))));

    let report = h.fetcher.sync(&old.channel_id).await.expect("sync hands over");

    assert_eq!(report.channel_id, replacement.channel_id);
    assert!(report.sync_token_advanced);

    let retired = h.store.channel(&old.channel_id);
    assert_eq!(retired.sync_token.as_deref(), Some("T0"), "retired row takes no further cursor");
    let live = h.store.channel(&replacement.channel_id);
    assert_eq!(live.sync_token.as_deref(), Some("T1"));
    assert!(live.page_token.is_none());

    let queries = h.remote.queries();
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[2].sync_token.as_deref(), Some("T0"));
    assert_eq!(queries[2].page_token.as_deref(), Some("p2"));
    assert_eq!(h.store.event_count(), 2);
}

#[tokio::test]
async fn channel_retired_mid_run_stops_without_writing_further_pages() {
    let h = harness();
    let channel = active_channel(&h.store, "primary", Some("T0"), week_after(t0()));
    {
        let store = h.store.clone();
        let id = channel.channel_id.clone();
        h.remote.on_list_call(1, move || {
            let mut row = store.channel(&id);
            row.state = ChannelState::Deactivated;
            store.put_channel(row);
        });
    }
    h.remote
        .push_page(Ok(page(vec![confirmed("a", "Standup", t0())], Some("p2"), None)))
        .push_page(Ok(page(vec![confirmed("b", "Review", t0())], None, Some("T1"))));

    h.fetcher.sync(&channel.channel_id).await.expect("stops quietly");

    assert_eq!(h.store.channel(&channel.channel_id).sync_token.as_deref(), Some("T0"));
    assert!(h.store.event("b").is_none());
    assert_eq!(h.remote.queries().len(), 2);
}

#[tokio::test]
async fn sync_of_renewed_channel_runs_on_its_successor() {
    let h = harness();
    let old = active_channel(&h.store, "primary", Some("T0"), week_after(t0()));
    let replacement = registering_replacement(&h.store, "primary");
    swap_in(&h.store, &old.channel_id, &replacement.channel_id);
    h.remote.push_page(Ok(page(vec![], None, Some("T1"))));

    let report = h.fetcher.sync(&old.channel_id).await.expect("successor synced");

    assert_eq!(report.channel_id, replacement.channel_id);
    assert_eq!(h.store.channel(&replacement.channel_id).sync_token.as_deref(), Some("T1"));

    let mut retired = h.store.channel(&old.channel_id);
    retired.target_id = "orphan".to_string();
    h.store.put_channel(retired);
    let err = h.fetcher.sync(&old.channel_id).await.expect_err("no live successor");
    assert!(matches!(err, CalMirrorError::InvalidInput(_)));
}
