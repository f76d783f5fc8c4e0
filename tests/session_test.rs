mod common;

use assert2::{check, let_assert};
use common::{GatedSource, gated, shard_t};
use doxysearch::{
    Bucket, Coverage, Keystroke, MemoryShardSource, QueryMatcher, Ranker, ResultSet,
    SearchSession, SessionState, ShardError, ShardStore,
};
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn session_over(source: &Arc<GatedSource>) -> SearchSession {
    SearchSession::new(
        ShardStore::new(Arc::<GatedSource>::clone(source)),
        QueryMatcher::default(),
        Ranker::default(),
    )
}

fn keys(results: &ResultSet) -> Vec<&str> {
    results.groups.iter().map(|g| g.key.as_str()).collect()
}

// --- Ordering ---

/// "t", "tr", "tra" typed quickly; the "t" completion arrives last and must
/// not replace the "tra" results.
#[rstest]
#[tokio::test]
async fn stale_prefix_never_overwrites_newer_results(gated: GatedSource) {
    let source = Arc::new(gated);
    let session = session_over(&source);

    let_assert!(Keystroke::Pending(t) = session.begin("t"));
    let_assert!(Keystroke::Pending(tr) = session.begin("tr"));
    let_assert!(Keystroke::Pending(tra) = session.begin("tra"));
    check!(session.snapshot().state == SessionState::Loading);
    check!(session.snapshot().query == "tra");

    source.open('t');
    let_assert!(Some(latest) = session.complete(tra).await);
    check!(latest.total == 14);
    check!(session.complete(tr).await.is_none());
    check!(session.complete(t).await.is_none());

    let snapshot = session.snapshot();
    check!(snapshot.seq == 3);
    check!(snapshot.query == "tra");
    check!(snapshot.state == SessionState::Ready);
    check!(Arc::ptr_eq(&snapshot.results, &latest));
}

#[rstest]
#[tokio::test]
async fn late_load_for_another_bucket_is_discarded(gated: GatedSource) {
    let source = Arc::new(gated);
    let session = session_over(&source);

    let_assert!(Keystroke::Pending(stale) = session.begin("singlepp"));
    let_assert!(Keystroke::Pending(fresh) = session.begin("tra"));
    check!(stale.buckets == [Bucket::new('s')]);
    check!(fresh.buckets == [Bucket::new('t')]);

    source.open('t');
    let_assert!(Some(_) = session.complete(fresh).await);
    source.open('s');
    check!(session.complete(stale).await.is_none());

    check!(session.snapshot().query == "tra");
    // the discarded query's shard is merged for later use
    check!(session.loaded_buckets() == [Bucket::new('s'), Bucket::new('t')]);
    let_assert!(Keystroke::Ready(results) = session.begin("singlepp"));
    check!(keys(&results) == ["singlepp"]);
}

#[rstest]
#[tokio::test]
async fn subscribers_see_loading_then_ready(gated: GatedSource) {
    let source = Arc::new(gated);
    let session = session_over(&source);
    let mut events = session.subscribe();

    let_assert!(Keystroke::Pending(pending) = session.begin("top"));
    check!(events.has_changed().unwrap_or(false));
    check!(events.borrow_and_update().state == SessionState::Loading);

    source.open('t');
    let_assert!(Some(_) = session.complete(pending).await);
    let snapshot = events.borrow_and_update().clone();
    check!(snapshot.state == SessionState::Ready);
    check!(keys(&snapshot.results) == ["top"]);
    check!(snapshot.error.is_none());
}

// --- Matching against the generator's shard ---

#[rstest]
#[tokio::test]
async fn ranks_the_real_shard(gated: GatedSource) {
    let source = Arc::new(gated);
    source.open('t');
    let session = session_over(&source);

    let_assert!(Some(results) = session.input("tra").await);
    let leading: Vec<&str> = keys(&results).into_iter().take(6).collect();
    check!(
        leading
            == [
                "trainer",
                "transpose",
                "train_single",
                "trainedsingle",
                "transpose.hpp",
                "train_integrated",
            ]
    );
    check!(results.total == 14);
    check!(!results.truncated);

    let_assert!(Some(results) = session.input("total").await);
    check!(results.groups[0].exact);
    check!(results.groups[0].entries.len() == 4);
}

#[rstest]
#[tokio::test]
async fn scope_qualifier_filters_overloads(gated: GatedSource) {
    let source = Arc::new(gated);
    source.open('t');
    source.open('s');
    let session = session_over(&source);

    let_assert!(Some(results) = session.input("tatami::Oracle::total").await);
    check!(keys(&results) == ["total"]);
    let scopes: Vec<_> = results
        .entries()
        .map(|(entry, _)| entry.scope.clone())
        .collect();
    check!(scopes == [Some("tatami::Oracle".to_string())]);

    let_assert!(Some(results) = session.input("singlepp::train").await);
    for expected in ["trainedsingle", "trainedintegrated", "train_single", "train_integrated"] {
        check!(keys(&results).contains(&expected));
    }
    check!(!keys(&results).contains(&"transpose"));
    check!(!keys(&results).contains(&"train_single.hpp"));
    check!(results.coverage == Coverage::Complete);
}

// --- Failure and timeout ---

#[rstest]
#[tokio::test(start_paused = true)]
async fn timed_out_load_gives_partial_results_and_retries(gated: GatedSource) {
    let source = Arc::new(gated);
    let fetches = source.fetches();
    let session = SearchSession::new(
        ShardStore::new(Arc::<GatedSource>::clone(&source)).with_load_timeout(Duration::from_millis(250)),
        QueryMatcher::default(),
        Ranker::default(),
    );

    let_assert!(Some(results) = session.input("tr").await);
    check!(results.is_empty());
    check!(results.coverage == Coverage::Partial { missing: vec![Bucket::new('t')] });
    let snapshot = session.snapshot();
    check!(snapshot.state == SessionState::Idle);
    let_assert!(Some(ShardError::TimedOut { bucket, .. }) = snapshot.error);
    check!(bucket == Bucket::new('t'));

    source.open('t');
    let_assert!(Some(results) = session.input("tr").await);
    check!(!results.is_partial());
    check!(results.total == 14);
    check!(fetches.load(Ordering::SeqCst) == 2);
}

// --- Event loop ---

#[tokio::test(start_paused = true)]
async fn run_coalesces_rapid_keystrokes() {
    let source = MemoryShardSource::new().with_payload('t', shard_t());
    let session = Arc::new(
        SearchSession::new(
            ShardStore::new(Arc::new(source)),
            QueryMatcher::default(),
            Ranker::default(),
        )
        .with_debounce(Duration::from_millis(100)),
    );
    let (tx, rx) = mpsc::channel(16);
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.run(rx, CancellationToken::new()).await }
    });
    let mut events = session.subscribe();

    for key in ["t", "tr", "tra"] {
        tx.send(key.to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    let snapshot = events
        .wait_for(|s| s.state == SessionState::Ready)
        .await
        .unwrap()
        .clone();
    check!(snapshot.query == "tra");
    check!(snapshot.seq == 1);

    tx.send("to".to_string()).await.unwrap();
    tx.send("top".to_string()).await.unwrap();
    drop(tx);
    runner.await.unwrap();

    let snapshot = session.snapshot();
    check!(snapshot.query == "top");
    check!(snapshot.seq == 2);
    check!(keys(&snapshot.results) == ["top"]);
}

#[rstest]
#[tokio::test]
async fn cancellation_stops_the_loop_while_loading(gated: GatedSource) {
    let source = Arc::new(gated);
    let session = Arc::new(session_over(&source).with_debounce(Duration::ZERO));
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(4);
    let runner = tokio::spawn({
        let session = Arc::clone(&session);
        let cancel = cancel.clone();
        async move { session.run(rx, cancel).await }
    });

    let mut events = session.subscribe();
    tx.send("tra".to_string()).await.unwrap();
    check!(events.wait_for(|s| s.state == SessionState::Loading).await.is_ok());

    cancel.cancel();
    runner.await.unwrap();
    check!(session.snapshot().state == SessionState::Loading);
    check!(source.fetches().load(Ordering::SeqCst) == 1);
}
