// Tree synchronization tests - driver, session, loader and merge together

mod common;

use common::fakes::{ApiCall, FakeFileApi, FakeWatchConnector};
use lite_ide::file_tree::{
    loader, ConnectionState, ExpandStart, FetchOutcome, FileExplorer, SyncEvent, TreeWatchDriver,
};
use lite_ide::model::file_node::decode_nodes;
use lite_ide::model::FileNode;
use lite_ide::services::time_source::{SharedTimeSource, TestTimeSource};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DELAY: Duration = Duration::from_secs(3);

fn driver(connector: Arc<FakeWatchConnector>) -> (TreeWatchDriver, Arc<TestTimeSource>) {
    common::tracing::init_tracing_from_env();
    let time = TestTimeSource::shared();
    let shared: SharedTimeSource = time.clone();
    let driver = TreeWatchDriver::new(FileExplorer::new(100, DELAY), connector, shared);
    (driver, time)
}

fn snapshot() -> Vec<FileNode> {
    vec![FileNode::folder("src"), FileNode::file("README.md")]
}

#[test]
fn test_backoff_is_single_shot_per_interval() {
    let connector = FakeWatchConnector::failing();
    let (mut driver, time) = driver(connector.clone());

    driver.open_root("/work");
    assert_eq!(connector.subscriptions(), 1);

    for interval in 1..=5 {
        // The failure is handled; nothing reconnects before the delay.
        driver.process_pending();
        assert_eq!(driver.explorer().state(), ConnectionState::Backoff);
        assert_eq!(driver.open_transports(), 0);
        assert_eq!(driver.pending_timers(), 1);

        time.advance(DELAY - Duration::from_millis(1));
        driver.process_pending();
        assert_eq!(connector.subscriptions(), interval);

        time.advance(Duration::from_millis(1));
        driver.process_pending();
        assert_eq!(connector.subscriptions(), interval + 1);
    }

    assert!(connector.max_open.load(Ordering::SeqCst) <= 1);
}

#[test]
fn test_snapshots_applied_in_arrival_order() {
    let connector = FakeWatchConnector::silent();
    let (mut driver, _time) = driver(connector.clone());
    driver.open_root("/work");

    connector.emit(|attempt| SyncEvent::Connected { attempt });
    driver.process_pending();
    assert_eq!(driver.explorer().state(), ConnectionState::Connecting);

    connector.emit(|attempt| SyncEvent::SnapshotReceived {
        attempt,
        nodes: snapshot(),
    });
    connector.emit(|attempt| SyncEvent::SnapshotReceived {
        attempt,
        nodes: vec![FileNode::file("only.txt")],
    });
    assert!(driver.process_pending());

    assert_eq!(driver.explorer().state(), ConnectionState::Open);
    let tree = driver.explorer().tree();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].path, "only.txt");
}

#[test]
fn test_switching_root_replaces_subscription() {
    let connector = FakeWatchConnector::silent();
    let (mut driver, _time) = driver(connector.clone());

    driver.open_root("/a");
    driver.open_root("/b");

    assert_eq!(connector.subscriptions(), 2);
    assert_eq!(connector.open_handles(), 1);
    assert_eq!(driver.explorer().root(), Some("/b"));
}

#[test]
fn test_unmount_cancels_pending_reconnect() {
    let connector = FakeWatchConnector::failing();
    let (mut driver, time) = driver(connector.clone());
    driver.open_root("/work");
    driver.process_pending();
    assert_eq!(driver.pending_timers(), 1);

    driver.unmount();
    assert_eq!(driver.pending_timers(), 0);

    time.advance(DELAY * 4);
    driver.process_pending();
    assert_eq!(connector.subscriptions(), 1);
    assert_eq!(connector.open_handles(), 0);
}

#[tokio::test]
async fn test_expand_fetches_and_merges_subtree() {
    let connector = FakeWatchConnector::silent();
    let (mut driver, _time) = driver(connector.clone());
    let api = FakeFileApi::new();
    api.set_listing(Some("src"), vec![FileNode::file("src/main.rs")]);

    driver.open_root("/work");
    connector.emit(|attempt| SyncEvent::SnapshotReceived {
        attempt,
        nodes: snapshot(),
    });
    driver.process_pending();

    let outcome = driver.expand(api.as_ref(), "src").await.unwrap();
    assert_eq!(outcome, FetchOutcome::Applied);

    let src = driver.explorer().find("src").unwrap();
    assert!(src.loaded);
    assert_eq!(src.children().len(), 1);
    assert!(!src.has_more);
    assert!(driver.explorer().find("README.md").is_some());
    assert_eq!(
        api.calls(),
        vec![
            ApiCall::ExtendWatch("src".into()),
            ApiCall::ListDir(Some("src".into()))
        ]
    );

    // Already loaded: expanding again needs no request.
    driver.collapse("src");
    assert_eq!(
        driver.expand(api.as_ref(), "src").await.unwrap(),
        FetchOutcome::Applied
    );
    assert_eq!(api.calls().len(), 2);
}

#[tokio::test]
async fn test_fetch_for_previous_root_is_dropped() {
    let api = FakeFileApi::new();
    api.set_listing(Some("src"), vec![FileNode::file("src/lib.rs")]);

    let now = Instant::now();
    let mut explorer = FileExplorer::new(100, DELAY);
    let attempt = explorer
        .open_root("/one", now)
        .iter()
        .find_map(|c| match c {
            lite_ide::file_tree::SyncCommand::Subscribe { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .unwrap();
    explorer.handle_sync(
        SyncEvent::SnapshotReceived {
            attempt,
            nodes: snapshot(),
        },
        now,
    );

    let ticket = match explorer.begin_expand("src") {
        ExpandStart::Fetch(ticket) => ticket,
        other => panic!("expected fetch, got {:?}", other),
    };

    // The root changes while the request is in flight.
    explorer.open_root("/two", now);
    let result = loader::fetch(api.as_ref(), &ticket).await;
    assert_eq!(
        explorer.finish_expand(&ticket, result).unwrap(),
        FetchOutcome::Dropped
    );
    assert!(explorer.tree().is_empty());
    assert!(!explorer.is_expanded("src"));
}

#[tokio::test]
async fn test_refresh_replaces_whole_tree() {
    let connector = FakeWatchConnector::silent();
    let (mut driver, _time) = driver(connector.clone());
    let api = FakeFileApi::new();
    api.set_listing(None, vec![FileNode::file("fresh.txt")]);

    driver.open_root("/work");
    connector.emit(|attempt| SyncEvent::SnapshotReceived {
        attempt,
        nodes: snapshot(),
    });
    driver.process_pending();

    assert_eq!(
        driver.refresh(api.as_ref()).await.unwrap(),
        FetchOutcome::Applied
    );
    let tree = driver.explorer().tree();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].path, "fresh.txt");
    assert_eq!(api.calls(), vec![ApiCall::ListDir(None)]);
}

#[tokio::test]
async fn test_preview_folder_is_fetched_in_full() {
    let connector = FakeWatchConnector::silent();
    let (mut driver, _time) = driver(connector.clone());
    let api = FakeFileApi::new();
    let full: Vec<FileNode> = (0..12)
        .map(|i| FileNode::file(&format!("big/f{i}.txt")))
        .collect();
    api.set_listing(Some("big"), full);

    driver.open_root("/work");
    let preview = decode_nodes(
        r#"[{"name":"big","path":"/big","type":"folder","loaded":true,"hasMore":true,
             "children":[{"name":"f0.txt","path":"/big/f0.txt","type":"file"}]}]"#,
    )
    .unwrap();
    connector.emit(|attempt| SyncEvent::SnapshotReceived {
        attempt,
        nodes: preview,
    });
    driver.process_pending();

    assert_eq!(
        driver.expand(api.as_ref(), "big").await.unwrap(),
        FetchOutcome::Applied
    );
    assert_eq!(
        api.calls(),
        vec![
            ApiCall::ExtendWatch("big".into()),
            ApiCall::ListDir(Some("big".into()))
        ]
    );
    let big = driver.explorer().find("big").unwrap();
    assert_eq!(big.children().len(), 12);
    assert!(!big.has_more);
    assert!(driver.explorer().is_expanded("big"));
}

#[tokio::test]
async fn test_abandoned_expand_can_be_retried() {
    let connector = FakeWatchConnector::silent();
    let (mut driver, _time) = driver(connector.clone());
    let api = FakeFileApi::new();
    api.set_listing(Some("src"), vec![FileNode::file("src/main.rs")]);

    driver.open_root("/work");
    connector.emit(|attempt| SyncEvent::SnapshotReceived {
        attempt,
        nodes: snapshot(),
    });
    driver.process_pending();

    api.stall_listings(true);
    let timed_out =
        tokio::time::timeout(Duration::from_millis(20), driver.expand(api.as_ref(), "src")).await;
    assert!(timed_out.is_err());
    assert!(!driver.explorer().loader().is_in_flight("src"));

    api.stall_listings(false);
    assert_eq!(
        driver.expand(api.as_ref(), "src").await.unwrap(),
        FetchOutcome::Applied
    );
    assert_eq!(driver.explorer().find("src").unwrap().children().len(), 1);
}
