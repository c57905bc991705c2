use async_trait::async_trait;
use linkdeck_cache::{LocalCache, MemoryStore, DEFAULT_KEY_PREFIX};
use linkdeck_state::{Limits, LinkRecord, StatePatch};
use linkdeck_sync::{
    BootstrapOutcome, PushOutcome, PushRequest, RemoteError, RemoteStore, SyncCoordinator,
    SyncError, DEFAULT_DEBOUNCE,
};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;

mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteStore for Remote {
        async fn fetch(&self) -> Result<Option<Value>, RemoteError>;
        async fn push(&self, request: PushRequest) -> Result<Value, RemoteError>;
    }
}

fn coordinator(remote: MockRemote) -> SyncCoordinator {
    let cache = Arc::new(LocalCache::open(
        Arc::new(MemoryStore::new()),
        DEFAULT_KEY_PREFIX,
        Limits::default(),
    ));
    SyncCoordinator::new(cache, Arc::new(remote), DEFAULT_DEBOUNCE)
}

fn add_local_link(sync: &SyncCoordinator, url: &str) {
    let cache = sync.cache();
    let _write = cache.write_guard();
    let mut links = cache.links();
    links.push(LinkRecord::new("", url));
    cache
        .write_state(StatePatch {
            links: Some(links),
            ..StatePatch::default()
        })
        .unwrap();
    sync.local_changed();
}

#[tokio::test]
async fn fetch_timeout_means_offline_and_no_push() {
    let mut remote = MockRemote::new();
    remote
        .expect_fetch()
        .times(1)
        .returning(|| Err(RemoteError::Timeout(std::time::Duration::from_secs(10))));
    remote.expect_push().never();

    let sync = coordinator(remote);
    add_local_link(&sync, "https://a.example");

    assert_eq!(sync.bootstrap().await.unwrap(), BootstrapOutcome::Offline);
    assert_eq!(sync.cache().links().len(), 1);
}

#[tokio::test]
async fn seed_failure_is_reported_not_fatal() {
    let mut remote = MockRemote::new();
    remote.expect_fetch().returning(|| Ok(None));
    remote
        .expect_push()
        .withf(|request| request.base_revision == 0)
        .times(1)
        .returning(|_| Err(RemoteError::status(500, "boom")));

    let sync = coordinator(remote);
    add_local_link(&sync, "https://a.example");

    assert_eq!(sync.bootstrap().await.unwrap(), BootstrapOutcome::SeedFailed);
    assert_eq!(sync.cache().links().len(), 1);
    assert_eq!(sync.status().pushes_failed, 1);
}

#[tokio::test]
async fn regressed_revision_is_rejected() {
    let mut remote = MockRemote::new();
    remote.expect_fetch().returning(|| {
        Ok(Some(json!({
            "links": [{"label": "A", "url": "https://a.example"}],
            "revision": 3,
        })))
    });
    remote
        .expect_push()
        .withf(|request| request.base_revision == 3)
        .returning(|_| Ok(json!({"links": [], "revision": 1})));

    let sync = coordinator(remote);
    sync.bootstrap().await.unwrap();
    add_local_link(&sync, "https://b.example");

    let err = sync.flush().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::RevisionRegressed {
            base: 3,
            received: 1
        }
    ));
    assert_eq!(sync.cache().revision(), 3);
    assert_eq!(sync.cache().links().len(), 2);
}

#[tokio::test]
async fn malformed_server_answer_is_normalized_before_adoption() {
    let mut remote = MockRemote::new();
    remote.expect_fetch().returning(|| Ok(None));
    remote.expect_push().returning(|request| {
        let url = request.state.links[0].url.clone();
        Ok(json!({
            "links": [{"label": "", "url": url}, {"label": "dup", "url": url}, "not a url"],
            "activePromptKey": "link:https://nowhere.example",
            "revision": "7",
        }))
    });

    let sync = coordinator(remote);
    sync.bootstrap().await.unwrap();
    add_local_link(&sync, "https://www.a.example/path");

    let outcome = sync.flush().await.unwrap();
    assert_eq!(outcome, PushOutcome::Accepted { revision: 7 });
    let state = sync.cache().state();
    assert_eq!(state.links, vec![LinkRecord::new("a.example", "https://www.a.example/path")]);
    assert!(state.active_prompt_key.is_global());
}
