use linkdeck_core::{BootstrapOutcome, LinkRecord, PushOutcome, SyncPhase};
use linkdeck_sync::MemoryRemote;
use linkdeck_test_utils::{harness, harness_with_remote, remote_document};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn add_then_pin_then_undo_pinned_removal() {
    let h = harness();
    let engine = &h.engine;

    // Add to an empty free pool
    engine.add_link("A", "https://a.example").unwrap();
    assert_eq!(engine.links(), vec![LinkRecord::new("A", "https://a.example")]);

    // Pin into a group
    let group = engine.create_group("g1").unwrap().value;
    engine.promote("https://a.example", &group.id).unwrap();
    assert!(engine.links().is_empty());
    let groups = engine.pinned_groups();
    assert_eq!(groups[0].links, vec![LinkRecord::new("A", "https://a.example")]);
    let pinned = engine.state();

    // Remove the pinned link, then undo
    let removed = engine
        .remove_pinned_link(&group.id, "https://a.example")
        .unwrap();
    assert!(engine.pinned_groups()[0].links.is_empty());

    engine.undo(&removed.undo.unwrap()).unwrap();
    assert_eq!(engine.state(), pinned);
}

#[tokio::test]
async fn bootstrap_seeds_empty_server_with_one_push() {
    let h = harness();
    h.engine.add_link("A", "https://a.example").unwrap();
    h.engine.add_link("B", "https://b.example").unwrap();
    assert_eq!(h.remote.push_count(), 0);

    let outcome = h.engine.bootstrap().await.unwrap();
    assert_eq!(outcome, BootstrapOutcome::Seeded { revision: 1 });

    let pushes = h.remote.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].base_revision, 0);
    assert_eq!(pushes[0].state.links.len(), 2);
    assert_eq!(h.engine.revision(), 1);
}

#[tokio::test]
async fn bootstrap_adopts_meaningful_server_state() {
    let h = harness_with_remote(MemoryRemote::with_document(remote_document(2, 5)));
    h.engine.add_link("Local", "https://local.example").unwrap();

    let outcome = h.engine.bootstrap().await.unwrap();
    assert_eq!(outcome, BootstrapOutcome::RemoteAdopted { revision: 5 });
    let labels: Vec<String> = h.engine.links().into_iter().map(|l| l.label).collect();
    assert_eq!(labels, vec!["Remote 0", "Remote 1"]);
    assert_eq!(h.remote.push_count(), 0);
}

#[tokio::test]
async fn offline_bootstrap_keeps_working_locally() {
    let remote = MemoryRemote::new();
    remote.set_offline(true);
    let h = harness_with_remote(remote);
    h.engine.add_link("A", "https://a.example").unwrap();

    assert_eq!(h.engine.bootstrap().await.unwrap(), BootstrapOutcome::Offline);
    h.engine.add_link("B", "https://b.example").unwrap();
    assert_eq!(h.engine.links().len(), 2);
    assert_eq!(h.engine.revision(), 0);
}

#[tokio::test]
async fn change_made_during_push_reaches_the_next_push() {
    let h = harness();
    h.engine.bootstrap().await.unwrap();
    h.engine.add_link("A", "https://a.example").unwrap();

    h.remote.hold_pushes();
    let first = {
        let sync = h.engine.sync().clone();
        tokio::spawn(async move { sync.flush().await })
    };
    h.remote.wait_for_push().await;
    assert_eq!(h.engine.status().phase, SyncPhase::Pushing);

    h.engine.add_link("B", "https://b.example").unwrap();
    h.remote.release_pushes();

    assert_eq!(
        first.await.unwrap().unwrap(),
        PushOutcome::RevisionOnly { revision: 1 }
    );
    assert_eq!(h.engine.links().len(), 2);

    assert_eq!(
        h.engine.flush().await.unwrap(),
        PushOutcome::Accepted { revision: 2 }
    );
    let pushes = h.remote.pushes();
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[1].base_revision, 1);
    let urls: Vec<&str> = pushes[1].state.links.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(urls, vec!["https://b.example", "https://a.example"]);
}

#[tokio::test(start_paused = true)]
async fn burst_of_mutations_is_pushed_once_after_quiet_period() {
    let h = harness();
    h.engine.bootstrap().await.unwrap();

    for n in 0..5 {
        h.engine
            .add_link("", &format!("https://burst{n}.example"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(h.remote.push_count(), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.remote.push_count(), 1);
    assert_eq!(h.remote.pushes()[0].state.links.len(), 5);
    assert_eq!(h.engine.revision(), 1);
}

#[tokio::test]
async fn revision_never_moves_backwards_and_bases_track_the_server() {
    let h = harness();
    h.engine.bootstrap().await.unwrap();

    let mut observed = vec![h.engine.revision()];
    for n in 0..4 {
        h.engine
            .add_link("", &format!("https://rev{n}.example"))
            .unwrap();
        h.engine.flush().await.unwrap();
        observed.push(h.engine.revision());
    }

    assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]));
    let bases: Vec<u64> = h.remote.pushes().iter().map(|p| p.base_revision).collect();
    assert_eq!(bases, observed[..4].to_vec());
}

#[tokio::test]
async fn failed_push_is_retried_by_the_next_flush() {
    let h = harness();
    h.engine.bootstrap().await.unwrap();
    h.engine.add_link("A", "https://a.example").unwrap();

    h.remote.fail_next_pushes(1);
    assert!(h.engine.flush().await.is_err());
    assert_eq!(h.engine.links().len(), 1);
    assert_eq!(h.engine.status().pushes_failed, 1);

    assert_eq!(
        h.engine.flush().await.unwrap(),
        PushOutcome::Accepted { revision: 1 }
    );
    assert!(h.remote.pushes().iter().all(|p| p.base_revision == 0));
}

#[tokio::test(start_paused = true)]
async fn unavailable_storage_never_blanks_local_or_server_state() {
    let h = harness();
    h.engine.bootstrap().await.unwrap();
    h.engine.add_link("A", "https://a.example").unwrap();
    h.engine.flush().await.unwrap();
    h.engine.add_link("B", "https://b.example").unwrap();

    h.store.set_disabled(true);
    let err = h.engine.add_link("C", "https://c.example").unwrap_err();
    assert!(err.is_persistence());
    let urls: Vec<String> = h.engine.links().into_iter().map(|l| l.url).collect();
    assert_eq!(urls, vec!["https://b.example", "https://a.example"]);

    // The debounced push still carries the last saved state.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.remote.push_count(), 2);
    let document = h.remote.document().unwrap();
    assert_eq!(document["links"].as_array().map(Vec::len), Some(2));
    assert_eq!(document["links"][0]["url"], json!("https://b.example"));
    assert_eq!(h.engine.links().len(), 2);

    h.store.set_disabled(false);
    h.engine.add_link("C", "https://c.example").unwrap();
    h.engine.flush().await.unwrap();
    let document = h.remote.document().unwrap();
    assert_eq!(document["links"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn change_made_during_bootstrap_fetch_is_seeded() {
    let h = harness();
    h.engine.add_link("A", "https://a.example").unwrap();

    h.remote.hold_fetches();
    let bootstrap = {
        let sync = h.engine.sync().clone();
        tokio::spawn(async move { sync.bootstrap().await })
    };
    h.remote.wait_for_fetch().await;
    h.engine.add_link("B", "https://b.example").unwrap();
    h.remote.release_fetches();

    assert_eq!(
        bootstrap.await.unwrap().unwrap(),
        BootstrapOutcome::Seeded { revision: 1 }
    );
    let urls: Vec<String> = h.engine.links().into_iter().map(|l| l.url).collect();
    assert_eq!(urls, vec!["https://b.example", "https://a.example"]);
    let pushes = h.remote.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].state.links.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn change_made_during_seed_push_is_pushed_after_bootstrap() {
    let h = harness();
    h.engine.add_link("A", "https://a.example").unwrap();

    h.remote.hold_pushes();
    let bootstrap = {
        let sync = h.engine.sync().clone();
        tokio::spawn(async move { sync.bootstrap().await })
    };
    h.remote.wait_for_push().await;
    h.engine.add_link("B", "https://b.example").unwrap();
    h.remote.release_pushes();

    assert_eq!(
        bootstrap.await.unwrap().unwrap(),
        BootstrapOutcome::Seeded { revision: 1 }
    );
    assert_eq!(h.engine.links().len(), 2);
    assert_eq!(h.engine.status().phase, SyncPhase::Debouncing);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let pushes = h.remote.pushes();
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[1].base_revision, 1);
    assert_eq!(pushes[1].state.links.len(), 2);
    assert_eq!(h.engine.revision(), 2);
}
