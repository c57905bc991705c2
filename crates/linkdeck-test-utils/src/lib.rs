//! Testing utilities for linkdeck workspace
//!
//! Shared fixtures: engines over in-memory storage and a reference server,
//! plus sample server documents.

#![allow(missing_docs)]

use linkdeck_cache::MemoryStore;
use linkdeck_core::{EngineConfig, SyncEngine};
use linkdeck_sync::MemoryRemote;
use serde_json::{json, Value};
use std::sync::Arc;

/// Engine plus handles on its storage and server
pub struct TestHarness {
    pub engine: SyncEngine,
    pub store: Arc<MemoryStore>,
    pub remote: Arc<MemoryRemote>,
}

pub fn url(n: usize) -> String {
    format!("https://site{n}.example/page")
}

pub fn harness_with(config: EngineConfig, store: Arc<MemoryStore>, remote: MemoryRemote) -> TestHarness {
    let remote = Arc::new(remote);
    let engine = SyncEngine::new(config, store.clone(), remote.clone()).unwrap();
    TestHarness {
        engine,
        store,
        remote,
    }
}

pub fn harness() -> TestHarness {
    harness_with(EngineConfig::new(), Arc::new(MemoryStore::new()), MemoryRemote::new())
}

pub fn harness_with_remote(remote: MemoryRemote) -> TestHarness {
    harness_with(EngineConfig::new(), Arc::new(MemoryStore::new()), remote)
}

/// Server document holding `count` free links at `revision`
pub fn remote_document(count: usize, revision: u64) -> Value {
    let links: Vec<Value> = (0..count)
        .map(|n| json!({"label": format!("Remote {n}"), "url": url(n)}))
        .collect();
    json!({
        "links": links,
        "pinnedGroups": [],
        "prompts": {},
        "linkNotes": {},
        "linkProfiles": {},
        "activePromptKey": "global",
        "revision": revision,
    })
}
