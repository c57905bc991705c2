use linkdeck_state::normalize::{
    normalize_links, normalize_notes, normalize_pinned_groups, normalize_profiles,
    normalize_prompts,
};
use linkdeck_state::pool::{self, invariant_violations};
use linkdeck_state::{normalize_state, InsertPosition, Limits, WorkspaceState};
use proptest::prelude::*;
use serde_json::{json, Value};

fn small_limits() -> Limits {
    Limits::default()
        .with_max_links(5)
        .with_max_groups(2)
        .with_max_group_links(2)
}

fn url_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u8..8).prop_map(|n| format!("https://site{n}.example")),
        (0u8..8).prop_map(|n| format!("HTTPS://SITE{n}.EXAMPLE")),
        Just("not a url".to_string()),
        Just("ftp://files.example".to_string()),
    ]
}

fn link_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        (".{0,12}", url_strategy()).prop_map(|(label, url)| json!({"label": label, "url": url})),
        url_strategy().prop_map(Value::from),
        Just(json!(17)),
        Just(json!({"label": "no url"})),
    ]
}

fn key_string() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("global".to_string()),
        url_strategy().prop_map(|url| format!("link:{url}")),
        Just("bogus".to_string()),
    ]
}

fn state_value() -> impl Strategy<Value = Value> {
    (
        prop::collection::vec(link_value(), 0..8),
        prop::collection::vec(
            (
                prop_oneof![Just(String::new()), "g[0-3]"],
                "[ a-z]{0,10}",
                prop::collection::vec(link_value(), 0..4),
            ),
            0..4,
        ),
        prop::collection::btree_map(key_string(), "[ a-z\n]{0,20}", 0..5),
        prop::collection::btree_map(key_string(), "[ a-z]{0,20}", 0..5),
        key_string(),
        any::<u32>(),
    )
        .prop_map(|(links, groups, prompts, notes, active, revision)| {
            let groups: Vec<Value> = groups
                .into_iter()
                .map(|(id, label, links)| json!({"id": id, "label": label, "links": links}))
                .collect();
            json!({
                "links": links,
                "pinnedGroups": groups,
                "prompts": prompts,
                "linkNotes": notes,
                "linkProfiles": {"link:https://site1.example": {"owner": " ops ", "agent": "claude"}},
                "activePromptKey": active,
                "revision": revision,
            })
        })
}

#[derive(Debug, Clone)]
enum Op {
    Add(u8),
    RemoveFree(u8),
    Promote(u8, u8),
    Demote(u8, u8),
    CreateGroup(u8),
    DeleteGroup(u8),
    Move(u8, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8).prop_map(Op::Add),
        (0u8..8).prop_map(Op::RemoveFree),
        ((0u8..8), (0u8..3)).prop_map(|(u, g)| Op::Promote(u, g)),
        ((0u8..8), (0u8..3)).prop_map(|(u, g)| Op::Demote(u, g)),
        (0u8..3).prop_map(Op::CreateGroup),
        (0u8..3).prop_map(Op::DeleteGroup),
        ((0u8..8), (0usize..6)).prop_map(|(u, i)| Op::Move(u, i)),
    ]
}

fn apply(state: &mut WorkspaceState, op: &Op, limits: &Limits) -> bool {
    let url = |n: &u8| format!("https://site{n}.example");
    let group = |n: &u8| format!("g{n}");
    let result = match op {
        Op::Add(n) => pool::add_link(state, "", &url(n), InsertPosition::Head, limits).map(|_| ()),
        Op::RemoveFree(n) => pool::remove_link(state, &url(n)).map(|_| ()),
        Op::Promote(n, g) => pool::promote(state, &url(n), &group(g), InsertPosition::Head, limits),
        Op::Demote(n, g) => pool::demote(state, &url(n), &group(g), InsertPosition::Tail, limits),
        Op::CreateGroup(g) => pool::create_group(state, &group(g), "", "", limits).map(|_| ()),
        Op::DeleteGroup(g) => pool::delete_group(state, &group(g), limits).map(|_| ()),
        Op::Move(n, i) => pool::move_link(state, &url(n), InsertPosition::Index(*i)),
    };
    result.is_ok()
}

proptest! {
    #[test]
    fn prop_state_normalization_is_idempotent(input in state_value()) {
        let limits = small_limits();
        let (once, _) = normalize_state(&input, &limits);
        let (twice, report) = normalize_state(&serde_json::to_value(&once).unwrap(), &limits);
        prop_assert_eq!(&once, &twice);
        prop_assert!(report.is_clean());
        prop_assert!(invariant_violations(&once, &limits).is_empty());
    }

    #[test]
    fn prop_slice_normalizers_are_idempotent(input in state_value()) {
        let limits = small_limits();

        let links = normalize_links(&input["links"], &limits);
        prop_assert_eq!(&normalize_links(&serde_json::to_value(&links).unwrap(), &limits), &links);

        let groups = normalize_pinned_groups(&input["pinnedGroups"], &limits);
        prop_assert_eq!(
            &normalize_pinned_groups(&serde_json::to_value(&groups).unwrap(), &limits),
            &groups
        );

        let prompts = normalize_prompts(&input["prompts"], &limits);
        prop_assert_eq!(&normalize_prompts(&serde_json::to_value(&prompts).unwrap(), &limits), &prompts);

        let notes = normalize_notes(&input["linkNotes"], &limits);
        prop_assert_eq!(&normalize_notes(&serde_json::to_value(&notes).unwrap(), &limits), &notes);

        let profiles = normalize_profiles(&input["linkProfiles"], &limits);
        prop_assert_eq!(
            &normalize_profiles(&serde_json::to_value(&profiles).unwrap(), &limits),
            &profiles
        );
    }

    #[test]
    fn prop_pool_operations_preserve_invariants(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let limits = small_limits();
        let mut state = WorkspaceState::default();

        for op in &ops {
            let before = state.clone();
            let applied = apply(&mut state, op, &limits);
            if !applied {
                // A rejected operation is a no-op.
                prop_assert_eq!(&state, &before);
            }
            let violations = invariant_violations(&state, &limits);
            prop_assert!(violations.is_empty(), "{:?} after {:?}", violations, op);
        }
    }
}

#[test]
fn adding_past_capacity_is_reported_not_silent() {
    let limits = small_limits();
    let mut state = WorkspaceState::default();
    for n in 0..5 {
        pool::add_link(&mut state, "", &format!("https://site{n}.example"), InsertPosition::Tail, &limits)
            .unwrap();
    }
    let err = pool::add_link(&mut state, "", "https://site9.example", InsertPosition::Tail, &limits)
        .unwrap_err();
    assert!(err.is_capacity());
    assert_eq!(state.links.len(), 5);
}
