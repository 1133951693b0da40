//! Property tests for queue transitions and the block codec.

use proptest::prelude::*;
use review_queue_core::index::is_contiguous;
use review_queue_core::{
    decode, encode, header_text, Extractor, QueueEngine, QueueError, QueueItem, QueueState,
    RetentionPolicy, Submission,
};

#[derive(Debug, Clone)]
enum Op {
    /// Submit a message carrying `n` links.
    Add { links: Vec<u16>, text: String },
    /// Press "Complete" on the entry at this position among active entries
    /// (or on a stale index when out of range).
    Remove(usize),
    ClearTombstones,
    StripDecoration,
}

fn arb_policy() -> impl Strategy<Value = RetentionPolicy> {
    prop_oneof![
        Just(RetentionPolicy::DiscardOnRemove),
        Just(RetentionPolicy::TombstoneUntilNextLoad),
        Just(RetentionPolicy::TombstonePermanent),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (
            proptest::collection::vec(0u16..500, 0..4),
            "[a-zA-Z ,.!\n]{0,140}",
        )
            .prop_map(|(links, text)| Op::Add { links, text }),
        3 => (0usize..12).prop_map(Op::Remove),
        1 => Just(Op::ClearTombstones),
        1 => Just(Op::StripDecoration),
    ]
}

fn extractor() -> Extractor {
    Extractor::new(vec!["repo1".to_string(), "repo2".to_string()])
}

fn message_text(links: &[u16], text: &str) -> String {
    let mut message = text.to_string();
    for n in links {
        message.push_str(&format!(" <https://github.com/org/repo{}/pull/{}>", n % 4, n));
    }
    message
}

fn submit(links: &[u16], text: &str) -> Vec<review_queue_core::QueueEntry> {
    let message = message_text(links, text);
    extractor().extract(&Submission {
        text: &message,
        submitter_id: "U1",
        permalink: Some("https://team.slack.com/archives/C1/p1700000000000100"),
        avatar_url: Some("https://avatars.example/u1.png"),
        submitted_at: "1700000000.000100",
    })
}

/// Apply `op`, returning the new state (or the old one on no-op).
fn apply(engine: &QueueEngine, state: Option<QueueState>, op: &Op) -> Option<QueueState> {
    match op {
        Op::Add { links, text } => {
            let entries = submit(links, text);
            engine.add(state.as_ref(), entries).or(state)
        }
        Op::Remove(position) => {
            let state = state?;
            let index = state
                .entries()
                .nth(*position)
                .map(|e| e.index)
                .unwrap_or(1_000 + *position as u32);
            Some(engine.remove_by_index(&state, index).unwrap_or(state))
        }
        Op::ClearTombstones => state.map(|s| engine.clear_tombstones(&s)),
        Op::StripDecoration => state.map(|s| engine.strip_decoration(&s)),
    }
}

fn header_of(state: &QueueState) -> String {
    match &encode(state)[0] {
        review_queue_core::Block::Header { text } => text.text.clone(),
        other => panic!("first block is not a header: {:?}", other),
    }
}

proptest! {
    #[test]
    fn header_count_matches_active_entries(
        policy in arb_policy(),
        ops in proptest::collection::vec(arb_op(), 0..20),
    ) {
        let engine = QueueEngine::new(policy);
        let mut state = None;
        for op in &ops {
            state = apply(&engine, state, op);
            if let Some(current) = &state {
                let header = header_of(current);
                let count = current.active_count();
                prop_assert_eq!(&header, &header_text(count));
                prop_assert_eq!(header.contains("There is 1 pending PR."), count == 1);
            }
        }
    }

    #[test]
    fn indices_are_contiguous_after_add(
        policy in arb_policy(),
        ops in proptest::collection::vec(arb_op(), 0..20),
        links in proptest::collection::vec(0u16..500, 1..4),
    ) {
        let engine = QueueEngine::new(policy);
        let mut state = None;
        for op in &ops {
            state = apply(&engine, state, op);
        }

        let added = engine.add(state.as_ref(), submit(&links, "ptal")).expect("links were supplied");
        prop_assert!(is_contiguous(&added));
        let indices: Vec<u32> = added.entries().map(|e| e.index).collect();
        let expected: Vec<u32> = (0..added.active_count() as u32).collect();
        prop_assert_eq!(indices, expected);
    }

    #[test]
    fn removal_keeps_other_indices(
        policy in arb_policy(),
        links in proptest::collection::vec(0u16..500, 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let engine = QueueEngine::new(policy);
        let state = engine.add(None, submit(&links, "")).expect("links were supplied");
        let target = state.entries().nth(pick.index(state.active_count())).map(|e| e.index).unwrap();

        let before: Vec<(String, u32)> = state
            .entries()
            .filter(|e| e.index != target)
            .map(|e| (e.link_url.clone(), e.index))
            .collect();
        let next = engine.remove_by_index(&state, target).unwrap();
        let after: Vec<(String, u32)> = next
            .entries()
            .map(|e| (e.link_url.clone(), e.index))
            .collect();

        prop_assert_eq!(before, after);
        prop_assert_eq!(next.active_count(), state.active_count() - 1);
    }

    #[test]
    fn decode_inverts_encode(
        policy in arb_policy(),
        ops in proptest::collection::vec(arb_op(), 0..20),
    ) {
        let engine = QueueEngine::new(policy);
        let mut state = None;
        for op in &ops {
            state = apply(&engine, state, op);
        }

        if let Some(state) = state {
            let raw: Vec<serde_json::Value> = encode(&state)
                .iter()
                .map(|b| serde_json::to_value(b).unwrap())
                .collect();
            prop_assert_eq!(decode(&raw), state);
        }
    }

    #[test]
    fn noop_operations_leave_state_unchanged(
        policy in arb_policy(),
        links in proptest::collection::vec(0u16..500, 0..6),
        text in "[a-z ]{0,40}",
        stale in 100u32..1000,
    ) {
        let engine = QueueEngine::new(policy);
        let state = engine.add(None, submit(&links, "")).unwrap_or_else(QueueState::scaffold);

        // Messages without code-host links produce no entries.
        let no_links = extractor().extract(&Submission {
            text: &text,
            submitter_id: "U2",
            permalink: None,
            avatar_url: None,
            submitted_at: "1.0",
        });
        prop_assert!(no_links.is_empty());
        prop_assert_eq!(engine.add(Some(&state), no_links), None);

        prop_assert_eq!(
            engine.remove_by_index(&state, stale),
            Err(QueueError::NotFound { index: stale })
        );
        prop_assert!(state.items.iter().all(|item| !matches!(item, QueueItem::Tombstone)));
    }
}
