//! Property-based tests for document normalization and role scoping.
//!
//! Uses proptest to verify:
//! 1. Resolved store timestamps convert back to the same epoch milliseconds.
//! 2. Pending or missing timestamps normalize to the caller's clock, never
//!    to zero or "unknown".
//! 3. Pending creation times sort ahead of every resolved one.
//! 4. Role-scoped query specs select exactly the matching documents.
//! 5. Random bytes never cause a panic in the cache codec.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use taskboard_proto::codec;
use taskboard_proto::document::{StoreTimestamp, StoredDocument, TaskDocument};
use taskboard_proto::query::TaskQuery;
use taskboard_proto::session::Session;
use taskboard_proto::task::{AREAS, Priority, TaskId, TaskStatus};

// --- Strategies ---

fn arb_timestamp() -> impl Strategy<Value = StoreTimestamp> {
    prop_oneof![
        any::<u64>().prop_map(StoreTimestamp::from_millis),
        any::<u64>().prop_map(StoreTimestamp::Millis),
        Just(StoreTimestamp::ServerPending),
    ]
}

fn arb_area() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(AREAS.to_vec()).prop_map(String::from))
}

fn arb_email() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec!["a@x.com", "b@x.com", "c@x.com"]).prop_map(String::from))
}

fn arb_document() -> impl Strategy<Value = TaskDocument> {
    (
        "[a-zA-Z ]{1,40}",
        arb_area(),
        arb_email(),
        prop::sample::select(Priority::ALL.to_vec()),
        prop::sample::select(TaskStatus::ALL.to_vec()),
        prop::option::of(arb_timestamp()),
        prop::option::of(arb_timestamp()),
    )
        .prop_map(
            |(title, area, assigned_to, priority, status, due_at, created_at)| TaskDocument {
                title,
                area,
                assigned_to,
                priority,
                status,
                due_at,
                created_at,
                ..TaskDocument::default()
            },
        )
}

// --- Timestamps ---

proptest! {
    #[test]
    fn resolved_millis_round_trip(ms in any::<u64>()) {
        prop_assert_eq!(StoreTimestamp::from_millis(ms).to_millis(), Some(ms));
    }

    #[test]
    fn bare_millis_pass_through(ms in any::<u64>(), now in any::<u64>()) {
        let doc = TaskDocument {
            due_at: Some(StoreTimestamp::Millis(ms)),
            ..TaskDocument::default()
        };
        prop_assert_eq!(doc.normalize(TaskId::new("t"), now).due_at, ms);
    }

    #[test]
    fn pending_and_missing_become_now(now in any::<u64>()) {
        let doc = TaskDocument {
            created_at: Some(StoreTimestamp::ServerPending),
            updated_at: None,
            due_at: Some(StoreTimestamp::ServerPending),
            ..TaskDocument::default()
        };
        let task = doc.normalize(TaskId::new("t"), now);
        prop_assert_eq!(task.created_at, now);
        prop_assert_eq!(task.updated_at, now);
        prop_assert_eq!(task.due_at, now);
    }

    #[test]
    fn resolve_pending_only_touches_sentinels(doc in arb_document(), server_now in any::<u64>()) {
        let mut resolved = doc.clone();
        resolved.resolve_pending(server_now);
        for (before, after) in [(doc.created_at, resolved.created_at), (doc.due_at, resolved.due_at)] {
            match before {
                Some(StoreTimestamp::ServerPending) => {
                    prop_assert_eq!(after.and_then(StoreTimestamp::to_millis), Some(server_now));
                }
                other => prop_assert_eq!(after, other),
            }
        }
    }

    #[test]
    fn pending_creation_sorts_newest(ms in any::<u64>()) {
        let pending = TaskDocument {
            created_at: Some(StoreTimestamp::ServerPending),
            ..TaskDocument::default()
        };
        let resolved = TaskDocument {
            created_at: Some(StoreTimestamp::from_millis(ms)),
            ..TaskDocument::default()
        };
        prop_assert!(pending.created_at_sort_key() >= resolved.created_at_sort_key());
    }
}

// --- Role scoping ---

proptest! {
    #[test]
    fn worker_query_selects_own_tasks(docs in prop::collection::vec(arb_document(), 0..20)) {
        let session = Session::new("u-1", "a@x.com", "operativo", None);
        let spec = TaskQuery::for_session(&session).unwrap().spec();
        for doc in &docs {
            prop_assert_eq!(spec.matches(doc), doc.assigned_to.as_deref() == Some("a@x.com"));
        }
    }

    #[test]
    fn lead_query_selects_department(
        docs in prop::collection::vec(arb_document(), 0..20),
        department in prop::sample::select(AREAS.to_vec()),
    ) {
        let session = Session::new("u-2", "jefe@x.com", "jefe", Some(department.to_string()));
        let spec = TaskQuery::Department(department.to_string()).spec();
        prop_assert_eq!(TaskQuery::for_session(&session).map(|q| q.spec()), Some(spec.clone()));
        for doc in &docs {
            prop_assert_eq!(spec.matches(doc), doc.area.as_deref() == Some(department));
        }
    }

    #[test]
    fn admin_query_selects_everything(docs in prop::collection::vec(arb_document(), 0..20)) {
        let spec = TaskQuery::All.spec();
        prop_assert!(docs.iter().all(|d| spec.matches(d)));
    }

    #[test]
    fn unrecognized_role_has_no_query(role in "[a-z]{0,12}") {
        prop_assume!(!["admin", "jefe", "operativo"].contains(&role.as_str()));
        let session = Session::new("u-3", "a@x.com", &role, Some("Obras".to_string()));
        prop_assert_eq!(TaskQuery::for_session(&session), None);
    }

    #[test]
    fn stored_documents_keep_their_id(doc in arb_document(), id in "[a-z0-9-]{1,16}", now in any::<u64>()) {
        let stored = StoredDocument { id: TaskId::new(id.clone()), data: doc };
        let task = stored.normalize(now);
        prop_assert_eq!(task.id.as_str(), id.as_str());
    }
}

// --- Cache codec ---

proptest! {
    #[test]
    fn random_bytes_never_panic_decode(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode(&bytes);
    }
}
