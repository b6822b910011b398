//! Property-based tests for evaluation and mutation.
//!
//! These tests use proptest to verify invariants around:
//! - Deny entries overriding allow entries
//! - Refusal when nothing applies
//! - Idempotent grants and grant/revoke round trips
//! - Batch validation reporting every bad token

use std::future::Future;
use std::sync::Arc;

use fabryk_acl::{
    AccessEngine, AclConfig, DirectoryResolver, Principal, Resource, ResourceKey, SimpleResource,
    StaticDirectory,
};
use proptest::prelude::*;

const VOCABULARY: [&str; 4] = ["read", "post", "edit", "delete"];

// ============================================================================
// Helpers
// ============================================================================

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn board() -> SimpleResource {
    SimpleResource::new(ResourceKey::new("board", "props"), VOCABULARY)
}

async fn engine() -> AccessEngine {
    AccessEngine::builder(AclConfig::default())
        .with_subject_resolver(Arc::new(DirectoryResolver::new(
            "account",
            Arc::new(StaticDirectory::new(["bob", "jane"])),
        )))
        .build()
        .await
        .unwrap()
}

// ============================================================================
// Strategies
// ============================================================================

fn arb_permissions() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(VOCABULARY.to_vec(), 0..=VOCABULARY.len())
}

/// Lowercase words outside the vocabulary.
fn arb_unknown_permission() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}")
        .unwrap()
        .prop_filter("must be outside the vocabulary", |s| {
            s != "all" && !VOCABULARY.contains(&s.as_str())
        })
}

/// Subject tokens that no resolver accepts.
fn arb_bad_subject() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-z]{1,8}").unwrap(),
        prop::string::string_regex("guild:[a-z]{1,8}").unwrap(),
        prop::string::string_regex("account:x[a-z]{1,8}").unwrap(),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Bob holds a permission exactly when it is allowed and not denied.
    #[test]
    fn deny_overrides_allow(allow in arb_permissions(), deny in arb_permissions()) {
        let outcomes = block_on(async {
            let engine = engine().await;
            let board = board();
            engine.add(&board, &["account:bob"], &allow[..], None, false).await.unwrap();
            engine.add(&board, &["basic:everyone"], &deny[..], None, true).await.unwrap();

            let bob = Principal::named("account", "bob");
            let mut outcomes = Vec::new();
            for permission in VOCABULARY {
                outcomes.push((permission, engine.check(&bob, &board, permission).await));
            }
            outcomes
        });

        for (permission, allowed) in outcomes {
            let expected = allow.contains(&permission) && !deny.contains(&permission);
            prop_assert_eq!(allowed, expected, "permission {}", permission);
        }
    }

    /// Entries for other subjects never grant anything to bob.
    #[test]
    fn nothing_applies_means_refused(granted in arb_permissions(), asked in 0..VOCABULARY.len()) {
        let allowed = block_on(async {
            let engine = engine().await;
            let board = board();
            engine.add(&board, &["account:jane"], &granted[..], None, false).await.unwrap();
            engine
                .check(&Principal::named("account", "bob"), &board, VOCABULARY[asked])
                .await
        });
        prop_assert!(!allowed);
    }

    /// Repeating a grant leaves the same entries as granting once.
    #[test]
    fn add_is_idempotent(permissions in arb_permissions(), repeats in 1usize..4) {
        let (once, many) = block_on(async {
            let board = board();

            let single = engine().await;
            single.add(&board, &["account:bob"], &permissions[..], None, false).await.unwrap();
            let once = single.entries(&board.resource_key()).await.unwrap();

            let repeated = engine().await;
            for _ in 0..repeats {
                repeated.add(&board, &["account:bob"], &permissions[..], None, false).await.unwrap();
            }
            let many = repeated.entries(&board.resource_key()).await.unwrap();
            (once, many)
        });

        prop_assert_eq!(once.len(), many.len());
        for (a, b) in once.iter().zip(many.iter()) {
            prop_assert_eq!(&a.key, &b.key);
            prop_assert_eq!(a.permission_names(), b.permission_names());
        }
    }

    /// Granting then revoking the same permissions leaves no entries.
    #[test]
    fn add_then_remove_round_trips(permissions in arb_permissions(), deny in any::<bool>()) {
        let remaining = block_on(async {
            let engine = engine().await;
            let board = board();
            engine.add(&board, &["account:bob"], &permissions[..], None, deny).await.unwrap();
            engine.remove(&board, &["account:bob"], &permissions[..], None, deny).await.unwrap();
            engine.entries(&board.resource_key()).await.unwrap()
        });
        prop_assert!(remaining.is_empty());
    }

    /// Every invalid token is reported, and nothing is written.
    #[test]
    fn validation_reports_every_rejection(
        bad_subjects in prop::collection::vec(arb_bad_subject(), 0..4),
        bad_permissions in prop::collection::vec(arb_unknown_permission(), 0..4),
    ) {
        prop_assume!(!bad_subjects.is_empty() || !bad_permissions.is_empty());

        let mut subjects = bad_subjects.clone();
        subjects.push("account:bob".to_string());
        let mut permissions = bad_permissions.clone();
        permissions.push("read".to_string());

        let (err, entries) = block_on(async {
            let engine = engine().await;
            let board = board();
            let err = engine
                .add(&board, &subjects[..], &permissions[..], None, false)
                .await
                .unwrap_err();
            (err, engine.entries(&board.resource_key()).await.unwrap())
        });

        let rejections = err.rejections().unwrap();
        prop_assert_eq!(rejections.subject_tokens(), bad_subjects.iter().map(String::as_str).collect::<Vec<_>>());
        prop_assert_eq!(&rejections.permissions, &bad_permissions);
        prop_assert!(entries.is_empty());
    }
}
