//! Integration test: alias registration, uniqueness and release.
//!
//! Uses signed registrations against the SQLite-backed directory:
//! 1. A handle is bound once; a second wallet claiming it gets AliasTaken
//! 2. A wallet cannot hold two handles
//! 3. Re-signing the same binding is a no-op
//! 4. After a release the handle can be claimed by someone else
//! 5. A release signed for an earlier binding does not remove a later one

use bulut_alias::AliasError;
use bulut_integration_tests::{Harness, Wallet, T0};

#[test]
fn test_handle_taken_by_second_wallet() {
    let h = Harness::new();
    let alice = h.register("@alice");

    let mallory = Wallet::new();
    let err = h
        .aliases
        .register(
            "@alice",
            &mallory.address.to_string(),
            &mallory.sign_registration("@alice"),
            T0,
        )
        .expect_err("taken");
    match err {
        AliasError::AliasTaken { address, .. } => assert_eq!(address, alice.address),
        other => unreachable!("expected AliasTaken, got {other:?}"),
    }
    assert_eq!(h.aliases.resolve("@alice").expect("resolve"), alice.address);
}

#[test]
fn test_one_handle_per_address() {
    let h = Harness::new();
    let alice = h.register("@alice");
    let err = h
        .aliases
        .register(
            "@alice2",
            &alice.address.to_string(),
            &alice.sign_registration("@alice2"),
            T0,
        )
        .expect_err("address taken");
    assert!(matches!(err, AliasError::AddressTaken { .. }));
}

#[test]
fn test_reregistration_is_idempotent() {
    let h = Harness::new();
    let alice = h.register("@alice");
    let again = h
        .aliases
        .register(
            "@ALICE",
            &alice.address.to_string(),
            &alice.sign_registration("@alice"),
            T0 + 10,
        )
        .expect("refresh");
    assert_eq!(again.address, alice.address);
    assert_eq!(h.aliases.list().expect("list").len(), 1);
}

#[test]
fn test_release_frees_handle() {
    let h = Harness::new();
    let alice = h.register("@alice");
    h.aliases
        .release("@alice", &alice.sign_release("@alice", T0))
        .expect("release");
    assert!(matches!(
        h.aliases.reverse_resolve(&alice.address.to_string()),
        Err(AliasError::NotFound(_))
    ));

    let bob = h.register("@alice");
    assert_eq!(h.aliases.resolve("@alice").expect("resolve"), bob.address);
}

#[test]
fn test_captured_release_is_bound_to_registration() {
    let h = Harness::new();
    let alice = h.register("@alice");
    let captured = alice.sign_release("@alice", T0);
    h.aliases.release("@alice", &captured).expect("release");

    h.aliases
        .register(
            "@alice",
            &alice.address.to_string(),
            &alice.sign_registration("@alice"),
            T0 + 3600,
        )
        .expect("register again");
    assert!(matches!(
        h.aliases.release("@alice", &captured),
        Err(AliasError::InvalidSignature)
    ));
    assert_eq!(h.aliases.resolve("@alice").expect("resolve"), alice.address);

    let binding = h.aliases.lookup("@alice").expect("lookup");
    assert_eq!(binding.registered_at, T0 + 3600);
    h.aliases
        .release("@alice", &alice.sign_release("@alice", binding.registered_at))
        .expect("release current");
}
