use uuid::Uuid;

use super::*;

const TTL: i64 = 1_000;

fn holder(name: &str) -> LockHolder {
    LockHolder { client_id: Uuid::new_v4(), user_id: Uuid::new_v4(), user_name: name.to_owned() }
}

#[test]
fn acquire_is_all_or_nothing() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    let bob = holder("bob");
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    table.try_acquire(&[a], &alice, 0, TTL).unwrap();
    let err = table.try_acquire(&[b, a], &bob, 10, TTL).unwrap_err();

    assert_eq!(err.lock.object_id, a);
    assert_eq!(err.lock.user_name, "alice");
    // Nothing was granted to bob, not even the free shape.
    assert!(table.get(&b).is_none());
}

#[test]
fn reacquire_by_holder_refreshes_expiry_and_keeps_acquired_at() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    let a = Uuid::new_v4();

    table.try_acquire(&[a], &alice, 100, TTL).unwrap();
    let again = table.try_acquire(&[a], &alice, 600, TTL).unwrap();

    assert_eq!(again[0].acquired_at_ms, 100);
    assert_eq!(again[0].expires_at_ms, 1_600);
}

#[test]
fn expired_foreign_lock_is_taken_over() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    let bob = holder("bob");
    let a = Uuid::new_v4();

    table.try_acquire(&[a], &alice, 0, TTL).unwrap();
    let granted = table.try_acquire(&[a], &bob, TTL, TTL).unwrap();

    assert_eq!(granted[0].client_id, bob.client_id);
    assert_eq!(granted[0].acquired_at_ms, TTL);
}

#[test]
fn only_holder_can_release() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    let bob = holder("bob");
    let a = Uuid::new_v4();
    table.try_acquire(&[a], &alice, 0, TTL).unwrap();

    assert!(table.release(&[a], bob.client_id).is_empty());
    assert_eq!(table.release(&[a], alice.client_id), vec![a]);
    assert!(table.is_empty());
}

#[test]
fn renew_skips_foreign_and_expired_locks() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    let bob = holder("bob");
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    table.try_acquire(&[a], &alice, 0, TTL).unwrap();
    table.try_acquire(&[b], &bob, 0, TTL).unwrap();

    let renewed = table.renew(&[a, b], alice.client_id, 500, TTL);
    assert_eq!(renewed.len(), 1);
    assert_eq!(renewed[0].expires_at_ms, 1_500);

    assert!(table.renew(&[a], alice.client_id, 5_000, TTL).is_empty());
}

#[test]
fn release_client_drops_everything_it_holds() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    let bob = holder("bob");
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    table.try_acquire(&[a, b], &alice, 0, TTL).unwrap();
    table.try_acquire(&[c], &bob, 0, TTL).unwrap();

    let mut released = table.release_client(alice.client_id);
    released.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(released, expected);
    assert_eq!(table.len(), 1);
    assert!(table.get(&c).is_some());
}

#[test]
fn sweep_returns_only_expired() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    table.try_acquire(&[a], &alice, 0, TTL).unwrap();
    table.try_acquire(&[b], &alice, 800, TTL).unwrap();

    let expired = table.sweep_expired(1_200);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].object_id, a);
    assert!(table.get(&b).is_some());
}

#[test]
fn check_writable_rules() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    let bob = holder("bob");
    let a = Uuid::new_v4();

    assert!(table.check_writable(a, bob.client_id, 0).is_ok());
    table.try_acquire(&[a], &alice, 0, TTL).unwrap();
    assert!(table.check_writable(a, alice.client_id, 10).is_ok());
    assert!(table.check_writable(a, bob.client_id, 10).is_err());
    assert!(table.check_writable(a, bob.client_id, TTL).is_ok());
}

#[test]
fn snapshot_hides_expired() {
    let mut table = LockTable::new();
    let alice = holder("alice");
    table.try_acquire(&[Uuid::new_v4()], &alice, 0, TTL).unwrap();
    assert_eq!(table.snapshot(10).len(), 1);
    assert!(table.snapshot(TTL).is_empty());
}
