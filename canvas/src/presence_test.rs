use uuid::Uuid;

use super::*;

fn cursor(client_id: Uuid, x: f64, at: i64) -> Cursor {
    Cursor {
        client_id,
        user_id: Uuid::new_v4(),
        name: "alice".into(),
        color: "#22c55e".into(),
        x,
        y: 0.0,
        updated_at_ms: at,
    }
}

#[test]
fn upsert_moves_existing_cursor() {
    let mut map = PresenceMap::new();
    let client = Uuid::new_v4();
    assert!(map.upsert(cursor(client, 1.0, 10)));
    assert!(map.upsert(cursor(client, 2.0, 20)));
    assert_eq!(map.len(), 1);
    assert!((map.get(&client).unwrap().x - 2.0).abs() < f64::EPSILON);
}

#[test]
fn upsert_ignores_out_of_order_moves() {
    let mut map = PresenceMap::new();
    let client = Uuid::new_v4();
    map.upsert(cursor(client, 5.0, 50));
    assert!(!map.upsert(cursor(client, 1.0, 40)));
    assert!((map.get(&client).unwrap().x - 5.0).abs() < f64::EPSILON);
}

#[test]
fn sweep_stale_removes_idle_cursors() {
    let mut map = PresenceMap::new();
    let idle = Uuid::new_v4();
    let active = Uuid::new_v4();
    map.upsert(cursor(idle, 0.0, 0));
    map.upsert(cursor(active, 0.0, 900));

    assert_eq!(map.sweep_stale(1_000, 500), vec![idle]);
    assert!(map.get(&idle).is_none());
    assert!(map.get(&active).is_some());
}

#[test]
fn clear_removes_cursor() {
    let mut map = PresenceMap::new();
    let client = Uuid::new_v4();
    map.upsert(cursor(client, 0.0, 0));
    assert!(map.clear(client).is_some());
    assert!(map.clear(client).is_none());
    assert!(map.is_empty());
}
