//! Registry behavior tests
//!
//! End-to-end membership and delivery scenarios, including concurrent use
//! from multiple threads sharing one registry.

use std::{
    collections::HashSet,
    sync::{Arc, Barrier},
    thread,
};

use roomcast_core::{ConnectionHandle, Registry, RegistryError};
use tokio::sync::mpsc::{self, UnboundedReceiver};

fn connect(registry: &Registry) -> (ConnectionHandle, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    (registry.add_generated(tx).unwrap(), rx)
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut received = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        received.push(msg);
    }
    received
}

/// Three connections, two of them chatting, one of them disconnecting.
#[test]
fn chat_room_scenario() {
    let registry = Registry::new();
    let (h1, mut rx1) = connect(&registry);
    let (h2, mut rx2) = connect(&registry);
    let (_h3, mut rx3) = connect(&registry);

    registry.join_room(&h1, "chat").unwrap();
    registry.join_room(&h2, "chat").unwrap();

    registry.emit_to_room("chat", "hi", None).unwrap();
    assert_eq!(drain(&mut rx1), vec!["hi"]);
    assert_eq!(drain(&mut rx2), vec!["hi"]);
    assert!(drain(&mut rx3).is_empty());

    registry.remove(&h1);

    registry.emit_to_room("chat", "bye", None).unwrap();
    assert!(drain(&mut rx1).is_empty());
    assert_eq!(drain(&mut rx2), vec!["bye"]);
    assert!(drain(&mut rx3).is_empty());
}

#[test]
fn removed_member_gets_nothing_and_is_not_listed() {
    let registry = Registry::new();
    let (h, mut rx) = connect(&registry);
    let (other, _other_rx) = connect(&registry);

    registry.join_room(&h, "A").unwrap();
    registry.join_room(&other, "A").unwrap();
    registry.remove(&h);

    registry.emit_to_room("A", "msg", None).unwrap();
    assert!(drain(&mut rx).is_empty());
    assert!(!registry.room_members("A").contains(h.id()));
}

#[test]
fn emit_with_exclusion_reaches_everyone_else() {
    let registry = Registry::new();
    let mut members = Vec::new();
    for _ in 0..5 {
        let (handle, rx) = connect(&registry);
        registry.join_room(&handle, "A").unwrap();
        members.push((handle, rx));
    }

    let sender = members[2].0.clone();
    let report = registry.emit_to_room("A", "ping", Some(&sender)).unwrap();
    assert_eq!(report.delivered, 4);

    for (handle, rx) in &mut members {
        let expected: Vec<&str> = if *handle == sender { vec![] } else { vec!["ping"] };
        assert_eq!(drain(rx), expected);
    }
}

#[test]
fn nonexistent_room_is_reported() {
    let registry = Registry::new();
    let (_h, mut rx) = connect(&registry);

    let err = registry.emit_to_room("nonexistent", "msg", None).unwrap_err();
    assert_eq!(err, RegistryError::UnknownRoom("nonexistent".to_string()));
    assert_eq!(err.to_string(), "room not found: nonexistent");
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn operations_on_removed_handle_change_nothing() {
    let registry = Registry::new();
    let (h, _rx) = connect(&registry);
    registry.join_room(&h, "A").unwrap();
    registry.remove(&h);

    assert!(registry.join_room(&h, "A").is_err());
    assert!(!registry.leave_room(&h, "A"));
    assert!(registry.leave_all_rooms(&h).is_empty());
    assert!(registry.rooms_of(&h).is_empty());
    assert!(!registry.remove(&h));

    assert_eq!(registry.connection_count(), 0);
    assert!(registry.room_ids().is_empty());
}

#[test]
fn concurrent_adds_produce_unique_ids() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 150;

    let registry = Registry::new();
    let barrier = Barrier::new(THREADS);

    let ids: Vec<String> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    (0..PER_THREAD)
                        .map(|_| {
                            let (tx, _rx) = mpsc::unbounded_channel::<String>();
                            registry.add_generated(tx).unwrap().id().to_string()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
    });

    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(ids.len(), THREADS * PER_THREAD);
    assert_eq!(unique.len(), ids.len());
    assert_eq!(registry.connection_count(), THREADS * PER_THREAD);
}

/// Broadcasts racing against removals never double-deliver, and a removal
/// that completed before a broadcast started always wins.
#[test]
fn broadcast_during_removals_never_duplicates() {
    let registry = Arc::new(Registry::new());
    let mut connections = Vec::new();
    for _ in 0..64 {
        connections.push(connect(&registry));
    }

    let (to_remove, to_keep): (Vec<_>, Vec<_>) =
        connections.into_iter().enumerate().partition(|(i, _)| i % 2 == 0);

    let removed_handles: Vec<ConnectionHandle> =
        to_remove.iter().map(|(_, (h, _))| h.clone()).collect();
    thread::scope(|s| {
        let remover = {
            let registry = Arc::clone(&registry);
            s.spawn(move || {
                for handle in &removed_handles {
                    registry.remove(handle);
                }
            })
        };
        let broadcaster = {
            let registry = Arc::clone(&registry);
            s.spawn(move || registry.broadcast("race"))
        };

        remover.join().unwrap();
        let report = broadcaster.join().unwrap();
        assert!(report.is_complete());
    });

    registry.broadcast("after");

    for (_, (_, mut rx)) in to_keep {
        assert_eq!(drain(&mut rx), vec!["race", "after"]);
    }
    for (_, (_, mut rx)) in to_remove {
        let received = drain(&mut rx);
        assert!(received.is_empty() || received == vec!["race"]);
    }
}

/// Connections added while a broadcast is in flight see the payload at most
/// once, and every connection present before it started sees it exactly once.
#[test]
fn broadcast_during_adds_never_duplicates() {
    const ADDED: usize = 64;

    let registry = Registry::new();
    let (_early, mut early_rx) = connect(&registry);
    let barrier = Barrier::new(2);

    let added: Vec<UnboundedReceiver<String>> = thread::scope(|s| {
        let adder = s.spawn(|| {
            barrier.wait();
            (0..ADDED).map(|_| connect(&registry)).collect::<Vec<_>>()
        });
        let broadcaster = s.spawn(|| {
            barrier.wait();
            (0..8).map(|_| registry.broadcast("race")).collect::<Vec<_>>()
        });

        let reports = broadcaster.join().unwrap();
        assert!(reports.iter().all(|r| r.is_complete()));
        adder.join().unwrap().into_iter().map(|(_, rx)| rx).collect()
    });

    assert_eq!(drain(&mut early_rx).len(), 8);
    for mut rx in added {
        let received = drain(&mut rx);
        assert!(received.len() <= 8);
        assert!(received.iter().all(|m| m == "race"));
    }
}

/// A single broadcast racing adds delivers at most one copy to each newcomer.
#[test]
fn single_broadcast_during_adds_delivers_at_most_once() {
    let registry = Registry::new();
    let barrier = Barrier::new(2);

    let added: Vec<UnboundedReceiver<String>> = thread::scope(|s| {
        let adder = s.spawn(|| {
            barrier.wait();
            (0..64).map(|_| connect(&registry).1).collect::<Vec<_>>()
        });
        s.spawn(|| {
            barrier.wait();
            registry.broadcast("once");
        });
        adder.join().unwrap()
    });

    for mut rx in added {
        assert!(drain(&mut rx).len() <= 1);
    }
}

#[test]
fn concurrent_joins_and_removes_leave_no_orphans() {
    let registry = Registry::new();
    let handles: Vec<_> = (0..32).map(|_| connect(&registry)).collect();

    thread::scope(|s| {
        for (i, (handle, _)) in handles.iter().enumerate() {
            let registry = &registry;
            s.spawn(move || {
                for room in ["A", "B", "C"] {
                    let _ = registry.join_room(handle, room);
                }
                if i % 3 == 0 {
                    registry.remove(handle);
                }
                let _ = registry.join_room(handle, "D");
            });
        }
    });

    let live: HashSet<_> = handles
        .iter()
        .filter(|(h, _)| registry.contains(h))
        .map(|(h, _)| h.id().clone())
        .collect();

    for room in registry.room_ids() {
        for member in registry.room_members(&room) {
            assert!(live.contains(&member), "orphaned member {member} in {room}");
        }
    }
    assert_eq!(registry.room_size("D"), live.len());
}
