//! Fuzz target for Registry membership bookkeeping
//!
//! Prevent orphaned memberships and duplicate delivery
//!
//! # Strategy
//!
//! - Arbitrary interleavings of add, remove, join, leave and emit
//! - Supplied ids that collide with live and with removed connections
//! - Operations on handles after they were removed
//! - Peers whose receiving end has been dropped
//!
//! # Invariants
//!
//! - Every room member is a live connection
//! - A live connection lists exactly the rooms that list it
//! - No room is left without members
//! - Emit never reaches the excluded connection or a non-member
//! - No connection receives a payload more than once per pass

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomcast_core::{ConnectionHandle, ConnectionId, Registry, RegistryConfig, SeededIds};
use tokio::sync::mpsc::{self, UnboundedReceiver};

const ROOMS: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Add { fixed_id: Option<u8> },
    Remove { conn: u8 },
    Join { conn: u8, room: u8 },
    Leave { conn: u8, room: u8 },
    LeaveAll { conn: u8 },
    Emit { room: u8, exclude: Option<u8> },
    Broadcast,
    CloseReceiver { conn: u8 },
}

struct Conn {
    handle: ConnectionHandle,
    rx: Option<UnboundedReceiver<String>>,
}

fn pick<'a>(conns: &'a [Conn], idx: u8) -> Option<&'a Conn> {
    if conns.is_empty() { None } else { conns.get(idx as usize % conns.len()) }
}

fn drain(conn: &mut Conn) -> usize {
    let Some(rx) = conn.rx.as_mut() else {
        return 0;
    };
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

fn check_invariants(registry: &Registry<SeededIds>, conns: &[Conn]) {
    for room in registry.room_ids() {
        let members = registry.room_members(&room);
        assert!(!members.is_empty(), "room {room} has no members but is listed");

        for id in members {
            let handle = registry.get(&id).expect("room member must be live");
            assert!(registry.rooms_of(&handle).contains(&room), "back-index missing {room}");
        }
    }

    for conn in conns {
        if !registry.contains(&conn.handle) {
            assert!(registry.rooms_of(&conn.handle).is_empty());
            continue;
        }
        for room in registry.rooms_of(&conn.handle) {
            assert!(registry.room_members(&room).contains(conn.handle.id()));
        }
    }
}

fuzz_target!(|scenario: Scenario| {
    let config = RegistryConfig { max_connections: 32, max_rooms_per_connection: 2 };
    let registry = Registry::with_id_source(config, SeededIds::with_seed(scenario.seed));
    let mut conns: Vec<Conn> = Vec::new();

    for op in scenario.ops.into_iter().take(256) {
        match op {
            Op::Add { fixed_id } => {
                let (tx, rx) = mpsc::unbounded_channel::<String>();
                let id = fixed_id.map(|n| ConnectionId::new(format!("fixed-{}", n % 4)));
                if let Ok(handle) = registry.add(tx, id) {
                    conns.push(Conn { handle, rx: Some(rx) });
                }
            },
            Op::Remove { conn } => {
                if let Some(c) = pick(&conns, conn) {
                    registry.remove(&c.handle);
                    assert!(!registry.contains(&c.handle));
                }
            },
            Op::Join { conn, room } => {
                if let Some(c) = pick(&conns, conn) {
                    let room = ROOMS[room as usize % ROOMS.len()];
                    let live = registry.contains(&c.handle);
                    let joined = registry.join_room(&c.handle, room);
                    assert_eq!(live, joined.is_ok() || registry.rooms_of(&c.handle).len() == 2);
                }
            },
            Op::Leave { conn, room } => {
                if let Some(c) = pick(&conns, conn) {
                    let room = ROOMS[room as usize % ROOMS.len()];
                    registry.leave_room(&c.handle, room);
                    assert!(!registry.is_member(&c.handle, room));
                }
            },
            Op::LeaveAll { conn } => {
                if let Some(c) = pick(&conns, conn) {
                    registry.leave_all_rooms(&c.handle);
                    assert!(registry.rooms_of(&c.handle).is_empty());
                }
            },
            Op::Emit { room, exclude } => {
                let room = ROOMS[room as usize % ROOMS.len()];
                let excluded = exclude.and_then(|e| pick(&conns, e)).map(|c| c.handle.clone());
                let members = registry.room_members(room);

                let result = registry.emit_to_room(room, "emit", excluded.as_ref());
                assert_eq!(result.is_err(), members.is_empty());

                for conn in &mut conns {
                    let received = drain(conn);
                    let is_target = registry.contains(&conn.handle)
                        && members.contains(conn.handle.id())
                        && excluded.as_ref().is_none_or(|e| e.id() != conn.handle.id());
                    assert!(received <= usize::from(is_target));
                }
            },
            Op::Broadcast => {
                registry.broadcast("all");
                for conn in &mut conns {
                    assert!(drain(conn) <= 1);
                }
            },
            Op::CloseReceiver { conn } => {
                if !conns.is_empty() {
                    let idx = conn as usize % conns.len();
                    conns[idx].rx = None;
                }
            },
        }

        check_invariants(&registry, &conns);
    }
});
