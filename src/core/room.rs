use std::time::Instant;

use super::user::UserId;

/// A live pairing (spec.md §3.1). No separate record is strictly required
/// by the spec beyond the two users' `matched_with` pointers, but
/// `last_activity_at` must be tracked for the abandoned-room sweep, so the
/// engine keeps one of these per active match.
#[derive(Clone, Debug)]
pub struct Room {
    pub id: String,
    pub participants: (UserId, UserId),
    pub created_at: Instant,
    pub last_activity_at: Instant,
    pub initiator: UserId,
}

impl Room {
    pub fn new(id: String, a: UserId, b: UserId, initiator: UserId) -> Self {
        let now = Instant::now();
        Self {
            id,
            participants: (a, b),
            created_at: now,
            last_activity_at: now,
            initiator,
        }
    }

    pub fn other(&self, user: UserId) -> Option<UserId> {
        let (a, b) = self.participants;
        if a == user {
            Some(b)
        } else if b == user {
            Some(a)
        } else {
            None
        }
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.participants.0 == user || self.participants.1 == user
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }
}

/// Generates ids of the form `room_<monotonic>_<rand>` (spec.md §3.1).
pub struct RoomIdGenerator {
    counter: std::sync::atomic::AtomicU64,
}

impl RoomIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: std::sync::atomic::AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> String {
        use rand::Rng;
        let seq = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let suffix: u32 = rand::thread_rng().gen();
        format!("room_{}_{:08x}", seq, suffix)
    }
}

impl Default for RoomIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
