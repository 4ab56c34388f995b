use std::collections::HashMap;
use std::time::Instant;

use super::queue::WaitingQueue;
use super::user::{User, UserId, UserState};

/// Side effects produced by a state transition, for the caller (the
/// `MatchEngine` actor) to turn into outbound transport events.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    StateChanged {
        id: UserId,
        old: UserState,
        new: UserState,
    },
    /// Emitted when leaving `matched` drags a live partner back to
    /// `waiting` along with it (spec.md §4.1, "matched → anything else").
    PartnerDisconnected { partner: UserId, left: UserId },
}

/// Authoritative map of connected clients and their lifecycle state
/// (spec.md §4.1). Exclusively owns `id -> User`; every other component
/// holds only ids.
#[derive(Default)]
pub struct UserRegistry {
    users: HashMap<UserId, User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: UserId) -> bool {
        if self.users.contains_key(&id) {
            return false;
        }
        self.users.insert(id, User::new(id));
        true
    }

    pub fn remove(&mut self, id: UserId) -> Option<User> {
        self.users.remove(&id)
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn get_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.get_mut(&id)
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Applies a state transition and its side effects (spec.md §4.1),
    /// returning events the caller must translate into outbound notices.
    pub fn set_state(
        &mut self,
        id: UserId,
        new_state: UserState,
        queue: &mut WaitingQueue,
    ) -> Vec<RegistryEvent> {
        let mut events = Vec::new();

        let old_state = match self.users.get(&id) {
            Some(u) => u.state,
            None => return events,
        };

        if old_state == UserState::Waiting && new_state != UserState::Waiting {
            queue.remove(id);
        }

        if old_state == UserState::Matched && new_state != UserState::Matched {
            if let Some(partner_id) = self.users.get(&id).and_then(|u| u.matched_with) {
                let partner_points_back = self
                    .users
                    .get(&partner_id)
                    .map(|p| p.matched_with == Some(id))
                    .unwrap_or(false);

                if partner_points_back {
                    if let Some(partner) = self.users.get_mut(&partner_id) {
                        partner.state = UserState::Waiting;
                        partner.matched_with = None;
                        partner.joined_at = Instant::now();
                        queue.push_tail(partner_id);
                    }
                    events.push(RegistryEvent::PartnerDisconnected {
                        partner: partner_id,
                        left: id,
                    });
                }
            }
        }

        if let Some(user) = self.users.get_mut(&id) {
            if new_state == UserState::Waiting {
                user.matched_with = None;
                user.joined_at = Instant::now();
                queue.push_tail(id);
            }
            user.state = new_state;
        }

        events.push(RegistryEvent::StateChanged {
            id,
            old: old_state,
            new: new_state,
        });
        events
    }
}
