use std::collections::{HashMap, HashSet};
use std::time::Instant;

use uuid::Uuid;

pub type UserId = Uuid;

/// Lifecycle state of a connected client. See spec.md §3.1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserState {
    Idle,
    Waiting,
    Matched,
}

/// One connected client. Owned exclusively by `UserRegistry`; every other
/// component only ever holds a `UserId` and asks the registry for a lookup.
#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub state: UserState,
    pub joined_at: Instant,
    pub matched_with: Option<UserId>,
    pub previous_matches: Vec<UserId>,
    pub recent_skips: HashMap<UserId, Instant>,
    /// Timestamp of this user's most recent dispatched command; used to
    /// gate `previous_matches` age-off on a >30s inactivity window
    /// (spec.md §4.3.7).
    pub last_active_at: Instant,
    /// Reconnection shield block list, populated at search-start and never
    /// cleared for the lifetime of the connection (spec.md §9 Open Question).
    // TODO: this grows unboundedly for very long-lived connections that
    // start-search many times; spec.md documents no expiry policy for it.
    pub blocked_users: HashSet<UserId>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            state: UserState::Idle,
            joined_at: Instant::now(),
            matched_with: None,
            previous_matches: Vec::new(),
            recent_skips: HashMap::new(),
            last_active_at: Instant::now(),
            blocked_users: HashSet::new(),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.state == UserState::Waiting
    }

    pub fn is_matched(&self) -> bool {
        self.state == UserState::Matched
    }

    /// Records a new partner, keeping only the three most recent entries
    /// once the caller has decided an age-off is due (spec.md §4.3.7).
    pub fn push_previous_match(&mut self, partner: UserId) {
        self.previous_matches.retain(|id| *id != partner);
        self.previous_matches.push(partner);
    }

    pub fn age_off_previous_matches(&mut self) {
        let len = self.previous_matches.len();
        if len > 3 {
            self.previous_matches.drain(0..len - 3);
        }
    }

    /// Whether this user has issued no command in longer than `threshold`
    /// (spec.md §4.3.7, "Age-off previous matches when the user has been
    /// inactive > 30 s").
    pub fn is_inactive(&self, threshold: std::time::Duration) -> bool {
        self.last_active_at.elapsed() > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn freshly_active_user_is_not_inactive() {
        let user = User::new(UserId::new_v4());
        assert!(!user.is_inactive(Duration::from_secs(30)));
    }

    #[test]
    fn age_off_retains_only_the_most_recent_three() {
        let mut user = User::new(UserId::new_v4());
        for _ in 0..5 {
            user.push_previous_match(UserId::new_v4());
        }
        assert_eq!(user.previous_matches.len(), 5);
        user.age_off_previous_matches();
        assert_eq!(user.previous_matches.len(), 3);
    }
}
