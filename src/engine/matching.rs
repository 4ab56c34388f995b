//! Pairing policy: eligibility, selection, and queue processing
//! (spec.md §4.3.1-§4.3.4). Kept free of actix so the invariants can be
//! exercised directly by property tests against plain `UserRegistry` +
//! `WaitingQueue` values.

use std::time::Duration;

use crate::core::queue::WaitingQueue;
use crate::core::registry::UserRegistry;
use crate::core::user::{User, UserId};
use crate::env::MatchingSettings;

/// A pair the caller should turn into a room. `initiator` is whichever of
/// the two has the smaller `joined_at` (spec.md §4.3.3 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub a: UserId,
    pub b: UserId,
}

/// Hard guards only: cooldown, mutual block list, and the interception
/// guard (spec.md §4.3.1). Does not consider novelty; that is a
/// preference applied by `tier`, not an eligibility gate.
pub fn eligible(a: &User, b: &User, registry: &UserRegistry, settings: &MatchingSettings) -> bool {
    if a.id == b.id {
        return false;
    }
    if !a.is_waiting() || !b.is_waiting() {
        return false;
    }
    if a.blocked_users.contains(&b.id) || b.blocked_users.contains(&a.id) {
        return false;
    }
    let cooldown = Duration::from_millis(settings.skip_cooldown_ms);
    if let Some(t) = a.recent_skips.get(&b.id) {
        if t.elapsed() < cooldown {
            return false;
        }
    }
    if let Some(t) = b.recent_skips.get(&a.id) {
        if t.elapsed() < cooldown {
            return false;
        }
    }
    // Interception guard: no third user may already be matched with either
    // candidate (spec.md §4.3.1). Structurally this should never trigger
    // given a correctly-maintained registry, but match creation re-checks
    // it defensively (property P5).
    let intercepted = registry.iter().any(|c| {
        c.is_matched() && (c.matched_with == Some(a.id) || c.matched_with == Some(b.id))
    });
    !intercepted
}

/// Selection preference tier among eligible candidates (spec.md §4.3.2).
/// Lower is preferred; ties within a tier are broken by FIFO order, which
/// the caller already guarantees by scanning the snapshot oldest-first.
fn tier(a: &User, b: &User) -> u8 {
    let never_matched_either_direction =
        !a.previous_matches.contains(&b.id) && !b.previous_matches.contains(&a.id);
    if never_matched_either_direction {
        return 0;
    }
    let novel_to_a = !a.previous_matches.contains(&b.id);
    if novel_to_a {
        1
    } else {
        2
    }
}

/// Finds the best eligible partner for `anchor` among `candidates`,
/// applying the §4.3.2 preference tiers. `candidates` must be in FIFO
/// (ascending `joined_at`) order for tie-breaking to hold.
fn best_partner_for(
    anchor: &User,
    candidates: &[UserId],
    registry: &UserRegistry,
    settings: &MatchingSettings,
) -> Option<UserId> {
    let mut best: Option<(UserId, u8)> = None;
    for &candidate_id in candidates {
        if candidate_id == anchor.id {
            continue;
        }
        let candidate = match registry.get(candidate_id) {
            Some(u) => u,
            None => continue,
        };
        if !eligible(anchor, candidate, registry, settings) {
            continue;
        }
        let t = tier(anchor, candidate);
        match best {
            Some((_, best_tier)) if t >= best_tier => {}
            _ => best = Some((candidate_id, t)),
        }
        if t == 0 {
            break;
        }
    }
    best.map(|(id, _)| id)
}

/// Runs one full queue-processing pass (spec.md §4.3.4 steps 1-3):
/// snapshots the queue, evicts stale entries, and walks it in FIFO order
/// pairing off every match it can find. Returns the matches created, in
/// creation order; the caller is responsible for actually mutating state
/// (registry/queue/rooms) for each pair, since that also has to emit
/// transport events.
pub fn process_queue(
    registry: &mut UserRegistry,
    queue: &mut WaitingQueue,
    settings: &MatchingSettings,
    mut on_match: impl FnMut(&mut UserRegistry, &mut WaitingQueue, MatchedPair),
) {
    // Step 2: evict entries that no longer belong in the queue.
    for id in queue.snapshot() {
        let still_waiting = registry.get(id).map(|u| u.is_waiting()).unwrap_or(false);
        if !still_waiting {
            queue.remove(id);
        }
    }

    loop {
        let snapshot = queue.snapshot();
        if snapshot.len() < 2 {
            break;
        }

        let mut made_match = None;
        for (i, &anchor_id) in snapshot.iter().enumerate() {
            let anchor = match registry.get(anchor_id) {
                Some(u) if u.is_waiting() => u,
                _ => continue,
            };
            if let Some(partner_id) = best_partner_for(anchor, &snapshot[i + 1..], registry, settings) {
                made_match = Some(MatchedPair {
                    a: anchor_id,
                    b: partner_id,
                });
                break;
            }
        }

        // Step 4: relaxed pass among the two oldest waiters, hard guards
        // only, if the strict scan above found nothing.
        let made_match = made_match.or_else(|| {
            if snapshot.len() < 2 {
                return None;
            }
            let (a_id, b_id) = (snapshot[0], snapshot[1]);
            let a = registry.get(a_id)?;
            let b = registry.get(b_id)?;
            if eligible(a, b, registry, settings) {
                Some(MatchedPair { a: a_id, b: b_id })
            } else {
                None
            }
        });

        match made_match {
            Some(pair) => on_match(registry, queue, pair),
            None => break,
        }
    }
}

/// Computes the reconnection shield for `user` at search-start
/// (spec.md §4.3.7): every currently-matched user whose id, or whose
/// partner's id, appears in `user`'s `previousMatches` gets added to
/// `user.blockedUsers`.
pub fn recompute_blocked_users(user_id: UserId, registry: &mut UserRegistry) {
    let previous = match registry.get(user_id) {
        Some(u) => u.previous_matches.clone(),
        None => return,
    };
    let mut to_block = Vec::new();
    for other in registry.iter() {
        if !other.is_matched() {
            continue;
        }
        let partner = other.matched_with;
        if previous.contains(&other.id) || partner.map(|p| previous.contains(&p)).unwrap_or(false) {
            to_block.push(other.id);
            if let Some(p) = partner {
                to_block.push(p);
            }
        }
    }
    if let Some(user) = registry.get_mut(user_id) {
        for id in to_block {
            user.blocked_users.insert(id);
        }
    }
}
