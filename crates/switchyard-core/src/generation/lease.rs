//! Per-goal mutual exclusion for generation runs.
//!
//! At most one generation may be in flight per goal. Callers acquire a
//! lease before invoking the orchestrator; a second acquire while the
//! lease is held fails. The RAII guard releases on drop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

/// Shared registry of goals with a generation in flight.
#[derive(Clone, Default)]
pub struct GoalLeases {
    held: Arc<Mutex<HashSet<Uuid>>>,
}

impl GoalLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to acquire the lease for a goal.
    ///
    /// Returns `None` when a generation for this goal is already running.
    pub fn acquire(&self, goal_id: Uuid) -> Option<GoalLease> {
        let mut held = self.lock();
        if !held.insert(goal_id) {
            return None;
        }
        Some(GoalLease {
            goal_id,
            held: Arc::clone(&self.held),
        })
    }

    /// Whether a generation currently holds the lease for this goal.
    pub fn is_held(&self, goal_id: Uuid) -> bool {
        self.lock().contains(&goal_id)
    }
}

/// RAII guard for one goal's generation slot.
pub struct GoalLease {
    goal_id: Uuid,
    held: Arc<Mutex<HashSet<Uuid>>>,
}

impl GoalLease {
    pub fn goal_id(&self) -> Uuid {
        self.goal_id
    }
}

impl Drop for GoalLease {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.goal_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_deny_then_release() {
        let leases = GoalLeases::new();
        let goal = Uuid::new_v4();

        let lease = leases.acquire(goal).expect("first acquire should succeed");
        assert!(leases.is_held(goal));
        assert!(leases.acquire(goal).is_none(), "second acquire must fail");

        drop(lease);
        assert!(!leases.is_held(goal));
        assert!(leases.acquire(goal).is_some(), "released lease is reusable");
    }

    #[test]
    fn leases_are_per_goal() {
        let leases = GoalLeases::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let _lease_a = leases.acquire(a).unwrap();
        assert!(leases.acquire(b).is_some(), "other goals are unaffected");
    }

    #[test]
    fn clones_share_state() {
        let leases = GoalLeases::new();
        let goal = Uuid::new_v4();
        let clone = leases.clone();

        let _lease = leases.acquire(goal).unwrap();
        assert!(clone.acquire(goal).is_none());
        assert!(clone.is_held(goal));
    }

    #[test]
    fn guard_reports_goal_id() {
        let leases = GoalLeases::new();
        let goal = Uuid::new_v4();
        let lease = leases.acquire(goal).unwrap();
        assert_eq!(lease.goal_id(), goal);
    }
}
