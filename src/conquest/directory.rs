//! Player directory - the identity collaborator
//!
//! The conquest engine validates that a tactical move is backed by a real
//! activity owned by the mover and that the mover belongs to a team. Who
//! actually stores users, teams, and activities is someone else's problem;
//! this trait is the whole contract.

use std::sync::RwLock;

use ahash::AHashMap;

use crate::core::types::{ActivityId, TeamId, UserId};

/// Lookup contract the conquest engine requires from its surroundings
pub trait PlayerDirectory: Send + Sync {
    /// Owner of an activity, or None when the activity is unknown
    fn activity_owner(&self, activity: ActivityId) -> Option<UserId>;

    /// Team membership of a user, or None for teamless users
    fn team_of(&self, user: UserId) -> Option<TeamId>;
}

/// In-memory directory used by tests and the feed binary
#[derive(Default)]
pub struct InMemoryDirectory {
    activities: RwLock<AHashMap<ActivityId, UserId>>,
    teams: RwLock<AHashMap<UserId, TeamId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_activity(&self, activity: ActivityId, owner: UserId) {
        self.activities
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(activity, owner);
    }

    pub fn register_team_member(&self, user: UserId, team: TeamId) {
        self.teams
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user, team);
    }
}

impl PlayerDirectory for InMemoryDirectory {
    fn activity_owner(&self, activity: ActivityId) -> Option<UserId> {
        self.activities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&activity)
            .copied()
    }

    fn team_of(&self, user: UserId) -> Option<TeamId> {
        self.teams
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_directory_round_trip() {
        let directory = InMemoryDirectory::new();
        let user = UserId::new();
        let team = TeamId::new();
        let activity = ActivityId::new();

        assert_eq!(directory.activity_owner(activity), None);
        assert_eq!(directory.team_of(user), None);

        directory.register_activity(activity, user);
        directory.register_team_member(user, team);

        assert_eq!(directory.activity_owner(activity), Some(user));
        assert_eq!(directory.team_of(user), Some(team));
    }
}
