//! Routes each player to at most one alliance channel.
//!
//! Both maps live behind one `RwLock`. Any change to alliance membership takes
//! the directory write lock first and the group locks inside it, so a reader
//! never sees a player in two alliance groups, or mapped to a group it is not
//! a member of. Group locks are always leaves.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;

use super::{ChatGroup, ChatMessage, ChatUser};
use crate::sync;
use crate::types::{AllianceId, ChannelKind, PlayerId, NO_ALLIANCE};

#[derive(Debug, Default)]
struct DirectoryState {
    alliance_groups: HashMap<AllianceId, Arc<ChatGroup>>,
    player_alliance: HashMap<PlayerId, AllianceId>,
}

/// What a join request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Moved { from: AllianceId },
    Unchanged,
    /// Alliance id 0: the player was taken out of any alliance channel.
    Left,
}

#[derive(Debug)]
pub struct ChannelDirectory {
    state: RwLock<DirectoryState>,
    history_limit: usize,
}

impl ChannelDirectory {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
            history_limit,
        }
    }

    /// Put `user` into the channel of `alliance_id`, leaving any previous one.
    pub fn join_alliance(&self, user: ChatUser, alliance_id: AllianceId) -> JoinOutcome {
        if alliance_id == NO_ALLIANCE {
            self.leave_alliance(user.player_id);
            return JoinOutcome::Left;
        }

        let player_id = user.player_id;
        let mut state = sync::write(&self.state);
        let outcome = match state.player_alliance.get(&player_id).copied() {
            Some(current) if current == alliance_id => return JoinOutcome::Unchanged,
            Some(current) => {
                Self::exit_group(&mut state, current, player_id);
                JoinOutcome::Moved { from: current }
            }
            None => JoinOutcome::Joined,
        };

        let history_limit = self.history_limit;
        state
            .alliance_groups
            .entry(alliance_id)
            .or_insert_with(|| Arc::new(ChatGroup::new(history_limit)))
            .enter(user);
        state.player_alliance.insert(player_id, alliance_id);
        debug!(
            "player {} alliance channel {:?} -> {}",
            player_id, outcome, alliance_id
        );
        outcome
    }

    /// Remove the player's alliance membership and mapping. Returns the alliance left, if any.
    pub fn leave_alliance(&self, player_id: PlayerId) -> Option<AllianceId> {
        let mut state = sync::write(&self.state);
        let current = state.player_alliance.remove(&player_id)?;
        Self::exit_group(&mut state, current, player_id);
        debug!("player {} left alliance channel {}", player_id, current);
        Some(current)
    }

    /// Best-effort exit from one alliance group; drops the group once it is empty.
    fn exit_group(state: &mut DirectoryState, alliance_id: AllianceId, player_id: PlayerId) {
        let Some(group) = state.alliance_groups.get(&alliance_id) else {
            return;
        };
        group.exit(player_id);
        if group.is_empty() {
            state.alliance_groups.remove(&alliance_id);
        }
    }

    pub fn alliance_of(&self, player_id: PlayerId) -> Option<AllianceId> {
        sync::read(&self.state).player_alliance.get(&player_id).copied()
    }

    /// Alliance-channel history for the player's current alliance; empty when unmapped.
    pub fn history(&self, player_id: PlayerId) -> Vec<ChatMessage> {
        let state = sync::read(&self.state);
        state
            .player_alliance
            .get(&player_id)
            .and_then(|id| state.alliance_groups.get(id))
            .map(|group| group.history(ChannelKind::Alliance))
            .unwrap_or_default()
    }

    /// Push to the player's current alliance channel. Returns the message and
    /// its recipients, or `None` when the player has no alliance channel.
    pub fn push_msg(&self, player_id: PlayerId, text: &str) -> Option<(ChatMessage, Vec<PlayerId>)> {
        let state = sync::read(&self.state);
        let alliance_id = state.player_alliance.get(&player_id)?;
        state
            .alliance_groups
            .get(alliance_id)?
            .push_and_recipients(player_id, text, ChannelKind::Alliance)
    }

    /// Members of an alliance channel, sorted. Empty when the channel does not exist.
    pub fn members(&self, alliance_id: AllianceId) -> Vec<PlayerId> {
        sync::read(&self.state)
            .alliance_groups
            .get(&alliance_id)
            .map(|group| group.member_ids())
            .unwrap_or_default()
    }

    pub fn group_count(&self) -> usize {
        sync::read(&self.state).alliance_groups.len()
    }

    /// Check the dual-map invariant. Used by tests and debug assertions.
    pub fn is_consistent(&self) -> bool {
        let state = sync::read(&self.state);
        let mapped_ok = state.player_alliance.iter().all(|(player, alliance)| {
            state
                .alliance_groups
                .get(alliance)
                .map(|g| g.is_member(*player))
                .unwrap_or(false)
        });
        let groups_ok = state.alliance_groups.iter().all(|(alliance, group)| {
            group
                .member_ids()
                .iter()
                .all(|p| state.player_alliance.get(p) == Some(alliance))
        });
        mapped_ok && groups_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: PlayerId) -> ChatUser {
        ChatUser::new(id, &format!("p{}", id))
    }

    #[test]
    fn join_records_mapping_and_membership() {
        let dir = ChannelDirectory::new(10);
        assert_eq!(dir.join_alliance(user(1), 5), JoinOutcome::Joined);
        assert_eq!(dir.alliance_of(1), Some(5));
        assert_eq!(dir.members(5), vec![1]);
        assert!(dir.is_consistent());
    }

    #[test]
    fn switching_alliance_moves_membership() {
        let dir = ChannelDirectory::new(10);
        dir.join_alliance(user(1), 5);
        dir.join_alliance(user(2), 5);
        assert_eq!(dir.join_alliance(user(1), 6), JoinOutcome::Moved { from: 5 });
        assert_eq!(dir.members(5), vec![2]);
        assert_eq!(dir.members(6), vec![1]);
        assert!(dir.is_consistent());
    }

    #[test]
    fn same_alliance_is_a_noop() {
        let dir = ChannelDirectory::new(10);
        dir.join_alliance(user(1), 5);
        assert_eq!(dir.join_alliance(user(1), 5), JoinOutcome::Unchanged);
        assert_eq!(dir.members(5), vec![1]);
    }

    #[test]
    fn empty_groups_are_dropped() {
        let dir = ChannelDirectory::new(10);
        dir.join_alliance(user(1), 5);
        dir.join_alliance(user(1), 6);
        assert_eq!(dir.group_count(), 1);
        assert_eq!(dir.leave_alliance(1), Some(6));
        assert_eq!(dir.group_count(), 0);
        assert_eq!(dir.leave_alliance(1), None);
    }

    #[test]
    fn alliance_zero_means_leave() {
        let dir = ChannelDirectory::new(10);
        dir.join_alliance(user(1), 5);
        assert_eq!(dir.join_alliance(user(1), NO_ALLIANCE), JoinOutcome::Left);
        assert_eq!(dir.alliance_of(1), None);
        assert!(dir.members(5).is_empty());
    }

    #[test]
    fn unmapped_player_gets_empty_results() {
        let dir = ChannelDirectory::new(10);
        assert!(dir.history(3).is_empty());
        assert!(dir.push_msg(3, "hello").is_none());
    }

    #[test]
    fn history_follows_current_alliance() {
        let dir = ChannelDirectory::new(10);
        dir.join_alliance(user(1), 5);
        dir.join_alliance(user(2), 5);
        let (msg, recipients) = dir.push_msg(1, "to five").expect("pushed");
        assert_eq!(msg.channel, ChannelKind::Alliance);
        assert_eq!(recipients, vec![1, 2]);

        dir.join_alliance(user(2), 6);
        assert!(dir.history(2).is_empty());
        assert_eq!(dir.history(1).len(), 1);
    }
}
