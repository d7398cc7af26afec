//! A single chat channel: membership, a bounded history ring and fan-out targets.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::Utc;
use log::trace;

use super::{ChatMessage, ChatUser};
use crate::logutil::escape_log;
use crate::sync;
use crate::types::{ChannelKind, PlayerId};

#[derive(Debug, Default)]
struct GroupState {
    members: HashMap<PlayerId, ChatUser>,
    history: VecDeque<ChatMessage>,
}

/// One channel. Members and history share a single lock so that a push sees a
/// membership state consistent with concurrent enters and exits.
#[derive(Debug)]
pub struct ChatGroup {
    state: RwLock<GroupState>,
    history_limit: usize,
}

impl ChatGroup {
    /// `history_limit` is clamped to at least one entry.
    pub fn new(history_limit: usize) -> Self {
        let history_limit = history_limit.max(1);
        Self {
            state: RwLock::new(GroupState {
                members: HashMap::new(),
                history: VecDeque::new(),
            }),
            history_limit,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Add or replace a member.
    pub fn enter(&self, user: ChatUser) {
        sync::write(&self.state)
            .members
            .insert(user.player_id, user);
    }

    /// Remove a member. Returns whether the player was present.
    pub fn exit(&self, player_id: PlayerId) -> bool {
        sync::write(&self.state).members.remove(&player_id).is_some()
    }

    pub fn get_user(&self, player_id: PlayerId) -> Option<ChatUser> {
        sync::read(&self.state).members.get(&player_id).cloned()
    }

    pub fn is_member(&self, player_id: PlayerId) -> bool {
        sync::read(&self.state).members.contains_key(&player_id)
    }

    pub fn member_count(&self) -> usize {
        sync::read(&self.state).members.len()
    }

    pub fn is_empty(&self) -> bool {
        sync::read(&self.state).members.is_empty()
    }

    /// Current member ids, sorted.
    pub fn member_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = sync::read(&self.state).members.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Append a message from `sender_id` and return it for broadcast.
    ///
    /// A sender that is not a member is ignored and `None` comes back.
    pub fn push_msg(&self, sender_id: PlayerId, text: &str, channel: ChannelKind) -> Option<ChatMessage> {
        let mut state = sync::write(&self.state);
        self.append(&mut state, sender_id, text, channel)
    }

    /// Push and also return the members to fan the message out to, both taken
    /// under the same lock acquisition.
    pub fn push_and_recipients(
        &self,
        sender_id: PlayerId,
        text: &str,
        channel: ChannelKind,
    ) -> Option<(ChatMessage, Vec<PlayerId>)> {
        let mut state = sync::write(&self.state);
        let message = self.append(&mut state, sender_id, text, channel)?;
        let mut recipients: Vec<PlayerId> = state.members.keys().copied().collect();
        recipients.sort_unstable();
        Some((message, recipients))
    }

    fn append(
        &self,
        state: &mut GroupState,
        sender_id: PlayerId,
        text: &str,
        channel: ChannelKind,
    ) -> Option<ChatMessage> {
        let sender = state.members.get(&sender_id)?;
        let message = ChatMessage {
            sender_id,
            sender_name: sender.display_name.clone(),
            text: text.to_string(),
            channel,
            timestamp: Utc::now(),
        };
        if state.history.len() >= self.history_limit {
            state.history.pop_front();
        }
        state.history.push_back(message.clone());
        trace!(
            "chat[{:?}] {}: {}",
            channel,
            sender_id,
            escape_log(&message.text)
        );
        Some(message)
    }

    /// Snapshot of the history in append order, stamped with `channel`.
    pub fn history(&self, channel: ChannelKind) -> Vec<ChatMessage> {
        sync::read(&self.state)
            .history
            .iter()
            .map(|m| ChatMessage {
                channel,
                ..m.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: PlayerId) -> ChatUser {
        ChatUser::new(id, &format!("p{}", id))
    }

    #[test]
    fn membership_follows_last_operation() {
        let group = ChatGroup::new(10);
        group.enter(user(1));
        group.enter(user(2));
        group.enter(user(1));
        assert!(group.exit(2));
        assert!(!group.exit(2));
        group.enter(user(3));
        group.exit(99);
        assert_eq!(group.member_ids(), vec![1, 3]);
    }

    #[test]
    fn huge_history_limit_allocates_on_demand() {
        let group = ChatGroup::new(usize::MAX);
        group.enter(user(1));
        assert!(group.push_msg(1, "hi", ChannelKind::World).is_some());
        assert_eq!(group.history(ChannelKind::World).len(), 1);
    }

    #[test]
    fn reentry_overwrites_display_name() {
        let group = ChatGroup::new(10);
        group.enter(ChatUser::new(1, "old"));
        group.enter(ChatUser::new(1, "new"));
        assert_eq!(group.member_count(), 1);
        assert_eq!(group.get_user(1).unwrap().display_name, "new");
    }

    #[test]
    fn non_member_push_is_ignored() {
        let group = ChatGroup::new(10);
        assert!(group.push_msg(5, "hello", ChannelKind::World).is_none());
        assert!(group.history(ChannelKind::World).is_empty());
    }

    #[test]
    fn history_evicts_oldest_at_capacity() {
        let group = ChatGroup::new(3);
        group.enter(user(1));
        for i in 0..5 {
            group.push_msg(1, &format!("m{}", i), ChannelKind::World);
        }
        let texts: Vec<String> = group
            .history(ChannelKind::World)
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn history_is_a_snapshot() {
        let group = ChatGroup::new(3);
        group.enter(user(1));
        group.push_msg(1, "first", ChannelKind::Alliance);
        let snap = group.history(ChannelKind::Alliance);
        group.push_msg(1, "second", ChannelKind::Alliance);
        assert_eq!(snap.len(), 1);
        assert_eq!(group.history(ChannelKind::Alliance).len(), 2);
    }

    #[test]
    fn pushed_message_carries_sender_name() {
        let group = ChatGroup::new(3);
        group.enter(ChatUser::new(7, "Cao"));
        let (msg, recipients) = group
            .push_and_recipients(7, "hi", ChannelKind::World)
            .expect("member push");
        assert_eq!(msg.sender_name, "Cao");
        assert_eq!(recipients, vec![7]);
    }

    #[test]
    fn zero_limit_is_clamped() {
        let group = ChatGroup::new(0);
        assert_eq!(group.history_limit(), 1);
    }
}
