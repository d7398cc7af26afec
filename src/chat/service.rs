//! Chat operations as seen by request handlers: one world channel plus the
//! alliance channel directory.

use log::{debug, info};

use super::{ChannelDirectory, ChatGroup, ChatMessage, ChatUser, JoinOutcome};
use crate::error::{GameError, GameResult};
use crate::metrics;
use crate::types::{AllianceId, ChannelKind, PlayerId};

/// A message accepted into a channel and the players it should be pushed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: ChatMessage,
    pub recipients: Vec<PlayerId>,
}

#[derive(Debug)]
pub struct ChatService {
    world: ChatGroup,
    directory: ChannelDirectory,
}

impl ChatService {
    pub fn new(history_limit: usize) -> Self {
        Self {
            world: ChatGroup::new(history_limit),
            directory: ChannelDirectory::new(history_limit),
        }
    }

    pub fn world(&self) -> &ChatGroup {
        &self.world
    }

    pub fn directory(&self) -> &ChannelDirectory {
        &self.directory
    }

    /// Enter the world channel. Every logged-in player may chat there.
    pub fn login(&self, user: ChatUser) {
        info!("player {} entered world chat", user.player_id);
        self.world.enter(user);
    }

    /// Join the alliance channel. The player must already be in the world
    /// channel, which supplies the display name.
    pub fn join_alliance(&self, player_id: PlayerId, alliance_id: AllianceId) -> GameResult<JoinOutcome> {
        let user = self.world.get_user(player_id).ok_or_else(|| {
            GameError::invalid_param(format!("player {} is not in world chat", player_id))
        })?;
        Ok(self.directory.join_alliance(user, alliance_id))
    }

    pub fn history(&self, player_id: PlayerId, channel: ChannelKind) -> Vec<ChatMessage> {
        match channel {
            ChannelKind::World => self.world.history(ChannelKind::World),
            ChannelKind::Alliance => self.directory.history(player_id),
        }
    }

    /// Post `text`. Returns `None` when the sender is not in that channel.
    pub fn send(&self, player_id: PlayerId, channel: ChannelKind, text: &str) -> Option<Delivery> {
        let pushed = match channel {
            ChannelKind::World => self
                .world
                .push_and_recipients(player_id, text, ChannelKind::World),
            ChannelKind::Alliance => self.directory.push_msg(player_id, text),
        };
        match pushed {
            Some((message, recipients)) => {
                metrics::inc_chat_messages();
                Some(Delivery {
                    message,
                    recipients,
                })
            }
            None => {
                metrics::inc_chat_dropped();
                debug!(
                    "dropped {:?} chat from non-member {}",
                    channel, player_id
                );
                None
            }
        }
    }

    pub fn exit(&self, player_id: PlayerId, channel: ChannelKind) {
        match channel {
            ChannelKind::World => {
                self.world.exit(player_id);
            }
            ChannelKind::Alliance => {
                self.directory.leave_alliance(player_id);
            }
        }
    }

    /// Leave every channel.
    pub fn log_out(&self, player_id: PlayerId) {
        self.directory.leave_alliance(player_id);
        self.world.exit(player_id);
        info!("player {} logged out of chat", player_id);
    }
}
