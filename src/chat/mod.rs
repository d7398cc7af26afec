//! Chat channels: the world channel every logged-in player shares and one
//! channel per alliance.

pub mod directory;
pub mod group;
pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelKind, PlayerId};

pub use directory::{ChannelDirectory, JoinOutcome};
pub use group::ChatGroup;
pub use service::{ChatService, Delivery};

/// Membership token held by a channel while the player is inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub player_id: PlayerId,
    pub display_name: String,
}

impl ChatUser {
    pub fn new(player_id: PlayerId, display_name: &str) -> Self {
        Self {
            player_id,
            display_name: display_name.to_string(),
        }
    }
}

/// A line of chat. Never modified after it is appended to a history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: PlayerId,
    pub sender_name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub channel: ChannelKind,
    pub timestamp: DateTime<Utc>,
}
