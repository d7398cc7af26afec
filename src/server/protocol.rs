//! Request/response envelopes and the typed payload of every route.
//!
//! A request's `msg` is decoded once into the route's request struct and
//! validated by [`Validate`]; handlers never look at raw JSON.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::config::{BuildCostConfig, Config};
use crate::error::{GameError, GameResult, StatusCode};
use crate::territory::{BuildSite, MAX_SCAN_LENGTH};
use crate::types::{AllianceId, ChannelKind, PlayerId, StructureKind, NO_ALLIANCE};
use crate::validation::{sanitize_chat_text, validate_display_name};

pub const CHAT_LOGIN: &str = "chat.login";
pub const CHAT_JOIN: &str = "chat.join";
pub const CHAT_HISTORY: &str = "chat.history";
pub const CHAT_CHAT: &str = "chat.chat";
pub const CHAT_EXIT: &str = "chat.exit";
pub const CHAT_LOGOUT: &str = "chat.logOut";
/// Server-initiated broadcast of an accepted chat message.
pub const CHAT_PUSH: &str = "chat.push";
pub const MAP_CONFIG: &str = "nationMap.config";
pub const MAP_SCAN_BLOCK: &str = "nationMap.scanBlock";
pub const MAP_BUILD: &str = "nationMap.build";
pub const MAP_GIVE_UP: &str = "nationMap.giveUp";
pub const MAP_CANCEL_GIVE_UP: &str = "nationMap.cancelGiveUp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub name: String,
    #[serde(default)]
    pub msg: Value,
}

impl Request {
    pub fn new(seq: i64, name: &str, msg: Value) -> Self {
        Self {
            seq,
            name: name.to_string(),
            msg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    pub name: String,
    pub code: StatusCode,
    pub msg: Value,
}

/// Outcome of one handler: a status code plus the payload, which echoes the
/// request parameters whether or not the operation succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub code: StatusCode,
    pub msg: T,
}

impl<T> Reply<T> {
    pub fn ok(msg: T) -> Self {
        Self {
            code: StatusCode::Ok,
            msg,
        }
    }

    pub fn with(code: StatusCode, msg: T) -> Self {
        Self { code, msg }
    }

    pub fn from_error(err: &GameError, msg: T) -> Self {
        Self::with(err.code(), msg)
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

/// Decode a request payload. Any shape mismatch is an `InvalidParam`.
/// A missing payload decodes as an empty object.
pub fn decode<T: DeserializeOwned>(msg: &Value) -> GameResult<T> {
    let value = match msg {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| GameError::invalid_param(format!("malformed request: {}", e)))
}

/// Central request validation. May normalise fields in place.
pub trait Validate {
    fn validate(&mut self, _config: &Config) -> GameResult<()> {
        Ok(())
    }
}

fn check_on_map(config: &Config, x: i32, y: i32) -> GameResult<()> {
    if config.world.contains(x, y) {
        Ok(())
    } else {
        Err(GameError::invalid_param(format!(
            "position ({},{}) is outside the map",
            x, y
        )))
    }
}

// ----------------------------------------------------------------------
// chat.*
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReq {
    pub rid: PlayerId,
    pub nick_name: String,
    pub token: String,
}

impl Validate for LoginReq {
    fn validate(&mut self, _config: &Config) -> GameResult<()> {
        if self.rid <= 0 {
            return Err(GameError::invalid_param("rid must be positive"));
        }
        if self.token.is_empty() {
            return Err(GameError::invalid_param("token is required"));
        }
        self.nick_name = validate_display_name(&self.nick_name)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRsp {
    pub rid: PlayerId,
    pub nick_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinReq {
    #[serde(rename = "type")]
    pub channel: ChannelKind,
    #[serde(default)]
    pub id: AllianceId,
}

impl Validate for JoinReq {
    fn validate(&mut self, _config: &Config) -> GameResult<()> {
        if self.id < NO_ALLIANCE {
            return Err(GameError::invalid_param("alliance id cannot be negative"));
        }
        Ok(())
    }
}

pub type JoinRsp = JoinReq;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReq {
    #[serde(rename = "type")]
    pub channel: ChannelKind,
}

impl Validate for ChannelReq {}

/// Echo of `chat.exit`.
pub type ExitRsp = ChannelReq;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRsp {
    #[serde(rename = "type")]
    pub channel: ChannelKind,
    pub msgs: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReq {
    #[serde(rename = "type")]
    pub channel: ChannelKind,
    pub msg: String,
}

impl Validate for ChatReq {
    fn validate(&mut self, config: &Config) -> GameResult<()> {
        self.msg = sanitize_chat_text(&self.msg, config.chat.max_message_len)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRsp {
    #[serde(rename = "type")]
    pub channel: ChannelKind,
    pub msg: String,
    /// The stored message; absent when the sender was not in the channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LogoutReq {
    #[serde(default)]
    pub rid: PlayerId,
}

impl Validate for LogoutReq {}

pub type LogoutRsp = LogoutReq;

// ----------------------------------------------------------------------
// nationMap.*
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigReq {}

impl Validate for ConfigReq {}

/// One catalogue row as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConf {
    #[serde(rename = "type")]
    pub kind: StructureKind,
    pub name: String,
    pub level: u8,
    pub grain: u64,
    pub wood: u64,
    pub iron: u64,
    pub stone: u64,
    pub gold: u64,
    pub durable: u32,
    pub defender: u32,
    pub time: u64,
}

impl From<&BuildCostConfig> for BuildConf {
    fn from(cfg: &BuildCostConfig) -> Self {
        Self {
            kind: cfg.kind,
            name: cfg.name.clone(),
            level: cfg.level,
            grain: cfg.grain,
            wood: cfg.wood,
            iron: cfg.iron,
            stone: cfg.stone,
            gold: cfg.gold,
            durable: cfg.durable,
            defender: cfg.defender,
            time: cfg.time_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRsp {
    pub confs: Vec<BuildConf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanBlockReq {
    pub x: i32,
    pub y: i32,
    pub length: i32,
}

impl Validate for ScanBlockReq {
    fn validate(&mut self, _config: &Config) -> GameResult<()> {
        if self.length <= 0 || self.length > MAX_SCAN_LENGTH {
            return Err(GameError::invalid_param(format!(
                "scan length must be within 1..={}",
                MAX_SCAN_LENGTH
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRsp {
    pub x: i32,
    pub y: i32,
    pub length: i32,
    pub sites: Vec<BuildSite>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReq {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: StructureKind,
}

impl Validate for BuildReq {
    fn validate(&mut self, config: &Config) -> GameResult<()> {
        check_on_map(config, self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRsp {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: StructureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<BuildSite>,
}

/// Shared by `giveUp` and `cancelGiveUp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReq {
    pub x: i32,
    pub y: i32,
}

impl Validate for PositionReq {
    fn validate(&mut self, config: &Config) -> GameResult<()> {
        check_on_map(config, self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiveUpRsp {
    pub x: i32,
    pub y: i32,
    /// When the site reverts; cleared by a cancellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}
