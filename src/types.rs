//! Identifiers and small value types shared across the world services.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable player ("role") identifier. Zero never names a player.
pub type PlayerId = i64;

/// Alliance identifier. Zero means "no alliance".
pub type AllianceId = i64;

pub const NO_PLAYER: PlayerId = 0;
pub const NO_ALLIANCE: AllianceId = 0;

pub const ROLE_ATTRIBUTE_SCHEMA_VERSION: u8 = 1;
pub const SITE_SCHEMA_VERSION: u8 = 1;
pub const BALANCE_SCHEMA_VERSION: u8 = 1;
pub const ALLIANCE_SCHEMA_VERSION: u8 = 1;

/// A map cell address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Countable resources held in a player's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Wood,
    Iron,
    Stone,
    Grain,
    Gold,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Wood,
        ResourceKind::Iron,
        ResourceKind::Stone,
        ResourceKind::Grain,
        ResourceKind::Gold,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Wood => "wood",
            ResourceKind::Iron => "iron",
            ResourceKind::Stone => "stone",
            ResourceKind::Grain => "grain",
            ResourceKind::Gold => "gold",
        };
        f.write_str(name)
    }
}

/// Resource quantities keyed by kind. Ordered so snapshots compare and print stably.
pub type Resources = BTreeMap<ResourceKind, u64>;

/// Which chat channel an operation targets. Encoded as `0` / `1` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ChannelKind {
    World,
    Alliance,
}

impl From<ChannelKind> for u8 {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::World => 0,
            ChannelKind::Alliance => 1,
        }
    }
}

impl TryFrom<u8> for ChannelKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChannelKind::World),
            1 => Ok(ChannelKind::Alliance),
            other => Err(format!("unknown channel type {}", other)),
        }
    }
}

/// A bookmarked map position saved by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosTag {
    pub x: i32,
    pub y: i32,
    pub name: String,
}

/// Per-player attribute row mirrored from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAttribute {
    pub player_id: PlayerId,
    pub alliance_id: AllianceId,
    pub parent_id: PlayerId,
    pub pos_tags: Vec<PosTag>,
    pub schema_version: u8,
}

impl RoleAttribute {
    /// The row inserted the first time a player is seen.
    pub fn new_default(player_id: PlayerId) -> Self {
        Self {
            player_id,
            alliance_id: NO_ALLIANCE,
            parent_id: NO_PLAYER,
            pos_tags: Vec::new(),
            schema_version: ROLE_ATTRIBUTE_SCHEMA_VERSION,
        }
    }
}

/// What a build site can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    Fortress,
    Outpost,
    Watchtower,
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StructureKind::Fortress => "fortress",
            StructureKind::Outpost => "outpost",
            StructureKind::Watchtower => "watchtower",
        };
        f.write_str(name)
    }
}
