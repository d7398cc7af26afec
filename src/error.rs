//! Error taxonomy shared by every component, and the status codes those
//! errors map to on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire status carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum StatusCode {
    Ok,
    InvalidParam,
    StorageError,
    NotFound,
    NotOwner,
    SiteBusy,
    ConstructionLimitExceeded,
    ResourceInsufficient,
    InvalidConfig,
}

impl StatusCode {
    pub fn as_i32(self) -> i32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::InvalidParam => 1,
            StatusCode::StorageError => 2,
            StatusCode::NotFound => 3,
            StatusCode::NotOwner => 4,
            StatusCode::SiteBusy => 5,
            StatusCode::ConstructionLimitExceeded => 6,
            StatusCode::ResourceInsufficient => 7,
            StatusCode::InvalidConfig => 8,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl From<StatusCode> for i32 {
    fn from(code: StatusCode) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for StatusCode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => StatusCode::Ok,
            1 => StatusCode::InvalidParam,
            2 => StatusCode::StorageError,
            3 => StatusCode::NotFound,
            4 => StatusCode::NotOwner,
            5 => StatusCode::SiteBusy,
            6 => StatusCode::ConstructionLimitExceeded,
            7 => StatusCode::ResourceInsufficient,
            8 => StatusCode::InvalidConfig,
            other => return Err(format!("unknown status code {}", other)),
        })
    }
}

/// Errors that can arise from any world-state operation.
#[derive(Debug, Error)]
pub enum GameError {
    /// Malformed request, or a request made without the required identity.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// No such site, channel or mapping.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("site ({x},{y}) is not owned by player {player}")]
    NotOwner { player: i64, x: i32, y: i32 },

    /// Construction or abandonment already in progress.
    #[error("site ({x},{y}) is busy")]
    SiteBusy { x: i32, y: i32 },

    #[error("construction limit reached ({limit})")]
    ConstructionLimitExceeded { limit: usize },

    #[error("insufficient resources")]
    ResourceInsufficient,

    /// Missing or inconsistent static configuration. Operator error.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Persistence layer failure reported by the store itself.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record was written with a different schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },
}

impl GameError {
    pub fn code(&self) -> StatusCode {
        match self {
            GameError::InvalidParam(_) => StatusCode::InvalidParam,
            GameError::NotFound(_) => StatusCode::NotFound,
            GameError::NotOwner { .. } => StatusCode::NotOwner,
            GameError::SiteBusy { .. } => StatusCode::SiteBusy,
            GameError::ConstructionLimitExceeded { .. } => StatusCode::ConstructionLimitExceeded,
            GameError::ResourceInsufficient => StatusCode::ResourceInsufficient,
            GameError::InvalidConfig(_) => StatusCode::InvalidConfig,
            GameError::Storage(_)
            | GameError::Sled(_)
            | GameError::Bincode(_)
            | GameError::Io(_)
            | GameError::SchemaMismatch { .. } => StatusCode::StorageError,
        }
    }

    pub fn invalid_param(msg: impl Into<String>) -> Self {
        GameError::InvalidParam(msg.into())
    }
}

pub type GameResult<T> = Result<T, GameError>;
