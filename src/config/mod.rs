//! # Configuration Management Module
//!
//! Static configuration for the world services: storage location, logging,
//! chat retention, map size, the construction cost catalogue and ledger limits.
//! Everything here is loaded once at startup and never mutated afterwards.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use realmkeep::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("History kept per channel: {}", config.chat.history_limit);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! name = "Realmkeep"
//!
//! [chat]
//! history_limit = 100
//! max_message_len = 200
//!
//! [world]
//! width = 40
//! height = 40
//!
//! [build]
//! fortress_limit = 5
//! limited_kind = "fortress"
//! giveup_secs = 30
//! abandon_poll_ms = 500
//!
//! [[build.costs]]
//! kind = "fortress"
//! level = 1
//! name = "Fortress"
//! grain = 50
//! ```

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{GameError, GameResult};
use crate::types::{ResourceKind, Resources, StructureKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Messages retained per channel; the oldest is evicted first.
    pub history_limit: usize,
    /// Longest accepted chat line, in characters.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

fn default_max_message_len() -> usize {
    200
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            max_message_len: default_max_message_len(),
        }
    }
}

/// Map bounds. Every cell inside is seeded as an unowned build site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    pub width: i32,
    pub height: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 40,
            height: 40,
        }
    }
}

impl WorldConfig {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Maximum number of `limited_kind` sites one player may own.
    pub fortress_limit: usize,
    pub limited_kind: StructureKind,
    /// Grace period between a relinquish request and the site reverting.
    pub giveup_secs: u64,
    /// How often the abandonment worker looks for due deadlines.
    #[serde(default = "default_abandon_poll_ms")]
    pub abandon_poll_ms: u64,
    #[serde(default)]
    pub costs: Vec<BuildCostConfig>,
}

/// Longest accepted relinquish grace period.
pub const MAX_GIVEUP_SECS: u64 = 7 * 24 * 3600;

/// Most messages a single channel may retain.
pub const MAX_HISTORY_LIMIT: usize = 10_000;

fn default_abandon_poll_ms() -> u64 {
    500
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            fortress_limit: 5,
            limited_kind: StructureKind::Fortress,
            giveup_secs: 30,
            abandon_poll_ms: default_abandon_poll_ms(),
            costs: default_costs(),
        }
    }
}

/// One catalogue row: what building `kind` at `level` costs and yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCostConfig {
    pub kind: StructureKind,
    pub level: u8,
    pub name: String,
    #[serde(default)]
    pub grain: u64,
    #[serde(default)]
    pub wood: u64,
    #[serde(default)]
    pub iron: u64,
    #[serde(default)]
    pub stone: u64,
    #[serde(default)]
    pub gold: u64,
    /// Nominal construction time. Construction still completes synchronously.
    #[serde(default)]
    pub time_secs: u64,
    #[serde(default)]
    pub durable: u32,
    #[serde(default)]
    pub defender: u32,
}

impl BuildCostConfig {
    /// Non-zero resource requirements of this entry.
    pub fn need(&self) -> Resources {
        [
            (ResourceKind::Grain, self.grain),
            (ResourceKind::Wood, self.wood),
            (ResourceKind::Iron, self.iron),
            (ResourceKind::Stone, self.stone),
            (ResourceKind::Gold, self.gold),
        ]
        .into_iter()
        .filter(|(_, qty)| *qty > 0)
        .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Per-kind upper bound applied when crediting. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<u64>,
    /// Balances given to a player that has no stored ledger yet.
    #[serde(default)]
    pub starting: Resources,
}

/// Read-only lookup of the construction catalogue keyed by `(kind, level)`.
#[derive(Debug, Clone, Default)]
pub struct CostTable {
    entries: HashMap<(StructureKind, u8), BuildCostConfig>,
    ordered: Vec<BuildCostConfig>,
}

impl CostTable {
    pub fn from_entries(entries: &[BuildCostConfig]) -> GameResult<Self> {
        let mut table = CostTable::default();
        for entry in entries {
            if entry.level == 0 {
                return Err(GameError::InvalidConfig(format!(
                    "cost entry for {} has level 0",
                    entry.kind
                )));
            }
            if table
                .entries
                .insert((entry.kind, entry.level), entry.clone())
                .is_some()
            {
                return Err(GameError::InvalidConfig(format!(
                    "duplicate cost entry for {} level {}",
                    entry.kind, entry.level
                )));
            }
            table.ordered.push(entry.clone());
        }
        Ok(table)
    }

    pub fn get(&self, kind: StructureKind, level: u8) -> Option<&BuildCostConfig> {
        self.entries.get(&(kind, level))
    }

    /// All entries in configuration order.
    pub fn entries(&self) -> &[BuildCostConfig] {
        &self.ordered
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config
            .validate()
            .map_err(|e| anyhow!("Config file {} rejected: {}", path, e))?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> GameResult<()> {
        if self.chat.history_limit == 0 {
            return Err(GameError::InvalidConfig(
                "chat.history_limit must be at least 1".to_string(),
            ));
        }
        if self.chat.history_limit > MAX_HISTORY_LIMIT {
            return Err(GameError::InvalidConfig(format!(
                "chat.history_limit {} exceeds {}",
                self.chat.history_limit, MAX_HISTORY_LIMIT
            )));
        }
        if self.world.width <= 0 || self.world.height <= 0 {
            return Err(GameError::InvalidConfig(format!(
                "world size {}x{} is empty",
                self.world.width, self.world.height
            )));
        }
        if self.build.giveup_secs > MAX_GIVEUP_SECS {
            return Err(GameError::InvalidConfig(format!(
                "build.giveup_secs {} exceeds {}",
                self.build.giveup_secs, MAX_GIVEUP_SECS
            )));
        }
        if self.build.abandon_poll_ms == 0 {
            return Err(GameError::InvalidConfig(
                "build.abandon_poll_ms must be at least 1".to_string(),
            ));
        }
        CostTable::from_entries(&self.build.costs)?;
        Ok(())
    }

    pub fn cost_table(&self) -> GameResult<CostTable> {
        CostTable::from_entries(&self.build.costs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                name: "Realmkeep".to_string(),
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("realmkeep.log".to_string()),
            },
            chat: ChatConfig::default(),
            world: WorldConfig::default(),
            build: BuildConfig::default(),
            ledger: LedgerConfig {
                ceiling: Some(1_000_000),
                starting: [(ResourceKind::Grain, 1000), (ResourceKind::Wood, 1000)]
                    .into_iter()
                    .collect(),
            },
        }
    }
}

fn cost(kind: StructureKind, level: u8, name: &str, grain: u64, wood: u64, stone: u64) -> BuildCostConfig {
    BuildCostConfig {
        kind,
        level,
        name: name.to_string(),
        grain,
        wood,
        iron: 0,
        stone,
        gold: 0,
        time_secs: 60 * level as u64,
        durable: 1000 * level as u32,
        defender: 2 * level as u32,
    }
}

fn default_costs() -> Vec<BuildCostConfig> {
    vec![
        cost(StructureKind::Fortress, 1, "Fortress", 50, 0, 0),
        cost(StructureKind::Fortress, 2, "Fortress", 100, 50, 20),
        cost(StructureKind::Fortress, 3, "Fortress", 200, 100, 50),
        cost(StructureKind::Outpost, 1, "Outpost", 20, 20, 0),
        cost(StructureKind::Outpost, 2, "Outpost", 40, 40, 10),
        cost(StructureKind::Watchtower, 1, "Watchtower", 10, 30, 10),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().expect("default config validates");
        let table = config.cost_table().expect("cost table");
        let fortress = table.get(StructureKind::Fortress, 1).expect("fortress l1");
        assert_eq!(fortress.need().get(&ResourceKind::Grain), Some(&50));
        assert!(table.get(StructureKind::Watchtower, 2).is_none());
    }

    #[test]
    fn need_skips_zero_quantities() {
        let entry = cost(StructureKind::Outpost, 1, "Outpost", 0, 5, 0);
        let need = entry.need();
        assert_eq!(need.len(), 1);
        assert_eq!(need.get(&ResourceKind::Wood), Some(&5));
    }

    #[test]
    fn duplicate_cost_entries_are_rejected() {
        let mut config = Config::default();
        config
            .build
            .costs
            .push(cost(StructureKind::Fortress, 1, "Again", 1, 1, 1));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GameError::InvalidConfig(_)));
    }

    #[test]
    fn zero_history_limit_is_rejected() {
        let mut config = Config::default();
        config.chat.history_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_history_limit_is_rejected() {
        let mut config = Config::default();
        config.chat.history_limit = MAX_HISTORY_LIMIT;
        config.validate().expect("largest limit is accepted");
        config.chat.history_limit = MAX_HISTORY_LIMIT + 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GameError::InvalidConfig(_)));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).expect("serialize");
        let parsed: Config = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.build.costs, config.build.costs);
        assert_eq!(parsed.ledger.starting, config.ledger.starting);
        assert_eq!(parsed.build.limited_kind, StructureKind::Fortress);
    }

    #[test]
    fn sections_fall_back_to_defaults() {
        let text = r#"
            [server]
            name = "test"
            [storage]
            data_dir = "/tmp/x"
            [logging]
            level = "debug"
        "#;
        let parsed: Config = toml::from_str(text).expect("parse");
        assert_eq!(parsed.chat.history_limit, 100);
        assert_eq!(parsed.world.width, 40);
        assert!(parsed.ledger.ceiling.is_none());
        assert!(!parsed.build.costs.is_empty());
    }
}
