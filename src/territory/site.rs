//! Build site records and their state transitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BuildCostConfig;
use crate::types::{PlayerId, Position, StructureKind, NO_PLAYER, SITE_SCHEMA_VERSION};

/// Upper bound on a catalogue build time, keeps deadline arithmetic in range.
const MAX_BUILD_SECS: u64 = 30 * 24 * 3600;

/// Where a site is in its lifecycle:
/// `Unowned -> Owned(1) -> Owned(n) -> PendingAbandon -> Unowned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    Unowned,
    Owned { level: u8 },
    PendingAbandon { deadline: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSite {
    pub position: Position,
    /// `NO_PLAYER` when unowned.
    pub owner_id: PlayerId,
    pub kind: Option<StructureKind>,
    pub name: String,
    pub level: u8,
    pub durable: u32,
    pub max_durable: u32,
    pub defender: u32,
    /// Set while a build or upgrade is in progress.
    pub busy_until: Option<DateTime<Utc>>,
    /// Set while the owner's relinquish request waits out its grace period.
    pub relinquish_deadline: Option<DateTime<Utc>>,
    pub schema_version: u8,
}

impl BuildSite {
    pub fn unowned(position: Position) -> Self {
        Self {
            position,
            owner_id: NO_PLAYER,
            kind: None,
            name: String::new(),
            level: 0,
            durable: 0,
            max_durable: 0,
            defender: 0,
            busy_until: None,
            relinquish_deadline: None,
            schema_version: SITE_SCHEMA_VERSION,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owner_id != NO_PLAYER
    }

    pub fn is_owned_by(&self, player_id: PlayerId) -> bool {
        self.is_owned() && self.owner_id == player_id
    }

    pub fn is_relinquishing(&self) -> bool {
        self.relinquish_deadline.is_some()
    }

    /// A busy site accepts no new construction or relinquish command.
    pub fn is_busy(&self, now: DateTime<Utc>) -> bool {
        self.is_relinquishing() || self.busy_until.map_or(false, |until| until > now)
    }

    pub fn state(&self) -> SiteState {
        match (self.is_owned(), self.relinquish_deadline) {
            (false, _) => SiteState::Unowned,
            (true, Some(deadline)) => SiteState::PendingAbandon { deadline },
            (true, None) => SiteState::Owned { level: self.level },
        }
    }

    /// Level a construction of `kind` by `player_id` would produce: an upgrade
    /// when the player already has that structure here, otherwise a fresh level 1.
    pub fn target_level(&self, player_id: PlayerId, kind: StructureKind) -> u8 {
        if self.is_owned_by(player_id) && self.kind == Some(kind) {
            self.level.saturating_add(1)
        } else {
            1
        }
    }

    /// Claim or upgrade the site and mark it busy until the nominal completion time.
    pub fn begin_build(&mut self, player_id: PlayerId, cost: &BuildCostConfig, now: DateTime<Utc>) {
        self.owner_id = player_id;
        self.kind = Some(cost.kind);
        self.level = cost.level;
        self.name = cost.name.clone();
        self.max_durable = cost.durable;
        self.defender = cost.defender;
        let secs = cost.time_secs.min(MAX_BUILD_SECS) as i64;
        self.busy_until = Some(now + Duration::seconds(secs));
    }

    /// Apply the finished build: full durability, no longer busy.
    pub fn complete_build(&mut self) {
        self.durable = self.max_durable;
        self.busy_until = None;
    }

    /// Back to an unowned, empty site.
    pub fn reset(&mut self) {
        *self = BuildSite::unowned(self.position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fortress(level: u8) -> BuildCostConfig {
        BuildCostConfig {
            kind: StructureKind::Fortress,
            level,
            name: "Fortress".to_string(),
            grain: 50,
            wood: 0,
            iron: 0,
            stone: 0,
            gold: 0,
            time_secs: 60,
            durable: 500,
            defender: 3,
        }
    }

    #[test]
    fn lifecycle_states() {
        let now = Utc::now();
        let mut site = BuildSite::unowned(Position::new(1, 1));
        assert_eq!(site.state(), SiteState::Unowned);
        assert_eq!(site.target_level(3, StructureKind::Fortress), 1);

        site.begin_build(3, &fortress(1), now);
        assert!(site.is_busy(now));
        site.complete_build();
        assert!(!site.is_busy(now));
        assert_eq!(site.state(), SiteState::Owned { level: 1 });
        assert_eq!(site.durable, 500);
        assert_eq!(site.target_level(3, StructureKind::Fortress), 2);
        assert_eq!(site.target_level(3, StructureKind::Outpost), 1);

        let deadline = now + Duration::seconds(30);
        site.relinquish_deadline = Some(deadline);
        assert!(site.is_busy(now));
        assert_eq!(site.state(), SiteState::PendingAbandon { deadline });

        site.reset();
        assert_eq!(site.state(), SiteState::Unowned);
        assert_eq!(site.position, Position::new(1, 1));
        assert!(site.kind.is_none());
    }
}
