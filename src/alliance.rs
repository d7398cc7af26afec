//! Alliance rosters as consumed by the world services.
//!
//! Alliances themselves are managed elsewhere; this crate only reads their
//! member lists, once at startup to reconcile cached role attributes and on
//! demand to decide who hears about an application.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GameResult;
use crate::storage::WorldStore;
use crate::types::{AllianceId, PlayerId, ALLIANCE_SCHEMA_VERSION, NO_PLAYER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllianceState {
    Dismissed,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alliance {
    pub id: AllianceId,
    pub name: String,
    pub members: Vec<PlayerId>,
    pub creator_id: PlayerId,
    pub chairman: PlayerId,
    pub vice_chairman: PlayerId,
    pub notice: String,
    pub state: AllianceState,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl Alliance {
    pub fn new(id: AllianceId, name: &str, chairman: PlayerId) -> Self {
        Self {
            id,
            name: name.to_string(),
            members: vec![chairman],
            creator_id: chairman,
            chairman,
            vice_chairman: NO_PLAYER,
            notice: String::new(),
            state: AllianceState::Running,
            created_at: Utc::now(),
            schema_version: ALLIANCE_SCHEMA_VERSION,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == AllianceState::Running
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Chairman and vice chairman, whichever are set.
    pub fn leaders(&self) -> Vec<PlayerId> {
        [self.chairman, self.vice_chairman]
            .into_iter()
            .filter(|id| *id != NO_PLAYER)
            .collect()
    }

    pub fn summary(&self) -> AllianceSummary {
        AllianceSummary {
            id: self.id,
            name: self.name.clone(),
            notice: self.notice.clone(),
            member_count: self.member_count(),
        }
    }
}

/// Client-facing view of an alliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceSummary {
    pub id: AllianceId,
    pub name: String,
    pub notice: String,
    pub member_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationState {
    Pending,
    Accepted,
    Rejected,
}

/// A player's request to join an alliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceApplication {
    pub id: i64,
    pub alliance_id: AllianceId,
    pub player_id: PlayerId,
    pub state: ApplicationState,
    pub created_at: DateTime<Utc>,
}

impl AllianceApplication {
    pub fn new(id: i64, alliance_id: AllianceId, player_id: PlayerId) -> Self {
        Self {
            id,
            alliance_id,
            player_id,
            state: ApplicationState::Pending,
            created_at: Utc::now(),
        }
    }

    /// Everyone who should be told about this application: the alliance's
    /// roster plus the applicant, each listed once.
    pub fn notify_recipients(&self, roster: &dyn AllianceRoster) -> GameResult<Vec<PlayerId>> {
        let mut recipients: BTreeSet<PlayerId> =
            roster.members(self.alliance_id)?.into_iter().collect();
        recipients.insert(self.player_id);
        Ok(recipients.into_iter().collect())
    }
}

/// Read access to alliance rosters.
pub trait AllianceRoster: Send + Sync {
    fn list_alliances(&self) -> GameResult<Vec<Alliance>>;

    /// Member list of one alliance; empty when the alliance is unknown.
    fn members(&self, alliance_id: AllianceId) -> GameResult<Vec<PlayerId>>;
}

impl AllianceRoster for WorldStore {
    fn list_alliances(&self) -> GameResult<Vec<Alliance>> {
        self.list_alliance_records()
    }

    fn members(&self, alliance_id: AllianceId) -> GameResult<Vec<PlayerId>> {
        Ok(self
            .get_alliance(alliance_id)?
            .map(|a| a.members)
            .unwrap_or_default())
    }
}
