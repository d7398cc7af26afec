//! # Storage Module
//!
//! Sled-backed persistence for the world: role attribute rows, build sites,
//! resource balances, alliances and alliance applications. Records are
//! bincode-encoded and carry a schema version that is checked on read.
//!
//! The in-memory services stay authoritative while the process runs; this
//! layer is written through after the in-memory state has committed. The only
//! write whose outcome gates correctness is the first insert of a role
//! attribute row, which uses [`WorldStore::insert_role_attribute_if_absent`].

use std::path::{Path, PathBuf};

use log::debug;
use sled::IVec;

use crate::alliance::{Alliance, AllianceApplication};
use crate::error::{GameError, GameResult};
use crate::territory::BuildSite;
use crate::types::{
    AllianceId, PlayerId, Position, Resources, RoleAttribute, ALLIANCE_SCHEMA_VERSION,
    BALANCE_SCHEMA_VERSION, ROLE_ATTRIBUTE_SCHEMA_VERSION, SITE_SCHEMA_VERSION,
};

const TREE_ROLE_ATTRIBUTES: &str = "role_attributes";
const TREE_SITES: &str = "sites";
const TREE_BALANCES: &str = "balances";
const TREE_ALLIANCES: &str = "alliances";
const TREE_APPLICATIONS: &str = "alliance_applications";

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct WorldStoreBuilder {
    path: PathBuf,
}

impl WorldStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> GameResult<WorldStore> {
        WorldStore::open(self.path)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct BalanceRecord {
    player_id: PlayerId,
    balances: Resources,
    schema_version: u8,
}

/// Sled-backed store for persistent world records. Cheap to clone; clones share the database.
#[derive(Clone)]
pub struct WorldStore {
    db: sled::Db,
    role_attributes: sled::Tree,
    sites: sled::Tree,
    balances: sled::Tree,
    alliances: sled::Tree,
    applications: sled::Tree,
}

impl WorldStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> GameResult<Self> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        debug!("Opened world store at {}", path_ref.display());
        Self::from_db(db)
    }

    /// A store that lives only as long as the process. Nothing reaches disk
    /// after it is dropped.
    pub fn temporary() -> GameResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> GameResult<Self> {
        Ok(Self {
            role_attributes: db.open_tree(TREE_ROLE_ATTRIBUTES)?,
            sites: db.open_tree(TREE_SITES)?,
            balances: db.open_tree(TREE_BALANCES)?,
            alliances: db.open_tree(TREE_ALLIANCES)?,
            applications: db.open_tree(TREE_APPLICATIONS)?,
            db,
        })
    }

    fn id_key(id: i64) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn position_key(pos: Position) -> [u8; 8] {
        let mut key = [0u8; 8];
        key[..4].copy_from_slice(&pos.x.to_be_bytes());
        key[4..].copy_from_slice(&pos.y.to_be_bytes());
        key
    }

    fn application_key(alliance_id: AllianceId, application_id: i64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&alliance_id.to_be_bytes());
        key[8..].copy_from_slice(&application_id.to_be_bytes());
        key
    }

    fn serialize<T: serde::Serialize>(value: &T) -> GameResult<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &IVec) -> GameResult<T> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    fn check_version(entity: &'static str, expected: u8, found: u8) -> GameResult<()> {
        if expected != found {
            return Err(GameError::SchemaMismatch {
                entity,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> GameResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Role attributes
    // ------------------------------------------------------------------

    pub fn get_role_attribute(&self, player_id: PlayerId) -> GameResult<Option<RoleAttribute>> {
        let Some(bytes) = self.role_attributes.get(Self::id_key(player_id))? else {
            return Ok(None);
        };
        let record: RoleAttribute = Self::deserialize(&bytes)?;
        Self::check_version(
            "role_attribute",
            ROLE_ATTRIBUTE_SCHEMA_VERSION,
            record.schema_version,
        )?;
        Ok(Some(record))
    }

    /// Insert `attr` only when no row exists for its player.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    pub fn insert_role_attribute_if_absent(&self, attr: &RoleAttribute) -> GameResult<bool> {
        let bytes = Self::serialize(attr)?;
        let outcome = self.role_attributes.compare_and_swap(
            Self::id_key(attr.player_id),
            None as Option<&[u8]>,
            Some(bytes),
        )?;
        if outcome.is_err() {
            return Ok(false);
        }
        self.role_attributes.flush()?;
        Ok(true)
    }

    pub fn put_role_attribute(&self, attr: &RoleAttribute) -> GameResult<()> {
        let bytes = Self::serialize(attr)?;
        self.role_attributes
            .insert(Self::id_key(attr.player_id), bytes)?;
        Ok(())
    }

    pub fn list_role_attributes(&self) -> GameResult<Vec<RoleAttribute>> {
        let mut out = Vec::new();
        for entry in self.role_attributes.iter() {
            let (_, bytes) = entry?;
            let record: RoleAttribute = Self::deserialize(&bytes)?;
            Self::check_version(
                "role_attribute",
                ROLE_ATTRIBUTE_SCHEMA_VERSION,
                record.schema_version,
            )?;
            out.push(record);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Build sites
    // ------------------------------------------------------------------

    pub fn put_site(&self, site: &BuildSite) -> GameResult<()> {
        let bytes = Self::serialize(site)?;
        self.sites.insert(Self::position_key(site.position), bytes)?;
        Ok(())
    }

    pub fn get_site(&self, pos: Position) -> GameResult<Option<BuildSite>> {
        let Some(bytes) = self.sites.get(Self::position_key(pos))? else {
            return Ok(None);
        };
        let site: BuildSite = Self::deserialize(&bytes)?;
        Self::check_version("site", SITE_SCHEMA_VERSION, site.schema_version)?;
        Ok(Some(site))
    }

    pub fn list_sites(&self) -> GameResult<Vec<BuildSite>> {
        let mut out = Vec::with_capacity(self.sites.len());
        for entry in self.sites.iter() {
            let (_, bytes) = entry?;
            let site: BuildSite = Self::deserialize(&bytes)?;
            Self::check_version("site", SITE_SCHEMA_VERSION, site.schema_version)?;
            out.push(site);
        }
        Ok(out)
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    // ------------------------------------------------------------------
    // Resource balances
    // ------------------------------------------------------------------

    pub fn put_balance(&self, player_id: PlayerId, balances: &Resources) -> GameResult<()> {
        let record = BalanceRecord {
            player_id,
            balances: balances.clone(),
            schema_version: BALANCE_SCHEMA_VERSION,
        };
        let bytes = Self::serialize(&record)?;
        self.balances.insert(Self::id_key(player_id), bytes)?;
        Ok(())
    }

    pub fn get_balance(&self, player_id: PlayerId) -> GameResult<Option<Resources>> {
        let Some(bytes) = self.balances.get(Self::id_key(player_id))? else {
            return Ok(None);
        };
        let record: BalanceRecord = Self::deserialize(&bytes)?;
        Self::check_version("balance", BALANCE_SCHEMA_VERSION, record.schema_version)?;
        Ok(Some(record.balances))
    }

    pub fn list_balances(&self) -> GameResult<Vec<(PlayerId, Resources)>> {
        let mut out = Vec::new();
        for entry in self.balances.iter() {
            let (_, bytes) = entry?;
            let record: BalanceRecord = Self::deserialize(&bytes)?;
            Self::check_version("balance", BALANCE_SCHEMA_VERSION, record.schema_version)?;
            out.push((record.player_id, record.balances));
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Alliances
    // ------------------------------------------------------------------

    pub fn put_alliance(&self, alliance: &Alliance) -> GameResult<()> {
        let bytes = Self::serialize(alliance)?;
        self.alliances.insert(Self::id_key(alliance.id), bytes)?;
        Ok(())
    }

    pub fn get_alliance(&self, id: AllianceId) -> GameResult<Option<Alliance>> {
        let Some(bytes) = self.alliances.get(Self::id_key(id))? else {
            return Ok(None);
        };
        let alliance: Alliance = Self::deserialize(&bytes)?;
        Self::check_version("alliance", ALLIANCE_SCHEMA_VERSION, alliance.schema_version)?;
        Ok(Some(alliance))
    }

    pub fn list_alliance_records(&self) -> GameResult<Vec<Alliance>> {
        let mut out = Vec::new();
        for entry in self.alliances.iter() {
            let (_, bytes) = entry?;
            let alliance: Alliance = Self::deserialize(&bytes)?;
            Self::check_version("alliance", ALLIANCE_SCHEMA_VERSION, alliance.schema_version)?;
            out.push(alliance);
        }
        Ok(out)
    }

    pub fn put_application(&self, application: &AllianceApplication) -> GameResult<()> {
        let bytes = Self::serialize(application)?;
        self.applications.insert(
            Self::application_key(application.alliance_id, application.id),
            bytes,
        )?;
        Ok(())
    }

    /// Applications filed against one alliance, oldest id first.
    pub fn list_applications(&self, alliance_id: AllianceId) -> GameResult<Vec<AllianceApplication>> {
        let mut out = Vec::new();
        for entry in self.applications.scan_prefix(Self::id_key(alliance_id)) {
            let (_, bytes) = entry?;
            out.push(Self::deserialize(&bytes)?);
        }
        Ok(out)
    }

    pub fn role_attribute_count(&self) -> usize {
        self.role_attributes.len()
    }

    pub fn alliance_count(&self) -> usize {
        self.alliances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResourceKind, StructureKind};
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, WorldStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = WorldStoreBuilder::new(dir.path()).open().expect("store");
        (dir, store)
    }

    #[test]
    fn insert_if_absent_only_wins_once() {
        let (_dir, store) = temp_store();
        let attr = RoleAttribute::new_default(42);
        assert!(store.insert_role_attribute_if_absent(&attr).unwrap());

        let mut other = RoleAttribute::new_default(42);
        other.alliance_id = 9;
        assert!(!store.insert_role_attribute_if_absent(&other).unwrap());

        let stored = store.get_role_attribute(42).unwrap().expect("row");
        assert_eq!(stored.alliance_id, 0);
    }

    #[test]
    fn sites_are_keyed_by_position() {
        let (_dir, store) = temp_store();
        let mut site = BuildSite::unowned(Position::new(3, 4));
        store.put_site(&site).unwrap();
        site.owner_id = 7;
        site.kind = Some(StructureKind::Outpost);
        site.level = 1;
        store.put_site(&site).unwrap();

        assert_eq!(store.site_count(), 1);
        let loaded = store.get_site(Position::new(3, 4)).unwrap().expect("site");
        assert_eq!(loaded.owner_id, 7);
        assert!(store.get_site(Position::new(4, 3)).unwrap().is_none());
    }

    #[test]
    fn balances_persist_per_player() {
        let (_dir, store) = temp_store();
        let balances: Resources = [(ResourceKind::Grain, 100)].into_iter().collect();
        store.put_balance(3, &balances).unwrap();
        assert_eq!(store.get_balance(3).unwrap(), Some(balances));
        assert_eq!(store.get_balance(4).unwrap(), None);
        assert_eq!(store.list_balances().unwrap().len(), 1);
    }

    #[test]
    fn applications_are_scoped_to_their_alliance() {
        let (_dir, store) = temp_store();
        store
            .put_application(&AllianceApplication::new(1, 10, 100))
            .unwrap();
        store
            .put_application(&AllianceApplication::new(2, 10, 101))
            .unwrap();
        store
            .put_application(&AllianceApplication::new(3, 11, 102))
            .unwrap();
        let for_ten = store.list_applications(10).unwrap();
        assert_eq!(for_ten.len(), 2);
        assert!(for_ten.iter().all(|a| a.alliance_id == 10));
    }
}
