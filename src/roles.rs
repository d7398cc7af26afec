//! Role attribute cache.
//!
//! A write-through mirror of the `role_attributes` rows, keyed by player. Misses
//! fall through to the store; the first sighting of a player inserts the
//! default row with an insert-if-absent primitive so concurrent callers
//! produce at most one insert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, error, info, warn};

use crate::alliance::AllianceRoster;
use crate::error::GameResult;
use crate::metrics;
use crate::storage::WorldStore;
use crate::sync;
use crate::types::{AllianceId, PlayerId, PosTag, RoleAttribute, NO_ALLIANCE, NO_PLAYER};

/// Backing rows for the cache.
pub trait AttributeStore: Send + Sync {
    fn load(&self, player_id: PlayerId) -> GameResult<Option<RoleAttribute>>;
    /// Returns `false` when a row for the player already exists.
    fn insert_if_absent(&self, attr: &RoleAttribute) -> GameResult<bool>;
    fn save(&self, attr: &RoleAttribute) -> GameResult<()>;
    fn load_all(&self) -> GameResult<Vec<RoleAttribute>>;
}

impl AttributeStore for WorldStore {
    fn load(&self, player_id: PlayerId) -> GameResult<Option<RoleAttribute>> {
        self.get_role_attribute(player_id)
    }

    fn insert_if_absent(&self, attr: &RoleAttribute) -> GameResult<bool> {
        self.insert_role_attribute_if_absent(attr)
    }

    fn save(&self, attr: &RoleAttribute) -> GameResult<()> {
        self.put_role_attribute(attr)
    }

    fn load_all(&self) -> GameResult<Vec<RoleAttribute>> {
        self.list_role_attributes()
    }
}

pub struct RoleAttributeCache {
    rows: RwLock<HashMap<PlayerId, RoleAttribute>>,
    store: Arc<dyn AttributeStore>,
    writer: Mutex<()>,
}

impl RoleAttributeCache {
    pub fn new(store: Arc<dyn AttributeStore>) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            store,
            writer: Mutex::new(()),
        }
    }

    /// Make sure the player has a row, creating the default one if needed.
    ///
    /// Storage failures here surface to the caller: without a row the player
    /// cannot be served.
    pub fn ensure_exists(&self, player_id: PlayerId) -> GameResult<()> {
        if sync::read(&self.rows).contains_key(&player_id) {
            return Ok(());
        }

        let row = match self.store.load(player_id) {
            Ok(Some(row)) => row,
            Ok(None) => self.create_default(player_id)?,
            Err(e) => {
                error!("Failed to load role attribute {}: {}", player_id, e);
                return Err(e);
            }
        };
        sync::write(&self.rows).entry(player_id).or_insert(row);
        Ok(())
    }

    fn create_default(&self, player_id: PlayerId) -> GameResult<RoleAttribute> {
        let row = RoleAttribute::new_default(player_id);
        let inserted = self.store.insert_if_absent(&row).map_err(|e| {
            error!("Failed to create role attribute {}: {}", player_id, e);
            e
        })?;
        if inserted {
            info!("Created role attribute for player {}", player_id);
            return Ok(row);
        }
        // Lost the race; the winner's row is the one to cache.
        debug!("role attribute {} already created concurrently", player_id);
        Ok(self.store.load(player_id)?.unwrap_or(row))
    }

    pub fn get(&self, player_id: PlayerId) -> Option<RoleAttribute> {
        sync::read(&self.rows).get(&player_id).cloned()
    }

    pub fn alliance_id(&self, player_id: PlayerId) -> AllianceId {
        self.get(player_id)
            .map(|row| row.alliance_id)
            .unwrap_or(NO_ALLIANCE)
    }

    pub fn parent_id(&self, player_id: PlayerId) -> PlayerId {
        self.get(player_id)
            .map(|row| row.parent_id)
            .unwrap_or(NO_PLAYER)
    }

    /// Bookmarked positions; a cache miss is answered from the store.
    pub fn tag_list(&self, player_id: PlayerId) -> GameResult<Vec<PosTag>> {
        if let Some(row) = self.get(player_id) {
            return Ok(row.pos_tags);
        }
        match self.store.load(player_id)? {
            Some(row) => {
                let tags = row.pos_tags.clone();
                sync::write(&self.rows).entry(player_id).or_insert(row);
                Ok(tags)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Record a new alliance for a cached player. Returns `false` when the
    /// player has no cached row.
    pub fn set_alliance(&self, player_id: PlayerId, alliance_id: AllianceId) -> bool {
        {
            let mut rows = sync::write(&self.rows);
            let Some(row) = rows.get_mut(&player_id) else {
                return false;
            };
            row.alliance_id = alliance_id;
        }
        self.persist(player_id);
        true
    }

    pub fn len(&self) -> usize {
        sync::read(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill the cache from the store, then backfill alliance ids from the
    /// running alliances' rosters. Roster members without a row are skipped
    /// and a roster failure leaves the rows as stored. Returns the number of
    /// cached rows.
    pub fn load_all(&self, roster: &dyn AllianceRoster) -> GameResult<usize> {
        let stored = self.store.load_all()?;
        {
            let mut rows = sync::write(&self.rows);
            for row in stored {
                rows.insert(row.player_id, row);
            }
        }

        let alliances = match roster.list_alliances() {
            Ok(alliances) => alliances,
            Err(e) => {
                warn!("Alliance roster unavailable, skipping reconciliation: {}", e);
                return Ok(self.len());
            }
        };

        let mut changed = Vec::new();
        let mut skipped = 0usize;
        {
            let mut rows = sync::write(&self.rows);
            for alliance in alliances.iter().filter(|a| a.is_running()) {
                for member in &alliance.members {
                    match rows.get_mut(member) {
                        Some(row) if row.alliance_id != alliance.id => {
                            row.alliance_id = alliance.id;
                            changed.push(*member);
                        }
                        Some(_) => {}
                        None => skipped += 1,
                    }
                }
            }
        }
        for player_id in &changed {
            self.persist(*player_id);
        }

        let count = self.len();
        info!(
            "Role attributes loaded: {} rows, {} reconciled, {} roster members without a row",
            count,
            changed.len(),
            skipped
        );
        Ok(count)
    }

    /// Write the cached row as it is now. Writers are serialised so the last
    /// one to run stores the latest row.
    fn persist(&self, player_id: PlayerId) {
        let _writer = sync::lock(&self.writer);
        let Some(row) = sync::read(&self.rows).get(&player_id).cloned() else {
            return;
        };
        if let Err(e) = self.store.save(&row) {
            metrics::inc_storage_write_failures();
            warn!("Failed to persist role attribute {}: {}", player_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alliance::{Alliance, AllianceState};
    use crate::error::{GameError, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<PlayerId, RoleAttribute>>,
        inserts: AtomicUsize,
        fail_writes: bool,
    }

    impl AttributeStore for MemoryStore {
        fn load(&self, player_id: PlayerId) -> GameResult<Option<RoleAttribute>> {
            Ok(self.rows.lock().unwrap().get(&player_id).cloned())
        }

        fn insert_if_absent(&self, attr: &RoleAttribute) -> GameResult<bool> {
            if self.fail_writes {
                return Err(GameError::Storage("disk full".into()));
            }
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&attr.player_id) {
                return Ok(false);
            }
            rows.insert(attr.player_id, attr.clone());
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn save(&self, attr: &RoleAttribute) -> GameResult<()> {
            if self.fail_writes {
                return Err(GameError::Storage("disk full".into()));
            }
            self.rows.lock().unwrap().insert(attr.player_id, attr.clone());
            Ok(())
        }

        fn load_all(&self) -> GameResult<Vec<RoleAttribute>> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    struct StaticRoster(Vec<Alliance>);

    impl AllianceRoster for StaticRoster {
        fn list_alliances(&self) -> GameResult<Vec<Alliance>> {
            Ok(self.0.clone())
        }

        fn members(&self, alliance_id: AllianceId) -> GameResult<Vec<PlayerId>> {
            Ok(self
                .0
                .iter()
                .find(|a| a.id == alliance_id)
                .map(|a| a.members.clone())
                .unwrap_or_default())
        }
    }

    #[test]
    fn first_sighting_inserts_default_row() {
        let store = Arc::new(MemoryStore::default());
        let cache = RoleAttributeCache::new(store.clone());
        cache.ensure_exists(4).unwrap();
        cache.ensure_exists(4).unwrap();
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(cache.alliance_id(4), NO_ALLIANCE);
        assert_eq!(cache.parent_id(4), NO_PLAYER);
        assert!(cache.tag_list(4).unwrap().is_empty());
    }

    #[test]
    fn concurrent_first_sightings_insert_once() {
        let store = Arc::new(MemoryStore::default());
        let cache = RoleAttributeCache::new(store.clone());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| cache.ensure_exists(11).unwrap());
            }
        });
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        assert!(cache.get(11).is_some());
    }

    #[test]
    fn insert_failure_is_a_storage_error() {
        let store = Arc::new(MemoryStore {
            fail_writes: true,
            ..Default::default()
        });
        let cache = RoleAttributeCache::new(store);
        let err = cache.ensure_exists(4).unwrap_err();
        assert_eq!(err.code(), StatusCode::StorageError);
        assert!(cache.get(4).is_none());
    }

    #[test]
    fn unknown_players_default_to_zero() {
        let cache = RoleAttributeCache::new(Arc::new(MemoryStore::default()));
        assert_eq!(cache.alliance_id(99), NO_ALLIANCE);
        assert_eq!(cache.parent_id(99), NO_PLAYER);
        assert!(!cache.set_alliance(99, 3));
    }

    #[test]
    fn tag_list_falls_back_to_store() {
        let store = Arc::new(MemoryStore::default());
        let mut row = RoleAttribute::new_default(6);
        row.pos_tags.push(PosTag {
            x: 3,
            y: 4,
            name: "mine".into(),
        });
        store.save(&row).unwrap();
        let cache = RoleAttributeCache::new(store);
        assert_eq!(cache.tag_list(6).unwrap().len(), 1);
        assert!(cache.get(6).is_some());
    }

    #[test]
    fn load_all_reconciles_running_alliances_only() {
        let store = Arc::new(MemoryStore::default());
        for id in [1, 2, 3] {
            store.save(&RoleAttribute::new_default(id)).unwrap();
        }
        let mut north = Alliance::new(10, "North", 1);
        north.members.extend([2, 404]);
        let mut gone = Alliance::new(20, "Gone", 3);
        gone.state = AllianceState::Dismissed;

        let cache = RoleAttributeCache::new(store.clone());
        let count = cache
            .load_all(&StaticRoster(vec![north, gone]))
            .expect("load");
        assert_eq!(count, 3);
        assert_eq!(cache.alliance_id(1), 10);
        assert_eq!(cache.alliance_id(2), 10);
        assert_eq!(cache.alliance_id(3), NO_ALLIANCE);
        assert!(cache.get(404).is_none());
        assert_eq!(store.load(2).unwrap().unwrap().alliance_id, 10);
    }

    #[test]
    fn set_alliance_survives_write_failure() {
        let store = Arc::new(MemoryStore::default());
        let cache = RoleAttributeCache::new(store);
        cache.ensure_exists(5).unwrap();
        assert!(cache.set_alliance(5, 8));
        assert_eq!(cache.alliance_id(5), 8);
    }
}
