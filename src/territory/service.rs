//! Spatial index of build sites and the construction / relinquish operations.
//!
//! The whole index, the per-player ownership index and the queue of pending
//! abandonments share one `RwLock`. `construct` holds it across validation,
//! the ledger charge and the commit, so the per-player limit can never be
//! overrun by two concurrent builds. Lock order is territory before ledger;
//! the ledger never calls back into this service. Store writes happen after
//! the lock is released, serialised by a separate writer mutex and always
//! taken from a fresh read of the index.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use super::abandon::AbandonReport;
use super::{BuildSite, Region};
use crate::config::{BuildConfig, BuildCostConfig, CostTable, WorldConfig, MAX_GIVEUP_SECS};
use crate::error::{GameError, GameResult};
use crate::ledger::ResourceLedger;
use crate::metrics;
use crate::storage::WorldStore;
use crate::sync;
use crate::types::{PlayerId, Position, Resources, StructureKind};

/// A scheduled abandonment: fire at `deadline` if `owner` still has `position` pending.
type PendingAbandon = (DateTime<Utc>, Position, PlayerId);

#[derive(Debug, Default)]
struct TerritoryState {
    sites: HashMap<Position, BuildSite>,
    owned: HashMap<PlayerId, BTreeSet<Position>>,
    pending: BTreeSet<PendingAbandon>,
}

impl TerritoryState {
    fn insert(&mut self, site: BuildSite) {
        if let Some(previous) = self.sites.get(&site.position) {
            let (owner, pos) = (previous.owner_id, previous.position);
            self.disown(owner, pos);
        }
        if site.is_owned() {
            self.owned
                .entry(site.owner_id)
                .or_default()
                .insert(site.position);
        }
        if let Some(deadline) = site.relinquish_deadline {
            self.pending.insert((deadline, site.position, site.owner_id));
        }
        self.sites.insert(site.position, site);
    }

    fn disown(&mut self, owner: PlayerId, pos: Position) {
        if let Some(set) = self.owned.get_mut(&owner) {
            set.remove(&pos);
            if set.is_empty() {
                self.owned.remove(&owner);
            }
        }
    }

    fn count_owned(&self, player_id: PlayerId, kind: StructureKind) -> usize {
        self.owned
            .get(&player_id)
            .map(|positions| {
                positions
                    .iter()
                    .filter(|pos| {
                        self.sites
                            .get(pos)
                            .map_or(false, |site| site.kind == Some(kind))
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}

pub struct TerritoryService {
    state: RwLock<TerritoryState>,
    world: WorldConfig,
    costs: CostTable,
    limit: usize,
    limited_kind: StructureKind,
    grace: Duration,
    ledger: Arc<ResourceLedger>,
    store: Option<WorldStore>,
    writer: Mutex<()>,
}

impl TerritoryService {
    pub fn new(world: WorldConfig, build: &BuildConfig, costs: CostTable, ledger: Arc<ResourceLedger>) -> Self {
        Self {
            state: RwLock::new(TerritoryState::default()),
            world,
            costs,
            limit: build.fortress_limit,
            limited_kind: build.limited_kind,
            grace: Duration::seconds(build.giveup_secs.min(MAX_GIVEUP_SECS) as i64),
            ledger,
            store: None,
            writer: Mutex::new(()),
        }
    }

    pub fn with_store(mut self, store: WorldStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn world(&self) -> &WorldConfig {
        &self.world
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Construction catalogue, as configured.
    pub fn catalogue(&self) -> &[BuildCostConfig] {
        self.costs.entries()
    }

    /// Fill every map cell that has no site yet with an unowned one.
    /// Returns the number of sites created.
    pub fn seed_unowned(&self) -> usize {
        let mut created = Vec::new();
        {
            let mut state = sync::write(&self.state);
            for x in 0..self.world.width {
                for y in 0..self.world.height {
                    let pos = Position::new(x, y);
                    if !state.sites.contains_key(&pos) {
                        created.push(pos);
                        state.insert(BuildSite::unowned(pos));
                    }
                }
            }
        }
        let count = created.len();
        self.persist(created);
        count
    }

    /// Load stored sites, then seed any cells that are still missing.
    pub fn load(&self) -> GameResult<usize> {
        let loaded = match &self.store {
            Some(store) => store.list_sites()?,
            None => Vec::new(),
        };
        let count = loaded.len();
        {
            let mut state = sync::write(&self.state);
            for site in loaded {
                state.insert(site);
            }
        }
        let seeded = self.seed_unowned();
        info!("Territory loaded: {} stored sites, {} newly seeded", count, seeded);
        Ok(count + seeded)
    }

    pub fn site_count(&self) -> usize {
        sync::read(&self.state).sites.len()
    }

    /// Copies of every site inside `region`, row by row.
    pub fn scan_block(&self, region: Region) -> Vec<BuildSite> {
        let state = sync::read(&self.state);
        region
            .positions(&self.world)
            .filter_map(|pos| state.sites.get(&pos).cloned())
            .collect()
    }

    pub fn position_build(&self, x: i32, y: i32) -> Option<BuildSite> {
        sync::read(&self.state)
            .sites
            .get(&Position::new(x, y))
            .cloned()
    }

    /// Owned sites of the limited structure kind.
    pub fn fortress_count(&self, player_id: PlayerId) -> usize {
        sync::read(&self.state).count_owned(player_id, self.limited_kind)
    }

    pub fn construct(&self, player_id: PlayerId, x: i32, y: i32, kind: StructureKind) -> GameResult<BuildSite> {
        self.construct_at(player_id, x, y, kind, Utc::now())
    }

    /// Claim an unowned site or upgrade one of the player's own.
    ///
    /// Every check runs before anything changes; the ledger charge is the last
    /// check and the commit follows it under the same territory lock.
    pub fn construct_at(
        &self,
        player_id: PlayerId,
        x: i32,
        y: i32,
        kind: StructureKind,
        now: DateTime<Utc>,
    ) -> GameResult<BuildSite> {
        let pos = Position::new(x, y);
        let site = {
            let mut state = sync::write(&self.state);
            let site = state
                .sites
                .get(&pos)
                .ok_or_else(|| GameError::NotFound(format!("site {}", pos)))?;
            if site.is_owned() && site.owner_id != player_id {
                return Err(GameError::NotOwner {
                    player: player_id,
                    x,
                    y,
                });
            }
            if site.is_busy(now) {
                return Err(GameError::SiteBusy { x, y });
            }

            if state.count_owned(player_id, self.limited_kind) >= self.limit {
                return Err(GameError::ConstructionLimitExceeded { limit: self.limit });
            }

            let level = site.target_level(player_id, kind);

            let cost = self.costs.get(kind, level).ok_or_else(|| {
                GameError::InvalidConfig(format!("no cost entry for {} level {}", kind, level))
            })?;
            let need: Resources = cost.need();
            if !self.ledger.take(player_id, &need) {
                return Err(GameError::ResourceInsufficient);
            }

            let Some(site) = state.sites.get_mut(&pos) else {
                return Err(GameError::NotFound(format!("site {}", pos)));
            };
            let previous_owner = site.owner_id;
            site.begin_build(player_id, cost, now);
            site.complete_build();
            let snapshot = site.clone();
            if previous_owner != player_id {
                state.disown(previous_owner, pos);
                state.owned.entry(player_id).or_default().insert(pos);
            }
            snapshot
        };

        metrics::inc_constructions();
        info!(
            "player {} built {} level {} at {}",
            player_id, kind, site.level, pos
        );
        self.ledger.persist(player_id);
        self.persist([pos]);
        Ok(site)
    }

    pub fn relinquish(&self, player_id: PlayerId, x: i32, y: i32) -> GameResult<BuildSite> {
        self.relinquish_at(player_id, x, y, Utc::now())
    }

    /// Start the grace period after which the site reverts to unowned. The site
    /// stays owned and visible, but busy, until the abandonment job runs.
    pub fn relinquish_at(&self, player_id: PlayerId, x: i32, y: i32, now: DateTime<Utc>) -> GameResult<BuildSite> {
        let pos = Position::new(x, y);
        let site = {
            let mut state = sync::write(&self.state);
            let site = state
                .sites
                .get_mut(&pos)
                .ok_or_else(|| GameError::NotFound(format!("site {}", pos)))?;
            if !site.is_owned_by(player_id) {
                return Err(GameError::NotOwner {
                    player: player_id,
                    x,
                    y,
                });
            }
            if site.is_busy(now) {
                return Err(GameError::SiteBusy { x, y });
            }
            let deadline = now + self.grace;
            site.relinquish_deadline = Some(deadline);
            let snapshot = site.clone();
            state.pending.insert((deadline, pos, player_id));
            snapshot
        };

        metrics::inc_relinquishes();
        info!(
            "player {} relinquishing {} at {:?}",
            player_id, pos, site.relinquish_deadline
        );
        self.persist([pos]);
        Ok(site)
    }

    /// Withdraw a pending relinquish. The scheduled job is left in place and
    /// finds nothing to do when it fires.
    pub fn cancel_relinquish(&self, player_id: PlayerId, x: i32, y: i32) -> GameResult<BuildSite> {
        let pos = Position::new(x, y);
        let (site, changed) = {
            let mut state = sync::write(&self.state);
            let site = state
                .sites
                .get_mut(&pos)
                .ok_or_else(|| GameError::NotFound(format!("site {}", pos)))?;
            if !site.is_owned_by(player_id) {
                return Err(GameError::NotOwner {
                    player: player_id,
                    x,
                    y,
                });
            }
            let changed = site.relinquish_deadline.take().is_some();
            (site.clone(), changed)
        };
        if changed {
            debug!("player {} kept {}", player_id, pos);
            self.persist([pos]);
        }
        Ok(site)
    }

    /// Earliest scheduled abandonment, stale or not.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        sync::read(&self.state)
            .pending
            .iter()
            .next()
            .map(|(deadline, _, _)| *deadline)
    }

    /// Fire every abandonment due at `now`. Each job re-checks that the site
    /// still carries the same deadline for the same owner; otherwise it was
    /// cancelled or superseded and is skipped.
    pub fn run_due_abandonments(&self, now: DateTime<Utc>) -> AbandonReport {
        let mut report = AbandonReport::default();
        {
            let mut state = sync::write(&self.state);
            let due: Vec<PendingAbandon> = state
                .pending
                .iter()
                .take_while(|(deadline, _, _)| *deadline <= now)
                .copied()
                .collect();
            for job in due {
                state.pending.remove(&job);
                let (deadline, pos, owner) = job;
                let still_pending = state.sites.get(&pos).map_or(false, |site| {
                    site.owner_id == owner && site.relinquish_deadline == Some(deadline)
                });
                if !still_pending {
                    report.skipped += 1;
                    continue;
                }
                state.disown(owner, pos);
                if let Some(site) = state.sites.get_mut(&pos) {
                    site.reset();
                    report.released.push(site.clone());
                }
            }
        }

        for site in &report.released {
            metrics::inc_abandons_executed();
            info!("site {} reverted to unowned", site.position);
        }
        for _ in 0..report.skipped {
            metrics::inc_abandons_skipped();
        }
        self.persist(report.released.iter().map(|site| site.position));
        report
    }

    /// Best-effort write-through; the in-memory index stays authoritative.
    /// Each write stores the site as it is now, so whichever writer goes last
    /// leaves the latest state on disk.
    fn persist<I: IntoIterator<Item = Position>>(&self, positions: I) {
        let Some(store) = &self.store else {
            return;
        };
        let _writer = sync::lock(&self.writer);
        for pos in positions {
            let Some(site) = sync::read(&self.state).sites.get(&pos).cloned() else {
                continue;
            };
            if let Err(e) = store.put_site(&site) {
                metrics::inc_storage_write_failures();
                warn!("Failed to persist site {}: {}", pos, e);
            }
        }
    }
}
