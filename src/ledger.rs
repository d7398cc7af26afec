//! Per-player resource balances.
//!
//! One mutex guards all balances. Consumption is all-or-nothing: either every
//! requested kind is covered and all are decremented, or nothing changes.
//! Balances are written through to the store after the lock is released.
//! Writers take a second mutex and store a fresh read, so a slow writer can
//! never put an older balance on disk over a newer one.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::GameResult;
use crate::metrics;
use crate::storage::WorldStore;
use crate::sync;
use crate::types::{PlayerId, ResourceKind, Resources};

pub struct ResourceLedger {
    balances: Mutex<HashMap<PlayerId, Resources>>,
    ceiling: Option<u64>,
    starting: Resources,
    store: Option<WorldStore>,
    writer: Mutex<()>,
}

impl ResourceLedger {
    /// In-memory ledger with no persistence.
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            ceiling: config.ceiling,
            starting: config.starting.clone(),
            store: None,
            writer: Mutex::new(()),
        }
    }

    pub fn with_store(config: &LedgerConfig, store: WorldStore) -> Self {
        Self {
            store: Some(store),
            ..Self::new(config)
        }
    }

    /// Load every stored balance into memory. Returns how many players were loaded.
    pub fn load(&self) -> GameResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let stored = store.list_balances()?;
        let count = stored.len();
        let mut balances = sync::lock(&self.balances);
        for (player_id, resources) in stored {
            balances.insert(player_id, resources);
        }
        debug!("Loaded {} resource ledgers", count);
        Ok(count)
    }

    /// Replace a player's balances outright.
    pub fn seed(&self, player_id: PlayerId, resources: Resources) {
        let clamped: Resources = resources
            .into_iter()
            .map(|(kind, qty)| (kind, self.clamp(qty)))
            .collect();
        sync::lock(&self.balances).insert(player_id, clamped);
        self.persist(player_id);
    }

    /// Current balances. Players never seen before hold the starting balances.
    pub fn balance(&self, player_id: PlayerId) -> Resources {
        sync::lock(&self.balances)
            .get(&player_id)
            .cloned()
            .unwrap_or_else(|| self.starting.clone())
    }

    pub fn quantity(&self, player_id: PlayerId, kind: ResourceKind) -> u64 {
        self.balance(player_id).get(&kind).copied().unwrap_or(0)
    }

    /// Consume every kind in `need`, or nothing at all.
    pub fn try_consume(&self, player_id: PlayerId, need: &Resources) -> bool {
        let taken = self.take(player_id, need);
        if taken {
            self.persist(player_id);
        }
        taken
    }

    /// In-memory part of [`try_consume`](Self::try_consume). The caller
    /// [`persist`](Self::persist)s once it holds no locks.
    pub(crate) fn take(&self, player_id: PlayerId, need: &Resources) -> bool {
        let mut balances = sync::lock(&self.balances);
        let current = balances
            .entry(player_id)
            .or_insert_with(|| self.starting.clone());
        let covered = need
            .iter()
            .all(|(kind, qty)| current.get(kind).copied().unwrap_or(0) >= *qty);
        if !covered {
            debug!("player {} cannot cover {:?}", player_id, need);
            return false;
        }
        for (kind, qty) in need {
            if let Some(held) = current.get_mut(kind) {
                *held -= *qty;
            }
        }
        true
    }

    /// Add `quantity` of `kind`, clamped at the configured ceiling.
    pub fn credit(&self, player_id: PlayerId, kind: ResourceKind, quantity: u64) {
        {
            let mut balances = sync::lock(&self.balances);
            let current = balances
                .entry(player_id)
                .or_insert_with(|| self.starting.clone());
            let held = current.entry(kind).or_insert(0);
            *held = self.clamp(held.saturating_add(quantity));
        }
        self.persist(player_id);
    }

    fn clamp(&self, qty: u64) -> u64 {
        match self.ceiling {
            Some(ceiling) => qty.min(ceiling),
            None => qty,
        }
    }

    /// Best-effort write-through of one player's current balances.
    pub(crate) fn persist(&self, player_id: PlayerId) {
        let Some(store) = &self.store else {
            return;
        };
        let _writer = sync::lock(&self.writer);
        let Some(current) = sync::lock(&self.balances).get(&player_id).cloned() else {
            return;
        };
        if let Err(e) = store.put_balance(player_id, &current) {
            metrics::inc_storage_write_failures();
            warn!("Failed to persist ledger for player {}: {}", player_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(pairs: &[(ResourceKind, u64)]) -> Resources {
        pairs.iter().copied().collect()
    }

    fn ledger() -> ResourceLedger {
        ResourceLedger::new(&LedgerConfig::default())
    }

    #[test]
    fn consume_is_all_or_nothing() {
        let ledger = ledger();
        ledger.seed(1, res(&[(ResourceKind::Wood, 10), (ResourceKind::Stone, 5)]));
        let need = res(&[(ResourceKind::Wood, 5), (ResourceKind::Stone, 10)]);
        assert!(!ledger.try_consume(1, &need));
        assert_eq!(
            ledger.balance(1),
            res(&[(ResourceKind::Wood, 10), (ResourceKind::Stone, 5)])
        );
    }

    #[test]
    fn consume_decrements_every_kind() {
        let ledger = ledger();
        ledger.seed(1, res(&[(ResourceKind::Wood, 10), (ResourceKind::Stone, 5)]));
        assert!(ledger.try_consume(1, &res(&[(ResourceKind::Wood, 4), (ResourceKind::Stone, 5)])));
        assert_eq!(ledger.quantity(1, ResourceKind::Wood), 6);
        assert_eq!(ledger.quantity(1, ResourceKind::Stone), 0);
    }

    #[test]
    fn missing_kind_counts_as_zero() {
        let ledger = ledger();
        ledger.seed(1, res(&[(ResourceKind::Wood, 10)]));
        assert!(!ledger.try_consume(1, &res(&[(ResourceKind::Gold, 1)])));
        assert!(ledger.try_consume(1, &Resources::new()));
    }

    #[test]
    fn credit_respects_ceiling() {
        let ledger = ResourceLedger::new(&LedgerConfig {
            ceiling: Some(100),
            starting: Resources::new(),
        });
        ledger.credit(2, ResourceKind::Grain, 70);
        ledger.credit(2, ResourceKind::Grain, 70);
        assert_eq!(ledger.quantity(2, ResourceKind::Grain), 100);
    }

    #[test]
    fn unknown_player_starts_with_configured_balances() {
        let ledger = ResourceLedger::new(&LedgerConfig {
            ceiling: None,
            starting: res(&[(ResourceKind::Grain, 30)]),
        });
        assert_eq!(ledger.quantity(9, ResourceKind::Grain), 30);
        assert!(ledger.try_consume(9, &res(&[(ResourceKind::Grain, 30)])));
        assert_eq!(ledger.quantity(9, ResourceKind::Grain), 0);
    }

    #[test]
    fn concurrent_consumers_never_overdraw() {
        let ledger = ledger();
        ledger.seed(1, res(&[(ResourceKind::Grain, 100)]));
        let need = res(&[(ResourceKind::Grain, 7)]);
        let successes = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..5 {
                        if ledger.try_consume(1, &need) {
                            successes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });
        let spent = successes.load(std::sync::atomic::Ordering::SeqCst) as u64 * 7;
        assert_eq!(spent, 98);
        assert_eq!(ledger.quantity(1, ResourceKind::Grain), 2);
    }

    #[test]
    fn stored_balance_tracks_the_last_change() {
        let store = WorldStore::temporary().expect("store");
        let ledger = ResourceLedger::with_store(&LedgerConfig::default(), store.clone());
        ledger.seed(1, res(&[(ResourceKind::Grain, 10_000)]));
        let need = res(&[(ResourceKind::Grain, 3)]);
        std::thread::scope(|s| {
            for worker in 0..8u64 {
                let ledger = &ledger;
                let need = &need;
                s.spawn(move || {
                    for round in 0..50u64 {
                        if (worker + round) % 3 == 0 {
                            ledger.credit(1, ResourceKind::Grain, 1);
                        } else {
                            ledger.try_consume(1, need);
                        }
                    }
                });
            }
        });
        assert_eq!(store.get_balance(1).unwrap(), Some(ledger.balance(1)));
    }
}
