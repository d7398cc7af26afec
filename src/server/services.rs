//! The explicitly constructed service set a [`GameServer`](super::GameServer) runs on.

use std::sync::Arc;

use log::info;

use crate::chat::ChatService;
use crate::config::Config;
use crate::error::GameResult;
use crate::ledger::ResourceLedger;
use crate::roles::RoleAttributeCache;
use crate::storage::WorldStore;
use crate::territory::TerritoryService;

#[derive(Clone)]
pub struct GameServices {
    pub chat: Arc<ChatService>,
    pub ledger: Arc<ResourceLedger>,
    pub territory: Arc<TerritoryService>,
    pub roles: Arc<RoleAttributeCache>,
    pub store: WorldStore,
}

impl GameServices {
    /// Build every service on `store` and load its persisted state: role rows
    /// (reconciled against the stored alliance rosters), balances and sites.
    /// Map cells with no stored site are seeded as unowned.
    pub fn open(config: &Config, store: WorldStore) -> GameResult<Self> {
        config.validate()?;
        let costs = config.cost_table()?;

        let ledger = Arc::new(ResourceLedger::with_store(&config.ledger, store.clone()));
        let territory = Arc::new(
            TerritoryService::new(config.world.clone(), &config.build, costs, ledger.clone())
                .with_store(store.clone()),
        );
        let roles = Arc::new(RoleAttributeCache::new(Arc::new(store.clone())));
        let chat = Arc::new(ChatService::new(config.chat.history_limit));

        let role_count = roles.load_all(&store)?;
        let ledger_count = ledger.load()?;
        let site_count = territory.load()?;
        info!(
            "World loaded: {} roles, {} ledgers, {} sites",
            role_count, ledger_count, site_count
        );

        Ok(Self {
            chat,
            ledger,
            territory,
            roles,
            store,
        })
    }

    /// Services on a throwaway store.
    pub fn in_memory(config: &Config) -> GameResult<Self> {
        Self::open(config, WorldStore::temporary()?)
    }
}
