//! # Realmkeep - shared world state for an online strategy game
//!
//! Realmkeep holds the mutable state that concurrent request handlers share:
//! chat channel membership and history, territory ownership on the map, and
//! the resource ledger that gates construction. Everything lives in memory
//! behind short, non-blocking locks and is written through to a sled store.
//!
//! ## Features
//!
//! - **Chat**: one world channel plus one channel per alliance, bounded FIFO
//!   history, and a directory that moves a player between alliance channels
//!   atomically.
//! - **Territory**: a grid of build sites with claim, upgrade, relinquish and
//!   cancel operations, a per-player fortress limit and a deferred
//!   abandonment sweep that re-validates each job when it fires.
//! - **Ledger**: all-or-nothing resource consumption.
//! - **Role attributes**: a write-through cache with race-safe first creation.
//! - **Request boundary**: typed, centrally validated request payloads and
//!   status-coded responses.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use realmkeep::config::Config;
//! use realmkeep::server::{GameServer, GameServices, LogPushSink, Request, Session};
//! use realmkeep::storage::WorldStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::load("config.toml").await?);
//!     let store = WorldStore::open(&config.storage.data_dir)?;
//!     let services = GameServices::open(&config, store)?;
//!     let verify = |_rid: i64, token: &str| !token.is_empty();
//!     let server = GameServer::new(config, services, Arc::new(verify), Arc::new(LogPushSink));
//!
//!     let mut session = Session::new();
//!     let login = serde_json::json!({"rid": 7, "nickName": "Seven", "token": "t"});
//!     let rsp = server.dispatch(&mut session, Request::new(1, "chat.login", login));
//!     println!("login -> {:?}", rsp.code);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`chat`] - chat groups, the alliance channel directory and the chat service
//! - [`territory`] - build sites, construction, relinquishment and the abandonment worker
//! - [`ledger`] - per-player resource balances
//! - [`roles`] - role attribute cache
//! - [`alliance`] - alliance rosters and applications
//! - [`server`] - sessions, request decoding and routing
//! - [`storage`] - sled persistence
//! - [`config`] - configuration loading and validation
//!
//! ## Locking
//!
//! When an operation holds more than one lock it takes them in the order
//! directory, group, territory, ledger. Store writes happen after the
//! in-memory state has committed and its locks are released.

pub mod alliance;
pub mod chat;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logutil;
pub mod metrics;
pub mod roles;
pub mod server;
pub mod storage;
pub(crate) mod sync;
pub mod territory;
pub mod types;
pub mod validation;
