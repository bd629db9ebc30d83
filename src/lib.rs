//! # Agora - authoritative core for a shared multi-room virtual space
//!
//! Agora hosts worlds made of rooms and nested areas. Users register, log in,
//! walk their avatars around, chat, befriend and ignore each other, and are
//! moderated through a role system that inherits down the context tree.
//! Clients speak a compact binary protocol over TCP.
//!
//! ## Features
//!
//! - **Context tree**: global root, worlds, rooms, areas and interactables,
//!   addressed by dotted paths such as `Global.Harbor.Plaza.Lobby`.
//! - **Roles and permissions**: owner, administrator, moderator, room owner,
//!   area manager and bot; a permission held at a context holds below it.
//! - **Administrative actions**: friends, ignores, room invites and kicks,
//!   teleports, reports, bans, mutes and role grants behind one command table.
//! - **Notifications**: informational messages and answerable requests.
//! - **Wire protocol**: varint framing, a single tagged packet envelope and
//!   pagination of batch packets below the configured frame ceiling.
//! - **Persistence**: sled-backed records hydrated once at startup.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agora::clock::SystemClock;
//! use agora::config::Config;
//! use agora::server::Server;
//! use agora::state::{ServerState, StateSettings};
//! use agora::storage::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("agora.toml").await?;
//!     let state = ServerState::new(
//!         StateSettings::from_config(&config),
//!         Box::new(MemoryStore::new()),
//!         Arc::new(SystemClock),
//!     );
//!     Server::bind(&config, state).await?.run().await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`state`] - the server state registry and the domain operations on it
//! - [`admin`] - administrative commands between users
//! - [`context`] - context tree, maps, interactables, roles and permissions
//! - [`notification`] - notifications and request answers
//! - [`protocol`] - field codec, packet catalog, envelope and framing
//! - [`server`] - world actor, packet dispatch and TCP connections
//! - [`bot`] - the in-process concierge client
//! - [`storage`] - persistence contract and backends
//! - [`config`] - configuration loading and validation

pub mod admin;
pub mod bot;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod logutil;
pub mod metrics;
pub mod notification;
pub mod protocol;
pub mod server;
pub mod state;
pub mod storage;
pub mod user;
pub mod validation;
