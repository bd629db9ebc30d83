//! # TCP server
//!
//! Accepts client connections and wires them to the world actor:
//!
//! ```text
//!  client ──► reader task ──┐                       ┌──► writer task ──► client
//!                           ├──► world actor ───────┤
//!  bot task ────────────────┘   (ServerState)       └──► bot task
//! ```
//!
//! - [`actor`] owns all mutable state and routes outgoing packets
//! - [`dispatch`] maps packets to domain operations and catches their errors
//! - [`connection`] frames bytes into packets and back

pub mod actor;
pub mod connection;
pub mod dispatch;

use anyhow::{Context, Result};
use log::{info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::bot;
use crate::config::{Config, ServerConfig};
use crate::protocol::Packet;
use crate::state::ServerState;

pub use actor::{start_world, ActorSettings, ConnId, WorldHandle, WorldStats};

/// Frame ceilings for control packets and for voice/audio packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLimits {
    pub control: usize,
    pub media: usize,
}

impl FrameLimits {
    pub fn from_config(server: &ServerConfig) -> Self {
        Self {
            control: server.max_frame_size,
            media: server.max_media_frame_size,
        }
    }

    pub fn ceiling_for(&self, packet: &Packet) -> usize {
        if packet.is_media() {
            self.media
        } else {
            self.control
        }
    }

    /// Largest frame a reader has to buffer.
    pub fn inbound(&self) -> usize {
        self.control.max(self.media)
    }
}

pub struct Server {
    listener: TcpListener,
    world: WorldHandle,
    limits: FrameLimits,
    slots: Arc<Semaphore>,
}

impl Server {
    /// Start the world actor (and the bot when enabled) and bind the listener.
    pub async fn bind(config: &Config, mut state: ServerState) -> Result<Self> {
        let bot = if config.bot.enabled {
            Some(bot::provision(&mut state, &config.bot).context("provisioning bot account")?)
        } else {
            None
        };

        let limits = FrameLimits::from_config(&config.server);
        let world = start_world(
            state,
            ActorSettings {
                tick: config.session.tick_interval(),
                limits: limits.clone(),
            },
        );
        if let Some(credentials) = bot {
            bot::spawn(world.clone(), credentials);
        }

        let listener = TcpListener::bind(&config.server.bind)
            .await
            .with_context(|| format!("binding {}", config.server.bind))?;
        Ok(Self {
            listener,
            world,
            limits,
            slots: Arc::new(Semaphore::new(config.server.max_connections)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn world(&self) -> WorldHandle {
        self.world.clone()
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await
    }

    /// Serve until `shutdown` completes, then log everybody out.
    pub async fn serve<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        info!("Listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    let Ok(permit) = self.slots.clone().try_acquire_owned() else {
                        warn!("Connection limit reached; refusing {}", peer);
                        drop(stream);
                        continue;
                    };
                    let world = self.world.clone();
                    let limits = self.limits.clone();
                    tokio::spawn(async move {
                        if let Err(e) = connection::handle_connection(stream, peer, world, limits).await {
                            warn!("Connection {} ended with error: {}", peer, e);
                        }
                        drop(permit);
                    });
                }
                _ = &mut shutdown => break,
            }
        }
        self.world.shutdown().await;
        info!("Server shutdown complete");
        Ok(())
    }
}
