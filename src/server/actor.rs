//! The world actor: the single task that owns [`ServerState`].
//!
//! Connections (TCP sessions and the in-process bot alike) talk to it through
//! a [`WorldHandle`]. Every inbound packet is handled to completion before the
//! next command is read, so handlers are never re-entered and no state is
//! shared between tasks. A periodic tick drives the deferred timers.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;

use super::dispatch::Dispatch;
use super::FrameLimits;
use crate::ids::UserId;
use crate::protocol::Packet;
use crate::state::ServerState;

pub type ConnId = u64;

pub enum WorldCommand {
    Attach {
        conn: ConnId,
        peer: String,
        outgoing: mpsc::UnboundedSender<Packet>,
    },
    Packet {
        conn: ConnId,
        packet: Packet,
    },
    Detach {
        conn: ConnId,
    },
    Snapshot(oneshot::Sender<WorldStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub connections: usize,
    pub online: usize,
    pub worlds: usize,
    pub timers: usize,
}

#[derive(Debug, Clone)]
pub struct ActorSettings {
    pub tick: Duration,
    pub limits: FrameLimits,
}

#[derive(Clone, Debug)]
pub struct WorldHandle {
    tx: mpsc::UnboundedSender<WorldCommand>,
    next_conn: Arc<AtomicU64>,
}

impl WorldHandle {
    /// Register a new connection; packets for it arrive on the returned receiver.
    pub fn attach(&self, peer: impl Into<String>) -> (ConnId, mpsc::UnboundedReceiver<Packet>) {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let (outgoing, rx) = mpsc::unbounded_channel();
        let _ = self.tx.send(WorldCommand::Attach {
            conn,
            peer: peer.into(),
            outgoing,
        });
        (conn, rx)
    }

    pub fn packet(&self, conn: ConnId, packet: Packet) {
        let _ = self.tx.send(WorldCommand::Packet { conn, packet });
    }

    pub fn detach(&self, conn: ConnId) {
        let _ = self.tx.send(WorldCommand::Detach { conn });
    }

    pub async fn snapshot(&self) -> Option<WorldStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(WorldCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(WorldCommand::Shutdown(tx));
        let _ = rx.await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Connection {
    peer: String,
    outgoing: mpsc::UnboundedSender<Packet>,
    user: Option<UserId>,
}

struct World {
    state: ServerState,
    limits: FrameLimits,
    connections: HashMap<ConnId, Connection>,
    by_user: HashMap<UserId, ConnId>,
}

impl World {
    fn attach(&mut self, conn: ConnId, peer: String, outgoing: mpsc::UnboundedSender<Packet>) {
        debug!("Connection {} attached ({})", conn, peer);
        self.connections.insert(
            conn,
            Connection {
                peer,
                outgoing,
                user: None,
            },
        );
    }

    fn handle_packet(&mut self, conn: ConnId, packet: Packet) {
        let Some(connection) = self.connections.get(&conn) else {
            debug!("Dropping {} for unknown connection {}", packet.name(), conn);
            return;
        };
        let before = connection.user;
        let mut session = before;
        let mut dispatch = Dispatch::new(&mut self.state, &mut session);
        if let Err(e) = packet.route_to_server(&mut dispatch) {
            warn!("Unexpected packet on connection {}: {}", conn, e);
            crate::metrics::inc_packets_malformed();
        }
        let replies = dispatch.into_replies();

        if let Some(user) = session {
            self.by_user.insert(user, conn);
        }
        if let Some(connection) = self.connections.get_mut(&conn) {
            connection.user = session;
        }
        for reply in replies {
            self.deliver(conn, reply);
        }
        self.flush();
        if let Some(old) = before.filter(|old| session != Some(*old)) {
            self.unbind(old, conn);
        }
    }

    fn detach(&mut self, conn: ConnId) {
        let Some(connection) = self.connections.remove(&conn) else {
            return;
        };
        debug!("Connection {} detached ({})", conn, connection.peer);
        if let Some(user) = connection.user {
            self.state.disconnect(user);
            self.unbind(user, conn);
            self.flush();
        }
    }

    fn unbind(&mut self, user: UserId, conn: ConnId) {
        if self.by_user.get(&user) == Some(&conn) {
            self.by_user.remove(&user);
        }
    }

    fn tick(&mut self) {
        let fired = self.state.run_due_timers();
        if fired > 0 {
            debug!("{} timers fired", fired);
        }
        self.flush();
    }

    /// Route everything queued by the last operation to its connection.
    fn flush(&mut self) {
        for delivery in self.state.outbox.drain() {
            match self.by_user.get(&delivery.to).copied() {
                Some(conn) => self.deliver(conn, delivery.packet),
                None => debug!(
                    "No connection for {}; dropping {}",
                    delivery.to.short(),
                    delivery.packet.name()
                ),
            }
        }
    }

    fn deliver(&mut self, conn: ConnId, packet: Packet) {
        let Some(connection) = self.connections.get(&conn) else {
            return;
        };
        let pages = if packet.is_media() {
            vec![packet]
        } else {
            packet.paginate(self.limits.control)
        };
        for page in pages {
            if connection.outgoing.send(page).is_err() {
                debug!("Connection {} closed while sending", conn);
                break;
            }
        }
    }

    fn stats(&self) -> WorldStats {
        WorldStats {
            connections: self.connections.len(),
            online: self.state.users.online().count(),
            worlds: self.state.tree.worlds().len(),
            timers: self.state.timers.len(),
        }
    }

    fn shutdown(&mut self) {
        let conns: Vec<ConnId> = self.connections.keys().copied().collect();
        for conn in conns {
            self.detach(conn);
        }
        self.state.store.flush();
        let totals = crate::metrics::snapshot();
        info!(
            "World stopped: {} packets in, {} out, {} malformed, {} rejected",
            totals.packets_received,
            totals.packets_sent,
            totals.packets_malformed,
            totals.actions_rejected
        );
        for (action, counter) in crate::metrics::admin_counters_snapshot() {
            debug!("{}: {} executed, {} rejected", action, counter.executed, counter.rejected);
        }
    }
}

/// Spawn the world actor owning `state`.
pub fn start_world(state: ServerState, settings: ActorSettings) -> WorldHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<WorldCommand>();
    let handle = WorldHandle {
        tx,
        next_conn: Arc::new(AtomicU64::new(1)),
    };

    tokio::spawn(async move {
        let mut world = World {
            state,
            limits: settings.limits,
            connections: HashMap::new(),
            by_user: HashMap::new(),
        };
        let mut ticker = tokio::time::interval(settings.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(WorldCommand::Attach { conn, peer, outgoing }) => world.attach(conn, peer, outgoing),
                        Some(WorldCommand::Packet { conn, packet }) => world.handle_packet(conn, packet),
                        Some(WorldCommand::Detach { conn }) => world.detach(conn),
                        Some(WorldCommand::Snapshot(resp)) => { let _ = resp.send(world.stats()); },
                        Some(WorldCommand::Shutdown(done)) => {
                            world.shutdown();
                            let _ = done.send(());
                            break;
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => world.tick(),
            }
        }
        info!("World actor stopped");
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ProfileAction, ProfileActionKind};
    use crate::state::test_support::*;

    fn settings() -> ActorSettings {
        ActorSettings {
            tick: Duration::from_millis(20),
            limits: FrameLimits {
                control: 512,
                media: 64 * 1024,
            },
        }
    }

    fn login(name: &str) -> Packet {
        let mut p = ProfileAction::request(ProfileActionKind::Login);
        p.name = Some(name.into());
        p.password = Some("secret-pw".into());
        p.into()
    }

    async fn next_result(rx: &mut mpsc::UnboundedReceiver<Packet>) -> ProfileAction {
        loop {
            match rx.recv().await {
                Some(Packet::ProfileAction(p)) => return p,
                Some(_) => continue,
                None => panic!("connection closed"),
            }
        }
    }

    #[tokio::test]
    async fn login_binds_the_connection_and_detach_logs_out() {
        let (mut state, _, _) = state();
        let ann = state.register("ann", "secret-pw").unwrap();
        let world = start_world(state, settings());

        let (conn, mut rx) = world.attach("test");
        world.packet(conn, login("ann"));
        let result = next_result(&mut rx).await;
        assert!(result.success);
        assert_eq!(result.user, Some(ann));
        assert_eq!(world.snapshot().await.unwrap().online, 1);

        world.detach(conn);
        let stats = world.snapshot().await.unwrap();
        assert_eq!(stats.online, 0);
        assert_eq!(stats.connections, 0);
        world.shutdown().await;
    }

    #[tokio::test]
    async fn second_login_on_one_connection_is_rejected() {
        let (mut state, _, _) = state();
        state.register("ann", "secret-pw").unwrap();
        state.register("bob", "secret-pw").unwrap();
        let world = start_world(state, settings());

        let (conn, mut rx) = world.attach("test");
        world.packet(conn, login("ann"));
        assert!(next_result(&mut rx).await.success);
        world.packet(conn, login("bob"));
        let second = next_result(&mut rx).await;
        assert!(!second.success);
        assert_eq!(
            second.message.map(|m| m.key),
            Some("account.session-bound".to_string())
        );
        world.shutdown().await;
    }
}
