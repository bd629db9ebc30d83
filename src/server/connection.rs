//! One TCP client: a reader task feeding the world actor and a writer task
//! draining the packets the actor addressed to this connection.

use anyhow::Result;
use log::{debug, info, warn};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::actor::{ConnId, WorldHandle};
use super::FrameLimits;
use crate::logutil::hex_preview;
use crate::metrics;
use crate::protocol::{encode_frame, Framer, Packet, Side};

pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    world: WorldHandle,
    limits: FrameLimits,
) -> Result<()> {
    metrics::inc_connections_opened();
    let _ = stream.set_nodelay(true);
    let (mut rd, wr) = stream.into_split();
    let (conn, outgoing) = world.attach(peer.to_string());
    info!("Connection {} from {}", conn, peer);

    let writer = tokio::spawn(write_loop(wr, outgoing, limits.clone(), peer));

    let mut framer = Framer::new(limits.inbound());
    let mut buf = vec![0u8; 4096];
    let result = loop {
        let n = match rd.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e.into()),
        };
        framer.push(&buf[..n]);
        if let Err(e) = drain_frames(&mut framer, conn, &world, &limits, peer) {
            break Err(e);
        }
    };

    world.detach(conn);
    writer.abort();
    metrics::inc_connections_closed();
    info!("Connection {} from {} closed", conn, peer);
    result
}

/// Forward every complete frame. Undecodable frames are skipped; framing
/// errors end the connection.
fn drain_frames(
    framer: &mut Framer,
    conn: ConnId,
    world: &WorldHandle,
    limits: &FrameLimits,
    peer: SocketAddr,
) -> Result<()> {
    while let Some(frame) = framer.next_frame()? {
        let len = frame.len();
        match Packet::decode_on(Side::Server, frame.clone()) {
            Ok(packet) if !packet.is_media() && len > limits.control => {
                metrics::inc_packets_malformed();
                warn!(
                    "Oversized {} ({} bytes) from {}; dropped",
                    packet.name(),
                    len,
                    peer
                );
            }
            Ok(packet) => {
                metrics::inc_packets_received();
                debug!("{} from {}", packet.name(), peer);
                world.packet(conn, packet);
            }
            Err(e) => {
                metrics::inc_packets_malformed();
                warn!(
                    "Malformed packet from {}: {} [{}]",
                    peer,
                    e,
                    hex_preview(&frame)
                );
            }
        }
    }
    Ok(())
}

async fn write_loop(
    mut wr: tokio::net::tcp::OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Packet>,
    limits: FrameLimits,
    peer: SocketAddr,
) {
    while let Some(packet) = outgoing.recv().await {
        let ceiling = limits.ceiling_for(&packet);
        let frame = match encode_frame(&packet.encode(), ceiling) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Not sending {} to {}: {}", packet.name(), peer, e);
                continue;
            }
        };
        if wr.write_all(&frame).await.is_err() {
            debug!("Write to {} failed; stopping writer", peer);
            break;
        }
        metrics::inc_packets_sent();
    }
    let _ = wr.shutdown().await;
}
