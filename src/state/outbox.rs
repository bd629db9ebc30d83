//! Packets produced by domain operations, waiting for the actor to deliver.

use crate::ids::UserId;
use crate::protocol::Packet;

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: UserId,
    pub packet: Packet,
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Delivery>,
}

impl Outbox {
    pub fn push(&mut self, to: UserId, packet: Packet) {
        self.queue.push(Delivery { to, packet });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.queue)
    }

    /// Remove and return everything queued for one user, keeping the rest.
    pub fn take_for(&mut self, user: UserId) -> Vec<Packet> {
        let (mine, rest): (Vec<Delivery>, Vec<Delivery>) =
            self.drain().into_iter().partition(|d| d.to == user);
        self.queue = rest;
        mine.into_iter().map(|d| d.packet).collect()
    }
}
