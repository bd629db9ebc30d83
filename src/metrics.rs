//! Process-wide counters.
//!
//! Packet traffic lives in plain atomics; administrative actions are counted
//! per command name behind a mutex.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

static PACKETS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static PACKETS_SENT: AtomicU64 = AtomicU64::new(0);
static PACKETS_MALFORMED: AtomicU64 = AtomicU64::new(0);
static ACTIONS_REJECTED: AtomicU64 = AtomicU64::new(0);
static CONNECTIONS_OPENED: AtomicU64 = AtomicU64::new(0);
static CONNECTIONS_CLOSED: AtomicU64 = AtomicU64::new(0);

static ADMIN_COUNTERS: OnceLock<Mutex<HashMap<&'static str, AdminCounter>>> = OnceLock::new();

pub fn inc_packets_received() {
    PACKETS_RECEIVED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_packets_sent() {
    PACKETS_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_packets_malformed() {
    PACKETS_MALFORMED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_actions_rejected() {
    ACTIONS_REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_connections_opened() {
    CONNECTIONS_OPENED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_connections_closed() {
    CONNECTIONS_CLOSED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdminCounter {
    pub executed: u64,
    pub rejected: u64,
}

fn admin_counter_lock() -> &'static Mutex<HashMap<&'static str, AdminCounter>> {
    ADMIN_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn record_admin_action(name: &'static str, ok: bool) -> AdminCounter {
    let mut guard = admin_counter_lock()
        .lock()
        .expect("admin counter mutex poisoned");
    let counter = guard.entry(name).or_default();
    if ok {
        counter.executed = counter.executed.saturating_add(1);
    } else {
        counter.rejected = counter.rejected.saturating_add(1);
    }
    *counter
}

pub fn admin_counters_snapshot() -> HashMap<&'static str, AdminCounter> {
    admin_counter_lock()
        .lock()
        .expect("admin counter mutex poisoned")
        .clone()
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_malformed: u64,
    pub actions_rejected: u64,
    pub connections_open: u64,
}

pub fn snapshot() -> Snapshot {
    let opened = CONNECTIONS_OPENED.load(Ordering::Relaxed);
    let closed = CONNECTIONS_CLOSED.load(Ordering::Relaxed);
    Snapshot {
        packets_received: PACKETS_RECEIVED.load(Ordering::Relaxed),
        packets_sent: PACKETS_SENT.load(Ordering::Relaxed),
        packets_malformed: PACKETS_MALFORMED.load(Ordering::Relaxed),
        actions_rejected: ACTIONS_REJECTED.load(Ordering::Relaxed),
        connections_open: opened.saturating_sub(closed),
    }
}
