//! Test utilities & fixtures.
//! Builds an in-memory server state with a seeded `Harbor` world and cheap
//! password hashing so registration stays fast.

use std::sync::Arc;

use agora::clock::ManualClock;
use agora::config::{Argon2Config, SecurityConfig};
use agora::context::ContextMap;
use agora::ids::{ContextId, UserId};
use agora::protocol::Packet;
use agora::state::{ServerState, StateSettings};
use agora::storage::MemoryStore;
use agora::user::PasswordService;

#[allow(dead_code)]
pub const PASSWORD: &str = "secret-pw";

#[allow(dead_code)]
pub fn cheap_security() -> SecurityConfig {
    SecurityConfig {
        argon2: Some(Argon2Config {
            memory_kib: Some(1024),
            time_cost: Some(1),
            parallelism: Some(1),
        }),
    }
}

/// Fresh state owned by `root`, plus handles on its clock and store.
#[allow(dead_code)]
pub fn state() -> (ServerState, ManualClock, MemoryStore) {
    let clock = ManualClock::default();
    let store = MemoryStore::new();
    let settings = StateSettings {
        owner: Some("root".into()),
        ..StateSettings::default()
    };
    let mut state = ServerState::new(settings, Box::new(store.clone()), Arc::new(clock.clone()))
        .with_passwords(PasswordService::from_config(Some(&cheap_security())));
    state
        .seed_world("Harbor", ContextMap::PublicPlaza)
        .expect("seed world");
    (state, clock, store)
}

#[allow(dead_code)]
pub fn harbor() -> ContextId {
    ContextId::root().child("Harbor")
}

#[allow(dead_code)]
pub fn plaza() -> ContextId {
    harbor().child("Plaza")
}

/// Register and log in.
#[allow(dead_code)]
pub fn online(state: &mut ServerState, name: &str) -> UserId {
    let id = state.register(name, PASSWORD).expect("register");
    state.login(name, PASSWORD).expect("login");
    id
}

#[allow(dead_code)]
pub fn in_harbor(state: &mut ServerState, name: &str) -> UserId {
    let id = online(state, name);
    state.join_world(id, &harbor()).expect("join");
    id
}

/// Take everything queued for `user`.
#[allow(dead_code)]
pub fn received(state: &mut ServerState, user: UserId) -> Vec<Packet> {
    state.outbox.take_for(user)
}
