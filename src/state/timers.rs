//! Keyed one-shot timers for deferred effects.
//!
//! Putting a timer for a key that already has one replaces it; nothing fires
//! twice for the same key.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Online to away after inactivity.
    AwayDecay,
    /// Deletion of an account that stayed logged out too long.
    AccountCleanup,
}

pub type TimerKey = (UserId, TimerKind);

#[derive(Debug, Default)]
pub struct TimerQueue {
    deadlines: HashMap<TimerKey, DateTime<Utc>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, user: UserId, kind: TimerKind, at: DateTime<Utc>) {
        self.deadlines.insert((user, kind), at);
    }

    pub fn cancel(&mut self, user: UserId, kind: TimerKind) -> bool {
        self.deadlines.remove(&(user, kind)).is_some()
    }

    pub fn cancel_all(&mut self, user: UserId) {
        self.deadlines.retain(|(u, _), _| *u != user);
    }

    pub fn deadline(&self, user: UserId, kind: TimerKind) -> Option<DateTime<Utc>> {
        self.deadlines.get(&(user, kind)).copied()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<TimerKey> {
        let mut due: Vec<(DateTime<Utc>, TimerKey)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (*at, *key))
            .collect();
        due.sort();
        for (_, key) in &due {
            self.deadlines.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }
}
