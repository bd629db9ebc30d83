use std::collections::HashMap;

use super::User;
use crate::error::{CoreError, CoreResult};
use crate::ids::UserId;

/// All registered users, indexed by id and by case-folded name.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: HashMap<UserId, User>,
    by_name: HashMap<String, UserId>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn insert(&mut self, user: User) -> CoreResult<()> {
        let key = user.name.to_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(CoreError::IllegalAccountAction("account.name-taken"));
        }
        self.by_name.insert(key, user.id);
        self.users.insert(user.id, user);
        Ok(())
    }

    pub fn remove(&mut self, id: UserId) -> Option<User> {
        let user = self.users.remove(&id)?;
        self.by_name.remove(&user.name.to_lowercase());
        Some(user)
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }

    pub fn get(&self, id: UserId) -> CoreResult<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| CoreError::not_found("user.unknown", id))
    }

    pub fn get_mut(&mut self, id: UserId) -> CoreResult<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("user.unknown", id))
    }

    pub fn id_by_name(&self, name: &str) -> Option<UserId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&User> {
        self.id_by_name(name).and_then(|id| self.users.get(&id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut User> {
        self.users.values_mut()
    }

    pub fn online(&self) -> impl Iterator<Item = &User> {
        self.users.values().filter(|u| u.is_online())
    }
}
