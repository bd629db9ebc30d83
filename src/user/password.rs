//! Argon2id password hashing.

use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::config::SecurityConfig;

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for PasswordService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordService")
    }
}

impl Default for PasswordService {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl PasswordService {
    /// Build from optional `[security.argon2]` overrides; invalid combinations
    /// fall back to the library defaults.
    pub fn from_config(security: Option<&SecurityConfig>) -> Self {
        let Some(a) = security.and_then(|s| s.argon2.as_ref()) else {
            return Self::default();
        };
        let builder = Params::DEFAULT;
        let mem = a.memory_kib.unwrap_or(builder.m_cost());
        let time = a.time_cost.unwrap_or(builder.t_cost());
        let para = a.parallelism.unwrap_or(builder.p_cost());
        match Params::new(mem, time, para, None) {
            Ok(params) => Self {
                argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            },
            Err(e) => {
                log::warn!("Invalid argon2 parameters ({e}); using defaults");
                Self::default()
            }
        }
    }

    pub fn hash(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Password hash failure: {e}"))?;
        Ok(hash.to_string())
    }

    /// A corrupt stored hash never verifies.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                log::warn!("Corrupt password hash: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let svc = PasswordService::default();
        let hash = svc.hash("hunter22").unwrap();
        assert!(svc.verify("hunter22", &hash));
        assert!(!svc.verify("hunter23", &hash));
        assert!(!svc.verify("hunter22", "not-a-hash"));
    }
}
