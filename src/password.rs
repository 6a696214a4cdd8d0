/// Password hashing
///
/// Argon2id with a per-hash random salt. The cost parameters are encoded in
/// the PHC string, so hashes made under older settings still verify after the
/// configured cost changes.

use crate::{
    config::AuthConfig,
    error::{HubError, HubResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Hashes and checks account secrets
#[derive(Clone)]
pub struct PasswordVerifier {
    params: Params,
}

impl PasswordVerifier {
    /// Build a verifier with the configured Argon2 cost
    pub fn new(config: &AuthConfig) -> HubResult<Self> {
        let params = Params::new(
            config.password_memory_kib,
            config.password_iterations,
            config.password_parallelism,
            None,
        )
        .map_err(|e| HubError::Internal(format!("Invalid password hashing parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a secret into a PHC string
    pub fn hash(&self, secret: &str) -> HubResult<String> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| HubError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(hash)
    }

    /// Check a candidate secret against a stored hash
    ///
    /// A mismatch is `Ok(false)`. An unparseable hash means the stored record
    /// is corrupt and is reported as `Internal`.
    pub fn verify(&self, candidate: &str, password_hash: &str) -> HubResult<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| HubError::Internal(format!("Stored password hash is malformed: {}", e)))?;

        match self.argon2().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HubError::Internal(format!(
                "Password verification failed: {}",
                e
            ))),
        }
    }
}
