use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

use crate::error::{AppError, Result};

/// PIN hasher bound to a specific device registration.
///
/// The device's durable id is mixed into the password material before
/// hashing, so the same 4-digit PIN stored for two devices never shares a
/// preimage. A hash copied from one device row cannot be verified against
/// another device even if the user reused the PIN.
pub struct DevicePasswordHasher;

impl DevicePasswordHasher {
    /// Hash a raw PIN for the device identified by `device_pk`
    /// (the durable `devices.id`, not the client-asserted device_id).
    pub fn hash_password(device_pk: &str, raw_pin: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let material = Self::keyed_material(device_pk, raw_pin);
        let password_hash = argon2
            .hash_password(material.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("PIN hashing failed: {}", e)))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a candidate PIN against the stored hash for this device.
    /// Comparison is constant-time in the candidate via argon2's verifier.
    pub fn verify_password(device_pk: &str, hash: &str, raw_pin: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid PIN hash: {}", e)))?;

        let material = Self::keyed_material(device_pk, raw_pin);
        Ok(Argon2::default()
            .verify_password(material.as_bytes(), &parsed_hash)
            .is_ok())
    }

    fn keyed_material(device_pk: &str, raw_pin: &str) -> String {
        format!("{}:{}", device_pk, raw_pin)
    }
}
