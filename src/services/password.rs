//! Credential verifier: PBKDF2-HMAC-SHA256 password hashing.
//!
//! Comparison is constant-time; whether the username was unknown or the
//! password wrong is collapsed into one InvalidCredentials outcome at the
//! API boundary to avoid username enumeration.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// KDF iteration count.
const PBKDF2_ROUNDS: u32 = 100_000;
/// Random salt length in bytes.
const SALT_LEN: usize = 16;
/// Derived key length in bytes.
const HASH_LEN: usize = 32;

/// Hash a password with a fresh random salt.
///
/// Returns hex-encoded (hash, salt) for storage.
pub fn hash_password(password: &str) -> (String, String) {
    let salt: [u8; SALT_LEN] = rand::random();
    let hash = derive(password, &salt);
    (hex::encode(hash), hex::encode(salt))
}

/// Verify a password against a stored hash and salt.
///
/// Malformed stored values verify as false rather than erroring; a corrupted
/// row must look exactly like a wrong password from the outside.
pub fn verify_password(password: &str, stored_hash_hex: &str, stored_salt_hex: &str) -> bool {
    let Ok(stored_hash) = hex::decode(stored_hash_hex) else {
        return false;
    };
    let Ok(salt) = hex::decode(stored_salt_hex) else {
        return false;
    };

    let computed = derive(password, &salt);
    computed.ct_eq(&stored_hash).into()
}

fn derive(password: &str, salt: &[u8]) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut out);
    out
}
