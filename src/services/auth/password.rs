//! Password hashing and verification (Argon2, self-describing records).
//!
//! Encoded record layout, split on `$` into exactly six fields:
//!
//! ```text
//! $argon2id$v=19$m=512,t=4,p=4$<base64 salt>$<base64 derived key>
//! ```
//!
//! Base64 is the standard alphabet without padding. Verification reads every
//! cost parameter back out of the record, so records written before a cost
//! rotation keep verifying. The salt length is the decoded salt's length,
//! but argon2 refuses salts shorter than `MIN_SALT_LEN` (8) bytes, so such
//! records are rejected with `SaltTooShort` and never match.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Argon2 version 1.3, the only version this implementation derives with.
pub const ARGON2_VERSION: u32 = 0x13;

pub const MIN_SALT_LEN: usize = 8;
pub const MIN_KEY_LEN: usize = 4;

const FIELD_DELIMITER: char = '$';
const FIELD_COUNT: usize = 6;

const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("invalid hash parameters: {0}")]
    InvalidParams(String),

    #[error("the encoded hash is not in the correct format")]
    InvalidRecordFormat,

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("incompatible version of argon2: {0}")]
    UnsupportedVersion(u32),

    #[error("salt of {0} bytes is shorter than argon2 accepts")]
    SaltTooShort(usize),
}

/// Tunable cost parameters used when writing new records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt_len: usize,
    pub key_len: usize,
}

impl HashParams {
    pub fn validate(&self) -> Result<(), PasswordError> {
        if self.salt_len < MIN_SALT_LEN {
            return Err(PasswordError::InvalidParams(format!(
                "salt length must be >= {MIN_SALT_LEN}, got {}",
                self.salt_len
            )));
        }
        if self.key_len < MIN_KEY_LEN {
            return Err(PasswordError::InvalidParams(format!(
                "key length must be >= {MIN_KEY_LEN}, got {}",
                self.key_len
            )));
        }
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.key_len),
        )
        .map(|_| ())
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))
    }
}

/// A parsed encoded record.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordRecord {
    pub algorithm: Algorithm,
    pub version: u32,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt: Vec<u8>,
    pub key: Vec<u8>,
}

impl PasswordRecord {
    pub fn parse(encoded: &str) -> Result<Self, PasswordError> {
        let fields: Vec<&str> = encoded.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT || !fields[0].is_empty() {
            return Err(PasswordError::InvalidRecordFormat);
        }

        let algorithm = parse_algorithm(fields[1])
            .ok_or_else(|| PasswordError::UnsupportedAlgorithm(fields[1].to_string()))?;

        let version: u32 = fields[2]
            .strip_prefix("v=")
            .and_then(|v| v.parse().ok())
            .ok_or(PasswordError::InvalidRecordFormat)?;
        if version != ARGON2_VERSION {
            return Err(PasswordError::UnsupportedVersion(version));
        }

        let (memory_kib, iterations, parallelism) =
            parse_cost(fields[3]).ok_or(PasswordError::InvalidRecordFormat)?;

        let salt = STANDARD_NO_PAD
            .decode(fields[4])
            .map_err(|_| PasswordError::InvalidRecordFormat)?;
        let key = STANDARD_NO_PAD
            .decode(fields[5])
            .map_err(|_| PasswordError::InvalidRecordFormat)?;
        if salt.is_empty() || key.is_empty() {
            return Err(PasswordError::InvalidRecordFormat);
        }
        if salt.len() < MIN_SALT_LEN {
            return Err(PasswordError::SaltTooShort(salt.len()));
        }

        Ok(Self {
            algorithm,
            version,
            memory_kib,
            iterations,
            parallelism,
            salt,
            key,
        })
    }

    /// Recompute the derived key for `password` with this record's own
    /// algorithm, cost, salt and key length.
    fn derive(&self, password: &str) -> Result<Vec<u8>, argon2::Error> {
        derive_key(
            self.algorithm,
            self.memory_kib,
            self.iterations,
            self.parallelism,
            password,
            &self.salt,
            self.key.len(),
        )
    }

    pub fn matches_params(&self, params: &HashParams) -> bool {
        self.algorithm == Algorithm::Argon2id
            && self.memory_kib == params.memory_kib
            && self.iterations == params.iterations
            && self.parallelism == params.parallelism
            && self.salt.len() == params.salt_len
            && self.key.len() == params.key_len
    }
}

impl fmt::Display for PasswordRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}$v={}$m={},t={},p={}${}${}",
            algorithm_name(self.algorithm),
            self.version,
            self.memory_kib,
            self.iterations,
            self.parallelism,
            STANDARD_NO_PAD.encode(&self.salt),
            STANDARD_NO_PAD.encode(&self.key),
        )
    }
}

impl fmt::Debug for PasswordRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print salt or derived key
        f.debug_struct("PasswordRecord")
            .field("algorithm", &self.algorithm)
            .field("version", &self.version)
            .field("memory_kib", &self.memory_kib)
            .field("iterations", &self.iterations)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

/// Hash `password` with `params` and a fresh random salt.
pub fn hash_password(password: &str, params: &HashParams) -> Result<String, PasswordError> {
    hash_with_algorithm(password, params, Algorithm::Argon2id)
}

fn hash_with_algorithm(
    password: &str,
    params: &HashParams,
    algorithm: Algorithm,
) -> Result<String, PasswordError> {
    let salt = random_bytes(params.salt_len)?;

    let key = derive_key(
        algorithm,
        params.memory_kib,
        params.iterations,
        params.parallelism,
        password,
        &salt,
        params.key_len,
    )
    .map_err(|e| PasswordError::Hashing(e.to_string()))?;

    let record = PasswordRecord {
        algorithm,
        version: ARGON2_VERSION,
        memory_kib: params.memory_kib,
        iterations: params.iterations,
        parallelism: params.parallelism,
        salt,
        key,
    };

    Ok(record.to_string())
}

/// Verify `password` against an encoded record.
///
/// Returns `Ok(false)` on mismatch. A record that cannot be parsed or uses an
/// unsupported version is an `Err`, never a match.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, PasswordError> {
    let record = PasswordRecord::parse(encoded)?;

    let candidate = record
        .derive(password)
        .map_err(|_| PasswordError::InvalidRecordFormat)?;

    Ok(candidate.ct_eq(&record.key).into())
}

/// Generate a random alphanumeric password of `len` characters.
pub fn generate_password(len: usize) -> Result<String, PasswordError> {
    // 248 = 4 * 62; bytes at or above it are rejected to keep the draw uniform.
    const LIMIT: u8 = 248;

    let mut out = String::with_capacity(len);
    while out.len() < len {
        for b in random_bytes(len)? {
            if b >= LIMIT {
                continue;
            }
            out.push(PASSWORD_ALPHABET[(b % 62) as usize] as char);
            if out.len() == len {
                break;
            }
        }
    }
    Ok(out)
}

fn random_bytes(len: usize) -> Result<Vec<u8>, PasswordError> {
    let mut buf = vec![0u8; len];
    getrandom::fill(&mut buf)
        .map_err(|e| PasswordError::Hashing(format!("secure randomness unavailable: {e}")))?;
    Ok(buf)
}

fn derive_key(
    algorithm: Algorithm,
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
    password: &str,
    salt: &[u8],
    key_len: usize,
) -> Result<Vec<u8>, argon2::Error> {
    let params = Params::new(memory_kib, iterations, parallelism, Some(key_len))?;
    let argon2 = Argon2::new(algorithm, Version::V0x13, params);

    let mut out = vec![0u8; key_len];
    argon2.hash_password_into(password.as_bytes(), salt, &mut out)?;
    Ok(out)
}

fn parse_algorithm(name: &str) -> Option<Algorithm> {
    match name {
        "argon2id" => Some(Algorithm::Argon2id),
        "argon2i" => Some(Algorithm::Argon2i),
        "argon2d" => Some(Algorithm::Argon2d),
        _ => None,
    }
}

fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::Argon2id => "argon2id",
        Algorithm::Argon2i => "argon2i",
        Algorithm::Argon2d => "argon2d",
    }
}

// m=<mem>,t=<iterations>,p=<parallelism>, in that order and nothing else.
fn parse_cost(field: &str) -> Option<(u32, u32, u32)> {
    let mut parts = field.split(',');
    let m = parts.next()?.strip_prefix("m=")?.parse().ok()?;
    let t = parts.next()?.strip_prefix("t=")?.parse().ok()?;
    let p = parts.next()?.strip_prefix("p=")?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((m, t, p))
}

/// Hashes with the configured parameters, verifies with whatever the record
/// carries.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: HashParams,
}

impl PasswordHasher {
    pub fn new(params: HashParams) -> Result<Self, PasswordError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &HashParams {
        &self.params
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash_password(password, &self.params)
    }

    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        verify_password(password, encoded)
    }

    /// True when `encoded` was not written with the current parameters
    /// (or cannot be read at all).
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        match PasswordRecord::parse(encoded) {
            Ok(record) => !record.matches_params(&self.params),
            Err(_) => true,
        }
    }

    // Key derivation is CPU and memory heavy. It runs on the blocking pool and
    // finishes even if the caller stops waiting for it.
    pub async fn hash_async(&self, password: String) -> Result<String, PasswordError> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || hash_password(&password, &params))
            .await
            .map_err(|e| PasswordError::Hashing(format!("hashing task failed: {e}")))?
    }

    pub async fn verify_async(
        &self,
        password: String,
        encoded: String,
    ) -> Result<bool, PasswordError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &encoded))
            .await
            .map_err(|e| PasswordError::Hashing(format!("verification task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> HashParams {
        HashParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
            salt_len: 16,
            key_len: 32,
        }
    }

    #[test]
    fn hashed_password_verifies() {
        let encoded = hash_password("correct horse", &fast_params()).unwrap();

        assert!(verify_password("correct horse", &encoded).unwrap());
        assert!(!verify_password("battery staple", &encoded).unwrap());
    }

    #[test]
    fn encoded_record_has_six_fields_in_fixed_order() {
        let encoded = hash_password("pw", &fast_params()).unwrap();
        let fields: Vec<&str> = encoded.split('$').collect();

        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], "");
        assert_eq!(fields[1], "argon2id");
        assert_eq!(fields[2], "v=19");
        assert_eq!(fields[3], "m=64,t=1,p=1");
        assert_eq!(STANDARD_NO_PAD.decode(fields[4]).unwrap().len(), 16);
        assert_eq!(STANDARD_NO_PAD.decode(fields[5]).unwrap().len(), 32);
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("same", &fast_params()).unwrap();
        let b = hash_password("same", &fast_params()).unwrap();

        assert_ne!(a, b);
        assert!(verify_password("same", &a).unwrap());
        assert!(verify_password("same", &b).unwrap());
    }

    #[test]
    fn empty_password_is_hashed_like_any_other() {
        let encoded = hash_password("", &fast_params()).unwrap();

        assert!(verify_password("", &encoded).unwrap());
        assert!(!verify_password(" ", &encoded).unwrap());
    }

    #[test]
    fn verification_uses_embedded_parameters() {
        let old = HashParams {
            memory_kib: 128,
            iterations: 2,
            salt_len: 24,
            key_len: 16,
            ..fast_params()
        };
        let encoded = hash_password("rotated", &old).unwrap();

        // Hasher configured with different cost still verifies the old record.
        let hasher = PasswordHasher::new(fast_params()).unwrap();
        assert!(hasher.verify("rotated", &encoded).unwrap());
        assert!(hasher.needs_rehash(&encoded));
        assert!(!hasher.needs_rehash(&hasher.hash("rotated").unwrap()));
    }

    #[test]
    fn wrong_field_count_is_a_format_error() {
        let encoded = hash_password("pw", &fast_params()).unwrap();
        let truncated = encoded.rsplit_once('$').unwrap().0;

        assert!(matches!(
            verify_password("pw", truncated),
            Err(PasswordError::InvalidRecordFormat)
        ));
        assert!(matches!(
            verify_password("pw", &format!("{encoded}$extra")),
            Err(PasswordError::InvalidRecordFormat)
        ));
        assert!(matches!(
            verify_password("pw", "plaintext"),
            Err(PasswordError::InvalidRecordFormat)
        ));
    }

    #[test]
    fn leading_field_must_be_empty() {
        let encoded = hash_password("pw", &fast_params()).unwrap();
        let shifted = format!("x{encoded}");

        assert!(matches!(
            verify_password("pw", &shifted),
            Err(PasswordError::InvalidRecordFormat)
        ));
    }

    #[test]
    fn other_version_is_rejected() {
        let encoded = hash_password("pw", &fast_params()).unwrap();
        let old = encoded.replace("$v=19$", "$v=16$");

        assert!(matches!(
            verify_password("pw", &old),
            Err(PasswordError::UnsupportedVersion(16))
        ));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let encoded = hash_password("pw", &fast_params()).unwrap();
        let scrypt = encoded.replacen("argon2id", "scrypt", 1);

        assert!(matches!(
            verify_password("pw", &scrypt),
            Err(PasswordError::UnsupportedAlgorithm(name)) if name == "scrypt"
        ));
    }

    #[test]
    fn malformed_cost_field_is_a_format_error() {
        let encoded = hash_password("pw", &fast_params()).unwrap();
        let bad = encoded.replace("m=64,t=1,p=1", "t=1,m=64,p=1");

        assert!(matches!(
            verify_password("pw", &bad),
            Err(PasswordError::InvalidRecordFormat)
        ));
    }

    #[test]
    fn short_salt_record_is_rejected_by_its_own_variant() {
        let salt = STANDARD_NO_PAD.encode([7u8; 4]);
        let key = STANDARD_NO_PAD.encode([1u8; 32]);
        let record = format!("$argon2id$v=19$m=64,t=1,p=1${salt}${key}");

        assert!(matches!(
            verify_password("pw", &record),
            Err(PasswordError::SaltTooShort(4))
        ));
    }

    #[test]
    fn tampered_key_does_not_match() {
        let encoded = hash_password("pw", &fast_params()).unwrap();
        let mut record = PasswordRecord::parse(&encoded).unwrap();
        let last = record.key.len() - 1;
        record.key[last] ^= 0x01;

        assert!(!verify_password("pw", &record.to_string()).unwrap());
    }

    #[test]
    fn legacy_argon2i_records_still_verify() {
        let encoded = hash_with_algorithm("legacy", &fast_params(), Algorithm::Argon2i).unwrap();
        assert!(encoded.starts_with("$argon2i$"));

        let hasher = PasswordHasher::new(fast_params()).unwrap();
        assert!(hasher.verify("legacy", &encoded).unwrap());
        assert!(hasher.needs_rehash(&encoded));
    }

    #[test]
    fn invalid_params_are_rejected_up_front() {
        let short_salt = HashParams {
            salt_len: 4,
            ..fast_params()
        };
        assert!(matches!(
            PasswordHasher::new(short_salt),
            Err(PasswordError::InvalidParams(_))
        ));

        let no_iterations = HashParams {
            iterations: 0,
            ..fast_params()
        };
        assert!(no_iterations.validate().is_err());
    }

    #[test]
    fn generated_passwords_are_alphanumeric() {
        let pw = generate_password(24).unwrap();
        assert_eq!(pw.len(), 24);
        assert!(pw.bytes().all(|b| b.is_ascii_alphanumeric()));
        assert_ne!(pw, generate_password(24).unwrap());
    }

    #[tokio::test]
    async fn blocking_pool_round_trip() {
        let hasher = PasswordHasher::new(fast_params()).unwrap();
        let encoded = hasher.hash_async("async".to_string()).await.unwrap();

        assert!(
            hasher
                .verify_async("async".to_string(), encoded.clone())
                .await
                .unwrap()
        );
        assert!(
            !hasher
                .verify_async("sync".to_string(), encoded)
                .await
                .unwrap()
        );
    }
}
