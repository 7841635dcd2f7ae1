//! Versioned password hashing.
//!
//! Two schemes coexist in stored records:
//!
//! - **V1 (legacy)**: a single SHA-256 over a static salt and the password,
//!   serialized as `v1$<digest>`. Kept only so accounts created before the
//!   key-derivation migration can still sign in.
//! - **V2 (current)**: PBKDF2-HMAC-SHA256 with a per-user random salt and a
//!   high iteration count, serialized as `v2$<iterations>$<salt>$<digest>`.
//!
//! Verification auto-detects the scheme from the prefix. A successful V1
//! verification signals the caller (via [`PasswordHash::needs_upgrade`]) to
//! transparently rewrite the stored hash as V2 with the same plaintext, so no
//! re-login is ever forced. Digest comparison is constant-time.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pbkdf2::pbkdf2_hmac;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Salt baked into every V1 hash. Must never change, or pre-migration
/// accounts stop verifying.
const LEGACY_STATIC_SALT: &[u8] = b"wikigate-legacy-v1";

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PasswordHash {
    Legacy {
        digest: Vec<u8>,
    },
    Pbkdf2 {
        iterations: u32,
        salt: Vec<u8>,
        digest: Vec<u8>,
    },
}

impl PasswordHash {
    /// Hash a password with the current scheme.
    #[must_use]
    pub fn new(password: &str) -> Self {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut digest = vec![0u8; DIGEST_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut digest);
        Self::Pbkdf2 {
            iterations: PBKDF2_ITERATIONS,
            salt,
            digest,
        }
    }

    /// Build a V1 hash the way the pre-migration code did.
    ///
    /// Only used to represent records that predate the migration (and to test
    /// the upgrade path); new hashes always come from [`PasswordHash::new`].
    #[must_use]
    pub fn legacy(password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(LEGACY_STATIC_SALT);
        hasher.update(password.as_bytes());
        Self::Legacy {
            digest: hasher.finalize().to_vec(),
        }
    }

    /// Parse a stored hash string; `None` means the record is corrupt.
    #[must_use]
    pub fn parse(stored: &str) -> Option<Self> {
        let mut parts = stored.split('$');
        match parts.next()? {
            "v1" => {
                let digest = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
                if parts.next().is_some() || digest.len() != DIGEST_LEN {
                    return None;
                }
                Some(Self::Legacy { digest })
            }
            "v2" => {
                let iterations: u32 = parts.next()?.parse().ok()?;
                let salt = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
                let digest = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
                if parts.next().is_some() || iterations == 0 || digest.len() != DIGEST_LEN {
                    return None;
                }
                Some(Self::Pbkdf2 {
                    iterations,
                    salt,
                    digest,
                })
            }
            _ => None,
        }
    }

    /// Constant-time verification of a candidate password.
    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        match self {
            Self::Legacy { digest } => {
                let mut hasher = Sha256::new();
                hasher.update(LEGACY_STATIC_SALT);
                hasher.update(password.as_bytes());
                let candidate = hasher.finalize();
                bool::from(candidate.as_slice().ct_eq(digest))
            }
            Self::Pbkdf2 {
                iterations,
                salt,
                digest,
            } => {
                let mut candidate = vec![0u8; digest.len()];
                pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, *iterations, &mut candidate);
                bool::from(candidate.as_slice().ct_eq(digest))
            }
        }
    }

    /// Whether a verified password should be re-hashed with the current
    /// scheme: legacy format, or an older (weaker) iteration count.
    #[must_use]
    pub fn needs_upgrade(&self) -> bool {
        match self {
            Self::Legacy { .. } => true,
            Self::Pbkdf2 { iterations, .. } => *iterations < PBKDF2_ITERATIONS,
        }
    }
}

impl std::fmt::Display for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy { digest } => {
                write!(f, "v1${}", URL_SAFE_NO_PAD.encode(digest))
            }
            Self::Pbkdf2 {
                iterations,
                salt,
                digest,
            } => write!(
                f,
                "v2${iterations}${}${}",
                URL_SAFE_NO_PAD.encode(salt),
                URL_SAFE_NO_PAD.encode(digest)
            ),
        }
    }
}

/// A real V2 hash of an unguessable password, verified against whenever the
/// looked-up account does not exist, so the response timing of "no such user"
/// matches "wrong password".
#[must_use]
pub fn decoy_hash() -> PasswordHash {
    PasswordHash::new("wikigate-decoy-cc4b0f17")
}
