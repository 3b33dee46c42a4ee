//! Secret values and secret generation

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

use crate::model::StaticRole;

/// Secure string that zeros memory on drop
///
/// Redacted in `Debug`, base64 encoded when serialized, compared in constant
/// time.
#[derive(Clone)]
pub struct SecureString(SecretString);

impl SecureString {
    /// Create new secure string
    pub fn new(s: impl Into<String>) -> Self {
        Self(SecretString::from(s.into()))
    }

    /// Expose the secret (use with caution)
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Constant-time equality check
    pub fn eq_ct(&self, other: &Self) -> bool {
        let a = self.0.expose_secret().as_bytes();
        let b = other.0.expose_secret().as_bytes();
        a.ct_eq(b).into()
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        self.eq_ct(other)
    }
}

impl Eq for SecureString {}

impl Serialize for SecureString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = B64.encode(self.0.expose_secret().as_bytes());
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = B64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        let s = String::from_utf8(decoded).map_err(serde::de::Error::custom)?;
        Ok(SecureString::new(s))
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureString[REDACTED]")
    }
}

/// Produces the next secret for a role
pub trait SecretGenerator: Send + Sync {
    /// Generate a fresh secret for `role`
    fn generate(&self, role: &StaticRole) -> SecureString;
}

/// Random alphanumeric secrets with at least one upper-case letter, one
/// lower-case letter and one digit
#[derive(Debug, Clone, Copy)]
pub struct RandomSecretGenerator {
    length: usize,
}

impl RandomSecretGenerator {
    /// Generator for secrets of `length` characters
    ///
    /// Lengths below 3 are raised to 3 so every character class fits.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(3),
        }
    }

    /// Configured length
    pub fn length(&self) -> usize {
        self.length
    }

    fn has_every_class(candidate: &str) -> bool {
        candidate.bytes().any(|b| b.is_ascii_uppercase())
            && candidate.bytes().any(|b| b.is_ascii_lowercase())
            && candidate.bytes().any(|b| b.is_ascii_digit())
    }
}

impl SecretGenerator for RandomSecretGenerator {
    fn generate(&self, _role: &StaticRole) -> SecureString {
        let mut rng = rand::rng();
        loop {
            let candidate: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(self.length)
                .map(char::from)
                .collect();
            if Self::has_every_class(&candidate) {
                return SecureString::new(candidate);
            }
        }
    }
}
