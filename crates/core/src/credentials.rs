//! Credential validity lookup.
//!
//! The gate asks a [`CredentialStore`] whether a presented key is currently
//! valid before charging its bucket. [`StaticCredentials`] is a fixed key list
//! loaded at startup.

use subtle::{Choice, ConstantTimeEq};

/// Answers whether a presented credential is currently valid.
pub trait CredentialStore: Send + Sync {
    /// Returns `true` if `key` is a recognized credential.
    fn is_valid(&self, key: &str) -> bool;
}

/// A fixed set of valid API keys.
///
/// Lookups compare against every configured key in constant time, so response
/// timing does not reveal which key (or how much of one) matched.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: Vec<String>,
}

impl StaticCredentials {
    /// Builds the set from any list of keys. Empty and duplicate keys are dropped.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys
            .into_iter()
            .map(Into::into)
            .filter(|k| !k.is_empty())
            .collect();
        keys.sort();
        keys.dedup();
        Self { keys }
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no keys are configured.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl CredentialStore for StaticCredentials {
    fn is_valid(&self, key: &str) -> bool {
        self.keys
            .iter()
            .fold(Choice::from(0), |found, k| {
                found | k.as_bytes().ct_eq(key.as_bytes())
            })
            .into()
    }
}
