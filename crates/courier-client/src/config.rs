//! Client configuration.

use courier_core::error::CourierError;

use crate::dispatcher::Rehydration;

/// Environment variable selecting the rehydration policy.
pub const REHYDRATION_ENV: &str = "COURIER_REHYDRATION";

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Whether history is replayed before commands are handled.
    pub rehydration: Rehydration,
}

impl ClientConfig {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Configuration` if a variable holds an invalid
    /// value.
    pub fn from_env() -> Result<Self, CourierError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults for unset
    /// keys.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Configuration` if a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CourierError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rehydration = match lookup(REHYDRATION_ENV) {
            Some(value) => value.parse()?,
            None => Rehydration::default(),
        };
        Ok(Self { rehydration })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_full_replay() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.rehydration, Rehydration::FullReplay);
    }

    #[test]
    fn test_reads_version_only_policy() {
        let config =
            ClientConfig::from_lookup(lookup(&[(REHYDRATION_ENV, "version-only")])).unwrap();

        assert_eq!(config.rehydration, Rehydration::VersionOnly);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result = ClientConfig::from_lookup(lookup(&[(REHYDRATION_ENV, "sometimes")]));

        assert!(matches!(result, Err(CourierError::Configuration(_))));
    }
}
